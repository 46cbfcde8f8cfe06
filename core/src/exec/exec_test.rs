use super::*;
use crate::class::{AccessFlags, ClassNode, MethodNode, TryCatchBlock};
use crate::insn::{ArithOp, Cond, Constant, Insn, InvokeKind, JumpOp, Kind, LabelId, MemberRef, TypeOp};
use crate::runtime::{BOOTSTRAP_CLASS, BOOTSTRAP_METHOD};

fn static_method(name: &str, desc: &str, code: Vec<Insn>) -> MethodNode {
    MethodNode::new(name, desc, AccessFlags::PUBLIC.union(AccessFlags::STATIC)).with_code(code)
}

fn run_int(interp: &mut Interpreter, class: &str, name: &str, desc: &str, args: Vec<Value>) -> i32 {
    interp
        .invoke(class, name, desc, args)
        .expect("call")
        .and_then(|v| v.as_int())
        .expect("int result")
}

#[test]
fn arithmetic_and_branches() {
    // abs(x) * 2
    let class = ClassNode::new("demo/Math").with_method(static_method(
        "twiceAbs",
        "(I)I",
        vec![
            Insn::Load(Kind::Int, 0),
            Insn::Jump(JumpOp::If(Cond::Ge), LabelId(0)),
            Insn::Load(Kind::Int, 0),
            Insn::Arith(ArithOp::Neg, Kind::Int),
            Insn::Store(Kind::Int, 0),
            Insn::Label(LabelId(0)),
            Insn::Load(Kind::Int, 0),
            Insn::Const(Constant::Int(2)),
            Insn::Arith(ArithOp::Mul, Kind::Int),
            Insn::Return(Some(Kind::Int)),
        ],
    ));
    let mut interp = Interpreter::new();
    interp.load(class);
    assert_eq!(run_int(&mut interp, "demo/Math", "twiceAbs", "(I)I", vec![Value::Int(-7)]), 14);
    assert_eq!(run_int(&mut interp, "demo/Math", "twiceAbs", "(I)I", vec![Value::Int(3)]), 6);
}

#[test]
fn wide_locals_and_stack_shuffles() {
    // (long a, int b) -> a + a, shuffling b around the wide value first
    let class = ClassNode::new("demo/Wide").with_method(static_method(
        "sum",
        "(JI)J",
        vec![
            Insn::Load(Kind::Long, 0),
            Insn::Load(Kind::Int, 2),
            Insn::DupX2,
            Insn::Pop,
            Insn::Pop2,
            Insn::Pop,
            Insn::Load(Kind::Long, 0),
            Insn::Load(Kind::Long, 0),
            Insn::Arith(ArithOp::Add, Kind::Long),
            Insn::Return(Some(Kind::Long)),
        ],
    ));
    let mut interp = Interpreter::new();
    interp.load(class);
    let out = interp
        .invoke("demo/Wide", "sum", "(JI)J", vec![Value::Long(20), Value::Int(1)])
        .expect("call");
    assert_eq!(out, Some(Value::Long(40)));
}

#[test]
fn table_switch_uses_default_outside_range() {
    let class = ClassNode::new("demo/Switch").with_method(static_method(
        "pick",
        "(I)I",
        vec![
            Insn::Load(Kind::Int, 0),
            Insn::TableSwitch {
                low: 1,
                default: LabelId(2),
                targets: vec![LabelId(0), LabelId(1)],
            },
            Insn::Label(LabelId(0)),
            Insn::Const(Constant::Int(10)),
            Insn::Return(Some(Kind::Int)),
            Insn::Label(LabelId(1)),
            Insn::Const(Constant::Int(20)),
            Insn::Return(Some(Kind::Int)),
            Insn::Label(LabelId(2)),
            Insn::Const(Constant::Int(-1)),
            Insn::Return(Some(Kind::Int)),
        ],
    ));
    let mut interp = Interpreter::new();
    interp.load(class);
    let results: Vec<i32> = [0, 1, 2, 3]
        .into_iter()
        .map(|x| run_int(&mut interp, "demo/Switch", "pick", "(I)I", vec![Value::Int(x)]))
        .collect();
    assert_eq!(results, vec![-1, 10, 20, -1]);
}

#[test]
fn divide_by_zero_is_caught_by_handler() {
    let method = static_method(
        "safeDiv",
        "(II)I",
        vec![
            Insn::Label(LabelId(0)),
            Insn::Load(Kind::Int, 0),
            Insn::Load(Kind::Int, 1),
            Insn::Arith(ArithOp::Div, Kind::Int),
            Insn::Return(Some(Kind::Int)),
            Insn::Label(LabelId(1)),
            Insn::Label(LabelId(2)),
            Insn::Pop,
            Insn::Const(Constant::Int(0)),
            Insn::Return(Some(Kind::Int)),
        ],
    )
    .with_try_catch(TryCatchBlock {
        start: LabelId(0),
        end: LabelId(1),
        handler: LabelId(2),
        catch_type: Some("java/lang/ArithmeticException".into()),
    });
    let mut interp = Interpreter::new();
    interp.load(ClassNode::new("demo/Div").with_method(method));
    assert_eq!(run_int(&mut interp, "demo/Div", "safeDiv", "(II)I", vec![Value::Int(9), Value::Int(3)]), 3);
    assert_eq!(run_int(&mut interp, "demo/Div", "safeDiv", "(II)I", vec![Value::Int(9), Value::Int(0)]), 0);
}

#[test]
fn uncaught_exception_keeps_class_and_message() {
    let class = ClassNode::new("demo/Boom").with_method(static_method(
        "boom",
        "()V",
        vec![
            Insn::Type(TypeOp::New, "java/lang/IllegalArgumentException".into()),
            Insn::Dup,
            Insn::Const(Constant::Str("bad input".into())),
            Insn::invoke(InvokeKind::Special, "java/lang/IllegalArgumentException", "<init>", "(Ljava/lang/String;)V"),
            Insn::Throw,
        ],
    ));
    let mut interp = Interpreter::new();
    interp.load(class);
    let err = interp.invoke("demo/Boom", "boom", "()V", vec![]).expect_err("throws");
    assert_eq!(err.exception_class().as_deref(), Some("java/lang/IllegalArgumentException"));
    assert_eq!(err.message().as_deref(), Some("bad input"));
}

#[test]
fn checkcast_failure_throws_class_cast() {
    let class = ClassNode::new("demo/Cast").with_method(static_method(
        "cast",
        "(Ljava/lang/Object;)Ljava/lang/Integer;",
        vec![
            Insn::Load(Kind::Ref, 0),
            Insn::Type(TypeOp::CheckCast, "java/lang/Integer".into()),
            Insn::Return(Some(Kind::Ref)),
        ],
    ));
    let mut interp = Interpreter::new();
    interp.load(class);
    let ok = interp
        .invoke("demo/Cast", "cast", "(Ljava/lang/Object;)Ljava/lang/Integer;", vec![Value::boxed("java/lang/Integer", Value::Int(4))])
        .expect("cast ok");
    assert_eq!(ok.map(|v| v.unboxed()), Some(Value::Int(4)));
    let err = interp
        .invoke("demo/Cast", "cast", "(Ljava/lang/Object;)Ljava/lang/Integer;", vec![Value::string("four")])
        .expect_err("cast fails");
    assert_eq!(err.exception_class().as_deref(), Some(CLASS_CAST));
}

#[test]
fn virtual_dispatch_uses_receiver_class() {
    let base = ClassNode::new("demo/Base").with_method(
        MethodNode::new("id", "()I", AccessFlags::PUBLIC)
            .with_code(vec![Insn::Const(Constant::Int(1)), Insn::Return(Some(Kind::Int))]),
    );
    let mut derived = ClassNode::new("demo/Derived").with_method(
        MethodNode::new("id", "()I", AccessFlags::PUBLIC)
            .with_code(vec![Insn::Const(Constant::Int(2)), Insn::Return(Some(Kind::Int))]),
    );
    derived.super_name = Some("demo/Base".into());
    let caller = ClassNode::new("demo/Caller").with_method(static_method(
        "call",
        "(Ldemo/Base;)I",
        vec![
            Insn::Load(Kind::Ref, 0),
            Insn::invoke(InvokeKind::Virtual, "demo/Base", "id", "()I"),
            Insn::Return(Some(Kind::Int)),
        ],
    ));
    let mut interp = Interpreter::new();
    interp.load(base);
    interp.load(derived);
    interp.load(caller);
    assert!(interp.is_subclass("demo/Derived", "demo/Base"));
    let derived = interp.new_instance("demo/Derived");
    assert_eq!(run_int(&mut interp, "demo/Caller", "call", "(Ldemo/Base;)I", vec![derived]), 2);
    let err = interp
        .invoke("demo/Caller", "call", "(Ldemo/Base;)I", vec![Value::Null])
        .expect_err("null receiver");
    assert_eq!(err.exception_class().as_deref(), Some(NULL_POINTER));
}

#[test]
fn native_methods_bind_by_exported_symbol() {
    let native = MethodNode::new(
        "$hookweave$hash",
        "(I)I",
        AccessFlags::PRIVATE.union(AccessFlags::STATIC).union(AccessFlags::NATIVE),
    );
    let missing = MethodNode::new("other", "()V", AccessFlags::STATIC.union(AccessFlags::NATIVE));
    let mut interp = Interpreter::new();
    interp.load(ClassNode::new("demo/Native").with_method(native).with_method(missing));
    interp.register_native("demo/Native", "hash", "(I)I", |_, args| {
        Ok(Some(Value::Int(args[0].as_int().unwrap_or_default() ^ 0x55)))
    });
    assert_eq!(
        run_int(&mut interp, "demo/Native", "$hookweave$hash", "(I)I", vec![Value::Int(0x0f)]),
        0x5a
    );
    let err = interp.invoke("demo/Native", "other", "()V", vec![]).expect_err("unlinked");
    assert_eq!(err.exception_class().as_deref(), Some(UNSATISFIED_LINK));
}

#[test]
fn runaway_recursion_throws_stack_overflow() {
    let class = ClassNode::new("demo/Loop").with_method(static_method(
        "forever",
        "()V",
        vec![
            Insn::invoke(InvokeKind::Static, "demo/Loop", "forever", "()V"),
            Insn::Return(None),
        ],
    ));
    let mut interp = Interpreter::new();
    interp.set_max_depth(16);
    interp.load(class);
    let err = interp.invoke("demo/Loop", "forever", "()V", vec![]).expect_err("overflow");
    assert_eq!(err.exception_class().as_deref(), Some(STACK_OVERFLOW));
}

#[test]
fn call_sites_bind_once_per_handler() {
    let handler = "(I)I";
    let site = Insn::InvokeDynamic {
        name: "twice".into(),
        desc: handler.into(),
        bootstrap: MemberRef::new(BOOTSTRAP_CLASS, BOOTSTRAP_METHOD.0, BOOTSTRAP_METHOD.1),
        args: vec![
            Constant::Str("demo/Hooks".into()),
            Constant::Str("twice".into()),
            Constant::Str(handler.into()),
        ],
    };
    let caller = ClassNode::new("demo/Site").with_method(static_method(
        "run",
        "(I)I",
        vec![Insn::Load(Kind::Int, 0), site, Insn::Return(Some(Kind::Int))],
    ));
    let hooks = ClassNode::new("demo/Hooks").with_method(static_method(
        "twice",
        handler,
        vec![
            Insn::Load(Kind::Int, 0),
            Insn::Const(Constant::Int(2)),
            Insn::Arith(ArithOp::Mul, Kind::Int),
            Insn::Return(Some(Kind::Int)),
        ],
    ));
    let linker = Linker::new();
    let mut interp = Interpreter::with_linker(linker.clone());
    interp.load(caller);
    interp.load(hooks);
    assert_eq!(run_int(&mut interp, "demo/Site", "run", "(I)I", vec![Value::Int(21)]), 42);
    assert_eq!(run_int(&mut interp, "demo/Site", "run", "(I)I", vec![Value::Int(5)]), 10);
    assert_eq!(linker.bound(), 1);
    assert!(linker.is_bound("demo/Hooks.twice(I)I"));
}

#[test]
fn fields_default_and_store() {
    let class = ClassNode::new("demo/Counter").with_method(static_method(
        "bump",
        "()I",
        vec![
            Insn::Field {
                op: crate::insn::FieldOp::GetStatic,
                field: MemberRef::new("demo/Counter", "count", "I"),
            },
            Insn::Const(Constant::Int(1)),
            Insn::Arith(ArithOp::Add, Kind::Int),
            Insn::Dup,
            Insn::Field {
                op: crate::insn::FieldOp::PutStatic,
                field: MemberRef::new("demo/Counter", "count", "I"),
            },
            Insn::Return(Some(Kind::Int)),
        ],
    ));
    let mut interp = Interpreter::new();
    interp.load(class);
    assert_eq!(run_int(&mut interp, "demo/Counter", "bump", "()I", vec![]), 1);
    assert_eq!(run_int(&mut interp, "demo/Counter", "bump", "()I", vec![]), 2);
    assert_eq!(interp.static_field("demo/Counter", "count"), Some(&Value::Int(2)));
}
