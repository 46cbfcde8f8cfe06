//! Built-in behavior of the runtime classes generated code depends on:
//! boxes, throwables, `HookResult` and `ReentryGuard`.

use std::cell::Cell;

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;

use crate::desc::{JvmType, MethodDescriptor, OBJECT_CLASS};
use crate::insn::{InvokeKind, MemberRef};
use crate::runtime::{
    GUARD_CLASS, GUARD_ENTER, GUARD_EXIT, RESULT_CAPTURE, RESULT_CAPTURED, RESULT_CLASS, RESULT_HAS_CAPTURE,
    RESULT_JUMP, RESULT_JUMP_INDEX, RESULT_OVERRIDE, RESULT_PROCEED, RESULT_TAG, RESULT_VALUE,
};

use super::value::{Object, Outcome, ResultSentinel, Unwind, Value};

pub const NULL_POINTER: &str = "java/lang/NullPointerException";
pub const CLASS_CAST: &str = "java/lang/ClassCastException";
pub const ARITHMETIC: &str = "java/lang/ArithmeticException";
pub const STACK_OVERFLOW: &str = "java/lang/StackOverflowError";
pub const UNSATISFIED_LINK: &str = "java/lang/UnsatisfiedLinkError";
pub const THROWABLE: &str = "java/lang/Throwable";

/// Superclass of the runtime classes the executor knows without loading.
pub static BUILTIN_SUPERS: Lazy<FxHashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut m = FxHashMap::default();
    for (class, sup) in [
        ("java/lang/String", OBJECT_CLASS),
        ("java/lang/Number", OBJECT_CLASS),
        ("java/lang/Boolean", OBJECT_CLASS),
        ("java/lang/Character", OBJECT_CLASS),
        ("java/lang/Byte", "java/lang/Number"),
        ("java/lang/Short", "java/lang/Number"),
        ("java/lang/Integer", "java/lang/Number"),
        ("java/lang/Long", "java/lang/Number"),
        ("java/lang/Float", "java/lang/Number"),
        ("java/lang/Double", "java/lang/Number"),
        (THROWABLE, OBJECT_CLASS),
        ("java/lang/Exception", THROWABLE),
        ("java/lang/Error", THROWABLE),
        ("java/lang/RuntimeException", "java/lang/Exception"),
        ("java/lang/IllegalStateException", "java/lang/RuntimeException"),
        ("java/lang/IllegalArgumentException", "java/lang/RuntimeException"),
        (NULL_POINTER, "java/lang/RuntimeException"),
        (CLASS_CAST, "java/lang/RuntimeException"),
        (ARITHMETIC, "java/lang/RuntimeException"),
        (STACK_OVERFLOW, "java/lang/Error"),
        (UNSATISFIED_LINK, "java/lang/Error"),
        (RESULT_CLASS, OBJECT_CLASS),
    ] {
        m.insert(class, sup);
    }
    m
});

thread_local! {
    static IN_HOOK: Cell<bool> = const { Cell::new(false) };
}

/// `ReentryGuard.enter()`: false if this thread is already inside a handler.
pub fn guard_enter() -> bool {
    IN_HOOK.with(|flag| !flag.replace(true))
}

pub fn guard_exit() {
    IN_HOOK.with(|flag| flag.set(false));
}

pub fn guard_active() -> bool {
    IN_HOOK.with(Cell::get)
}

pub type Intrinsic = Result<Option<Value>, Unwind>;

/// Runs `method` if it belongs to a built-in runtime class. `None` means the
/// call is not intrinsic and must be resolved normally.
pub fn intrinsic(kind: InvokeKind, method: &MemberRef, args: &[Value], throwable: bool) -> Option<Intrinsic> {
    let owner = method.owner.as_str();
    let name = method.name.as_str();
    if owner == RESULT_CLASS {
        return Some(hook_result(kind, name, args));
    }
    if owner == GUARD_CLASS {
        return match name {
            n if n == GUARD_ENTER.0 => Some(Ok(Some(Value::Int(i32::from(guard_enter()))))),
            n if n == GUARD_EXIT.0 => {
                guard_exit();
                Some(Ok(None))
            }
            _ => None,
        };
    }
    if name == "<init>" {
        if owner == OBJECT_CLASS {
            return Some(Ok(None));
        }
        if throwable {
            return Some(init_throwable(args));
        }
        return None;
    }
    if JvmType::unboxed(owner).is_some() {
        return match (kind, name) {
            (InvokeKind::Static, "valueOf") => Some(args.first().cloned().map_or_else(
                || Err(Unwind::fault("valueOf without argument")),
                |v| Ok(Some(Value::boxed(owner, v))),
            )),
            (InvokeKind::Virtual, _) if name.ends_with("Value") => Some(unbox(method, args)),
            _ => None,
        };
    }
    if throwable && name == "getMessage" {
        return Some(receiver(args).map(|obj| match obj {
            Value::Ref(obj) => match &*obj.borrow() {
                Object::Throwable { message: Some(msg), .. } => Some(Value::string(msg.clone())),
                _ => Some(Value::Null),
            },
            _ => Some(Value::Null),
        }));
    }
    None
}

fn receiver(args: &[Value]) -> Result<&Value, Unwind> {
    match args.first() {
        Some(Value::Null) | None => Err(Unwind::throw(NULL_POINTER, "null receiver")),
        Some(v) => Ok(v),
    }
}

fn init_throwable(args: &[Value]) -> Intrinsic {
    let this = receiver(args)?;
    let message = match args.get(1) {
        Some(Value::Ref(s)) => match &*s.borrow() {
            Object::Str(text) => Some(text.clone()),
            other => Some(other.to_string()),
        },
        _ => None,
    };
    if let Value::Ref(obj) = this
        && let Object::Throwable { message: slot, .. } = &mut *obj.borrow_mut()
    {
        *slot = message;
    }
    Ok(None)
}

fn unbox(method: &MemberRef, args: &[Value]) -> Intrinsic {
    let inner = receiver(args)?.unboxed();
    let ret = MethodDescriptor::parse(&method.desc)
        .map(|d| d.ret)
        .map_err(Unwind::fault)?;
    let value = match (&ret, inner) {
        (JvmType::Long, Value::Int(v)) => Value::Long(i64::from(v)),
        (JvmType::Double, Value::Int(v)) => Value::Double(f64::from(v)),
        (JvmType::Float, Value::Int(v)) => Value::Float(v as f32),
        (JvmType::Int | JvmType::Short | JvmType::Byte | JvmType::Char | JvmType::Boolean, Value::Long(v)) => {
            Value::Int(v as i32)
        }
        (JvmType::Double, Value::Long(v)) => Value::Double(v as f64),
        (JvmType::Double, Value::Float(v)) => Value::Double(f64::from(v)),
        (_, Value::Ref(_)) | (_, Value::Null) => {
            return Err(Unwind::throw(CLASS_CAST, format!("{} is not a box", method.owner)));
        }
        (_, v) => v,
    };
    Ok(Some(value))
}

fn with_sentinel<T>(args: &[Value], f: impl FnOnce(&mut ResultSentinel) -> T) -> Result<T, Unwind> {
    match receiver(args)? {
        Value::Ref(obj) => match &mut *obj.borrow_mut() {
            Object::Sentinel(s) => Ok(f(s)),
            other => Err(Unwind::throw(CLASS_CAST, format!("{} is not a HookResult", other.class_name()))),
        },
        _ => Err(Unwind::throw(CLASS_CAST, "primitive is not a HookResult")),
    }
}

fn int_arg(args: &[Value], idx: usize) -> Result<i32, Unwind> {
    args.get(idx)
        .and_then(Value::as_int)
        .ok_or_else(|| Unwind::fault(format!("HookResult call expects an int at argument {}", idx)))
}

fn hook_result(kind: InvokeKind, name: &str, args: &[Value]) -> Intrinsic {
    if kind == InvokeKind::Static {
        let outcome = match name {
            n if n == RESULT_PROCEED.0 => Outcome::Continue,
            n if n == RESULT_OVERRIDE.0 => Outcome::Override(args.first().cloned().unwrap_or(Value::Null)),
            n if n == RESULT_JUMP.0 => Outcome::Jump(int_arg(args, 0)? as u32),
            other => return Err(Unwind::fault(format!("unknown HookResult factory {}", other))),
        };
        return Ok(Some(Value::sentinel(outcome)));
    }
    match name {
        n if n == RESULT_TAG.0 => with_sentinel(args, |s| Some(Value::Int(s.tag().value()))),
        n if n == RESULT_VALUE.0 => with_sentinel(args, |s| match &s.outcome {
            Outcome::Override(v) => Some(v.clone()),
            _ => Some(Value::Null),
        }),
        n if n == RESULT_JUMP_INDEX.0 => with_sentinel(args, |s| match s.outcome {
            Outcome::Jump(idx) => Some(Value::Int(idx as i32)),
            _ => Some(Value::Int(-1)),
        }),
        n if n == RESULT_HAS_CAPTURE.0 => {
            let slot = int_arg(args, 1)? as u16;
            with_sentinel(args, |s| Some(Value::Int(i32::from(s.captures.contains_key(&slot)))))
        }
        n if n == RESULT_CAPTURED.0 => {
            let slot = int_arg(args, 1)? as u16;
            with_sentinel(args, |s| Some(s.captures.get(&slot).cloned().unwrap_or(Value::Null)))
        }
        n if n == RESULT_CAPTURE.0 => {
            let slot = int_arg(args, 1)? as u16;
            let value = args.get(2).cloned().unwrap_or(Value::Null);
            with_sentinel(args, |s| {
                s.captures.insert(slot, value);
                None
            })
        }
        other => Err(Unwind::fault(format!("unknown HookResult method {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_is_per_thread_and_non_reentrant() {
        assert!(guard_enter());
        assert!(!guard_enter());
        let other = std::thread::spawn(guard_enter).join().expect("thread");
        assert!(other);
        guard_exit();
        assert!(!guard_active());
    }

    #[test]
    fn sentinel_methods_round_trip_captures() {
        let jump = MemberRef::new(RESULT_CLASS, RESULT_JUMP.0, RESULT_JUMP.1);
        let sentinel = intrinsic(InvokeKind::Static, &jump, &[Value::Int(1)], false)
            .expect("intrinsic")
            .expect("ok")
            .expect("value");
        let capture = MemberRef::new(RESULT_CLASS, RESULT_CAPTURE.0, RESULT_CAPTURE.1);
        intrinsic(InvokeKind::Virtual, &capture, &[sentinel.clone(), Value::Int(3), Value::Long(9)], false)
            .expect("intrinsic")
            .expect("ok");
        let captured = MemberRef::new(RESULT_CLASS, RESULT_CAPTURED.0, RESULT_CAPTURED.1);
        let got = intrinsic(InvokeKind::Virtual, &captured, &[sentinel.clone(), Value::Int(3)], false)
            .expect("intrinsic")
            .expect("ok");
        assert_eq!(got, Some(Value::Long(9)));
        let tag = MemberRef::new(RESULT_CLASS, RESULT_TAG.0, RESULT_TAG.1);
        let got = intrinsic(InvokeKind::Virtual, &tag, &[sentinel], false)
            .expect("intrinsic")
            .expect("ok");
        assert_eq!(got, Some(Value::Int(2)));
    }

    #[test]
    fn unboxing_null_throws_npe() {
        let int_value = MemberRef::new("java/lang/Integer", "intValue", "()I");
        let err = intrinsic(InvokeKind::Virtual, &int_value, &[Value::Null], false)
            .expect("intrinsic")
            .expect_err("npe");
        assert_eq!(err.exception_class().as_deref(), Some(NULL_POINTER));
    }
}
