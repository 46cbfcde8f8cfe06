//! Fragment generation: the handler call plus the dispatch protocol.

use crate::class::TryCatchBlock;
use crate::context::NameMapper;
use crate::desc::{JvmType, MethodDescriptor, OBJECT_CLASS};
use crate::insn::{
    ArithOp, Cond, Constant, FieldOp, Insn, InvokeKind, JumpOp, Kind, LabelArena, LabelId, MemberRef, TypeOp, dup_of,
    load_of, pop_of,
};
use crate::runtime::{
    BAD_JUMP_EXCEPTION, BOOTSTRAP_CLASS, BOOTSTRAP_METHOD, GUARD_CLASS, GUARD_ENTER, GUARD_EXIT, RESULT_CAPTURED,
    RESULT_CLASS, RESULT_HAS_CAPTURE, RESULT_JUMP_INDEX, RESULT_TAG, RESULT_VALUE,
};

use super::resolve::{HookPlan, ReferenceMark, boxes_into};
use super::spec::{HookFlag, Placement};

/// What the generated code can rely on at one site.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiteShape {
    /// Type of the value on top of the operand stack where the fragment runs.
    pub value: Option<JvmType>,
    /// The site is a one-operand int conditional branch.
    pub branch: bool,
    /// Local slot written by the site, for `store-slot`.
    pub store: Option<(Kind, u16)>,
}

pub fn kind_type(kind: Kind) -> JvmType {
    match kind {
        Kind::Int => JvmType::Int,
        Kind::Long => JvmType::Long,
        Kind::Float => JvmType::Float,
        Kind::Double => JvmType::Double,
        Kind::Ref => JvmType::object(OBJECT_CLASS),
    }
}

fn constant_type(c: &Constant) -> JvmType {
    match c {
        Constant::Str(_) => JvmType::object("java/lang/String"),
        Constant::Class(_) => JvmType::object("java/lang/Class"),
        other => kind_type(other.kind()),
    }
}

/// Derives the stack shape of `insn` for a fragment placed relative to it.
pub fn site_shape(insn: &Insn, placement: Placement, method: &MethodDescriptor) -> SiteShape {
    let mut branch = false;
    let mut store = None;
    let value = match (placement, insn) {
        (Placement::Wrap, _) => Some(if method.ret.is_void() {
            JvmType::object(OBJECT_CLASS)
        } else {
            method.ret.clone()
        }),
        (Placement::After, Insn::Invoke { method: callee, .. }) => callee.method_desc().map(|d| d.ret),
        (Placement::After, Insn::InvokeDynamic { desc, .. }) => MethodDescriptor::parse(desc).ok().map(|d| d.ret),
        (Placement::Before, Insn::Invoke { kind, method: callee }) => callee.method_desc().and_then(|d| {
            d.params.last().cloned().or_else(|| {
                (*kind != InvokeKind::Static).then(|| JvmType::object(callee.owner.clone()))
            })
        }),
        (Placement::After, Insn::Field { op: FieldOp::GetField | FieldOp::GetStatic, field })
        | (Placement::Before, Insn::Field { op: FieldOp::PutField | FieldOp::PutStatic, field }) => field.field_type(),
        (Placement::Before, Insn::Field { op: FieldOp::GetField, field }) => Some(JvmType::object(field.owner.clone())),
        (Placement::Before, Insn::Store(kind, _)) | (Placement::After, Insn::Load(kind, _)) => Some(kind_type(*kind)),
        (Placement::After, Insn::Store(kind, slot)) => {
            store = Some((*kind, *slot));
            None
        }
        (_, Insn::Arith(_, kind)) => Some(kind_type(*kind)),
        (Placement::After, Insn::Const(c)) => Some(constant_type(c)),
        (Placement::Before, Insn::Return(Some(_))) => Some(method.ret.clone()),
        (Placement::Before, Insn::Jump(JumpOp::If(_), _)) => {
            branch = true;
            Some(JvmType::Int)
        }
        (Placement::Before, Insn::Jump(JumpOp::IfICmp(_), _) | Insn::TableSwitch { .. }) => Some(JvmType::Int),
        (Placement::Before, Insn::Jump(JumpOp::IfNull | JumpOp::IfNonNull | JumpOp::IfACmpEq | JumpOp::IfACmpNe, _))
        | (Placement::Before, Insn::Throw) => Some(JvmType::object(OBJECT_CLASS)),
        (Placement::After, Insn::Type(TypeOp::New | TypeOp::CheckCast, class)) => Some(JvmType::object(class.clone())),
        (Placement::After, Insn::Type(TypeOp::InstanceOf, _)) => Some(JvmType::Int),
        _ => None,
    };
    SiteShape { value, branch, store }
}

/// Converts the value of type `from` on top of the stack into `to`.
/// Primitive kinds never convert into one another.
pub fn convert(from: &JvmType, to: &JvmType, mapper: &NameMapper) -> Result<Vec<Insn>, String> {
    if to.is_void() {
        return Ok(pop_of(from).into_iter().collect());
    }
    if from == to {
        return Ok(Vec::new());
    }
    match (from.is_primitive(), to.is_primitive()) {
        (true, true) if from.kind() == to.kind() => Ok(Vec::new()),
        (true, true) => Err(format!("cannot convert {} to {}", from, to)),
        (true, false) => {
            if !boxes_into(from, to) {
                return Err(format!("{} does not box into {}", from, to));
            }
            Ok(vec![box_insn(from)?])
        }
        (false, true) => {
            let class = to.box_class().ok_or_else(|| format!("{} has no box", to))?;
            let mut out = Vec::with_capacity(2);
            if !matches!(from, JvmType::Object(name) if name == class) {
                out.push(Insn::Type(TypeOp::CheckCast, class.to_string()));
            }
            out.push(unbox_insn(to)?);
            Ok(out)
        }
        (false, false) => Ok(checkcast(to, mapper).into_iter().collect()),
    }
}

fn checkcast(to: &JvmType, mapper: &NameMapper) -> Option<Insn> {
    if to.is_object_root() {
        return None;
    }
    to.internal_name().map(|name| Insn::Type(TypeOp::CheckCast, mapper.map_class(&name)))
}

pub fn box_insn(prim: &JvmType) -> Result<Insn, String> {
    let class = prim.box_class().ok_or_else(|| format!("{} cannot be boxed", prim))?;
    Ok(Insn::invoke(
        InvokeKind::Static,
        class,
        "valueOf",
        &format!("({})L{};", prim.descriptor(), class),
    ))
}

pub fn unbox_insn(prim: &JvmType) -> Result<Insn, String> {
    let class = prim.box_class().ok_or_else(|| format!("{} cannot be unboxed", prim))?;
    let method = prim.unbox_method().unwrap_or_default();
    Ok(Insn::invoke(InvokeKind::Virtual, class, method, &format!("(){}", prim.descriptor())))
}

fn result_call(member: (&str, &str)) -> Insn {
    Insn::invoke(InvokeKind::Virtual, RESULT_CLASS, member.0, member.1)
}

/// Generated code for one site, plus the exception-table entries it needs.
///
/// `handlers` cover instructions inside `code` only and must take precedence
/// over any region the fragment lands in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fragment {
    pub code: Vec<Insn>,
    pub handlers: Vec<TryCatchBlock>,
}

/// Builds one fragment per call; holds only borrowed, per-method state.
pub struct Emitter<'a> {
    plan: &'a HookPlan,
    mapper: &'a NameMapper,
    owner: &'a str,
    target: &'a MethodDescriptor,
    target_static: bool,
}

impl<'a> Emitter<'a> {
    pub fn new(
        plan: &'a HookPlan,
        mapper: &'a NameMapper,
        owner: &'a str,
        target: &'a MethodDescriptor,
        target_static: bool,
    ) -> Self {
        Self {
            plan,
            mapper,
            owner,
            target,
            target_static,
        }
    }

    fn is_branch_case(&self, shape: &SiteShape) -> bool {
        shape.branch
            && self.plan.spec.placement == Placement::Before
            && self.plan.handler.capture == Some(JvmType::Boolean)
            && self.plan.spec.handler.ret == JvmType::Boolean
    }

    /// Generates the fragment for one site. `jumps` are the resolved labels of
    /// the declared jump targets, in declaration order.
    ///
    /// With `avoid-recursion` the handler call runs inside a catch-any region
    /// that leaves the guard before rethrowing:
    ///
    /// ```text
    ///         enter; ifeq skip
    /// start:  <operands>; call
    /// end:    exit; goto resume
    /// catch:  exit; athrow          ; [start, end) -> catch, any type
    /// resume: <result handling>
    /// skip:
    /// ```
    pub fn fragment(&self, shape: &SiteShape, labels: &mut LabelArena, jumps: &[LabelId]) -> Result<Fragment, String> {
        let hook = self.plan.spec.id.as_str();
        let branch = self.is_branch_case(shape);
        let mut out = Vec::new();
        let mut handlers = Vec::new();
        let guard_exit = || Insn::invoke(InvokeKind::Static, GUARD_CLASS, GUARD_EXIT.0, GUARD_EXIT.1);

        let skip = if self.plan.has(HookFlag::AvoidRecursion) {
            let skip = labels.generated(hook);
            out.push(Insn::invoke(InvokeKind::Static, GUARD_CLASS, GUARD_ENTER.0, GUARD_ENTER.1));
            out.push(Insn::Jump(JumpOp::If(Cond::Eq), skip));
            Some(skip)
        } else {
            None
        };

        match skip {
            Some(_) => {
                let start = labels.generated(hook);
                let end = labels.generated(hook);
                let catch = labels.generated(hook);
                let resume = labels.generated(hook);
                out.push(Insn::Label(start));
                self.load_operands(shape, branch, &mut out)?;
                out.push(self.call());
                out.push(Insn::Label(end));
                out.push(guard_exit());
                out.push(Insn::Jump(JumpOp::Goto, resume));
                out.push(Insn::Label(catch));
                out.push(guard_exit());
                out.push(Insn::Throw);
                out.push(Insn::Label(resume));
                handlers.push(TryCatchBlock {
                    start,
                    end,
                    handler: catch,
                    catch_type: None,
                });
            }
            None => {
                self.load_operands(shape, branch, &mut out)?;
                out.push(self.call());
            }
        }

        let ret = &self.plan.spec.handler.ret;
        if branch {
            if self.plan.has(HookFlag::BranchReversal) {
                out.push(Insn::Const(Constant::Int(1)));
                out.push(Insn::Arith(ArithOp::Xor, Kind::Int));
            }
        } else if self.plan.returns_sentinel {
            self.dispatch(shape, labels, jumps, &mut out)?;
        } else if self.plan.has(HookFlag::ForceReturn) {
            out.extend(convert(ret, &self.target.ret, self.mapper)?);
            out.push(Insn::Return(self.target.ret.kind()));
        } else if self.plan.has(HookFlag::StoreSlot) {
            let (kind, slot) = shape.store.ok_or("store-slot needs a local store at the site")?;
            out.extend(convert(ret, &kind_type(kind), self.mapper)?);
            out.push(Insn::Store(kind, slot));
        } else {
            out.extend(pop_of(ret));
        }

        if let Some(skip) = skip {
            out.push(Insn::Label(skip));
        }
        Ok(Fragment { code: out, handlers })
    }

    fn load_operands(&self, shape: &SiteShape, branch: bool, out: &mut Vec<Insn>) -> Result<(), String> {
        let handler = &self.plan.handler;
        if let Some(capture) = &handler.capture {
            let value = shape.value.as_ref().ok_or("nothing on the operand stack to capture at this site")?;
            if !branch {
                out.extend(dup_of(value));
            }
            out.extend(convert(value, &self.mapper.map_type(capture), self.mapper)?);
        }
        if let Some(receiver) = handler.receiver(self.target_static) {
            out.push(Insn::Load(Kind::Ref, 0));
            out.extend(convert(
                &JvmType::object(self.owner),
                &self.mapper.map_type(receiver),
                self.mapper,
            )?);
        }
        let base = if self.target_static { 0 } else { 1 };
        let slots = self.target.param_slots(base);
        for ((want, have), slot) in handler.args(self.target_static).iter().zip(&self.target.params).zip(slots) {
            out.extend(load_of(have, slot));
            out.extend(convert(have, &self.mapper.map_type(want), self.mapper)?);
        }
        out.extend(handler.locals.iter().map(|local| local.load()));
        Ok(())
    }

    /// Handler call: static when `direct`, otherwise a lazily bound call site.
    pub fn call(&self) -> Insn {
        let handler = &self.plan.spec.handler;
        let owner = self.mapper.map_class(&handler.owner);
        let desc = self.mapper.map_desc(&self.plan.handler.call.to_string());
        if self.plan.has(HookFlag::Direct) {
            return Insn::Invoke {
                kind: InvokeKind::Static,
                method: MemberRef::new(owner, handler.name.clone(), desc),
            };
        }
        Insn::InvokeDynamic {
            name: handler.name.clone(),
            desc: desc.clone(),
            bootstrap: MemberRef::new(BOOTSTRAP_CLASS, BOOTSTRAP_METHOD.0, BOOTSTRAP_METHOD.1),
            args: vec![Constant::Str(owner), Constant::Str(handler.name.clone()), Constant::Str(desc)],
        }
    }

    fn dispatch(&self, shape: &SiteShape, labels: &mut LabelArena, jumps: &[LabelId], out: &mut Vec<Insn>) -> Result<(), String> {
        let hook = self.plan.spec.id.as_str();
        let proceed = labels.generated(hook);
        let overridden = labels.generated(hook);
        let mut targets = vec![overridden];
        let jumped = if jumps.is_empty() {
            None
        } else {
            let label = labels.generated(hook);
            targets.push(label);
            Some(label)
        };

        out.push(Insn::Dup);
        out.push(result_call(RESULT_TAG));
        out.push(Insn::TableSwitch {
            low: 1,
            default: proceed,
            targets,
        });

        out.push(Insn::Label(overridden));
        self.restore_marks(labels, out)?;
        out.push(result_call(RESULT_VALUE));
        if self.target.ret.is_void() {
            out.push(Insn::Pop);
        } else {
            out.extend(convert(&JvmType::object(OBJECT_CLASS), &self.target.ret, self.mapper)?);
        }
        out.push(Insn::Return(self.target.ret.kind()));

        if let Some(jumped) = jumped {
            out.push(Insn::Label(jumped));
            self.restore_marks(labels, out)?;
            out.push(result_call(RESULT_JUMP_INDEX));
            if self.plan.handler.capture.is_some() {
                // Drop the captured operand below the index.
                match shape.value.as_ref().map(JvmType::width) {
                    Some(2) => out.extend([Insn::DupX2, Insn::Pop, Insn::Pop2]),
                    Some(_) => out.extend([Insn::Swap, Insn::Pop]),
                    None => {}
                }
            }
            let bad = labels.generated(hook);
            out.push(Insn::TableSwitch {
                low: 0,
                default: bad,
                targets: jumps.to_vec(),
            });
            out.push(Insn::Label(bad));
            out.push(Insn::Type(TypeOp::New, BAD_JUMP_EXCEPTION.to_string()));
            out.push(Insn::Dup);
            out.push(Insn::Const(Constant::Str(format!("hook '{}' returned an undeclared jump index", hook))));
            out.push(Insn::invoke(
                InvokeKind::Special,
                BAD_JUMP_EXCEPTION,
                "<init>",
                "(Ljava/lang/String;)V",
            ));
            out.push(Insn::Throw);
        }

        out.push(Insn::Label(proceed));
        out.push(Insn::Pop);
        Ok(())
    }

    /// With the sentinel on top of the stack, stores every captured value
    /// back into its slot. The sentinel is left in place.
    fn restore_marks(&self, labels: &mut LabelArena, out: &mut Vec<Insn>) -> Result<(), String> {
        for mark in &self.plan.marks {
            self.restore_mark(mark, labels, out)?;
        }
        Ok(())
    }

    fn restore_mark(&self, mark: &ReferenceMark, labels: &mut LabelArena, out: &mut Vec<Insn>) -> Result<(), String> {
        let ty = self.mapper.map_type(&mark.ty);
        let kind = ty.kind().ok_or("void reference mark")?;
        let absent = labels.generated(&self.plan.spec.id);
        out.push(Insn::Dup);
        out.push(Insn::Const(Constant::Int(i32::from(mark.target_slot))));
        out.push(result_call(RESULT_HAS_CAPTURE));
        out.push(Insn::Jump(JumpOp::If(Cond::Eq), absent));
        out.push(Insn::Dup);
        out.push(Insn::Const(Constant::Int(i32::from(mark.target_slot))));
        out.push(result_call(RESULT_CAPTURED));
        out.extend(convert(&JvmType::object(OBJECT_CLASS), &ty, self.mapper)?);
        out.push(Insn::Store(kind, mark.target_slot));
        out.push(Insn::Label(absent));
        Ok(())
    }
}
