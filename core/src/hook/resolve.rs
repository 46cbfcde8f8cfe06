//! Descriptor resolution.
//!
//! Runs once per [`HookSpec`] when the handler is registered. Splits the
//! declared handler signature into the capture receiver, the effective
//! descriptor and the trailing local captures, resolves the target class and
//! validates everything that can be validated without seeing a target method.

use crate::context::NameMapper;
use crate::desc::{JvmType, MethodDescriptor, internal_class_name};
use crate::error::{Coordinates, WeaveError, WeaveResult};
use crate::runtime::RESULT_CLASS;

use super::snapshot::{SnapshotEntry, SnapshotTransform};
use super::spec::{HookFlag, HookSpec, LocalCapture, Placement};

/// Effective call shape of a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerDescriptor {
    /// Descriptor the handler is invoked with, as declared.
    pub call: MethodDescriptor,
    /// Type of the value duplicated from the stack when `capture` is set.
    pub capture: Option<JvmType>,
    /// Parameters left after stripping the capture and the trailing locals.
    /// For instance targets the first one receives `this`.
    pub effective: Vec<JvmType>,
    pub locals: Vec<LocalCapture>,
}

impl HandlerDescriptor {
    pub fn receiver(&self, is_static: bool) -> Option<&JvmType> {
        if is_static { None } else { self.effective.first() }
    }

    /// Effective parameters mirroring target arguments.
    pub fn args(&self, is_static: bool) -> &[JvmType] {
        if is_static || self.effective.is_empty() {
            &self.effective
        } else {
            &self.effective[1..]
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkSource {
    Receiver,
    Argument(usize),
    Local,
}

/// A handler parameter whose final value is captured into the sentinel and
/// restored into `target_slot` of the target method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceMark {
    pub param: usize,
    pub handler_slot: u16,
    pub ty: JvmType,
    pub target_slot: u16,
    pub source: MarkSource,
}

/// Immutable, thread-shareable result of resolving one [`HookSpec`].
#[derive(Debug, Clone)]
pub struct HookPlan {
    pub spec: HookSpec,
    /// Internal name of the class whose methods this hook targets.
    pub target_class: String,
    pub handler: HandlerDescriptor,
    pub returns_sentinel: bool,
    pub marks: Vec<ReferenceMark>,
}

impl HookPlan {
    pub fn prepare(spec: HookSpec) -> WeaveResult<HookPlan> {
        let at = Coordinates::hook(&spec.id);
        let fail = |msg: String| {
            tracing::error!(target: "hookweave::weave", hook = %spec.id, "{}", msg);
            WeaveError::config(at.clone(), msg)
        };

        let params = &spec.handler.params;
        if let Some(idx) = params.iter().position(|p| p.ty.is_void()) {
            return Err(fail(format!("handler parameter {} is void", idx)));
        }

        let mut split = params.len();
        while split > 0 && params[split - 1].local.is_some() {
            split -= 1;
        }
        if let Some(idx) = params[..split].iter().position(|p| p.local.is_some()) {
            return Err(fail(format!(
                "parameter {} captures a local slot but is not part of the trailing run",
                idx
            )));
        }
        let locals: Vec<LocalCapture> = params[split..]
            .iter()
            .filter_map(|p| {
                let kind = p.ty.kind()?;
                Some(LocalCapture { kind, slot: p.local? })
            })
            .collect();

        let mut head = &params[..split];
        let capture = if spec.has(HookFlag::Capture) {
            let Some((first, rest)) = head.split_first() else {
                return Err(fail("capture requested but the handler declares no parameter".into()));
            };
            head = rest;
            Some(first.ty.clone())
        } else {
            None
        };
        let effective: Vec<JvmType> = head.iter().map(|p| p.ty.clone()).collect();

        let is_static = spec.has(HookFlag::Static);
        if !is_static {
            match effective.first() {
                None => return Err(fail("instance target but the handler has no parameter for the receiver".into())),
                Some(ty) if !ty.is_reference() => {
                    return Err(fail(format!("receiver parameter must be a reference type, found {}", ty)));
                }
                _ => {}
            }
        }

        let target_class = match (&spec.target.ty, &spec.target.name) {
            (Some(JvmType::Object(name)), _) => name.clone(),
            (Some(other), _) => return Err(fail(format!("target type {} is not a class", other))),
            (None, Some(name)) if !name.trim().is_empty() => internal_class_name(name),
            _ => match effective.first() {
                Some(JvmType::Object(name)) if !is_static => name.clone(),
                _ => return Err(fail("cannot resolve the target class".into())),
            },
        };

        if spec.has(HookFlag::StoreSlot) && spec.placement != Placement::After {
            return Err(fail("store-slot requires AFTER placement".into()));
        }
        if spec.has(HookFlag::BranchReversal) && !spec.has(HookFlag::Capture) {
            return Err(fail("branch-reversal requires capture".into()));
        }
        if spec.has(HookFlag::ForceReturn) && spec.handler.ret.is_void() {
            return Err(fail("force-return requires a handler that returns a value".into()));
        }

        let returns_sentinel = matches!(&spec.handler.ret, JvmType::Object(name) if name == RESULT_CLASS);
        let handler = HandlerDescriptor {
            call: spec.handler.descriptor(),
            capture,
            effective,
            locals,
        };
        let marks = resolve_marks(&spec, &handler, split).map_err(&fail)?;
        if !marks.is_empty() && !returns_sentinel {
            return Err(fail("reference-marked parameters require a HookResult handler".into()));
        }

        let plan = HookPlan {
            target_class,
            handler,
            returns_sentinel,
            marks,
            spec,
        };
        if let Some(desc) = plan.spec.selector.exact_descriptor() {
            plan.check_target(&desc, is_static, &NameMapper::new())
                .map_err(|msg| WeaveError::config(Coordinates::hook(&plan.spec.id).in_class(&plan.target_class), msg))?;
        }
        tracing::debug!(
            target: "hookweave::weave",
            hook = %plan.spec.id,
            class = %plan.target_class,
            handler = %plan.spec.handler.identity(),
            "hook prepared"
        );
        Ok(plan)
    }

    pub fn is_static(&self) -> bool {
        self.spec.has(HookFlag::Static)
    }

    pub fn has(&self, flag: HookFlag) -> bool {
        self.spec.has(flag)
    }

    /// Checks the handler against one concrete target method descriptor.
    pub fn check_target(&self, desc: &MethodDescriptor, is_static: bool, mapper: &NameMapper) -> Result<(), String> {
        if is_static != self.is_static() {
            return Err(if is_static {
                "target method is static but the hook is not flagged static".into()
            } else {
                "hook is flagged static but the target method is not".into()
            });
        }
        let coerce = self.has(HookFlag::BroadcastCoerce);
        let args = self.handler.args(is_static);
        if args.len() > desc.params.len() {
            return Err(format!(
                "handler takes {} target arguments but {} declares only {}",
                args.len(),
                desc,
                desc.params.len()
            ));
        }
        for (idx, (want, have)) in args.iter().zip(&desc.params).enumerate() {
            let want = mapper.map_type(want);
            if !argument_compatible(&want, have, coerce) {
                return Err(format!("argument {}: handler expects {} but target passes {}", idx, want, have));
            }
        }
        if self.has(HookFlag::ForceReturn) && !self.returns_sentinel {
            let ret = mapper.map_type(&self.spec.handler.ret);
            if !value_convertible(&ret, &desc.ret) {
                return Err(format!("handler returns {} which cannot be returned as {}", ret, desc.ret));
            }
        }
        let base = if is_static { 0 } else { 1 };
        let slots = desc.param_slots(base);
        for mark in &self.marks {
            if let MarkSource::Argument(idx) = mark.source
                && slots.get(idx) != Some(&mark.target_slot)
            {
                return Err(format!(
                    "reference-marked parameter {} maps to slot {} but the target keeps that argument elsewhere",
                    mark.param, mark.target_slot
                ));
            }
        }
        Ok(())
    }

    /// Dependent transform for the handler's own class, if any parameter is
    /// reference-marked.
    pub fn snapshot(&self) -> Option<SnapshotTransform> {
        if self.marks.is_empty() {
            return None;
        }
        Some(SnapshotTransform {
            hook: self.spec.id.clone(),
            class: self.spec.handler.owner.clone(),
            method: self.spec.handler.name.clone(),
            desc: self.handler.call.to_string(),
            entries: self
                .marks
                .iter()
                .map(|m| SnapshotEntry {
                    handler_slot: m.handler_slot,
                    ty: m.ty.clone(),
                    target_slot: m.target_slot,
                })
                .collect(),
        })
    }
}

fn resolve_marks(spec: &HookSpec, handler: &HandlerDescriptor, split: usize) -> Result<Vec<ReferenceMark>, String> {
    let is_static = spec.has(HookFlag::Static);
    let captured = usize::from(handler.capture.is_some());
    let handler_slots = handler.call.param_slots(0);
    let recv = usize::from(!is_static);
    let base: u16 = if is_static { 0 } else { 1 };
    let mut marks = Vec::new();
    for (idx, param) in spec.handler.params.iter().enumerate() {
        if !param.reference {
            continue;
        }
        let (target_slot, source) = if idx >= split {
            match param.local {
                Some(slot) => (slot, MarkSource::Local),
                None => return Err(format!("reference-marked parameter {} has no slot", idx)),
            }
        } else if idx < captured {
            return Err("the captured stack value cannot be reference-marked".into());
        } else {
            let eff = idx - captured;
            if eff < recv {
                (0, MarkSource::Receiver)
            } else {
                let arg = eff - recv;
                let slot = base + handler.effective[recv..recv + arg].iter().map(JvmType::width).sum::<u16>();
                (slot, MarkSource::Argument(arg))
            }
        };
        marks.push(ReferenceMark {
            param: idx,
            handler_slot: handler_slots[idx],
            ty: param.ty.clone(),
            target_slot,
            source,
        });
    }
    Ok(marks)
}

/// Whether a target argument of type `have` can be passed for a handler
/// parameter of type `want`.
pub fn argument_compatible(want: &JvmType, have: &JvmType, coerce: bool) -> bool {
    if want == have {
        return true;
    }
    match (want.is_primitive(), have.is_primitive()) {
        (true, true) => want.kind() == have.kind(),
        (false, false) => true,
        (false, true) => coerce && boxes_into(have, want),
        (true, false) => false,
    }
}

/// Whether a value of type `from` can be converted to `to` with a box,
/// unbox or cast.
pub fn value_convertible(from: &JvmType, to: &JvmType) -> bool {
    if to.is_void() || from == to {
        return true;
    }
    match (from.is_primitive(), to.is_primitive()) {
        (true, true) => from.kind() == to.kind(),
        (false, false) | (false, true) => true,
        (true, false) => boxes_into(from, to),
    }
}

/// Whether the box of primitive `prim` is assignable to reference `to`.
pub fn boxes_into(prim: &JvmType, to: &JvmType) -> bool {
    match to {
        JvmType::Object(name) => {
            to.is_object_root()
                || (name == "java/lang/Number" && !matches!(prim, JvmType::Boolean | JvmType::Char))
                || prim.box_class() == Some(name.as_str())
        }
        _ => false,
    }
}
