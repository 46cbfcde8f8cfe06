//! Reference-snapshot sidecar: a dependent transform for the handler class.
//!
//! A hook whose handler marks parameters as references asks for the final
//! values of those parameters to travel back inside the returned sentinel.
//! The target-side restore is emitted with the fragment; this transform does
//! the handler-side capture before every `areturn`.

use crate::class::ClassNode;
use crate::context::NameMapper;
use crate::desc::JvmType;
use crate::insn::{Constant, Insn, InvokeKind, Kind};
use crate::runtime::{RESULT_CAPTURE, RESULT_CLASS};

use super::emit::box_insn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    /// Slot of the marked parameter inside the (static) handler.
    pub handler_slot: u16,
    pub ty: JvmType,
    /// Target-method slot the value is restored into; the sentinel map key.
    pub target_slot: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotTransform {
    pub hook: String,
    pub class: String,
    pub method: String,
    pub desc: String,
    pub entries: Vec<SnapshotEntry>,
}

impl SnapshotTransform {
    pub fn applies_to(&self, class: &str, mapper: &NameMapper) -> bool {
        mapper.map_class(&self.class) == class
    }

    /// Instruments every reference return of the handler method. Returns the
    /// number of returns rewritten.
    pub fn apply(&self, class: &mut ClassNode, mapper: &NameMapper) -> Result<usize, String> {
        let desc = mapper.map_desc(&self.desc);
        let method = class
            .method_mut(&self.method, &desc)
            .ok_or_else(|| format!("handler method {}{} not found", self.method, desc))?;
        if method.is_native() || method.is_abstract() {
            return Err(format!("handler method {}{} has no body to instrument", self.method, desc));
        }

        let mut capture = Vec::new();
        for entry in &self.entries {
            let kind = entry.ty.kind().ok_or("void snapshot entry")?;
            capture.push(Insn::Dup);
            capture.push(Insn::Const(Constant::Int(i32::from(entry.target_slot))));
            capture.push(Insn::Load(kind, entry.handler_slot));
            if entry.ty.is_primitive() {
                capture.push(box_insn(&entry.ty)?);
            }
            capture.push(Insn::invoke(InvokeKind::Virtual, RESULT_CLASS, RESULT_CAPTURE.0, RESULT_CAPTURE.1));
        }

        let returns: Vec<_> = method
            .code
            .iter()
            .filter(|(_, insn)| matches!(insn, Insn::Return(Some(Kind::Ref))))
            .map(|(id, _)| id)
            .collect();
        for id in &returns {
            method.code.insert_all_before(*id, capture.iter().cloned());
        }
        tracing::debug!(
            target: "hookweave::weave",
            hook = %self.hook,
            class = %class.name,
            method = %self.method,
            returns = returns.len(),
            "reference snapshot applied"
        );
        Ok(returns.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{AccessFlags, MethodNode};
    use crate::runtime::RESULT_DESC;

    #[test]
    fn captures_before_every_reference_return() {
        let desc = format!("(IJ){}", RESULT_DESC);
        let mut class = ClassNode::new("demo/Hooks").with_method(
            MethodNode::new("handle", desc.clone(), AccessFlags::STATIC).with_code(vec![
                Insn::Const(Constant::Null),
                Insn::Return(Some(Kind::Ref)),
            ]),
        );
        let transform = SnapshotTransform {
            hook: "h".into(),
            class: "demo/Hooks".into(),
            method: "handle".into(),
            desc,
            entries: vec![SnapshotEntry {
                handler_slot: 1,
                ty: JvmType::Long,
                target_slot: 2,
            }],
        };
        assert!(transform.applies_to("demo/Hooks", &NameMapper::new()));
        assert_eq!(transform.apply(&mut class, &NameMapper::new()), Ok(1));
        let code = class.methods[0].code.to_vec();
        assert_eq!(code.len(), 7);
        assert_eq!(code[1], Insn::Dup);
        assert_eq!(code[2], Insn::Const(Constant::Int(2)));
        assert_eq!(code[3], Insn::Load(Kind::Long, 1));
        assert_eq!(code[4], Insn::invoke(InvokeKind::Static, "java/lang/Long", "valueOf", "(J)Ljava/lang/Long;"));
        assert_eq!(code[6], Insn::Return(Some(Kind::Ref)));
    }
}
