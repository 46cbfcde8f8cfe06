//! Native-method rollback.
//!
//! A native method has no body to weave into. It is split into a renamed
//! native sibling, which the runtime still binds to the original symbol, and
//! a plain forwarder under the original name that later weaving targets.

use crate::class::{AccessFlags, ClassNode, MethodKey, MethodNode};
use crate::insn::{Insn, InvokeKind, Kind, load_of, return_of};
use crate::runtime::native_sibling_name;

/// Rewrites `class.methods[idx]` into a forwarder and appends the sibling.
pub fn roll_back(class: &mut ClassNode, idx: usize) -> Result<MethodKey, String> {
    let method = &class.methods[idx];
    let desc = method.descriptor().map_err(|e| e.to_string())?;
    let sibling_name = native_sibling_name(&method.name);
    if class.method(&sibling_name, &method.desc).is_some() {
        return Err(format!("{}{} already has a native sibling", method.name, method.desc));
    }

    let is_static = method.is_static();
    let mut access = AccessFlags::PRIVATE.union(AccessFlags::FINAL).union(AccessFlags::NATIVE);
    if is_static {
        access.insert(AccessFlags::STATIC);
    }
    let sibling = MethodNode::new(sibling_name.clone(), method.desc.clone(), access);

    let mut body = Vec::with_capacity(desc.params.len() + 3);
    let base = if is_static { 0 } else { 1 };
    if !is_static {
        body.push(Insn::Load(Kind::Ref, 0));
    }
    for (ty, slot) in desc.params.iter().zip(desc.param_slots(base)) {
        body.extend(load_of(ty, slot));
    }
    let kind = if is_static { InvokeKind::Static } else { InvokeKind::Virtual };
    body.push(Insn::invoke(kind, &class.name, &sibling_name, &method.desc));
    body.push(return_of(&desc.ret));

    let key = method.key();
    let forwarder = &mut class.methods[idx];
    forwarder.access.remove(AccessFlags::NATIVE);
    forwarder.code = body.into();
    forwarder.try_catch.clear();
    forwarder.locals.clear();
    class.methods.push(sibling);

    tracing::debug!(target: "hookweave::native", class = %class.name, method = %key, "native method rolled back");
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_native_becomes_forwarder_plus_sibling() {
        let mut class = ClassNode::new("demo/Io")
            .with_method(MethodNode::new("read", "(IJ)I", AccessFlags::PUBLIC.union(AccessFlags::NATIVE)));
        let key = roll_back(&mut class, 0).expect("rollback");
        assert_eq!(key, MethodKey::new("read", "(IJ)I"));

        let forwarder = &class.methods[0];
        assert!(!forwarder.is_native());
        assert_eq!(
            forwarder.code.to_vec(),
            vec![
                Insn::Load(Kind::Ref, 0),
                Insn::Load(Kind::Int, 1),
                Insn::Load(Kind::Long, 2),
                Insn::invoke(InvokeKind::Virtual, "demo/Io", "$hookweave$read", "(IJ)I"),
                Insn::Return(Some(Kind::Int)),
            ]
        );

        let sibling = &class.methods[1];
        assert_eq!(sibling.name, "$hookweave$read");
        assert!(sibling.is_native());
        assert!(sibling.access.contains(AccessFlags::PRIVATE.union(AccessFlags::FINAL)));
        assert!(!sibling.is_static());

        assert!(roll_back(&mut class, 0).is_err());
    }
}
