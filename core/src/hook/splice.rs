//! Splicing generated fragments into a method body.

use crate::class::{MethodNode, TryCatchBlock};
use crate::insn::{Constant, Insn, InsnId, JumpOp, LabelId, return_of};

use super::emit::Fragment;

/// Fragment regions are innermost wherever they land, so they go to the
/// front of the exception table.
fn add_handlers(method: &mut MethodNode, handlers: Vec<TryCatchBlock>) {
    method.try_catch.splice(0..0, handlers);
}

pub fn insert_before(method: &mut MethodNode, site: InsnId, fragment: Fragment) {
    method.code.insert_all_before(site, fragment.code);
    add_handlers(method, fragment.handlers);
}

pub fn insert_after(method: &mut MethodNode, site: InsnId, fragment: Fragment) {
    method.code.insert_all_after(site, fragment.code);
    add_handlers(method, fragment.handlers);
}

/// Replaces the whole body (and its local-variable and exception tables)
/// with `fragment`.
pub fn full_override(method: &mut MethodNode, fragment: Fragment) {
    method.code.clear();
    method.locals.clear();
    method.try_catch = fragment.handlers;
    method.code.extend(fragment.code);
}

/// Label control can jump to so that `at` runs next: the label right before
/// it, or a new one.
pub fn jump_label(method: &mut MethodNode, at: InsnId, hook: &str) -> LabelId {
    if let Some(Insn::Label(label)) = method.code.prev(at).and_then(|prev| method.code.get(prev)) {
        return *label;
    }
    let label = method.labels.generated(hook);
    method.code.insert_before(at, Insn::Label(label));
    label
}

#[derive(Debug, Clone, Copy)]
pub struct WrapOptions {
    /// A captured value is expected on the stack at the exit label.
    pub capture: bool,
    /// Skip the catch-and-rethrow region.
    pub force_return: bool,
}

/// Routes every return through `fragment`, then the original return.
///
/// ```text
/// start:  <body, each xreturn rewritten to goto exit>
/// exit:   <fragment>
///         xreturn
/// end:
/// catch:  athrow            ; [start, end) -> catch, any type
/// ```
pub fn wrap(method: &mut MethodNode, hook: &str, fragment: Fragment, options: WrapOptions) -> Result<(), String> {
    let desc = method.descriptor().map_err(|e| e.to_string())?;
    let void = desc.ret.is_void();
    let start = method.labels.generated(hook);
    let exit = method.labels.generated(hook);
    let end = method.labels.generated(hook);

    let returns: Vec<InsnId> = method
        .code
        .iter()
        .filter(|(_, insn)| insn.is_return())
        .map(|(id, _)| id)
        .collect();
    for id in returns {
        if void && options.capture {
            method.code.insert_before(id, Insn::Const(Constant::Null));
        }
        if let Some(insn) = method.code.get_mut(id) {
            *insn = Insn::Jump(JumpOp::Goto, exit);
        }
    }

    match method.code.first() {
        Some(first) => {
            method.code.insert_before(first, Insn::Label(start));
        }
        None => {
            method.code.push(Insn::Label(start));
        }
    }
    method.code.push(Insn::Label(exit));
    method.code.extend(fragment.code);
    if void && options.capture {
        method.code.push(Insn::Pop);
    }
    method.code.push(return_of(&desc.ret));
    method.code.push(Insn::Label(end));

    if !options.force_return {
        let catch = method.labels.generated(hook);
        method.code.push(Insn::Label(catch));
        method.code.push(Insn::Throw);
        method.try_catch.push(TryCatchBlock {
            start,
            end,
            handler: catch,
            catch_type: None,
        });
    }
    add_handlers(method, fragment.handlers);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::AccessFlags;
    use crate::insn::{Cond, Kind};

    fn method() -> MethodNode {
        MethodNode::new("f", "(I)V", AccessFlags::STATIC).with_code(vec![
            Insn::Load(Kind::Int, 0),
            Insn::Jump(JumpOp::If(Cond::Eq), LabelId(0)),
            Insn::Return(None),
            Insn::Label(LabelId(0)),
            Insn::Return(None),
        ])
    }

    #[test]
    fn jump_label_reuses_preceding_label() {
        let mut m = method();
        let ids = m.code.ids();
        assert_eq!(jump_label(&mut m, ids[4], "h"), LabelId(0));
        let fresh = jump_label(&mut m, ids[0], "h");
        assert_ne!(fresh, LabelId(0));
        assert_eq!(m.code.get(m.code.first().expect("first")), Some(&Insn::Label(fresh)));
    }

    #[test]
    fn wrap_redirects_returns_and_adds_catch_region() {
        let mut m = method();
        wrap(
            &mut m,
            "h",
            Fragment {
                code: vec![Insn::Pop],
                handlers: Vec::new(),
            },
            WrapOptions {
                capture: true,
                force_return: false,
            },
        )
        .expect("wrap");
        let code = m.code.to_vec();
        assert!(matches!(code[0], Insn::Label(_)));
        let gotos = code.iter().filter(|i| matches!(i, Insn::Jump(JumpOp::Goto, _))).count();
        assert_eq!(gotos, 2);
        let markers = code.iter().filter(|i| **i == Insn::Const(Constant::Null)).count();
        assert_eq!(markers, 2);
        assert_eq!(code.iter().filter(|i| i.is_return()).count(), 1);
        assert_eq!(code.last(), Some(&Insn::Throw));
        assert_eq!(m.try_catch.len(), 1);
        assert_eq!(m.try_catch[0].catch_type, None);
    }

    #[test]
    fn fragment_regions_precede_existing_handlers() {
        let mut m = method();
        let outer = TryCatchBlock {
            start: LabelId(0),
            end: LabelId(0),
            handler: LabelId(0),
            catch_type: Some("java/lang/Exception".into()),
        };
        m.try_catch.push(outer.clone());
        let inner = TryCatchBlock {
            start: LabelId(7),
            end: LabelId(8),
            handler: LabelId(9),
            catch_type: None,
        };
        let site = m.code.ids()[0];
        insert_before(
            &mut m,
            site,
            Fragment {
                code: vec![Insn::Label(LabelId(7)), Insn::Nop, Insn::Label(LabelId(8))],
                handlers: vec![inner.clone()],
            },
        );
        assert_eq!(m.try_catch, vec![inner, outer]);
    }

    #[test]
    fn full_override_drops_tables() {
        let mut m = method();
        m.try_catch.push(TryCatchBlock {
            start: LabelId(0),
            end: LabelId(0),
            handler: LabelId(0),
            catch_type: None,
        });
        full_override(
            &mut m,
            Fragment {
                code: vec![Insn::Return(None)],
                handlers: Vec::new(),
            },
        );
        assert_eq!(m.code.to_vec(), vec![Insn::Return(None)]);
        assert!(m.try_catch.is_empty());
    }
}
