use std::fmt;

use super::{Constant, Insn, InsnList};

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Null => f.write_str("null"),
            Constant::Int(v) => write!(f, "{}", v),
            Constant::Long(v) => write!(f, "{}L", v),
            Constant::Float(v) => write!(f, "{}F", v),
            Constant::Double(v) => write!(f, "{}D", v),
            Constant::Str(s) => write!(f, "{:?}", s),
            Constant::Class(c) => write!(f, "{}.class", c),
        }
    }
}

impl fmt::Display for Insn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Insn::Label(id) => write!(f, "L{}:", id.0),
            Insn::Const(Constant::Null) => f.write_str("aconst_null"),
            Insn::Const(c) => write!(f, "{} {}", self.mnemonic(), c),
            Insn::Load(_, slot) | Insn::Store(_, slot) => write!(f, "{} {}", self.mnemonic(), slot),
            Insn::Jump(_, target) => write!(f, "{} L{}", self.mnemonic(), target.0),
            Insn::TableSwitch { low, default, targets } => {
                write!(f, "tableswitch {}", low)?;
                for target in targets {
                    write!(f, " L{}", target.0)?;
                }
                write!(f, " default:L{}", default.0)
            }
            Insn::Invoke { method, .. } => {
                write!(f, "{} {}.{}{}", self.mnemonic(), method.owner, method.name, method.desc)
            }
            Insn::InvokeDynamic {
                name, desc, bootstrap, ..
            } => write!(
                f,
                "invokedynamic {}{} [{}.{}]",
                name, desc, bootstrap.owner, bootstrap.name
            ),
            Insn::Field { field, .. } => {
                write!(f, "{} {}.{}:{}", self.mnemonic(), field.owner, field.name, field.desc)
            }
            Insn::Type(_, ty) => write!(f, "{} {}", self.mnemonic(), ty),
            _ => f.write_str(&self.mnemonic()),
        }
    }
}

/// One instruction per line, labels flush left and code indented.
pub fn disassemble(list: &InsnList) -> String {
    let mut out = String::new();
    for (_, insn) in list.iter() {
        if !insn.is_label() {
            out.push_str("    ");
        }
        out.push_str(&insn.to_string());
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insn::{InvokeKind, JumpOp, Kind, LabelId};

    #[test]
    fn renders_operands() {
        let list: InsnList = vec![
            Insn::Label(LabelId(0)),
            Insn::Load(Kind::Int, 1),
            Insn::Const(Constant::Str("hi".into())),
            Insn::invoke(InvokeKind::Static, "demo/A", "f", "(I)V"),
            Insn::Jump(JumpOp::Goto, LabelId(0)),
        ]
        .into();
        assert_eq!(
            disassemble(&list),
            "L0:\n    iload 1\n    ldc \"hi\"\n    invokestatic demo/A.f(I)V\n    goto L0\n"
        );
    }
}
