//! Structured instruction model for compiled method bodies.
//!
//! The engine never sees class-file bytes: method bodies arrive as an editable
//! sequence of [`Insn`] values held in an [`InsnList`], with branch targets
//! expressed as [`LabelId`] handles into the method's [`LabelArena`].

mod display;
mod labels;
mod list;

pub use display::disassemble;
pub use labels::{LabelArena, LabelId, LabelOrigin};
pub use list::{InsnId, InsnList};

use serde::{Deserialize, Serialize};

use crate::desc::{JvmType, MethodDescriptor};

/// Computational kind of a value on the operand stack or in a local slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    Int,
    Long,
    Float,
    Double,
    Ref,
}

impl Kind {
    pub fn width(self) -> u16 {
        match self {
            Kind::Long | Kind::Double => 2,
            _ => 1,
        }
    }

    pub fn prefix(self) -> char {
        match self {
            Kind::Int => 'i',
            Kind::Long => 'l',
            Kind::Float => 'f',
            Kind::Double => 'd',
            Kind::Ref => 'a',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Constant {
    Null,
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(String),
    Class(String),
}

impl Constant {
    pub fn kind(&self) -> Kind {
        match self {
            Constant::Int(_) => Kind::Int,
            Constant::Long(_) => Kind::Long,
            Constant::Float(_) => Kind::Float,
            Constant::Double(_) => Kind::Double,
            Constant::Null | Constant::Str(_) | Constant::Class(_) => Kind::Ref,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Neg,
    And,
    Or,
    Xor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cond {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

impl Cond {
    pub fn test(self, ord: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            Cond::Eq => ord == Equal,
            Cond::Ne => ord != Equal,
            Cond::Lt => ord == Less,
            Cond::Ge => ord != Less,
            Cond::Gt => ord == Greater,
            Cond::Le => ord != Greater,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Cond::Eq => "eq",
            Cond::Ne => "ne",
            Cond::Lt => "lt",
            Cond::Ge => "ge",
            Cond::Gt => "gt",
            Cond::Le => "le",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JumpOp {
    /// Compare an int against zero.
    If(Cond),
    /// Compare two ints.
    IfICmp(Cond),
    IfACmpEq,
    IfACmpNe,
    IfNull,
    IfNonNull,
    Goto,
}

impl JumpOp {
    /// Operand-stack slots consumed by the test.
    pub fn operands(self) -> u16 {
        match self {
            JumpOp::If(_) | JumpOp::IfNull | JumpOp::IfNonNull => 1,
            JumpOp::IfICmp(_) | JumpOp::IfACmpEq | JumpOp::IfACmpNe => 2,
            JumpOp::Goto => 0,
        }
    }

    pub fn is_conditional(self) -> bool {
        !matches!(self, JumpOp::Goto)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvokeKind {
    Static,
    Virtual,
    Special,
    Interface,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldOp {
    GetStatic,
    PutStatic,
    GetField,
    PutField,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeOp {
    New,
    CheckCast,
    InstanceOf,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberRef {
    pub owner: String,
    pub name: String,
    pub desc: String,
}

impl MemberRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>, desc: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            desc: desc.into(),
        }
    }

    pub fn method_desc(&self) -> Option<MethodDescriptor> {
        MethodDescriptor::parse(&self.desc).ok()
    }

    pub fn field_type(&self) -> Option<JvmType> {
        JvmType::parse(&self.desc).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Insn {
    Label(LabelId),
    Nop,
    Const(Constant),
    Load(Kind, u16),
    Store(Kind, u16),
    Pop,
    Pop2,
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Swap,
    Arith(ArithOp, Kind),
    Jump(JumpOp, LabelId),
    TableSwitch {
        low: i32,
        default: LabelId,
        targets: Vec<LabelId>,
    },
    Invoke {
        kind: InvokeKind,
        method: MemberRef,
    },
    InvokeDynamic {
        name: String,
        desc: String,
        bootstrap: MemberRef,
        args: Vec<Constant>,
    },
    Field {
        op: FieldOp,
        field: MemberRef,
    },
    Type(TypeOp, String),
    Return(Option<Kind>),
    Throw,
}

impl Insn {
    pub fn invoke(kind: InvokeKind, owner: &str, name: &str, desc: &str) -> Insn {
        Insn::Invoke {
            kind,
            method: MemberRef::new(owner, name, desc),
        }
    }

    pub fn is_label(&self) -> bool {
        matches!(self, Insn::Label(_))
    }

    /// Pseudo instructions occupy no code and are skipped by locators.
    pub fn is_pseudo(&self) -> bool {
        self.is_label()
    }

    /// Whether control never falls through to the next instruction.
    pub fn ends_block(&self) -> bool {
        matches!(
            self,
            Insn::Jump(JumpOp::Goto, _) | Insn::TableSwitch { .. } | Insn::Return(_) | Insn::Throw
        )
    }

    pub fn is_return(&self) -> bool {
        matches!(self, Insn::Return(_))
    }

    /// Labels this instruction may transfer control to.
    pub fn branch_targets(&self) -> Vec<LabelId> {
        match self {
            Insn::Jump(_, target) => vec![*target],
            Insn::TableSwitch { default, targets, .. } => {
                let mut out = Vec::with_capacity(targets.len() + 1);
                out.extend(targets.iter().copied());
                out.push(*default);
                out
            }
            _ => Vec::new(),
        }
    }

    /// Lower-case mnemonic used by opcode anchors and the disassembler.
    pub fn mnemonic(&self) -> String {
        match self {
            Insn::Label(_) => "label".into(),
            Insn::Nop => "nop".into(),
            Insn::Const(c) => match c {
                Constant::Null => "aconst_null".into(),
                Constant::Int(_) => "iconst".into(),
                Constant::Long(_) => "lconst".into(),
                Constant::Float(_) => "fconst".into(),
                Constant::Double(_) => "dconst".into(),
                Constant::Str(_) | Constant::Class(_) => "ldc".into(),
            },
            Insn::Load(kind, _) => format!("{}load", kind.prefix()),
            Insn::Store(kind, _) => format!("{}store", kind.prefix()),
            Insn::Pop => "pop".into(),
            Insn::Pop2 => "pop2".into(),
            Insn::Dup => "dup".into(),
            Insn::DupX1 => "dup_x1".into(),
            Insn::DupX2 => "dup_x2".into(),
            Insn::Dup2 => "dup2".into(),
            Insn::Swap => "swap".into(),
            Insn::Arith(op, kind) => {
                let op = match op {
                    ArithOp::Add => "add",
                    ArithOp::Sub => "sub",
                    ArithOp::Mul => "mul",
                    ArithOp::Div => "div",
                    ArithOp::Rem => "rem",
                    ArithOp::Neg => "neg",
                    ArithOp::And => "and",
                    ArithOp::Or => "or",
                    ArithOp::Xor => "xor",
                };
                format!("{}{}", kind.prefix(), op)
            }
            Insn::Jump(op, _) => match op {
                JumpOp::If(c) => format!("if{}", c.name()),
                JumpOp::IfICmp(c) => format!("if_icmp{}", c.name()),
                JumpOp::IfACmpEq => "if_acmpeq".into(),
                JumpOp::IfACmpNe => "if_acmpne".into(),
                JumpOp::IfNull => "ifnull".into(),
                JumpOp::IfNonNull => "ifnonnull".into(),
                JumpOp::Goto => "goto".into(),
            },
            Insn::TableSwitch { .. } => "tableswitch".into(),
            Insn::Invoke { kind, .. } => match kind {
                InvokeKind::Static => "invokestatic".into(),
                InvokeKind::Virtual => "invokevirtual".into(),
                InvokeKind::Special => "invokespecial".into(),
                InvokeKind::Interface => "invokeinterface".into(),
            },
            Insn::InvokeDynamic { .. } => "invokedynamic".into(),
            Insn::Field { op, .. } => match op {
                FieldOp::GetStatic => "getstatic".into(),
                FieldOp::PutStatic => "putstatic".into(),
                FieldOp::GetField => "getfield".into(),
                FieldOp::PutField => "putfield".into(),
            },
            Insn::Type(op, _) => match op {
                TypeOp::New => "new".into(),
                TypeOp::CheckCast => "checkcast".into(),
                TypeOp::InstanceOf => "instanceof".into(),
            },
            Insn::Return(kind) => match kind {
                Some(kind) => format!("{}return", kind.prefix()),
                None => "return".into(),
            },
            Insn::Throw => "athrow".into(),
        }
    }

    /// Rewrites every label operand through `map`.
    pub fn remap_labels(&mut self, mut map: impl FnMut(LabelId) -> LabelId) {
        match self {
            Insn::Label(id) | Insn::Jump(_, id) => *id = map(*id),
            Insn::TableSwitch { default, targets, .. } => {
                *default = map(*default);
                for target in targets.iter_mut() {
                    *target = map(*target);
                }
            }
            _ => {}
        }
    }
}

/// Load instruction for a value of type `ty` in `slot`.
pub fn load_of(ty: &JvmType, slot: u16) -> Option<Insn> {
    ty.kind().map(|kind| Insn::Load(kind, slot))
}

/// Store instruction for a value of type `ty` into `slot`.
pub fn store_of(ty: &JvmType, slot: u16) -> Option<Insn> {
    ty.kind().map(|kind| Insn::Store(kind, slot))
}

/// Return instruction matching `ty`.
pub fn return_of(ty: &JvmType) -> Insn {
    Insn::Return(ty.kind())
}

/// Pop the value of type `ty` (nothing for void).
pub fn pop_of(ty: &JvmType) -> Option<Insn> {
    match ty.width() {
        0 => None,
        1 => Some(Insn::Pop),
        _ => Some(Insn::Pop2),
    }
}

/// Duplicate the top value of type `ty`.
pub fn dup_of(ty: &JvmType) -> Option<Insn> {
    match ty.width() {
        0 => None,
        1 => Some(Insn::Dup),
        _ => Some(Insn::Dup2),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mnemonics_follow_jvm_spelling() {
        assert_eq!(Insn::Arith(ArithOp::Mul, Kind::Int).mnemonic(), "imul");
        assert_eq!(Insn::Load(Kind::Ref, 0).mnemonic(), "aload");
        assert_eq!(Insn::Return(None).mnemonic(), "return");
        assert_eq!(Insn::Return(Some(Kind::Long)).mnemonic(), "lreturn");
        assert_eq!(Insn::Jump(JumpOp::IfICmp(Cond::Ge), LabelId(0)).mnemonic(), "if_icmpge");
    }

    #[test]
    fn branch_targets_include_switch_default() {
        let insn = Insn::TableSwitch {
            low: 0,
            default: LabelId(9),
            targets: vec![LabelId(1), LabelId(2)],
        };
        assert_eq!(insn.branch_targets(), vec![LabelId(1), LabelId(2), LabelId(9)]);
        assert!(insn.ends_block());
        assert!(!Insn::Jump(JumpOp::IfNull, LabelId(1)).ends_block());
    }

    #[test]
    fn typed_helpers_pick_width_aware_ops() {
        assert_eq!(dup_of(&JvmType::Long), Some(Insn::Dup2));
        assert_eq!(pop_of(&JvmType::Void), None);
        assert_eq!(return_of(&JvmType::Boolean), Insn::Return(Some(Kind::Int)));
        assert_eq!(load_of(&JvmType::object("x/Y"), 3), Some(Insn::Load(Kind::Ref, 3)));
    }
}
