//! In-memory class and method nodes the weaver edits.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::analysis::FrameState;
use crate::desc::{DescriptorError, MethodDescriptor};
use crate::insn::{Insn, InsnList, LabelArena, LabelId};

/// JVM access flags for classes, fields and methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AccessFlags(u16);

impl AccessFlags {
    pub const NONE: AccessFlags = AccessFlags(0);
    pub const PUBLIC: AccessFlags = AccessFlags(0x0001);
    pub const PRIVATE: AccessFlags = AccessFlags(0x0002);
    pub const PROTECTED: AccessFlags = AccessFlags(0x0004);
    pub const STATIC: AccessFlags = AccessFlags(0x0008);
    pub const FINAL: AccessFlags = AccessFlags(0x0010);
    pub const NATIVE: AccessFlags = AccessFlags(0x0100);
    pub const ABSTRACT: AccessFlags = AccessFlags(0x0400);
    pub const SYNTHETIC: AccessFlags = AccessFlags(0x1000);

    const NAMES: [(AccessFlags, &'static str); 8] = [
        (AccessFlags::PUBLIC, "public"),
        (AccessFlags::PRIVATE, "private"),
        (AccessFlags::PROTECTED, "protected"),
        (AccessFlags::STATIC, "static"),
        (AccessFlags::FINAL, "final"),
        (AccessFlags::NATIVE, "native"),
        (AccessFlags::ABSTRACT, "abstract"),
        (AccessFlags::SYNTHETIC, "synthetic"),
    ];

    #[inline]
    pub const fn bits(self) -> u16 {
        self.0
    }

    #[inline]
    pub const fn from_bits(bits: u16) -> AccessFlags {
        AccessFlags(bits)
    }

    #[inline]
    pub const fn contains(self, other: AccessFlags) -> bool {
        (self.0 & other.0) == other.0
    }

    #[inline]
    pub fn insert(&mut self, other: AccessFlags) {
        self.0 |= other.0;
    }

    #[inline]
    pub fn remove(&mut self, other: AccessFlags) {
        self.0 &= !other.0;
    }

    #[inline]
    pub const fn union(self, other: AccessFlags) -> AccessFlags {
        AccessFlags(self.0 | other.0)
    }

    fn names(self) -> Vec<&'static str> {
        Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl fmt::Display for AccessFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.names().join(" "))
    }
}

impl Serialize for AccessFlags {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.names().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for AccessFlags {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let names = Vec::<String>::deserialize(deserializer)?;
        let mut flags = AccessFlags::NONE;
        for name in names {
            let flag = Self::NAMES
                .iter()
                .find(|(_, n)| *n == name)
                .map(|(flag, _)| *flag)
                .ok_or_else(|| serde::de::Error::custom(format!("unknown access flag '{}'", name)))?;
            flags.insert(flag);
        }
        Ok(flags)
    }
}

/// Identity of a method inside its class.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodKey {
    pub name: String,
    pub desc: String,
}

impl MethodKey {
    pub fn new(name: impl Into<String>, desc: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            desc: desc.into(),
        }
    }
}

impl fmt::Display for MethodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.desc)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TryCatchBlock {
    pub start: LabelId,
    pub end: LabelId,
    pub handler: LabelId,
    /// `None` catches everything.
    #[serde(default)]
    pub catch_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalVariable {
    pub name: String,
    pub desc: String,
    pub slot: u16,
    pub start: LabelId,
    pub end: LabelId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldNode {
    pub name: String,
    pub desc: String,
    #[serde(default)]
    pub access: AccessFlags,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodNode {
    pub name: String,
    pub desc: String,
    #[serde(default)]
    pub access: AccessFlags,
    #[serde(default)]
    pub code: InsnList,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub try_catch: Vec<TryCatchBlock>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locals: Vec<LocalVariable>,
    #[serde(default)]
    pub max_stack: u16,
    #[serde(default)]
    pub max_locals: u16,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub frames: Vec<FrameState>,
    #[serde(skip)]
    pub labels: LabelArena,
}

impl MethodNode {
    pub fn new(name: impl Into<String>, desc: impl Into<String>, access: AccessFlags) -> Self {
        Self {
            name: name.into(),
            desc: desc.into(),
            access,
            code: InsnList::new(),
            try_catch: Vec::new(),
            locals: Vec::new(),
            max_stack: 0,
            max_locals: 0,
            frames: Vec::new(),
            labels: LabelArena::new(),
        }
    }

    pub fn with_code(mut self, code: Vec<Insn>) -> Self {
        self.code = code.into();
        self.sync_labels();
        self
    }

    pub fn with_try_catch(mut self, block: TryCatchBlock) -> Self {
        self.try_catch.push(block);
        self.sync_labels();
        self
    }

    pub fn key(&self) -> MethodKey {
        MethodKey::new(self.name.clone(), self.desc.clone())
    }

    pub fn descriptor(&self) -> Result<MethodDescriptor, DescriptorError> {
        MethodDescriptor::parse(&self.desc)
    }

    pub fn is_static(&self) -> bool {
        self.access.contains(AccessFlags::STATIC)
    }

    pub fn is_native(&self) -> bool {
        self.access.contains(AccessFlags::NATIVE)
    }

    pub fn is_abstract(&self) -> bool {
        self.access.contains(AccessFlags::ABSTRACT)
    }

    /// Makes the label arena cover every label id referenced by the body,
    /// exception table and local-variable table. Needed after deserializing.
    pub fn sync_labels(&mut self) {
        let mut max: Option<LabelId> = None;
        let mut bump = |id: LabelId| {
            if max.is_none_or(|m| id > m) {
                max = Some(id);
            }
        };
        for (_, insn) in self.code.iter() {
            if let Insn::Label(id) = insn {
                bump(*id);
            }
            for target in insn.branch_targets() {
                bump(target);
            }
        }
        for block in &self.try_catch {
            bump(block.start);
            bump(block.end);
            bump(block.handler);
        }
        for local in &self.locals {
            bump(local.start);
            bump(local.end);
        }
        if let Some(max) = max {
            self.labels.ensure(max);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassNode {
    pub name: String,
    #[serde(default)]
    pub super_name: Option<String>,
    #[serde(default)]
    pub access: AccessFlags,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldNode>,
    #[serde(default)]
    pub methods: Vec<MethodNode>,
}

impl ClassNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            super_name: Some(crate::desc::OBJECT_CLASS.to_string()),
            access: AccessFlags::PUBLIC,
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn with_method(mut self, method: MethodNode) -> Self {
        self.methods.push(method);
        self
    }

    pub fn with_field(mut self, field: FieldNode) -> Self {
        self.fields.push(field);
        self
    }

    pub fn method(&self, name: &str, desc: &str) -> Option<&MethodNode> {
        self.methods.iter().find(|m| m.name == name && m.desc == desc)
    }

    pub fn method_mut(&mut self, name: &str, desc: &str) -> Option<&mut MethodNode> {
        self.methods.iter_mut().find(|m| m.name == name && m.desc == desc)
    }

    pub fn method_index(&self, key: &MethodKey) -> Option<usize> {
        self.methods.iter().position(|m| m.name == key.name && m.desc == key.desc)
    }

    pub fn sync_labels(&mut self) {
        for method in &mut self.methods {
            method.sync_labels();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insn::JumpOp;

    #[test]
    fn access_flags_round_trip_through_names() {
        let flags = AccessFlags::PRIVATE.union(AccessFlags::STATIC).union(AccessFlags::NATIVE);
        let json = serde_json::to_string(&flags).expect("serialize");
        assert_eq!(json, r#"["private","static","native"]"#);
        let back: AccessFlags = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, flags);
        assert!(serde_json::from_str::<AccessFlags>(r#"["bogus"]"#).is_err());
    }

    #[test]
    fn sync_labels_covers_branch_targets_and_handlers() {
        let mut method = MethodNode::new("f", "()V", AccessFlags::STATIC).with_code(vec![
            Insn::Label(LabelId(0)),
            Insn::Jump(JumpOp::Goto, LabelId(4)),
            Insn::Label(LabelId(4)),
            Insn::Return(None),
        ]);
        assert_eq!(method.labels.len(), 5);
        method.try_catch.push(TryCatchBlock {
            start: LabelId(0),
            end: LabelId(4),
            handler: LabelId(7),
            catch_type: None,
        });
        method.sync_labels();
        assert_eq!(method.labels.len(), 8);
        assert_eq!(method.labels.generated("h"), LabelId(8));
        assert!(method.is_static());
        assert_eq!(method.key().to_string(), "f()V");
    }
}
