use serde::{Deserialize, Serialize};

use crate::desc::{JvmType, MethodDescriptor};
use crate::insn::{Insn, Kind};
use crate::locate::{Anchor, component_matches};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Placement {
    Before,
    After,
    Wrap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HookFlag {
    /// Target method is static: no receiver is passed to the handler.
    Static,
    /// Call the handler with `invokestatic` instead of a lazily bound call site.
    Direct,
    /// Pass the value at the top of the stack as the handler's first argument.
    Capture,
    /// Skip the handler when already running inside one on this thread.
    AvoidRecursion,
    /// Return the handler's value from the target.
    ForceReturn,
    /// Box primitive arguments for `Object` handler parameters.
    BroadcastCoerce,
    /// Invert the boolean outcome fed to a conditional branch.
    BranchReversal,
    /// Store the handler's value into the site's local slot.
    StoreSlot,
    /// Escalate a miss through the notification channel.
    Important,
}

impl HookFlag {
    const ALL: [HookFlag; 9] = [
        HookFlag::Static,
        HookFlag::Direct,
        HookFlag::Capture,
        HookFlag::AvoidRecursion,
        HookFlag::ForceReturn,
        HookFlag::BroadcastCoerce,
        HookFlag::BranchReversal,
        HookFlag::StoreSlot,
        HookFlag::Important,
    ];

    const fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

/// Set of [`HookFlag`]s; serialized as a list of kebab-case names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Vec<HookFlag>", into = "Vec<HookFlag>")]
pub struct HookFlags(u16);

impl HookFlags {
    pub const NONE: HookFlags = HookFlags(0);

    #[inline]
    pub const fn contains(self, flag: HookFlag) -> bool {
        (self.0 & flag.bit()) != 0
    }

    #[inline]
    pub fn insert(&mut self, flag: HookFlag) {
        self.0 |= flag.bit();
    }

    #[inline]
    pub const fn with(self, flag: HookFlag) -> HookFlags {
        HookFlags(self.0 | flag.bit())
    }

    pub fn iter(self) -> impl Iterator<Item = HookFlag> {
        HookFlag::ALL.into_iter().filter(move |f| self.contains(*f))
    }
}

impl From<Vec<HookFlag>> for HookFlags {
    fn from(value: Vec<HookFlag>) -> Self {
        let mut flags = HookFlags::NONE;
        for flag in value {
            flags.insert(flag);
        }
        flags
    }
}

impl From<HookFlags> for Vec<HookFlag> {
    fn from(value: HookFlags) -> Self {
        value.iter().collect()
    }
}

impl<const N: usize> From<[HookFlag; N]> for HookFlags {
    fn from(value: [HookFlag; N]) -> Self {
        value.into_iter().collect::<Vec<_>>().into()
    }
}

/// How the hook names its target class.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TargetRef {
    /// Explicit type value, e.g. `Ldemo/Calc;`.
    #[serde(default, rename = "type")]
    pub ty: Option<JvmType>,
    /// Explicit name string, `demo.Calc` or `demo/Calc`.
    #[serde(default)]
    pub name: Option<String>,
}

/// Selects target methods by name and descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selector {
    pub name: String,
    #[serde(default)]
    pub desc: Option<String>,
    #[serde(default)]
    pub exact: bool,
}

impl Selector {
    pub fn exact(name: &str, desc: &str) -> Self {
        Self {
            name: name.to_string(),
            desc: Some(desc.to_string()),
            exact: true,
        }
    }

    pub fn matches(&self, name: &str, desc: &str) -> bool {
        component_matches(Some(&self.name), name, self.exact)
            && component_matches(self.desc.as_deref(), desc, self.exact)
    }

    /// The descriptor, when it names exactly one signature.
    pub fn exact_descriptor(&self) -> Option<MethodDescriptor> {
        let desc = self.desc.as_deref()?;
        if !self.exact && desc.contains('*') {
            return None;
        }
        MethodDescriptor::parse(desc).ok()
    }
}

/// Trailing handler parameter filled from a local slot of the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalCapture {
    pub kind: Kind,
    pub slot: u16,
}

impl LocalCapture {
    pub fn load(self) -> Insn {
        Insn::Load(self.kind, self.slot)
    }

    pub fn store(self) -> Insn {
        Insn::Store(self.kind, self.slot)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerParam {
    #[serde(rename = "type")]
    pub ty: JvmType,
    /// Slot to load this parameter from; such parameters must trail.
    #[serde(default)]
    pub local: Option<u16>,
    /// Snapshot this parameter's final value into the returned sentinel.
    #[serde(default, rename = "ref")]
    pub reference: bool,
}

impl HandlerParam {
    pub fn of(ty: JvmType) -> Self {
        Self {
            ty,
            local: None,
            reference: false,
        }
    }

    pub fn local(ty: JvmType, slot: u16) -> Self {
        Self {
            ty,
            local: Some(slot),
            reference: false,
        }
    }

    pub fn marked(mut self) -> Self {
        self.reference = true;
        self
    }
}

/// Declared signature of the handler method (always static).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerSignature {
    pub owner: String,
    pub name: String,
    #[serde(default)]
    pub params: Vec<HandlerParam>,
    #[serde(rename = "returns")]
    pub ret: JvmType,
}

impl HandlerSignature {
    pub fn new(owner: &str, name: &str, params: Vec<HandlerParam>, ret: JvmType) -> Self {
        Self {
            owner: crate::desc::internal_class_name(owner),
            name: name.to_string(),
            params,
            ret,
        }
    }

    pub fn descriptor(&self) -> MethodDescriptor {
        MethodDescriptor::new(self.params.iter().map(|p| p.ty.clone()).collect(), self.ret.clone())
    }

    /// `owner.name(desc)`, the handler's identity for call-site binding.
    pub fn identity(&self) -> String {
        format!("{}.{}{}", self.owner, self.name, self.descriptor())
    }
}

/// Declarative hook: what to call, where, and how to treat the result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookSpec {
    pub id: String,
    #[serde(default)]
    pub target: TargetRef,
    pub selector: Selector,
    pub placement: Placement,
    #[serde(default)]
    pub anchor: Anchor,
    #[serde(default)]
    pub jumps: Vec<Anchor>,
    #[serde(default)]
    pub flags: HookFlags,
    pub handler: HandlerSignature,
}

impl HookSpec {
    pub fn new(id: &str, selector: Selector, placement: Placement, handler: HandlerSignature) -> Self {
        Self {
            id: id.to_string(),
            target: TargetRef::default(),
            selector,
            placement,
            anchor: Anchor::Head,
            jumps: Vec::new(),
            flags: HookFlags::NONE,
            handler,
        }
    }

    pub fn target_class(mut self, name: &str) -> Self {
        self.target.name = Some(name.to_string());
        self
    }

    pub fn at(mut self, anchor: Anchor) -> Self {
        self.anchor = anchor;
        self
    }

    pub fn jump_to(mut self, anchor: Anchor) -> Self {
        self.jumps.push(anchor);
        self
    }

    pub fn flags(mut self, flags: impl Into<HookFlags>) -> Self {
        self.flags = flags.into();
        self
    }

    pub fn has(&self, flag: HookFlag) -> bool {
        self.flags.contains(flag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_serialize_as_kebab_case_names() {
        let flags: HookFlags = [HookFlag::AvoidRecursion, HookFlag::Static].into();
        let json = serde_json::to_string(&flags).expect("serialize");
        assert_eq!(json, r#"["static","avoid-recursion"]"#);
        let back: HookFlags = serde_json::from_str(r#"["force-return","capture"]"#).expect("parse");
        assert!(back.contains(HookFlag::ForceReturn));
        assert!(back.contains(HookFlag::Capture));
        assert!(!back.contains(HookFlag::Direct));
    }

    #[test]
    fn selector_exact_vs_wildcard() {
        let exact = Selector::exact("compute", "(I)I");
        assert!(exact.matches("compute", "(I)I"));
        assert!(!exact.matches("compute", "(J)J"));
        assert!(exact.exact_descriptor().is_some());

        let wild = Selector {
            name: "comp*".into(),
            desc: None,
            exact: false,
        };
        assert!(wild.matches("compute", "(J)J"));
        assert!(!wild.matches("decompose", "()V"));
        assert!(wild.exact_descriptor().is_none());
    }

    #[test]
    fn hook_spec_loads_from_yaml() {
        let yaml = r#"
id: calc-after
target: { name: demo.Calc }
selector: { name: compute, desc: "(I)I", exact: true }
placement: AFTER
anchor: { opcode: imul }
flags: [static, direct]
handler:
  owner: demo/Hooks
  name: onCompute
  params: [{ type: I }]
  returns: Lhookweave/runtime/HookResult;
"#;
        let spec: HookSpec = crate::config::Format::Yaml.parse(yaml).expect("yaml");
        assert_eq!(spec.placement, Placement::After);
        assert_eq!(spec.anchor, Anchor::Opcode("imul".into()));
        assert!(spec.has(HookFlag::Static));
        assert_eq!(spec.handler.descriptor().to_string(), "(I)Lhookweave/runtime/HookResult;");
        assert_eq!(spec.handler.identity(), "demo/Hooks.onCompute(I)Lhookweave/runtime/HookResult;");
    }
}
