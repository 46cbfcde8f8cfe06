//! Site location: maps an [`Anchor`] onto concrete instructions.
//!
//! The weaver only depends on the [`TargetLocator`] contract. [`AnchorLocator`]
//! is the reference implementation: deterministic, in list order, with
//! wildcard member patterns and slices.

use std::fmt;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::insn::{FieldOp, Insn, InsnId, InsnList, MemberRef};

/// Owner/name/descriptor pattern. With `exact` every present component must
/// match verbatim; otherwise `*` matches any run of characters.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MemberPattern {
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub desc: Option<String>,
    #[serde(default)]
    pub exact: bool,
}

impl MemberPattern {
    pub fn named(owner: &str, name: &str) -> Self {
        Self {
            owner: Some(owner.to_string()),
            name: Some(name.to_string()),
            desc: None,
            exact: false,
        }
    }

    pub fn exact(owner: &str, name: &str, desc: &str) -> Self {
        Self {
            owner: Some(owner.to_string()),
            name: Some(name.to_string()),
            desc: Some(desc.to_string()),
            exact: true,
        }
    }

    pub fn matches(&self, member: &MemberRef) -> bool {
        component_matches(self.owner.as_deref(), &member.owner, self.exact)
            && component_matches(self.name.as_deref(), &member.name, self.exact)
            && component_matches(self.desc.as_deref(), &member.desc, self.exact)
    }
}

impl fmt::Display for MemberPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}{}",
            self.owner.as_deref().unwrap_or("*"),
            self.name.as_deref().unwrap_or("*"),
            self.desc.as_deref().unwrap_or("")
        )
    }
}

static WILDCARDS: Lazy<DashMap<String, Regex>> = Lazy::new(DashMap::new);

/// `pattern` against `value`; `None` matches anything.
pub fn component_matches(pattern: Option<&str>, value: &str, exact: bool) -> bool {
    let Some(pattern) = pattern else {
        return true;
    };
    if exact || !pattern.contains('*') {
        return pattern == value;
    }
    wildcard_matches(pattern, value)
}

/// `*`-wildcard match of the whole `value`.
pub fn wildcard_matches(pattern: &str, value: &str) -> bool {
    if let Some(re) = WILDCARDS.get(pattern) {
        return re.is_match(value);
    }
    let source = format!(
        "^{}$",
        pattern.split('*').map(regex::escape).collect::<Vec<_>>().join(".*")
    );
    match Regex::new(&source) {
        Ok(re) => {
            let hit = re.is_match(value);
            WILDCARDS.insert(pattern.to_string(), re);
            hit
        }
        Err(_) => pattern == value,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Anchor {
    /// First instruction of the method body (labels skipped).
    #[default]
    Head,
    /// Method invocations matching the pattern.
    Invoke(MemberPattern),
    /// Field accesses matching the pattern, optionally restricted to one op.
    Field {
        #[serde(default)]
        op: Option<FieldOp>,
        #[serde(flatten)]
        pattern: MemberPattern,
    },
    /// Every return instruction.
    Return,
    /// Instructions whose mnemonic equals the given one (`imul`, `iload`, ...).
    Opcode(String),
    /// Region between two anchors; the site is the start match.
    Slice { from: Box<Anchor>, to: Box<Anchor> },
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anchor::Head => f.write_str("HEAD"),
            Anchor::Invoke(p) => write!(f, "INVOKE {}", p),
            Anchor::Field { op, pattern } => match op {
                Some(op) => write!(f, "FIELD {:?} {}", op, pattern),
                None => write!(f, "FIELD {}", pattern),
            },
            Anchor::Return => f.write_str("RETURN"),
            Anchor::Opcode(m) => write!(f, "OPCODE {}", m),
            Anchor::Slice { from, to } => write!(f, "SLICE [{} .. {}]", from, to),
        }
    }
}

/// Result of locating one anchor.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Located {
    pub sites: Vec<InsnId>,
    /// Instructions a slice asks to drop before weaving.
    pub removals: Vec<InsnId>,
}

/// A slice whose start or end did not match exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ambiguous {
    pub anchor: String,
    pub matches: usize,
}

pub trait TargetLocator: Send + Sync {
    /// Ordered matches of `anchor` in `code`. Identical input yields identical
    /// output.
    fn locate(&self, anchor: &Anchor, code: &InsnList) -> Result<Located, Ambiguous>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AnchorLocator;

impl AnchorLocator {
    fn simple_matches(anchor: &Anchor, code: &InsnList) -> Vec<InsnId> {
        match anchor {
            Anchor::Head => code.first_real().into_iter().collect(),
            _ => code
                .iter()
                .filter(|(_, insn)| Self::insn_matches(anchor, insn))
                .map(|(id, _)| id)
                .collect(),
        }
    }

    fn insn_matches(anchor: &Anchor, insn: &Insn) -> bool {
        match (anchor, insn) {
            (Anchor::Invoke(pattern), Insn::Invoke { method, .. }) => pattern.matches(method),
            (Anchor::Field { op, pattern }, Insn::Field { op: actual, field }) => {
                op.is_none_or(|op| op == *actual) && pattern.matches(field)
            }
            (Anchor::Return, Insn::Return(_)) => true,
            (Anchor::Opcode(mnemonic), insn) => !insn.is_pseudo() && insn.mnemonic() == *mnemonic,
            _ => false,
        }
    }

    fn unique(anchor: &Anchor, code: &InsnList) -> Result<InsnId, Ambiguous> {
        let hits = match anchor {
            Anchor::Slice { .. } => return Err(Ambiguous { anchor: anchor.to_string(), matches: 0 }),
            _ => Self::simple_matches(anchor, code),
        };
        match hits.as_slice() {
            [only] => Ok(*only),
            _ => Err(Ambiguous {
                anchor: anchor.to_string(),
                matches: hits.len(),
            }),
        }
    }
}

impl TargetLocator for AnchorLocator {
    fn locate(&self, anchor: &Anchor, code: &InsnList) -> Result<Located, Ambiguous> {
        match anchor {
            Anchor::Slice { from, to } => {
                let start = Self::unique(from, code)?;
                let end = Self::unique(to, code)?;
                let mut removals = Vec::new();
                let mut cursor = code.next(start);
                let mut reached_end = false;
                while let Some(id) = cursor {
                    if id == end {
                        reached_end = true;
                        break;
                    }
                    if code.get(id).is_some_and(|insn| !insn.is_pseudo()) {
                        removals.push(id);
                    }
                    cursor = code.next(id);
                }
                if !reached_end {
                    // End precedes start: nothing sensible to cut.
                    return Err(Ambiguous {
                        anchor: anchor.to_string(),
                        matches: 0,
                    });
                }
                Ok(Located {
                    sites: vec![start],
                    removals,
                })
            }
            _ => Ok(Located {
                sites: Self::simple_matches(anchor, code),
                removals: Vec::new(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Format;
    use crate::insn::{ArithOp, InvokeKind, Kind, LabelId};

    fn body() -> InsnList {
        vec![
            Insn::Label(LabelId(0)),
            Insn::Load(Kind::Int, 0),
            Insn::invoke(InvokeKind::Static, "demo/Log", "trace", "(I)V"),
            Insn::Load(Kind::Int, 0),
            Insn::Const(crate::insn::Constant::Int(2)),
            Insn::Arith(ArithOp::Mul, Kind::Int),
            Insn::invoke(InvokeKind::Static, "demo/Log", "traceAll", "(I)I"),
            Insn::Return(Some(Kind::Int)),
        ]
        .into()
    }

    #[test]
    fn head_skips_labels() {
        let code = body();
        let located = AnchorLocator.locate(&Anchor::Head, &code).expect("head");
        assert_eq!(located.sites.len(), 1);
        assert_eq!(code.get(located.sites[0]), Some(&Insn::Load(Kind::Int, 0)));
    }

    #[test]
    fn wildcard_and_exact_invoke_patterns() {
        let code = body();
        let wild = Anchor::Invoke(MemberPattern::named("demo/Log", "trace*"));
        assert_eq!(AnchorLocator.locate(&wild, &code).expect("wild").sites.len(), 2);

        let exact = Anchor::Invoke(MemberPattern::exact("demo/Log", "trace", "(I)V"));
        assert_eq!(AnchorLocator.locate(&exact, &code).expect("exact").sites.len(), 1);

        let mut literal = MemberPattern::named("demo/Log", "trace*");
        literal.exact = true;
        assert!(AnchorLocator.locate(&Anchor::Invoke(literal), &code).expect("lit").sites.is_empty());
    }

    #[test]
    fn slice_requires_unique_ends_and_collects_interior() {
        let code = body();
        let slice = Anchor::Slice {
            from: Box::new(Anchor::Invoke(MemberPattern::exact("demo/Log", "trace", "(I)V"))),
            to: Box::new(Anchor::Opcode("imul".into())),
        };
        let located = AnchorLocator.locate(&slice, &code).expect("slice");
        assert_eq!(located.sites.len(), 1);
        assert_eq!(located.removals.len(), 2);

        let ambiguous = Anchor::Slice {
            from: Box::new(Anchor::Opcode("iload".into())),
            to: Box::new(Anchor::Return),
        };
        let err = AnchorLocator.locate(&ambiguous, &code).expect_err("two iloads");
        assert_eq!(err.matches, 2);
    }

    #[test]
    fn wildcard_cache_is_shared_across_threads() {
        let handles: Vec<_> = (0..4)
            .map(|i| {
                std::thread::spawn(move || {
                    let name = format!("compute{}", i);
                    wildcard_matches("comp*e*", &name) && !wildcard_matches("comp*x", &name)
                })
            })
            .collect();
        assert!(handles.into_iter().all(|h| h.join().expect("thread")));
        assert!(WILDCARDS.contains_key("comp*e*"));
        assert!(component_matches(Some("(I)*"), "(I)J", false));
        assert!(!component_matches(Some("(I)*"), "(I)J", true));
    }

    #[test]
    fn anchors_deserialize_from_yaml() {
        let anchor: Anchor = Format::Yaml.parse("invoke: { owner: demo/Log, name: trace }").expect("yaml");
        assert_eq!(anchor, Anchor::Invoke(MemberPattern::named("demo/Log", "trace")));
        let anchor: Anchor = Format::Yaml.parse("head").expect("yaml");
        assert_eq!(anchor, Anchor::Head);
        let anchor: Anchor = Format::Yaml
            .parse("slice: { from: { opcode: iload }, to: return }")
            .expect("yaml");
        assert_eq!(
            anchor,
            Anchor::Slice {
                from: Box::new(Anchor::Opcode("iload".into())),
                to: Box::new(Anchor::Return),
            }
        );
    }
}
