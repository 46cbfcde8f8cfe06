//! Applying a prepared [`HookPlan`] to one class.

use crate::analysis::ComputeFlags;
use crate::class::{ClassNode, MethodKey, MethodNode};
use crate::context::{Diagnostic, NameMapper, SiteMiss, TransformContext};
use crate::desc::MethodDescriptor;
use crate::error::{Coordinates, WeaveError, WeaveResult};
use crate::insn::{Insn, LabelId};
use crate::locate::{Ambiguous, TargetLocator};
use crate::runtime::NATIVE_PREFIX;

use super::emit::{Emitter, site_shape};
use super::native;
use super::resolve::HookPlan;
use super::spec::{HookFlag, Placement, Selector};
use super::splice::{self, WrapOptions};

/// Changes made by one successful plan application, committed to the
/// context only once the whole class went through.
#[derive(Debug, Default)]
struct Woven {
    methods: Vec<(MethodKey, usize)>,
    rollbacks: Vec<MethodKey>,
}

impl Woven {
    fn sites(&self) -> usize {
        self.methods.iter().map(|(_, n)| n).sum()
    }
}

fn ambiguity(at: &Coordinates, err: Ambiguous) -> WeaveError {
    WeaveError::LocateAmbiguity {
        at: at.clone(),
        anchor: err.anchor,
        matches: err.matches,
    }
}

impl HookPlan {
    /// Whether this hook targets `class` once names are remapped.
    pub fn targets(&self, class: &str, mapper: &NameMapper) -> bool {
        mapper.map_class(&self.target_class) == class
    }

    /// `BEFORE` at the entry with `force-return` and a plain handler value
    /// replaces the whole body.
    pub fn is_full_override(&self) -> bool {
        self.spec.placement == Placement::Before
            && self.has(HookFlag::ForceReturn)
            && !self.returns_sentinel
            && !self.has(HookFlag::AvoidRecursion)
    }

    /// Weaves this hook into every selected method of `class`.
    ///
    /// All or nothing: on error the class methods are restored, a
    /// [`Diagnostic::Failed`] is reported and the error is returned. Returns
    /// the number of sites woven; zero is reported as a miss.
    pub fn apply(&self, class: &mut ClassNode, locator: &dyn TargetLocator, ctx: &mut dyn TransformContext) -> WeaveResult<usize> {
        let snapshot = class.methods.clone();
        let woven = match self.weave(class, locator, ctx.mapper()) {
            Ok(woven) => woven,
            Err(err) => {
                class.methods = snapshot;
                tracing::error!(target: "hookweave::weave", hook = %self.spec.id, class = %class.name, "{}", err);
                ctx.report(Diagnostic::Failed {
                    hook: self.spec.id.clone(),
                    class: class.name.clone(),
                    error: err.to_string(),
                });
                return Err(err);
            }
        };

        for key in &woven.rollbacks {
            ctx.mark_modified();
            ctx.mark_compute(key, ComputeFlags::ALL);
            if ctx.claim_native_rollback(&class.name, key) {
                tracing::info!(target: "hookweave::native", class = %class.name, method = %key, "native method rolled back");
                ctx.report(Diagnostic::NativeRollback {
                    class: class.name.clone(),
                    method: key.clone(),
                });
            }
        }

        let handler = self.spec.handler.identity();
        for (key, sites) in woven.methods.iter().filter(|(_, sites)| *sites > 0) {
            ctx.mark_modified();
            ctx.mark_compute(key, ComputeFlags::ALL);
            tracing::info!(
                target: "hookweave::weave",
                hook = %self.spec.id,
                handler = %handler,
                class = %class.name,
                method = %key,
                sites = *sites,
                "handler woven"
            );
            ctx.report(Diagnostic::Woven {
                hook: self.spec.id.clone(),
                handler: handler.clone(),
                class: class.name.clone(),
                method: key.clone(),
                sites: *sites,
            });
        }

        let total = woven.sites();
        if total == 0 {
            let important = self.has(HookFlag::Important);
            let method = match woven.methods.as_slice() {
                [(key, _)] => Some(key.clone()),
                _ => None,
            };
            if important {
                tracing::warn!(target: "hookweave::weave", hook = %self.spec.id, class = %class.name, "important hook matched no site");
            } else {
                tracing::debug!(target: "hookweave::weave", hook = %self.spec.id, class = %class.name, "hook matched no site");
            }
            ctx.report(Diagnostic::Missing(SiteMiss {
                hook: self.spec.id.clone(),
                class: class.name.clone(),
                method,
                important,
            }));
        }
        Ok(total)
    }

    fn selector(&self, mapper: &NameMapper) -> Selector {
        let mut selector = self.spec.selector.clone();
        if let Some(desc) = &selector.desc
            && (selector.exact || !desc.contains('*'))
        {
            selector.desc = Some(mapper.map_desc(desc));
        }
        selector
    }

    fn weave(&self, class: &mut ClassNode, locator: &dyn TargetLocator, mapper: &NameMapper) -> WeaveResult<Woven> {
        let owner = class.name.clone();
        let at = Coordinates::hook(&self.spec.id).in_class(&owner);
        let selector = self.selector(mapper);
        let selected: Vec<usize> = class
            .methods
            .iter()
            .enumerate()
            .filter(|(_, m)| !m.is_abstract() && !m.name.starts_with(NATIVE_PREFIX) && selector.matches(&m.name, &m.desc))
            .map(|(idx, _)| idx)
            .collect();

        let mut woven = Woven::default();
        for idx in selected {
            let key = class.methods[idx].key();
            let at = at.clone().in_method(key.to_string());
            let desc = class.methods[idx]
                .descriptor()
                .map_err(|e| WeaveError::config(at.clone(), e.to_string()))?;
            let is_static = class.methods[idx].is_static();
            self.check_target(&desc, is_static, mapper)
                .map_err(|msg| WeaveError::config(at.clone(), msg))?;

            if class.methods[idx].is_native() {
                native::roll_back(class, idx).map_err(|msg| WeaveError::config(at.clone(), msg))?;
                woven.rollbacks.push(key.clone());
            }

            let sites = self.weave_method(&mut class.methods[idx], &owner, &desc, locator, mapper, &at)?;
            woven.methods.push((key, sites));
        }
        Ok(woven)
    }

    fn weave_method(
        &self,
        method: &mut MethodNode,
        owner: &str,
        desc: &MethodDescriptor,
        locator: &dyn TargetLocator,
        mapper: &NameMapper,
        at: &Coordinates,
    ) -> WeaveResult<usize> {
        let config = |msg: String| WeaveError::config(at.clone(), msg);
        let hook = self.spec.id.as_str();
        // the arena is not serialized; generated labels must not reuse ids in the body
        method.sync_labels();
        let placement = self.spec.placement;
        let emitter = Emitter::new(self, mapper, owner, desc, method.is_static());

        if placement == Placement::Wrap {
            let shape = site_shape(&Insn::Nop, Placement::Wrap, desc);
            let fragment = emitter.fragment(&shape, &mut method.labels, &[]).map_err(config)?;
            let options = WrapOptions {
                capture: self.handler.capture.is_some(),
                force_return: self.has(HookFlag::ForceReturn),
            };
            splice::wrap(method, hook, fragment, options).map_err(config)?;
            return Ok(1);
        }

        let located = locator
            .locate(&self.spec.anchor, &method.code)
            .map_err(|e| ambiguity(at, e))?;
        for id in &located.removals {
            method.code.remove(*id);
        }
        if located.sites.is_empty() {
            return Ok(0);
        }

        // Resolve every jump label before any fragment lands next to a target.
        let mut jump_sites = Vec::with_capacity(self.spec.jumps.len());
        for anchor in &self.spec.jumps {
            let hit = locator.locate(anchor, &method.code).map_err(|e| ambiguity(at, e))?;
            match hit.sites.as_slice() {
                [only] => jump_sites.push(*only),
                other => {
                    return Err(WeaveError::LocateAmbiguity {
                        at: at.clone(),
                        anchor: anchor.to_string(),
                        matches: other.len(),
                    });
                }
            }
        }
        let jumps: Vec<LabelId> = jump_sites
            .into_iter()
            .map(|site| splice::jump_label(method, site, hook))
            .collect();

        if self.is_full_override()
            && let Some(head) = method.code.first_real()
            && located.sites.contains(&head)
        {
            let insn = method.code.get(head).cloned().unwrap_or(Insn::Nop);
            let shape = site_shape(&insn, Placement::Before, desc);
            let fragment = emitter.fragment(&shape, &mut method.labels, &jumps).map_err(config)?;
            splice::full_override(method, fragment);
            tracing::debug!(target: "hookweave::weave", hook, method = %method.key(), "body replaced by full override");
            return Ok(1);
        }

        for site in &located.sites {
            let Some(insn) = method.code.get(*site).cloned() else {
                continue;
            };
            let shape = site_shape(&insn, placement, desc);
            let fragment = emitter.fragment(&shape, &mut method.labels, &jumps).map_err(config)?;
            if placement == Placement::Before {
                splice::insert_before(method, *site, fragment);
            } else {
                splice::insert_after(method, *site, fragment);
            }
        }
        Ok(located.sites.len())
    }
}
