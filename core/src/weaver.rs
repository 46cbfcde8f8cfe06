//! Driver: applies prepared hook plans to one class at a time.

use std::sync::Arc;

use crate::analysis::ComputeFlags;
use crate::class::{ClassNode, MethodKey};
use crate::context::{Diagnostic, TransformContext, WeaveContext};
use crate::error::{WeaveError, WeaveResult};
use crate::hook::{HookPlan, HookSpec, SnapshotTransform};
use crate::locate::{AnchorLocator, TargetLocator};

/// Holds every registered plan plus the dependent transforms they produced.
///
/// Immutable once built and shared freely between transforming threads; each
/// call to [`Weaver::transform`] only touches the class it is given.
#[derive(Clone)]
pub struct Weaver {
    plans: Vec<Arc<HookPlan>>,
    snapshots: Vec<Arc<SnapshotTransform>>,
    locator: Arc<dyn TargetLocator>,
}

impl Default for Weaver {
    fn default() -> Self {
        Self::new()
    }
}

impl Weaver {
    pub fn new() -> Self {
        Self {
            plans: Vec::new(),
            snapshots: Vec::new(),
            locator: Arc::new(AnchorLocator),
        }
    }

    pub fn with_locator(mut self, locator: Arc<dyn TargetLocator>) -> Self {
        self.locator = locator;
        self
    }

    /// Resolves `spec` and keeps the plan. A spec that fails setup is not
    /// registered.
    pub fn register(&mut self, spec: HookSpec) -> WeaveResult<Arc<HookPlan>> {
        let plan = Arc::new(HookPlan::prepare(spec)?);
        if let Some(snapshot) = plan.snapshot() {
            self.snapshots.push(Arc::new(snapshot));
        }
        self.plans.push(plan.clone());
        Ok(plan)
    }

    /// Registers every spec, collecting setup errors instead of stopping.
    pub fn from_specs(specs: impl IntoIterator<Item = HookSpec>) -> (Self, Vec<WeaveError>) {
        let mut weaver = Self::new();
        let mut errors = Vec::new();
        for spec in specs {
            if let Err(err) = weaver.register(spec) {
                errors.push(err);
            }
        }
        (weaver, errors)
    }

    pub fn plans(&self) -> &[Arc<HookPlan>] {
        &self.plans
    }

    pub fn snapshots(&self) -> &[Arc<SnapshotTransform>] {
        &self.snapshots
    }

    /// Weaves every applicable plan into `class`, in registration order, then
    /// runs the dependent snapshot transforms aimed at it. Returns the number
    /// of sites woven.
    pub fn transform(&self, class: &mut ClassNode, ctx: &mut dyn TransformContext) -> usize {
        let mut sites = 0;
        for plan in &self.plans {
            if !plan.targets(&class.name, ctx.mapper()) {
                continue;
            }
            // Failures are reported through the context; the class is left
            // as it was before this plan.
            if let Ok(n) = plan.apply(class, self.locator.as_ref(), ctx) {
                sites += n;
            }
        }
        for snapshot in &self.snapshots {
            if !snapshot.applies_to(&class.name, ctx.mapper()) {
                continue;
            }
            let before = class.methods.clone();
            match snapshot.apply(class, ctx.mapper()) {
                Ok(returns) => {
                    ctx.mark_modified();
                    let key = MethodKey::new(snapshot.method.clone(), ctx.mapper().map_desc(&snapshot.desc));
                    ctx.mark_compute(&key, ComputeFlags::ALL);
                    tracing::debug!(target: "hookweave::weave", hook = %snapshot.hook, returns, "snapshot transform done");
                }
                Err(msg) => {
                    class.methods = before;
                    tracing::error!(target: "hookweave::weave", hook = %snapshot.hook, class = %class.name, "{}", msg);
                    ctx.report(Diagnostic::Failed {
                        hook: snapshot.hook.clone(),
                        class: class.name.clone(),
                        error: msg,
                    });
                }
            }
        }
        sites
    }

    /// [`Weaver::transform`] plus the structural recomputation requested on
    /// `ctx`. Returns whether the class changed.
    pub fn transform_class(&self, class: &mut ClassNode, ctx: &mut WeaveContext) -> bool {
        self.transform(class, ctx);
        ctx.finish(class);
        ctx.is_modified()
    }
}
