//! The hook-weaving engine.
//!
//! A [`HookSpec`] is resolved once into an immutable [`HookPlan`]; applying the
//! plan to a class locates sites, emits one fragment per site and splices it
//! in (see [`emit`] and [`splice`]).

pub mod emit;
pub mod native;
mod plan;
pub mod resolve;
pub mod snapshot;
pub mod spec;
pub mod splice;

pub use resolve::{HandlerDescriptor, HookPlan, MarkSource, ReferenceMark};
pub use snapshot::{SnapshotEntry, SnapshotTransform};
pub use spec::{
    HandlerParam, HandlerSignature, HookFlag, HookFlags, HookSpec, LocalCapture, Placement, Selector, TargetRef,
};
