pub mod analysis;
pub mod class;
pub mod config;
pub mod context;
pub mod desc;
pub mod error;
pub mod insn;
pub mod locate;
pub mod runtime;

// Hook resolution, code generation and splicing
pub mod hook;
pub mod weaver;

// Reference executor for woven code
pub mod exec;

pub use class::{AccessFlags, ClassNode, MethodKey, MethodNode};
pub use config::{ClassDocument, Format, HookDocument};
pub use context::{Diagnostic, MissNotifier, NameMapper, SiteMiss, TransformContext, WeaveContext};
pub use error::{WeaveError, WeaveResult};
pub use hook::{HookFlag, HookFlags, HookPlan, HookSpec, Placement};
pub use locate::{Anchor, AnchorLocator, TargetLocator};
pub use weaver::Weaver;
