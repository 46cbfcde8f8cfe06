//! Per-transform context: modification tracking, recomputation requests,
//! name remapping and diagnostics.

use std::collections::BTreeMap;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::analysis::{self, ComputeFlags};
use crate::class::{ClassNode, MethodKey};
use crate::desc::{JvmType, MethodDescriptor};

/// Translates class names (and descriptors mentioning them) across a remapped
/// boundary, e.g. from the names a hook was written against to the names the
/// loaded classes actually use.
#[derive(Debug, Clone, Default)]
pub struct NameMapper {
    classes: FxHashMap<String, String>,
}

impl NameMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: &BTreeMap<String, String>) -> Self {
        let mut mapper = Self::new();
        for (from, to) in map {
            mapper.insert(from, to);
        }
        mapper
    }

    pub fn insert(&mut self, from: &str, to: &str) {
        self.classes.insert(
            crate::desc::internal_class_name(from),
            crate::desc::internal_class_name(to),
        );
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn map_class(&self, name: &str) -> String {
        self.classes.get(name).cloned().unwrap_or_else(|| name.to_string())
    }

    pub fn map_type(&self, ty: &JvmType) -> JvmType {
        match ty {
            JvmType::Object(name) => JvmType::Object(self.map_class(name)),
            JvmType::Array(elem) => JvmType::Array(Box::new(self.map_type(elem))),
            other => other.clone(),
        }
    }

    /// Remaps a method or field descriptor; unparsable input is returned as is.
    pub fn map_desc(&self, desc: &str) -> String {
        if self.classes.is_empty() {
            return desc.to_string();
        }
        if desc.starts_with('(') {
            match MethodDescriptor::parse(desc) {
                Ok(parsed) => MethodDescriptor::new(
                    parsed.params.iter().map(|p| self.map_type(p)).collect(),
                    self.map_type(&parsed.ret),
                )
                .to_string(),
                Err(_) => desc.to_string(),
            }
        } else {
            match JvmType::parse(desc) {
                Ok(ty) => self.map_type(&ty).descriptor(),
                Err(_) => desc.to_string(),
            }
        }
    }
}

/// A HookSpec that located no sites.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteMiss {
    pub hook: String,
    pub class: String,
    pub method: Option<MethodKey>,
    pub important: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A handler call was woven into `method` at `sites` locations.
    Woven {
        hook: String,
        handler: String,
        class: String,
        method: MethodKey,
        sites: usize,
    },
    Missing(SiteMiss),
    /// The hook failed for this class; nothing it touched was kept.
    Failed { hook: String, class: String, error: String },
    /// A native method was turned into a forwarder.
    NativeRollback { class: String, method: MethodKey },
}

/// External channel for escalating misses of hooks marked `important`.
pub trait MissNotifier: Send + Sync {
    fn notify(&self, miss: &SiteMiss);
}

/// What the weaver needs from whoever drives the transform.
pub trait TransformContext {
    fn mark_modified(&mut self);
    /// Requests structural recomputation of `method` before the class is emitted.
    fn mark_compute(&mut self, method: &MethodKey, flags: ComputeFlags);
    fn mapper(&self) -> &NameMapper;
    fn report(&mut self, diagnostic: Diagnostic);
    /// Records a native rollback; returns `false` if it already happened in
    /// this pass.
    fn claim_native_rollback(&mut self, class: &str, method: &MethodKey) -> bool;
}

/// Default [`TransformContext`] for one class-transform invocation.
#[derive(Default)]
pub struct WeaveContext {
    modified: bool,
    compute: BTreeMap<MethodKey, ComputeFlags>,
    mapper: NameMapper,
    diagnostics: Vec<Diagnostic>,
    rolled_back: FxHashSet<(String, MethodKey)>,
    notifier: Option<Arc<dyn MissNotifier>>,
}

impl WeaveContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mapper(mut self, mapper: NameMapper) -> Self {
        self.mapper = mapper;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn MissNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    pub fn pending_compute(&self) -> impl Iterator<Item = (&MethodKey, &ComputeFlags)> {
        self.compute.iter()
    }

    /// Runs the recomputation requested for methods of `class`.
    pub fn finish(&mut self, class: &mut ClassNode) {
        for (key, flags) in std::mem::take(&mut self.compute) {
            if let Some(idx) = class.method_index(&key) {
                analysis::recompute(&mut class.methods[idx], flags);
            }
        }
    }
}

impl TransformContext for WeaveContext {
    fn mark_modified(&mut self) {
        self.modified = true;
    }

    fn mark_compute(&mut self, method: &MethodKey, flags: ComputeFlags) {
        self.compute.entry(method.clone()).or_default().insert(flags);
    }

    fn mapper(&self) -> &NameMapper {
        &self.mapper
    }

    fn report(&mut self, diagnostic: Diagnostic) {
        if let (Diagnostic::Missing(miss), Some(notifier)) = (&diagnostic, &self.notifier)
            && miss.important
        {
            notifier.notify(miss);
        }
        self.diagnostics.push(diagnostic);
    }

    fn claim_native_rollback(&mut self, class: &str, method: &MethodKey) -> bool {
        self.rolled_back.insert((class.to_string(), method.clone()))
    }
}
