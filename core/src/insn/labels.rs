use serde::{Deserialize, Serialize};

/// Handle into a method's [`LabelArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelId(pub u32);

impl LabelId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Where a label came from. Generated labels remember the hook that created them
/// so disassembly and diagnostics can attribute synthetic control flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelOrigin {
    Original,
    Generated { hook: String },
}

/// Arena of label descriptors for one method.
///
/// Labels are referenced only by [`LabelId`]; the arena owns any metadata that
/// would otherwise be attached to the label itself.
#[derive(Debug, Clone, Default)]
pub struct LabelArena {
    entries: Vec<LabelOrigin>,
}

impl LabelArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arena covering label ids `0..count`, all marked as original.
    pub fn with_original(count: usize) -> Self {
        Self {
            entries: vec![LabelOrigin::Original; count],
        }
    }

    pub fn fresh(&mut self, origin: LabelOrigin) -> LabelId {
        let id = LabelId(self.entries.len() as u32);
        self.entries.push(origin);
        id
    }

    pub fn generated(&mut self, hook: &str) -> LabelId {
        self.fresh(LabelOrigin::Generated { hook: hook.to_string() })
    }

    /// Grows the arena so `id` is addressable.
    pub fn ensure(&mut self, id: LabelId) {
        while self.entries.len() <= id.index() {
            self.entries.push(LabelOrigin::Original);
        }
    }

    pub fn origin(&self, id: LabelId) -> Option<&LabelOrigin> {
        self.entries.get(id.index())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
