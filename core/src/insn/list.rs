use serde::{Deserialize, Serialize};

use super::Insn;

/// Stable handle to a node in an [`InsnList`]. Handles survive inserts and
/// removals elsewhere in the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InsnId(u32);

impl InsnId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
struct Node {
    insn: Insn,
    prev: Option<InsnId>,
    next: Option<InsnId>,
    live: bool,
}

/// Arena-backed doubly linked instruction list.
///
/// Insertion relative to an existing handle is O(1); removed nodes stay in the
/// arena as tombstones so outstanding handles never alias a different node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Insn>", into = "Vec<Insn>")]
pub struct InsnList {
    nodes: Vec<Node>,
    head: Option<InsnId>,
    tail: Option<InsnId>,
    len: usize,
}

impl InsnList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn first(&self) -> Option<InsnId> {
        self.head
    }

    pub fn last(&self) -> Option<InsnId> {
        self.tail
    }

    pub fn next(&self, id: InsnId) -> Option<InsnId> {
        self.node(id).and_then(|n| n.next)
    }

    pub fn prev(&self, id: InsnId) -> Option<InsnId> {
        self.node(id).and_then(|n| n.prev)
    }

    pub fn get(&self, id: InsnId) -> Option<&Insn> {
        self.node(id).map(|n| &n.insn)
    }

    pub fn get_mut(&mut self, id: InsnId) -> Option<&mut Insn> {
        match self.nodes.get_mut(id.index()) {
            Some(node) if node.live => Some(&mut node.insn),
            _ => None,
        }
    }

    pub fn contains(&self, id: InsnId) -> bool {
        self.node(id).is_some()
    }

    fn node(&self, id: InsnId) -> Option<&Node> {
        self.nodes.get(id.index()).filter(|n| n.live)
    }

    fn alloc(&mut self, insn: Insn) -> InsnId {
        let id = InsnId(self.nodes.len() as u32);
        self.nodes.push(Node {
            insn,
            prev: None,
            next: None,
            live: true,
        });
        self.len += 1;
        id
    }

    pub fn push(&mut self, insn: Insn) -> InsnId {
        let id = self.alloc(insn);
        match self.tail {
            Some(tail) => {
                self.nodes[tail.index()].next = Some(id);
                self.nodes[id.index()].prev = Some(tail);
            }
            None => self.head = Some(id),
        }
        self.tail = Some(id);
        id
    }

    pub fn extend(&mut self, insns: impl IntoIterator<Item = Insn>) {
        for insn in insns {
            self.push(insn);
        }
    }

    /// Inserts `insn` right before `at`; returns the new handle.
    pub fn insert_before(&mut self, at: InsnId, insn: Insn) -> InsnId {
        debug_assert!(self.contains(at), "insert_before on a dead handle");
        let id = self.alloc(insn);
        let prev = self.nodes[at.index()].prev;
        self.nodes[id.index()].prev = prev;
        self.nodes[id.index()].next = Some(at);
        self.nodes[at.index()].prev = Some(id);
        match prev {
            Some(p) => self.nodes[p.index()].next = Some(id),
            None => self.head = Some(id),
        }
        id
    }

    /// Inserts `insn` right after `at`; returns the new handle.
    pub fn insert_after(&mut self, at: InsnId, insn: Insn) -> InsnId {
        debug_assert!(self.contains(at), "insert_after on a dead handle");
        let id = self.alloc(insn);
        let next = self.nodes[at.index()].next;
        self.nodes[id.index()].prev = Some(at);
        self.nodes[id.index()].next = next;
        self.nodes[at.index()].next = Some(id);
        match next {
            Some(n) => self.nodes[n.index()].prev = Some(id),
            None => self.tail = Some(id),
        }
        id
    }

    /// Inserts a run of instructions before `at`, preserving their order.
    pub fn insert_all_before(&mut self, at: InsnId, insns: impl IntoIterator<Item = Insn>) {
        for insn in insns {
            self.insert_before(at, insn);
        }
    }

    /// Inserts a run of instructions after `at`, preserving their order.
    /// Returns the handle of the last inserted instruction (or `at`).
    pub fn insert_all_after(&mut self, at: InsnId, insns: impl IntoIterator<Item = Insn>) -> InsnId {
        let mut cursor = at;
        for insn in insns {
            cursor = self.insert_after(cursor, insn);
        }
        cursor
    }

    pub fn remove(&mut self, id: InsnId) -> Option<Insn> {
        if !self.contains(id) {
            return None;
        }
        let (prev, next) = {
            let node = &self.nodes[id.index()];
            (node.prev, node.next)
        };
        match prev {
            Some(p) => self.nodes[p.index()].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n.index()].prev = prev,
            None => self.tail = prev,
        }
        let node = &mut self.nodes[id.index()];
        node.live = false;
        node.prev = None;
        node.next = None;
        self.len -= 1;
        Some(std::mem::replace(&mut node.insn, Insn::Nop))
    }

    /// Drops every instruction and resets the arena.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.head = None;
        self.tail = None;
        self.len = 0;
    }

    /// Removes all instructions, returning them in order.
    pub fn take(&mut self) -> Vec<Insn> {
        let out = self.to_vec();
        self.clear();
        out
    }

    pub fn ids(&self) -> Vec<InsnId> {
        self.iter().map(|(id, _)| id).collect()
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter {
            list: self,
            cursor: self.head,
        }
    }

    pub fn to_vec(&self) -> Vec<Insn> {
        self.iter().map(|(_, insn)| insn.clone()).collect()
    }

    /// First instruction that occupies code (labels skipped).
    pub fn first_real(&self) -> Option<InsnId> {
        self.iter().find(|(_, insn)| !insn.is_pseudo()).map(|(id, _)| id)
    }

    /// Position of `id` in list order.
    pub fn position(&self, id: InsnId) -> Option<usize> {
        self.iter().position(|(cur, _)| cur == id)
    }
}

pub struct Iter<'a> {
    list: &'a InsnList,
    cursor: Option<InsnId>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (InsnId, &'a Insn);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.cursor?;
        let node = &self.list.nodes[id.index()];
        self.cursor = node.next;
        Some((id, &node.insn))
    }
}

impl From<Vec<Insn>> for InsnList {
    fn from(value: Vec<Insn>) -> Self {
        let mut list = InsnList::new();
        list.extend(value);
        list
    }
}

impl From<InsnList> for Vec<Insn> {
    fn from(value: InsnList) -> Self {
        value.to_vec()
    }
}

impl FromIterator<Insn> for InsnList {
    fn from_iter<T: IntoIterator<Item = Insn>>(iter: T) -> Self {
        let mut list = InsnList::new();
        list.extend(iter);
        list
    }
}

impl PartialEq for InsnList {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.iter().zip(other.iter()).all(|((_, a), (_, b))| a == b)
    }
}
