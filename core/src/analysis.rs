//! Structural recomputation after a splice.
//!
//! Woven methods never keep their pre-weave `max_stack`/`max_locals`/frames:
//! the context asks for a full recomputation and this pass walks the control
//! flow graph from the entry point and every exception handler.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::class::MethodNode;
use crate::desc::{JvmType, MethodDescriptor};
use crate::insn::{ArithOp, FieldOp, Insn, Kind, LabelId};

/// Operand-stack depth (in slots) on entry to a branch target or handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameState {
    pub label: LabelId,
    pub stack: u16,
}

/// Which structural data to rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ComputeFlags(u8);

impl ComputeFlags {
    pub const NONE: ComputeFlags = ComputeFlags(0);
    pub const MAXS: ComputeFlags = ComputeFlags(1 << 0);
    pub const FRAMES: ComputeFlags = ComputeFlags(1 << 1);
    pub const ALL: ComputeFlags = ComputeFlags(0b11);

    #[inline]
    pub const fn contains(self, other: ComputeFlags) -> bool {
        (self.0 & other.0) == other.0
    }

    #[inline]
    pub fn insert(&mut self, other: ComputeFlags) {
        self.0 |= other.0;
    }

    #[inline]
    pub const fn union(self, other: ComputeFlags) -> ComputeFlags {
        ComputeFlags(self.0 | other.0)
    }
}

/// Stack slots popped and pushed by one instruction.
pub fn stack_effect(insn: &Insn) -> (u16, u16) {
    fn desc_of(desc: &str) -> MethodDescriptor {
        MethodDescriptor::parse(desc).unwrap_or_else(|_| MethodDescriptor::new(Vec::new(), JvmType::Void))
    }
    fn field_width(desc: &str) -> u16 {
        JvmType::parse(desc).map(|t| t.width()).unwrap_or(1)
    }
    match insn {
        Insn::Label(_) | Insn::Nop => (0, 0),
        Insn::Const(c) => (0, c.kind().width()),
        Insn::Load(kind, _) => (0, kind.width()),
        Insn::Store(kind, _) => (kind.width(), 0),
        Insn::Pop => (1, 0),
        Insn::Pop2 => (2, 0),
        Insn::Dup => (1, 2),
        Insn::DupX1 => (2, 3),
        Insn::DupX2 => (3, 4),
        Insn::Dup2 => (2, 4),
        Insn::Swap => (2, 2),
        Insn::Arith(ArithOp::Neg, kind) => (kind.width(), kind.width()),
        Insn::Arith(_, kind) => (kind.width() * 2, kind.width()),
        Insn::Jump(op, _) => (op.operands(), 0),
        Insn::TableSwitch { .. } => (1, 0),
        Insn::Invoke { kind, method } => {
            let desc = desc_of(&method.desc);
            let receiver = if matches!(kind, crate::insn::InvokeKind::Static) { 0 } else { 1 };
            (desc.arg_slots() + receiver, desc.ret.width())
        }
        Insn::InvokeDynamic { desc, .. } => {
            let desc = desc_of(desc);
            (desc.arg_slots(), desc.ret.width())
        }
        Insn::Field { op, field } => {
            let w = field_width(&field.desc);
            match op {
                FieldOp::GetStatic => (0, w),
                FieldOp::PutStatic => (w, 0),
                FieldOp::GetField => (1, w),
                FieldOp::PutField => (1 + w, 0),
            }
        }
        Insn::Type(crate::insn::TypeOp::New, _) => (0, 1),
        Insn::Type(_, _) => (1, 1),
        Insn::Return(kind) => (kind.map(Kind::width).unwrap_or(0), 0),
        Insn::Throw => (1, 0),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Computed {
    pub max_stack: u16,
    pub max_locals: u16,
    pub frames: Vec<FrameState>,
}

/// Walks every reachable instruction and derives stack/locals/frame data.
/// Never fails: inconsistent depths at merge points keep the larger value.
pub fn compute(method: &MethodNode) -> Computed {
    let code: Vec<&Insn> = method.code.iter().map(|(_, insn)| insn).collect();
    let mut label_pos: FxHashMap<LabelId, usize> = FxHashMap::default();
    for (idx, insn) in code.iter().enumerate() {
        if let Insn::Label(id) = insn {
            label_pos.insert(*id, idx);
        }
    }

    let mut depth_at: Vec<Option<u16>> = vec![None; code.len()];
    let mut worklist: Vec<(usize, u16)> = Vec::new();
    if !code.is_empty() {
        worklist.push((0, 0));
    }
    for block in &method.try_catch {
        if let Some(&pos) = label_pos.get(&block.handler) {
            worklist.push((pos, 1));
        }
    }

    let mut max_stack: u16 = 0;
    while let Some((mut idx, mut depth)) = worklist.pop() {
        while idx < code.len() {
            match depth_at[idx] {
                Some(seen) if seen >= depth => break,
                _ => depth_at[idx] = Some(depth),
            }
            let insn = code[idx];
            let (pop, push) = stack_effect(insn);
            max_stack = max_stack.max(depth);
            depth = depth.saturating_sub(pop) + push;
            max_stack = max_stack.max(depth);
            for target in insn.branch_targets() {
                if let Some(&pos) = label_pos.get(&target) {
                    worklist.push((pos, depth));
                }
            }
            if insn.ends_block() {
                break;
            }
            idx += 1;
        }
    }

    let mut max_locals = parameter_slots(method);
    for insn in &code {
        if let Insn::Load(kind, slot) | Insn::Store(kind, slot) = insn {
            max_locals = max_locals.max(slot + kind.width());
        }
    }

    let mut targeted: Vec<LabelId> = code.iter().flat_map(|insn| insn.branch_targets()).collect();
    targeted.extend(method.try_catch.iter().map(|b| b.handler));
    targeted.sort();
    targeted.dedup();
    let frames = targeted
        .into_iter()
        .filter_map(|label| {
            let pos = *label_pos.get(&label)?;
            depth_at[pos].map(|stack| FrameState { label, stack })
        })
        .collect();

    Computed {
        max_stack,
        max_locals,
        frames,
    }
}

/// Slots occupied by the receiver and declared parameters.
pub fn parameter_slots(method: &MethodNode) -> u16 {
    let receiver = if method.is_static() { 0 } else { 1 };
    receiver + method.descriptor().map(|d| d.arg_slots()).unwrap_or(0)
}

/// Applies [`compute`] to `method` for the requested parts.
pub fn recompute(method: &mut MethodNode, flags: ComputeFlags) {
    if method.is_native() || method.is_abstract() {
        method.max_stack = 0;
        method.max_locals = 0;
        method.frames.clear();
        return;
    }
    let computed = compute(method);
    if flags.contains(ComputeFlags::MAXS) {
        method.max_stack = computed.max_stack;
        method.max_locals = computed.max_locals;
    }
    if flags.contains(ComputeFlags::FRAMES) {
        method.frames = computed.frames;
    }
}
