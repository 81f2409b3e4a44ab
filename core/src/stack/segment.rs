use super::regs::FrameRegs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentId(pub(crate) u32);

impl SegmentId {
    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identifies a [`ContextStack`](super::ContextStack) within its space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(pub(crate) u32);

impl ContextId {
    pub fn raw(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentState {
    /// Newest segment of a context that may push on it.
    Active,
    /// The owning context started a newer segment above it.
    Suspended,
    /// Parked by `save_active_segment` until `restore_segment`.
    Saved,
}

/// A run of frames pushed while one context was continuously active.
///
/// `prev_in_memory` is the segment directly below in the buffer;
/// `prev_in_context` is the owning context's previous segment. They differ
/// exactly when contexts interleave.
#[derive(Debug, Clone)]
pub struct StackSegment {
    pub(crate) context: ContextId,
    pub(crate) base: usize,
    pub(crate) prev_in_memory: Option<SegmentId>,
    pub(crate) prev_in_context: Option<SegmentId>,
    pub(crate) initial_frame: Option<usize>,
    pub(crate) regs: Option<FrameRegs>,
    pub(crate) state: SegmentState,
}

impl StackSegment {
    pub(crate) fn new(
        context: ContextId,
        base: usize,
        prev_in_memory: Option<SegmentId>,
        prev_in_context: Option<SegmentId>,
    ) -> Self {
        Self {
            context,
            base,
            prev_in_memory,
            prev_in_context,
            initial_frame: None,
            regs: None,
            state: SegmentState::Active,
        }
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn base(&self) -> usize {
        self.base
    }

    pub fn prev_in_memory(&self) -> Option<SegmentId> {
        self.prev_in_memory
    }

    pub fn prev_in_context(&self) -> Option<SegmentId> {
        self.prev_in_context
    }

    /// First frame pushed on this segment; older frames reachable through
    /// `prev` live in other segments.
    pub fn initial_frame(&self) -> Option<usize> {
        self.initial_frame
    }

    /// Cursor of the newest frame. `None` while the segment only holds
    /// invoke arguments.
    pub fn regs(&self) -> Option<&FrameRegs> {
        self.regs.as_ref()
    }

    pub fn state(&self) -> SegmentState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SegmentState::Active
    }

    pub fn is_saved(&self) -> bool {
        self.state == SegmentState::Saved
    }

    pub fn maybe_fp(&self) -> Option<usize> {
        self.regs.map(|r| r.fp())
    }
}
