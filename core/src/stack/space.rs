use std::rc::Rc;

use tracing::{debug, trace, warn};

use crate::config::StackConfig;
use crate::error::{StackError, StackResult};
use crate::realm::Realm;
use crate::value::Value;

use super::args::{ArgsMut, ArgsRef, CallArgs};
use super::frame::{FrameMut, FrameRef, FrameView, VALUES_PER_STACK_FRAME};
use super::iter::AllFramesIter;
use super::segment::{ContextId, SegmentId, SegmentState, StackSegment};
use super::trace::Tracer;

const TRACE_TARGET: &str = "vmstack::space";

/// The reserved stack region of one thread.
///
/// Capacity for `capacity_vals` slots is reserved up front; the committed
/// prefix `[0, committed_end)` grows in `commit_vals` chunks and never moves.
/// Segments are kept in memory order, newest last.
#[derive(Debug)]
pub struct StackSpace {
    slots: Vec<Value>,
    reserved_end: usize,
    commit_vals: usize,
    jit_extra: usize,
    segments: Vec<StackSegment>,
    /// End of invoke arguments pushed without a frame above them.
    invoke_args_end: usize,
    realm: Rc<Realm>,
    next_context: u32,
}

impl StackSpace {
    pub fn new(config: &StackConfig, realm: Rc<Realm>) -> StackResult<Self> {
        config.validate()?;
        let mut slots = Vec::new();
        slots.try_reserve_exact(config.capacity_vals).map_err(|_| {
            warn!(target: TRACE_TARGET, slots = config.capacity_vals, "stack reservation failed");
            StackError::ReserveFailed {
                slots: config.capacity_vals,
            }
        })?;
        slots.resize(config.commit_vals, Value::UNDEFINED);
        debug!(
            target: TRACE_TARGET,
            reserved = config.capacity_vals,
            committed = config.commit_vals,
            "stack reserved"
        );
        Ok(Self {
            slots,
            reserved_end: config.capacity_vals,
            commit_vals: config.commit_vals,
            jit_extra: config.jit_extra_vals,
            segments: Vec::new(),
            invoke_args_end: 0,
            realm,
            next_context: 0,
        })
    }

    #[inline]
    pub fn realm(&self) -> &Rc<Realm> {
        &self.realm
    }

    #[inline]
    pub fn committed_end(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn reserved_end(&self) -> usize {
        self.reserved_end
    }

    /// Committed memory in bytes.
    pub fn committed_size(&self) -> usize {
        self.slots.len() * std::mem::size_of::<Value>()
    }

    pub fn jit_extra(&self) -> usize {
        self.jit_extra
    }

    /// Make `[from, from + nvals)` committed. On overflow nothing changes.
    pub fn ensure_committed(&mut self, from: usize, nvals: usize) -> StackResult<()> {
        let committed = self.slots.len();
        let end = from.saturating_add(nvals);
        if end <= committed {
            return Ok(());
        }
        if end > self.reserved_end {
            let available = self.reserved_end.saturating_sub(from);
            warn!(
                target: TRACE_TARGET,
                from,
                requested = nvals,
                available,
                "stack overflow"
            );
            return Err(StackError::Overflow {
                requested: nvals,
                available,
            });
        }
        let chunks = (end - committed).div_ceil(self.commit_vals);
        let new_end = (committed + chunks * self.commit_vals).min(self.reserved_end);
        // Capacity was reserved in `new`, so this never reallocates.
        debug_assert!(new_end <= self.slots.capacity());
        self.slots.resize(new_end, Value::UNDEFINED);
        debug!(
            target: TRACE_TARGET,
            from = committed,
            to = new_end,
            "stack commit"
        );
        Ok(())
    }

    /// Highest slot code may use without another check, keeping `jit_extra`
    /// committed slots of head room above it.
    pub fn compute_limit(&self, from: usize) -> usize {
        debug_assert!(from <= self.committed_end());
        self.committed_end().saturating_sub(self.jit_extra).max(from)
    }

    /// Refresh `limit` after a push at `from` appeared to cross it.
    pub fn try_bump_limit(&mut self, from: usize, nvals: usize, limit: &mut usize) -> StackResult<()> {
        self.ensure_committed(from, nvals + self.jit_extra)?;
        *limit = self.compute_limit(from);
        debug_assert!(from + nvals <= *limit);
        trace!(target: TRACE_TARGET, limit = *limit, "stack limit bumped");
        Ok(())
    }

    /// First slot above everything in use.
    pub fn first_unused(&self) -> usize {
        let top = match self.segments.last() {
            None => 0,
            Some(seg) => seg.regs.map_or(seg.base, |r| r.sp.max(seg.base)),
        };
        top.max(self.invoke_args_end)
    }

    /// Top of `seg`'s live range: the base of the segment above, or the first
    /// unused slot for the top segment.
    pub(crate) fn segment_end(&self, seg: SegmentId) -> usize {
        match self.segments.get(seg.index() + 1) {
            Some(above) => above.base,
            None => self.first_unused(),
        }
    }

    // Segments

    pub fn current_segment(&self) -> Option<SegmentId> {
        self.segments.len().checked_sub(1).map(|i| SegmentId(i as u32))
    }

    pub fn segment(&self, id: SegmentId) -> &StackSegment {
        &self.segments[id.index()]
    }

    pub(crate) fn segment_mut(&mut self, id: SegmentId) -> &mut StackSegment {
        &mut self.segments[id.index()]
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Segment whose live range holds `fp`.
    pub fn containing_segment(&self, fp: usize) -> Option<SegmentId> {
        (0..self.segments.len())
            .rev()
            .map(|i| SegmentId(i as u32))
            .find(|&id| self.segment(id).base <= fp && fp < self.segment_end(id))
    }

    pub(crate) fn push_segment(&mut self, context: ContextId, prev_in_context: Option<SegmentId>) -> SegmentId {
        let base = self.first_unused();
        let prev_in_memory = self.current_segment();
        let id = SegmentId(self.segments.len() as u32);
        self.segments
            .push(StackSegment::new(context, base, prev_in_memory, prev_in_context));
        if let Some(prev) = prev_in_context {
            let prev = self.segment_mut(prev);
            if prev.state == SegmentState::Active {
                prev.state = SegmentState::Suspended;
            }
        }
        debug!(
            target: "vmstack::segment",
            segment = id.0,
            context = context.0,
            base,
            "segment pushed"
        );
        id
    }

    pub(crate) fn pop_segment(&mut self) -> Option<StackSegment> {
        let seg = self.segments.pop()?;
        if let Some(prev) = seg.prev_in_context {
            let prev = self.segment_mut(prev);
            if prev.state == SegmentState::Suspended {
                prev.state = SegmentState::Active;
            }
        }
        debug!(
            target: "vmstack::segment",
            segment = self.segments.len(),
            context = seg.context.0,
            "segment popped"
        );
        Some(seg)
    }

    pub(crate) fn push_override(&mut self, end: usize) -> usize {
        std::mem::replace(&mut self.invoke_args_end, end)
    }

    pub(crate) fn pop_override(&mut self, prev: usize) {
        self.invoke_args_end = prev;
    }

    pub(crate) fn next_context_id(&mut self) -> ContextId {
        let id = ContextId(self.next_context);
        self.next_context += 1;
        id
    }

    // Slot access

    #[inline]
    pub fn slot(&self, idx: usize) -> Value {
        self.slots[idx]
    }

    #[inline]
    pub fn set_slot(&mut self, idx: usize, value: Value) {
        self.slots[idx] = value;
    }

    #[inline]
    pub fn slots(&self) -> &[Value] {
        &self.slots
    }

    #[inline]
    pub(crate) fn slots_mut(&mut self) -> &mut [Value] {
        &mut self.slots
    }

    pub fn frame(&self, fp: usize) -> FrameRef<'_> {
        FrameRef::new(&self.slots, fp, &self.realm)
    }

    pub fn frame_mut(&mut self, fp: usize) -> FrameMut<'_> {
        FrameMut::new(&mut self.slots, fp, &self.realm)
    }

    pub fn args<'a>(&'a self, args: &'a CallArgs) -> ArgsRef<'a> {
        ArgsRef {
            args,
            slots: &self.slots,
        }
    }

    pub fn args_mut<'a>(&'a mut self, args: &'a CallArgs) -> ArgsMut<'a> {
        ArgsMut {
            args,
            slots: &mut self.slots,
        }
    }

    /// Every frame in every segment, newest segment first.
    pub fn all_frames(&self) -> AllFramesIter<'_> {
        AllFramesIter::new(self)
    }

    /// Report every live slot and every frame header reference as a root.
    pub fn trace(&self, tracer: &mut impl Tracer) {
        for i in (0..self.segments.len()).rev() {
            let id = SegmentId(i as u32);
            let seg = self.segment(id);
            let mut end = self.segment_end(id);
            let mut fp = seg.maybe_fp();
            while let Some(cur) = fp.filter(|&f| f >= seg.base) {
                let frame = self.frame(cur);
                trace_range(tracer, &self.slots[cur + VALUES_PER_STACK_FRAME..end]);
                trace_header(tracer, &frame);
                end = cur;
                fp = if seg.initial_frame == Some(cur) { None } else { frame.prev() };
            }
            trace_range(tracer, &self.slots[seg.base..end]);
        }
    }
}

pub(crate) fn trace_range(tracer: &mut impl Tracer, range: &[Value]) {
    for &value in range {
        tracer.trace_value(value);
    }
}

pub(crate) fn trace_header<F: FrameView>(tracer: &mut impl Tracer, frame: &F) {
    if frame.is_script_frame() {
        tracer.trace_script(frame.script_id());
    }
    if let Some(chain) = frame.scope_chain_if_set() {
        tracer.trace_object(chain);
    }
    if frame.has_return_value() {
        tracer.trace_value(frame.return_value());
    }
}
