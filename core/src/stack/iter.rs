use std::cell::Ref;

use super::frame::{FrameRef, FrameView};
use super::regs::Pc;
use super::segment::SegmentId;
use super::space::StackSpace;

/// Cursor of one frame as seen by a stack walk: where the frame is, how far
/// its slots are in use and where it is executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCursor {
    pub fp: usize,
    pub sp: usize,
    pub pc: Option<Pc>,
}

/// Walks the frames of one context, newest first.
///
/// Within a segment each step reads the newer frame's `prev`/`prev_pc`; at a
/// segment's initial frame the walk continues in the context's previous
/// segment. Holds a shared borrow of the space for its lifetime.
pub struct FrameRegsIter<'a> {
    space: Ref<'a, StackSpace>,
    seg: Option<SegmentId>,
    cur: Option<FrameCursor>,
}

impl<'a> FrameRegsIter<'a> {
    pub(crate) fn new(space: Ref<'a, StackSpace>, seg: Option<SegmentId>) -> Self {
        let mut iter = Self { space, seg, cur: None };
        iter.settle_on_segment();
        iter
    }

    /// Move to the first segment (from `self.seg` back through the context)
    /// that has frames.
    fn settle_on_segment(&mut self) {
        while let Some(id) = self.seg {
            let seg = self.space.segment(id);
            if let Some(regs) = seg.regs() {
                self.cur = Some(FrameCursor {
                    fp: regs.fp(),
                    sp: regs.sp,
                    pc: regs.pc,
                });
                return;
            }
            self.seg = seg.prev_in_context();
        }
        self.cur = None;
    }

    pub fn segment(&self) -> Option<SegmentId> {
        self.seg
    }
}

impl Iterator for FrameRegsIter<'_> {
    type Item = FrameCursor;

    fn next(&mut self) -> Option<FrameCursor> {
        let cur = self.cur?;
        let seg_id = self.seg?;
        let seg = self.space.segment(seg_id);
        let frame = self.space.frame(cur.fp);
        let prev = frame.prev().filter(|_| seg.initial_frame() != Some(cur.fp));
        match prev {
            Some(prev_fp) => {
                let sp = if frame.has_args() { frame.actual_args_end() } else { frame.vp_start() };
                self.cur = Some(FrameCursor {
                    fp: prev_fp,
                    sp,
                    pc: frame.prev_pc(),
                });
            }
            None => {
                self.seg = seg.prev_in_context();
                self.settle_on_segment();
            }
        }
        Some(cur)
    }
}

/// Every frame on the stack regardless of context: segments from the top of
/// memory down, frames newest to oldest within each.
pub struct AllFramesIter<'a> {
    space: &'a StackSpace,
    seg: Option<usize>,
    fp: Option<usize>,
}

impl<'a> AllFramesIter<'a> {
    pub(crate) fn new(space: &'a StackSpace) -> Self {
        let seg = space.segment_count().checked_sub(1);
        let mut iter = Self { space, seg, fp: None };
        iter.fp = iter.seg.and_then(|i| iter.space.segment(SegmentId(i as u32)).maybe_fp());
        iter
    }
}

impl<'a> Iterator for AllFramesIter<'a> {
    type Item = (SegmentId, FrameRef<'a>);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let idx = self.seg?;
            let id = SegmentId(idx as u32);
            let seg = self.space.segment(id);
            if let Some(fp) = self.fp {
                let frame = self.space.frame(fp);
                self.fp = if seg.initial_frame() == Some(fp) {
                    None
                } else {
                    frame.prev().filter(|&p| p >= seg.base())
                };
                return Some((id, frame));
            }
            self.seg = idx.checked_sub(1);
            self.fp = self.seg.and_then(|i| self.space.segment(SegmentId(i as u32)).maybe_fp());
        }
    }
}
