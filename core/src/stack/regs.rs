use std::num::NonZeroU32;

use super::frame::VALUES_PER_STACK_FRAME;

/// Bytecode offset. Stored as `offset + 1` so `Option<Pc>` is a plain `u32`
/// with 0 meaning "no pc", matching the encoding of the frame's pc words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Pc(NonZeroU32);

impl Pc {
    #[inline]
    pub const fn new(offset: u32) -> Self {
        match NonZeroU32::new(offset.wrapping_add(1)) {
            Some(raw) => Pc(raw),
            None => panic!("bytecode offset out of range"),
        }
    }

    #[inline]
    pub const fn offset(self) -> u32 {
        self.0.get() - 1
    }

    #[inline]
    pub(crate) fn encode(pc: Option<Pc>) -> u64 {
        pc.map_or(0, |pc| pc.0.get() as u64)
    }

    #[inline]
    pub(crate) fn decode(word: u64) -> Option<Pc> {
        NonZeroU32::new(word as u32).map(Pc)
    }

    pub fn advance(self, delta: u32) -> Self {
        Pc::new(self.offset() + delta)
    }
}

/// The live cursor of a segment's newest frame.
///
/// `sp` and `fp` are slot indices into the thread's stack buffer; `fp` is the
/// first header word of the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct FrameRegs {
    pub sp: usize,
    pub pc: Option<Pc>,
    fp: usize,
}

impl FrameRegs {
    pub const OFFSET_OF_SP: usize = std::mem::offset_of!(FrameRegs, sp);
    pub const OFFSET_OF_PC: usize = std::mem::offset_of!(FrameRegs, pc);
    pub const OFFSET_OF_FP: usize = std::mem::offset_of!(FrameRegs, fp);

    #[inline]
    pub fn fp(&self) -> usize {
        self.fp
    }

    /// Cursor at the first instruction of a freshly pushed script frame.
    #[inline]
    pub(crate) fn prepare_to_run(fp: usize, nfixed: usize) -> Self {
        Self {
            sp: fp + VALUES_PER_STACK_FRAME + nfixed,
            pc: Some(Pc::new(0)),
            fp,
        }
    }

    #[inline]
    pub(crate) fn dummy(fp: usize) -> Self {
        Self {
            sp: fp + VALUES_PER_STACK_FRAME,
            pc: None,
            fp,
        }
    }

    /// Same logical position as `from`, for a frame now living at `to`.
    #[inline]
    pub fn rebase_from_to(from: &FrameRegs, to: usize) -> Self {
        Self {
            sp: to + (from.sp - from.fp),
            pc: from.pc,
            fp: to,
        }
    }

    /// Leave the current frame for `prev`, resuming at `prevpc`.
    #[inline]
    pub(crate) fn pop_frame(&mut self, newsp: usize, prev: usize, prevpc: Option<Pc>) {
        self.pc = prevpc;
        self.sp = newsp;
        self.fp = prev;
    }

    #[cfg(test)]
    pub(crate) fn for_test(sp: usize, pc: Option<Pc>, fp: usize) -> Self {
        Self { sp, pc, fp }
    }
}
