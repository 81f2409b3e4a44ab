//! Byte offsets JIT-generated code hard-codes against.
//!
//! Any change to the header order, the word size or the position of
//! `callee`/`this`/formals relative to `fp` must bump [`FRAME_LAYOUT_VERSION`];
//! code emitted against an older table is invalid.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::value::Value;

use super::frame::{
    ANNOTATION, ARGS, EXEC, FLAGS, FrameFlags, HOOK_DATA, IMACROPC, NCODE, PREV, PREVPC, RVAL, SCOPE_CHAIN,
    VALUES_PER_STACK_FRAME,
};
use super::regs::FrameRegs;

pub const FRAME_LAYOUT_VERSION: u32 = 1;

const WORD: usize = std::mem::size_of::<Value>();

pub const OFFSET_OF_FLAGS: usize = FLAGS * WORD;
pub const OFFSET_OF_EXEC: usize = EXEC * WORD;
pub const OFFSET_OF_ARGS: usize = ARGS * WORD;
pub const OFFSET_OF_SCOPE_CHAIN: usize = SCOPE_CHAIN * WORD;
pub const OFFSET_OF_PREV: usize = PREV * WORD;
pub const OFFSET_OF_NCODE: usize = NCODE * WORD;
pub const OFFSET_OF_RETURN_VALUE: usize = RVAL * WORD;
pub const OFFSET_OF_PREV_PC: usize = PREVPC * WORD;
pub const OFFSET_OF_IMACRO_PC: usize = IMACROPC * WORD;
pub const OFFSET_OF_HOOK_DATA: usize = HOOK_DATA * WORD;
pub const OFFSET_OF_ANNOTATION: usize = ANNOTATION * WORD;

/// Callee slot of a non-eval function frame with `nformal` formals.
pub const fn offset_of_callee(nformal: usize) -> isize {
    -(((nformal + 2) * WORD) as isize)
}

/// `this` slot; `None` for global and eval frames.
pub const fn offset_of_this(nformal: Option<usize>) -> isize {
    match nformal {
        Some(n) => -(((n + 1) * WORD) as isize),
        None => -(WORD as isize),
    }
}

pub const fn offset_of_formal_arg(nformal: usize, i: usize) -> isize {
    -(((nformal - i) * WORD) as isize)
}

/// Local variable `i`, directly after the header.
pub const fn offset_of_fixed(i: usize) -> isize {
    ((VALUES_PER_STACK_FRAME + i) * WORD) as isize
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderField {
    pub name: String,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagBit {
    pub name: String,
    pub bits: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegsLayout {
    pub size: usize,
    pub sp: usize,
    pub pc: usize,
    pub fp: usize,
}

/// Published frame layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameLayout {
    pub version: u32,
    pub word_size: usize,
    pub header_words: usize,
    pub header: Vec<HeaderField>,
    pub flags: Vec<FlagBit>,
    pub regs: RegsLayout,
    /// `this` of global and eval frames, relative to `fp`.
    pub script_this: isize,
    /// Callee of global and eval frames, relative to `fp`.
    pub script_callee: isize,
}

impl FrameLayout {
    fn build() -> Self {
        let header = [
            ("flags", OFFSET_OF_FLAGS),
            ("exec", OFFSET_OF_EXEC),
            ("args", OFFSET_OF_ARGS),
            ("scope_chain", OFFSET_OF_SCOPE_CHAIN),
            ("prev", OFFSET_OF_PREV),
            ("ncode", OFFSET_OF_NCODE),
            ("rval", OFFSET_OF_RETURN_VALUE),
            ("prevpc", OFFSET_OF_PREV_PC),
            ("imacropc", OFFSET_OF_IMACRO_PC),
            ("hook_data", OFFSET_OF_HOOK_DATA),
            ("annotation", OFFSET_OF_ANNOTATION),
        ]
        .into_iter()
        .map(|(name, offset)| HeaderField {
            name: name.to_string(),
            offset,
        })
        .collect();

        let flags = FrameFlags::NAMES
            .iter()
            .map(|(name, flag)| FlagBit {
                name: name.to_string(),
                bits: flag.bits(),
            })
            .collect();

        Self {
            version: FRAME_LAYOUT_VERSION,
            word_size: WORD,
            header_words: VALUES_PER_STACK_FRAME,
            header,
            flags,
            regs: RegsLayout {
                size: std::mem::size_of::<FrameRegs>(),
                sp: FrameRegs::OFFSET_OF_SP,
                pc: FrameRegs::OFFSET_OF_PC,
                fp: FrameRegs::OFFSET_OF_FP,
            },
            script_this: offset_of_this(None),
            script_callee: -2 * WORD as isize,
        }
    }

    pub fn header_offset(&self, name: &str) -> Option<usize> {
        self.header.iter().find(|f| f.name == name).map(|f| f.offset)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

pub static FRAME_LAYOUT: Lazy<FrameLayout> = Lazy::new(FrameLayout::build);
