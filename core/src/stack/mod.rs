//! The thread's execution stack.
//!
//! One flat buffer of [`Value`](crate::value::Value) slots holds every frame.
//! A function frame looks like this, growing upward:
//!
//! ```text
//!   [callee][this][actual args..][callee][this][formals..]  (overflow only)
//!   [callee][this][formals..][undefined..]                  (underflow pads)
//!   | header: VALUES_PER_STACK_FRAME words | fixed slots | expression stack |
//!   ^ vp                                  ^ fp                              ^ sp
//! ```
//!
//! Global and eval frames keep `callee` (or null) and `this` in the two slots
//! right below `fp`. Header words are raw 64-bit words in the same buffer, so
//! JIT code can address everything relative to `fp` using the offsets in
//! [`layout`]. Frames are addressed by slot index, never by pointer; the
//! buffer never moves once reserved.
//!
//! [`ContextStack`] is the only mutator. Every push returns a guard whose
//! drop performs the matching pop.

mod args;
mod check;
mod context;
mod frame;
mod generator;
mod guards;
mod iter;
pub mod layout;
mod regs;
mod segment;
mod space;
mod trace;


pub use args::{ArgsMut, ArgsRef, CallArgs};
pub use check::{LimitCheck, NoCheck, OomCheck, StackCheck};
pub use context::ContextStack;
pub use frame::{
    ExecuteType, FrameFlags, FrameMut, FrameRef, FrameView, MaybeConstruct, VALUES_PER_STACK_FRAME,
    steal_frame_and_slots,
};
pub use generator::{Generator, GeneratorState};
pub use guards::{FrameGuard, GeneratorFrameGuard, InvokeArgsGuard, InvokeFrameGuard, ThreadSpaceGuard, with_thread_space};
pub use iter::{AllFramesIter, FrameCursor, FrameRegsIter};
pub use layout::{FRAME_LAYOUT, FRAME_LAYOUT_VERSION, FrameLayout};
pub use regs::{FrameRegs, Pc};
pub use segment::{ContextId, SegmentId, SegmentState, StackSegment};
pub use space::StackSpace;
pub use trace::{RootSet, Tracer};
