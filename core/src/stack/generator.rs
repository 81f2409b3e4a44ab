//! Generator frames that live off the stack while suspended.
//!
//! A generator owns a copy of its frame (arguments, header and slots) in a
//! heap buffer laid out exactly like the stack region it came from, starting
//! at the frame's `vp`. Resuming copies it back onto the stack at whatever
//! address is free; suspending copies it out again. Only relative positions
//! survive a move, so the saved cursor is rebased each time.

use std::rc::Rc;

use tracing::debug;

use crate::error::StackResult;
use crate::realm::Realm;
use crate::value::Value;

use super::context::ContextStack;
use super::frame::{FrameMut, FrameRef, FrameView, VALUES_PER_STACK_FRAME, steal_frame_and_slots};
use super::regs::FrameRegs;
use super::space::{trace_header, trace_range};
use super::trace::Tracer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    Newborn,
    Open,
    Running,
    Closed,
}

#[derive(Debug)]
pub struct Generator {
    pub(crate) state: GeneratorState,
    pub(crate) floating: Box<[Value]>,
    /// Cursor relative to `floating`.
    pub(crate) regs: FrameRegs,
    pub(crate) live_fp: Option<usize>,
    realm: Rc<Realm>,
}

impl Generator {
    /// Detach a copy of the context's running function frame.
    pub fn from_current_frame(cx: &ContextStack) -> StackResult<Self> {
        let regs = cx.regs()?;
        let space = cx.space();
        let frame = space.frame(regs.fp());
        debug_assert!(frame.is_non_eval_function_frame());
        let vp = frame.vp_start();
        let len = (regs.fp() - vp) + VALUES_PER_STACK_FRAME + frame.num_slots();

        let mut floating = vec![Value::UNDEFINED; len].into_boxed_slice();
        let fp = steal_frame_and_slots(&mut floating, 0, space.slots(), vp, regs.fp(), regs.sp);
        let realm = Rc::clone(space.realm());
        FrameMut::new(&mut floating, fp, &realm).init_floating_generator();
        debug!(target: "vmstack::generator", from = regs.fp(), len, "generator frame detached");

        Ok(Self {
            state: GeneratorState::Newborn,
            floating,
            regs: FrameRegs::rebase_from_to(&regs, fp),
            live_fp: None,
            realm,
        })
    }

    pub fn state(&self) -> GeneratorState {
        self.state
    }

    /// The floating copy of the frame. Stale while the generator is running;
    /// use [`Generator::live_fp`] to find the live frame then.
    pub fn frame(&self) -> FrameRef<'_> {
        FrameRef::new(&self.floating, self.regs.fp(), &self.realm)
    }

    pub(crate) fn floating_frame_mut(&mut self) -> FrameMut<'_> {
        FrameMut::new(&mut self.floating, self.regs.fp(), &self.realm)
    }

    pub fn floating_regs(&self) -> &FrameRegs {
        &self.regs
    }

    /// Value at `offset` slots above the frame's `vp`, in floating storage.
    pub fn floating_slot(&self, offset: usize) -> Value {
        self.floating[offset]
    }

    pub fn live_fp(&self) -> Option<usize> {
        self.live_fp
    }

    pub fn is_running(&self) -> bool {
        self.state == GeneratorState::Running
    }

    pub fn close(&mut self) {
        debug_assert!(!self.is_running());
        self.state = GeneratorState::Closed;
    }

    /// Roots held in floating storage. A running generator's frame is on the
    /// stack and traced with it.
    pub fn trace(&self, tracer: &mut impl Tracer) {
        if self.live_fp.is_some() {
            return;
        }
        let fp = self.regs.fp();
        trace_range(tracer, &self.floating[..fp]);
        trace_header(tracer, &self.frame());
        trace_range(tracer, &self.floating[fp + VALUES_PER_STACK_FRAME..self.regs.sp]);
    }
}
