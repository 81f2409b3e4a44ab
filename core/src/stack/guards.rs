use std::cell::RefCell;
use std::ops::Deref;
use std::rc::Rc;

use super::args::CallArgs;
use super::context::ContextStack;
use super::generator::Generator;
use super::regs::FrameRegs;
use super::segment::SegmentId;
use super::space::StackSpace;

/// Invoke arguments reserved by [`ContextStack::push_invoke_args`].
///
/// Dropping the guard releases the slots and any segment created for them.
pub struct InvokeArgsGuard<'a> {
    cx: &'a ContextStack,
    args: CallArgs,
    seg: Option<SegmentId>,
    prev_override: usize,
    pushed: bool,
}

impl<'a> InvokeArgsGuard<'a> {
    pub(super) fn new(cx: &'a ContextStack, args: CallArgs, seg: Option<SegmentId>, prev_override: usize) -> Self {
        Self {
            cx,
            args,
            seg,
            prev_override,
            pushed: true,
        }
    }

    pub fn args(&self) -> &CallArgs {
        &self.args
    }

    pub fn pushed(&self) -> bool {
        self.pushed
    }

    /// Whether the push had to start a new segment.
    pub fn pushed_segment(&self) -> bool {
        self.seg.is_some()
    }

    pub fn pop(&mut self) {
        if !self.pushed {
            return;
        }
        self.pushed = false;
        self.cx.pop_invoke_args(self.seg, self.prev_override);
    }
}

impl Deref for InvokeArgsGuard<'_> {
    type Target = CallArgs;

    fn deref(&self) -> &CallArgs {
        &self.args
    }
}

impl Drop for InvokeArgsGuard<'_> {
    fn drop(&mut self) {
        self.pop();
    }
}

/// Function frame pushed over invoke arguments. On pop the frame's return
/// value is stored in the arguments' callee slot.
pub struct InvokeFrameGuard<'a> {
    cx: &'a ContextStack,
    args: &'a CallArgs,
    prev_regs: Option<FrameRegs>,
    sets_initial: bool,
    pushed: bool,
}

impl<'a> InvokeFrameGuard<'a> {
    pub(super) fn new(cx: &'a ContextStack, args: &'a CallArgs, prev_regs: Option<FrameRegs>, sets_initial: bool) -> Self {
        Self {
            cx,
            args,
            prev_regs,
            sets_initial,
            pushed: true,
        }
    }

    pub fn pushed(&self) -> bool {
        self.pushed
    }

    pub fn pop(&mut self) {
        if !self.pushed {
            return;
        }
        self.pushed = false;
        self.cx.pop_invoke_frame(self.args, self.prev_regs, self.sets_initial);
    }
}

impl Drop for InvokeFrameGuard<'_> {
    fn drop(&mut self) {
        self.pop();
    }
}

/// Execute or dummy frame; owns the segment it was pushed in.
pub struct FrameGuard<'a> {
    cx: &'a ContextStack,
    pushed: bool,
}

impl<'a> FrameGuard<'a> {
    pub(super) fn new(cx: &'a ContextStack) -> Self {
        Self { cx, pushed: true }
    }

    pub fn pushed(&self) -> bool {
        self.pushed
    }

    pub fn pop(&mut self) {
        if !self.pushed {
            return;
        }
        self.pushed = false;
        self.cx.pop_frame_segment();
    }
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        self.pop();
    }
}

/// A resumed generator frame. Popping moves the frame back into the
/// generator before its segment goes away.
pub struct GeneratorFrameGuard<'a, 'g> {
    frame: FrameGuard<'a>,
    generator: &'g mut Generator,
}

impl<'a, 'g> GeneratorFrameGuard<'a, 'g> {
    pub(super) fn new(cx: &'a ContextStack, generator: &'g mut Generator) -> Self {
        Self {
            frame: FrameGuard::new(cx),
            generator,
        }
    }

    pub fn generator(&self) -> &Generator {
        self.generator
    }

    pub fn pushed(&self) -> bool {
        self.frame.pushed
    }

    pub fn pop(&mut self) {
        if !self.frame.pushed {
            return;
        }
        self.frame.cx.pop_generator_frame(self.generator);
        self.frame.pop();
    }
}

impl Drop for GeneratorFrameGuard<'_, '_> {
    fn drop(&mut self) {
        self.pop();
    }
}

thread_local! {
    static CURRENT_SPACE: RefCell<Option<Rc<RefCell<StackSpace>>>> = const { RefCell::new(None) };
}

/// Installs a space as the current thread's stack for the guard's lifetime.
pub struct ThreadSpaceGuard {
    prev: Option<Rc<RefCell<StackSpace>>>,
}

impl ThreadSpaceGuard {
    pub fn install(space: Rc<RefCell<StackSpace>>) -> Self {
        let prev = CURRENT_SPACE.with(|cell| cell.borrow_mut().replace(space));
        Self { prev }
    }
}

impl Drop for ThreadSpaceGuard {
    fn drop(&mut self) {
        let prev = self.prev.take();
        CURRENT_SPACE.with(|cell| *cell.borrow_mut() = prev);
    }
}

pub fn with_thread_space<F, R>(f: F) -> Option<R>
where
    F: FnOnce(&Rc<RefCell<StackSpace>>) -> R,
{
    let space = CURRENT_SPACE.with(|cell| cell.borrow().clone())?;
    Some(f(&space))
}
