use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::error::{StackError, StackResult};
use crate::realm::{FunctionId, ObjectId, Realm, ScriptId};
use crate::value::Value;

use super::args::CallArgs;
use super::check::{LimitCheck, StackCheck};
use super::frame::{ExecuteType, FrameFlags, FrameView, MaybeConstruct, VALUES_PER_STACK_FRAME, steal_frame_and_slots};
use super::generator::{Generator, GeneratorState};
use super::guards::{
    FrameGuard, GeneratorFrameGuard, InvokeArgsGuard, InvokeFrameGuard, with_thread_space,
};
use super::iter::FrameRegsIter;
use super::regs::{FrameRegs, Pc};
use super::segment::{ContextId, SegmentId, SegmentState};
use super::space::StackSpace;

const TRACE_TARGET: &str = "vmstack::segment";

/// One execution context's view of the thread's stack.
///
/// All frame pushes and pops go through here. Several contexts may share a
/// space; each owns a chain of segments linked by `prev_in_context`. A
/// context can only extend its newest segment while that segment is the top
/// of the space and active; otherwise the next push starts a new segment.
pub struct ContextStack {
    space: Rc<RefCell<StackSpace>>,
    id: ContextId,
    seg: Cell<Option<SegmentId>>,
}

impl fmt::Debug for ContextStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextStack")
            .field("id", &self.id)
            .field("seg", &self.seg.get())
            .finish()
    }
}

impl ContextStack {
    pub fn new(space: &Rc<RefCell<StackSpace>>) -> Self {
        let id = space.borrow_mut().next_context_id();
        Self {
            space: Rc::clone(space),
            id,
            seg: Cell::new(None),
        }
    }

    /// A new context on the space installed for this thread.
    pub fn on_current_thread() -> Option<Self> {
        with_thread_space(ContextStack::new)
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn space(&self) -> Ref<'_, StackSpace> {
        self.space.borrow()
    }

    pub fn space_mut(&self) -> RefMut<'_, StackSpace> {
        self.space.borrow_mut()
    }

    pub fn shared_space(&self) -> &Rc<RefCell<StackSpace>> {
        &self.space
    }

    pub fn realm(&self) -> Rc<Realm> {
        Rc::clone(self.space.borrow().realm())
    }

    // State

    /// Nothing pushed by this context is live.
    pub fn empty(&self) -> bool {
        self.seg.get().is_none()
    }

    pub fn current_segment(&self) -> Option<SegmentId> {
        self.seg.get()
    }

    fn on_top(&self, space: &StackSpace) -> bool {
        match self.seg.get() {
            Some(id) => space.current_segment() == Some(id) && space.segment(id).is_active(),
            None => false,
        }
    }

    /// Whether a push may extend this context's newest segment in place.
    pub fn is_current_and_active(&self) -> bool {
        self.on_top(&self.space.borrow())
    }

    /// Whether this context has a frame executing (its newest segment is
    /// active and holds frames).
    pub fn running(&self) -> bool {
        self.maybe_regs().is_some()
    }

    pub fn maybe_regs(&self) -> Option<FrameRegs> {
        let id = self.seg.get()?;
        let space = self.space.borrow();
        let seg = space.segment(id);
        if seg.is_active() { seg.regs } else { None }
    }

    pub fn regs(&self) -> StackResult<FrameRegs> {
        self.maybe_regs().ok_or(StackError::NotRunning)
    }

    pub fn maybe_fp(&self) -> Option<usize> {
        self.maybe_regs().map(|r| r.fp())
    }

    pub fn fp(&self) -> StackResult<usize> {
        self.regs().map(|r| r.fp())
    }

    fn running_regs(&self, space: &StackSpace) -> StackResult<(SegmentId, FrameRegs)> {
        let id = self.seg.get().ok_or(StackError::NotRunning)?;
        let seg = space.segment(id);
        match seg.regs {
            Some(regs) if seg.is_active() => Ok((id, regs)),
            _ => Err(StackError::NotRunning),
        }
    }

    /// Like `running_regs`, but the segment must also be the top of the space.
    fn top_regs(&self, space: &StackSpace) -> StackResult<(SegmentId, FrameRegs)> {
        if !self.on_top(space) {
            return Err(StackError::NotRunning);
        }
        self.running_regs(space)
    }

    /// Mutate the running frame's cursor. Only the context on top of the
    /// space may move it; below the top, `sp` is the next segment's base.
    fn update_regs<R>(&self, f: impl FnOnce(&mut FrameRegs, &mut StackSpace) -> StackResult<R>) -> StackResult<R> {
        let mut space = self.space.borrow_mut();
        let (id, mut regs) = self.top_regs(&space)?;
        let out = f(&mut regs, &mut space)?;
        space.segment_mut(id).regs = Some(regs);
        Ok(out)
    }

    pub fn set_pc(&self, pc: Pc) -> StackResult<()> {
        self.update_regs(|regs, _| {
            regs.pc = Some(pc);
            Ok(())
        })
    }

    pub fn set_sp(&self, sp: usize) -> StackResult<()> {
        self.update_regs(|regs, space| {
            debug_assert!(sp >= regs.fp() + VALUES_PER_STACK_FRAME);
            space.ensure_committed(sp, 0)?;
            regs.sp = sp;
            Ok(())
        })
    }

    /// Push onto the running frame's expression stack.
    pub fn push_value(&self, value: Value) -> StackResult<()> {
        self.update_regs(|regs, space| {
            space.ensure_committed(regs.sp, 1)?;
            space.set_slot(regs.sp, value);
            regs.sp += 1;
            Ok(())
        })
    }

    pub fn pop_value(&self) -> StackResult<Value> {
        self.update_regs(|regs, space| {
            let frame = space.frame(regs.fp());
            debug_assert!(regs.sp > frame.base() || frame.is_dummy_frame());
            regs.sp -= 1;
            Ok(space.slot(regs.sp))
        })
    }

    // Segments

    fn push_segment(&self, space: &mut StackSpace) -> SegmentId {
        let id = space.push_segment(self.id, self.seg.get());
        self.seg.set(Some(id));
        id
    }

    fn pop_segment(&self, space: &mut StackSpace) {
        debug_assert_eq!(space.current_segment(), self.seg.get(), "segments popped out of order");
        if let Some(seg) = space.pop_segment() {
            self.seg.set(seg.prev_in_context);
        }
    }

    /// Park the active segment so another context may run above it. The
    /// cursor is kept exactly as is.
    pub fn save_active_segment(&self) -> StackResult<()> {
        let mut space = self.space.borrow_mut();
        let id = self.seg.get().ok_or(StackError::NotRunning)?;
        let seg = space.segment_mut(id);
        if seg.state != SegmentState::Active {
            return Err(StackError::NotRunning);
        }
        seg.state = SegmentState::Saved;
        debug!(target: TRACE_TARGET, segment = id.0, context = self.id.0, "segment saved");
        Ok(())
    }

    pub fn restore_segment(&self) -> StackResult<()> {
        let mut space = self.space.borrow_mut();
        let id = self.seg.get().ok_or(StackError::NotRunning)?;
        let seg = space.segment_mut(id);
        debug_assert_eq!(seg.state, SegmentState::Saved);
        seg.state = SegmentState::Active;
        debug!(target: TRACE_TARGET, segment = id.0, context = self.id.0, "segment restored");
        Ok(())
    }

    // Invoke

    /// Reserve `[callee, this, args..]` for a call made without an
    /// interpreter frame in between (native code, the embedding API).
    pub fn push_invoke_args(&self, argc: usize) -> StackResult<InvokeArgsGuard<'_>> {
        let mut space = self.space.borrow_mut();
        let nvals = argc + 2;
        let start = space.first_unused();
        space.ensure_committed(start, nvals)?;
        let seg = (!self.on_top(&space)).then(|| self.push_segment(&mut space));
        space.slots_mut()[start..start + nvals].fill(Value::UNDEFINED);
        let prev_override = space.push_override(start + nvals);
        Ok(InvokeArgsGuard::new(self, CallArgs::from_vp(start, argc), seg, prev_override))
    }

    pub(crate) fn pop_invoke_args(&self, pushed_seg: Option<SegmentId>, prev_override: usize) {
        let mut space = self.space.borrow_mut();
        space.pop_override(prev_override);
        if pushed_seg.is_some() {
            debug_assert_eq!(pushed_seg, self.seg.get());
            self.pop_segment(&mut space);
        }
    }

    /// Build a function frame for the callee in `args`, which must be the
    /// most recently pushed invoke arguments.
    pub fn push_invoke_frame<'a>(
        &'a self,
        args: &'a CallArgs,
        construct: MaybeConstruct,
    ) -> StackResult<InvokeFrameGuard<'a>> {
        let mut space = self.space.borrow_mut();
        let id = self.seg.get().ok_or(StackError::NotRunning)?;
        debug_assert_eq!(space.first_unused(), args.end());
        let callee_value = space.args(args).callee_value();
        let callee = callee_value.to_object().ok_or(StackError::NotAFunction(callee_value))?;
        let fun = space
            .realm()
            .function_of(callee)
            .ok_or(StackError::NotAFunction(callee_value))?;

        let mut flags = construct.flags();
        let fp = get_call_frame(&mut space, args, fun, &mut flags, &mut super::check::OomCheck)?;

        let seg = space.segment(id);
        let prev_regs = seg.regs;
        let sets_initial = seg.initial_frame.is_none();
        let (prev, prevpc) = match prev_regs {
            Some(r) if seg.is_active() => (Some(r.fp()), r.pc),
            _ => (None, None),
        };
        space
            .frame_mut(fp)
            .init_call_frame(callee, fun, args.argc(), flags, prev, prevpc);
        let nfixed = space.realm().function_script(fun).nfixed as usize;
        let seg = space.segment_mut(id);
        seg.regs = Some(FrameRegs::prepare_to_run(fp, nfixed));
        if sets_initial {
            seg.initial_frame = Some(fp);
        }
        trace!(target: TRACE_TARGET, fp, argc = args.argc(), ?flags, "invoke frame pushed");
        Ok(InvokeFrameGuard::new(self, args, prev_regs, sets_initial))
    }

    pub(crate) fn pop_invoke_frame(&self, args: &CallArgs, prev_regs: Option<FrameRegs>, sets_initial: bool) {
        let mut space = self.space.borrow_mut();
        let Some(id) = self.seg.get() else {
            debug_assert!(false, "invoke frame popped with no segment");
            return;
        };
        if let Some(regs) = space.segment(id).regs {
            let rval = space.frame(regs.fp()).return_value();
            space.set_slot(args.base(), rval);
            args.mark_rval_used();
        }
        let seg = space.segment_mut(id);
        seg.regs = prev_regs;
        if sets_initial {
            seg.initial_frame = None;
        }
    }

    // Execute and dummy frames

    /// Push a global, eval or debugger frame in a fresh segment. Eval frames
    /// link to `eval_in_frame` when given, otherwise to the current frame.
    pub fn push_execute_frame(
        &self,
        script: ScriptId,
        this: Value,
        scope_chain: ObjectId,
        ty: ExecuteType,
        eval_in_frame: Option<usize>,
    ) -> StackResult<FrameGuard<'_>> {
        let (prev, prevpc) = match eval_in_frame {
            Some(fp) => (Some(fp), self.pc_quadratic(fp)),
            None => {
                let regs = self.maybe_regs();
                (regs.map(|r| r.fp()), regs.and_then(|r| r.pc))
            }
        };
        let mut space = self.space.borrow_mut();
        if ty != ExecuteType::Global {
            let prev_fp = prev.ok_or(StackError::NoEnclosingFrame)?;
            // Direct and debugger eval frames inherit their kind from `prev`.
            if !ty.flags().contains(FrameFlags::GLOBAL) && space.frame(prev_fp).is_dummy_frame() {
                return Err(StackError::NoEnclosingFrame);
            }
        }
        let (nfixed, nslots) = {
            let meta = space.realm().script(script);
            (meta.nfixed as usize, meta.nslots as usize)
        };
        let base = space.first_unused();
        space.ensure_committed(base, 2 + VALUES_PER_STACK_FRAME + nslots)?;
        let id = self.push_segment(&mut space);
        let fp = base + 2;
        space
            .frame_mut(fp)
            .init_execute_frame(script, prev, prevpc, this, scope_chain, ty);
        let seg = space.segment_mut(id);
        seg.regs = Some(FrameRegs::prepare_to_run(fp, nfixed));
        seg.initial_frame = Some(fp);
        trace!(target: TRACE_TARGET, fp, ?ty, "execute frame pushed");
        Ok(FrameGuard::new(self))
    }

    /// Placeholder frame carrying only a scope chain.
    pub fn push_dummy_frame(&self, scope_chain: ObjectId) -> StackResult<FrameGuard<'_>> {
        let regs = self.maybe_regs();
        let mut space = self.space.borrow_mut();
        let base = space.first_unused();
        space.ensure_committed(base, VALUES_PER_STACK_FRAME)?;
        let id = self.push_segment(&mut space);
        let fp = base;
        space
            .frame_mut(fp)
            .init_dummy_frame(scope_chain, regs.map(|r| r.fp()), regs.and_then(|r| r.pc));
        let seg = space.segment_mut(id);
        seg.regs = Some(FrameRegs::dummy(fp));
        seg.initial_frame = Some(fp);
        Ok(FrameGuard::new(self))
    }

    pub(crate) fn pop_frame_segment(&self) {
        let mut space = self.space.borrow_mut();
        self.pop_segment(&mut space);
    }

    // Generators

    /// Copy a suspended generator's frame onto the stack and run it there.
    pub fn push_generator_frame<'a, 'g>(
        &'a self,
        generator: &'g mut Generator,
    ) -> StackResult<GeneratorFrameGuard<'a, 'g>> {
        match generator.state {
            GeneratorState::Running => return Err(StackError::GeneratorRunning),
            GeneratorState::Closed => return Err(StackError::GeneratorClosed),
            GeneratorState::Newborn | GeneratorState::Open => {}
        }
        let regs = self.maybe_regs();
        let mut space = self.space.borrow_mut();
        let base = space.first_unused();
        space.ensure_committed(base, generator.floating.len())?;
        let id = self.push_segment(&mut space);

        let floating_regs = generator.regs;
        let fp = steal_frame_and_slots(
            space.slots_mut(),
            base,
            &generator.floating,
            0,
            floating_regs.fp(),
            floating_regs.sp,
        );
        {
            let mut frame = space.frame_mut(fp);
            frame.reset_generator_prev(regs.map(|r| r.fp()), regs.and_then(|r| r.pc));
            frame.unset_floating_generator();
        }
        let seg = space.segment_mut(id);
        seg.regs = Some(FrameRegs::rebase_from_to(&floating_regs, fp));
        seg.initial_frame = Some(fp);

        generator.state = GeneratorState::Running;
        generator.live_fp = Some(fp);
        debug!(target: "vmstack::generator", from = floating_regs.fp(), to = fp, "generator frame pushed");
        Ok(GeneratorFrameGuard::new(self, generator))
    }

    /// Move the running generator frame back into its own storage. A frame
    /// that is yielding stays resumable; anything else closes the generator.
    pub(crate) fn pop_generator_frame(&self, generator: &mut Generator) {
        let space = self.space.borrow();
        let Some(id) = self.seg.get() else {
            debug_assert!(false, "generator frame popped with no segment");
            return;
        };
        let Some(regs) = space.segment(id).regs else {
            debug_assert!(false, "generator segment lost its frame");
            return;
        };
        debug_assert_eq!(Some(regs.fp()), generator.live_fp);
        let frame = space.frame(regs.fp());
        let vp = frame.vp_start();
        let yielding = frame.is_yielding();
        debug_assert!(regs.sp - vp <= generator.floating.len());

        let fp = steal_frame_and_slots(&mut generator.floating, 0, space.slots(), vp, regs.fp(), regs.sp);
        generator.regs = FrameRegs::rebase_from_to(&regs, fp);
        {
            let mut floating = generator.floating_frame_mut();
            floating.set_floating_generator();
            if yielding {
                floating.clear_yielding();
            }
        }
        generator.live_fp = None;
        generator.state = if yielding { GeneratorState::Open } else { GeneratorState::Closed };
        debug!(
            target: "vmstack::generator",
            from = regs.fp(),
            state = ?generator.state,
            "generator frame popped"
        );
    }

    // Inline frames

    /// Push a call frame directly on the running frame's expression stack,
    /// where `args` ends at the current `sp`. Returns the new frame pointer.
    pub fn push_inline_frame<C: StackCheck>(
        &self,
        args: &CallArgs,
        callee: ObjectId,
        construct: MaybeConstruct,
        check: &mut C,
    ) -> StackResult<usize> {
        let mut space = self.space.borrow_mut();
        let (id, regs) = self.top_regs(&space)?;
        debug_assert_eq!(args.end(), regs.sp);
        let fun = resolve_function(&space, callee)?;
        debug_assert_eq!(space.args(args).callee(), Some(callee));

        let mut flags = construct.flags();
        let fp = get_call_frame(&mut space, args, fun, &mut flags, check)?;
        space
            .frame_mut(fp)
            .init_call_frame(callee, fun, args.argc(), flags, Some(regs.fp()), regs.pc);
        let nfixed = space.realm().function_script(fun).nfixed as usize;
        space.segment_mut(id).regs = Some(FrameRegs::prepare_to_run(fp, nfixed));
        Ok(fp)
    }

    /// Pop the running inline frame. Its return value lands in the callee
    /// slot, which becomes the caller's top of stack.
    pub fn pop_inline_frame(&self) -> StackResult<()> {
        let mut space = self.space.borrow_mut();
        let (id, mut regs) = self.top_regs(&space)?;
        let frame = space.frame(regs.fp());
        debug_assert!(frame.is_non_eval_function_frame());
        let prev = frame.prev().ok_or(StackError::NotRunning)?;
        let prevpc = frame.prev_pc();
        let rval = frame.return_value();
        let newsp = frame.actual_args_start() - 1;
        space.set_slot(newsp - 1, rval);
        regs.pop_frame(newsp, prev, prevpc);
        space.segment_mut(id).regs = Some(regs);
        Ok(())
    }

    /// Arity-mismatch path for JIT calls: lays out the arguments and
    /// performs the caller half and early prologue. The cursor is left alone
    /// until [`ContextStack::finish_fixup_frame`].
    pub fn get_fixup_frame(
        &self,
        args: &CallArgs,
        callee: ObjectId,
        ncode: u64,
        construct: MaybeConstruct,
        limit: &mut usize,
    ) -> StackResult<usize> {
        let mut space = self.space.borrow_mut();
        let (_, regs) = self.top_regs(&space)?;
        let fun = resolve_function(&space, callee)?;
        let mut flags = construct.flags();
        let fp = get_call_frame(&mut space, args, fun, &mut flags, &mut LimitCheck::new(limit))?;
        let mut frame = space.frame_mut(fp);
        frame.init_jit_frame_caller_half(flags, Some(regs.fp()), regs.pc, ncode);
        frame.init_jit_frame_early_prologue(fun, args.argc());
        Ok(fp)
    }

    pub fn finish_fixup_frame(&self, fp: usize) -> StackResult<()> {
        let mut space = self.space.borrow_mut();
        let (id, regs) = self.top_regs(&space)?;
        let mut frame = space.frame_mut(fp);
        debug_assert_eq!(frame.prev(), Some(regs.fp()));
        frame.init_jit_frame_late_prologue();
        let nfixed = frame.num_fixed();
        space.segment_mut(id).regs = Some(FrameRegs::prepare_to_run(fp, nfixed));
        Ok(())
    }

    // Walking

    /// Frames of this context, newest first. Holds a shared borrow of the
    /// space until dropped.
    pub fn frames(&self) -> FrameRegsIter<'_> {
        FrameRegsIter::new(self.space.borrow(), self.seg.get())
    }

    /// Pc of an arbitrary frame of this context. Walks from the top, so it
    /// costs O(depth).
    pub fn pc_quadratic(&self, fp: usize) -> Option<Pc> {
        self.frames().find(|c| c.fp == fp).and_then(|c| c.pc)
    }

    pub fn contains(&self, fp: usize) -> bool {
        self.frames().any(|c| c.fp == fp)
    }

    /// Limit JIT code of the running frame may grow to without checking.
    pub fn stack_limit(&self) -> StackResult<usize> {
        let mut space = self.space.borrow_mut();
        let (_, regs) = self.top_regs(&space)?;
        let need = space.frame(regs.fp()).num_slots() + space.jit_extra();
        space.ensure_committed(regs.sp, need)?;
        Ok(space.compute_limit(regs.sp))
    }
}

fn resolve_function(space: &StackSpace, callee: ObjectId) -> StackResult<FunctionId> {
    space
        .realm()
        .function_of(callee)
        .ok_or(StackError::NotAFunction(Value::object(callee)))
}

/// Lay out formals for a call whose arguments end at `args.end()` and return
/// where the frame header goes. Missing formals are padded with undefined;
/// on overflow `callee, this, formals` are copied above the actuals so the
/// formals sit directly below the header either way.
fn get_call_frame<C: StackCheck>(
    space: &mut StackSpace,
    args: &CallArgs,
    fun: FunctionId,
    flags: &mut FrameFlags,
    check: &mut C,
) -> StackResult<usize> {
    let (nformal, nslots) = {
        let realm = space.realm();
        (
            realm.function(fun).nargs as usize,
            realm.function_script(fun).nslots as usize,
        )
    };
    let argc = args.argc();
    let first = args.end();
    let frame_vals = VALUES_PER_STACK_FRAME + nslots;

    if argc == nformal {
        check.check(space, first, frame_vals)?;
        return Ok(first);
    }

    if argc < nformal {
        let missing = nformal - argc;
        check.check(space, first, missing + frame_vals)?;
        space.slots_mut()[first..first + missing].fill(Value::UNDEFINED);
        flags.insert(FrameFlags::UNDERFLOW_ARGS);
        return Ok(first + missing);
    }

    let ncopy = 2 + nformal;
    check.check(space, first, ncopy + frame_vals)?;
    let src = args.base();
    space.slots_mut().copy_within(src..src + ncopy, first);
    flags.insert(FrameFlags::OVERFLOW_ARGS);
    Ok(first + ncopy)
}
