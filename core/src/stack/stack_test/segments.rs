use super::*;

fn two_script_realm() -> (Realm, ScriptId, FunctionId) {
    let mut realm = Realm::new();
    let main = realm.add_script(Script::new("main", 2, 8));
    let f = add_function(&mut realm, "f", 1, 1, 4);
    (realm, main, f)
}

fn frames_of(cx: &ContextStack) -> Vec<FrameCursor> {
    cx.frames().collect()
}

#[test]
fn test_interleaved_contexts_save_restore() {
    let (realm, main, f) = two_script_realm();
    let env = env(realm);
    let callee = closure(&env.realm, f);
    let a = ContextStack::new(&env.space);
    let b = ContextStack::new(&env.space);

    let _a_global = run_global(&a, &env.realm, main);
    a.push_value(Value::int32(10)).expect("push");
    let a_args = push_call_args(&a, callee, 1);
    let _a_call = a.push_invoke_frame(&a_args, MaybeConstruct::NoConstruct).expect("call");
    a.set_pc(Pc::new(2)).expect("pc");
    a.push_value(Value::int32(11)).expect("push");

    let a_regs = a.regs().expect("running");
    let a_frames = frames_of(&a);
    let a_seg = a.current_segment().expect("segment");
    let a_live: Vec<Value> = env.space.borrow().slots()[..a_regs.sp].to_vec();

    a.save_active_segment().expect("save");
    assert!(!a.running());
    assert_eq!(env.space.borrow().segment(a_seg).state(), SegmentState::Saved);

    {
        let _b_global = run_global(&b, &env.realm, main);
        let b_seg = b.current_segment().expect("segment");
        {
            let space = env.space.borrow();
            let seg = space.segment(b_seg);
            assert_eq!(seg.prev_in_memory(), Some(a_seg));
            assert_eq!(seg.prev_in_context(), None);
            assert!(seg.base() >= a_regs.sp);
        }
        let b_args = push_call_args(&b, callee, 3);
        let _b_call = b.push_invoke_frame(&b_args, MaybeConstruct::NoConstruct).expect("call");
        b.push_value(Value::int32(99)).expect("push");
        let b_frames = frames_of(&b);
        assert_eq!(b_frames.len(), 2);
        assert!(b_frames.iter().all(|c| !a_frames.iter().any(|a| a.fp == c.fp)));
        assert!(!a.is_current_and_active());
    }
    assert!(b.empty());

    a.restore_segment().expect("restore");
    assert!(a.running());
    assert!(a.is_current_and_active());
    assert_eq!(a.regs(), Ok(a_regs));
    assert_eq!(frames_of(&a), a_frames);
    assert_eq!(&env.space.borrow().slots()[..a_regs.sp], &a_live[..]);
    assert_eq!(a.pop_value(), Ok(Value::int32(11)));
}

#[test]
fn test_reentry_suspends_and_reactivates_segment() {
    let (realm, main, _) = two_script_realm();
    let env = env(realm);
    let cx = ContextStack::new(&env.space);
    let _global = run_global(&cx, &env.realm, main);
    let outer = cx.current_segment().expect("segment");

    {
        let _inner = run_global(&cx, &env.realm, main);
        let inner = cx.current_segment().expect("segment");
        assert_ne!(inner, outer);
        let space = env.space.borrow();
        assert_eq!(space.segment(outer).state(), SegmentState::Suspended);
        assert_eq!(space.segment(inner).prev_in_context(), Some(outer));
        assert_eq!(space.segment(inner).prev_in_memory(), Some(outer));
    }
    assert_eq!(cx.current_segment(), Some(outer));
    assert_eq!(env.space.borrow().segment(outer).state(), SegmentState::Active);
}

#[test]
fn test_context_below_other_context_starts_new_segment() {
    let (realm, main, f) = two_script_realm();
    let env = env(realm);
    let callee = closure(&env.realm, f);
    let a = ContextStack::new(&env.space);
    let b = ContextStack::new(&env.space);

    let _a_global = run_global(&a, &env.realm, main);
    let a_global_fp = a.fp().expect("running");
    let a_first = a.current_segment();
    let _b_global = run_global(&b, &env.realm, main);
    let b_seg = b.current_segment();

    // A is still active but no longer on top: its call needs a segment of its own.
    assert!(a.running());
    assert!(!a.is_current_and_active());
    let args = push_call_args(&a, callee, 1);
    assert!(args.pushed_segment());
    let _call = a.push_invoke_frame(&args, MaybeConstruct::NoConstruct).expect("call");
    let call_fp = a.fp().expect("running");
    {
        let space = env.space.borrow();
        let seg = space.segment(a.current_segment().expect("segment"));
        assert_eq!(seg.prev_in_context(), a_first);
        assert_eq!(seg.prev_in_memory(), b_seg);
        assert_eq!(seg.initial_frame(), Some(call_fp));
        assert_eq!(space.frame(call_fp).prev(), None);
        assert_eq!(space.containing_segment(call_fp), a.current_segment());
        assert_eq!(space.containing_segment(a_global_fp), a_first);
    }
    let fps: Vec<usize> = a.frames().map(|c| c.fp).collect();
    assert_eq!(fps, vec![call_fp, a_global_fp]);
    assert!(!b.contains(call_fp));
}

#[test]
fn test_context_below_top_cannot_move_its_cursor() {
    let (realm, main, _) = two_script_realm();
    let env = env(realm);
    let a = ContextStack::new(&env.space);
    let b = ContextStack::new(&env.space);

    let _a_global = run_global(&a, &env.realm, main);
    let a_regs = a.regs().expect("running");
    let _b_global = run_global(&b, &env.realm, main);
    let b_fp = b.fp().expect("running");
    // B's callee and this sit right at A's sp.
    assert_eq!(b_fp - 2, a_regs.sp);
    let b_words = b_fp - 2..b_fp + VALUES_PER_STACK_FRAME;
    let b_before: Vec<Value> = env.space.borrow().slots()[b_words.clone()].to_vec();

    assert!(a.running());
    assert_eq!(a.push_value(Value::int32(1000)), Err(StackError::NotRunning));
    assert_eq!(a.pop_value(), Err(StackError::NotRunning));
    assert_eq!(a.set_sp(a_regs.sp + 1), Err(StackError::NotRunning));
    assert_eq!(a.set_pc(Pc::new(4)), Err(StackError::NotRunning));
    assert_eq!(a.stack_limit(), Err(StackError::NotRunning));
    assert_eq!(a.regs(), Ok(a_regs));
    assert_eq!(&env.space.borrow().slots()[b_words], &b_before[..]);
    assert!(env.space.borrow().frame(b_fp).is_global_frame());

    b.push_value(Value::int32(1)).expect("top context pushes");
    assert_eq!(b.pop_value(), Ok(Value::int32(1)));
}

#[test]
fn test_thread_space_guard_installs_and_restores() {
    let env = env(Realm::new());
    assert!(ContextStack::on_current_thread().is_none());
    {
        let _installed = ThreadSpaceGuard::install(Rc::clone(&env.space));
        let cx = ContextStack::on_current_thread().expect("installed space");
        assert!(Rc::ptr_eq(cx.shared_space(), &env.space));
    }
    assert!(ContextStack::on_current_thread().is_none());
}
