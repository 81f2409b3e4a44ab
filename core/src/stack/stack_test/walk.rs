use super::*;

#[test]
fn test_frame_regs_iter_crosses_segments() {
    let mut realm = Realm::new();
    let main = realm.add_script(Script::new("main", 0, 8));
    let eval = realm.add_script(Script::new("eval", 1, 4));
    let f = add_function(&mut realm, "f", 1, 0, 4);
    let env = env(realm);
    let callee = closure(&env.realm, f);
    let cx = ContextStack::new(&env.space);

    let _global = run_global(&cx, &env.realm, main);
    let g_fp = cx.fp().expect("running");
    cx.set_pc(Pc::new(2)).expect("pc");

    let f1_args = push_call_args(&cx, callee, 1);
    let _f1 = cx.push_invoke_frame(&f1_args, MaybeConstruct::NoConstruct).expect("f1");
    let f1_fp = cx.fp().expect("running");
    cx.set_pc(Pc::new(5)).expect("pc");
    let f1_regs = cx.regs().expect("running");

    let _eval = cx
        .push_execute_frame(eval, Value::NULL, env.realm.global(), ExecuteType::DirectEval, None)
        .expect("eval");
    let e_fp = cx.fp().expect("running");
    cx.set_pc(Pc::new(9)).expect("pc");

    let f2_args = push_call_args(&cx, callee, 3);
    let _f2 = cx.push_invoke_frame(&f2_args, MaybeConstruct::NoConstruct).expect("f2");
    let f2_fp = cx.fp().expect("running");

    let cursors: Vec<FrameCursor> = cx.frames().collect();
    let fps: Vec<usize> = cursors.iter().map(|c| c.fp).collect();
    assert_eq!(fps, vec![f2_fp, e_fp, f1_fp, g_fp]);
    assert_eq!(cursors[0].pc, Some(Pc::new(0)));
    assert_eq!(cursors[1].pc, Some(Pc::new(9)));
    // The caller's stack still holds the arguments it pushed.
    assert_eq!(cursors[1].sp, f2_args.end());
    assert_eq!(cursors[2], FrameCursor {
        fp: f1_fp,
        sp: f1_regs.sp,
        pc: Some(Pc::new(5)),
    });
    assert_eq!(cursors[3].pc, Some(Pc::new(2)));
    assert_eq!(cursors[3].sp, f1_args.end());

    assert_eq!(cx.pc_quadratic(g_fp), Some(Pc::new(2)));
    assert_eq!(cx.pc_quadratic(e_fp), Some(Pc::new(9)));
    assert!(cx.contains(f1_fp));
    assert!(!cx.contains(f2_fp + 1));
}

#[test]
fn test_all_frames_covers_every_context() {
    let mut realm = Realm::new();
    let main = realm.add_script(Script::new("main", 0, 8));
    let f = add_function(&mut realm, "f", 0, 0, 2);
    let env = env(realm);
    let callee = closure(&env.realm, f);
    let a = ContextStack::new(&env.space);
    let b = ContextStack::new(&env.space);

    let _a_global = run_global(&a, &env.realm, main);
    let a_args = push_call_args(&a, callee, 0);
    let _a_call = a.push_invoke_frame(&a_args, MaybeConstruct::NoConstruct).expect("call");
    a.save_active_segment().expect("save");

    let _b_dummy = b.push_dummy_frame(env.realm.global()).expect("dummy");
    let b_fp = b.fp().expect("running");

    let space = env.space.borrow();
    let all: Vec<(usize, bool)> = space
        .all_frames()
        .map(|(_, frame)| (frame.fp(), frame.is_dummy_frame()))
        .collect();
    assert_eq!(all.len(), 3);
    assert_eq!(all[0], (b_fp, true));
    assert!(all[1].0 > all[2].0);
    assert!(all[1..].iter().all(|&(_, dummy)| !dummy));
    drop(space);

    // Restoring under another context's live segment keeps A off the top.
    a.restore_segment().expect("restore");
    assert!(a.running());
    assert!(!a.is_current_and_active());
}

#[test]
fn test_trace_reports_header_and_slot_roots() {
    let mut realm = Realm::new();
    let main = realm.add_script(Script::new("main", 0, 8));
    let f = add_function(&mut realm, "f", 1, 1, 4);
    let env = env(realm);
    let callee = closure(&env.realm, f);
    let cx = ContextStack::new(&env.space);
    let _global = run_global(&cx, &env.realm, main);

    let held = env.realm.new_object(crate::realm::ObjectKind::Plain, None);
    let call_obj = env.realm.new_object(crate::realm::ObjectKind::Call, Some(env.realm.global()));
    let args = push_call_args(&cx, callee, 1);
    let _call = cx.push_invoke_frame(&args, MaybeConstruct::NoConstruct).expect("call");
    let fp = cx.fp().expect("running");
    cx.push_value(Value::object(held)).expect("push");
    {
        let mut space = cx.space_mut();
        let mut frame = space.frame_mut(fp);
        frame.set_scope_chain_with_own_call_obj(call_obj);
        frame.set_return_value(Value::TRUE);
    }

    let mut roots = RootSet::default();
    cx.space().trace(&mut roots);
    assert!(roots.contains_object(held));
    assert!(roots.contains_object(callee));
    assert!(roots.contains_object(call_obj));
    assert_eq!(roots.scripts.len(), 2);
    {
        let space = cx.space();
        let frame = space.frame(fp);
        assert!(frame.has_call_obj());
        assert_eq!(frame.return_value(), Value::TRUE);
    }
}
