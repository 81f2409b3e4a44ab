use super::*;

struct Fixture {
    env: Env,
    global: ScriptId,
    eval: ScriptId,
    huge: ScriptId,
    fun: ObjectId,
}

fn fixture() -> Fixture {
    let mut realm = Realm::new();
    let global = realm.add_script(Script::new("main", 1, 8));
    let eval = realm.add_script(Script::new("eval", 0, 4).strict(true));
    let huge = realm.add_script(Script::new("huge", 0, 10_000));
    let f = add_function(&mut realm, "f", 2, 1, 6);
    let env = env(realm);
    let fun = closure(&env.realm, f);
    Fixture {
        env,
        global,
        eval,
        huge,
        fun,
    }
}

/// Push a frame whose kind depends on `depth`, recurse, and fail with an
/// error once `fail_at` is reached.
fn nest(cx: &ContextStack, fx: &Fixture, depth: usize, max: usize, fail_at: Option<usize>) -> StackResult<usize> {
    if Some(depth) == fail_at {
        return Err(StackError::NotRunning);
    }
    if depth == max {
        return Ok(depth);
    }
    match depth % 3 {
        0 => {
            let args = push_call_args(cx, fx.fun, depth % 4);
            let _frame = cx.push_invoke_frame(&args, MaybeConstruct::NoConstruct)?;
            cx.push_value(Value::int32(depth as i32))?;
            nest(cx, fx, depth + 1, max, fail_at)
        }
        1 => {
            let _frame =
                cx.push_execute_frame(fx.eval, Value::NULL, fx.env.realm.global(), ExecuteType::DirectEval, None)?;
            nest(cx, fx, depth + 1, max, fail_at)
        }
        _ => {
            let _frame = cx.push_dummy_frame(fx.env.realm.global())?;
            nest(cx, fx, depth + 1, max, fail_at)
        }
    }
}

#[test]
fn test_nested_guards_restore_cursor() {
    let fx = fixture();
    let cx = ContextStack::new(&fx.env.space);
    let _global = run_global(&cx, &fx.env.realm, fx.global);
    cx.set_pc(Pc::new(3)).expect("pc");
    cx.push_value(Value::TRUE).expect("push");
    let before = snapshot(&cx);

    assert_eq!(nest(&cx, &fx, 0, 12, None), Ok(12));
    assert_eq!(snapshot(&cx), before);

    for fail_at in 0..12 {
        assert_eq!(nest(&cx, &fx, 0, 12, Some(fail_at)), Err(StackError::NotRunning));
        assert_eq!(snapshot(&cx), before, "fail_at={fail_at}");
    }
    assert_eq!(cx.pop_value(), Ok(Value::TRUE));
}

#[test]
fn test_guard_pop_is_idempotent() {
    let fx = fixture();
    let cx = ContextStack::new(&fx.env.space);
    let mut args = push_call_args(&cx, fx.fun, 2);
    assert!(args.pushed_segment());
    args.pop();
    args.pop();
    assert!(!args.pushed());
    assert!(cx.empty());
    drop(args);
    assert_eq!(fx.env.space.borrow().segment_count(), 0);

    let mut dummy = cx.push_dummy_frame(fx.env.realm.global()).expect("dummy");
    assert!(cx.running());
    dummy.pop();
    dummy.pop();
    assert!(!cx.running());
}

#[test]
fn test_failed_push_leaves_no_trace() {
    let fx = fixture();
    let cx = ContextStack::new(&fx.env.space);
    let _global = run_global(&cx, &fx.env.realm, fx.global);
    let before = snapshot(&cx);

    let err = cx.push_invoke_args(10_000).err().expect("too many args");
    assert!(matches!(err, StackError::Overflow { .. }));
    assert_eq!(snapshot(&cx), before);

    let err = cx
        .push_execute_frame(fx.huge, Value::NULL, fx.env.realm.global(), ExecuteType::Global, None)
        .err()
        .expect("script too large");
    assert!(matches!(err, StackError::Overflow { .. }));
    assert_eq!(snapshot(&cx), before);
    assert!(cx.is_current_and_active());
}

#[test]
fn test_eval_needs_enclosing_frame() {
    let fx = fixture();
    let cx = ContextStack::new(&fx.env.space);
    let err = cx
        .push_execute_frame(fx.eval, Value::NULL, fx.env.realm.global(), ExecuteType::DirectEval, None)
        .err()
        .expect("no frame to eval in");
    assert_eq!(err, StackError::NoEnclosingFrame);
    assert!(cx.empty());
}

#[test]
fn test_eval_rejects_dummy_enclosing_frame() {
    let fx = fixture();
    let realm = &fx.env.realm;
    let cx = ContextStack::new(&fx.env.space);
    let _global = run_global(&cx, realm, fx.global);
    let _dummy = cx.push_dummy_frame(realm.global()).expect("dummy");
    let before = snapshot(&cx);

    for ty in [ExecuteType::DirectEval, ExecuteType::Debug] {
        let err = cx
            .push_execute_frame(fx.eval, Value::NULL, realm.global(), ty, None)
            .err()
            .expect("dummy frame has no script");
        assert_eq!(err, StackError::NoEnclosingFrame);
        assert_eq!(snapshot(&cx), before);
    }

    // Indirect eval runs as global code and only links to the dummy frame.
    {
        let _eval = cx
            .push_execute_frame(fx.eval, Value::NULL, realm.global(), ExecuteType::IndirectEval, None)
            .expect("indirect eval");
        let space = cx.space();
        let e = space.frame(cx.fp().expect("running"));
        assert!(e.is_global_frame() && e.is_eval_frame());
        assert_eq!(e.script_id(), fx.eval);
    }
    assert_eq!(snapshot(&cx), before);
}

#[test]
fn test_execute_frame_kinds() {
    let fx = fixture();
    let realm = &fx.env.realm;
    let cx = ContextStack::new(&fx.env.space);
    let _global = run_global(&cx, realm, fx.global);
    let global_fp = cx.fp().expect("running");
    {
        let space = cx.space();
        let g = space.frame(global_fp);
        assert!(g.is_global_frame() && g.is_frame_pushed_by_execute());
        assert_eq!(g.maybe_callee_value(), Value::NULL);
        assert_eq!(g.this_value(), Value::object(realm.global()));
        assert_eq!(g.scope_chain_if_set(), Some(realm.global()));
        assert_eq!(g.maybe_fun(), None);
    }
    cx.set_pc(Pc::new(3)).expect("pc");

    let args = push_call_args(&cx, fx.fun, 2);
    let _call = cx.push_invoke_frame(&args, MaybeConstruct::NoConstruct).expect("call");
    let call_fp = cx.fp().expect("running");

    {
        let _eval = cx
            .push_execute_frame(fx.eval, Value::int32(1), realm.global(), ExecuteType::DirectEval, None)
            .expect("direct eval");
        let space = cx.space();
        let e = space.frame(cx.fp().expect("running"));
        let call = space.frame(call_fp);
        assert!(e.is_function_frame() && e.is_eval_frame());
        assert!(e.is_direct_eval_or_debugger_frame());
        assert!(e.is_strict_eval_frame());
        assert!(!e.has_args());
        assert_eq!(e.fun(), call.fun());
        assert_eq!(e.callee(), call.callee());
        assert_eq!(e.script_id(), fx.eval);
        assert_eq!(e.this_value(), Value::int32(1));
        assert_eq!(e.prev(), Some(call_fp));
    }

    {
        let _indirect = cx
            .push_execute_frame(fx.eval, Value::NULL, realm.global(), ExecuteType::IndirectEval, None)
            .expect("indirect eval");
        let space = cx.space();
        let e = space.frame(cx.fp().expect("running"));
        assert!(e.is_global_frame() && e.is_eval_frame());
        assert!(!e.is_direct_eval_or_debugger_frame());
        assert_eq!(e.maybe_callee_value(), Value::NULL);
    }

    {
        let _debug = cx
            .push_execute_frame(fx.eval, Value::NULL, realm.global(), ExecuteType::Debug, Some(global_fp))
            .expect("debugger eval");
        let space = cx.space();
        let e = space.frame(cx.fp().expect("running"));
        assert!(e.is_debugger_frame());
        assert_eq!(e.prev(), Some(global_fp));
        assert_eq!(e.prev_pc(), Some(Pc::new(3)));
    }
    assert_eq!(cx.fp(), Ok(call_fp));
}
