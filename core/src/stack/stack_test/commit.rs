use super::*;

#[test]
fn test_over_ceiling_request_keeps_commit() {
    let env = env_with(
        Realm::new(),
        StackConfig {
            capacity_vals: 1024,
            commit_vals: 256,
            jit_extra_vals: 0,
        },
    );
    let mut space = env.space.borrow_mut();
    assert_eq!(space.committed_end(), 256);

    let err = space.ensure_committed(0, 2000).unwrap_err();
    assert_eq!(
        err,
        StackError::Overflow {
            requested: 2000,
            available: 1024
        }
    );
    assert_eq!(space.committed_end(), 256);

    space.ensure_committed(0, 600).expect("smaller request");
    assert_eq!(space.committed_end(), 768);
    assert!(space.committed_end() <= space.reserved_end());
}

#[test]
fn test_recursion_overflows_then_unwinds() {
    let mut realm = Realm::new();
    let main = realm.add_script(Script::new("main", 0, 4));
    let rec = add_function(&mut realm, "rec", 0, 1, 4);
    let env = env(realm);
    let callee = closure(&env.realm, rec);
    let cx = ContextStack::new(&env.space);
    let _global = run_global(&cx, &env.realm, main);
    let before = cx.regs().expect("running");

    let mut depth = 0usize;
    let err = loop {
        let args = match push_inline_args(&cx, callee, 0) {
            Ok(args) => args,
            Err(err) => break err,
        };
        match cx.push_inline_frame(&args, callee, MaybeConstruct::NoConstruct, &mut OomCheck) {
            Ok(_) => depth += 1,
            Err(err) => break err,
        }
    };
    assert!(matches!(err, StackError::Overflow { .. }), "{err}");
    // 2 argument slots, the header and one local per level.
    let per_frame = 2 + VALUES_PER_STACK_FRAME + 1;
    assert!(depth * per_frame > 4096 - per_frame - 16, "depth {depth}");
    {
        let space = env.space.borrow();
        assert_eq!(space.committed_end(), space.reserved_end());
        assert_eq!(space.committed_size(), 4096 * 8);
    }

    for _ in 0..depth {
        cx.pop_inline_frame().expect("pop");
    }
    let after = cx.regs().expect("running");
    assert_eq!(after.fp(), before.fp());
    assert_eq!(after.sp, before.sp + 1);

    // Memory stays committed; another round fits without growing.
    let args = push_inline_args(&cx, callee, 0).expect("args");
    cx.push_inline_frame(&args, callee, MaybeConstruct::NoConstruct, &mut OomCheck)
        .expect("room again");
    cx.pop_inline_frame().expect("pop");
}

#[test]
fn test_stack_limit_covers_running_frame() {
    let mut realm = Realm::new();
    let main = realm.add_script(Script::new("main", 0, 300));
    let env = env(realm);
    let cx = ContextStack::new(&env.space);
    assert_eq!(cx.stack_limit(), Err(StackError::NotRunning));

    let _global = run_global(&cx, &env.realm, main);
    let regs = cx.regs().expect("running");
    let limit = cx.stack_limit().expect("limit");
    assert!(limit >= regs.sp + 300);
    let space = env.space.borrow();
    assert!(limit + space.jit_extra() <= space.committed_end());
}
