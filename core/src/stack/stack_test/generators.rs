use super::*;

struct GenFixture {
    env: Env,
    main: ScriptId,
    callee: ObjectId,
}

fn gen_fixture() -> GenFixture {
    let mut realm = Realm::new();
    let main = realm.add_script(Script::new("main", 0, 8));
    let f = add_function(&mut realm, "gen", 2, 2, 6);
    let env = env(realm);
    let callee = closure(&env.realm, f);
    GenFixture { env, main, callee }
}

/// Run the generator body up to its first suspension point and detach it.
fn start_generator(cx: &ContextStack, fx: &GenFixture) -> (Generator, usize, FrameRegs) {
    let args = push_call_args(cx, fx.callee, 2);
    env_set_this(cx, &args, Value::int32(7));
    let _frame = cx.push_invoke_frame(&args, MaybeConstruct::NoConstruct).expect("call");
    let fp = cx.fp().expect("running");
    {
        let mut space = cx.space_mut();
        let mut f = space.frame_mut(fp);
        f.set_var_slot(0, Value::int32(100));
        f.set_var_slot(1, Value::int32(101));
    }
    cx.push_value(Value::int32(5)).expect("push");
    cx.set_pc(Pc::new(4)).expect("pc");
    let regs = cx.regs().expect("running");
    let generator = Generator::from_current_frame(cx).expect("detach");
    (generator, fp, regs)
}

fn env_set_this(cx: &ContextStack, args: &CallArgs, this: Value) {
    cx.space_mut().args_mut(args).set_this(this);
}

#[test]
fn test_generator_resumes_at_new_address() {
    let fx = gen_fixture();
    let cx = ContextStack::new(&fx.env.space);
    let _global = run_global(&cx, &fx.env.realm, fx.main);
    let global_fp = cx.fp().expect("running");

    let (mut generator, old_fp, old_regs) = start_generator(&cx, &fx);
    assert_eq!(generator.state(), GeneratorState::Newborn);
    {
        let floating = generator.frame();
        assert!(floating.is_generator_frame() && floating.is_floating_generator());
        assert_eq!(floating.prev(), None);
        assert_eq!(floating.formal_arg(1), Value::int32(1));
        assert_eq!(floating.var_slot(1), Value::int32(101));
    }

    // Occupy the slots the frame came from.
    let _pad = push_call_args(&cx, fx.callee, 5);

    let new_fp = {
        let guard = cx.push_generator_frame(&mut generator).expect("resume");
        let new_fp = guard.generator().live_fp().expect("running");
        assert_ne!(new_fp, old_fp);

        let regs = cx.regs().expect("running");
        assert_eq!(regs.fp(), new_fp);
        assert_eq!(regs.sp - regs.fp(), old_regs.sp - old_regs.fp());
        assert_eq!(regs.pc, Some(Pc::new(4)));
        {
            let space = cx.space();
            let f = space.frame(new_fp);
            assert!(f.is_generator_frame() && !f.is_floating_generator());
            assert_eq!(f.prev(), Some(global_fp));
            assert_eq!(f.formal_arg(0), Value::int32(0));
            assert_eq!(f.formal_arg(1), Value::int32(1));
            assert_eq!(f.this_value(), Value::int32(7));
            assert_eq!(f.callee(), Some(fx.callee));
            assert_eq!(f.var_slot(0), Value::int32(100));
            assert_eq!(space.slot(regs.sp - 1), Value::int32(5));
        }

        cx.space_mut().frame_mut(new_fp).set_yielding();
        cx.push_value(Value::int32(6)).expect("push");
        new_fp
    };

    assert_eq!(generator.state(), GeneratorState::Open);
    assert_eq!(generator.live_fp(), None);
    let floating = generator.frame();
    assert!(floating.is_floating_generator() && !floating.is_yielding());
    let rel_sp = generator.floating_regs().sp;
    assert_eq!(generator.floating_slot(rel_sp - 1), Value::int32(6));
    assert_eq!(generator.floating_slot(rel_sp - 2), Value::int32(5));
    assert!(!cx.contains(new_fp));
    assert_eq!(cx.fp(), Ok(global_fp));
}

#[test]
fn test_generator_closes_when_frame_returns() {
    let fx = gen_fixture();
    let cx = ContextStack::new(&fx.env.space);
    let _global = run_global(&cx, &fx.env.realm, fx.main);
    let (mut generator, _, _) = start_generator(&cx, &fx);

    let before = snapshot(&cx);
    {
        let guard = cx.push_generator_frame(&mut generator).expect("resume");
        assert!(guard.pushed());
        assert!(guard.generator().is_running());
    }
    assert_eq!(snapshot(&cx), before);
    assert_eq!(generator.state(), GeneratorState::Closed);
    let err = cx.push_generator_frame(&mut generator).err().expect("closed");
    assert_eq!(err, StackError::GeneratorClosed);
}

#[test]
fn test_generator_roots_follow_the_frame() {
    let fx = gen_fixture();
    let cx = ContextStack::new(&fx.env.space);
    let _global = run_global(&cx, &fx.env.realm, fx.main);
    let (mut generator, _, _) = start_generator(&cx, &fx);

    let mut roots = RootSet::default();
    generator.trace(&mut roots);
    assert!(roots.contains_object(fx.callee));
    assert_eq!(roots.scripts.len(), 1);

    let guard = cx.push_generator_frame(&mut generator).expect("resume");
    let mut floating = RootSet::default();
    guard.generator().trace(&mut floating);
    assert_eq!(floating.values, 0);

    let mut stack = RootSet::default();
    cx.space().trace(&mut stack);
    assert!(stack.contains_object(fx.callee));
    assert!(stack.contains_object(fx.env.realm.global()));
}

#[test]
fn test_generator_close_is_terminal() {
    let fx = gen_fixture();
    let cx = ContextStack::new(&fx.env.space);
    let _global = run_global(&cx, &fx.env.realm, fx.main);
    let (mut generator, _, _) = start_generator(&cx, &fx);
    generator.close();
    assert!(matches!(
        cx.push_generator_frame(&mut generator),
        Err(StackError::GeneratorClosed)
    ));
}
