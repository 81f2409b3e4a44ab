//! Scripted stack scenarios for `vmstack run`.
//!
//! A scenario declares scripts and functions, then a list of steps applied to
//! named contexts sharing one stack. Every frame-pushing step opens a level
//! that the next `return` of the same context closes, so steps nest the way
//! guards do.

use std::cell::RefCell;
use std::fmt;
use std::path::Path;
use std::rc::Rc;

use anyhow::{Context, anyhow, bail};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;
use vmstack_core::stack::{CallArgs, ContextStack, ExecuteType, FrameView, MaybeConstruct, OomCheck, StackSpace};
use vmstack_core::{ObjectId, Realm, Script, ScriptId, StackConfig, StackError, StackResult, Value, new_thread_space};

const DEFAULT_CONTEXT: &str = "main";
const TRACE_TARGET: &str = "vmstack::scenario";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    #[serde(default)]
    pub stack: Option<StackConfig>,
    #[serde(default, rename = "script")]
    pub scripts: Vec<Script>,
    #[serde(default, rename = "function")]
    pub functions: Vec<FunctionDecl>,
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FunctionDecl {
    pub name: String,
    pub nargs: u32,
    /// Name of the script the function runs.
    pub script: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    #[serde(default = "default_context")]
    pub context: String,
    #[serde(flatten)]
    pub op: Op,
}

fn default_context() -> String {
    DEFAULT_CONTEXT.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    /// Global frame for `script`.
    Execute { script: String },
    Eval {
        script: String,
        #[serde(default)]
        indirect: bool,
    },
    Dummy,
    /// Invoke arguments plus a function frame, as native callers do.
    Invoke {
        function: String,
        #[serde(default)]
        argc: usize,
        #[serde(default)]
        construct: bool,
    },
    /// Inline frame on the running frame's expression stack.
    Call {
        function: String,
        #[serde(default)]
        argc: usize,
        #[serde(default)]
        construct: bool,
    },
    Return,
    Push { value: i32 },
    Pop,
    Save,
    Restore,
    /// Push inline frames until `depth` or overflow, then unwind them all.
    Recurse { function: String, depth: usize },
}

impl Op {
    pub fn name(&self) -> &'static str {
        match self {
            Op::Execute { .. } => "execute",
            Op::Eval { .. } => "eval",
            Op::Dummy => "dummy",
            Op::Invoke { .. } => "invoke",
            Op::Call { .. } => "call",
            Op::Return => "return",
            Op::Push { .. } => "push",
            Op::Pop => "pop",
            Op::Save => "save",
            Op::Restore => "restore",
            Op::Recurse { .. } => "recurse",
        }
    }

    fn script(&self) -> Option<&str> {
        match self {
            Op::Execute { script } | Op::Eval { script, .. } => Some(script),
            _ => None,
        }
    }

    fn function(&self) -> Option<&str> {
        match self {
            Op::Invoke { function, .. } | Op::Call { function, .. } | Op::Recurse { function, .. } => Some(function),
            _ => None,
        }
    }
}

impl Scenario {
    pub fn from_toml_str(src: &str) -> anyhow::Result<Self> {
        toml::from_str(src).context("parse scenario")
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let src = std::fs::read_to_string(path).with_context(|| format!("read scenario {}", path.display()))?;
        Self::from_toml_str(&src).with_context(|| format!("in {}", path.display()))
    }

    /// The `[stack]` table (or defaults) with `VMSTACK_*` overrides applied.
    pub fn stack_config(&self) -> anyhow::Result<StackConfig> {
        self.stack.clone().unwrap_or_default().with_env_overrides()
    }
}

/// Cursor and outcome of one step, taken after the step completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub step: usize,
    pub op: &'static str,
    pub context: String,
    /// Frames reachable from the context's newest segment.
    pub frames: usize,
    pub fp: Option<usize>,
    pub sp: Option<usize>,
    pub pc: Option<u32>,
    pub committed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl fmt::Display for StepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn opt(v: Option<impl fmt::Display>) -> String {
            v.map_or_else(|| "-".to_string(), |v| v.to_string())
        }
        write!(
            f,
            "#{} {} {}: frames={} fp={} sp={} pc={} committed={}",
            self.step,
            self.context,
            self.op,
            self.frames,
            opt(self.fp),
            opt(self.sp),
            opt(self.pc),
            self.committed
        )?;
        if let Some(detail) = &self.detail {
            write!(f, " {detail}")?;
        }
        if let Some(error) = &self.error {
            write!(f, " error: {error}")?;
        }
        Ok(())
    }
}

/// Result of a step: an optional detail on success, the error text otherwise.
type Outcome = Result<Option<String>, String>;

fn outcome<T>(result: StackResult<T>) -> Outcome {
    result.map(|_| None).map_err(|err| err.to_string())
}

/// Run every step of `scenario` on a fresh stack sized by `config`.
pub fn run(scenario: Scenario, config: &StackConfig) -> anyhow::Result<Vec<StepReport>> {
    let program = Program::build(scenario, config)?;
    let mut names: Vec<&str> = Vec::new();
    for step in &program.steps {
        if !names.contains(&step.context.as_str()) {
            names.push(&step.context);
        }
    }
    let contexts: FxHashMap<String, ContextStack> = names
        .into_iter()
        .map(|name| (name.to_string(), ContextStack::new(&program.space)))
        .collect();

    let runner = Runner {
        program: &program,
        contexts: &contexts,
    };
    let mut state = RunState::default();
    runner.run_level(&mut state, None)?;
    Ok(state.reports)
}

struct Program {
    realm: Rc<Realm>,
    space: Rc<RefCell<StackSpace>>,
    closures: FxHashMap<String, ObjectId>,
    steps: Vec<Step>,
}

impl Program {
    fn build(scenario: Scenario, config: &StackConfig) -> anyhow::Result<Self> {
        let mut realm = Realm::new();
        for script in scenario.scripts {
            if script.nfixed > script.nslots {
                bail!("script `{}`: nfixed ({}) exceeds nslots ({})", script.name, script.nfixed, script.nslots);
            }
            realm.add_script(script);
        }
        for decl in &scenario.functions {
            let script = realm
                .script_by_name(&decl.script)
                .ok_or_else(|| anyhow!("function `{}` runs unknown script `{}`", decl.name, decl.script))?;
            realm.add_function(decl.name.as_str(), decl.nargs, script);
        }
        let mut closures = FxHashMap::default();
        for decl in &scenario.functions {
            if let Some(fun) = realm.function_by_name(&decl.name) {
                closures.insert(decl.name.clone(), realm.new_function_object(fun, realm.global()));
            }
        }

        for (idx, step) in scenario.steps.iter().enumerate() {
            if let Some(name) = step.op.script() {
                if realm.script_by_name(name).is_none() {
                    bail!("step #{idx}: unknown script `{name}`");
                }
            }
            if let Some(name) = step.op.function() {
                if !closures.contains_key(name) {
                    bail!("step #{idx}: unknown function `{name}`");
                }
            }
        }

        let realm = Rc::new(realm);
        let space = new_thread_space(config, Rc::clone(&realm)).context("reserve stack")?;
        Ok(Self {
            realm,
            space,
            closures,
            steps: scenario.steps,
        })
    }

    fn script(&self, name: &str) -> anyhow::Result<ScriptId> {
        self.realm
            .script_by_name(name)
            .ok_or_else(|| anyhow!("unknown script `{name}`"))
    }

    fn closure(&self, name: &str) -> anyhow::Result<ObjectId> {
        self.closures
            .get(name)
            .copied()
            .ok_or_else(|| anyhow!("unknown function `{name}`"))
    }

    fn nargs(&self, callee: ObjectId) -> usize {
        self.realm
            .function_of(callee)
            .map_or(0, |fun| self.realm.function(fun).nargs as usize)
    }
}

#[derive(Default)]
struct RunState {
    pos: usize,
    reports: Vec<StepReport>,
}

enum Exit {
    /// Ran out of steps; every open level unwinds.
    End,
    /// The step at this index closed the level.
    Returned(usize),
}

struct Runner<'p> {
    program: &'p Program,
    contexts: &'p FxHashMap<String, ContextStack>,
}

impl<'p> Runner<'p> {
    fn context(&self, name: &str) -> anyhow::Result<&'p ContextStack> {
        self.contexts
            .get(name)
            .ok_or_else(|| anyhow!("unknown context `{name}`"))
    }

    fn report(&self, idx: usize, step: &Step, cx: &ContextStack, outcome: Outcome) -> StepReport {
        let regs = cx.maybe_regs();
        let (detail, error) = match outcome {
            Ok(detail) => (detail, None),
            Err(error) => (None, Some(error)),
        };
        StepReport {
            step: idx,
            op: step.op.name(),
            context: step.context.clone(),
            frames: cx.frames().count(),
            fp: regs.map(|r| r.fp()),
            sp: regs.map(|r| r.sp),
            pc: regs.and_then(|r| r.pc).map(|pc| pc.offset()),
            committed: self.program.space.borrow().committed_end(),
            detail,
            error,
        }
    }

    fn record(&self, state: &mut RunState, idx: usize, step: &Step, cx: &ContextStack, outcome: Outcome) {
        let report = self.report(idx, step, cx, outcome);
        debug!(target: TRACE_TARGET, step = idx, op = report.op, context = %report.context, error = ?report.error, "step");
        state.reports.push(report);
    }

    /// Run steps until `open`'s `return` or the end of the scenario.
    fn run_level(&self, state: &mut RunState, open: Option<&str>) -> anyhow::Result<Exit> {
        while let Some(step) = self.program.steps.get(state.pos) {
            let idx = state.pos;
            state.pos += 1;
            let cx = self.context(&step.context)?;
            let global = self.program.realm.global();

            match &step.op {
                Op::Return => {
                    if open == Some(step.context.as_str()) {
                        return Ok(Exit::Returned(idx));
                    }
                    let err = format!("context `{}` has no frame open at this level", step.context);
                    self.record(state, idx, step, cx, Err(err));
                }
                Op::Execute { script } => {
                    let script = self.program.script(script)?;
                    match cx.push_execute_frame(script, Value::object(global), global, ExecuteType::Global, None) {
                        Ok(guard) => {
                            if !self.enter(state, idx, step, cx, move || {
                                drop(guard);
                                Ok(None)
                            })? {
                                return Ok(Exit::End);
                            }
                        }
                        Err(err) => self.record(state, idx, step, cx, Err(err.to_string())),
                    }
                }
                Op::Eval { script, indirect } => {
                    let script = self.program.script(script)?;
                    let ty = if *indirect { ExecuteType::IndirectEval } else { ExecuteType::DirectEval };
                    match cx.push_execute_frame(script, Value::object(global), global, ty, None) {
                        Ok(guard) => {
                            if !self.enter(state, idx, step, cx, move || {
                                drop(guard);
                                Ok(None)
                            })? {
                                return Ok(Exit::End);
                            }
                        }
                        Err(err) => self.record(state, idx, step, cx, Err(err.to_string())),
                    }
                }
                Op::Dummy => match cx.push_dummy_frame(global) {
                    Ok(guard) => {
                        if !self.enter(state, idx, step, cx, move || {
                            drop(guard);
                            Ok(None)
                        })? {
                            return Ok(Exit::End);
                        }
                    }
                    Err(err) => self.record(state, idx, step, cx, Err(err.to_string())),
                },
                Op::Invoke {
                    function,
                    argc,
                    construct,
                } => {
                    let callee = self.program.closure(function)?;
                    let args = match cx.push_invoke_args(*argc) {
                        Ok(args) => args,
                        Err(err) => {
                            self.record(state, idx, step, cx, Err(err.to_string()));
                            continue;
                        }
                    };
                    {
                        let mut space = cx.space_mut();
                        let mut view = space.args_mut(&args);
                        view.set_callee(Value::object(callee));
                        for i in 0..*argc {
                            view.set(i, Value::int32(i as i32));
                        }
                    }
                    let call_args: &CallArgs = &args;
                    match cx.push_invoke_frame(call_args, MaybeConstruct::from(*construct)) {
                        Ok(frame) => {
                            if !self.enter(state, idx, step, cx, move || {
                                drop(frame);
                                Ok(Some(format!("rval={}", cx.space().args(call_args).rval())))
                            })? {
                                return Ok(Exit::End);
                            }
                        }
                        Err(err) => self.record(state, idx, step, cx, Err(err.to_string())),
                    }
                }
                Op::Call {
                    function,
                    argc,
                    construct,
                } => {
                    let callee = self.program.closure(function)?;
                    match push_inline(cx, callee, *argc, MaybeConstruct::from(*construct)) {
                        Ok(_) => {
                            if !self.enter(state, idx, step, cx, || outcome(cx.pop_inline_frame()))? {
                                return Ok(Exit::End);
                            }
                        }
                        Err(err) => self.record(state, idx, step, cx, Err(err.to_string())),
                    }
                }
                Op::Push { value } => {
                    let result = cx.push_value(Value::int32(*value));
                    self.record(state, idx, step, cx, outcome(result));
                }
                Op::Pop => {
                    let result = if expression_stack_empty(cx) {
                        Err("expression stack is empty".to_string())
                    } else {
                        cx.pop_value()
                            .map(|v| Some(format!("value={v}")))
                            .map_err(|e| e.to_string())
                    };
                    self.record(state, idx, step, cx, result);
                }
                Op::Save => {
                    let result = cx.save_active_segment();
                    self.record(state, idx, step, cx, outcome(result));
                }
                Op::Restore => {
                    let result = cx.restore_segment();
                    self.record(state, idx, step, cx, outcome(result));
                }
                Op::Recurse { function, depth } => {
                    let callee = self.program.closure(function)?;
                    let (reached, err) = recurse(cx, callee, self.program.nargs(callee), *depth);
                    let detail = format!("depth={reached}");
                    let result = match err {
                        None => Ok(Some(detail)),
                        Some(err) => Err(format!("{err} ({detail})")),
                    };
                    self.record(state, idx, step, cx, result);
                }
            }
        }
        Ok(Exit::End)
    }

    /// Report a successful push, run the level it opens, then leave it with
    /// `leave`. Returns `false` once the scenario has ended.
    fn enter(
        &self,
        state: &mut RunState,
        idx: usize,
        step: &Step,
        cx: &ContextStack,
        leave: impl FnOnce() -> Outcome,
    ) -> anyhow::Result<bool> {
        self.record(state, idx, step, cx, Ok(None));
        let exit = self.run_level(state, Some(&step.context))?;
        let left = leave();
        match exit {
            Exit::Returned(ret) => {
                let ret_step = &self.program.steps[ret];
                self.record(state, ret, ret_step, cx, left);
                Ok(true)
            }
            Exit::End => {
                if let Err(err) = left {
                    debug!(target: TRACE_TARGET, step = idx, %err, "unwinding at end of scenario");
                }
                Ok(false)
            }
        }
    }
}

fn expression_stack_empty(cx: &ContextStack) -> bool {
    cx.maybe_regs().is_some_and(|regs| {
        let space = cx.space();
        regs.sp <= space.frame(regs.fp()).base()
    })
}

/// Push `[callee, undefined, 0, 1, ..]` and an inline frame over them. On
/// failure the expression stack is restored.
fn push_inline(cx: &ContextStack, callee: ObjectId, argc: usize, construct: MaybeConstruct) -> StackResult<usize> {
    let regs = cx.regs()?;
    let pushed = (|| {
        cx.push_value(Value::object(callee))?;
        cx.push_value(Value::UNDEFINED)?;
        for i in 0..argc {
            cx.push_value(Value::int32(i as i32))?;
        }
        let args = CallArgs::from_sp(regs.sp + 2 + argc, argc);
        cx.push_inline_frame(&args, callee, construct, &mut OomCheck)
    })();
    match pushed {
        Ok(fp) => Ok(fp),
        Err(err) => {
            cx.set_sp(regs.sp)?;
            Err(err)
        }
    }
}

fn recurse(cx: &ContextStack, callee: ObjectId, nargs: usize, depth: usize) -> (usize, Option<StackError>) {
    let regs = match cx.regs() {
        Ok(regs) => regs,
        Err(err) => return (0, Some(err)),
    };
    let mut reached = 0;
    let mut err = None;
    while reached < depth {
        match push_inline(cx, callee, nargs, MaybeConstruct::NoConstruct) {
            Ok(_) => reached += 1,
            Err(e) => {
                err = Some(e);
                break;
            }
        }
    }
    for _ in 0..reached {
        if let Err(e) = cx.pop_inline_frame() {
            err.get_or_insert(e);
            break;
        }
    }
    if let Err(e) = cx.set_sp(regs.sp) {
        err.get_or_insert(e);
    }
    (reached, err)
}
