use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

use crate::realm::{FunctionId, ObjectId, Realm, Script, ScriptId};
use crate::value::Value;

use super::regs::Pc;

// Header word offsets, relative to the frame pointer. JIT code addresses these
// directly; see `layout::FrameLayout`.
pub(crate) const FLAGS: usize = 0;
pub(crate) const EXEC: usize = 1;
pub(crate) const ARGS: usize = 2;
pub(crate) const SCOPE_CHAIN: usize = 3;
pub(crate) const PREV: usize = 4;
pub(crate) const NCODE: usize = 5;
pub(crate) const RVAL: usize = 6;
pub(crate) const PREVPC: usize = 7;
pub(crate) const IMACROPC: usize = 8;
pub(crate) const HOOK_DATA: usize = 9;
pub(crate) const ANNOTATION: usize = 10;

/// Number of value-sized words in a frame header.
pub const VALUES_PER_STACK_FRAME: usize = 11;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FrameFlags(u32);

impl FrameFlags {
    // primary frame type
    pub const GLOBAL: Self = Self(0x1);
    pub const FUNCTION: Self = Self(0x2);
    pub const DUMMY: Self = Self(0x4);

    // frame subtypes
    pub const EVAL: Self = Self(0x8);
    pub const DEBUGGER: Self = Self(0x10);
    pub const GENERATOR: Self = Self(0x20);
    pub const FLOATING_GENERATOR: Self = Self(0x40);
    pub const CONSTRUCTING: Self = Self(0x80);

    // temporary states
    pub const YIELDING: Self = Self(0x100);
    pub const FINISHED_IN_INTERP: Self = Self(0x200);

    // arguments
    pub const OVERRIDE_ARGS: Self = Self(0x400);
    pub const OVERFLOW_ARGS: Self = Self(0x800);
    pub const UNDERFLOW_ARGS: Self = Self(0x1000);

    // lazily initialized fields
    pub const HAS_IMACRO_PC: Self = Self(0x2000);
    pub const HAS_CALL_OBJ: Self = Self(0x4000);
    pub const HAS_ARGS_OBJ: Self = Self(0x8000);
    pub const HAS_HOOK_DATA: Self = Self(0x10000);
    pub const HAS_ANNOTATION: Self = Self(0x20000);
    pub const HAS_RVAL: Self = Self(0x40000);
    pub const HAS_SCOPECHAIN: Self = Self(0x80000);
    pub const HAS_PREVPC: Self = Self(0x100000);

    pub(crate) const NAMES: [(&'static str, FrameFlags); 21] = [
        ("GLOBAL", Self::GLOBAL),
        ("FUNCTION", Self::FUNCTION),
        ("DUMMY", Self::DUMMY),
        ("EVAL", Self::EVAL),
        ("DEBUGGER", Self::DEBUGGER),
        ("GENERATOR", Self::GENERATOR),
        ("FLOATING_GENERATOR", Self::FLOATING_GENERATOR),
        ("CONSTRUCTING", Self::CONSTRUCTING),
        ("YIELDING", Self::YIELDING),
        ("FINISHED_IN_INTERP", Self::FINISHED_IN_INTERP),
        ("OVERRIDE_ARGS", Self::OVERRIDE_ARGS),
        ("OVERFLOW_ARGS", Self::OVERFLOW_ARGS),
        ("UNDERFLOW_ARGS", Self::UNDERFLOW_ARGS),
        ("HAS_IMACRO_PC", Self::HAS_IMACRO_PC),
        ("HAS_CALL_OBJ", Self::HAS_CALL_OBJ),
        ("HAS_ARGS_OBJ", Self::HAS_ARGS_OBJ),
        ("HAS_HOOK_DATA", Self::HAS_HOOK_DATA),
        ("HAS_ANNOTATION", Self::HAS_ANNOTATION),
        ("HAS_RVAL", Self::HAS_RVAL),
        ("HAS_SCOPECHAIN", Self::HAS_SCOPECHAIN),
        ("HAS_PREVPC", Self::HAS_PREVPC),
    ];

    #[inline]
    pub const fn empty() -> Self {
        Self(0)
    }

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    #[inline]
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    #[inline]
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl BitOr for FrameFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for FrameFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for FrameFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Debug for FrameFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut set = f.debug_set();
        for (name, flag) in Self::NAMES {
            if self.contains(flag) {
                set.entry(&format_args!("{name}"));
            }
        }
        set.finish()
    }
}

/// How code pushed by `push_execute_frame` is being run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteType {
    Global,
    DirectEval,
    IndirectEval,
    Debug,
}

impl ExecuteType {
    pub const fn flags(self) -> FrameFlags {
        match self {
            ExecuteType::Global => FrameFlags::GLOBAL,
            ExecuteType::DirectEval => FrameFlags::EVAL,
            ExecuteType::IndirectEval => FrameFlags(FrameFlags::GLOBAL.0 | FrameFlags::EVAL.0),
            ExecuteType::Debug => FrameFlags(FrameFlags::EVAL.0 | FrameFlags::DEBUGGER.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MaybeConstruct {
    #[default]
    NoConstruct,
    Construct,
}

impl MaybeConstruct {
    pub const fn flags(self) -> FrameFlags {
        match self {
            MaybeConstruct::NoConstruct => FrameFlags::empty(),
            MaybeConstruct::Construct => FrameFlags::CONSTRUCTING,
        }
    }
}

impl From<bool> for MaybeConstruct {
    fn from(construct: bool) -> Self {
        if construct { MaybeConstruct::Construct } else { MaybeConstruct::NoConstruct }
    }
}

#[inline]
fn encode_index(idx: Option<usize>) -> u64 {
    idx.map_or(0, |i| i as u64 + 1)
}

#[inline]
fn decode_index(word: u64) -> Option<usize> {
    word.checked_sub(1).map(|i| i as usize)
}

/// Read access to an activation record.
///
/// Which slots hold `this`, the callee and the arguments depends on the frame
/// kind, so every accessor here routes through the flags rather than assuming
/// one offset.
pub trait FrameView {
    fn slots(&self) -> &[Value];
    fn fp(&self) -> usize;
    fn realm(&self) -> &Realm;

    #[inline]
    fn word(&self, offset: usize) -> u64 {
        self.slots()[self.fp() + offset].to_bits()
    }

    #[inline]
    fn flags(&self) -> FrameFlags {
        FrameFlags(self.word(FLAGS) as u32)
    }

    // Frame type

    #[inline]
    fn is_function_frame(&self) -> bool {
        self.flags().contains(FrameFlags::FUNCTION)
    }

    #[inline]
    fn is_global_frame(&self) -> bool {
        self.flags().contains(FrameFlags::GLOBAL)
    }

    #[inline]
    fn is_dummy_frame(&self) -> bool {
        self.flags().contains(FrameFlags::DUMMY)
    }

    #[inline]
    fn is_script_frame(&self) -> bool {
        let script = self.flags().intersects(FrameFlags::FUNCTION | FrameFlags::GLOBAL);
        debug_assert_eq!(script, !self.is_dummy_frame());
        script
    }

    #[inline]
    fn is_eval_frame(&self) -> bool {
        self.flags().contains(FrameFlags::EVAL)
    }

    #[inline]
    fn is_non_eval_function_frame(&self) -> bool {
        self.flags() & (FrameFlags::FUNCTION | FrameFlags::EVAL) == FrameFlags::FUNCTION
    }

    fn is_strict_eval_frame(&self) -> bool {
        self.is_eval_frame() && self.script().strict
    }

    fn is_non_strict_eval_frame(&self) -> bool {
        self.is_eval_frame() && !self.script().strict
    }

    #[inline]
    fn is_frame_pushed_by_execute(&self) -> bool {
        self.flags().intersects(FrameFlags::GLOBAL | FrameFlags::EVAL)
    }

    #[inline]
    fn is_debugger_frame(&self) -> bool {
        self.flags().contains(FrameFlags::DEBUGGER)
    }

    #[inline]
    fn is_direct_eval_or_debugger_frame(&self) -> bool {
        let flags = self.flags();
        flags.intersects(FrameFlags::EVAL | FrameFlags::DEBUGGER) && !flags.contains(FrameFlags::GLOBAL)
    }

    #[inline]
    fn is_constructing(&self) -> MaybeConstruct {
        self.flags().contains(FrameFlags::CONSTRUCTING).into()
    }

    #[inline]
    fn is_generator_frame(&self) -> bool {
        self.flags().contains(FrameFlags::GENERATOR)
    }

    #[inline]
    fn is_floating_generator(&self) -> bool {
        let floating = self.flags().contains(FrameFlags::FLOATING_GENERATOR);
        debug_assert!(!floating || self.is_generator_frame());
        floating
    }

    #[inline]
    fn is_yielding(&self) -> bool {
        self.flags().contains(FrameFlags::YIELDING)
    }

    #[inline]
    fn finished_in_interpreter(&self) -> bool {
        self.flags().contains(FrameFlags::FINISHED_IN_INTERP)
    }

    #[inline]
    fn has_overflow_args(&self) -> bool {
        self.flags().contains(FrameFlags::OVERFLOW_ARGS)
    }

    #[inline]
    fn has_underflow_args(&self) -> bool {
        self.flags().contains(FrameFlags::UNDERFLOW_ARGS)
    }

    #[inline]
    fn has_overridden_args(&self) -> bool {
        self.flags().contains(FrameFlags::OVERRIDE_ARGS)
    }

    // Links

    /// Frame that was current on this context when this one was pushed.
    /// Not necessarily the caller: natives may sit in between.
    #[inline]
    fn prev(&self) -> Option<usize> {
        decode_index(self.word(PREV))
    }

    #[inline]
    fn prev_pc(&self) -> Option<Pc> {
        if self.flags().contains(FrameFlags::HAS_PREVPC) {
            Pc::decode(self.word(PREVPC))
        } else {
            None
        }
    }

    // Script and function

    fn script_id(&self) -> ScriptId {
        debug_assert!(self.is_script_frame());
        if self.is_function_frame() {
            if self.is_eval_frame() {
                ScriptId::from_raw(self.word(ARGS) as u32)
            } else {
                self.realm().function(self.fun()).script
            }
        } else {
            ScriptId::from_raw(self.word(EXEC) as u32)
        }
    }

    fn maybe_script_id(&self) -> Option<ScriptId> {
        if self.is_script_frame() { Some(self.script_id()) } else { None }
    }

    fn script(&self) -> &Script {
        self.realm().script(self.script_id())
    }

    #[inline]
    fn fun(&self) -> FunctionId {
        debug_assert!(self.is_function_frame());
        FunctionId::from_raw(self.word(EXEC) as u32)
    }

    fn maybe_fun(&self) -> Option<FunctionId> {
        if self.is_function_frame() { Some(self.fun()) } else { None }
    }

    fn num_fixed(&self) -> usize {
        if self.is_dummy_frame() { 0 } else { self.script().nfixed as usize }
    }

    fn num_slots(&self) -> usize {
        if self.is_dummy_frame() { 0 } else { self.script().nslots as usize }
    }

    // Slots

    #[inline]
    fn slots_start(&self) -> usize {
        self.fp() + VALUES_PER_STACK_FRAME
    }

    /// Base of the expression stack.
    fn base(&self) -> usize {
        self.slots_start() + self.num_fixed()
    }

    fn var_slot(&self, i: usize) -> Value {
        debug_assert!(i < self.num_fixed());
        self.slots()[self.slots_start() + i]
    }

    // Arguments. Only non-eval function frames have them.

    #[inline]
    fn has_args(&self) -> bool {
        self.is_non_eval_function_frame()
    }

    fn num_formal_args(&self) -> usize {
        debug_assert!(self.has_args());
        self.realm().function(self.fun()).nargs as usize
    }

    fn formal_args_start(&self) -> usize {
        self.fp() - self.num_formal_args()
    }

    fn formal_arg(&self, i: usize) -> Value {
        debug_assert!(i < self.num_formal_args());
        self.slots()[self.formal_args_start() + i]
    }

    fn num_actual_args(&self) -> usize {
        if self.flags().intersects(FrameFlags::OVERFLOW_ARGS | FrameFlags::UNDERFLOW_ARGS) {
            self.word(ARGS) as usize
        } else {
            self.num_formal_args()
        }
    }

    fn actual_args_start(&self) -> usize {
        let formals = self.formal_args_start();
        if self.has_overflow_args() {
            formals - (2 + self.num_actual_args())
        } else {
            formals
        }
    }

    fn actual_args_end(&self) -> usize {
        if self.has_overflow_args() {
            self.formal_args_start() - 2
        } else {
            self.formal_args_start() + self.num_actual_args()
        }
    }

    /// Slot of actual argument `i`. Formals that were copied above overflowing
    /// actuals are only canonical in their copied location.
    fn canonical_actual_arg_index(&self, i: usize) -> usize {
        debug_assert!(i < self.num_actual_args());
        if i < self.num_formal_args() {
            self.formal_args_start() + i
        } else {
            self.actual_args_start() + i
        }
    }

    fn canonical_actual_arg(&self, i: usize) -> Value {
        self.slots()[self.canonical_actual_arg_index(i)]
    }

    /// First slot of the `[callee, this, args...]` region owned by this frame.
    fn vp_start(&self) -> usize {
        if self.is_dummy_frame() {
            self.fp()
        } else if self.is_frame_pushed_by_execute() {
            self.fp() - 2
        } else {
            self.actual_args_start() - 2
        }
    }

    // This and callee

    fn this_index(&self) -> usize {
        if self.flags().intersects(FrameFlags::EVAL | FrameFlags::GLOBAL) {
            self.fp() - 1
        } else {
            self.formal_args_start() - 1
        }
    }

    fn this_value(&self) -> Value {
        self.slots()[self.this_index()]
    }

    fn callee_index(&self) -> usize {
        debug_assert!(self.is_function_frame());
        if self.is_eval_frame() {
            self.fp() - 2
        } else {
            self.formal_args_start() - 2
        }
    }

    fn callee_value(&self) -> Value {
        self.slots()[self.callee_index()]
    }

    fn callee(&self) -> Option<ObjectId> {
        self.callee_value().to_object()
    }

    /// Callee of a function frame, null for global frames.
    fn maybe_callee_value(&self) -> Value {
        debug_assert!(self.is_script_frame());
        let value = if self.flags().intersects(FrameFlags::EVAL | FrameFlags::GLOBAL) {
            self.slots()[self.fp() - 2]
        } else {
            self.slots()[self.formal_args_start() - 2]
        };
        debug_assert!(value.is_object_or_null());
        value
    }

    // Lazily initialized fields

    #[inline]
    fn has_scope_chain(&self) -> bool {
        self.flags().contains(FrameFlags::HAS_SCOPECHAIN)
    }

    /// The scope chain if it has been materialized. See `FrameMut::scope_chain`.
    fn scope_chain_if_set(&self) -> Option<ObjectId> {
        if self.has_scope_chain() {
            Some(ObjectId::from_raw(self.word(SCOPE_CHAIN) as u32))
        } else {
            None
        }
    }

    fn has_call_obj(&self) -> bool {
        self.flags().contains(FrameFlags::HAS_CALL_OBJ)
    }

    fn has_imacropc(&self) -> bool {
        self.flags().contains(FrameFlags::HAS_IMACRO_PC)
    }

    fn maybe_imacropc(&self) -> Option<Pc> {
        if self.has_imacropc() { Pc::decode(self.word(IMACROPC)) } else { None }
    }

    fn annotation(&self) -> Option<u64> {
        if self.flags().contains(FrameFlags::HAS_ANNOTATION) {
            Some(self.word(ANNOTATION))
        } else {
            None
        }
    }

    fn has_hook_data(&self) -> bool {
        self.flags().contains(FrameFlags::HAS_HOOK_DATA)
    }

    fn maybe_hook_data(&self) -> Option<u64> {
        if self.has_hook_data() { Some(self.word(HOOK_DATA)) } else { None }
    }

    /// Whether a return value was ever marked, even an undefined one.
    fn has_return_value(&self) -> bool {
        self.flags().contains(FrameFlags::HAS_RVAL)
    }

    fn return_value(&self) -> Value {
        if self.has_return_value() {
            self.slots()[self.fp() + RVAL]
        } else {
            Value::UNDEFINED
        }
    }

    /// Return address into JIT code; 0 for frames entered by the interpreter.
    fn native_return_address(&self) -> u64 {
        self.word(NCODE)
    }
}

/// Shared view of a frame living in some slot buffer (the live stack or a
/// generator's floating storage).
#[derive(Clone, Copy)]
pub struct FrameRef<'a> {
    slots: &'a [Value],
    fp: usize,
    realm: &'a Realm,
}

impl<'a> FrameRef<'a> {
    pub fn new(slots: &'a [Value], fp: usize, realm: &'a Realm) -> Self {
        debug_assert!(fp + VALUES_PER_STACK_FRAME <= slots.len());
        Self { slots, fp, realm }
    }
}

impl FrameView for FrameRef<'_> {
    #[inline]
    fn slots(&self) -> &[Value] {
        self.slots
    }

    #[inline]
    fn fp(&self) -> usize {
        self.fp
    }

    #[inline]
    fn realm(&self) -> &Realm {
        self.realm
    }
}

impl fmt::Debug for FrameRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameRef")
            .field("fp", &self.fp)
            .field("flags", &self.flags())
            .field("prev", &self.prev())
            .finish()
    }
}

/// Exclusive view of a frame; the only way to change header fields.
pub struct FrameMut<'a> {
    slots: &'a mut [Value],
    fp: usize,
    realm: &'a Realm,
}

impl FrameView for FrameMut<'_> {
    #[inline]
    fn slots(&self) -> &[Value] {
        self.slots
    }

    #[inline]
    fn fp(&self) -> usize {
        self.fp
    }

    #[inline]
    fn realm(&self) -> &Realm {
        self.realm
    }
}

impl<'a> FrameMut<'a> {
    pub fn new(slots: &'a mut [Value], fp: usize, realm: &'a Realm) -> Self {
        debug_assert!(fp + VALUES_PER_STACK_FRAME <= slots.len());
        Self { slots, fp, realm }
    }

    pub fn as_frame_ref(&self) -> FrameRef<'_> {
        FrameRef {
            slots: self.slots,
            fp: self.fp,
            realm: self.realm,
        }
    }

    #[inline]
    fn set_word(&mut self, offset: usize, bits: u64) {
        self.slots[self.fp + offset] = Value::from_bits(bits);
    }

    #[inline]
    fn set_flags(&mut self, flags: FrameFlags) {
        self.set_word(FLAGS, flags.bits() as u64);
    }

    #[inline]
    fn insert_flags(&mut self, flags: FrameFlags) {
        let merged = self.flags() | flags;
        self.set_flags(merged);
    }

    #[inline]
    fn remove_flags(&mut self, flags: FrameFlags) {
        let mut current = self.flags();
        current.remove(flags);
        self.set_flags(current);
    }

    fn clear_header(&mut self) {
        let fp = self.fp;
        for word in &mut self.slots[fp..fp + VALUES_PER_STACK_FRAME] {
            *word = Value::from_bits(0);
        }
        self.slots[fp + RVAL] = Value::UNDEFINED;
    }

    fn fill_fixed_with_undefined(&mut self, nfixed: usize) {
        let start = self.slots_start();
        self.slots[start..start + nfixed].fill(Value::UNDEFINED);
    }

    // Slot writes

    pub fn set_var_slot(&mut self, i: usize, value: Value) {
        debug_assert!(i < self.num_fixed());
        let idx = self.slots_start() + i;
        self.slots[idx] = value;
    }

    pub fn set_formal_arg(&mut self, i: usize, value: Value) {
        debug_assert!(i < self.num_formal_args());
        let idx = self.formal_args_start() + i;
        self.slots[idx] = value;
    }

    pub fn set_canonical_actual_arg(&mut self, i: usize, value: Value) {
        let idx = self.canonical_actual_arg_index(i);
        self.slots[idx] = value;
    }

    pub fn set_this_value(&mut self, value: Value) {
        let idx = self.this_index();
        self.slots[idx] = value;
    }

    /// Replace the callee with an equivalent object (same function, so the
    /// frame layout stays valid).
    pub fn overwrite_callee(&mut self, callee: ObjectId) {
        debug_assert_eq!(self.realm.function_of(callee), self.callee().and_then(|c| self.realm.function_of(c)));
        let idx = self.callee_index();
        self.slots[idx] = Value::object(callee);
    }

    // Scope chain

    /// Scope chain of the frame, defaulting to the callee's enclosing scope
    /// the first time it is asked for. The result is cached in the header.
    pub fn scope_chain(&mut self) -> ObjectId {
        if let Some(chain) = self.scope_chain_if_set() {
            return chain;
        }
        debug_assert!(self.is_function_frame());
        let chain = match self.callee() {
            Some(callee) => self.realm.parent_or_global(callee),
            None => self.realm.global(),
        };
        self.set_word(SCOPE_CHAIN, chain.raw() as u64);
        self.insert_flags(FrameFlags::HAS_SCOPECHAIN);
        chain
    }

    pub fn set_scope_chain_no_call_obj(&mut self, chain: ObjectId) {
        self.set_word(SCOPE_CHAIN, chain.raw() as u64);
        self.insert_flags(FrameFlags::HAS_SCOPECHAIN);
    }

    /// Install a scope chain whose head is this frame's own call object.
    pub fn set_scope_chain_with_own_call_obj(&mut self, call_obj: ObjectId) {
        debug_assert!(!self.has_call_obj());
        self.set_word(SCOPE_CHAIN, call_obj.raw() as u64);
        self.insert_flags(FrameFlags::HAS_SCOPECHAIN | FrameFlags::HAS_CALL_OBJ);
    }

    // Imacro pc, annotation, hooks

    pub fn set_imacropc(&mut self, pc: Pc) {
        debug_assert!(!self.has_imacropc());
        self.set_word(IMACROPC, Pc::encode(Some(pc)));
        self.insert_flags(FrameFlags::HAS_IMACRO_PC);
    }

    pub fn clear_imacropc(&mut self) {
        self.remove_flags(FrameFlags::HAS_IMACRO_PC);
    }

    pub fn set_annotation(&mut self, annotation: u64) {
        self.set_word(ANNOTATION, annotation);
        self.insert_flags(FrameFlags::HAS_ANNOTATION);
    }

    pub fn set_hook_data(&mut self, data: u64) {
        self.set_word(HOOK_DATA, data);
        self.insert_flags(FrameFlags::HAS_HOOK_DATA);
    }

    // Return value

    pub fn set_return_value(&mut self, value: Value) {
        self.slots[self.fp + RVAL] = value;
        self.mark_return_value();
    }

    pub fn mark_return_value(&mut self) {
        self.insert_flags(FrameFlags::HAS_RVAL);
    }

    pub fn clear_return_value(&mut self) {
        self.set_return_value(Value::UNDEFINED);
    }

    pub fn set_native_return_address(&mut self, addr: u64) {
        self.set_word(NCODE, addr);
    }

    // Temporary states

    pub fn set_yielding(&mut self) {
        self.insert_flags(FrameFlags::YIELDING);
    }

    pub fn clear_yielding(&mut self) {
        self.remove_flags(FrameFlags::YIELDING);
    }

    pub fn set_finished_in_interpreter(&mut self) {
        self.insert_flags(FrameFlags::FINISHED_IN_INTERP);
    }

    pub fn set_overridden_args(&mut self) {
        self.insert_flags(FrameFlags::OVERRIDE_ARGS);
    }

    // Generators

    pub(crate) fn init_floating_generator(&mut self) {
        debug_assert!(!self.is_generator_frame());
        self.insert_flags(FrameFlags::GENERATOR | FrameFlags::FLOATING_GENERATOR);
        self.set_word(PREV, 0);
    }

    pub(crate) fn set_floating_generator(&mut self) {
        self.insert_flags(FrameFlags::FLOATING_GENERATOR);
        self.set_word(PREV, 0);
    }

    pub(crate) fn unset_floating_generator(&mut self) {
        self.remove_flags(FrameFlags::FLOATING_GENERATOR);
    }

    pub(crate) fn reset_generator_prev(&mut self, prev: Option<usize>, prevpc: Option<Pc>) {
        self.insert_flags(FrameFlags::HAS_PREVPC);
        self.set_word(PREV, encode_index(prev));
        self.set_word(PREVPC, Pc::encode(prevpc));
    }

    // Initialization

    /// Interpreter call frame: everything but the lazily set fields is
    /// initialized, including the scope chain.
    pub(crate) fn init_call_frame(
        &mut self,
        callee: ObjectId,
        fun: FunctionId,
        nactual: usize,
        flags: FrameFlags,
        prev: Option<usize>,
        prevpc: Option<Pc>,
    ) {
        debug_assert!(!flags.intersects(FrameFlags::GLOBAL | FrameFlags::DUMMY | FrameFlags::EVAL));
        let chain = self.realm.parent_or_global(callee);
        let nfixed = self.realm.function_script(fun).nfixed as usize;
        self.clear_header();
        self.set_flags(FrameFlags::FUNCTION | FrameFlags::HAS_PREVPC | FrameFlags::HAS_SCOPECHAIN | flags);
        self.set_word(EXEC, fun.raw() as u64);
        self.set_word(ARGS, nactual as u64);
        self.set_word(SCOPE_CHAIN, chain.raw() as u64);
        self.set_word(PREV, encode_index(prev));
        self.set_word(PREVPC, Pc::encode(prevpc));
        self.fill_fixed_with_undefined(nfixed);
    }

    /// Global or eval frame. The two slots below the header receive the
    /// callee (or null) and `this`.
    pub(crate) fn init_execute_frame(
        &mut self,
        script: ScriptId,
        prev: Option<usize>,
        prevpc: Option<Pc>,
        this: Value,
        scope_chain: ObjectId,
        ty: ExecuteType,
    ) {
        let mut flags = ty.flags() | FrameFlags::HAS_SCOPECHAIN | FrameFlags::HAS_PREVPC;
        let mut callee = Value::NULL;
        let mut exec = script.raw() as u64;
        debug_assert!(flags.contains(FrameFlags::GLOBAL) || prev.is_some());
        if let (false, Some(prev_fp)) = (flags.contains(FrameFlags::GLOBAL), prev) {
            let prev_frame = FrameRef::new(self.slots, prev_fp, self.realm);
            flags |= prev_frame.flags() & (FrameFlags::FUNCTION | FrameFlags::GLOBAL);
            if flags.contains(FrameFlags::FUNCTION) {
                callee = prev_frame.callee_value();
                exec = prev_frame.word(EXEC);
            }
        }
        let nfixed = self.realm.script(script).nfixed as usize;
        let fp = self.fp;
        self.clear_header();
        self.slots[fp - 2] = callee;
        self.slots[fp - 1] = this;
        self.set_flags(flags);
        self.set_word(EXEC, exec);
        if flags.contains(FrameFlags::FUNCTION) {
            self.set_word(ARGS, script.raw() as u64);
        }
        self.set_word(SCOPE_CHAIN, scope_chain.raw() as u64);
        self.set_word(PREV, encode_index(prev));
        self.set_word(PREVPC, Pc::encode(prevpc));
        self.fill_fixed_with_undefined(nfixed);
    }

    pub(crate) fn init_dummy_frame(&mut self, scope_chain: ObjectId, prev: Option<usize>, prevpc: Option<Pc>) {
        self.clear_header();
        self.set_flags(FrameFlags::DUMMY | FrameFlags::HAS_PREVPC | FrameFlags::HAS_SCOPECHAIN);
        self.set_word(SCOPE_CHAIN, scope_chain.raw() as u64);
        self.set_word(PREV, encode_index(prev));
        self.set_word(PREVPC, Pc::encode(prevpc));
    }

    /// First half of a JIT call: what the caller knows before the callee runs.
    pub fn init_jit_frame_caller_half(
        &mut self,
        flags: FrameFlags,
        prev: Option<usize>,
        prevpc: Option<Pc>,
        ncode: u64,
    ) {
        self.clear_header();
        let mut flags = FrameFlags::FUNCTION | flags;
        if prevpc.is_some() {
            flags |= FrameFlags::HAS_PREVPC;
        }
        self.set_flags(flags);
        self.set_word(PREV, encode_index(prev));
        self.set_word(PREVPC, Pc::encode(prevpc));
        self.set_word(NCODE, ncode);
    }

    /// Callee prologue before the arity check. The actual count is only
    /// recorded on a mismatch; otherwise it equals the formal count.
    pub fn init_jit_frame_early_prologue(&mut self, fun: FunctionId, nactual: usize) {
        self.set_word(EXEC, fun.raw() as u64);
        if self.flags().intersects(FrameFlags::OVERFLOW_ARGS | FrameFlags::UNDERFLOW_ARGS) {
            self.set_word(ARGS, nactual as u64);
        }
    }

    pub fn init_jit_frame_late_prologue(&mut self) {
        let nfixed = self.num_fixed();
        self.fill_fixed_with_undefined(nfixed);
    }
}

/// Copy the live region `[src_vp, src_sp)` of the frame at `src_fp` into
/// `dst` starting at `dst_vp` and return the frame's new `fp`.
///
/// This is the only way a frame changes address. Header words holding slot
/// indices (`prev`) are not rewritten here; callers reset them for the new
/// location.
pub fn steal_frame_and_slots(dst: &mut [Value], dst_vp: usize, src: &[Value], src_vp: usize, src_fp: usize, src_sp: usize) -> usize {
    debug_assert!(src_vp <= src_fp);
    debug_assert!(src_sp >= src_fp + VALUES_PER_STACK_FRAME);
    let len = src_sp - src_vp;
    dst[dst_vp..dst_vp + len].copy_from_slice(&src[src_vp..src_sp]);
    dst_vp + (src_fp - src_vp)
}
