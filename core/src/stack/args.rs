use std::cell::Cell;

use crate::realm::ObjectId;
use crate::value::Value;

/// Window over `[callee, this, argv[0..argc]]` in the stack buffer.
///
/// After a call returns, the callee slot holds the return value. Reading it
/// through [`CallArgs::rval`] marks the view; a later `callee()` on the same
/// view is a bug until [`CallArgs::callee_has_been_reset`] is called.
#[derive(Debug, Clone)]
pub struct CallArgs {
    argv: usize,
    argc: usize,
    used_rval: Cell<bool>,
}

impl CallArgs {
    /// Arguments starting at `vp + 2`.
    pub fn from_vp(vp: usize, argc: usize) -> Self {
        Self::from_argv(vp + 2, argc)
    }

    pub fn from_argv(argv: usize, argc: usize) -> Self {
        debug_assert!(argv >= 2);
        Self {
            argv,
            argc,
            used_rval: Cell::new(false),
        }
    }

    /// The `argc` topmost values below `sp` are the arguments.
    pub fn from_sp(sp: usize, argc: usize) -> Self {
        Self::from_argv(sp - argc, argc)
    }

    #[inline]
    pub fn argc(&self) -> usize {
        self.argc
    }

    #[inline]
    pub fn argv(&self) -> usize {
        self.argv
    }

    /// Callee slot; also the return value slot.
    #[inline]
    pub fn base(&self) -> usize {
        self.argv - 2
    }

    #[inline]
    pub fn this_index(&self) -> usize {
        self.argv - 1
    }

    #[inline]
    pub fn end(&self) -> usize {
        self.argv + self.argc
    }

    pub(crate) fn mark_rval_used(&self) {
        self.used_rval.set(true);
    }

    pub(crate) fn check_callee_readable(&self) {
        debug_assert!(!self.used_rval.get(), "callee read after the return value was taken");
    }

    pub fn callee_has_been_reset(&self) {
        self.used_rval.set(false);
    }
}

/// Shared access to the slots a [`CallArgs`] names.
pub struct ArgsRef<'a> {
    pub(crate) args: &'a CallArgs,
    pub(crate) slots: &'a [Value],
}

impl ArgsRef<'_> {
    pub fn callee_value(&self) -> Value {
        self.args.check_callee_readable();
        self.slots[self.args.base()]
    }

    pub fn callee(&self) -> Option<ObjectId> {
        self.callee_value().to_object()
    }

    pub fn this_value(&self) -> Value {
        self.slots[self.args.this_index()]
    }

    /// Argument `i`, or undefined past `argc`.
    pub fn get(&self, i: usize) -> Value {
        if i < self.args.argc {
            self.slots[self.args.argv + i]
        } else {
            Value::UNDEFINED
        }
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.slots[self.args.argv..self.args.end()]
    }

    pub fn rval(&self) -> Value {
        self.args.mark_rval_used();
        self.slots[self.args.base()]
    }
}

/// Exclusive access to the slots a [`CallArgs`] names.
pub struct ArgsMut<'a> {
    pub(crate) args: &'a CallArgs,
    pub(crate) slots: &'a mut [Value],
}

impl ArgsMut<'_> {
    pub fn set_callee(&mut self, callee: Value) {
        self.slots[self.args.base()] = callee;
        self.args.callee_has_been_reset();
    }

    pub fn set_this(&mut self, this: Value) {
        self.slots[self.args.this_index()] = this;
    }

    pub fn set(&mut self, i: usize, value: Value) {
        debug_assert!(i < self.args.argc);
        self.slots[self.args.argv + i] = value;
    }

    pub fn set_rval(&mut self, value: Value) {
        self.slots[self.args.base()] = value;
        self.args.mark_rval_used();
    }

    pub fn rval(&self) -> Value {
        self.args.mark_rval_used();
        self.slots[self.args.base()]
    }

    pub fn as_mut_slice(&mut self) -> &mut [Value] {
        let (start, end) = (self.args.argv, self.args.end());
        &mut self.slots[start..end]
    }
}
