use crate::error::StackResult;

use super::space::StackSpace;

/// Bounds-check policy applied before a frame is written at `from`.
pub trait StackCheck {
    fn check(&mut self, space: &mut StackSpace, from: usize, nvals: usize) -> StackResult<()>;
}

/// Caller already verified the whole call sequence fits.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCheck;

impl StackCheck for NoCheck {
    #[inline]
    fn check(&mut self, space: &mut StackSpace, from: usize, nvals: usize) -> StackResult<()> {
        debug_assert!(from + nvals <= space.committed_end(), "unchecked push past committed memory");
        Ok(())
    }
}

/// Commit more memory if needed, reporting overflow to the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct OomCheck;

impl StackCheck for OomCheck {
    #[inline]
    fn check(&mut self, space: &mut StackSpace, from: usize, nvals: usize) -> StackResult<()> {
        space.ensure_committed(from, nvals)
    }
}

/// Compare against a limit obtained from [`StackSpace::compute_limit`]; only
/// on an apparent overflow go to the space and refresh the limit.
#[derive(Debug)]
pub struct LimitCheck<'a> {
    limit: &'a mut usize,
}

impl<'a> LimitCheck<'a> {
    pub fn new(limit: &'a mut usize) -> Self {
        Self { limit }
    }
}

impl StackCheck for LimitCheck<'_> {
    #[inline]
    fn check(&mut self, space: &mut StackSpace, from: usize, nvals: usize) -> StackResult<()> {
        if from + nvals <= *self.limit {
            return Ok(());
        }
        space.try_bump_limit(from, nvals, self.limit)
    }
}
