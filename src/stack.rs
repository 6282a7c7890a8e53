//! Stack growth for the recursive evaluator.
//!
//! Native targets grow the stack on demand through `stacker`, so the
//! evaluation depth is bounded by [`MAX_EVAL_DEPTH`](crate::MAX_EVAL_DEPTH)
//! rather than by the size of the calling thread's stack.

/// Run `f`, first switching to a fresh stack segment if less than the red
/// zone remains on the current one.
#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub(crate) fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    const RED_ZONE: usize = 64 * 1024;
    const SEGMENT_SIZE: usize = 1024 * 1024;

    stacker::maybe_grow(RED_ZONE, SEGMENT_SIZE, f)
}

#[inline]
#[cfg(target_arch = "wasm32")]
pub(crate) fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}
