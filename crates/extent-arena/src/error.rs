//! Runtime errors.
//!
//! Resource exhaustion is the only recoverable failure an arena produces.
//! Caller-bug preconditions (overlapping spans, unknown frees, malformed
//! quanta or alignments) are asserted, never returned: recovering from them
//! would leave the arena inconsistent.

use snafu::Snafu;

/// Errors returned by [`Arena::alloc`](crate::Arena::alloc) and
/// [`Arena::xalloc`](crate::Arena::xalloc).
#[derive(Debug, Snafu)]
#[snafu(module, visibility(pub(crate)))]
pub enum AllocError {
    /// No free segment satisfies the request and the source arena, if any,
    /// could not supply a new span.
    #[snafu(display("arena exhausted: no extent of {size} units satisfies the request"))]
    Exhausted {
        /// Quantum-rounded size of the failed request.
        size: usize,
        #[snafu(implicit)]
        location: snafu::Location,
    },
}
