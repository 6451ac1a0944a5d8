//! The span-source capability.
//!
//! An arena with a source imports spans from it on demand and releases
//! them once they coalesce whole. A source is usually another arena —
//! [`Arena`](crate::Arena) implements the trait directly — but any
//! two-method supplier works: a page allocator, an ID authority, a mock.

use crate::error::AllocError;

/// An extent obtained from a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    /// Starting address of the extent.
    pub base: usize,
    /// Length of the extent in addressable units.
    pub size: usize,
}

/// Upstream supplier of spans.
///
/// Sources form a directed acyclic graph: an arena must never reach itself
/// through its source chain. Lock order is child before parent, so a cycle
/// deadlocks; constructing one is a caller bug.
pub trait SegmentSource: Sync {
    /// Obtains a new extent of at least `size` units.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::Exhausted`] when the source cannot supply the
    /// extent; the importing arena reports its own exhaustion in turn.
    fn import(&self, size: usize) -> Result<Extent, AllocError>;

    /// Returns an extent previously obtained from [`import`](Self::import).
    fn release(&self, base: usize, size: usize);
}
