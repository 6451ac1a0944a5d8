//! Operation flags.

use bitflags::bitflags;

bitflags! {
    /// Flags accepted by arena operations.
    ///
    /// Flags passed to [`Arena::create`](crate::Arena::create) become the
    /// arena's defaults and are OR-ed into every operation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AllocFlags: u32 {
        /// O(1) fit policy: take the head of the first sufficiently large
        /// size-class bucket. The default when no policy flag is set.
        const INSTANT_FIT = 1 << 0;

        /// Tight-packing fit policy: take the smallest free segment that
        /// satisfies the constraints.
        const BEST_FIT = 1 << 1;

        /// Refill the segment pool before allocating. Used when the caller
        /// is itself the backing store for some upstream pool; also selects
        /// the freestanding boundary-tag store when set at creation.
        const BOOTSTRAP = 1 << 2;

        /// Reserved for hosted implementations that may block waiting for
        /// the source arena; not interpreted here.
        const SLEEP = 1 << 3;

        /// Reserved counterpart of [`SLEEP`](Self::SLEEP); not interpreted
        /// here.
        const NOSLEEP = 1 << 4;
    }
}
