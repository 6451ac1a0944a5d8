//! A general resource allocator for integer-addressed universes.
//!
//! `extent-arena` apportions arbitrary integer-addressed resources —
//! virtual address ranges, process IDs, device minor numbers, block
//! numbers — over a caller-supplied universe, following the two-layer
//! model of Bonwick & Adams: a global *arena* tracks extents with boundary
//! tags and per-power-of-two free-lists, giving constant- or
//! near-constant-time allocation and eager coalescing on free.
//!
//! # Features
//!
//! - **Two fit policies**: instant-fit (O(1), head of the first
//!   sufficiently large size class) and best-fit (tight packing, smallest
//!   satisfying segment).
//! - **Constrained placement**: alignment, phase, no-cross boundaries and
//!   address windows via [`Constraint`].
//! - **Arena layering**: an arena can import spans from a source arena on
//!   demand and releases them once they coalesce whole.
//! - **Freestanding operation**: boundary-tag records can come from a
//!   bootstrapped static reserve and a page source instead of the host
//!   heap, so the allocator can describe its own backing store.
//! - **No-std support**: the crate is `no_std`; hosted record storage
//!   needs only `alloc`.
//!
//! # Examples
//!
//! ```
//! use extent_arena::{AllocFlags, Arena, Constraint};
//!
//! // A byte-addressed arena over [0x1000, 0x11000).
//! let arena = Arena::create("kva", 0x1000, 0x10000, 0x1000, None, 0, AllocFlags::empty());
//!
//! let block = arena.alloc(0x2000, AllocFlags::empty()).unwrap();
//! assert_eq!(block % 0x1000, 0);
//!
//! // A page-aligned allocation below 0x8000.
//! let constrained = arena
//!     .xalloc(
//!         0x1000,
//!         &Constraint {
//!             align: 0x2000,
//!             maxaddr: 0x8000,
//!             ..Constraint::default()
//!         },
//!         AllocFlags::BEST_FIT,
//!     )
//!     .unwrap();
//! assert_eq!(constrained % 0x2000, 0);
//!
//! arena.free(block, 0x2000);
//! arena.free(constrained, 0x1000);
//! ```
//!
//! # Concurrency
//!
//! Every arena owns a single spin lock guarding its structures; public
//! operations appear atomic and totally ordered. When arenas layer, lock
//! order is child before parent, so source graphs must be acyclic. The
//! freestanding record pool is process-global behind its own lock and is
//! never refilled while an arena lock is held.
//!
//! # Errors and caller bugs
//!
//! Exhaustion is the only runtime error ([`AllocError::Exhausted`]).
//! Precondition violations — overlapping spans, unknown frees, malformed
//! quanta — panic: recovering from them would leave the arena
//! inconsistent.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub use self::{
    arena::Arena,
    error::AllocError,
    fit::Constraint,
    flags::AllocFlags,
    pool::{NFREESEGS_MIN, PAGE_SIZE, PageSource, bootstrap, set_page_source, stocked_records},
    segment::{SegKind, SegmentInfo},
    source::{Extent, SegmentSource},
};

mod arena;
mod error;
mod fit;
mod flags;
mod freelist;
mod hash;
mod list;
mod pool;
mod segment;
mod slab;
mod source;
