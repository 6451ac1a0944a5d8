//! Process-global boundary-tag reserve for freestanding arenas.
//!
//! Arenas that cannot reach a host heap draw their segment records from
//! this pool in fixed chunks of [`RECORDS_PER_CHUNK`] records. The pool is
//! seeded with a static reserve of 128 records by a one-time [`bootstrap`]
//! call and refilled one 4096-byte page at a time from a registered
//! [`PageSource`], so that an arena can allocate the metadata describing
//! its own allocations.
//!
//! The page source used for refill may itself be an arena layered on the
//! arena being refilled. The refill path is therefore only ever entered
//! from [`refill`], which no caller invokes while holding an arena lock;
//! taking already-stocked chunks ([`take_stocked`]) is safe under an arena
//! lock because it cannot re-enter.

use core::{cell::UnsafeCell, ptr::NonNull};

use arrayvec::ArrayVec;
use spin::mutex::SpinMutex;

use crate::segment::Segment;

/// Size of the storage pages supplied by a [`PageSource`].
pub const PAGE_SIZE: usize = 4096;

/// Records per refill chunk; one chunk fits in one page.
pub(crate) const RECORDS_PER_CHUNK: usize = 64;

/// Low-water mark of free records per arena. The `BOOTSTRAP` refill path
/// tops an arena up whenever its free-record count is at or below this.
pub const NFREESEGS_MIN: usize = 8;

const STATIC_RESERVE_RECORDS: usize = 128;
const STATIC_RESERVE_CHUNKS: usize = STATIC_RESERVE_RECORDS / RECORDS_PER_CHUNK;
const STOCK_MAX: usize = 64;

const _: () = assert!(size_of::<Segment>() * RECORDS_PER_CHUNK <= PAGE_SIZE);
const _: () = assert!(STATIC_RESERVE_RECORDS % RECORDS_PER_CHUNK == 0);

/// Supplier of raw page storage for boundary-tag records.
///
/// Implementations return `n` contiguous [`PAGE_SIZE`]-byte pages, aligned
/// to at least the alignment of a segment record, or `None` when no storage
/// is available. The storage is never returned; records are recycled
/// through the pool instead.
pub trait PageSource: Sync {
    /// Obtain `n` contiguous pages of storage.
    fn alloc_pages(&self, n: usize) -> Option<NonNull<u8>>;
}

/// A chunk of record storage on loan from the pool to one arena.
pub(crate) struct Chunk(pub(crate) &'static mut [Segment; RECORDS_PER_CHUNK]);

struct PoolState {
    stock: ArrayVec<Chunk, STOCK_MAX>,
    bootstrapped: bool,
    page_source: Option<&'static dyn PageSource>,
}

static POOL: SpinMutex<PoolState> = SpinMutex::new(PoolState {
    stock: ArrayVec::new_const(),
    bootstrapped: false,
    page_source: None,
});

struct Reserve(UnsafeCell<[Segment; STATIC_RESERVE_RECORDS]>);

// The reserve is only touched once, under the pool lock, by `bootstrap`.
unsafe impl Sync for Reserve {}

static RESERVE: Reserve = {
    const VACANT: Segment = Segment::VACANT;
    Reserve(UnsafeCell::new([VACANT; STATIC_RESERVE_RECORDS]))
};

/// Installs the static reserve. Must be called exactly once, before any
/// freestanding arena operation.
///
/// # Panics
///
/// Panics when called a second time.
pub fn bootstrap() {
    let mut pool = POOL.lock();
    assert!(!pool.bootstrapped, "segment pool bootstrapped twice");
    pool.bootstrapped = true;

    let base = RESERVE.0.get().cast::<Segment>();
    for i in 0..STATIC_RESERVE_CHUNKS {
        // Bootstrap runs once, so each chunk is handed out exactly once.
        let chunk = unsafe {
            &mut *base
                .add(i * RECORDS_PER_CHUNK)
                .cast::<[Segment; RECORDS_PER_CHUNK]>()
        };
        pool.stock.push(Chunk(chunk));
    }
}

/// Registers the page source used to refill the pool once the static
/// reserve runs out.
pub fn set_page_source(source: &'static dyn PageSource) {
    POOL.lock().page_source = Some(source);
}

/// Takes a stocked chunk without touching the page source. Safe to call
/// under an arena lock.
pub(crate) fn take_stocked() -> Option<Chunk> {
    POOL.lock().stock.pop()
}

/// Ensures at least one chunk is stocked, pulling a page from the page
/// source if necessary. Returns `false` when the pool is dry and cannot be
/// refilled.
///
/// Callers must not hold any arena lock: the page source may allocate from
/// an arena layered on this pool.
pub(crate) fn refill() -> bool {
    let source = {
        let pool = POOL.lock();
        if !pool.stock.is_empty() {
            return true;
        }
        match pool.page_source {
            Some(source) => source,
            None => return false,
        }
    };

    let Some(page) = source.alloc_pages(1) else {
        return false;
    };
    let records = page.as_ptr().cast::<Segment>();
    // The page is fresh storage from the source; initialize every record
    // before forming a reference to the chunk.
    let chunk = unsafe {
        for i in 0..RECORDS_PER_CHUNK {
            records.add(i).write(Segment::VACANT);
        }
        &mut *records.cast::<[Segment; RECORDS_PER_CHUNK]>()
    };
    let _ = POOL.lock().stock.try_push(Chunk(chunk));
    true
}

/// Returns a chunk when its arena is destroyed. Chunks beyond the stock
/// capacity are abandoned; their storage is never unmapped.
pub(crate) fn give_back(chunk: Chunk) {
    let _ = POOL.lock().stock.try_push(chunk);
}

/// Number of records currently stocked, counting whole chunks.
#[must_use]
pub fn stocked_records() -> usize {
    POOL.lock().stock.len() * RECORDS_PER_CHUNK
}
