//! Per-arena store of boundary-tag records.
//!
//! The slab owns every record of its arena and hands out dense indices.
//! Vacant records are threaded onto an intrusive free-record list through
//! their shared link pair, so acquire and release are O(1). Two
//! realizations share the interface:
//!
//! - **Hosted**: records live in a growable vector; growth draws on the
//!   host heap.
//! - **Freestanding**: records arrive in fixed chunks on loan from the
//!   process-global [`pool`](crate::pool); the slab never touches the host
//!   heap.

use alloc::vec::Vec;

use arrayvec::ArrayVec;

use crate::{
    pool::{self, Chunk, RECORDS_PER_CHUNK},
    segment::{SegIdx, Segment},
};

const MAX_CHUNKS: usize = 64;

enum Records {
    Hosted(Vec<Segment>),
    Freestanding(ArrayVec<Chunk, MAX_CHUNKS>),
}

pub(crate) struct Slab {
    records: Records,
    free_head: Option<SegIdx>,
    nfree: usize,
}

impl Slab {
    pub(crate) const fn new_hosted() -> Self {
        Self {
            records: Records::Hosted(Vec::new()),
            free_head: None,
            nfree: 0,
        }
    }

    pub(crate) const fn new_freestanding() -> Self {
        Self {
            records: Records::Freestanding(ArrayVec::new_const()),
            free_head: None,
            nfree: 0,
        }
    }

    pub(crate) fn is_freestanding(&self) -> bool {
        matches!(self.records, Records::Freestanding(_))
    }

    pub(crate) fn nfree(&self) -> usize {
        self.nfree
    }

    pub(crate) fn get(&self, idx: SegIdx) -> &Segment {
        match &self.records {
            Records::Hosted(records) => &records[idx.get()],
            Records::Freestanding(chunks) => {
                &chunks[idx.get() / RECORDS_PER_CHUNK].0[idx.get() % RECORDS_PER_CHUNK]
            }
        }
    }

    pub(crate) fn get_mut(&mut self, idx: SegIdx) -> &mut Segment {
        match &mut self.records {
            Records::Hosted(records) => &mut records[idx.get()],
            Records::Freestanding(chunks) => {
                &mut chunks[idx.get() / RECORDS_PER_CHUNK].0[idx.get() % RECORDS_PER_CHUNK]
            }
        }
    }

    /// Takes a vacant record. Never fails once admission has been passed:
    /// hosted slabs grow from the host heap, freestanding slabs pull a
    /// stocked chunk from the global pool.
    ///
    /// # Panics
    ///
    /// Panics on a freestanding slab when both the free-record list and the
    /// pool stock are empty; the caller failed to [`bootstrap`](pool) the
    /// pool or to pass `BOOTSTRAP`.
    pub(crate) fn acquire(&mut self) -> SegIdx {
        if let Some(idx) = self.free_head {
            self.free_head = self.get(idx).link.next;
            self.nfree -= 1;
            *self.get_mut(idx) = Segment::VACANT;
            return idx;
        }
        if let Records::Hosted(records) = &mut self.records {
            let idx = SegIdx::new(records.len());
            records.push(Segment::VACANT);
            return idx;
        }
        let chunk = pool::take_stocked()
            .expect("segment pool exhausted: bootstrap the pool or pass BOOTSTRAP");
        self.install_chunk(chunk);
        self.acquire()
    }

    /// Returns a record to the free-record list.
    pub(crate) fn release(&mut self, idx: SegIdx) {
        let head = self.free_head;
        let record = self.get_mut(idx);
        *record = Segment::VACANT;
        record.link.next = head;
        self.free_head = Some(idx);
        self.nfree += 1;
    }

    /// Adds a chunk of records on loan from the global pool, threading all
    /// of its records onto the free-record list.
    ///
    /// # Panics
    ///
    /// Panics on hosted slabs and when the per-arena chunk table is full.
    pub(crate) fn install_chunk(&mut self, chunk: Chunk) {
        let Records::Freestanding(chunks) = &mut self.records else {
            panic!("chunk installed into a hosted slab");
        };
        assert!(chunks.len() < MAX_CHUNKS, "arena boundary-tag storage exhausted");
        let first = chunks.len() * RECORDS_PER_CHUNK;
        chunks.push(chunk);
        for i in first..first + RECORDS_PER_CHUNK {
            self.release(SegIdx::new(i));
        }
    }

    /// Hands every chunk back to the global pool. The arena is being torn
    /// down; indices are dead after this.
    pub(crate) fn give_back_chunks(&mut self) {
        self.free_head = None;
        self.nfree = 0;
        if let Records::Freestanding(chunks) = &mut self.records {
            for chunk in chunks.drain(..) {
                pool::give_back(chunk);
            }
        }
    }
}
