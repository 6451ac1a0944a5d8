//! The arena: segment bookkeeping and the allocation engine.
//!
//! An arena apportions a universe of integer-addressed resources —
//! address ranges, process IDs, device minors, block numbers — tracked as
//! boundary-tag segments. Every public operation takes the arena's lock at
//! entry and releases it at exit; the inner engine below the lock is plain
//! single-threaded code over the slab, the address-ordered segment list,
//! the free-list index and the allocated hash index.

use alloc::vec::Vec;
use core::fmt;

use log::{debug, trace};
use spin::mutex::SpinMutex;

use crate::{
    error::{AllocError, alloc_error::ExhaustedSnafu},
    fit::{self, Constraint, FitPolicy, Request},
    flags::AllocFlags,
    freelist::FreeIndex,
    hash::{self, AllocTable},
    list::SegList,
    pool::{self, NFREESEGS_MIN},
    segment::{SegKind, SegmentInfo},
    slab::Slab,
    source::{Extent, SegmentSource},
};

/// A general resource allocator over a caller-supplied universe.
///
/// Segments are tracked with boundary tags: allocation splits a free
/// segment, free eagerly coalesces with address-adjacent free neighbours,
/// and a per-power-of-two free-list index makes the instant-fit policy
/// O(1). An arena without its own spans can layer on a *source* arena,
/// importing spans on demand and releasing them once they coalesce whole.
///
/// # Examples
///
/// ```
/// use extent_arena::{AllocFlags, Arena};
///
/// let arena = Arena::create("pids", 100, 900, 1, None, 0, AllocFlags::empty());
/// let pid = arena.alloc(1, AllocFlags::empty()).unwrap();
/// assert!((100..1000).contains(&pid));
/// arena.free(pid, 1);
/// ```
pub struct Arena<'a> {
    name: &'a str,
    quantum: usize,
    qcache_max: usize,
    default_flags: AllocFlags,
    source: Option<&'a dyn SegmentSource>,
    inner: SpinMutex<ArenaInner>,
}

impl<'a> Arena<'a> {
    /// Creates an arena covering `[base, base + size)` in units of
    /// `quantum`.
    ///
    /// When `source` is given the arena starts empty and imports spans
    /// from it on demand; `base` and `size` are then ignored and usually
    /// zero. `qcache_max` is the quantum-cache threshold, carried for
    /// upstream caching layers; the arena itself does not interpret it.
    /// `flags` become the arena's defaults, OR-ed into every operation —
    /// an arena created with [`AllocFlags::BOOTSTRAP`] draws its boundary
    /// tags from the global freestanding pool instead of the host heap.
    ///
    /// # Panics
    ///
    /// Panics when `quantum` is not a power of two, when `qcache_max` is
    /// not a multiple of `quantum`, or when `flags` names both fit
    /// policies.
    #[must_use]
    pub fn create(
        name: &'a str,
        base: usize,
        size: usize,
        quantum: usize,
        source: Option<&'a dyn SegmentSource>,
        qcache_max: usize,
        flags: AllocFlags,
    ) -> Self {
        assert!(
            quantum.is_power_of_two(),
            "quantum {quantum:#x} is not a power of two"
        );
        assert!(
            qcache_max % quantum == 0,
            "qcache_max {qcache_max:#x} is not a multiple of the quantum {quantum:#x}"
        );
        let _ = Self::policy(flags);

        let slab = if flags.contains(AllocFlags::BOOTSTRAP) {
            Slab::new_freestanding()
        } else {
            Slab::new_hosted()
        };
        let arena = Self {
            name,
            quantum,
            qcache_max,
            default_flags: flags,
            source,
            inner: SpinMutex::new(ArenaInner {
                slab,
                seq: SegList::new(),
                freelist: FreeIndex::new(),
                table: AllocTable::new(),
            }),
        };
        if source.is_none() && size > 0 {
            arena.add(base, size, flags);
        }
        arena
    }

    /// The arena's name, as given at creation.
    #[must_use]
    pub fn name(&self) -> &'a str {
        self.name
    }

    /// The minimum allocation unit and implied alignment.
    #[must_use]
    pub fn quantum(&self) -> usize {
        self.quantum
    }

    /// The quantum-cache threshold given at creation.
    #[must_use]
    pub fn qcache_max(&self) -> usize {
        self.qcache_max
    }

    /// Installs a new span `[base, base + size)`.
    ///
    /// # Panics
    ///
    /// Panics when the span is empty, wraps the address space, is not
    /// quantum-aligned, or overlaps an existing span — all caller bugs.
    pub fn add(&self, base: usize, size: usize, flags: AllocFlags) {
        assert!(size > 0, "empty span");
        assert!(
            base % self.quantum == 0 && size % self.quantum == 0,
            "span [{base:#x}, +{size:#x}) is not aligned to the quantum {:#x}",
            self.quantum
        );
        let flags = flags | self.default_flags;
        if flags.contains(AllocFlags::BOOTSTRAP) {
            self.refill_records();
        }
        self.inner.lock().add_span(base, size, false);
        debug!("{}: added span [{base:#x}, {:#x})", self.name, base + size);
    }

    /// Allocates `size` units with default constraints.
    ///
    /// Equivalent to [`xalloc`](Self::xalloc) with
    /// [`Constraint::default()`].
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::Exhausted`] when no free segment satisfies
    /// the request and the source, if any, cannot supply a new span.
    pub fn alloc(&self, size: usize, flags: AllocFlags) -> Result<usize, AllocError> {
        self.xalloc(size, &Constraint::default(), flags)
    }

    /// Allocates `size` units subject to `constraint`.
    ///
    /// `size` is rounded up to the quantum. The fit policy is taken from
    /// `flags` (OR-ed with the arena defaults); instant-fit applies when
    /// neither policy flag is set. On exhaustion, an arena with a source
    /// imports a span of the rounded size and retries once.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::Exhausted`] when no placement exists.
    ///
    /// # Panics
    ///
    /// Panics when `size` is zero, the alignment is not a power-of-two
    /// multiple of the quantum, the phase or nocross boundary is not a
    /// quantum multiple, the phase is not below the alignment, or both fit
    /// policies are named.
    pub fn xalloc(
        &self,
        size: usize,
        constraint: &Constraint,
        flags: AllocFlags,
    ) -> Result<usize, AllocError> {
        assert!(size > 0, "zero-size allocation");
        let flags = flags | self.default_flags;
        let policy = Self::policy(flags);

        let Some(rounded) = size.checked_next_multiple_of(self.quantum) else {
            return ExhaustedSnafu { size }.fail();
        };
        let align = if constraint.align == 0 {
            self.quantum
        } else {
            constraint.align
        };
        assert!(
            align.is_power_of_two(),
            "alignment {align:#x} is not a power of two"
        );
        assert!(
            align % self.quantum == 0,
            "alignment {align:#x} is not a multiple of the quantum {:#x}",
            self.quantum
        );
        assert!(
            constraint.phase < align,
            "phase {:#x} is not below the alignment {align:#x}",
            constraint.phase
        );
        assert!(
            constraint.phase % self.quantum == 0 && constraint.nocross % self.quantum == 0,
            "phase {:#x} and nocross {:#x} must be multiples of the quantum {:#x}",
            constraint.phase,
            constraint.nocross,
            self.quantum
        );
        let req = Request {
            size: rounded,
            align,
            phase: constraint.phase,
            nocross: constraint.nocross,
            minaddr: constraint.minaddr,
            maxaddr: constraint.maxaddr,
        };

        if flags.contains(AllocFlags::BOOTSTRAP) {
            self.refill_records();
        }

        let mut inner = self.inner.lock();
        let mut imported: Option<Extent> = None;
        let result = loop {
            if let Some(addr) = inner.xalloc(&req, policy, self.quantum) {
                break Some(addr);
            }
            if imported.is_some() {
                break None;
            }
            let Some(source) = self.source else {
                break None;
            };
            // Lock order is child before parent: the source takes its own
            // lock while ours is held.
            let Ok(extent) = source.import(rounded) else {
                break None;
            };
            inner.add_span(extent.base, extent.size, true);
            imported = Some(extent);
        };
        drop(inner);

        if let Some(extent) = imported {
            debug!(
                "{}: imported span [{:#x}, {:#x})",
                self.name,
                extent.base,
                extent.base + extent.size
            );
        }
        match result {
            Some(addr) => {
                trace!("{}: allocated [{addr:#x}, {:#x})", self.name, addr + rounded);
                Ok(addr)
            }
            None => ExhaustedSnafu { size: rounded }.fail(),
        }
    }

    /// Frees the allocation at `addr` of `size` units.
    ///
    /// The segment merges eagerly with free neighbours in its span. When
    /// the merge reconstitutes an entire imported span, the span is
    /// released back to the source.
    ///
    /// # Panics
    ///
    /// Panics when no allocation starts at `addr` or when `size` does not
    /// match the allocated size (up to quantum rounding) — both caller
    /// bugs.
    pub fn free(&self, addr: usize, size: usize) {
        assert!(size > 0, "zero-size free");
        let size = size.next_multiple_of(self.quantum);
        let released = self.inner.lock().free(addr, size, self.source.is_some());
        trace!("{}: freed [{addr:#x}, {:#x})", self.name, addr + size);
        if let (Some((base, span_size)), Some(source)) = (released, self.source) {
            debug!(
                "{}: released span [{base:#x}, {:#x}) to source",
                self.name,
                base + span_size
            );
            source.release(base, span_size);
        }
    }

    /// Tears the arena down, releasing every imported span to the source.
    ///
    /// # Panics
    ///
    /// Panics when allocations are outstanding; leaking them is a caller
    /// bug.
    pub fn destroy(self) {
        let inner = self.inner.lock();
        assert!(
            inner.table.is_empty(),
            "destroying arena `{}` with outstanding allocations",
            self.name
        );
        drop(inner);
        drop(self);
    }

    /// An address-ordered copy of every segment.
    #[must_use]
    pub fn snapshot(&self) -> Vec<SegmentInfo> {
        let inner = self.inner.lock();
        inner
            .seq
            .iter(&inner.slab)
            .map(|idx| {
                let seg = inner.slab.get(idx);
                SegmentInfo {
                    base: seg.base,
                    size: seg.size,
                    kind: seg.kind,
                    imported: seg.imported,
                }
            })
            .collect()
    }

    /// Total units across all spans, allocated or not.
    #[must_use]
    pub fn total_space(&self) -> usize {
        self.space_of(SegKind::Span)
    }

    /// Units currently allocated.
    #[must_use]
    pub fn allocated_space(&self) -> usize {
        self.space_of(SegKind::Allocated)
    }

    /// Units currently free.
    #[must_use]
    pub fn free_space(&self) -> usize {
        self.space_of(SegKind::Free)
    }

    /// Writes the diagnostic segment listing: one line per segment in
    /// address order, then the allocated hash index.
    ///
    /// # Errors
    ///
    /// Propagates errors from `out`.
    pub fn dump(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        let inner = self.inner.lock();
        writeln!(out, "arena \"{}\" segments:", self.name)?;
        for idx in inner.seq.iter(&inner.slab) {
            let seg = inner.slab.get(idx);
            write!(out, "[{:#x}, {:#x}] ({})", seg.base, seg.end(), seg.kind.as_str())?;
            if seg.imported {
                write!(out, " (imported)")?;
            }
            writeln!(out)?;
        }
        writeln!(out, "hash index:")?;
        for idx in inner.table.iter(&inner.slab) {
            let seg = inner.slab.get(idx);
            writeln!(
                out,
                "  {:x}: [address: {:#x}, size: {:#x}]",
                hash::mix64(seg.base as u64),
                seg.base,
                seg.size
            )?;
        }
        Ok(())
    }

    fn space_of(&self, kind: SegKind) -> usize {
        let inner = self.inner.lock();
        inner
            .seq
            .iter(&inner.slab)
            .map(|idx| inner.slab.get(idx))
            .filter(|seg| seg.kind == kind)
            .map(|seg| seg.size)
            .sum()
    }

    fn policy(flags: AllocFlags) -> FitPolicy {
        let instant = flags.contains(AllocFlags::INSTANT_FIT);
        let best = flags.contains(AllocFlags::BEST_FIT);
        assert!(
            !(instant && best),
            "INSTANT_FIT and BEST_FIT are mutually exclusive"
        );
        if best { FitPolicy::Best } else { FitPolicy::Instant }
    }

    /// Tops the freestanding slab up above the low-water mark. Runs before
    /// the arena lock is taken: pulling a page from the page source may
    /// recurse into this arena.
    fn refill_records(&self) {
        loop {
            {
                let inner = self.inner.lock();
                if !inner.slab.is_freestanding() || inner.slab.nfree() > NFREESEGS_MIN {
                    return;
                }
            }
            if !pool::refill() {
                return;
            }
            let Some(chunk) = pool::take_stocked() else {
                return;
            };
            self.inner.lock().slab.install_chunk(chunk);
        }
    }
}

impl Drop for Arena<'_> {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        if let Some(source) = self.source {
            let mut cur = inner.seq.head();
            while let Some(idx) = cur {
                let seg = inner.slab.get(idx);
                let (kind, was_imported, base, size) =
                    (seg.kind, seg.imported, seg.base, seg.size);
                cur = seg.seq.next;
                if kind == SegKind::Span && was_imported {
                    source.release(base, size);
                }
            }
        }
        inner.slab.give_back_chunks();
    }
}

impl fmt::Debug for Arena<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.dump(f)
    }
}

/// Arenas layer directly: a child arena's source can be its parent.
impl SegmentSource for Arena<'_> {
    fn import(&self, size: usize) -> Result<Extent, AllocError> {
        let size = size.next_multiple_of(self.quantum);
        let base = self.alloc(size, AllocFlags::empty())?;
        Ok(Extent { base, size })
    }

    fn release(&self, base: usize, size: usize) {
        self.free(base, size);
    }
}

/// Everything behind the arena lock.
struct ArenaInner {
    slab: Slab,
    seq: SegList,
    freelist: FreeIndex,
    table: AllocTable,
}

impl ArenaInner {
    /// Installs a span and its covering free segment. Both records are
    /// acquired before any list is touched.
    fn add_span(&mut self, base: usize, size: usize, imported: bool) {
        let end = base
            .checked_add(size)
            .expect("span wraps the address space");
        for idx in self.seq.iter(&self.slab) {
            let seg = self.slab.get(idx);
            if seg.kind == SegKind::Span {
                assert!(
                    end <= seg.base || seg.end() <= base,
                    "span [{base:#x}, {end:#x}) overlaps existing span [{:#x}, {:#x})",
                    seg.base,
                    seg.end()
                );
            }
        }

        let span_rec = self.slab.acquire();
        let free_rec = self.slab.acquire();
        {
            let span = self.slab.get_mut(span_rec);
            span.base = base;
            span.size = size;
            span.kind = SegKind::Span;
            span.imported = imported;
        }
        {
            let free = self.slab.get_mut(free_rec);
            free.base = base;
            free.size = size;
            free.kind = SegKind::Free;
        }

        // Keep the segment list address-sorted regardless of the order
        // spans are installed in.
        let mut before = None;
        for idx in self.seq.iter(&self.slab) {
            let seg = self.slab.get(idx);
            if seg.kind == SegKind::Span && seg.base > base {
                before = Some(idx);
                break;
            }
        }
        match before {
            Some(before) => self.seq.insert_before(&mut self.slab, before, span_rec),
            None => self.seq.push_back(&mut self.slab, span_rec),
        }
        self.seq.insert_after(&mut self.slab, span_rec, free_rec);
        self.freelist.insert(&mut self.slab, free_rec);
    }

    /// The fit-split half of the engine. Returns the chosen address, or
    /// `None` when no free segment satisfies the request.
    fn xalloc(&mut self, req: &Request, policy: FitPolicy, quantum: usize) -> Option<usize> {
        // Pre-acquire the worst case — leading leftover plus allocated
        // chunk — so nothing can fail once state mutation starts.
        let lead_rec = self.slab.acquire();
        let alloc_rec = self.slab.acquire();

        let found = match policy {
            FitPolicy::Instant => fit::instant_fit(&self.slab, &self.freelist, req),
            FitPolicy::Best => fit::best_fit(&self.slab, &self.freelist, req),
        };
        let Some((seg, start)) = found else {
            self.slab.release(alloc_rec);
            self.slab.release(lead_rec);
            return None;
        };
        debug_assert_eq!(self.slab.get(seg).kind, SegKind::Free);
        self.freelist.remove(&mut self.slab, seg);

        let mut lead_used = false;
        let mut alloc_used = false;

        // Leading leftover: `[seg.base, start)` stays free.
        let seg_base = self.slab.get(seg).base;
        if start > seg_base {
            lead_used = true;
            {
                let lead = self.slab.get_mut(lead_rec);
                lead.base = seg_base;
                lead.size = start - seg_base;
                lead.kind = SegKind::Free;
            }
            self.seq.insert_before(&mut self.slab, seg, lead_rec);
            self.freelist.insert(&mut self.slab, lead_rec);
            let seg = self.slab.get_mut(seg);
            seg.size -= start - seg_base;
            seg.base = start;
        }

        let seg_size = self.slab.get(seg).size;
        debug_assert_eq!(self.slab.get(seg).base, start);
        debug_assert!(seg_size >= req.size);

        // Trailing leftover: carve the allocated chunk off the front and
        // leave the rest free — but only when the rest is at least a
        // quantum.
        let allocated = if seg_size - req.size >= quantum {
            alloc_used = true;
            {
                let chunk = self.slab.get_mut(alloc_rec);
                chunk.base = start;
                chunk.size = req.size;
                chunk.kind = SegKind::Allocated;
            }
            self.seq.insert_before(&mut self.slab, seg, alloc_rec);
            {
                let rest = self.slab.get_mut(seg);
                rest.base += req.size;
                rest.size -= req.size;
            }
            self.freelist.insert(&mut self.slab, seg);
            alloc_rec
        } else {
            self.slab.get_mut(seg).kind = SegKind::Allocated;
            seg
        };
        self.table.insert(&mut self.slab, allocated);

        if !lead_used {
            self.slab.release(lead_rec);
        }
        if !alloc_used {
            self.slab.release(alloc_rec);
        }
        Some(start)
    }

    /// The coalescing half of the engine. Returns the extent of a
    /// reconstituted imported span for the caller to release to the
    /// source.
    fn free(&mut self, addr: usize, size: usize, has_source: bool) -> Option<(usize, usize)> {
        let Some(idx) = self.table.remove(&mut self.slab, addr) else {
            panic!("free of unknown address {addr:#x}");
        };
        let seg_size = self.slab.get(idx).size;
        assert!(
            seg_size == size,
            "free size mismatch at {addr:#x}: allocated {seg_size:#x}, freed {size:#x}"
        );
        self.slab.get_mut(idx).kind = SegKind::Free;

        // Spans sit between the interior segments of different spans, so a
        // free neighbour is always within the same span.
        if let Some(prev) = self.seq.prev(&self.slab, idx) {
            let p = self.slab.get(prev);
            if p.kind == SegKind::Free {
                let (p_base, p_size) = (p.base, p.size);
                debug_assert_eq!(p_base + p_size, self.slab.get(idx).base);
                self.freelist.remove(&mut self.slab, prev);
                self.seq.remove(&mut self.slab, prev);
                self.slab.release(prev);
                let seg = self.slab.get_mut(idx);
                seg.base = p_base;
                seg.size += p_size;
            }
        }
        if let Some(next) = self.seq.next(&self.slab, idx) {
            let n = self.slab.get(next);
            if n.kind == SegKind::Free {
                let n_size = n.size;
                debug_assert_eq!(self.slab.get(idx).end(), self.slab.get(next).base);
                self.freelist.remove(&mut self.slab, next);
                self.seq.remove(&mut self.slab, next);
                self.slab.release(next);
                self.slab.get_mut(idx).size += n_size;
            }
        }

        // A whole imported span goes back to the source instead of the
        // free list.
        if has_source {
            if let Some(prev) = self.seq.prev(&self.slab, idx) {
                let p = self.slab.get(prev);
                let s = self.slab.get(idx);
                if p.kind == SegKind::Span && p.imported && p.base == s.base && p.size == s.size {
                    let extent = (s.base, s.size);
                    self.seq.remove(&mut self.slab, idx);
                    self.seq.remove(&mut self.slab, prev);
                    self.slab.release(idx);
                    self.slab.release(prev);
                    return Some(extent);
                }
            }
        }
        self.freelist.insert(&mut self.slab, idx);
        None
    }
}
