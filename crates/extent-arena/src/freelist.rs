//! Per-power-of-two free-list index.
//!
//! One bucket per bit of a machine word; bucket `i` holds the free
//! segments whose size `s` satisfies `2^i <= s < 2^(i+1)`. Buckets are
//! FIFO: segments enter at the tail and the instant-fit policy takes the
//! head, so equal-class segments are recycled in installation order.
//! Removal is O(1) through the shared link pair.

use crate::{
    segment::SegIdx,
    slab::Slab,
};

pub(crate) const NUM_BUCKETS: usize = usize::BITS as usize;

/// `⌊log₂ size⌋`.
pub(crate) fn bucket_of(size: usize) -> usize {
    assert!(size > 0, "free segment with zero size");
    (usize::BITS - 1 - size.leading_zeros()) as usize
}

#[derive(Clone, Copy)]
struct Bucket {
    head: Option<SegIdx>,
    tail: Option<SegIdx>,
}

impl Bucket {
    const EMPTY: Self = Self {
        head: None,
        tail: None,
    };
}

pub(crate) struct FreeIndex {
    buckets: [Bucket; NUM_BUCKETS],
}

impl FreeIndex {
    pub(crate) const fn new() -> Self {
        Self {
            buckets: [Bucket::EMPTY; NUM_BUCKETS],
        }
    }

    /// First segment of bucket `bucket`, the instant-fit candidate.
    pub(crate) fn first(&self, bucket: usize) -> Option<SegIdx> {
        self.buckets[bucket].head
    }

    /// Next segment within the same bucket.
    pub(crate) fn chain_next(&self, slab: &Slab, idx: SegIdx) -> Option<SegIdx> {
        slab.get(idx).link.next
    }

    pub(crate) fn insert(&mut self, slab: &mut Slab, idx: SegIdx) {
        let bucket = &mut self.buckets[bucket_of(slab.get(idx).size)];
        let tail = bucket.tail;
        {
            let seg = slab.get_mut(idx);
            seg.link.prev = tail;
            seg.link.next = None;
        }
        match tail {
            Some(tail) => slab.get_mut(tail).link.next = Some(idx),
            None => bucket.head = Some(idx),
        }
        bucket.tail = Some(idx);
    }

    /// Unlinks `idx` from its bucket. The bucket is recomputed from the
    /// segment's current size, so callers must remove before resizing.
    pub(crate) fn remove(&mut self, slab: &mut Slab, idx: SegIdx) {
        let bucket = &mut self.buckets[bucket_of(slab.get(idx).size)];
        let (prev, next) = {
            let seg = slab.get_mut(idx);
            let pair = (seg.link.prev, seg.link.next);
            seg.link.prev = None;
            seg.link.next = None;
            pair
        };
        match prev {
            Some(prev) => slab.get_mut(prev).link.next = next,
            None => bucket.head = next,
        }
        match next {
            Some(next) => slab.get_mut(next).link.prev = prev,
            None => bucket.tail = prev,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::SegKind;

    fn free_seg(slab: &mut Slab, base: usize, size: usize) -> SegIdx {
        let idx = slab.acquire();
        let seg = slab.get_mut(idx);
        seg.base = base;
        seg.size = size;
        seg.kind = SegKind::Free;
        idx
    }

    fn bucket_sizes(index: &FreeIndex, slab: &Slab, bucket: usize) -> Vec<usize> {
        let mut sizes = Vec::new();
        let mut cur = index.first(bucket);
        while let Some(idx) = cur {
            sizes.push(slab.get(idx).size);
            cur = index.chain_next(slab, idx);
        }
        sizes
    }

    #[test]
    fn test_bucket_of_is_floor_log2() {
        assert_eq!(bucket_of(1), 0);
        assert_eq!(bucket_of(2), 1);
        assert_eq!(bucket_of(3), 1);
        assert_eq!(bucket_of(4), 2);
        assert_eq!(bucket_of(0x1000), 12);
        assert_eq!(bucket_of(0x1800), 12);
        assert_eq!(bucket_of(0x2000), 13);
        assert_eq!(bucket_of(usize::MAX), NUM_BUCKETS - 1);
    }

    #[test]
    #[should_panic(expected = "free segment with zero size")]
    fn test_bucket_of_zero() {
        let _ = bucket_of(0);
    }

    #[test]
    fn test_insert_is_fifo() {
        let mut slab = Slab::new_hosted();
        let mut index = FreeIndex::new();
        for size in [0x2000, 0x3000, 0x2800] {
            let idx = free_seg(&mut slab, 0, size);
            index.insert(&mut slab, idx);
        }
        assert_eq!(bucket_sizes(&index, &slab, 13), vec![0x2000, 0x3000, 0x2800]);
    }

    #[test]
    fn test_segments_land_in_their_class() {
        let mut slab = Slab::new_hosted();
        let mut index = FreeIndex::new();
        let small = free_seg(&mut slab, 0, 0x1800);
        let large = free_seg(&mut slab, 0, 0x4000);
        index.insert(&mut slab, small);
        index.insert(&mut slab, large);

        assert_eq!(index.first(12), Some(small));
        assert_eq!(index.first(13), None);
        assert_eq!(index.first(14), Some(large));
    }

    #[test]
    fn test_remove_interior_head_and_tail() {
        let mut slab = Slab::new_hosted();
        let mut index = FreeIndex::new();
        let idxs: Vec<_> = [0x2000, 0x2100, 0x2200, 0x2300]
            .into_iter()
            .map(|size| {
                let idx = free_seg(&mut slab, 0, size);
                index.insert(&mut slab, idx);
                idx
            })
            .collect();

        index.remove(&mut slab, idxs[1]);
        assert_eq!(bucket_sizes(&index, &slab, 13), vec![0x2000, 0x2200, 0x2300]);
        index.remove(&mut slab, idxs[0]);
        assert_eq!(bucket_sizes(&index, &slab, 13), vec![0x2200, 0x2300]);
        index.remove(&mut slab, idxs[3]);
        assert_eq!(bucket_sizes(&index, &slab, 13), vec![0x2200]);
        index.remove(&mut slab, idxs[2]);
        assert_eq!(bucket_sizes(&index, &slab, 13), vec![]);
    }
}
