//! Boundary scenarios: literal seed tests for the split, coalesce and
//! fit-policy behavior of the arena.

use extent_arena::{AllocFlags, Arena, Constraint, SegKind, SegmentInfo};

fn layout(arena: &Arena<'_>) -> Vec<(usize, usize, SegKind)> {
    arena
        .snapshot()
        .into_iter()
        .map(|seg| (seg.base, seg.size, seg.kind))
        .collect()
}

fn non_spans(arena: &Arena<'_>) -> Vec<SegmentInfo> {
    arena
        .snapshot()
        .into_iter()
        .filter(|seg| seg.kind != SegKind::Span)
        .collect()
}

#[test]
fn exact_fit_no_split() {
    let arena = Arena::create("exact", 0x1000, 0x1000, 0x1000, None, 0, AllocFlags::empty());
    let addr = arena.alloc(0x1000, AllocFlags::INSTANT_FIT).unwrap();
    assert_eq!(addr, 0x1000);

    // One allocated segment, zero free segments.
    assert_eq!(
        layout(&arena),
        vec![
            (0x1000, 0x1000, SegKind::Span),
            (0x1000, 0x1000, SegKind::Allocated),
        ]
    );
}

#[test]
fn head_split() {
    let arena = Arena::create("head", 0x0, 0x10000, 0x100, None, 0, AllocFlags::empty());
    let addr = arena
        .xalloc(
            0x1000,
            &Constraint {
                align: 0x1000,
                phase: 0x100,
                ..Constraint::default()
            },
            AllocFlags::empty(),
        )
        .unwrap();
    assert_eq!(addr, 0x100);

    assert_eq!(
        layout(&arena),
        vec![
            (0x0, 0x10000, SegKind::Span),
            (0x0, 0x100, SegKind::Free),
            (0x100, 0x1000, SegKind::Allocated),
            (0x1100, 0xff00, SegKind::Free),
        ]
    );
}

#[test]
fn tail_split() {
    let arena = Arena::create("tail", 0, 0x10000, 0x1000, None, 0, AllocFlags::empty());
    let addr = arena.alloc(0x1000, AllocFlags::empty()).unwrap();
    assert_eq!(addr, 0x0);

    assert_eq!(
        layout(&arena),
        vec![
            (0x0, 0x10000, SegKind::Span),
            (0x0, 0x1000, SegKind::Allocated),
            (0x1000, 0xf000, SegKind::Free),
        ]
    );
}

#[test]
fn coalesce_on_free() {
    let arena = Arena::create("coalesce", 0x0, 0x10000, 0x100, None, 0, AllocFlags::empty());
    let addr = arena
        .xalloc(
            0x1000,
            &Constraint {
                align: 0x1000,
                phase: 0x100,
                ..Constraint::default()
            },
            AllocFlags::empty(),
        )
        .unwrap();
    assert_eq!(addr, 0x100);

    arena.free(0x100, 0x1000);

    // Both splits merged back: one free segment, no allocated segments.
    assert_eq!(
        layout(&arena),
        vec![(0x0, 0x10000, SegKind::Span), (0x0, 0x10000, SegKind::Free)]
    );
}

#[test]
fn exhaustion() {
    let arena = Arena::create("exhausted", 0, 0x1000, 0x1000, None, 0, AllocFlags::empty());
    let addr = arena.alloc(0x1000, AllocFlags::empty()).unwrap();
    assert_eq!(addr, 0);
    assert!(arena.alloc(0x1000, AllocFlags::empty()).is_err());
}

/// Free segments of sizes 0x2000, 0x3000, 0x4000 installed in that order.
/// 0x2000 and 0x3000 share the 0x2000-class bucket (13); 0x4000 sits in
/// bucket 14.
fn three_class_arena() -> Arena<'static> {
    let arena = Arena::create("classes", 0, 0, 0x100, None, 0, AllocFlags::empty());
    arena.add(0x10000, 0x2000, AllocFlags::empty());
    arena.add(0x20000, 0x3000, AllocFlags::empty());
    arena.add(0x30000, 0x4000, AllocFlags::empty());
    arena
}

#[test]
fn best_fit_takes_smallest_class_member() {
    let arena = three_class_arena();
    // bucket_of(0x1800) = 12 is empty; bucket 13 holds 0x2000 and 0x3000
    // and the smallest fit wins.
    let addr = arena.alloc(0x1800, AllocFlags::BEST_FIT).unwrap();
    assert_eq!(addr, 0x10000);
}

#[test]
fn instant_fit_takes_first_class_candidate() {
    let arena = three_class_arena();
    // 0x1800 is not a power of two, so instant-fit starts one class up, at
    // bucket 13, and takes its first candidate: the 0x2000 segment,
    // installed before the 0x3000 one.
    let addr = arena.alloc(0x1800, AllocFlags::INSTANT_FIT).unwrap();
    assert_eq!(addr, 0x10000);
}

#[test]
fn instant_and_best_fit_diverge_on_bucket_order() {
    // Install the 0x3000 segment first: instant-fit takes it as the bucket
    // head while best-fit still hunts down the smaller 0x2000.
    let instant = Arena::create("instant", 0, 0, 0x100, None, 0, AllocFlags::empty());
    instant.add(0x20000, 0x3000, AllocFlags::empty());
    instant.add(0x10000, 0x2000, AllocFlags::empty());
    assert_eq!(
        instant.alloc(0x1800, AllocFlags::INSTANT_FIT).unwrap(),
        0x20000
    );

    let best = Arena::create("best", 0, 0, 0x100, None, 0, AllocFlags::empty());
    best.add(0x20000, 0x3000, AllocFlags::empty());
    best.add(0x10000, 0x2000, AllocFlags::empty());
    assert_eq!(best.alloc(0x1800, AllocFlags::BEST_FIT).unwrap(), 0x10000);
}

#[test]
fn window_constrained_allocation() {
    let arena = Arena::create("window", 0, 0x10000, 0x1000, None, 0, AllocFlags::empty());
    let addr = arena
        .xalloc(
            0x1000,
            &Constraint {
                minaddr: 0x4000,
                maxaddr: 0x6000,
                ..Constraint::default()
            },
            AllocFlags::empty(),
        )
        .unwrap();
    assert!(addr >= 0x4000);
    assert!(addr + 0x1000 <= 0x6000);

    // An impossible window is plain exhaustion, not a panic.
    assert!(
        arena
            .xalloc(
                0x2000,
                &Constraint {
                    minaddr: 0x4000,
                    maxaddr: 0x5000,
                    ..Constraint::default()
                },
                AllocFlags::empty(),
            )
            .is_err()
    );
}

#[test]
fn nocross_constrained_allocation() {
    let arena = Arena::create("nocross", 0, 0x10000, 0x100, None, 0, AllocFlags::empty());
    // Fragment the front so the candidate segment starts near a boundary.
    let pad = arena.alloc(0xe00, AllocFlags::empty()).unwrap();
    assert_eq!(pad, 0);

    let addr = arena
        .xalloc(
            0x300,
            &Constraint {
                nocross: 0x1000,
                ..Constraint::default()
            },
            AllocFlags::empty(),
        )
        .unwrap();
    assert_eq!(addr / 0x1000, (addr + 0x300 - 1) / 0x1000);
    assert_eq!(addr, 0x1000);
}

#[test]
fn span_reuse_round_trip() {
    let arena = Arena::create("trip", 0, 0x10000, 0x1000, None, 0, AllocFlags::empty());
    let initial = arena.snapshot();

    let a = arena.alloc(0x3000, AllocFlags::empty()).unwrap();
    let b = arena.alloc(0x1000, AllocFlags::empty()).unwrap();
    let c = arena.alloc(0x4000, AllocFlags::empty()).unwrap();

    // Free out of order; coalescing must restore the initial structure.
    arena.free(b, 0x1000);
    arena.free(c, 0x4000);
    arena.free(a, 0x3000);
    assert_eq!(arena.snapshot(), initial);

    // Adding spans is order-independent in the final segment set.
    let left = Arena::create("left", 0, 0, 0x1000, None, 0, AllocFlags::empty());
    left.add(0x40000, 0x1000, AllocFlags::empty());
    left.add(0x50000, 0x1000, AllocFlags::empty());
    let right = Arena::create("right", 0, 0, 0x1000, None, 0, AllocFlags::empty());
    right.add(0x50000, 0x1000, AllocFlags::empty());
    right.add(0x40000, 0x1000, AllocFlags::empty());
    assert_eq!(left.snapshot(), right.snapshot());
}

#[test]
fn phase_lattice_holds_under_fragmentation() {
    let arena = Arena::create("phase", 0, 0x40000, 0x100, None, 0, AllocFlags::empty());
    let constraint = Constraint {
        align: 0x1000,
        phase: 0x300,
        ..Constraint::default()
    };

    let mut held = Vec::new();
    for _ in 0..8 {
        let addr = arena.xalloc(0x500, &constraint, AllocFlags::empty()).unwrap();
        assert_eq!((addr - 0x300) % 0x1000, 0);
        held.push(addr);
    }
    for (i, addr) in held.iter().enumerate() {
        if i % 2 == 0 {
            arena.free(*addr, 0x500);
        }
    }
    let addr = arena.xalloc(0x500, &constraint, AllocFlags::empty()).unwrap();
    assert_eq!((addr - 0x300) % 0x1000, 0);

    for (i, addr) in held.iter().enumerate() {
        if i % 2 == 1 {
            arena.free(*addr, 0x500);
        }
    }
    arena.free(addr, 0x500);
    assert_eq!(arena.free_space(), 0x40000);
    assert_eq!(arena.allocated_space(), 0);
}

#[test]
fn non_span_segments_tile_each_span() {
    let arena = Arena::create("tile", 0, 0x10000, 0x1000, None, 0, AllocFlags::empty());
    let a = arena.alloc(0x2000, AllocFlags::empty()).unwrap();
    let _b = arena.alloc(0x3000, AllocFlags::empty()).unwrap();
    arena.free(a, 0x2000);

    let segs = non_spans(&arena);
    assert_eq!(segs.first().unwrap().base, 0);
    assert_eq!(segs.last().unwrap().end(), 0x10000);
    for pair in segs.windows(2) {
        assert_eq!(pair[0].end(), pair[1].base);
    }
}
