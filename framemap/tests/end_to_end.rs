//! End-to-end tests: pulldown, scene and plain stages in one pipeline.

use framemap::prelude::*;
use framemap::{DropFilter, FrameIter, NullFilter, ScaleFilter};
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const FRAME: i64 = 1001;

// =============================================================================
// Mock Implementations
// =============================================================================

/// Telecined decoder output counting decoded frames. Fields of frame `n`
/// hold `10n` (even rows) and `10n + 5` (odd rows).
struct TelecineSource {
    pts: Vec<i64>,
    durations: Vec<i64>,
    decoded: Arc<AtomicUsize>,
}

impl TelecineSource {
    fn new(count: usize) -> Self {
        Self {
            pts: (0..count as i64).map(|n| n * FRAME).collect(),
            durations: vec![FRAME; count],
            decoded: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl FrameSource for TelecineSource {
    fn info(&self) -> StreamInfo {
        StreamInfo::new(2, 4, PixelFormat::Gray8, TimeBase::new(1, 30000))
    }

    fn pts(&self) -> &[i64] {
        &self.pts
    }

    fn durations(&self) -> &[i64] {
        &self.durations
    }

    fn iter_frames(&self, start: usize, end: usize) -> FrameIter<'_> {
        let end = end.min(self.pts.len());
        Box::new((start..end).map(move |n| {
            self.decoded.fetch_add(1, Ordering::SeqCst);
            let mut frame = Frame::new(2, 4, PixelFormat::Gray8, TimeBase::new(1, 30000));
            frame.flags = FrameFlags::INTERLACED | FrameFlags::TOP_FIELD_FIRST;
            for y in 0..4 {
                let value = 10 * n as u8 + if y % 2 == 0 { 0 } else { 5 };
                frame.buffer_mut().row_mut(0, y).unwrap().fill(value);
            }
            frame.index = n;
            frame.pts = self.pts[n];
            frame.duration = self.durations[n];
            Ok(frame)
        }))
    }
}

struct Graph {
    pipeline: Pipeline,
    src: NodeId,
    ivtc: NodeId,
    scenes: NodeId,
    decoded: Arc<AtomicUsize>,
}

/// source → 3:2 pullup → scenes (cut at film frame 4).
fn film_graph() -> Graph {
    let source = TelecineSource::new(10);
    let decoded = source.decoded.clone();
    let mut pipeline = Pipeline::new();
    let src = pipeline.add_source("decoder", source);
    let ivtc = pipeline
        .add_filter(
            src,
            PulldownFilter::new("ivtc", PulldownZone::new("AABBBCCDDD").unwrap(), ()).unwrap(),
        )
        .unwrap();
    let scenes = pipeline
        .add_filter(
            ivtc,
            SceneFilter::new("scenes", SceneZone::new(), SceneShared::default()).unwrap(),
        )
        .unwrap();
    pipeline
        .edit::<SceneFilter, _>(scenes, |f| f.insert_zone_at(4))
        .unwrap();
    Graph {
        pipeline,
        src,
        ivtc,
        scenes,
        decoded,
    }
}

fn collect(pipeline: &Pipeline, id: NodeId) -> Vec<Frame> {
    pipeline
        .node(id)
        .unwrap()
        .iter_frames(None, None)
        .unwrap()
        .collect::<Result<_>>()
        .unwrap()
}

// =============================================================================
// Full pipeline
// =============================================================================

#[test]
fn test_film_pipeline() {
    let g = film_graph();
    let node = g.pipeline.node(g.scenes).unwrap();
    assert_eq!(node.framecount().unwrap(), 8);
    assert_eq!(
        node.cumulative_index_reverse_map().unwrap().as_slice(),
        &[0, 1, 3, 4, 5, 6, 8, 9]
    );

    let frames = collect(&g.pipeline, g.scenes);
    assert_eq!(frames.len(), 8);
    let synced: Vec<usize> = frames
        .iter()
        .filter(|f| f.is_forced_sync())
        .map(|f| f.index)
        .collect();
    assert_eq!(synced, vec![4]);
    assert!(frames.iter().all(|f| !f.flags.contains(FrameFlags::INTERLACED)));
    assert_eq!(g.decoded.load(Ordering::SeqCst), 10);
}

#[test]
fn test_partial_read_decodes_one_block() {
    let g = film_graph();
    let frames: Vec<Frame> = g
        .pipeline
        .node(g.scenes)
        .unwrap()
        .iter_frames(Some(Position::FrameNumber(5)), Some(Position::FrameNumber(7)))
        .unwrap()
        .map(|f| f.unwrap())
        .collect();

    assert_eq!(frames.iter().map(|f| f.index).collect::<Vec<_>>(), vec![5, 6]);
    assert_eq!(g.decoded.load(Ordering::SeqCst), 5);
}

#[test]
fn test_scale_after_pullup() {
    let mut g = film_graph();
    let scaled = g
        .pipeline
        .add_filter(g.ivtc, ScaleFilter::new(4, 8).unwrap())
        .unwrap();
    let node = g.pipeline.node(scaled).unwrap();
    assert_eq!(node.width().unwrap(), 4);
    assert_eq!(node.height().unwrap(), 8);
    assert_eq!(node.pts().unwrap(), g.pipeline.node(g.ivtc).unwrap().pts().unwrap());

    let frames = collect(&g.pipeline, scaled);
    assert_eq!(frames.len(), 8);
    assert_eq!(frames[0].width(), 4);
}

// =============================================================================
// Index and timestamp translation
// =============================================================================

#[test]
fn test_translate_index() {
    let g = film_graph();
    let p = &g.pipeline;
    assert_eq!(translate_index(p, g.scenes, g.src, 2).unwrap(), Some(3));
    assert_eq!(translate_index(p, g.src, g.scenes, 3).unwrap(), Some(2));
    // Frame 2 mixes B and C; C is rebuilt from frame 3.
    assert_eq!(translate_index(p, g.src, g.scenes, 2).unwrap(), None);
    assert_eq!(translate_index(p, g.scenes, g.src, 8).unwrap(), None);
    assert_eq!(translate_index(p, g.ivtc, g.scenes, 6).unwrap(), Some(6));
}

#[test]
fn test_translate_pts() {
    let g = film_graph();
    let p = &g.pipeline;
    // Film frame 2 starts at 2503 and is rebuilt from telecined frame 3.
    assert_eq!(translate_pts(p, g.scenes, g.src, 2503).unwrap(), Some(3 * FRAME));
    assert_eq!(translate_pts(p, g.scenes, g.src, 2600).unwrap(), Some(3 * FRAME));
    assert_eq!(translate_pts(p, g.src, g.scenes, 4 * FRAME).unwrap(), Some(3754));
    assert_eq!(translate_pts(p, g.scenes, g.src, -1).unwrap(), None);
    assert_eq!(translate_pts(p, g.scenes, g.src, 10 * FRAME).unwrap(), None);
}

// =============================================================================
// Chains
// =============================================================================

#[test]
fn test_zone_edit_inside_chain_reaches_consumer() {
    let mut pipeline = Pipeline::new();
    let src = pipeline.add_source("decoder", TelecineSource::new(10));
    let chain = pipeline.add_chain("restore", src).unwrap();
    let ivtc = pipeline
        .chain_append(
            chain,
            PulldownFilter::new("ivtc", PulldownZone::new("AABBBCCDDD").unwrap(), ()).unwrap(),
        )
        .unwrap();
    pipeline.chain_append(chain, DropFilter::new([0])).unwrap();
    let tail = pipeline.add_filter(chain, NullFilter::default()).unwrap();
    assert_eq!(pipeline.node(tail).unwrap().framecount().unwrap(), 7);

    pipeline
        .edit::<PulldownFilter, _>(ivtc, |f| f.replace_zone(0, PulldownZone::default()))
        .unwrap();
    assert_eq!(pipeline.node(tail).unwrap().framecount().unwrap(), 9);
    assert_eq!(collect(&pipeline, tail).len(), 9);
}

// =============================================================================
// Property tests
// =============================================================================

const PATTERNS: [&str; 3] = ["AA", "AABB", "AABBBCCDDD"];

proptest! {
    #[test]
    fn prop_zoned_pulldown_is_consistent(
        count in 1usize..30,
        cuts in proptest::collection::btree_map(1usize..30, (0usize..3, 0usize..5), 0..4),
        first in 0usize..3,
    ) {
        let mut pipeline = Pipeline::new();
        let src = pipeline.add_source("decoder", TelecineSource::new(count));
        let filter = PulldownFilter::new("ivtc", PulldownZone::new(PATTERNS[first]).unwrap(), ()).unwrap();
        let ivtc = pipeline.add_filter(src, filter).unwrap();
        pipeline.edit::<PulldownFilter, _>(ivtc, |f| {
            for (&n, &(pattern, offset)) in &cuts {
                let zone = PulldownZone::new(PATTERNS[pattern])?;
                let k = zone.pattern().old_blksize();
                f.insert_zone_with(n, zone.with_offset(offset % k)?)?;
            }
            Ok(())
        }).unwrap();

        let node = pipeline.node(ivtc).unwrap();
        let forward = node.index_map().unwrap();
        let reverse = node.reverse_index_map().unwrap();
        prop_assert_eq!(forward.len(), count);
        for (n, &m) in forward.iter().enumerate() {
            if m != NO_FRAME {
                prop_assert_eq!(reverse.get(m), n as i64);
            }
        }

        let pts = node.pts().unwrap();
        prop_assert!(pts.windows(2).all(|w| w[0] <= w[1]));
        let frames = collect(&pipeline, ivtc);
        prop_assert_eq!(frames.len(), node.framecount().unwrap());
        for (m, frame) in frames.iter().enumerate() {
            prop_assert_eq!(frame.index, m);
            prop_assert_eq!(frame.pts, pts[m]);
        }
    }
}
