//! Scene zone and analysis integration tests.

use framemap_core::{
    Error, Frame, FrameFlags, FrameIter, MemorySource, PixelFormat, StreamInfo, TimeBase,
};
use framemap_pipeline::{NodeId, Pipeline};
use framemap_scene::*;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

const FILM: i64 = 1001;

// =============================================================================
// Helpers
// =============================================================================

fn film() -> TimeBase {
    TimeBase::new(1, 24000)
}

fn gray(value: u8) -> Frame {
    let mut frame = Frame::new(8, 8, PixelFormat::Gray8, film());
    frame.buffer_mut().fill(value);
    frame
}

/// Film-rate frames whose pts gain `drift` ticks from frame `from` on.
fn drifting(count: usize, from: usize, drift: i64) -> MemorySource {
    let frames = (0..count)
        .map(|n| {
            let mut frame = gray(n as u8);
            frame.pts = n as i64 * FILM + if n >= from { drift } else { 0 };
            frame.duration = FILM;
            frame
        })
        .collect();
    MemorySource::new(StreamInfo::new(8, 8, PixelFormat::Gray8, film()), frames).unwrap()
}

/// 25 fps frames in a millisecond time base, `drift` ms late from frame
/// `from` on.
fn pal(count: usize, from: usize, drift: i64) -> MemorySource {
    let tb = TimeBase::new(1, 1000);
    let frames = (0..count)
        .map(|n| {
            let mut frame = Frame::new(8, 8, PixelFormat::Gray8, tb);
            frame.pts = n as i64 * 40 + if n >= from { drift } else { 0 };
            frame.duration = 40;
            frame
        })
        .collect();
    MemorySource::new(StreamInfo::new(8, 8, PixelFormat::Gray8, tb), frames).unwrap()
}

fn setup(source: MemorySource, fixpts: bool) -> (Pipeline, NodeId, NodeId) {
    let mut pipeline = Pipeline::new();
    let src = pipeline.add_source("src", source);
    let shared = SceneShared {
        fixpts,
        stats: None,
    };
    let filter = SceneFilter::new("scenes", SceneZone::new(), shared).unwrap();
    let id = pipeline.add_filter(src, filter).unwrap();
    (pipeline, src, id)
}

fn insert(pipeline: &mut Pipeline, id: NodeId, n: usize, zone: SceneZone) {
    pipeline
        .edit::<SceneFilter, _>(id, |f| f.insert_zone_with(n, zone))
        .unwrap();
}

fn frames(pipeline: &Pipeline, id: NodeId) -> Vec<Frame> {
    pipeline
        .node(id)
        .unwrap()
        .iter_frames(None, None)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap()
}

/// Every frame ends where the next one starts.
fn assert_contiguous(pipeline: &Pipeline, id: NodeId) {
    let node = pipeline.node(id).unwrap();
    let pts = node.pts().unwrap();
    let durations = node.durations().unwrap();
    for n in 1..pts.len() {
        assert_eq!(pts[n - 1] + durations[n - 1], pts[n], "frame {}", n - 1);
    }
}

fn stream(frames: Vec<Frame>) -> FrameIter<'static> {
    Box::new(frames.into_iter().map(Ok::<_, Error>))
}

/// Two shots of 15 frames each.
fn two_shots() -> Vec<Frame> {
    (0..30).map(|n| gray(if n < 15 { 20 } else { 220 })).collect()
}

// =============================================================================
// Keyframing
// =============================================================================

#[test]
fn test_zone_start_forces_sync() {
    let (mut pipeline, _, id) = setup(drifting(10, 10, 0), false);
    insert(&mut pipeline, id, 4, SceneZone::new());

    let synced: Vec<usize> = frames(&pipeline, id)
        .iter()
        .filter(|f| f.is_forced_sync())
        .map(|f| f.index)
        .collect();
    assert_eq!(synced, vec![4]);
}

#[test]
fn test_without_fixpts_pts_pass_through() {
    let (mut pipeline, src, id) = setup(drifting(10, 4, 2), false);
    insert(&mut pipeline, id, 4, SceneZone::new());

    let upstream = pipeline.node(src).unwrap().pts().unwrap();
    assert_eq!(pipeline.node(id).unwrap().pts().unwrap(), upstream);
    assert!(pipeline.node(id).unwrap().index_map().unwrap().is_identity());
}

// =============================================================================
// Pts correction
// =============================================================================

#[test]
fn test_fixpts_removes_drift() {
    let (mut pipeline, src, id) = setup(drifting(10, 4, 2), true);
    insert(&mut pipeline, id, 4, SceneZone::new());

    let upstream = pipeline.node(src).unwrap().pts().unwrap();
    let corrected = pipeline.node(id).unwrap().pts().unwrap();
    for n in 0..10 {
        assert_eq!(corrected[n], n as i64 * FILM, "frame {}", n);
        let drift = if n >= 4 { 2 } else { 0 };
        assert_eq!(upstream[n] - corrected[n], drift);
    }

    let rendered = frames(&pipeline, id);
    assert_eq!(rendered[4].pts, 4 * FILM);
    assert!(rendered[4].flags.contains(FrameFlags::FORCED_SYNC));
    assert_eq!(rendered[3].duration, FILM);
    assert_contiguous(&pipeline, id);
}

#[test]
fn test_fixpts_keeps_steady_stream() {
    let (mut pipeline, src, id) = setup(pal(200, 200, 0), true);
    pipeline
        .edit::<SceneFilter, _>(id, |f| {
            f.insert_zone_at(100)?;
            f.insert_zone_at(150)
        })
        .unwrap();

    let upstream = pipeline.node(src).unwrap();
    let node = pipeline.node(id).unwrap();
    assert_eq!(node.pts().unwrap(), upstream.pts().unwrap());
    assert_eq!(node.durations().unwrap(), upstream.durations().unwrap());
    assert_eq!(node.end_pts().unwrap(), upstream.end_pts().unwrap());
}

#[test]
fn test_fixpts_removes_jitter_at_25fps() {
    let (mut pipeline, _, id) = setup(pal(200, 100, 3), true);
    insert(&mut pipeline, id, 100, SceneZone::new());

    let corrected = pipeline.node(id).unwrap().pts().unwrap();
    for (n, &p) in corrected.iter().enumerate() {
        assert_eq!(p, n as i64 * 40, "frame {}", n);
    }
    assert_contiguous(&pipeline, id);
}

#[test]
fn test_toggling_fixpts_invalidates() {
    let (mut pipeline, _, id) = setup(drifting(10, 4, 2), false);
    insert(&mut pipeline, id, 4, SceneZone::new());
    assert_eq!(pipeline.node(id).unwrap().pts().unwrap()[5], 5 * FILM + 2);

    pipeline
        .edit::<SceneFilter, _>(id, |f| {
            f.set_fixpts(true);
            Ok(())
        })
        .unwrap();
    assert!(pipeline.filter::<SceneFilter>(id).unwrap().fixpts());
    assert_eq!(pipeline.node(id).unwrap().pts().unwrap()[5], 5 * FILM);
}

#[test]
fn test_transition_zones_do_not_anchor() {
    let pinned = SceneZone::new().with_start_pts(5000);

    let (mut pipeline, _, id) = setup(drifting(10, 10, 0), true);
    insert(&mut pipeline, id, 4, pinned.clone());
    insert(&mut pipeline, id, 7, SceneZone::new());
    let pts = pipeline.node(id).unwrap().pts().unwrap();
    assert_eq!(&pts[4..7], &[5000, 6001, 7002]);
    assert_eq!(pts[7], 5000 + 3 * FILM);
    assert_contiguous(&pipeline, id);

    let (mut pipeline, _, id) = setup(drifting(10, 10, 0), true);
    insert(
        &mut pipeline,
        id,
        4,
        SceneZone {
            transition: true,
            ..pinned
        },
    );
    insert(&mut pipeline, id, 7, SceneZone::new());
    let pts = pipeline.node(id).unwrap().pts().unwrap();
    assert_eq!(pts[7], 7 * FILM);
    assert_contiguous(&pipeline, id);
}

#[test]
fn test_last_zone_keeps_stream_end() {
    let (mut pipeline, src, id) = setup(drifting(6, 10, 0), true);
    insert(&mut pipeline, id, 3, SceneZone::new().with_start_pts(5500));

    let end = pipeline.node(src).unwrap().end_pts().unwrap();
    let node = pipeline.node(id).unwrap();
    let pts = node.pts().unwrap();
    assert_eq!(pts[3], 5500);
    assert!(pts.iter().all(|&p| p < end));
    assert!(pts.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(node.end_pts().unwrap(), end);
    assert_contiguous(&pipeline, id);
}

// =============================================================================
// Analysis
// =============================================================================

#[test]
fn test_analysis_finds_cut() {
    let source = MemorySource::constant_rate(
        StreamInfo::new(8, 8, PixelFormat::Gray8, film()),
        two_shots(),
        FILM,
    )
    .unwrap();
    let (mut pipeline, src, id) = setup(source, false);

    let analyzer = SceneAnalyzer::new(AnalysisConfig::default().with_progress_interval(10));
    let mut reports = Vec::new();
    let outcome = analyzer
        .run_node(&pipeline.node(src).unwrap(), None, |p| reports.push(p))
        .unwrap();
    assert!(outcome.completed);
    assert_eq!(outcome.stats.len(), 30);
    assert_eq!(reports.last().map(|p| p.analyzed), Some(30));

    let config = SceneConfig::default()
        .with_adaptive_threshold(false)
        .with_min_scene_length(1);
    let inserted = pipeline
        .edit::<SceneFilter, _>(id, |f| {
            f.set_stats(Some(outcome.stats));
            f.apply_boundaries(&config)
        })
        .unwrap();
    assert_eq!(inserted, vec![15]);

    let synced: Vec<usize> = frames(&pipeline, id)
        .iter()
        .filter(|f| f.is_forced_sync())
        .map(|f| f.index)
        .collect();
    assert_eq!(synced, vec![15]);
}

#[test]
fn test_apply_boundaries_needs_stats() {
    let (mut pipeline, _, id) = setup(drifting(10, 10, 0), false);
    let err = pipeline
        .edit::<SceneFilter, _>(id, |f| f.apply_boundaries(&SceneConfig::default()))
        .unwrap_err();
    assert!(err.is_configuration());
}

/// Frame iterator cancelling `token` once frame `at` has been handed out.
fn cancelling(frames: Vec<Frame>, token: CancelToken, at: usize) -> FrameIter<'static> {
    Box::new(frames.into_iter().enumerate().map(move |(n, frame)| {
        if n == at {
            token.cancel();
        }
        Ok::<_, Error>(frame)
    }))
}

#[test]
fn test_cancel_then_resume() {
    let full = SceneAnalyzer::default()
        .run(stream(two_shots()), 30, None, |_| {})
        .unwrap()
        .into_complete()
        .unwrap();

    let analyzer = SceneAnalyzer::default();
    let token = analyzer.cancel_token();
    let partial = analyzer
        .run(cancelling(two_shots(), token, 20), 30, None, |_| {})
        .unwrap();
    assert!(!partial.completed);
    // Frame 20 is never analysed.
    assert_eq!(partial.stats.len(), 20);
    assert_eq!(partial.stats.rows(), &full.rows()[..20]);

    let start = resume_frame(Some(&partial.stats));
    let rest = two_shots().into_iter().skip(start).collect();
    let resumed = SceneAnalyzer::default()
        .run(stream(rest), 30, Some(partial.stats), |_| {})
        .unwrap();
    assert!(resumed.completed);
    assert_eq!(resumed.stats, full);
}

#[test]
fn test_analyzer_runs_again_after_cancel() {
    let analyzer = SceneAnalyzer::default();
    let token = analyzer.cancel_token();
    let partial = analyzer
        .run(cancelling(two_shots(), token.clone(), 5), 30, None, |_| {})
        .unwrap();
    assert!(!partial.completed);
    assert_eq!(partial.stats.len(), 5);
    assert!(!token.is_cancelled());

    let outcome = analyzer.run(stream(two_shots()), 30, None, |_| {}).unwrap();
    assert!(outcome.completed);
    assert_eq!(outcome.stats.len(), 30);
}

#[test]
fn test_spawned_analysis() {
    let progress = Arc::new(AtomicUsize::new(0));
    let done = Arc::new(AtomicBool::new(false));

    let handle = {
        let progress = progress.clone();
        let done = done.clone();
        SceneAnalyzer::new(AnalysisConfig::default().with_progress_interval(5))
            .spawn(
                stream(two_shots()),
                30,
                None,
                move |p| progress.store(p.analyzed, Ordering::SeqCst),
                move |result| done.store(result.is_ok(), Ordering::SeqCst),
            )
            .unwrap()
    };
    let outcome = handle.join().unwrap();

    assert!(outcome.completed);
    assert_eq!(outcome.stats.len(), 30);
    assert_eq!(progress.load(Ordering::SeqCst), 30);
    assert!(done.load(Ordering::SeqCst));
}

#[test]
fn test_spawned_analysis_cancelled_early() {
    let analyzer = SceneAnalyzer::default();
    analyzer.cancel_token().cancel();
    let handle = analyzer
        .spawn(
            stream(two_shots()),
            30,
            None,
            |_| {},
            |_| {},
        )
        .unwrap();
    let outcome = handle.join().unwrap();
    assert!(!outcome.completed);
    assert!(outcome.stats.is_empty());
}
