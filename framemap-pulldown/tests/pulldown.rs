//! Inverse telecine integration tests.

use framemap_core::{
    Frame, FrameFlags, MemorySource, PixelFormat, Position, StreamInfo, TimeBase, NO_FRAME,
};
use framemap_pipeline::{NodeId, Pipeline};
use framemap_pulldown::{PulldownFilter, PulldownZone};

const WIDTH: u32 = 2;
const HEIGHT: u32 = 4;

/// NTSC film frame in 1/30000 ticks.
const FRAME: i64 = 1001;

// =============================================================================
// Helpers
// =============================================================================

/// Frame whose even rows hold `even` and odd rows hold `odd`.
fn field_frame(even: u8, odd: u8) -> Frame {
    let mut frame = Frame::new(WIDTH, HEIGHT, PixelFormat::Gray8, TimeBase::new(1, 30000));
    frame.flags = FrameFlags::INTERLACED | FrameFlags::TOP_FIELD_FIRST;
    for y in 0..HEIGHT as usize {
        let value = if y % 2 == 0 { even } else { odd };
        frame.buffer_mut().row_mut(0, y).unwrap().fill(value);
    }
    frame
}

fn setup(frames: Vec<Frame>, zone: PulldownZone) -> (Pipeline, NodeId) {
    let info = StreamInfo::new(WIDTH, HEIGHT, PixelFormat::Gray8, TimeBase::new(1, 30000));
    let source = MemorySource::constant_rate(info, frames, FRAME).unwrap();
    let mut pipeline = Pipeline::new();
    let src = pipeline.add_source("telecined", source);
    let filter = PulldownFilter::new("ivtc", zone, ()).unwrap();
    let id = pipeline.add_filter(src, filter).unwrap();
    (pipeline, id)
}

/// Ten telecined frames, fields of frame `n` holding `10n` and `10n + 5`.
fn telecined(count: usize) -> Vec<Frame> {
    (0..count)
        .map(|n| field_frame(10 * n as u8, 10 * n as u8 + 5))
        .collect()
}

fn column(frame: &Frame) -> Vec<u8> {
    (0..HEIGHT as usize)
        .map(|y| frame.buffer().row(0, y).unwrap()[0])
        .collect()
}

fn render(pipeline: &Pipeline, id: NodeId) -> Vec<Frame> {
    pipeline
        .node(id)
        .unwrap()
        .iter_frames(None, None)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap()
}

// =============================================================================
// Maps and timing
// =============================================================================

#[test]
fn test_three_two_pullup_maps() {
    let (pipeline, id) = setup(telecined(10), PulldownZone::new("AABBBCCDDD").unwrap());
    let node = pipeline.node(id).unwrap();

    assert_eq!(node.framecount().unwrap(), 8);
    assert_eq!(
        node.reverse_index_map().unwrap().as_slice(),
        &[0, 1, 3, 4, 5, 6, 8, 9]
    );
    assert_eq!(
        node.index_map().unwrap().as_slice(),
        &[0, 1, NO_FRAME, 2, 3, 4, 5, NO_FRAME, 6, 7]
    );
}

#[test]
fn test_three_two_pullup_timing() {
    let (pipeline, id) = setup(telecined(10), PulldownZone::new("AABBBCCDDD").unwrap());
    let node = pipeline.node(id).unwrap();

    assert_eq!(
        &*node.pts().unwrap(),
        &[0, 1251, 2503, 3754, 5005, 6256, 7508, 8759]
    );
    let durations = node.durations().unwrap();
    assert_eq!(durations[0], 1251);
    assert_eq!(durations[7], 10 * FRAME - 8759);
    assert_eq!(node.end_pts().unwrap(), 10 * FRAME);
}

#[test]
fn test_zones_with_offset() {
    let (mut pipeline, id) = setup(telecined(10), PulldownZone::default());
    pipeline
        .edit::<PulldownFilter, _>(id, |f| {
            f.insert_zone_with(3, PulldownZone::new("AABBBCCDDD")?)?;
            Ok(())
        })
        .unwrap();
    let node = pipeline.node(id).unwrap();

    // 3 progressive frames, one full 3:2 block, then A and B of the next.
    assert_eq!(node.framecount().unwrap(), 9);
    assert_eq!(
        node.reverse_index_map().unwrap().as_slice(),
        &[0, 1, 2, 3, 4, 6, 7, 8, 9]
    );
    assert_eq!(node.pts().unwrap()[3], 3 * FRAME);
}

#[test]
fn test_split_zone_keeps_cadence() {
    let (mut pipeline, id) = setup(telecined(20), PulldownZone::new("AABBBCCDDD").unwrap());
    let whole = pipeline.node(id).unwrap().reverse_index_map().unwrap();
    assert_eq!(
        whole.as_slice(),
        &[0, 1, 3, 4, 5, 6, 8, 9, 10, 11, 13, 14, 15, 16, 18, 19]
    );

    // Splitting on a block boundary changes nothing.
    pipeline
        .edit::<PulldownFilter, _>(id, |f| f.insert_zone_at(10))
        .unwrap();
    assert_eq!(pipeline.node(id).unwrap().reverse_index_map().unwrap(), whole);

    // Mid-block, the new zone picks up the cadence where the split falls.
    // B of the split block is rebuilt on both sides; later frames are
    // untouched.
    let offset = pipeline
        .edit::<PulldownFilter, _>(id, |f| {
            f.remove_zone_at(10)?;
            f.insert_zone_at(7)?;
            Ok(f.zone_at(7).1.kind().offset())
        })
        .unwrap();
    assert_eq!(offset, 2);
    let split = pipeline.node(id).unwrap().reverse_index_map().unwrap();
    assert_eq!(
        split.as_slice(),
        &[0, 1, 3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 14, 15, 16, 18, 19]
    );
    assert_eq!(&split[7..], &whole[6..]);
}

// =============================================================================
// Frame reconstruction
// =============================================================================

#[test]
fn test_progressive_pattern_is_exact() {
    let (pipeline, id) = setup(telecined(2), PulldownZone::new("AABB").unwrap());
    let frames = render(&pipeline, id);

    assert_eq!(frames.len(), 2);
    assert_eq!(column(&frames[0]), vec![0, 5, 0, 5]);
    assert_eq!(column(&frames[1]), vec![10, 15, 10, 15]);
    assert_eq!(frames[1].pts, FRAME);
    assert!(!frames[0].flags.contains(FrameFlags::INTERLACED));
    assert!(!frames[0].flags.contains(FrameFlags::BLENDED));
}

#[test]
fn test_three_two_pullup_weaves_fields() {
    let (pipeline, id) = setup(telecined(10), PulldownZone::new("AABBBCCDDD").unwrap());
    let frames = render(&pipeline, id);

    assert_eq!(frames.len(), 8);
    let indices: Vec<usize> = frames.iter().map(|f| f.index).collect();
    assert_eq!(indices, (0..8).collect::<Vec<_>>());
    // C: even field of frame 3, odd field of frame 2.
    assert_eq!(column(&frames[2]), vec![30, 25, 30, 25]);
    assert_eq!(column(&frames[3]), vec![40, 45, 40, 45]);
    assert_eq!(column(&frames[6]), vec![80, 75, 80, 75]);
    assert_eq!(frames[6].pts, 7508);
}

#[test]
fn test_partial_range() {
    let (pipeline, id) = setup(telecined(10), PulldownZone::new("AABBBCCDDD").unwrap());
    let frames: Vec<Frame> = pipeline
        .node(id)
        .unwrap()
        .iter_frames(Some(Position::FrameNumber(5)), Some(Position::FrameNumber(7)))
        .unwrap()
        .map(|f| f.unwrap())
        .collect();

    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].index, 5);
    assert_eq!(frames[1].index, 6);
    assert_eq!(column(&frames[1]), vec![80, 75, 80, 75]);
}

#[test]
fn test_blend_averages_fields() {
    let zone = PulldownZone::default().with_blend(true, false).unwrap();
    let (pipeline, id) = setup(vec![field_frame(10, 20)], zone);
    let frames = render(&pipeline, id);

    assert_eq!(frames.len(), 1);
    assert_eq!(column(&frames[0]), vec![15, 15, 15, 15]);
    assert!(frames[0].flags.contains(FrameFlags::BLENDED));
}

#[test]
fn test_blend_preserves_flat_content() {
    let zone = PulldownZone::new("AABBBCCDDD")
        .unwrap()
        .with_blend(true, true)
        .unwrap();
    let frames = (0..10).map(|_| field_frame(77, 77)).collect();
    let (pipeline, id) = setup(frames, zone);
    let frames = render(&pipeline, id);

    assert_eq!(frames.len(), 8);
    for frame in &frames {
        assert!(frame.flags.contains(FrameFlags::BLENDED));
        assert_eq!(column(frame), vec![77, 77, 77, 77]);
    }
}

/// A frame carrying `value` on both fields.
fn flat(value: u8) -> Frame {
    field_frame(value, value)
}

#[test]
fn test_blend_recovers_truncated_boundary_block() {
    // Film B C D | A B C D at 20..140, telecined with mixed frames
    // holding the average of their two film frames. The zone starts on
    // the B/C frame of the first block.
    let frames = vec![
        flat(30),
        flat(50),
        flat(60),
        flat(80),
        flat(100),
        flat(110),
        flat(130),
        flat(140),
    ];
    let zone = PulldownZone::new("AABBBCCDDD")
        .unwrap()
        .with_offset(2)
        .unwrap()
        .with_blend(true, false)
        .unwrap();
    let (pipeline, id) = setup(frames, zone);
    assert_eq!(pipeline.node(id).unwrap().framecount().unwrap(), 7);

    let frames = render(&pipeline, id);
    let values: Vec<u8> = frames.iter().map(|f| column(f)[0]).collect();
    assert_eq!(values, vec![20, 40, 60, 80, 100, 120, 140]);
    for frame in &frames {
        assert!(frame.flags.contains(FrameFlags::BLENDED));
        let column = column(frame);
        assert!(column.iter().all(|&v| v == column[0]));
    }
}

#[test]
fn test_singular_block_falls_back_to_weaving() {
    // A lone B/C frame: both fields mix the same two film frames, so the
    // blend cannot separate them.
    let zone = PulldownZone::new("AABBBCCDDD")
        .unwrap()
        .with_offset(2)
        .unwrap()
        .with_blend(true, true)
        .unwrap();
    let (pipeline, id) = setup(vec![field_frame(20, 40)], zone);
    let frames = render(&pipeline, id);

    assert_eq!(frames.len(), 2);
    assert_eq!(pipeline.node(id).unwrap().framecount().unwrap(), 2);
    assert_eq!(column(&frames[0]), vec![20, 20, 20, 20]);
    assert_eq!(column(&frames[1]), vec![40, 40, 40, 40]);
    for frame in &frames {
        assert!(!frame.flags.contains(FrameFlags::BLENDED));
        assert!(!frame.flags.contains(FrameFlags::INTERLACED));
    }
}

// =============================================================================
// Configuration
// =============================================================================

#[test]
fn test_zone_from_json() {
    let zone: PulldownZone =
        serde_json::from_str(r#"{"pattern": "AABBBCCDDD", "offset": 2}"#).unwrap();
    assert_eq!(zone.pattern().old_blksize(), 5);
    assert_eq!(zone.offset(), 2);
    assert!(!zone.is_blended());

    assert!(serde_json::from_str::<PulldownZone>(r#"{"pattern": "AC"}"#).is_err());
}

#[test]
fn test_invalid_zone_config_rejected() {
    let err = serde_json::from_str::<PulldownZone>(r#"{"pattern": "AABB", "offset": 5}"#)
        .unwrap_err();
    assert!(err.to_string().contains("offset 5"));
    assert!(serde_json::from_str::<PulldownZone>(
        r#"{"pattern": "ABBA", "blend_luma": true}"#
    )
    .is_err());

    let (mut pipeline, id) = setup(telecined(10), PulldownZone::default());
    let starts = pipeline
        .edit::<PulldownFilter, _>(id, |f| {
            assert!(f.zone_at_mut(0).set_offset(1).unwrap_err().is_configuration());
            f.zone_at_mut(0).set_blend(true, false)?;
            Ok(f.zone_starts())
        })
        .unwrap();
    assert_eq!(starts, vec![0]);
    assert!(PulldownZone::new("ABBA")
        .unwrap()
        .with_blend(true, false)
        .unwrap_err()
        .is_configuration());
}
