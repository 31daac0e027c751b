//! Scene zones: keyframe forcing and pts realignment.

use crate::stats::{SceneConfig, SceneStats};
use framemap_core::{Error, Frame, FrameFlags, Rational, Result, TimeBase};
use framemap_pipeline::{durations_from_pts, NodeRef};
use framemap_zones::{MappedProcessor, ZoneContext, ZoneKind, ZoneMaps, ZoneProcessor, ZonedFilter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, trace};

/// A zoned filter splitting a stream into scenes.
pub type SceneFilter = ZonedFilter<SceneZone>;

/// Grid nominal frame durations snap to: 1.001/120 s.
pub const SUBDIVISION_SECONDS: Rational = Rational {
    num: 1001,
    den: 120_000,
};

/// [`SUBDIVISION_SECONDS`] in ticks of `time_base`.
pub fn subdivision_ticks(time_base: TimeBase) -> Rational {
    time_base.seconds_to_ticks(SUBDIVISION_SECONDS)
}

/// Parameters of one scene.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneZone {
    /// Explicit start pts, overriding the corrected one.
    pub start_pts: Option<i64>,
    /// The zone is a transition (fade, dissolve) and never anchors the
    /// timing of later zones.
    pub transition: bool,
}

impl SceneZone {
    /// A plain scene.
    pub fn new() -> Self {
        Self::default()
    }

    /// A transition zone.
    pub fn transition() -> Self {
        Self {
            start_pts: None,
            transition: true,
        }
    }

    /// Pin the zone's start pts.
    pub fn with_start_pts(mut self, pts: i64) -> Self {
        self.start_pts = Some(pts);
        self
    }
}

/// Filter-wide scene state.
#[derive(Debug, Clone, Default)]
pub struct SceneShared {
    /// Correct pts drift at zone starts; otherwise zones only force
    /// keyframes.
    pub fixpts: bool,
    /// Content statistics, one row per upstream frame.
    pub stats: Option<SceneStats>,
}

/// Per-zone timing decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenePlan {
    /// Own pts of the zone's first frame.
    pub start_pts: i64,
    /// Mark the zone's first frame as a forced sync point.
    pub forced_sync: bool,
}

/// Where an already computed zone sits on the own timeline.
#[derive(Debug, Clone, Copy)]
struct Placement {
    start_pts: i64,
    last_pts: Option<i64>,
}

impl Placement {
    fn of(maps: &ZoneMaps<ScenePlan>) -> Self {
        Self {
            start_pts: maps.plan.start_pts,
            last_pts: maps.pts.last().copied(),
        }
    }
}

/// Median step between consecutive pts.
fn nominal_duration(pts: &[i64]) -> Option<i64> {
    let mut steps: Vec<i64> = pts.windows(2).map(|w| w[1] - w[0]).collect();
    steps.sort_unstable();
    steps.get(steps.len().saturating_sub(1) / 2).copied()
}

/// Corrected own pts of the first frame of zone `ordinal`. `placed`
/// locates any earlier zone.
fn corrected_start(
    filter: &SceneFilter,
    prev: &NodeRef<'_>,
    ordinal: usize,
    placed: &dyn Fn(usize) -> Result<Placement>,
) -> Result<i64> {
    let upstream = prev.pts()?;
    let src = filter.bounds(ordinal, upstream.len());
    let Some(&first) = upstream.get(src.start) else {
        return prev.end_pts();
    };
    let zone = filter.zones()[ordinal].kind();
    if ordinal == 0 {
        return Ok(zone.start_pts.unwrap_or(first));
    }
    let expected = match zone.start_pts {
        Some(pts) => pts,
        None => expected_start(filter, prev, ordinal, &upstream, placed)?,
    };
    // Stay after the previous zone's last frame.
    let previous = placed(ordinal - 1)?;
    let floor = previous
        .last_pts
        .map_or(previous.start_pts, |last| last + 1);
    Ok(expected.max(floor))
}

/// Start predicted from the latest anchor zone.
///
/// The anchor's median frame duration gives the nominal position of the
/// zone. Drift from that position smaller than half a subdivision is
/// removed; larger gaps are kept, snapped to the subdivision grid.
fn expected_start(
    filter: &SceneFilter,
    prev: &NodeRef<'_>,
    ordinal: usize,
    upstream: &[i64],
    placed: &dyn Fn(usize) -> Result<Placement>,
) -> Result<i64> {
    let zones = filter.zones();
    let anchor = (0..ordinal)
        .rev()
        .find(|&a| !zones[a].kind().transition)
        .unwrap_or(0);
    let anchor_src = filter.bounds(anchor, upstream.len());
    let start = filter.bounds(ordinal, upstream.len()).start;
    let anchor_start = placed(anchor)?.start_pts;
    let frames = (start - anchor_src.start) as i64;
    if frames == 0 {
        return Ok(anchor_start);
    }

    let observed = upstream[start] - upstream[anchor_src.start];
    let nominal = nominal_duration(&upstream[anchor_src.start..=anchor_src.end])
        .unwrap_or(observed / frames);
    let drift = observed - nominal * frames;
    let grid = subdivision_ticks(prev.time_base()?);
    let kept = grid
        .mul_int((Rational::from_int(drift) / grid).round())
        .round();
    let expected = anchor_start + nominal * frames + kept;
    trace!(
        ordinal,
        anchor,
        observed,
        nominal,
        drift,
        expected,
        "scene start"
    );
    Ok(expected)
}

/// Pull pts below `limit` so that every frame keeps at least one tick.
fn clamp_to_end(pts: &mut [i64], limit: i64) {
    let len = pts.len() as i64;
    for (n, p) in pts.iter_mut().enumerate() {
        *p = (*p).min(limit - (len - n as i64));
    }
}

impl ZoneKind for SceneZone {
    type Shared = SceneShared;
    type Plan = ScenePlan;

    fn compute(&self, ctx: &ZoneContext<'_, Self>) -> Result<ZoneMaps<ScenePlan>> {
        let upstream = ctx.upstream_pts()?;
        let end_pts = ctx.upstream_end_pts()?;
        let forced_sync = ctx.ordinal > 0 && !ctx.is_empty();

        let Some(&first) = upstream.first() else {
            let plan = ScenePlan {
                start_pts: end_pts,
                forced_sync,
            };
            return Ok(ZoneMaps::identity(Vec::new(), Vec::new(), plan));
        };
        if !ctx.shared().fixpts {
            let durations = durations_from_pts(&upstream, end_pts);
            let plan = ScenePlan {
                start_pts: first,
                forced_sync,
            };
            return Ok(ZoneMaps::identity(upstream, durations, plan));
        }

        let placed = |o: usize| ctx.zone_maps(o).map(|maps| Placement::of(&maps));
        let start = corrected_start(ctx.filter, &ctx.prev, ctx.ordinal, &placed)?;
        let shift = start - first;
        let mut pts: Vec<i64> = upstream.iter().map(|p| p + shift).collect();

        let framecount = ctx.prev.framecount()?;
        let limit = ctx.prev.end_pts()?;
        let end = if ctx.src.end >= framecount {
            // The stream keeps its overall duration.
            clamp_to_end(&mut pts, limit);
            limit
        } else {
            // End where the next zone starts.
            let own = Placement {
                start_pts: pts[0],
                last_pts: pts.last().copied(),
            };
            let placed_next = |o: usize| {
                if o == ctx.ordinal {
                    Ok(own)
                } else {
                    placed(o)
                }
            };
            let next = ctx.ordinal + 1;
            let mut next_start = corrected_start(ctx.filter, &ctx.prev, next, &placed_next)?;
            let next_src = ctx.filter.bounds(next, framecount);
            if next_src.end >= framecount {
                next_start = next_start.min(limit - next_src.len() as i64);
            }
            next_start.max(own.last_pts.unwrap_or(own.start_pts) + 1)
        };
        if shift != 0 {
            debug!(ordinal = ctx.ordinal, shift, "realigned scene pts");
        }
        let durations = durations_from_pts(&pts, end);
        let plan = ScenePlan {
            start_pts: pts[0],
            forced_sync,
        };
        Ok(ZoneMaps::identity(pts, durations, plan))
    }

    fn processor<'a>(
        &'a self,
        ctx: ZoneContext<'a, Self>,
        maps: Arc<ZoneMaps<ScenePlan>>,
    ) -> Result<Box<dyn ZoneProcessor + Send + 'a>> {
        Ok(Box::new(SceneProcessor {
            forced_sync: maps.plan.forced_sync,
            inner: MappedProcessor::new(ctx.src.start, maps),
        }))
    }
}

/// Passes frames through, flagging the zone's first frame.
struct SceneProcessor {
    forced_sync: bool,
    inner: MappedProcessor<ScenePlan>,
}

impl ZoneProcessor for SceneProcessor {
    fn push(&mut self, frame: Frame) -> Result<Vec<Frame>> {
        Ok(self
            .inner
            .map(frame)
            .map(|mut frame| {
                if self.forced_sync && frame.index == 0 {
                    frame.flags.insert(FrameFlags::FORCED_SYNC);
                }
                frame
            })
            .into_iter()
            .collect())
    }
}

/// Scene-specific operations on a [`SceneFilter`].
pub trait SceneFilterExt {
    /// Whether pts are corrected.
    fn fixpts(&self) -> bool;

    /// Enable or disable pts correction.
    fn set_fixpts(&mut self, fixpts: bool);

    /// Content statistics, if analysed.
    fn stats(&self) -> Option<&SceneStats>;

    /// Replace the content statistics.
    fn set_stats(&mut self, stats: Option<SceneStats>);

    /// Insert a zone at every detected cut that does not already start
    /// one. Returns the frames where zones were inserted.
    fn apply_boundaries(&mut self, config: &SceneConfig) -> Result<Vec<usize>>;
}

impl SceneFilterExt for SceneFilter {
    fn fixpts(&self) -> bool {
        self.shared().fixpts
    }

    fn set_fixpts(&mut self, fixpts: bool) {
        if self.shared().fixpts != fixpts {
            self.shared_mut().fixpts = fixpts;
        }
    }

    fn stats(&self) -> Option<&SceneStats> {
        self.shared().stats.as_ref()
    }

    fn set_stats(&mut self, stats: Option<SceneStats>) {
        self.shared_mut().stats = stats;
    }

    fn apply_boundaries(&mut self, config: &SceneConfig) -> Result<Vec<usize>> {
        let cuts = self
            .stats()
            .ok_or_else(|| Error::config("no scene statistics to detect cuts from"))?
            .boundaries(config);
        let starts = self.zone_starts();
        let mut inserted = Vec::new();
        for n in cuts {
            if starts.binary_search(&n).is_err() {
                self.insert_zone_with(n, SceneZone::new())?;
                inserted.push(n);
            }
        }
        debug!(zones = inserted.len(), "inserted scene zones at cuts");
        Ok(inserted)
    }
}
