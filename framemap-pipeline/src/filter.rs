//! The filter abstraction and the built-in stages.

use crate::node::NodeRef;
use framemap_core::{Error, Frame, FrameBuffer, FrameIter, IndexMap, Result, StreamInfo, NO_FRAME};
use std::any::Any;
use std::collections::BTreeSet;
use std::ops::Range;

/// Forward and reverse index maps of one stage against its upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMaps {
    /// Upstream frame index → own frame index, or `NO_FRAME`.
    pub forward: IndexMap,
    /// Own frame index → upstream frame index. Total.
    pub reverse: IndexMap,
}

impl IndexMaps {
    /// One-to-one maps over `len` frames.
    pub fn identity(len: usize) -> Self {
        Self {
            forward: IndexMap::identity(len),
            reverse: IndexMap::identity(len),
        }
    }

    /// Build both maps from the reverse map.
    ///
    /// An upstream frame referenced by several own frames maps forward to
    /// the first of them.
    pub fn from_reverse(reverse: Vec<i64>, upstream_len: usize) -> Self {
        let mut forward = vec![NO_FRAME; upstream_len];
        for (m, &n) in reverse.iter().enumerate() {
            if n >= 0 && (n as usize) < upstream_len && forward[n as usize] == NO_FRAME {
                forward[n as usize] = m as i64;
            }
        }
        Self {
            forward: forward.into(),
            reverse: reverse.into(),
        }
    }

    /// Number of own frames.
    pub fn len(&self) -> usize {
        self.reverse.len()
    }

    /// Check if the stage outputs no frames.
    pub fn is_empty(&self) -> bool {
        self.reverse.is_empty()
    }

    /// `reverse[forward[n]] == n` wherever `forward[n]` is set.
    pub fn is_consistent(&self) -> bool {
        self.forward
            .iter()
            .enumerate()
            .all(|(n, &m)| m == NO_FRAME || self.reverse.get(m) == n as i64)
    }
}

/// Durations from consecutive pts differences. The last frame ends at
/// `end_pts`, or lasts zero ticks if `end_pts` is not after it.
pub fn durations_from_pts(pts: &[i64], end_pts: i64) -> Vec<i64> {
    let mut durations: Vec<i64> = pts.windows(2).map(|w| w[1] - w[0]).collect();
    if let Some(&last) = pts.last() {
        durations.push((end_pts - last).max(0));
    }
    durations
}

/// A pipeline stage.
///
/// Defaults describe a stage that keeps frame timing and order: identity
/// maps, upstream pts, per-frame [`transform`](Filter::transform). Stages
/// that drop frames override [`index_maps`](Filter::index_maps); stages
/// that create frames also override
/// [`process_frames`](Filter::process_frames).
pub trait Filter: Any + Send + Sync {
    /// Get filter name.
    fn name(&self) -> &str;

    /// Output stream metadata.
    fn info(&self, prev: &NodeRef<'_>) -> Result<StreamInfo> {
        prev.info()
    }

    /// Local index maps against `prev`.
    fn index_maps(&self, prev: &NodeRef<'_>) -> Result<IndexMaps> {
        Ok(IndexMaps::identity(prev.framecount()?))
    }

    /// Output pts, one per own frame.
    fn pts(&self, prev: &NodeRef<'_>, maps: &IndexMaps) -> Result<Vec<i64>> {
        let upstream = prev.pts()?;
        maps.reverse
            .iter()
            .map(|&n| {
                usize::try_from(n)
                    .ok()
                    .and_then(|n| upstream.get(n).copied())
                    .ok_or_else(|| {
                        Error::invalid_param(format!("reverse map points at missing frame {n}"))
                    })
            })
            .collect()
    }

    /// Output durations, one per own frame.
    fn durations(&self, prev: &NodeRef<'_>, maps: &IndexMaps, pts: &[i64]) -> Result<Vec<i64>> {
        if maps.forward.is_identity() && maps.forward.len() == maps.reverse.len() {
            return Ok(prev.durations()?.to_vec());
        }
        Ok(durations_from_pts(pts, prev.end_pts()?))
    }

    /// Upstream frames needed to produce own frames `start..end`.
    fn upstream_range(
        &self,
        prev: &NodeRef<'_>,
        maps: &IndexMaps,
        start: usize,
        end: usize,
    ) -> Result<Range<usize>> {
        let end = end.min(maps.reverse.len());
        let start = start.min(end);
        let wanted = maps.reverse[start..end].iter().filter(|&&n| n >= 0);
        let lo = wanted.clone().min().copied();
        let hi = wanted.max().copied();
        Ok(match (lo, hi) {
            (Some(lo), Some(hi)) => lo as usize..hi as usize + 1,
            _ => {
                let len = prev.framecount()?;
                len..len
            }
        })
    }

    /// Turn upstream frames into own frames.
    ///
    /// Incoming frames carry upstream indices; outgoing frames carry own
    /// indices with own pts and durations.
    fn process_frames<'a>(
        &'a self,
        node: NodeRef<'a>,
        frames: FrameIter<'a>,
    ) -> Result<FrameIter<'a>> {
        let forward = node.index_map()?;
        let pts = node.pts()?;
        let durations = node.durations()?;
        Ok(Box::new(frames.filter_map(move |res| {
            let frame = match res {
                Ok(frame) => frame,
                Err(e) => return Some(Err(e)),
            };
            let m = forward.lookup(frame.index)?;
            Some(self.transform(frame).map(|mut f| {
                f.index = m;
                f.pts = pts[m];
                f.duration = durations[m];
                f
            }))
        })))
    }

    /// Per-frame pixel transform.
    fn transform(&self, frame: Frame) -> Result<Frame> {
        Ok(frame)
    }

    /// Drop internal caches after an upstream change.
    fn reset_cache(&mut self) {}

    /// Upcast for typed access.
    fn as_any(&self) -> &dyn Any;

    /// Upcast for typed mutation.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Pass-through stage.
#[derive(Debug, Clone)]
pub struct NullFilter {
    name: String,
}

impl NullFilter {
    /// Create a pass-through stage.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for NullFilter {
    fn default() -> Self {
        Self::new("null")
    }
}

impl Filter for NullFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Nearest-neighbour resize. Keeps frame count and timing.
#[derive(Debug, Clone)]
pub struct ScaleFilter {
    name: String,
    target_width: u32,
    target_height: u32,
}

impl ScaleFilter {
    /// Create a new scale filter.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::config(format!("cannot scale to {}x{}", width, height)));
        }
        Ok(Self {
            name: format!("scale_{}x{}", width, height),
            target_width: width,
            target_height: height,
        })
    }

    /// Change the target size.
    pub fn set_size(&mut self, width: u32, height: u32) -> Result<()> {
        *self = Self::new(width, height)?;
        Ok(())
    }

    /// Target size.
    pub fn size(&self) -> (u32, u32) {
        (self.target_width, self.target_height)
    }
}

impl Filter for ScaleFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn info(&self, prev: &NodeRef<'_>) -> Result<StreamInfo> {
        let mut info = prev.info()?;
        info.width = self.target_width;
        info.height = self.target_height;
        Ok(info)
    }

    fn transform(&self, frame: Frame) -> Result<Frame> {
        if frame.width() == self.target_width && frame.height() == self.target_height {
            return Ok(frame);
        }

        let src = frame.buffer();
        let mut scaled = FrameBuffer::new(self.target_width, self.target_height, frame.format());

        for plane in 0..src.num_planes() {
            let (src_w, src_h) = src.plane_dimensions(plane);
            let (dst_w, dst_h) = scaled.plane_dimensions(plane);
            let (Some(src_data), Some(dst_data)) = (src.plane(plane), scaled.plane_mut(plane))
            else {
                continue;
            };
            for y in 0..dst_h {
                let sy = y * src_h / dst_h;
                for x in 0..dst_w {
                    let sx = x * src_w / dst_w;
                    dst_data[y * dst_w + x] = src_data[sy * src_w + sx];
                }
            }
        }

        Ok(frame.with_buffer(scaled))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Decimation: drops listed upstream frames and, optionally, every n-th.
#[derive(Debug, Clone)]
pub struct DropFilter {
    name: String,
    frames: BTreeSet<usize>,
    every: Option<(usize, usize)>,
}

impl DropFilter {
    /// Drop the given upstream frames.
    pub fn new(frames: impl IntoIterator<Item = usize>) -> Self {
        Self {
            name: "drop".to_string(),
            frames: frames.into_iter().collect(),
            every: None,
        }
    }

    /// Drop frames `phase, phase + n, phase + 2n, ...`.
    pub fn every(n: usize, phase: usize) -> Result<Self> {
        let mut filter = Self::new([]);
        filter.set_every(Some((n, phase)))?;
        Ok(filter)
    }

    /// Rename the stage.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set or clear the periodic drop.
    pub fn set_every(&mut self, every: Option<(usize, usize)>) -> Result<()> {
        if let Some((n, phase)) = every {
            if n < 2 || phase >= n {
                return Err(Error::config(format!(
                    "cannot drop every {} frames at phase {}",
                    n, phase
                )));
            }
        }
        self.every = every;
        Ok(())
    }

    /// Add a frame to the drop list.
    pub fn drop_frame(&mut self, n: usize) {
        self.frames.insert(n);
    }

    /// Remove a frame from the drop list.
    pub fn keep_frame(&mut self, n: usize) {
        self.frames.remove(&n);
    }

    /// Check whether upstream frame `n` is dropped.
    pub fn is_dropped(&self, n: usize) -> bool {
        self.frames.contains(&n) || self.every.is_some_and(|(every, phase)| n % every == phase)
    }
}

impl Filter for DropFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn index_maps(&self, prev: &NodeRef<'_>) -> Result<IndexMaps> {
        let len = prev.framecount()?;
        let kept = (0..len).filter(|&n| !self.is_dropped(n)).map(|n| n as i64).collect();
        Ok(IndexMaps::from_reverse(kept, len))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
