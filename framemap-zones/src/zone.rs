//! Zone kinds, per-zone index maps and frame processors.

use crate::filter::ZonedFilter;
use framemap_core::{Frame, Result, NO_FRAME};
use framemap_pipeline::NodeRef;
use parking_lot::Mutex;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

/// Behaviour of one family of zones.
///
/// A zone sees the upstream frames `src` of its [`ZoneContext`] and
/// produces a contiguous run of own frames. Everything a zone computes is
/// local: index 0 is the zone's first upstream frame and its first own
/// frame.
pub trait ZoneKind: Clone + fmt::Debug + Send + Sync + 'static {
    /// State owned by the filter and shared by every zone.
    type Shared: fmt::Debug + Send + Sync + 'static;

    /// Extra per-zone data computed together with the maps.
    type Plan: fmt::Debug + Send + Sync + 'static;

    /// Check the zone's parameters.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Parameters of a zone split off this one `at` frames into it, so
    /// that the frames after the split keep their behaviour.
    fn split(&self, _at: usize) -> Self {
        self.clone()
    }

    /// Compute the zone's local maps and timing.
    fn compute(&self, ctx: &ZoneContext<'_, Self>) -> Result<ZoneMaps<Self::Plan>>;

    /// Absolute upstream frames needed for local own frames `start..end`.
    fn upstream_range(
        &self,
        ctx: &ZoneContext<'_, Self>,
        maps: &ZoneMaps<Self::Plan>,
        start: usize,
        end: usize,
    ) -> Range<usize> {
        let end = end.min(maps.len());
        let wanted = maps.reverse[start.min(end)..end].iter().filter(|&&n| n >= 0);
        match (wanted.clone().min(), wanted.max()) {
            (Some(&lo), Some(&hi)) => ctx.src.start + lo as usize..ctx.src.start + hi as usize + 1,
            _ => ctx.src.end..ctx.src.end,
        }
    }

    /// Frame processor for one pass over this zone.
    fn processor<'a>(
        &'a self,
        ctx: ZoneContext<'a, Self>,
        maps: Arc<ZoneMaps<Self::Plan>>,
    ) -> Result<Box<dyn ZoneProcessor + Send + 'a>>;
}

/// Turns a zone's upstream frames into its own frames.
pub trait ZoneProcessor {
    /// Feed the next upstream frame (absolute upstream index). Returns the
    /// own frames completed by it, with local indices.
    fn push(&mut self, frame: Frame) -> Result<Vec<Frame>>;

    /// Emit frames still buffered at the end of the zone.
    fn flush(&mut self) -> Result<Vec<Frame>> {
        Ok(Vec::new())
    }
}

/// Local maps and timing of one zone.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneMaps<P> {
    /// Local upstream index → local own index, or `NO_FRAME`.
    pub forward: Vec<i64>,
    /// Local own index → local upstream index.
    pub reverse: Vec<i64>,
    /// Own pts in ticks.
    pub pts: Vec<i64>,
    /// Own durations in ticks.
    pub durations: Vec<i64>,
    /// Kind-specific data.
    pub plan: P,
}

impl<P> ZoneMaps<P> {
    /// One own frame per upstream frame.
    pub fn identity(pts: Vec<i64>, durations: Vec<i64>, plan: P) -> Self {
        let len = pts.len() as i64;
        Self {
            forward: (0..len).collect(),
            reverse: (0..len).collect(),
            pts,
            durations,
            plan,
        }
    }

    /// Number of own frames.
    pub fn len(&self) -> usize {
        self.reverse.len()
    }

    /// Check if the zone produces no frames.
    pub fn is_empty(&self) -> bool {
        self.reverse.is_empty()
    }

    /// `reverse[forward[n]] == n` wherever `forward[n]` is set.
    pub fn is_consistent(&self) -> bool {
        self.forward.iter().enumerate().all(|(n, &m)| {
            m == NO_FRAME || self.reverse.get(m as usize).copied() == Some(n as i64)
        }) && self.pts.len() == self.reverse.len()
            && self.durations.len() == self.reverse.len()
    }
}

/// A zone: its first upstream frame, parameters and cached maps.
pub struct Zone<K: ZoneKind> {
    pub(crate) src_start: usize,
    pub(crate) kind: K,
    pub(crate) cache: Mutex<Option<Arc<ZoneMaps<K::Plan>>>>,
}

impl<K: ZoneKind> Zone<K> {
    pub(crate) fn new(src_start: usize, kind: K) -> Self {
        Self {
            src_start,
            kind,
            cache: Mutex::new(None),
        }
    }

    /// First upstream frame owned by this zone.
    pub fn src_start(&self) -> usize {
        self.src_start
    }

    /// Zone parameters.
    pub fn kind(&self) -> &K {
        &self.kind
    }

    /// Check whether the maps are currently cached.
    pub fn is_cached(&self) -> bool {
        self.cache.lock().is_some()
    }

    pub(crate) fn invalidate(&self) {
        *self.cache.lock() = None;
    }
}

impl<K: ZoneKind> Clone for Zone<K> {
    fn clone(&self) -> Self {
        Self {
            src_start: self.src_start,
            kind: self.kind.clone(),
            cache: Mutex::new(self.cache.lock().clone()),
        }
    }
}

impl<K: ZoneKind> fmt::Debug for Zone<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Zone")
            .field("src_start", &self.src_start)
            .field("kind", &self.kind)
            .field("cached", &self.is_cached())
            .finish()
    }
}

/// Everything a zone needs to compute its maps or process frames.
pub struct ZoneContext<'a, K: ZoneKind> {
    /// Owning filter.
    pub filter: &'a ZonedFilter<K>,
    /// Upstream node of the filter.
    pub prev: NodeRef<'a>,
    /// Position of the zone in the filter.
    pub ordinal: usize,
    /// Absolute upstream frames owned by the zone.
    pub src: Range<usize>,
}

impl<K: ZoneKind> Clone for ZoneContext<'_, K> {
    fn clone(&self) -> Self {
        Self {
            filter: self.filter,
            prev: self.prev,
            ordinal: self.ordinal,
            src: self.src.clone(),
        }
    }
}

impl<'a, K: ZoneKind> ZoneContext<'a, K> {
    /// Filter-wide shared state.
    pub fn shared(&self) -> &'a K::Shared {
        self.filter.shared()
    }

    /// The zone itself.
    pub fn zone(&self) -> &'a Zone<K> {
        &self.filter.zones()[self.ordinal]
    }

    /// Number of upstream frames in the zone.
    pub fn len(&self) -> usize {
        self.src.len()
    }

    /// Check if the zone owns no upstream frames.
    pub fn is_empty(&self) -> bool {
        self.src.is_empty()
    }

    /// Check if this is the last zone of the filter.
    pub fn is_last(&self) -> bool {
        self.ordinal + 1 == self.filter.len()
    }

    /// Upstream pts of the zone's frames.
    pub fn upstream_pts(&self) -> Result<Vec<i64>> {
        Ok(self.prev.pts()?[self.src.clone()].to_vec())
    }

    /// Upstream pts where the zone ends: the next zone's first pts, or the
    /// end of the stream.
    pub fn upstream_end_pts(&self) -> Result<i64> {
        let pts = self.prev.pts()?;
        match pts.get(self.src.end) {
            Some(&p) => Ok(p),
            None => self.prev.end_pts(),
        }
    }

    /// Maps of another zone of the same filter.
    pub fn zone_maps(&self, ordinal: usize) -> Result<Arc<ZoneMaps<K::Plan>>> {
        self.filter.zone_maps(ordinal, &self.prev)
    }
}

/// Processor for zones whose own frames are upstream frames kept in
/// order: re-stamps index, pts and duration and drops unmapped frames.
pub struct MappedProcessor<P> {
    src_start: usize,
    maps: Arc<ZoneMaps<P>>,
}

impl<P> MappedProcessor<P> {
    /// Create a processor for a zone starting at upstream frame `src_start`.
    pub fn new(src_start: usize, maps: Arc<ZoneMaps<P>>) -> Self {
        Self { src_start, maps }
    }

    /// Re-stamp one frame, `None` if the zone drops it.
    pub fn map(&self, mut frame: Frame) -> Option<Frame> {
        let local = frame.index.checked_sub(self.src_start)?;
        let m = *self.maps.forward.get(local)?;
        if m == NO_FRAME {
            return None;
        }
        let m = m as usize;
        frame.index = m;
        frame.pts = self.maps.pts[m];
        frame.duration = self.maps.durations[m];
        Some(frame)
    }
}

impl<P> ZoneProcessor for MappedProcessor<P> {
    fn push(&mut self, frame: Frame) -> Result<Vec<Frame>> {
        Ok(self.map(frame).into_iter().collect())
    }
}
