//! Filters whose behaviour is partitioned into zones.

use crate::zone::{Zone, ZoneContext, ZoneKind, ZoneMaps, ZoneProcessor};
use framemap_core::{Error, Frame, FrameIter, Result, NO_FRAME};
use framemap_pipeline::{Filter, IndexMaps, NodeRef};
use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut, Range};
use std::sync::Arc;
use tracing::{debug, trace};

/// A filter whose upstream frames are partitioned into contiguous zones,
/// each with its own parameters and its own cached maps.
///
/// Zone 0 always starts at upstream frame 0; zone `i` owns upstream
/// frames from its `src_start` up to the next zone's `src_start` (or the
/// end of the stream). Editing a zone invalidates that zone and every
/// later one; earlier zones keep their caches.
pub struct ZonedFilter<K: ZoneKind> {
    name: String,
    zones: Vec<Zone<K>>,
    shared: K::Shared,
}

impl<K: ZoneKind> ZonedFilter<K> {
    /// Create a filter with a single zone covering the whole stream.
    pub fn new(name: impl Into<String>, initial: K, shared: K::Shared) -> Result<Self> {
        initial.validate()?;
        Ok(Self {
            name: name.into(),
            zones: vec![Zone::new(0, initial)],
            shared,
        })
    }

    /// Zones in upstream order.
    pub fn zones(&self) -> &[Zone<K>] {
        &self.zones
    }

    /// Number of zones.
    pub fn len(&self) -> usize {
        self.zones.len()
    }

    /// Always false: a zoned filter has at least one zone.
    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// First upstream frame of every zone.
    pub fn zone_starts(&self) -> Vec<usize> {
        self.zones.iter().map(|z| z.src_start).collect()
    }

    /// Zone containing upstream frame `n`, with its ordinal.
    pub fn zone_at(&self, n: usize) -> (usize, &Zone<K>) {
        let ordinal = self.ordinal_at(n);
        (ordinal, &self.zones[ordinal])
    }

    fn ordinal_at(&self, n: usize) -> usize {
        // Zone 0 starts at 0, so the partition point is at least 1.
        self.zones.partition_point(|z| z.src_start <= n).saturating_sub(1)
    }

    /// Mutable access to the parameters of the zone containing `n`.
    ///
    /// The zone and every later zone are invalidated when the guard drops.
    pub fn zone_at_mut(&mut self, n: usize) -> ZoneMut<'_, K> {
        let ordinal = self.ordinal_at(n);
        ZoneMut {
            filter: self,
            ordinal,
        }
    }

    /// Split the zone containing `n` at `n`, continuing its parameters
    /// through [`ZoneKind::split`].
    pub fn insert_zone_at(&mut self, n: usize) -> Result<usize> {
        let (_, zone) = self.zone_at(n);
        let kind = zone.kind.split(n.saturating_sub(zone.src_start));
        self.insert_zone_with(n, kind)
    }

    /// Split the zone containing `n` at `n`, with new parameters.
    ///
    /// Returns the ordinal of the new zone.
    pub fn insert_zone_with(&mut self, n: usize, kind: K) -> Result<usize> {
        if n == 0 {
            return Err(Error::config("cannot insert a zone at frame 0"));
        }
        let (ordinal, zone) = self.zone_at(n);
        if zone.src_start == n {
            return Err(Error::config(format!("a zone already starts at frame {}", n)));
        }
        kind.validate()?;
        let ordinal = ordinal + 1;
        self.zones.insert(ordinal, Zone::new(n, kind));
        self.invalidate_from(ordinal - 1);
        debug!(filter = %self.name, at = n, ordinal, "inserted zone");
        Ok(ordinal)
    }

    /// Merge the zone starting at `n` into its predecessor.
    pub fn remove_zone_at(&mut self, n: usize) -> Result<K> {
        let (ordinal, zone) = self.zone_at(n);
        if zone.src_start != n || ordinal == 0 {
            return Err(Error::config(format!("no removable zone starts at frame {}", n)));
        }
        let removed = self.zones.remove(ordinal);
        self.invalidate_from(ordinal - 1);
        debug!(filter = %self.name, at = n, ordinal, "removed zone");
        Ok(removed.kind)
    }

    /// Replace the parameters of the zone containing `n`, returning the
    /// old ones.
    pub fn replace_zone(&mut self, n: usize, kind: K) -> Result<K> {
        kind.validate()?;
        let mut zone = self.zone_at_mut(n);
        Ok(std::mem::replace(&mut *zone, kind))
    }

    /// Drop cached maps of zone `ordinal` and every later zone.
    pub fn invalidate_from(&self, ordinal: usize) {
        for zone in self.zones.iter().skip(ordinal) {
            zone.invalidate();
        }
    }

    /// Filter-wide shared state.
    pub fn shared(&self) -> &K::Shared {
        &self.shared
    }

    /// Mutable shared state. Invalidates every zone.
    pub fn shared_mut(&mut self) -> &mut K::Shared {
        self.invalidate_from(0);
        &mut self.shared
    }

    /// Upstream frames owned by zone `ordinal`, for a stream of
    /// `framecount` frames.
    pub fn bounds(&self, ordinal: usize, framecount: usize) -> Range<usize> {
        let start = self.zones[ordinal].src_start.min(framecount);
        let end = self
            .zones
            .get(ordinal + 1)
            .map_or(framecount, |z| z.src_start.min(framecount));
        start..end
    }

    /// Context for zone `ordinal` over `prev`.
    pub fn context<'a>(&'a self, ordinal: usize, prev: &NodeRef<'a>) -> Result<ZoneContext<'a, K>> {
        if ordinal >= self.zones.len() {
            return Err(Error::invalid_param(format!("no zone {}", ordinal)));
        }
        Ok(ZoneContext {
            filter: self,
            prev: *prev,
            ordinal,
            src: self.bounds(ordinal, prev.framecount()?),
        })
    }

    /// Maps of zone `ordinal`, computed on first access.
    pub fn zone_maps(&self, ordinal: usize, prev: &NodeRef<'_>) -> Result<Arc<ZoneMaps<K::Plan>>> {
        let ctx = self.context(ordinal, prev)?;
        let zone = ctx.zone();
        if let Some(maps) = zone.cache.lock().clone() {
            return Ok(maps);
        }
        trace!(filter = %self.name, ordinal, src = ?ctx.src, "computing zone maps");
        let maps = Arc::new(zone.kind.compute(&ctx)?);
        debug_assert!(maps.is_consistent());
        *zone.cache.lock() = Some(maps.clone());
        Ok(maps)
    }

    /// First own frame of every zone.
    pub fn own_offsets(&self, prev: &NodeRef<'_>) -> Result<Vec<usize>> {
        let mut offsets = Vec::with_capacity(self.zones.len());
        let mut total = 0;
        for ordinal in 0..self.zones.len() {
            offsets.push(total);
            total += self.zone_maps(ordinal, prev)?.len();
        }
        Ok(offsets)
    }
}

impl<K: ZoneKind> Clone for ZonedFilter<K>
where
    K::Shared: Clone,
{
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            zones: self.zones.clone(),
            shared: self.shared.clone(),
        }
    }
}

impl<K: ZoneKind> fmt::Debug for ZonedFilter<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZonedFilter")
            .field("name", &self.name)
            .field("zones", &self.zones)
            .field("shared", &self.shared)
            .finish()
    }
}

/// Mutable borrow of one zone's parameters.
pub struct ZoneMut<'a, K: ZoneKind> {
    filter: &'a mut ZonedFilter<K>,
    ordinal: usize,
}

impl<K: ZoneKind> ZoneMut<'_, K> {
    /// Position of the zone.
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// First upstream frame of the zone.
    pub fn src_start(&self) -> usize {
        self.filter.zones[self.ordinal].src_start
    }
}

impl<K: ZoneKind> Deref for ZoneMut<'_, K> {
    type Target = K;

    fn deref(&self) -> &K {
        &self.filter.zones[self.ordinal].kind
    }
}

impl<K: ZoneKind> DerefMut for ZoneMut<'_, K> {
    fn deref_mut(&mut self) -> &mut K {
        &mut self.filter.zones[self.ordinal].kind
    }
}

impl<K: ZoneKind> Drop for ZoneMut<'_, K> {
    fn drop(&mut self) {
        self.filter.invalidate_from(self.ordinal);
    }
}

impl<K: ZoneKind> Filter for ZonedFilter<K> {
    fn name(&self) -> &str {
        &self.name
    }

    fn index_maps(&self, prev: &NodeRef<'_>) -> Result<IndexMaps> {
        let framecount = prev.framecount()?;
        let mut forward = Vec::with_capacity(framecount);
        let mut reverse = Vec::with_capacity(framecount);
        for ordinal in 0..self.zones.len() {
            let maps = self.zone_maps(ordinal, prev)?;
            let src_start = self.bounds(ordinal, framecount).start as i64;
            let offset = reverse.len() as i64;
            forward.extend(
                maps.forward
                    .iter()
                    .map(|&m| if m == NO_FRAME { NO_FRAME } else { m + offset }),
            );
            reverse.extend(maps.reverse.iter().map(|&n| n + src_start));
        }
        Ok(IndexMaps {
            forward: forward.into(),
            reverse: reverse.into(),
        })
    }

    fn pts(&self, prev: &NodeRef<'_>, _maps: &IndexMaps) -> Result<Vec<i64>> {
        let mut pts = Vec::new();
        for ordinal in 0..self.zones.len() {
            pts.extend_from_slice(&self.zone_maps(ordinal, prev)?.pts);
        }
        Ok(pts)
    }

    fn durations(&self, prev: &NodeRef<'_>, _maps: &IndexMaps, _pts: &[i64]) -> Result<Vec<i64>> {
        let mut durations = Vec::new();
        for ordinal in 0..self.zones.len() {
            durations.extend_from_slice(&self.zone_maps(ordinal, prev)?.durations);
        }
        Ok(durations)
    }

    fn upstream_range(
        &self,
        prev: &NodeRef<'_>,
        _maps: &IndexMaps,
        start: usize,
        end: usize,
    ) -> Result<Range<usize>> {
        let offsets = self.own_offsets(prev)?;
        let mut range: Option<Range<usize>> = None;
        for (ordinal, &offset) in offsets.iter().enumerate() {
            let maps = self.zone_maps(ordinal, prev)?;
            let zone_end = offset + maps.len();
            if zone_end <= start || offset >= end || maps.is_empty() {
                continue;
            }
            let ctx = self.context(ordinal, prev)?;
            let local = ctx.zone().kind.upstream_range(
                &ctx,
                &maps,
                start.saturating_sub(offset),
                end.min(zone_end) - offset,
            );
            range = Some(match range {
                Some(r) => r.start.min(local.start)..r.end.max(local.end),
                None => local,
            });
        }
        let framecount = prev.framecount()?;
        Ok(range.unwrap_or(framecount..framecount))
    }

    fn process_frames<'a>(
        &'a self,
        node: NodeRef<'a>,
        frames: FrameIter<'a>,
    ) -> Result<FrameIter<'a>> {
        let prev = node.prev()?;
        let offsets = self.own_offsets(&prev)?;
        Ok(Box::new(ZonedFrames {
            filter: self,
            prev,
            offsets,
            frames,
            current: None,
            pending: VecDeque::new(),
            done: false,
        }))
    }

    fn reset_cache(&mut self) {
        self.invalidate_from(0);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Dispatches upstream frames to the processor of the zone owning them.
struct ZonedFrames<'a, K: ZoneKind> {
    filter: &'a ZonedFilter<K>,
    prev: NodeRef<'a>,
    offsets: Vec<usize>,
    frames: FrameIter<'a>,
    current: Option<(usize, Box<dyn ZoneProcessor + Send + 'a>)>,
    pending: VecDeque<Result<Frame>>,
    done: bool,
}

impl<'a, K: ZoneKind> ZonedFrames<'a, K> {
    fn emit(&mut self, ordinal: usize, frames: Result<Vec<Frame>>) {
        let offset = self.offsets[ordinal];
        match frames {
            Ok(frames) => self.pending.extend(frames.into_iter().map(|mut f| {
                f.index += offset;
                Ok(f)
            })),
            Err(e) => self.pending.push_back(Err(e)),
        }
    }

    fn flush_current(&mut self) {
        if let Some((ordinal, mut processor)) = self.current.take() {
            let flushed = processor.flush();
            self.emit(ordinal, flushed);
        }
    }

    fn open(&mut self, ordinal: usize) -> Result<()> {
        let filter = self.filter;
        let ctx = filter.context(ordinal, &self.prev)?;
        let maps = filter.zone_maps(ordinal, &self.prev)?;
        let zone: &'a Zone<K> = &filter.zones[ordinal];
        self.current = Some((ordinal, zone.kind.processor(ctx, maps)?));
        Ok(())
    }

    fn feed(&mut self, frame: Frame) {
        let ordinal = self.filter.ordinal_at(frame.index);
        if self.current.as_ref().map(|(o, _)| *o) != Some(ordinal) {
            self.flush_current();
            if let Err(e) = self.open(ordinal) {
                self.pending.push_back(Err(e));
                return;
            }
        }
        if let Some((_, processor)) = self.current.as_mut() {
            let out = processor.push(frame);
            self.emit(ordinal, out);
        }
    }
}

impl<K: ZoneKind> Iterator for ZonedFrames<'_, K> {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Result<Frame>> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Some(frame);
            }
            if self.done {
                return None;
            }
            match self.frames.next() {
                Some(Ok(frame)) => self.feed(frame),
                Some(Err(e)) => return Some(Err(e)),
                None => {
                    self.done = true;
                    self.flush_current();
                }
            }
        }
    }
}
