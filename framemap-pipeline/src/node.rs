//! Pipeline nodes and their lazily cached derived properties.

use crate::filter::{durations_from_pts, Filter, IndexMaps};
use crate::pipeline::Pipeline;
use framemap_core::{
    Error, FrameIter, FrameSource, IndexMap, Position, Result, StreamInfo, TimeBase,
};
use parking_lot::Mutex;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;
use tracing::trace;

/// Handle of a node inside its owning [`Pipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Get the raw slot index.
    pub fn raw(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({})", self.0)
    }
}

/// What a node does with its upstream.
pub(crate) enum NodeKind {
    Source(Box<dyn FrameSource>),
    Filter(Box<dyn Filter>),
    Chain(Vec<NodeId>),
}

impl NodeKind {
    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            NodeKind::Source(_) => "source",
            NodeKind::Filter(_) => "filter",
            NodeKind::Chain(_) => "chain",
        }
    }
}

/// Derived values, computed on first access and dropped on invalidation.
#[derive(Default)]
pub(crate) struct NodeCache {
    info: Option<StreamInfo>,
    maps: Option<IndexMaps>,
    pts: Option<Arc<[i64]>>,
    durations: Option<Arc<[i64]>>,
    cumulative: Option<IndexMap>,
    cumulative_reverse: Option<IndexMap>,
}

pub(crate) struct NodeEntry {
    pub(crate) name: String,
    pub(crate) kind: NodeKind,
    /// Upstream node. `None` only for sources.
    pub(crate) prev: Option<NodeId>,
    /// Nodes whose `prev` is this node.
    pub(crate) next: Vec<NodeId>,
    /// Chain owning this node, if any.
    pub(crate) parent: Option<NodeId>,
    pub(crate) cache: Mutex<NodeCache>,
}

impl NodeEntry {
    pub(crate) fn new(name: String, kind: NodeKind, prev: Option<NodeId>) -> Self {
        Self {
            name,
            kind,
            prev,
            next: Vec::new(),
            parent: None,
            cache: Mutex::new(NodeCache::default()),
        }
    }

    pub(crate) fn clear_cache(&self) {
        *self.cache.lock() = NodeCache::default();
    }
}

/// Read-only view of one node, exposing its derived properties.
///
/// Every getter computes lazily and caches the result in the node until
/// the next invalidation. Chains delegate to their last element, or to
/// their own upstream when empty.
#[derive(Clone, Copy)]
pub struct NodeRef<'a> {
    pipeline: &'a Pipeline,
    id: NodeId,
    entry: &'a NodeEntry,
}

impl<'a> NodeRef<'a> {
    pub(crate) fn new(pipeline: &'a Pipeline, id: NodeId, entry: &'a NodeEntry) -> Self {
        Self {
            pipeline,
            id,
            entry,
        }
    }

    /// Node id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Node name.
    pub fn name(&self) -> &'a str {
        &self.entry.name
    }

    /// Owning pipeline.
    pub fn pipeline(&self) -> &'a Pipeline {
        self.pipeline
    }

    /// Check if this node is a chain.
    pub fn is_chain(&self) -> bool {
        matches!(self.entry.kind, NodeKind::Chain(_))
    }

    /// Filter object of a filter node.
    pub fn filter(&self) -> Option<&'a dyn Filter> {
        match &self.entry.kind {
            NodeKind::Filter(f) => Some(f.as_ref()),
            _ => None,
        }
    }

    /// Upstream node.
    pub fn prev(&self) -> Result<NodeRef<'a>> {
        let prev = self
            .entry
            .prev
            .ok_or_else(|| Error::InvalidConnection(format!("{} has no upstream", self.id)))?;
        self.pipeline.node(prev)
    }

    /// The node whose output this node exposes: itself, or for a chain its
    /// last element (its upstream when empty).
    pub fn effective(&self) -> Result<NodeRef<'a>> {
        match &self.entry.kind {
            NodeKind::Chain(elements) => match elements.last() {
                Some(&last) => self.pipeline.node(last)?.effective(),
                None => self.prev()?.effective(),
            },
            _ => Ok(*self),
        }
    }

    fn cached<T: Clone>(
        &self,
        what: &'static str,
        slot: fn(&mut NodeCache) -> &mut Option<T>,
        compute: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        if let Some(value) = slot(&mut self.entry.cache.lock()).clone() {
            return Ok(value);
        }
        trace!(node = %self.id, name = %self.entry.name, what, "computing");
        // Computed without holding the lock: filters read their own node
        // and upstream nodes while computing.
        let value = compute()?;
        *slot(&mut self.entry.cache.lock()) = Some(value.clone());
        Ok(value)
    }

    /// Stream metadata.
    pub fn info(&self) -> Result<StreamInfo> {
        match &self.entry.kind {
            NodeKind::Source(source) => Ok(source.info()),
            NodeKind::Chain(_) => self.effective()?.info(),
            NodeKind::Filter(filter) => {
                self.cached("info", |c| &mut c.info, || filter.info(&self.prev()?))
            }
        }
    }

    /// Frame width.
    pub fn width(&self) -> Result<u32> {
        Ok(self.info()?.width)
    }

    /// Frame height.
    pub fn height(&self) -> Result<u32> {
        Ok(self.info()?.height)
    }

    /// Time base of pts and durations.
    pub fn time_base(&self) -> Result<TimeBase> {
        Ok(self.info()?.time_base)
    }

    /// Local forward and reverse index maps against the upstream node.
    pub fn index_maps(&self) -> Result<IndexMaps> {
        match &self.entry.kind {
            NodeKind::Source(source) => self.cached("index maps", |c| &mut c.maps, || {
                Ok(IndexMaps::identity(source.framecount()))
            }),
            NodeKind::Chain(elements) if elements.is_empty() => self.prev()?.index_maps(),
            NodeKind::Chain(_) => self.effective()?.index_maps(),
            NodeKind::Filter(filter) => self.cached("index maps", |c| &mut c.maps, || {
                let maps = filter.index_maps(&self.prev()?)?;
                debug_assert!(maps.is_consistent());
                Ok(maps)
            }),
        }
    }

    /// Upstream frame index → own frame index, `NO_FRAME` for dropped frames.
    pub fn index_map(&self) -> Result<IndexMap> {
        Ok(self.index_maps()?.forward)
    }

    /// Own frame index → upstream frame index.
    pub fn reverse_index_map(&self) -> Result<IndexMap> {
        Ok(self.index_maps()?.reverse)
    }

    /// Number of output frames.
    pub fn framecount(&self) -> Result<usize> {
        match &self.entry.kind {
            NodeKind::Source(source) => Ok(source.framecount()),
            _ => Ok(self.effective()?.index_maps()?.reverse.len()),
        }
    }

    /// Presentation timestamps of the output frames.
    pub fn pts(&self) -> Result<Arc<[i64]>> {
        match &self.entry.kind {
            NodeKind::Source(source) => {
                self.cached("pts", |c| &mut c.pts, || Ok(Arc::from(source.pts())))
            }
            NodeKind::Chain(_) => self.effective()?.pts(),
            NodeKind::Filter(filter) => self.cached("pts", |c| &mut c.pts, || {
                let maps = self.index_maps()?;
                Ok(Arc::from(filter.pts(&self.prev()?, &maps)?))
            }),
        }
    }

    /// Durations of the output frames.
    pub fn durations(&self) -> Result<Arc<[i64]>> {
        match &self.entry.kind {
            NodeKind::Source(source) => {
                self.cached("durations", |c| &mut c.durations, || {
                    Ok(Arc::from(source.durations()))
                })
            }
            NodeKind::Chain(_) => self.effective()?.durations(),
            NodeKind::Filter(filter) => self.cached("durations", |c| &mut c.durations, || {
                let maps = self.index_maps()?;
                let pts = self.pts()?;
                Ok(Arc::from(filter.durations(&self.prev()?, &maps, &pts)?))
            }),
        }
    }

    /// End of the last frame, in ticks. Zero for an empty stream.
    pub fn end_pts(&self) -> Result<i64> {
        let pts = self.pts()?;
        let durations = self.durations()?;
        Ok(match (pts.last(), durations.last()) {
            (Some(p), Some(d)) => p + d,
            _ => 0,
        })
    }

    /// Total duration in ticks, from the first frame's pts to the end.
    pub fn duration(&self) -> Result<i64> {
        let pts = self.pts()?;
        match pts.first() {
            Some(&first) => Ok(self.end_pts()? - first),
            None => Ok(0),
        }
    }

    /// Root source frame index → own frame index.
    pub fn cumulative_index_map(&self) -> Result<IndexMap> {
        match &self.entry.kind {
            NodeKind::Source(source) => Ok(IndexMap::identity(source.framecount())),
            NodeKind::Chain(_) => self.effective()?.cumulative_index_map(),
            NodeKind::Filter(_) => self.cached("cumulative map", |c| &mut c.cumulative, || {
                let upstream = self.prev()?.cumulative_index_map()?;
                Ok(self.index_maps()?.forward.compose(&upstream))
            }),
        }
    }

    /// Own frame index → root source frame index.
    pub fn cumulative_index_reverse_map(&self) -> Result<IndexMap> {
        match &self.entry.kind {
            NodeKind::Source(source) => Ok(IndexMap::identity(source.framecount())),
            NodeKind::Chain(_) => self.effective()?.cumulative_index_reverse_map(),
            NodeKind::Filter(_) => {
                self.cached("cumulative reverse map", |c| &mut c.cumulative_reverse, || {
                    let upstream = self.prev()?.cumulative_index_reverse_map()?;
                    Ok(upstream.compose(&self.index_maps()?.reverse))
                })
            }
        }
    }

    /// Lazily iterate output frames between two positions.
    ///
    /// `None` bounds mean the start and the end of the stream.
    pub fn iter_frames(
        &self,
        start: Option<Position>,
        end: Option<Position>,
    ) -> Result<FrameIter<'a>> {
        let pts = self.pts()?;
        let time_base = self.time_base()?;
        let start = start.map_or(0, |p| p.resolve(&pts, time_base));
        let end = end.map_or(pts.len(), |p| p.resolve(&pts, time_base));
        self.iter_range(start, end)
    }

    /// Lazily iterate output frames `start..end` by frame number.
    pub fn iter_range(&self, start: usize, end: usize) -> Result<FrameIter<'a>> {
        match &self.entry.kind {
            NodeKind::Source(source) => Ok(source.iter_frames(start, end)),
            NodeKind::Chain(_) => self.effective()?.iter_range(start, end),
            NodeKind::Filter(filter) => {
                let end = end.min(self.framecount()?);
                if start >= end {
                    return Ok(Box::new(std::iter::empty()));
                }
                let prev = self.prev()?;
                let maps = self.index_maps()?;
                let Range {
                    start: up_start,
                    end: up_end,
                } = filter.upstream_range(&prev, &maps, start, end)?;
                trace!(
                    node = %self.id,
                    start,
                    end,
                    up_start,
                    up_end,
                    "translated frame range"
                );
                let frames = prev.iter_range(up_start, up_end)?;
                let frames = filter.process_frames(*self, frames)?;
                Ok(Box::new(
                    frames
                        .filter(move |r| r.as_ref().map_or(true, |f| f.index >= start))
                        .take_while(move |r| r.as_ref().map_or(true, |f| f.index < end)),
                ))
            }
        }
    }

    /// Durations computed from this node's pts, the last frame ending at
    /// the upstream end.
    pub fn durations_from_pts(&self, pts: &[i64]) -> Result<Vec<i64>> {
        Ok(durations_from_pts(pts, self.prev()?.end_pts()?))
    }
}

impl fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("id", &self.id)
            .field("name", &self.entry.name)
            .field("kind", &self.entry.kind.type_name())
            .finish()
    }
}
