//! The node arena and its wiring operations.

use crate::filter::Filter;
use crate::node::{NodeEntry, NodeId, NodeKind, NodeRef};
use framemap_core::{Error, FrameIter, FrameSource, Result};
use tracing::debug;

/// Owner of every node of a filter graph.
///
/// Nodes refer to each other by [`NodeId`]; removing a node leaves its
/// slot empty so that other ids stay valid.
#[derive(Default)]
pub struct Pipeline {
    nodes: Vec<Option<NodeEntry>>,
}

impl Pipeline {
    /// Create an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.nodes.iter().flatten().count()
    }

    /// Check if the pipeline has no nodes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry(&self, id: NodeId) -> Result<&NodeEntry> {
        self.nodes
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or(Error::NodeNotFound(id.0))
    }

    fn entry_mut(&mut self, id: NodeId) -> Result<&mut NodeEntry> {
        self.nodes
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(Error::NodeNotFound(id.0))
    }

    fn push(&mut self, entry: NodeEntry) -> NodeId {
        let id = NodeId(self.nodes.len());
        if let Some(prev) = entry.prev {
            if let Ok(prev) = self.entry_mut(prev) {
                prev.next.push(id);
            }
        }
        self.nodes.push(Some(entry));
        id
    }

    /// View of node `id`.
    pub fn node(&self, id: NodeId) -> Result<NodeRef<'_>> {
        Ok(NodeRef::new(self, id, self.entry(id)?))
    }

    /// Add a root frame source.
    pub fn add_source(
        &mut self,
        name: impl Into<String>,
        source: impl FrameSource + 'static,
    ) -> NodeId {
        let id = self.push(NodeEntry::new(
            name.into(),
            NodeKind::Source(Box::new(source)),
            None,
        ));
        debug!("Added source {}", id);
        id
    }

    /// Add a filter reading from `prev`.
    pub fn add_filter(&mut self, prev: NodeId, filter: impl Filter) -> Result<NodeId> {
        self.add_boxed_filter(prev, Box::new(filter))
    }

    /// Add a boxed filter reading from `prev`.
    pub fn add_boxed_filter(&mut self, prev: NodeId, filter: Box<dyn Filter>) -> Result<NodeId> {
        self.entry(prev)?;
        let name = filter.name().to_string();
        let id = self.push(NodeEntry::new(name, NodeKind::Filter(filter), Some(prev)));
        debug!("Added filter {} after {}", id, prev);
        Ok(id)
    }

    /// Add an empty chain reading from `prev`.
    pub fn add_chain(&mut self, name: impl Into<String>, prev: NodeId) -> Result<NodeId> {
        self.entry(prev)?;
        let id = self.push(NodeEntry::new(
            name.into(),
            NodeKind::Chain(Vec::new()),
            Some(prev),
        ));
        debug!("Added chain {} after {}", id, prev);
        Ok(id)
    }

    /// Typed access to a filter.
    pub fn filter<T: Filter>(&self, id: NodeId) -> Result<&T> {
        let filter = match &self.entry(id)?.kind {
            NodeKind::Filter(f) => f.as_any().downcast_ref::<T>(),
            _ => None,
        };
        filter.ok_or(Error::WrongNodeType {
            node: id.0,
            expected: std::any::type_name::<T>(),
        })
    }

    /// Mutate a filter, then invalidate every cache depending on it.
    ///
    /// Caches are invalidated even when `f` fails, since it may have
    /// changed the filter before failing.
    pub fn edit<T: Filter, R>(
        &mut self,
        id: NodeId,
        f: impl FnOnce(&mut T) -> Result<R>,
    ) -> Result<R> {
        let filter = match &mut self.entry_mut(id)?.kind {
            NodeKind::Filter(filter) => filter.as_any_mut().downcast_mut::<T>(),
            _ => None,
        }
        .ok_or(Error::WrongNodeType {
            node: id.0,
            expected: std::any::type_name::<T>(),
        })?;
        let result = f(filter);
        self.invalidate(id, false)?;
        result
    }

    /// Invalidate node `id` and everything downstream of it.
    pub fn reset_cache(&mut self, id: NodeId) -> Result<()> {
        self.invalidate(id, true)
    }

    /// Clear derived caches of `id`, its consumers, and the chains owning
    /// any of them. With `internal`, the root node's filter also drops its
    /// own caches; downstream filters always do.
    fn invalidate(&mut self, id: NodeId, internal: bool) -> Result<()> {
        self.entry(id)?;
        let mut stack = vec![(id, internal)];
        let mut seen = std::collections::HashSet::new();
        let mut count = 0usize;
        while let Some((node, internal)) = stack.pop() {
            if !seen.insert(node) {
                continue;
            }
            let Ok(entry) = self.entry_mut(node) else {
                continue;
            };
            entry.clear_cache();
            if internal {
                if let NodeKind::Filter(filter) = &mut entry.kind {
                    filter.reset_cache();
                }
            }
            count += 1;
            stack.extend(entry.next.iter().map(|&n| (n, true)));
            if let Some(parent) = entry.parent {
                stack.push((parent, true));
            }
        }
        debug!("Invalidated {} node(s) from {}", count, id);
        Ok(())
    }

    fn chain_elements_mut(&mut self, chain: NodeId) -> Result<&mut Vec<NodeId>> {
        match &mut self.entry_mut(chain)?.kind {
            NodeKind::Chain(elements) => Ok(elements),
            _ => Err(Error::WrongNodeType {
                node: chain.0,
                expected: "chain",
            }),
        }
    }

    /// Elements of a chain, in order.
    pub fn chain_elements(&self, chain: NodeId) -> Result<&[NodeId]> {
        match &self.entry(chain)?.kind {
            NodeKind::Chain(elements) => Ok(elements),
            _ => Err(Error::WrongNodeType {
                node: chain.0,
                expected: "chain",
            }),
        }
    }

    /// Append a filter to a chain.
    pub fn chain_append(&mut self, chain: NodeId, filter: impl Filter) -> Result<NodeId> {
        let at = self.chain_elements(chain)?.len();
        self.chain_insert(chain, at, filter)
    }

    /// Append several filters to a chain.
    pub fn chain_extend(
        &mut self,
        chain: NodeId,
        filters: impl IntoIterator<Item = Box<dyn Filter>>,
    ) -> Result<Vec<NodeId>> {
        self.chain_elements(chain)?;
        let mut ids = Vec::new();
        for filter in filters {
            let name = filter.name().to_string();
            let id = self.push(NodeEntry::new(name, NodeKind::Filter(filter), None));
            self.chain_elements_mut(chain)?.push(id);
            ids.push(id);
        }
        self.adopt(chain, &ids)?;
        Ok(ids)
    }

    /// Insert a filter into a chain before position `index`.
    pub fn chain_insert(
        &mut self,
        chain: NodeId,
        index: usize,
        filter: impl Filter,
    ) -> Result<NodeId> {
        let len = self.chain_elements(chain)?.len();
        if index > len {
            return Err(Error::invalid_param(format!(
                "insert position {} past chain length {}",
                index, len
            )));
        }
        let name = filter.name().to_string();
        let id = self.push(NodeEntry::new(name, NodeKind::Filter(Box::new(filter)), None));
        self.chain_elements_mut(chain)?.insert(index, id);
        self.adopt(chain, &[id])?;
        Ok(id)
    }

    /// Remove the element at `index` from a chain, returning its filter.
    pub fn chain_remove(&mut self, chain: NodeId, index: usize) -> Result<Box<dyn Filter>> {
        let elements = self.chain_elements_mut(chain)?;
        if index >= elements.len() {
            return Err(Error::invalid_param(format!(
                "no element {} in chain {}",
                index, chain
            )));
        }
        let id = elements.remove(index);
        let entry = self.nodes[id.0].take().ok_or(Error::NodeNotFound(id.0))?;
        if let Some(prev) = entry.prev {
            if let Ok(prev) = self.entry_mut(prev) {
                prev.next.retain(|&n| n != id);
            }
        }
        self.rewire(chain)?;
        match entry.kind {
            NodeKind::Filter(filter) => Ok(filter),
            _ => Err(Error::WrongNodeType {
                node: id.0,
                expected: "filter",
            }),
        }
    }

    fn adopt(&mut self, chain: NodeId, ids: &[NodeId]) -> Result<()> {
        for &id in ids {
            self.entry_mut(id)?.parent = Some(chain);
        }
        self.rewire(chain)
    }

    /// Re-establish `prev`/`next` links along a chain: element 0 reads from
    /// the chain's upstream, element i from element i - 1.
    fn rewire(&mut self, chain: NodeId) -> Result<()> {
        let upstream = self.entry(chain)?.prev;
        let elements = self.chain_elements(chain)?.to_vec();
        for (i, &id) in elements.iter().enumerate() {
            let want = if i == 0 { upstream } else { Some(elements[i - 1]) };
            let old = self.entry(id)?.prev;
            if old == want {
                continue;
            }
            if let Some(old) = old {
                if let Ok(old) = self.entry_mut(old) {
                    old.next.retain(|&n| n != id);
                }
            }
            if let Some(want) = want {
                self.entry_mut(want)?.next.push(id);
            }
            self.entry_mut(id)?.prev = want;
            self.invalidate(id, true)?;
        }
        self.invalidate(chain, true)
    }

    /// Run frames through a chain's elements in order, stopping after the
    /// element named `through` when given.
    ///
    /// Frames must carry indices in the chain's upstream numbering.
    pub fn chain_process_frames<'a>(
        &'a self,
        chain: NodeId,
        frames: FrameIter<'a>,
        through: Option<&str>,
    ) -> Result<FrameIter<'a>> {
        let elements = self.chain_elements(chain)?;
        if let Some(name) = through {
            if !elements
                .iter()
                .any(|&id| self.entry(id).is_ok_and(|e| e.name == name))
            {
                return Err(Error::invalid_param(format!(
                    "chain {} has no element named {:?}",
                    chain, name
                )));
            }
        }

        let mut frames = frames;
        for &id in elements {
            let node = self.node(id)?;
            let filter = node
                .filter()
                .ok_or(Error::WrongNodeType {
                    node: id.0,
                    expected: "filter",
                })?;
            frames = filter.process_frames(node, frames)?;
            if through == Some(node.name()) {
                break;
            }
        }
        Ok(frames)
    }
}
