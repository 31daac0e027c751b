//! Carrying frame numbers and timestamps between pipeline nodes.
//!
//! Both nodes are mapped through the root source they share: `from`'s
//! cumulative reverse map leads to a source frame, `to`'s cumulative
//! forward map leads from there to `to`'s numbering.

use framemap_core::Result;
use framemap_pipeline::{NodeId, Pipeline};

/// Frame of node `to` showing frame `n` of node `from`, `None` when `n`
/// is out of range or `to` drops it.
pub fn translate_index(
    pipeline: &Pipeline,
    from: NodeId,
    to: NodeId,
    n: usize,
) -> Result<Option<usize>> {
    let Some(root) = pipeline.node(from)?.cumulative_index_reverse_map()?.lookup(n) else {
        return Ok(None);
    };
    Ok(pipeline.node(to)?.cumulative_index_map()?.lookup(root))
}

/// Pts in node `to` of the frame displayed at `pts` in node `from`.
pub fn translate_pts(pipeline: &Pipeline, from: NodeId, to: NodeId, pts: i64) -> Result<Option<i64>> {
    let source = pipeline.node(from)?;
    let own = source.pts()?;
    // Frame on screen at `pts`: the last one starting at or before it.
    let Some(n) = own.partition_point(|&p| p <= pts).checked_sub(1) else {
        return Ok(None);
    };
    if pts >= source.end_pts()? {
        return Ok(None);
    }
    let Some(m) = translate_index(pipeline, from, to, n)? else {
        return Ok(None);
    };
    let target = pipeline.node(to)?.pts()?;
    Ok(target.get(m).copied())
}
