//! Lazily evaluated filter graph for the framemap engine.
//!
//! A [`Pipeline`] owns every node: frame sources, filters and filter
//! chains. Each node derives its frame count, pts, durations and index
//! maps from its upstream on first access and keeps them until
//! [`Pipeline::reset_cache`] or [`Pipeline::edit`] invalidates it and
//! everything downstream.

mod cursor;
mod filter;
mod node;
mod pipeline;

pub use cursor::FrameCursor;
pub use filter::{durations_from_pts, DropFilter, Filter, IndexMaps, NullFilter, ScaleFilter};
pub use framemap_core::{Error, Result};
pub use node::{NodeId, NodeRef};
pub use pipeline::Pipeline;
