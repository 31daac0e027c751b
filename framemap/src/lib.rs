//! # Framemap
//!
//! Frame-index and timestamp remapping for non-linear video pipelines.
//!
//! Stages of a [`Pipeline`] may drop, regroup or retime frames. Every
//! stage exposes the pts and durations of its own frames and index maps
//! back to its upstream, so a frame number or timestamp can be carried
//! from any point of the pipeline to any other.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use framemap::prelude::*;
//!
//! fn build(source: MemorySource) -> framemap::Result<()> {
//!     let mut pipeline = Pipeline::new();
//!     let src = pipeline.add_source("decoder", source);
//!     let ivtc = pipeline.add_filter(
//!         src,
//!         PulldownFilter::new("ivtc", PulldownZone::new("AABBBCCDDD")?, ())?,
//!     )?;
//!
//!     // A cut at frame 4800 starts a new scene.
//!     let scenes = pipeline.add_filter(
//!         ivtc,
//!         SceneFilter::new("scenes", SceneZone::new(), SceneShared::default())?,
//!     )?;
//!     pipeline.edit::<SceneFilter, _>(scenes, |f| f.insert_zone_at(4800))?;
//!
//!     for frame in pipeline.node(scenes)?.iter_frames(None, None)? {
//!         let frame = frame?;
//!         println!("{} @ {}", frame.index, frame.pts);
//!     }
//!
//!     // Where did film frame 100 come from?
//!     let decoded = translate_index(&pipeline, scenes, src, 100)?;
//!     println!("{:?}", decoded);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The library is organized into several crates:
//! - `framemap-core`: frames, time bases, index maps, sources, errors
//! - `framemap-pipeline`: node arena, filter trait and chains
//! - `framemap-zones`: zone-partitioned filters
//! - `framemap-pulldown`: inverse telecine zones
//! - `framemap-scene`: scene analysis and pts realignment zones
//!
//! This crate re-exports the most commonly used types.

mod markers;
pub mod prelude;

pub use markers::{translate_index, translate_pts};

// Re-export core types
pub use framemap_core::{
    error::{Error, Result},
    frame::{Frame, FrameBuffer, FrameFlags, PixelFormat},
    index_map::{IndexMap, NO_FRAME},
    rational::Rational,
    source::{FrameIter, FrameSource, MemorySource, StreamInfo},
    timestamp::{Position, TimeBase},
};

// Re-export pipeline types
pub use framemap_pipeline::{
    durations_from_pts, DropFilter, Filter, FrameCursor, IndexMaps, NodeId, NodeRef, NullFilter,
    Pipeline, ScaleFilter,
};

// Re-export zone types
pub use framemap_zones::{
    MappedProcessor, Zone, ZoneContext, ZoneKind, ZoneMaps, ZoneMut, ZoneProcessor, ZonedFilter,
};

// Re-export pulldown types
pub use framemap_pulldown::{Pattern, PulldownFilter, PulldownZone};

// Re-export scene types
pub use framemap_scene::{
    AnalysisConfig, AnalysisHandle, AnalysisOutcome, AnalysisProgress, CancelToken,
    SceneAnalyzer, SceneConfig, SceneFilter, SceneFilterExt, SceneShared, SceneStats, SceneZone,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
