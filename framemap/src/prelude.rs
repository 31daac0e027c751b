//! Prelude module for convenient imports.
//!
//! ```rust
//! use framemap::prelude::*;
//! ```

// Core types
pub use crate::{Error, Result};
pub use crate::{Frame, FrameBuffer, FrameFlags, PixelFormat};
pub use crate::{FrameSource, MemorySource, StreamInfo};
pub use crate::{IndexMap, Position, Rational, TimeBase, NO_FRAME};

// Pipeline types
pub use crate::{Filter, NodeId, NodeRef, Pipeline};

// Zones
pub use crate::{PulldownFilter, PulldownZone, ZoneKind, ZonedFilter};
pub use crate::{SceneAnalyzer, SceneConfig, SceneFilter, SceneFilterExt, SceneShared, SceneZone};

// Index translation
pub use crate::{translate_index, translate_pts};
