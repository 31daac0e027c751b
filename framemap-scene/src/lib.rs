//! Scene detection and scene-based timestamp realignment.
//!
//! A [`SceneAnalyzer`] walks a stream on a worker thread and records one
//! [`SceneDelta`] per frame. [`SceneStats::boundaries`] turns those into
//! cut positions, and a [`SceneFilter`] holds one [`SceneZone`] per scene.
//! Each zone forces a keyframe on its first frame and, when `fixpts` is
//! set, moves its pts back onto the nominal frame grid of the stream.

#![warn(missing_docs)]

mod analysis;
mod metrics;
mod stats;
mod zone;

pub use analysis::{
    resume_frame, AnalysisConfig, AnalysisHandle, AnalysisOutcome, AnalysisProgress, CancelToken,
    SceneAnalyzer,
};
pub use metrics::FrameFeatures;
pub use stats::{SceneConfig, SceneDelta, SceneStats};
pub use zone::{
    subdivision_ticks, SceneFilter, SceneFilterExt, ScenePlan, SceneShared, SceneZone,
    SUBDIVISION_SECONDS,
};
