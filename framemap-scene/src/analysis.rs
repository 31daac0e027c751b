//! Background scene analysis.
//!
//! The worker owns the statistics it builds and hands them back when it
//! stops. Progress flows the other way as [`AnalysisProgress`] messages.
//! Cancellation is cooperative: the worker checks its [`CancelToken`]
//! before every frame and returns what it has analysed so far.

use crate::metrics::FrameFeatures;
use crate::stats::{SceneDelta, SceneStats};
use framemap_core::{Error, FrameIter, Position, Result};
use framemap_pipeline::NodeRef;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use tracing::{debug, info};

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the worker to stop.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Check whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn rearm(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

/// Analysis progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisProgress {
    /// Frames with statistics, resumed ones included.
    pub analyzed: usize,
    /// Frames in the stream.
    pub total: usize,
}

impl AnalysisProgress {
    /// Completed fraction, 0.0 - 1.0.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            (self.analyzed as f64 / self.total as f64).min(1.0)
        }
    }
}

/// Result of an analysis run.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    /// Statistics gathered, partial if the run was cancelled.
    pub stats: SceneStats,
    /// Whether the whole stream was analysed.
    pub completed: bool,
}

impl AnalysisOutcome {
    /// Statistics of a completed run, [`Error::Cancelled`] otherwise.
    pub fn into_complete(self) -> Result<SceneStats> {
        if self.completed {
            Ok(self.stats)
        } else {
            Err(Error::Cancelled)
        }
    }
}

/// Analysis settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Report progress every this many frames.
    pub progress_interval: usize,
    /// Compare every this many luma samples.
    pub luma_step: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            progress_interval: 25,
            luma_step: 4,
        }
    }
}

impl AnalysisConfig {
    /// Set the progress interval.
    pub fn with_progress_interval(mut self, frames: usize) -> Self {
        self.progress_interval = frames.max(1);
        self
    }

    /// Set the luma sampling step.
    pub fn with_luma_step(mut self, step: usize) -> Self {
        self.luma_step = step.max(1);
        self
    }
}

/// First frame an analysis resuming from `stats` has to read: the last
/// analysed frame, needed as the reference for the next row.
pub fn resume_frame(stats: Option<&SceneStats>) -> usize {
    stats.map_or(0, |s| s.len().saturating_sub(1))
}

/// Computes [`SceneStats`] on a worker thread.
#[derive(Debug, Clone, Default)]
pub struct SceneAnalyzer {
    config: AnalysisConfig,
    cancel: CancelToken,
}

impl SceneAnalyzer {
    /// Create an analyzer.
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            config,
            cancel: CancelToken::new(),
        }
    }

    /// Token cancelling this analyzer's runs.
    ///
    /// Cancelling stops the run in progress, or the next one if none is
    /// running. A run that stops on cancellation re-arms the token, so the
    /// analyzer can be run again.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Analyse `frames` on a worker thread, reporting progress on the
    /// calling thread, and block until the worker stops.
    ///
    /// `frames` must start at [`resume_frame`] of `resume`; `total` is the
    /// stream's frame count.
    pub fn run<F>(
        &self,
        frames: FrameIter<'_>,
        total: usize,
        resume: Option<SceneStats>,
        mut on_progress: F,
    ) -> Result<AnalysisOutcome>
    where
        F: FnMut(AnalysisProgress),
    {
        thread::scope(|scope| {
            let (tx, rx) = mpsc::channel();
            let worker = thread::Builder::new()
                .name("scene-analysis".into())
                .spawn_scoped(scope, move || {
                    self.analyze(frames, total, resume, |p| {
                        let _ = tx.send(p);
                    })
                })?;
            for progress in rx {
                on_progress(progress);
            }
            match worker.join() {
                Ok(result) => result,
                Err(panic) => std::panic::resume_unwind(panic),
            }
        })
    }

    /// Analyse every frame of `node`, resuming after `resume`.
    pub fn run_node<F>(
        &self,
        node: &NodeRef<'_>,
        resume: Option<SceneStats>,
        on_progress: F,
    ) -> Result<AnalysisOutcome>
    where
        F: FnMut(AnalysisProgress),
    {
        let start = resume_frame(resume.as_ref());
        let frames = node.iter_frames(Some(Position::FrameNumber(start)), None)?;
        self.run(frames, node.framecount()?, resume, on_progress)
    }

    /// Analyse `frames` on a detached worker thread. Both callbacks run on
    /// the worker; `on_complete` sees the result before
    /// [`AnalysisHandle::join`] returns it.
    pub fn spawn<P, C>(
        self,
        frames: FrameIter<'static>,
        total: usize,
        resume: Option<SceneStats>,
        on_progress: P,
        on_complete: C,
    ) -> Result<AnalysisHandle>
    where
        P: FnMut(AnalysisProgress) + Send + 'static,
        C: FnOnce(&Result<AnalysisOutcome>) + Send + 'static,
    {
        let cancel = self.cancel.clone();
        let join = thread::Builder::new()
            .name("scene-analysis".into())
            .spawn(move || {
                let result = self.analyze(frames, total, resume, on_progress);
                on_complete(&result);
                result
            })?;
        Ok(AnalysisHandle { cancel, join })
    }

    fn analyze<P>(
        &self,
        frames: FrameIter<'_>,
        total: usize,
        resume: Option<SceneStats>,
        mut on_progress: P,
    ) -> Result<AnalysisOutcome>
    where
        P: FnMut(AnalysisProgress),
    {
        let mut stats = resume.unwrap_or_else(|| SceneStats::with_capacity(total));
        let resumed = !stats.is_empty();
        let interval = self.config.progress_interval.max(1);
        info!(total, resumed_at = stats.len(), "starting scene analysis");

        let mut prev: Option<FrameFeatures> = None;
        for frame in frames {
            if self.cancel.is_cancelled() {
                self.cancel.rearm();
                info!(analyzed = stats.len(), total, "scene analysis cancelled");
                return Ok(AnalysisOutcome {
                    stats,
                    completed: false,
                });
            }
            let features = FrameFeatures::extract(&frame?, self.config.luma_step);
            match &prev {
                Some(prev) => stats.push(prev.compare(&features)),
                None if !resumed => stats.push(SceneDelta::default()),
                None => {}
            }
            prev = Some(features);

            if stats.len() % interval == 0 {
                debug!(analyzed = stats.len(), total, "scene analysis progress");
                on_progress(AnalysisProgress {
                    analyzed: stats.len(),
                    total,
                });
            }
        }

        on_progress(AnalysisProgress {
            analyzed: stats.len(),
            total,
        });
        info!(analyzed = stats.len(), "scene analysis complete");
        Ok(AnalysisOutcome {
            stats,
            completed: true,
        })
    }
}

/// Handle on a detached analysis.
#[derive(Debug)]
pub struct AnalysisHandle {
    cancel: CancelToken,
    join: JoinHandle<Result<AnalysisOutcome>>,
}

impl AnalysisHandle {
    /// Ask the worker to stop after the current frame.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Check whether the worker has stopped.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the worker. Partial statistics survive cancellation.
    pub fn join(self) -> Result<AnalysisOutcome> {
        match self.join.join() {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}
