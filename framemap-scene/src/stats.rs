//! Scene statistics and cut detection.

use serde::{Deserialize, Serialize};

/// Change between two consecutive frames. Every field is 0.0 - 1.0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneDelta {
    /// Mean absolute luma difference.
    pub content: f64,
    /// Angle between the dominant hues, as a fraction of a half turn.
    pub hue: f64,
    /// Difference of mean saturation.
    pub saturation: f64,
    /// Difference of mean luma.
    pub luminance: f64,
}

impl SceneDelta {
    /// Weighted change score.
    pub fn score(&self) -> f64 {
        self.content * 0.6 + self.hue * 0.15 + self.saturation * 0.15 + self.luminance * 0.1
    }
}

/// Cut detection configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Score above which a frame starts a new scene (0.0 - 1.0).
    pub threshold: f64,
    /// Minimum frames between cuts.
    pub min_scene_length: usize,
    /// Derive the threshold from the scores seen so far.
    pub adaptive_threshold: bool,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            threshold: 0.3,
            min_scene_length: 12, // ~0.5 seconds at 24fps
            adaptive_threshold: true,
        }
    }
}

impl SceneConfig {
    /// Set threshold.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Set minimum scene length.
    pub fn with_min_scene_length(mut self, frames: usize) -> Self {
        self.min_scene_length = frames;
        self
    }

    /// Enable or disable the adaptive threshold.
    pub fn with_adaptive_threshold(mut self, adaptive: bool) -> Self {
        self.adaptive_threshold = adaptive;
        self
    }
}

/// Running mean and variance of scores (Welford).
#[derive(Debug, Default)]
struct RunningStats {
    count: usize,
    mean: f64,
    m2: f64,
}

impl RunningStats {
    fn push(&mut self, score: f64) {
        self.count += 1;
        let delta = score - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (score - self.mean);
    }

    fn threshold(&self, config: &SceneConfig) -> f64 {
        if !config.adaptive_threshold || self.count < 10 {
            return config.threshold;
        }
        let std_dev = (self.m2 / self.count as f64).sqrt();
        (self.mean + 2.0 * std_dev).clamp(0.1, 0.8)
    }
}

/// One [`SceneDelta`] per frame; row `n` compares frame `n - 1` with
/// frame `n`, row 0 is all zeros.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SceneStats {
    rows: Vec<SceneDelta>,
}

impl SceneStats {
    /// Empty statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty statistics for `frames` frames.
    pub fn with_capacity(frames: usize) -> Self {
        Self {
            rows: Vec::with_capacity(frames),
        }
    }

    /// Number of analysed frames.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if nothing was analysed.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append the row of the next frame.
    pub fn push(&mut self, delta: SceneDelta) {
        self.rows.push(delta);
    }

    /// Row of frame `n`.
    pub fn get(&self, n: usize) -> Option<&SceneDelta> {
        self.rows.get(n)
    }

    /// All rows.
    pub fn rows(&self) -> &[SceneDelta] {
        &self.rows
    }

    /// Keep the first `len` rows.
    pub fn truncate(&mut self, len: usize) {
        self.rows.truncate(len);
    }

    /// Frames starting a new scene.
    pub fn boundaries(&self, config: &SceneConfig) -> Vec<usize> {
        let mut running = RunningStats::default();
        let mut last_cut = 0;
        let mut cuts = Vec::new();
        for (n, row) in self.rows.iter().enumerate().skip(1) {
            let score = row.score();
            running.push(score);
            if score > running.threshold(config) && n - last_cut >= config.min_scene_length {
                cuts.push(n);
                last_cut = n;
            }
        }
        cuts
    }
}

impl FromIterator<SceneDelta> for SceneStats {
    fn from_iter<I: IntoIterator<Item = SceneDelta>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}
