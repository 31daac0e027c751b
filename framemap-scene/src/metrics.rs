//! Per-frame features and the deltas between consecutive frames.

use crate::stats::SceneDelta;
use framemap_core::Frame;
use std::f64::consts::{PI, SQRT_2};

/// Largest chroma vector length, `(±128, ±128)`.
const MAX_CHROMA: f64 = 128.0 * SQRT_2;

/// Mean chroma vectors shorter than this have no meaningful hue.
const HUE_EPSILON: f64 = 0.5;

/// Features extracted from one frame.
#[derive(Debug, Clone)]
pub struct FrameFeatures {
    /// Luma samples, every `luma_step`-th one.
    luma: Vec<u8>,
    mean_luma: f64,
    /// Circular mean of the chroma angle, radians.
    hue: Option<f64>,
    /// Mean chroma vector length, 0.0 - 1.0.
    saturation: f64,
}

impl FrameFeatures {
    /// Extract features, sampling every `luma_step`-th luma value for the
    /// content comparison.
    pub fn extract(frame: &Frame, luma_step: usize) -> Self {
        let buffer = frame.buffer();
        let plane = buffer.plane(0).unwrap_or(&[]);
        let luma = plane.iter().step_by(luma_step.max(1)).copied().collect();
        let mean_luma = if plane.is_empty() {
            0.0
        } else {
            plane.iter().map(|&v| v as f64).sum::<f64>() / plane.len() as f64
        };
        let (hue, saturation) = match (buffer.plane(1), buffer.plane(2)) {
            (Some(u), Some(v)) => chroma_stats(u, v),
            _ => (None, 0.0),
        };
        Self {
            luma,
            mean_luma,
            hue,
            saturation,
        }
    }

    /// Mean luma, 0 - 255.
    pub fn mean_luma(&self) -> f64 {
        self.mean_luma
    }

    /// Dominant hue in radians, `None` for colourless frames.
    pub fn hue(&self) -> Option<f64> {
        self.hue
    }

    /// Mean saturation, 0.0 - 1.0.
    pub fn saturation(&self) -> f64 {
        self.saturation
    }

    /// Deltas from this frame to `next`, each normalised to 0.0 - 1.0.
    pub fn compare(&self, next: &FrameFeatures) -> SceneDelta {
        let content = if self.luma.len() != next.luma.len() {
            1.0
        } else if self.luma.is_empty() {
            0.0
        } else {
            let sum: u64 = self
                .luma
                .iter()
                .zip(&next.luma)
                .map(|(&a, &b)| a.abs_diff(b) as u64)
                .sum();
            sum as f64 / (self.luma.len() as f64 * 255.0)
        };
        let hue = match (self.hue, next.hue) {
            (Some(a), Some(b)) => {
                let d = (a - b).abs() % (2.0 * PI);
                d.min(2.0 * PI - d) / PI
            }
            _ => 0.0,
        };
        SceneDelta {
            content,
            hue,
            saturation: (self.saturation - next.saturation).abs(),
            luminance: (self.mean_luma - next.mean_luma).abs() / 255.0,
        }
    }
}

fn chroma_stats(u: &[u8], v: &[u8]) -> (Option<f64>, f64) {
    let n = u.len().min(v.len());
    if n == 0 {
        return (None, 0.0);
    }
    let (mut sum_u, mut sum_v, mut length) = (0.0, 0.0, 0.0);
    for (&cu, &cv) in u.iter().zip(v) {
        let x = cu as f64 - 128.0;
        let y = cv as f64 - 128.0;
        sum_u += x;
        sum_v += y;
        length += x.hypot(y);
    }
    let n = n as f64;
    let hue = (sum_u.hypot(sum_v) / n >= HUE_EPSILON).then(|| sum_v.atan2(sum_u));
    (hue, length / n / MAX_CHROMA)
}

#[cfg(test)]
mod tests {
    use super::*;
    use framemap_core::{PixelFormat, TimeBase};

    fn yuv(y: u8, u: u8, v: u8) -> Frame {
        let mut frame = Frame::new(4, 4, PixelFormat::Yuv444p, TimeBase::MILLISECONDS);
        for (plane, value) in [y, u, v].into_iter().enumerate() {
            frame.plane_mut(plane).unwrap().fill(value);
        }
        frame
    }

    #[test]
    fn test_identical_frames() {
        let a = FrameFeatures::extract(&yuv(90, 150, 100), 1);
        let delta = a.compare(&a.clone());
        assert_eq!(delta, SceneDelta::default());
    }

    #[test]
    fn test_black_to_white() {
        let black = FrameFeatures::extract(&yuv(0, 128, 128), 2);
        let white = FrameFeatures::extract(&yuv(255, 128, 128), 2);
        let delta = black.compare(&white);
        assert!((delta.content - 1.0).abs() < 1e-9);
        assert!((delta.luminance - 1.0).abs() < 1e-9);
        assert_eq!(black.hue(), None);
        assert_eq!(delta.hue, 0.0);
        assert_eq!(delta.saturation, 0.0);
    }

    #[test]
    fn test_hue_rotation() {
        let blue = FrameFeatures::extract(&yuv(100, 200, 128), 1);
        let red = FrameFeatures::extract(&yuv(100, 128, 200), 1);
        let delta = blue.compare(&red);
        assert!((delta.hue - 0.5).abs() < 1e-9);
        assert!(delta.saturation.abs() < 1e-9);
        assert_eq!(delta.content, 0.0);
    }

    #[test]
    fn test_gray_has_no_chroma() {
        let mut frame = Frame::new(4, 4, PixelFormat::Gray8, TimeBase::MILLISECONDS);
        frame.plane_mut(0).unwrap().fill(40);
        let features = FrameFeatures::extract(&frame, 3);
        assert_eq!(features.hue(), None);
        assert_eq!(features.saturation(), 0.0);
        assert!((features.mean_luma() - 40.0).abs() < 1e-9);
    }
}
