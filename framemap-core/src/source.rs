//! The frame source contract consumed at the root of every pipeline.
//!
//! Demuxers and decoders live outside this engine; they are seen only
//! through [`FrameSource`]. [`MemorySource`] is an in-memory
//! implementation for tests and for pre-decoded material.

use crate::error::{Error, Result};
use crate::frame::{Frame, PixelFormat};
use crate::timestamp::TimeBase;
use serde::{Deserialize, Serialize};

/// Lazy, ordered sequence of frames. Decode failures surface as `Err`
/// items and are passed through unchanged by every stage.
pub type FrameIter<'a> = Box<dyn Iterator<Item = Result<Frame>> + Send + 'a>;

/// Static format metadata of a video stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamInfo {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel format.
    pub format: PixelFormat,
    /// Time base of pts and durations.
    #[serde(with = "time_base_serde")]
    pub time_base: TimeBase,
}

impl StreamInfo {
    /// Create stream info.
    pub fn new(width: u32, height: u32, format: PixelFormat, time_base: TimeBase) -> Self {
        Self {
            width,
            height,
            format,
            time_base,
        }
    }
}

/// Anything that can produce decoded frames with a known pts array.
pub trait FrameSource: Send + Sync {
    /// Stream metadata.
    fn info(&self) -> StreamInfo;

    /// Non-decreasing presentation timestamps, one per frame.
    fn pts(&self) -> &[i64];

    /// Per-frame durations in ticks.
    fn durations(&self) -> &[i64];

    /// Number of frames.
    fn framecount(&self) -> usize {
        self.pts().len()
    }

    /// Frames `start..end`, in order. `end` is clamped to the frame count.
    ///
    /// Each yielded frame carries its own index, pts and duration.
    fn iter_frames(&self, start: usize, end: usize) -> FrameIter<'_>;
}

/// A [`FrameSource`] over frames held in memory.
#[derive(Debug, Clone)]
pub struct MemorySource {
    info: StreamInfo,
    frames: Vec<Frame>,
    pts: Vec<i64>,
    durations: Vec<i64>,
}

impl MemorySource {
    /// Create a source from frames whose pts and durations are already set.
    ///
    /// Fails if pts is decreasing anywhere or a frame does not match `info`.
    pub fn new(info: StreamInfo, frames: Vec<Frame>) -> Result<Self> {
        for (i, frame) in frames.iter().enumerate() {
            if frame.width() != info.width
                || frame.height() != info.height
                || frame.format() != info.format
            {
                return Err(Error::invalid_param(format!(
                    "frame {} is {}x{} {}, stream is {}x{} {}",
                    i,
                    frame.width(),
                    frame.height(),
                    frame.format(),
                    info.width,
                    info.height,
                    info.format
                )));
            }
        }
        if let Some(i) = frames.windows(2).position(|w| w[1].pts < w[0].pts) {
            return Err(Error::invalid_param(format!(
                "pts decreases at frame {}",
                i + 1
            )));
        }

        let frames: Vec<Frame> = frames
            .into_iter()
            .enumerate()
            .map(|(i, mut f)| {
                f.index = i;
                f.time_base = info.time_base;
                f
            })
            .collect();
        let pts = frames.iter().map(|f| f.pts).collect();
        let durations = frames.iter().map(|f| f.duration).collect();

        Ok(Self {
            info,
            frames,
            pts,
            durations,
        })
    }

    /// Create a source stamping frames at a constant `frame_duration`.
    pub fn constant_rate(
        info: StreamInfo,
        frames: Vec<Frame>,
        frame_duration: i64,
    ) -> Result<Self> {
        if frame_duration <= 0 {
            return Err(Error::invalid_param("frame duration must be positive"));
        }
        let frames = frames
            .into_iter()
            .enumerate()
            .map(|(i, mut f)| {
                f.pts = i as i64 * frame_duration;
                f.duration = frame_duration;
                f
            })
            .collect();
        Self::new(info, frames)
    }

    /// Borrow frame `n`.
    pub fn frame(&self, n: usize) -> Option<&Frame> {
        self.frames.get(n)
    }
}

impl FrameSource for MemorySource {
    fn info(&self) -> StreamInfo {
        self.info
    }

    fn pts(&self) -> &[i64] {
        &self.pts
    }

    fn durations(&self) -> &[i64] {
        &self.durations
    }

    fn iter_frames(&self, start: usize, end: usize) -> FrameIter<'_> {
        let end = end.min(self.frames.len());
        let start = start.min(end);
        Box::new(self.frames[start..end].iter().cloned().map(Ok))
    }
}

mod time_base_serde {
    use crate::rational::Rational;
    use crate::timestamp::TimeBase;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(tb: &TimeBase, s: S) -> Result<S::Ok, S::Error> {
        (tb.0.num, tb.0.den).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<TimeBase, D::Error> {
        let (num, den) = <(i64, i64)>::deserialize(d)?;
        if den == 0 {
            return Err(serde::de::Error::custom("time base denominator is zero"));
        }
        Ok(TimeBase(Rational::new(num, den)))
    }
}
