//! Video frame buffer abstractions.
//!
//! Frames are planar 8-bit images. Field operations (weaving,
//! line-doubling) work on rows, so rows are tightly packed: the stride of
//! every plane equals its width.

use crate::timestamp::TimeBase;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pixel format for video frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// Planar YUV 4:2:0, 12bpp (1 Cr & Cb sample per 2x2 Y samples).
    Yuv420p,
    /// Planar YUV 4:2:2, 16bpp (1 Cr & Cb sample per 2x1 Y samples).
    Yuv422p,
    /// Planar YUV 4:4:4, 24bpp (no subsampling).
    Yuv444p,
    /// Grayscale, 8bpp.
    Gray8,
}

impl PixelFormat {
    /// Get the number of planes for this pixel format.
    pub fn num_planes(&self) -> usize {
        match self {
            Self::Yuv420p | Self::Yuv422p | Self::Yuv444p => 3,
            Self::Gray8 => 1,
        }
    }

    /// Get chroma subsampling factors (horizontal, vertical).
    pub fn chroma_subsampling(&self) -> (u32, u32) {
        match self {
            Self::Yuv420p => (2, 2),
            Self::Yuv422p => (2, 1),
            Self::Yuv444p | Self::Gray8 => (1, 1),
        }
    }

    /// Dimensions of a plane for a frame of the given size.
    pub fn plane_dimensions(&self, plane: usize, width: u32, height: u32) -> (usize, usize) {
        if plane == 0 {
            return (width as usize, height as usize);
        }
        let (hsub, vsub) = self.chroma_subsampling();
        (
            width.div_ceil(hsub) as usize,
            height.div_ceil(vsub) as usize,
        )
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Yuv420p => "yuv420p",
            Self::Yuv422p => "yuv422p",
            Self::Yuv444p => "yuv444p",
            Self::Gray8 => "gray",
        };
        write!(f, "{}", name)
    }
}

bitflags! {
    /// Frame flags indicating frame properties.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FrameFlags: u32 {
        /// This is a keyframe (I-frame).
        const KEYFRAME = 0x0001;
        /// Encoder must start a new GOP at this frame.
        const FORCED_SYNC = 0x0002;
        /// Interlaced frame.
        const INTERLACED = 0x0008;
        /// Top field first (for interlaced content).
        const TOP_FIELD_FIRST = 0x0010;
        /// Frame was reconstructed as a weighted blend of fields.
        const BLENDED = 0x0020;
    }
}

impl Default for FrameFlags {
    fn default() -> Self {
        Self::empty()
    }
}

/// A buffer for storing planar pixel data.
#[derive(Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel format.
    pub format: PixelFormat,
    planes: Vec<Vec<u8>>,
}

impl FrameBuffer {
    /// Create a new zeroed frame buffer.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let planes = (0..format.num_planes())
            .map(|plane| {
                let (w, h) = format.plane_dimensions(plane, width, height);
                vec![0u8; w * h]
            })
            .collect();

        Self {
            width,
            height,
            format,
            planes,
        }
    }

    /// Get the number of planes.
    pub fn num_planes(&self) -> usize {
        self.planes.len()
    }

    /// Get a plane's data.
    pub fn plane(&self, index: usize) -> Option<&[u8]> {
        self.planes.get(index).map(|p| p.as_slice())
    }

    /// Get a mutable reference to a plane's data.
    pub fn plane_mut(&mut self, index: usize) -> Option<&mut [u8]> {
        self.planes.get_mut(index).map(|p| p.as_mut_slice())
    }

    /// Width and height of a plane.
    pub fn plane_dimensions(&self, plane: usize) -> (usize, usize) {
        self.format.plane_dimensions(plane, self.width, self.height)
    }

    /// Row `y` of a plane.
    pub fn row(&self, plane: usize, y: usize) -> Option<&[u8]> {
        let (w, h) = self.plane_dimensions(plane);
        if y >= h {
            return None;
        }
        self.plane(plane).map(|p| &p[y * w..(y + 1) * w])
    }

    /// Mutable row `y` of a plane.
    pub fn row_mut(&mut self, plane: usize, y: usize) -> Option<&mut [u8]> {
        let (w, h) = self.plane_dimensions(plane);
        if y >= h {
            return None;
        }
        self.plane_mut(plane).map(|p| &mut p[y * w..(y + 1) * w])
    }

    /// Fill all planes with a value.
    pub fn fill(&mut self, value: u8) {
        for plane in &mut self.planes {
            plane.fill(value);
        }
    }

    /// Check whether two buffers can be combined sample by sample.
    pub fn same_layout(&self, other: &FrameBuffer) -> bool {
        self.width == other.width && self.height == other.height && self.format == other.format
    }
}

impl fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("planes", &self.planes.len())
            .finish()
    }
}

/// A decoded video frame tagged with its position in the stream that
/// produced it.
#[derive(Clone)]
pub struct Frame {
    buffer: FrameBuffer,
    /// Frame number in the producing stage's numbering.
    pub index: usize,
    /// Presentation timestamp in ticks.
    pub pts: i64,
    /// Frame duration in ticks.
    pub duration: i64,
    /// Time base of `pts` and `duration`.
    pub time_base: TimeBase,
    /// Frame flags.
    pub flags: FrameFlags,
}

impl Frame {
    /// Create a new zeroed frame.
    pub fn new(width: u32, height: u32, format: PixelFormat, time_base: TimeBase) -> Self {
        Self::from_buffer(FrameBuffer::new(width, height, format), time_base)
    }

    /// Create a frame from an existing buffer.
    pub fn from_buffer(buffer: FrameBuffer, time_base: TimeBase) -> Self {
        Self {
            buffer,
            index: 0,
            pts: 0,
            duration: 0,
            time_base,
            flags: FrameFlags::empty(),
        }
    }

    /// Get the frame width.
    pub fn width(&self) -> u32 {
        self.buffer.width
    }

    /// Get the frame height.
    pub fn height(&self) -> u32 {
        self.buffer.height
    }

    /// Get the pixel format.
    pub fn format(&self) -> PixelFormat {
        self.buffer.format
    }

    /// Check if this is a keyframe.
    pub fn is_keyframe(&self) -> bool {
        self.flags.contains(FrameFlags::KEYFRAME)
    }

    /// Check if an encoder must start a new GOP here.
    pub fn is_forced_sync(&self) -> bool {
        self.flags.contains(FrameFlags::FORCED_SYNC)
    }

    /// Get the frame buffer.
    pub fn buffer(&self) -> &FrameBuffer {
        &self.buffer
    }

    /// Get a mutable reference to the frame buffer.
    pub fn buffer_mut(&mut self) -> &mut FrameBuffer {
        &mut self.buffer
    }

    /// Get a plane's data.
    pub fn plane(&self, index: usize) -> Option<&[u8]> {
        self.buffer.plane(index)
    }

    /// Get a mutable reference to a plane's data.
    pub fn plane_mut(&mut self, index: usize) -> Option<&mut [u8]> {
        self.buffer.plane_mut(index)
    }

    /// Replace the pixel data, keeping timing and flags.
    pub fn with_buffer(mut self, buffer: FrameBuffer) -> Self {
        self.buffer = buffer;
        self
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("index", &self.index)
            .field("width", &self.width())
            .field("height", &self.height())
            .field("format", &self.format())
            .field("pts", &self.pts)
            .field("duration", &self.duration)
            .field("flags", &self.flags)
            .finish()
    }
}
