//! Core types for the framemap frame-index and timestamp remapping engine.
//!
//! This crate provides the fundamental types shared by every pipeline stage:
//! - Exact rational time arithmetic and frame positions
//! - Planar frame buffers with field-friendly row access
//! - Index maps with the `NO_FRAME` sentinel
//! - The [`FrameSource`] contract consumed at the root of a pipeline

#![warn(missing_docs)]

pub mod error;
pub mod frame;
pub mod index_map;
pub mod rational;
pub mod source;
pub mod timestamp;

pub use error::{Error, Result};
pub use frame::{Frame, FrameBuffer, FrameFlags, PixelFormat};
pub use index_map::{IndexMap, NO_FRAME};
pub use rational::Rational;
pub use source::{FrameIter, FrameSource, MemorySource, StreamInfo};
pub use timestamp::{Position, TimeBase};
