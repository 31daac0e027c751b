//! Inverse telecine for the framemap pipeline.
//!
//! A [`PulldownFilter`] holds one [`PulldownZone`] per run of frames
//! sharing a cadence. Each zone lays its [`Pattern`] over its frames,
//! regroups their fields into the frames they were telecined from and
//! retimes them evenly across the zone.
//!
//! ```no_run
//! use framemap_pulldown::{PulldownFilter, PulldownZone};
//!
//! # fn main() -> framemap_core::Result<()> {
//! let mut filter = PulldownFilter::new("ivtc", PulldownZone::new("AABBBCCDDD")?, ())?;
//! // A cut at frame 1000 lands in the middle of a block.
//! filter.insert_zone_with(1000, PulldownZone::new("AABBBCCDDD")?.with_offset(3)?)?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod cadence;
mod field;
mod matrix;
mod pattern;
mod zone;

pub use cadence::Cadence;
pub use field::{blend_plane, field_row, weave_plane};
pub use matrix::{forward_matrix, Matrix};
pub use pattern::{Parity, Pattern};
pub use zone::{BlockPlan, PulldownFilter, PulldownPlan, PulldownZone};
