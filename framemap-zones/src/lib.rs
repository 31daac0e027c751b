//! Zone-partitioned filters for the framemap pipeline.
//!
//! A [`ZonedFilter`] splits its upstream frame range into contiguous,
//! non-overlapping zones kept sorted by first upstream frame. Each zone
//! carries its own parameters (a [`ZoneKind`]) and caches its own local
//! index maps; the filter's maps are the concatenation of its zones'.

mod filter;
mod zone;

pub use filter::{ZoneMut, ZonedFilter};
pub use zone::{MappedProcessor, Zone, ZoneContext, ZoneKind, ZoneMaps, ZoneProcessor};
