//! Frame index maps between pipeline stages.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// Sentinel for "no corresponding frame".
pub const NO_FRAME: i64 = -1;

/// An immutable, cheaply cloneable array translating frame indices of one
/// stage into another's numbering.
///
/// Entries are either a valid index in the target numbering or
/// [`NO_FRAME`]. Lookups past the end also yield [`NO_FRAME`].
#[derive(Clone, PartialEq, Eq)]
pub struct IndexMap(Arc<[i64]>);

impl IndexMap {
    /// Identity map over `len` frames.
    pub fn identity(len: usize) -> Self {
        Self((0..len as i64).collect())
    }

    /// Map with no entries.
    pub fn empty() -> Self {
        Self(Arc::from(Vec::new()))
    }

    /// Entry `n`, or [`NO_FRAME`] when out of range.
    pub fn get(&self, n: i64) -> i64 {
        if n < 0 {
            return NO_FRAME;
        }
        self.0.get(n as usize).copied().unwrap_or(NO_FRAME)
    }

    /// Entry `n` as an index, `None` for the sentinel.
    pub fn lookup(&self, n: usize) -> Option<usize> {
        match self.0.get(n).copied() {
            Some(v) if v >= 0 => Some(v as usize),
            _ => None,
        }
    }

    /// Apply `inner` first and then `self`.
    ///
    /// The result has one entry per entry of `inner`; the sentinel
    /// propagates through either map.
    pub fn compose(&self, inner: &IndexMap) -> IndexMap {
        inner
            .0
            .iter()
            .map(|&m| if m == NO_FRAME { NO_FRAME } else { self.get(m) })
            .collect()
    }

    /// Check whether this is the identity over its own length.
    pub fn is_identity(&self) -> bool {
        self.0.iter().enumerate().all(|(i, &v)| v == i as i64)
    }

    /// Borrow the raw entries.
    pub fn as_slice(&self) -> &[i64] {
        &self.0
    }
}

impl Deref for IndexMap {
    type Target = [i64];

    fn deref(&self) -> &[i64] {
        &self.0
    }
}

impl From<Vec<i64>> for IndexMap {
    fn from(v: Vec<i64>) -> Self {
        Self(Arc::from(v))
    }
}

impl FromIterator<i64> for IndexMap {
    fn from_iter<I: IntoIterator<Item = i64>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Debug for IndexMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}
