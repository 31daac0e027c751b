//! Field-level mapping between a telecined zone and its reconstruction.

use crate::pattern::{Parity, Pattern};
use framemap_core::NO_FRAME;
use std::ops::Range;

/// A pattern laid over `len` telecined frames, starting `offset` frames
/// into its first block.
///
/// Field `f` is field `f % 2` (even, odd) of local frame `f / 2`. Every
/// field carries a global label `block * new_blksize + label`; the
/// distinct global labels, in order, are the zone's reconstructed
/// frames.
#[derive(Debug, Clone)]
pub struct Cadence<'p> {
    pattern: &'p Pattern,
    offset: usize,
    len: usize,
    labels: Vec<usize>,
}

impl<'p> Cadence<'p> {
    /// Lay `pattern` over `len` frames.
    pub fn new(pattern: &'p Pattern, offset: usize, len: usize) -> Self {
        let mut cadence = Self {
            pattern,
            offset,
            len,
            labels: Vec::new(),
        };
        let mut labels: Vec<usize> = (0..len)
            .flat_map(|i| Parity::BOTH.map(|p| cadence.global_label(i, p)))
            .collect();
        labels.sort_unstable();
        labels.dedup();
        cadence.labels = labels;
        cadence
    }

    /// Pattern in use.
    pub fn pattern(&self) -> &'p Pattern {
        self.pattern
    }

    /// Number of telecined frames.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the zone is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of reconstructed frames.
    pub fn new_len(&self) -> usize {
        self.labels.len()
    }

    /// Block containing local frame `i`.
    pub fn block_of(&self, i: usize) -> usize {
        (i + self.offset) / self.pattern.old_blksize()
    }

    /// Number of blocks touched by the zone.
    pub fn block_count(&self) -> usize {
        if self.len == 0 {
            0
        } else {
            self.block_of(self.len - 1) + 1
        }
    }

    /// Local frames of block `b` present in the zone.
    pub fn block_frames(&self, b: usize) -> Range<usize> {
        let k = self.pattern.old_blksize();
        let start = (b * k).saturating_sub(self.offset).min(self.len);
        let end = ((b + 1) * k).saturating_sub(self.offset).min(self.len);
        start..end
    }

    /// Position of local frame `i` within its block.
    pub fn position_in_block(&self, i: usize) -> usize {
        (i + self.offset) % self.pattern.old_blksize()
    }

    /// Global label of field `parity` of local frame `i`.
    pub fn global_label(&self, i: usize, parity: Parity) -> usize {
        self.block_of(i) * self.pattern.new_blksize()
            + self.pattern.label(self.position_in_block(i), parity)
    }

    /// Global label of reconstructed frame `m`.
    pub fn label_of(&self, m: usize) -> Option<usize> {
        self.labels.get(m).copied()
    }

    /// Reconstructed frames of block `b`.
    pub fn block_outputs(&self, b: usize) -> Range<usize> {
        let nb = self.pattern.new_blksize();
        let start = self.labels.partition_point(|&g| g < b * nb);
        let end = self.labels.partition_point(|&g| g < (b + 1) * nb);
        start..end
    }

    /// Reconstructed frame fed by field `f`, or `NO_FRAME` past the zone.
    pub fn translate_fields(&self, f: usize) -> i64 {
        let i = f / 2;
        if i >= self.len {
            return NO_FRAME;
        }
        let g = self.global_label(i, Parity::of_field(f));
        match self.labels.binary_search(&g) {
            Ok(m) => m as i64,
            Err(_) => NO_FRAME,
        }
    }

    /// Even and odd field chosen to rebuild frame `m`, `NO_FRAME` for a
    /// parity with no field in the zone.
    ///
    /// A telecined frame carrying both fields of `m` wins; otherwise the
    /// closest even/odd pair; otherwise the lone field available.
    pub fn backtranslate_fields(&self, m: usize) -> (i64, i64) {
        let Some(g) = self.label_of(m) else {
            return (NO_FRAME, NO_FRAME);
        };
        let nb = self.pattern.new_blksize();
        let frames = self.block_frames(g / nb);
        let label = g % nb;
        let position = |i: usize, p| self.pattern.label(self.position_in_block(i), p) == label;

        let evens: Vec<usize> = frames.clone().filter(|&i| position(i, Parity::Even)).collect();
        let odds: Vec<usize> = frames.filter(|&i| position(i, Parity::Odd)).collect();

        if let Some(&i) = evens.iter().find(|i| odds.contains(i)) {
            return (2 * i as i64, 2 * i as i64 + 1);
        }
        let pair = evens
            .iter()
            .flat_map(|&e| odds.iter().map(move |&o| (e, o)))
            .min_by_key(|&(e, o)| (e.abs_diff(o), e.min(o)));
        match (pair, evens.first(), odds.first()) {
            (Some((e, o)), _, _) => (2 * e as i64, 2 * o as i64 + 1),
            (None, Some(&e), None) => (2 * e as i64, NO_FRAME),
            (None, None, Some(&o)) => (NO_FRAME, 2 * o as i64 + 1),
            _ => (NO_FRAME, NO_FRAME),
        }
    }

    /// [`backtranslate_fields`](Self::backtranslate_fields) for every
    /// reconstructed frame.
    pub fn reverse_mapping(&self) -> Vec<(i64, i64)> {
        (0..self.new_len())
            .map(|m| self.backtranslate_fields(m))
            .collect()
    }
}
