//! Pulldown zones: cadence reconstruction over a range of frames.

use crate::cadence::Cadence;
use crate::field::{blend_plane, weave_plane};
use crate::matrix::{forward_matrix, Matrix};
use crate::pattern::{Parity, Pattern};
use framemap_core::{Error, Frame, FrameBuffer, FrameFlags, Rational, Result, NO_FRAME};
use framemap_pipeline::durations_from_pts;
use framemap_zones::{ZoneContext, ZoneKind, ZoneMaps, ZoneProcessor, ZonedFilter};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::sync::Arc;
use tracing::{trace, warn};

/// A zoned filter reversing telecine cadences.
pub type PulldownFilter = ZonedFilter<PulldownZone>;

/// Parameters of one pulldown zone.
///
/// Deserialized zones are validated like constructed ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ZoneConfig")]
pub struct PulldownZone {
    pattern: Pattern,
    /// Position of the zone's first frame within the pattern block.
    offset: usize,
    blend_luma: bool,
    blend_chroma: bool,
}

/// Unchecked zone parameters as read from a configuration.
#[derive(Deserialize)]
struct ZoneConfig {
    pattern: Pattern,
    #[serde(default)]
    offset: usize,
    #[serde(default)]
    blend_luma: bool,
    #[serde(default)]
    blend_chroma: bool,
}

impl TryFrom<ZoneConfig> for PulldownZone {
    type Error = Error;

    fn try_from(config: ZoneConfig) -> Result<Self> {
        let zone = Self {
            pattern: config.pattern,
            offset: config.offset,
            blend_luma: config.blend_luma,
            blend_chroma: config.blend_chroma,
        };
        zone.validate()?;
        Ok(zone)
    }
}

impl Default for PulldownZone {
    fn default() -> Self {
        Self {
            pattern: Pattern::progressive(),
            offset: 0,
            blend_luma: false,
            blend_chroma: false,
        }
    }
}

impl PulldownZone {
    /// Zone reconstructing `pattern` from its first frame, without blending.
    pub fn new(pattern: &str) -> Result<Self> {
        Ok(Self {
            pattern: Pattern::parse(pattern)?,
            ..Self::default()
        })
    }

    /// Set the offset into the pattern block.
    pub fn with_offset(mut self, offset: usize) -> Result<Self> {
        self.set_offset(offset)?;
        Ok(self)
    }

    /// Enable blended reconstruction on luma and/or chroma.
    pub fn with_blend(mut self, luma: bool, chroma: bool) -> Result<Self> {
        self.set_blend(luma, chroma)?;
        Ok(self)
    }

    /// Cadence pattern.
    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// Offset into the pattern block.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Blend luma.
    pub fn blend_luma(&self) -> bool {
        self.blend_luma
    }

    /// Blend chroma.
    pub fn blend_chroma(&self) -> bool {
        self.blend_chroma
    }

    /// Check whether any plane is blended.
    pub fn is_blended(&self) -> bool {
        self.blend_luma || self.blend_chroma
    }

    /// Change the pattern. Fails, leaving the zone unchanged, if the
    /// current offset or blend mode does not fit the new pattern.
    pub fn set_pattern(&mut self, pattern: &str) -> Result<()> {
        let candidate = Self {
            pattern: Pattern::parse(pattern)?,
            ..self.clone()
        };
        candidate.validate()?;
        *self = candidate;
        Ok(())
    }

    /// Change the offset into the pattern block.
    pub fn set_offset(&mut self, offset: usize) -> Result<()> {
        let candidate = Self {
            offset,
            ..self.clone()
        };
        candidate.validate()?;
        *self = candidate;
        Ok(())
    }

    /// Change the blend mode.
    pub fn set_blend(&mut self, luma: bool, chroma: bool) -> Result<()> {
        let candidate = Self {
            blend_luma: luma,
            blend_chroma: chroma,
            ..self.clone()
        };
        candidate.validate()?;
        *self = candidate;
        Ok(())
    }

    /// Lay the pattern over a zone of `len` frames.
    pub fn cadence(&self, len: usize) -> Cadence<'_> {
        Cadence::new(&self.pattern, self.offset, len)
    }

    /// Field model of one full block.
    pub fn forward_matrix(&self) -> Matrix {
        forward_matrix(&self.pattern)
    }

    fn blends_plane(&self, plane: usize) -> bool {
        if plane == 0 {
            self.blend_luma
        } else {
            self.blend_chroma
        }
    }

    /// Reconstruction weights for one block: rows are the block's output
    /// frames, columns its fields in order. `None` when the fields present
    /// cannot separate the outputs.
    fn block_weights(
        &self,
        cadence: &Cadence<'_>,
        frames: &Range<usize>,
        outputs: &Range<usize>,
        full: Option<&Matrix>,
    ) -> Option<Matrix> {
        let k = self.pattern.old_blksize();
        let nb = self.pattern.new_blksize();
        if frames.len() == k && outputs.len() == nb {
            return full.cloned();
        }
        let rows: Vec<usize> = frames
            .clone()
            .flat_map(|i| {
                let j = cadence.position_in_block(i);
                Parity::BOTH.map(|p| 2 * j + p.index())
            })
            .collect();
        let cols: Vec<usize> = outputs
            .clone()
            .filter_map(|m| cadence.label_of(m).map(|g| g % nb))
            .collect();
        forward_matrix(&self.pattern).select(&rows, &cols).left_inverse()
    }
}

/// Reconstruction plan of one block.
#[derive(Debug, Clone)]
pub struct BlockPlan {
    /// Local telecined frames of the block present in the zone.
    pub frames: Range<usize>,
    /// Local reconstructed frames of the block.
    pub outputs: Range<usize>,
    /// Blend weights, `None` for exact field copies.
    pub weights: Option<Matrix>,
}

/// Per-zone data computed with the maps.
#[derive(Debug, Clone)]
pub struct PulldownPlan {
    /// Even and odd field rebuilding each reconstructed frame.
    pub fields: Vec<(i64, i64)>,
    /// One plan per block touched by the zone.
    pub blocks: Vec<BlockPlan>,
}

impl PulldownPlan {
    /// Block producing reconstructed frame `m`.
    pub fn block_of_output(&self, m: usize) -> Option<usize> {
        let b = self.blocks.partition_point(|b| b.outputs.end <= m);
        (b < self.blocks.len() && self.blocks[b].outputs.contains(&m)).then_some(b)
    }
}

/// Upstream pts at fractional local frame `x`, interpolated linearly and
/// clamped to the zone.
fn interpolate_pts(pts: &[i64], end_pts: i64, x: Rational) -> i64 {
    let Some(&first) = pts.first() else {
        return end_pts;
    };
    if x <= Rational::zero() {
        return first;
    }
    let i = (x.floor() as usize).min(pts.len() - 1);
    let frac = (x - Rational::from_int(i as i64)).min(Rational::one());
    let next = pts.get(i + 1).copied().unwrap_or(end_pts);
    pts[i] + frac.mul_int(next - pts[i]).round()
}

impl ZoneKind for PulldownZone {
    type Shared = ();
    type Plan = PulldownPlan;

    fn validate(&self) -> Result<()> {
        let k = self.pattern.old_blksize();
        if self.offset >= k {
            return Err(Error::config(format!(
                "offset {} is outside pattern {} of {} frames",
                self.offset, self.pattern, k
            )));
        }
        if self.is_blended() && !self.pattern.is_blend_compatible() {
            return Err(Error::config(format!(
                "pattern {} cannot be blended, it must start with AA",
                self.pattern
            )));
        }
        Ok(())
    }

    fn split(&self, at: usize) -> Self {
        Self {
            offset: (self.offset + at) % self.pattern.old_blksize(),
            ..self.clone()
        }
    }

    fn compute(&self, ctx: &ZoneContext<'_, Self>) -> Result<ZoneMaps<PulldownPlan>> {
        let len = ctx.len();
        let cadence = self.cadence(len);
        let k = self.pattern.old_blksize() as i64;
        let nb = self.pattern.new_blksize() as i64;

        let fields = cadence.reverse_mapping();
        let reverse: Vec<i64> = fields
            .iter()
            .map(|&(even, odd)| match (even, odd) {
                (NO_FRAME, NO_FRAME) => NO_FRAME,
                (NO_FRAME, odd) => odd / 2,
                (even, _) => even / 2,
            })
            .collect();
        let mut forward = vec![NO_FRAME; len];
        for (m, &n) in reverse.iter().enumerate() {
            if n >= 0 && forward[n as usize] == NO_FRAME {
                forward[n as usize] = m as i64;
            }
        }

        let upstream = ctx.upstream_pts()?;
        let end_pts = ctx.upstream_end_pts()?;
        let offset = self.offset as i64;
        let pts: Vec<i64> = (0..cadence.new_len())
            .filter_map(|m| cadence.label_of(m))
            .map(|g| {
                let x = Rational::new(g as i64 * k - offset * nb, nb);
                interpolate_pts(&upstream, end_pts, x)
            })
            .collect();
        let durations = durations_from_pts(&pts, end_pts);

        let full = if self.is_blended() {
            self.forward_matrix().left_inverse()
        } else {
            None
        };
        let blocks = (0..cadence.block_count())
            .map(|b| {
                let frames = cadence.block_frames(b);
                let outputs = cadence.block_outputs(b);
                let weights = if self.is_blended() {
                    let weights = self.block_weights(&cadence, &frames, &outputs, full.as_ref());
                    if weights.is_none() {
                        warn!(
                            pattern = %self.pattern,
                            block = b,
                            frames = ?frames,
                            "singular field matrix, copying fields instead of blending"
                        );
                    }
                    weights
                } else {
                    None
                };
                BlockPlan {
                    frames,
                    outputs,
                    weights,
                }
            })
            .collect();

        Ok(ZoneMaps {
            forward,
            reverse,
            pts,
            durations,
            plan: PulldownPlan { fields, blocks },
        })
    }

    fn upstream_range(
        &self,
        ctx: &ZoneContext<'_, Self>,
        maps: &ZoneMaps<PulldownPlan>,
        start: usize,
        end: usize,
    ) -> Range<usize> {
        let plan = &maps.plan;
        let first = plan.block_of_output(start);
        let last = end.checked_sub(1).and_then(|m| plan.block_of_output(m));
        match (first, last) {
            (Some(first), Some(last)) if start < end => {
                ctx.src.start + plan.blocks[first].frames.start
                    ..ctx.src.start + plan.blocks[last].frames.end
            }
            _ => ctx.src.end..ctx.src.end,
        }
    }

    fn processor<'a>(
        &'a self,
        ctx: ZoneContext<'a, Self>,
        maps: Arc<ZoneMaps<PulldownPlan>>,
    ) -> Result<Box<dyn ZoneProcessor + Send + 'a>> {
        Ok(Box::new(PulldownProcessor {
            zone: self,
            src_start: ctx.src.start,
            maps,
            block: None,
            buffer: Vec::new(),
        }))
    }
}

/// Buffers one block of telecined frames and rebuilds its outputs.
struct PulldownProcessor<'a> {
    zone: &'a PulldownZone,
    src_start: usize,
    maps: Arc<ZoneMaps<PulldownPlan>>,
    block: Option<usize>,
    buffer: Vec<Option<Frame>>,
}

impl PulldownProcessor<'_> {
    fn block_of(&self, local: usize) -> Option<usize> {
        let blocks = &self.maps.plan.blocks;
        let b = blocks.partition_point(|b| b.frames.end <= local);
        (b < blocks.len()).then_some(b)
    }

    fn buffered(&self, block: &BlockPlan, field: i64) -> Option<(&Frame, Parity)> {
        if field < 0 {
            return None;
        }
        let field = field as usize;
        let local = (field / 2).checked_sub(block.frames.start)?;
        let frame = self.buffer.get(local)?.as_ref()?;
        Some((frame, Parity::of_field(field)))
    }

    fn emit(&mut self) -> Vec<Frame> {
        let Some(b) = self.block.take() else {
            return Vec::new();
        };
        let block = &self.maps.plan.blocks[b];
        let frames = block
            .outputs
            .clone()
            .filter_map(|m| self.render(block, m))
            .collect();
        self.buffer.clear();
        frames
    }

    fn render(&self, block: &BlockPlan, m: usize) -> Option<Frame> {
        let (even, odd) = self.maps.plan.fields[m];
        let even = self.buffered(block, even);
        let odd = self.buffered(block, odd);
        let Some((template, _)) = even.or(odd) else {
            trace!(output = m, "fields missing from block, skipping frame");
            return None;
        };

        let mut buffer = FrameBuffer::new(template.width(), template.height(), template.format());
        let blend = block
            .weights
            .as_ref()
            .filter(|_| self.buffer.iter().all(Option::is_some));
        let mut blended = false;
        for plane in 0..buffer.num_planes() {
            match blend {
                Some(weights) if self.zone.blends_plane(plane) => {
                    let row = m - block.outputs.start;
                    let fields: Vec<(&FrameBuffer, Parity, f64)> = self
                        .buffer
                        .iter()
                        .flatten()
                        .flat_map(|f| Parity::BOTH.map(|p| (f.buffer(), p)))
                        .enumerate()
                        .map(|(c, (buf, p))| (buf, p, weights.get(row, c)))
                        .collect();
                    blend_plane(&mut buffer, plane, &fields);
                    blended = true;
                }
                _ => weave_plane(
                    &mut buffer,
                    plane,
                    even.map(|(f, _)| f.buffer()),
                    odd.map(|(f, _)| f.buffer()),
                ),
            }
        }

        let mut frame = template.clone().with_buffer(buffer);
        frame.index = m;
        frame.pts = self.maps.pts[m];
        frame.duration = self.maps.durations[m];
        frame.flags.remove(FrameFlags::INTERLACED | FrameFlags::TOP_FIELD_FIRST);
        frame.flags.set(FrameFlags::BLENDED, blended);
        Some(frame)
    }
}

impl ZoneProcessor for PulldownProcessor<'_> {
    fn push(&mut self, frame: Frame) -> Result<Vec<Frame>> {
        let Some(local) = frame.index.checked_sub(self.src_start) else {
            return Ok(Vec::new());
        };
        let Some(b) = self.block_of(local) else {
            return Ok(Vec::new());
        };
        let out = if self.block != Some(b) {
            let out = self.emit();
            self.block = Some(b);
            self.buffer = vec![None; self.maps.plan.blocks[b].frames.len()];
            out
        } else {
            Vec::new()
        };
        let slot = local - self.maps.plan.blocks[b].frames.start;
        self.buffer[slot] = Some(frame);
        Ok(out)
    }

    fn flush(&mut self) -> Result<Vec<Frame>> {
        Ok(self.emit())
    }
}
