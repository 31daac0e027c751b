//! Field weaving and blending on planar buffers.

use crate::pattern::Parity;
use framemap_core::FrameBuffer;

/// Source row of a field line-doubled to full height: output row `y`
/// shows field line `y / 2`.
pub fn field_row(y: usize, parity: Parity, height: usize) -> usize {
    let row = (y & !1) | parity.index();
    if row < height {
        row
    } else if row >= 2 {
        row - 2
    } else {
        height.saturating_sub(1)
    }
}

/// Fill `plane` of `out` by weaving two fields. A missing field is
/// replaced by line-doubling the other one; with neither, the plane is
/// left untouched.
pub fn weave_plane(
    out: &mut FrameBuffer,
    plane: usize,
    even: Option<&FrameBuffer>,
    odd: Option<&FrameBuffer>,
) {
    let (_, height) = out.plane_dimensions(plane);
    for y in 0..height {
        let preferred = if y % 2 == 0 {
            even.map(|b| (b, Parity::Even)).or(odd.map(|b| (b, Parity::Odd)))
        } else {
            odd.map(|b| (b, Parity::Odd)).or(even.map(|b| (b, Parity::Even)))
        };
        let Some((src, parity)) = preferred else {
            return;
        };
        let sy = field_row(y, parity, height);
        if let (Some(from), Some(to)) = (src.row(plane, sy), out.row_mut(plane, y)) {
            to.copy_from_slice(from);
        }
    }
}

/// Fill `plane` of `out` with a weighted sum of line-doubled fields,
/// rounded and clamped to 8 bits.
pub fn blend_plane(out: &mut FrameBuffer, plane: usize, fields: &[(&FrameBuffer, Parity, f64)]) {
    let (width, height) = out.plane_dimensions(plane);
    let mut acc = vec![0.0f64; width];
    for y in 0..height {
        acc.fill(0.0);
        for &(src, parity, weight) in fields {
            if weight == 0.0 {
                continue;
            }
            if let Some(row) = src.row(plane, field_row(y, parity, height)) {
                for (a, &v) in acc.iter_mut().zip(row) {
                    *a += weight * v as f64;
                }
            }
        }
        if let Some(to) = out.row_mut(plane, y) {
            for (t, &a) in to.iter_mut().zip(&acc) {
                *t = a.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
}
