//! Dense matrices for the cadence field model.

use crate::pattern::{Parity, Pattern};
use std::fmt;

const SINGULAR_EPSILON: f64 = 1e-9;

/// Row-major dense matrix.
#[derive(Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    /// Zero matrix.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Identity matrix.
    pub fn identity(n: usize) -> Self {
        let mut m = Self::zeros(n, n);
        for i in 0..n {
            m.set(i, i, 1.0);
        }
        m
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Entry at `(r, c)`.
    pub fn get(&self, r: usize, c: usize) -> f64 {
        self.data[r * self.cols + c]
    }

    /// Set entry `(r, c)`.
    pub fn set(&mut self, r: usize, c: usize, value: f64) {
        self.data[r * self.cols + c] = value;
    }

    /// Row `r`.
    pub fn row(&self, r: usize) -> &[f64] {
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    /// Transpose.
    pub fn transpose(&self) -> Matrix {
        let mut t = Matrix::zeros(self.cols, self.rows);
        for r in 0..self.rows {
            for c in 0..self.cols {
                t.set(c, r, self.get(r, c));
            }
        }
        t
    }

    /// Matrix product `self * rhs`.
    ///
    /// # Panics
    ///
    /// Panics if the inner dimensions differ.
    pub fn mul(&self, rhs: &Matrix) -> Matrix {
        assert_eq!(self.cols, rhs.rows, "inner dimensions differ");
        let mut out = Matrix::zeros(self.rows, rhs.cols);
        for r in 0..self.rows {
            for k in 0..self.cols {
                let a = self.get(r, k);
                if a == 0.0 {
                    continue;
                }
                for c in 0..rhs.cols {
                    out.data[r * rhs.cols + c] += a * rhs.get(k, c);
                }
            }
        }
        out
    }

    /// Sub-matrix made of the given rows and columns, in the given order.
    pub fn select(&self, rows: &[usize], cols: &[usize]) -> Matrix {
        let mut out = Matrix::zeros(rows.len(), cols.len());
        for (i, &r) in rows.iter().enumerate() {
            for (j, &c) in cols.iter().enumerate() {
                out.set(i, j, self.get(r, c));
            }
        }
        out
    }

    /// Inverse of a square matrix by Gauss-Jordan elimination with partial
    /// pivoting. `None` if the matrix is singular or not square.
    pub fn inverse(&self) -> Option<Matrix> {
        if self.rows != self.cols {
            return None;
        }
        let n = self.rows;
        let mut a = self.clone();
        let mut inv = Matrix::identity(n);

        for col in 0..n {
            let pivot = (col..n).max_by(|&x, &y| {
                a.get(x, col).abs().total_cmp(&a.get(y, col).abs())
            })?;
            if a.get(pivot, col).abs() < SINGULAR_EPSILON {
                return None;
            }
            a.swap_rows(col, pivot);
            inv.swap_rows(col, pivot);

            let scale = a.get(col, col);
            for c in 0..n {
                a.set(col, c, a.get(col, c) / scale);
                inv.set(col, c, inv.get(col, c) / scale);
            }
            for r in 0..n {
                if r == col {
                    continue;
                }
                let factor = a.get(r, col);
                if factor == 0.0 {
                    continue;
                }
                for c in 0..n {
                    a.set(r, c, a.get(r, c) - factor * a.get(col, c));
                    inv.set(r, c, inv.get(r, c) - factor * inv.get(col, c));
                }
            }
        }
        Some(inv)
    }

    /// Least-squares left inverse `(MᵗM)⁻¹Mᵗ`. `None` when the columns are
    /// linearly dependent.
    pub fn left_inverse(&self) -> Option<Matrix> {
        let t = self.transpose();
        Some(t.mul(self).inverse()?.mul(&t))
    }

    fn swap_rows(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        for c in 0..self.cols {
            self.data.swap(a * self.cols + c, b * self.cols + c);
        }
    }
}

impl fmt::Debug for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Matrix {}x{}", self.rows, self.cols)?;
        for r in 0..self.rows {
            writeln!(f, "  {:?}", self.row(r))?;
        }
        Ok(())
    }
}

/// Field model of one cadence block.
///
/// Row `2j + p` is field `p` of telecined frame `j`; column `l` is the
/// reconstructed frame labelled `l`. A frame whose two fields share a
/// label is a clean copy of it; a frame mixing two labels is modelled as
/// an even blend of both, on each of its fields.
pub fn forward_matrix(pattern: &Pattern) -> Matrix {
    let k = pattern.old_blksize();
    let mut m = Matrix::zeros(2 * k, pattern.new_blksize());
    for j in 0..k {
        let even = pattern.label(j, Parity::Even);
        let odd = pattern.label(j, Parity::Odd);
        for parity in Parity::BOTH {
            let row = 2 * j + parity.index();
            if even == odd {
                m.set(row, even, 1.0);
            } else {
                m.set(row, even, 0.5);
                m.set(row, odd, 0.5);
            }
        }
    }
    m
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: &Matrix, b: &Matrix) {
        assert_eq!((a.rows(), a.cols()), (b.rows(), b.cols()));
        for r in 0..a.rows() {
            for c in 0..a.cols() {
                assert!(
                    (a.get(r, c) - b.get(r, c)).abs() < 1e-9,
                    "entry ({}, {}): {} vs {}",
                    r,
                    c,
                    a.get(r, c),
                    b.get(r, c)
                );
            }
        }
    }

    #[test]
    fn test_inverse() {
        let mut m = Matrix::zeros(2, 2);
        m.set(0, 0, 0.0);
        m.set(0, 1, 2.0);
        m.set(1, 0, 4.0);
        m.set(1, 1, 1.0);
        let inv = m.inverse().unwrap();
        assert_close(&m.mul(&inv), &Matrix::identity(2));
    }

    #[test]
    fn test_singular() {
        let mut m = Matrix::zeros(2, 2);
        m.set(0, 0, 0.5);
        m.set(0, 1, 0.5);
        m.set(1, 0, 0.5);
        m.set(1, 1, 0.5);
        assert!(m.inverse().is_none());
        assert!(m.left_inverse().is_none());
        assert!(Matrix::zeros(2, 3).inverse().is_none());
    }

    #[test]
    fn test_forward_matrix_three_two() {
        let p = Pattern::parse("AABBBCCDDD").unwrap();
        let m = forward_matrix(&p);
        assert_eq!((m.rows(), m.cols()), (10, 4));
        assert_eq!(m.row(0), &[1.0, 0.0, 0.0, 0.0]);
        assert_eq!(m.row(4), &[0.0, 0.5, 0.5, 0.0]);
        assert_eq!(m.row(7), &[0.0, 0.0, 0.5, 0.5]);
    }

    #[test]
    fn test_left_inverse_recovers_frames() {
        let p = Pattern::parse("AABBBCCDDD").unwrap();
        let m = forward_matrix(&p);
        let w = m.left_inverse().unwrap();
        assert_eq!((w.rows(), w.cols()), (4, 10));
        assert_close(&w.mul(&m), &Matrix::identity(4));
    }

    #[test]
    fn test_single_frame_blend_weights() {
        let m = forward_matrix(&Pattern::parse("AA").unwrap());
        let w = m.left_inverse().unwrap();
        assert_eq!(w.row(0), &[0.5, 0.5]);
    }

    #[test]
    fn test_truncated_block() {
        let m = forward_matrix(&Pattern::parse("AABBBCCDDD").unwrap());
        // Only the B/C frame is present: both labels are inseparable.
        let lone = m.select(&[4, 5], &[1, 2]);
        assert!(lone.left_inverse().is_none());
        // Frames 1..5 determine B, C and D.
        let tail = m.select(&[2, 3, 4, 5, 6, 7, 8, 9], &[1, 2, 3]);
        let w = tail.left_inverse().unwrap();
        assert_close(&w.mul(&tail), &Matrix::identity(3));
    }
}
