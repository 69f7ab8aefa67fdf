//! Contiguous matrix helpers.
//!
//! The training loop operates on slices to avoid per-step allocations. `Matrix`
//! provides validated, row-major storage for feature/target matrices and
//! `MatrixView` a borrowed, possibly strided window into one.

use rand::Rng;

use crate::{Error, Result};

/// An owned row-major matrix of `f64`.
///
/// Stored as a contiguous buffer:
/// - `data.len() == rows * cols`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Matrix {
    data: Vec<f64>,
    rows: usize,
    cols: usize,
}

/// A borrowed `(rows, cols)` window whose rows start `row_stride` elements apart.
///
/// Element `(r, c)` lives at `data[r * row_stride + c]`.
#[derive(Debug, Clone, Copy)]
pub struct MatrixView<'a> {
    data: &'a [f64],
    rows: usize,
    cols: usize,
    row_stride: usize,
}

impl Matrix {
    /// A `(rows, cols)` matrix filled with zeros.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            data: vec![0.0; rows * cols],
            rows,
            cols,
        }
    }

    /// Build a matrix from a flat row-major buffer with `cols` columns.
    pub fn from_flat(data: Vec<f64>, cols: usize) -> Result<Self> {
        if cols == 0 {
            return Err(Error::InvalidData("cols must be > 0".to_owned()));
        }
        if !data.len().is_multiple_of(cols) {
            return Err(Error::InvalidData(format!(
                "buffer length {} is not divisible by cols {}",
                data.len(),
                cols
            )));
        }

        let rows = data.len() / cols;
        Ok(Self { data, rows, cols })
    }

    /// Build a matrix from per-sample rows.
    ///
    /// This is a convenience constructor (it copies into contiguous storage).
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        if rows.is_empty() {
            return Err(Error::InvalidData("rows must not be empty".to_owned()));
        }

        let cols = rows[0].len();
        if cols == 0 {
            return Err(Error::InvalidData("cols must be > 0".to_owned()));
        }

        for (i, row) in rows.iter().enumerate() {
            if row.len() != cols {
                return Err(Error::InvalidData(format!(
                    "row {i} has len {}, expected {cols}",
                    row.len()
                )));
            }
        }

        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            data.extend_from_slice(row);
        }

        Ok(Self {
            data,
            rows: rows.len(),
            cols,
        })
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Returns row `r`.
    ///
    /// Panics if `r >= rows`.
    #[inline]
    pub fn row(&self, r: usize) -> &[f64] {
        let start = r * self.cols;
        &self.data[start..start + self.cols]
    }

    #[inline]
    pub fn get(&self, r: usize, c: usize) -> f64 {
        assert!(r < self.rows && c < self.cols, "index ({r}, {c}) out of bounds");
        self.data[r * self.cols + c]
    }

    #[inline]
    pub fn set(&mut self, r: usize, c: usize, value: f64) {
        assert!(r < self.rows && c < self.cols, "index ({r}, {c}) out of bounds");
        self.data[r * self.cols + c] = value;
    }

    #[inline]
    pub fn view(&self) -> MatrixView<'_> {
        MatrixView::new(&self.data, self.rows, self.cols, self.cols)
    }

    /// Zero-copy view of rows `start..end`.
    #[inline]
    pub fn slice_rows(&self, start: usize, end: usize) -> MatrixView<'_> {
        assert!(
            start <= end && end <= self.rows,
            "row range {start}..{end} out of bounds for {} rows",
            self.rows
        );
        MatrixView::new(
            &self.data[start * self.cols..end * self.cols],
            end - start,
            self.cols,
            self.cols,
        )
    }

    /// Change the logical shape, keeping the allocation when it is large enough.
    pub(crate) fn reshape_for(&mut self, rows: usize, cols: usize) {
        self.data.resize(rows * cols, 0.0);
        self.rows = rows;
        self.cols = cols;
    }

    /// Overwrite `self` with the contents of `src`, reusing the allocation.
    pub(crate) fn copy_from_view(&mut self, src: MatrixView<'_>) {
        self.reshape_for(src.rows(), src.cols());
        for r in 0..src.rows() {
            let start = r * self.cols;
            self.data[start..start + self.cols].copy_from_slice(src.row(r));
        }
    }

    /// Jointly permute the rows of `self` and `other` in place (Fisher-Yates).
    ///
    /// Row `i` of `self` keeps its correspondence with row `i` of `other`.
    pub fn shuffle_rows_with<R: Rng + ?Sized>(&mut self, other: &mut Matrix, rng: &mut R) {
        assert_eq!(
            self.rows, other.rows,
            "cannot jointly shuffle {} rows with {} rows",
            self.rows, other.rows
        );

        for i in (1..self.rows).rev() {
            let j = rng.gen_range(0..=i);
            if i != j {
                self.swap_rows(i, j);
                other.swap_rows(i, j);
            }
        }
    }

    fn swap_rows(&mut self, a: usize, b: usize) {
        for c in 0..self.cols {
            self.data.swap(a * self.cols + c, b * self.cols + c);
        }
    }
}

impl<'a> MatrixView<'a> {
    /// Wrap `data` as a `(rows, cols)` matrix whose rows are `row_stride` apart.
    pub fn new(data: &'a [f64], rows: usize, cols: usize, row_stride: usize) -> Self {
        assert!(cols <= row_stride, "cols {cols} exceed row_stride {row_stride}");
        if rows > 0 {
            assert!(
                data.len() >= (rows - 1) * row_stride + cols,
                "buffer of len {} too small for {rows}x{cols} view with stride {row_stride}",
                data.len()
            );
        }
        Self {
            data,
            rows,
            cols,
            row_stride,
        }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn row_stride(&self) -> usize {
        self.row_stride
    }

    /// The backing buffer, starting at element `(0, 0)`.
    #[inline]
    pub fn data(&self) -> &'a [f64] {
        self.data
    }

    #[inline]
    pub fn row(&self, r: usize) -> &'a [f64] {
        let start = r * self.row_stride;
        &self.data[start..start + self.cols]
    }

    #[inline]
    pub fn get(&self, r: usize, c: usize) -> f64 {
        assert!(r < self.rows && c < self.cols, "index ({r}, {c}) out of bounds");
        self.data[r * self.row_stride + c]
    }

    pub fn to_matrix(&self) -> Matrix {
        let mut out = Matrix::default();
        out.copy_from_view(*self);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn from_flat_validates_shape() {
        assert!(Matrix::from_flat(vec![0.0, 1.0, 2.0, 3.0], 2).is_ok());
        assert!(Matrix::from_flat(vec![0.0, 1.0, 2.0], 2).is_err());
        assert!(Matrix::from_flat(vec![], 0).is_err());
    }

    #[test]
    fn from_rows_rejects_ragged_rows() {
        let err = Matrix::from_rows(&[vec![1.0, 2.0], vec![3.0]]).unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));
    }

    #[test]
    fn strided_view_skips_leading_column() {
        // Two rows of [1, a, b]; the view drops the leading column.
        let buf = [1.0, 2.0, 3.0, 1.0, 4.0, 5.0];
        let v = MatrixView::new(&buf[1..], 2, 2, 3);
        assert_eq!(v.row(0), &[2.0, 3.0]);
        assert_eq!(v.row(1), &[4.0, 5.0]);
        assert_eq!(v.to_matrix().as_slice(), &[2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn joint_shuffle_preserves_row_pairs() {
        let mut x = Matrix::from_flat((0..20).map(f64::from).collect(), 2).unwrap();
        let mut y = Matrix::from_flat((0..10).map(|i| f64::from(i) * 2.0).collect(), 1).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        x.shuffle_rows_with(&mut y, &mut rng);

        let mut seen = Vec::new();
        for r in 0..x.rows() {
            // Row k of x was [2k, 2k+1]; its target was 2k.
            assert_eq!(x.get(r, 1), x.get(r, 0) + 1.0);
            assert_eq!(y.get(r, 0), x.get(r, 0));
            seen.push(x.get(r, 0) as usize);
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..10).map(|k| 2 * k).collect::<Vec<_>>());
    }
}
