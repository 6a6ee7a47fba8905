//! Contiguous row-major storage for band-indexed data.
//!
//! Result arrays in this crate are always indexed `[k, band]` or
//! `[k, band, channel]`. Both containers keep a flat `Vec<T>` and compute
//! offsets on the fly, the same way a uniform grid maps `(ix, iy)` onto a
//! linear buffer.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ResultsError};

// ============================================================================
// Array2
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Array2<T> {
    rows: usize,
    cols: usize,
    data: Vec<T>,
}

impl<T: Clone> Array2<T> {
    pub fn from_elem(rows: usize, cols: usize, value: T) -> Self {
        Self {
            rows,
            cols,
            data: vec![value; rows * cols],
        }
    }

    pub fn from_vec(rows: usize, cols: usize, data: Vec<T>) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(ResultsError::shape(format!(
                "data length {} does not match shape ({rows}, {cols})",
                data.len()
            )));
        }
        Ok(Self { rows, cols, data })
    }

    /// Build from nested rows; every row must have the same length.
    pub fn from_rows(rows: Vec<Vec<T>>) -> Result<Self> {
        let n_rows = rows.len();
        let n_cols = rows.first().map(Vec::len).unwrap_or(0);
        let mut data = Vec::with_capacity(n_rows * n_cols);
        for (idx, row) in rows.into_iter().enumerate() {
            if row.len() != n_cols {
                return Err(ResultsError::shape(format!(
                    "row {idx} has length {} but row 0 has length {n_cols}",
                    row.len()
                )));
            }
            data.extend(row);
        }
        Ok(Self {
            rows: n_rows,
            cols: n_cols,
            data,
        })
    }

    pub fn map<U, F: FnMut(&T) -> U>(&self, f: F) -> Array2<U> {
        Array2 {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(f).collect(),
        }
    }

    pub fn to_rows(&self) -> Vec<Vec<T>> {
        if self.cols == 0 {
            return vec![Vec::new(); self.rows];
        }
        self.data.chunks(self.cols).map(<[T]>::to_vec).collect()
    }
}

impl<T> Array2<T> {
    #[inline]
    pub fn idx(&self, row: usize, col: usize) -> usize {
        row * self.cols + col
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, row: usize, col: usize) -> &T {
        &self.data[self.idx(row, col)]
    }

    pub fn get_mut(&mut self, row: usize, col: usize) -> &mut T {
        let idx = self.idx(row, col);
        &mut self.data[idx]
    }

    pub fn row(&self, row: usize) -> &[T] {
        let start = row * self.cols;
        &self.data[start..start + self.cols]
    }

    pub fn row_mut(&mut self, row: usize) -> &mut [T] {
        let start = row * self.cols;
        &mut self.data[start..start + self.cols]
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }
}

impl Array2<f64> {
    /// Smallest non-NaN entry, `None` when every entry is NaN.
    pub fn nan_min(&self) -> Option<f64> {
        self.data
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.min(v))))
    }

    /// Largest non-NaN entry, `None` when every entry is NaN.
    pub fn nan_max(&self) -> Option<f64> {
        self.data
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.max(v))))
    }
}

// ============================================================================
// Array3
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Array3<T> {
    dims: [usize; 3],
    data: Vec<T>,
}

impl<T: Clone> Array3<T> {
    pub fn from_elem(dims: [usize; 3], value: T) -> Self {
        Self {
            data: vec![value; dims.iter().product()],
            dims,
        }
    }

    pub fn from_vec(dims: [usize; 3], data: Vec<T>) -> Result<Self> {
        let expected: usize = dims.iter().product();
        if data.len() != expected {
            return Err(ResultsError::shape(format!(
                "data length {} does not match shape {dims:?}",
                data.len()
            )));
        }
        Ok(Self { dims, data })
    }

    /// Build from `[outer][middle][inner]` nesting with uniform lengths.
    pub fn from_nested(nested: Vec<Vec<Vec<T>>>) -> Result<Self> {
        let d0 = nested.len();
        let d1 = nested.first().map(Vec::len).unwrap_or(0);
        let d2 = nested
            .first()
            .and_then(|plane| plane.first())
            .map(Vec::len)
            .unwrap_or(0);
        let mut data = Vec::with_capacity(d0 * d1 * d2);
        for (i, plane) in nested.into_iter().enumerate() {
            if plane.len() != d1 {
                return Err(ResultsError::shape(format!(
                    "plane {i} has {} rows, expected {d1}",
                    plane.len()
                )));
            }
            for (j, lane) in plane.into_iter().enumerate() {
                if lane.len() != d2 {
                    return Err(ResultsError::shape(format!(
                        "lane ({i}, {j}) has length {}, expected {d2}",
                        lane.len()
                    )));
                }
                data.extend(lane);
            }
        }
        Ok(Self {
            dims: [d0, d1, d2],
            data,
        })
    }

    pub fn map<U, F: FnMut(&T) -> U>(&self, f: F) -> Array3<U> {
        Array3 {
            dims: self.dims,
            data: self.data.iter().map(f).collect(),
        }
    }

    /// Copy out the `[i, :, :]` plane.
    pub fn plane(&self, i: usize) -> Array2<T> {
        let width = self.dims[1] * self.dims[2];
        let start = i * width;
        Array2 {
            rows: self.dims[1],
            cols: self.dims[2],
            data: self.data[start..start + width].to_vec(),
        }
    }
}

impl<T> Array3<T> {
    #[inline]
    pub fn idx(&self, i: usize, j: usize, k: usize) -> usize {
        (i * self.dims[1] + j) * self.dims[2] + k
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, i: usize, j: usize, k: usize) -> &T {
        &self.data[self.idx(i, j, k)]
    }

    pub fn get_mut(&mut self, i: usize, j: usize, k: usize) -> &mut T {
        let idx = self.idx(i, j, k);
        &mut self.data[idx]
    }

    /// The innermost `[i, j, :]` lane.
    pub fn lane(&self, i: usize, j: usize) -> &[T] {
        let start = self.idx(i, j, 0);
        &self.data[start..start + self.dims[2]]
    }

    pub fn lane_mut(&mut self, i: usize, j: usize) -> &mut [T] {
        let start = self.idx(i, j, 0);
        let width = self.dims[2];
        &mut self.data[start..start + width]
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }
}

impl<T: Clone> From<Array2<T>> for Array3<T> {
    /// Promote `(rows, cols)` to `(rows, cols, 1)`.
    fn from(value: Array2<T>) -> Self {
        Self {
            dims: [value.rows, value.cols, 1],
            data: value.data,
        }
    }
}
