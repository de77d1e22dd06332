use std::fmt;
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

use crate::dtype::Element;
use crate::layout::{Layout, RowMajor, StorageOrder};
use crate::{LumenError, Result};

/// Host-resident dense matrix.
///
/// Elements are stored contiguously in the order given by the layout tag `L`,
/// so `as_slice()` can be handed to a device copy unchanged.
#[derive(Clone, PartialEq)]
pub struct Matrix<T, L = RowMajor> {
    rows: usize,
    cols: usize,
    data: Vec<T>,
    _layout: PhantomData<L>,
}

/// Element count of a host `rows × cols` matrix.
///
/// An overflowing shape maps to `usize::MAX`, which the allocator rejects
/// with its capacity-overflow panic like any other oversized `Vec`.
fn dense_len<L: StorageOrder>(rows: usize, cols: usize) -> usize {
    L::LAYOUT.storage_size(rows, cols).unwrap_or(usize::MAX)
}

impl<T: Element, L: StorageOrder> Matrix<T, L> {
    /// Zero-filled `rows × cols` matrix.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self::from_elem(rows, cols, T::zero())
    }

    /// `rows × cols` matrix with every element set to `value`.
    pub fn from_elem(rows: usize, cols: usize, value: T) -> Self {
        Self {
            rows,
            cols,
            data: vec![value; dense_len::<L>(rows, cols)],
            _layout: PhantomData,
        }
    }

    /// Build a matrix from `f(i, j)`.
    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let mut m = Self::zeros(rows, cols);
        for i in 0..rows {
            for j in 0..cols {
                m[(i, j)] = f(i, j);
            }
        }
        m
    }

    /// Wrap raw elements already laid out in `L` order.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<T>) -> Result<Self> {
        if L::LAYOUT.storage_size(rows, cols) != Some(data.len()) {
            return Err(LumenError::ShapeMismatch {
                expected: (rows, cols),
                found: (data.len(), 1),
            });
        }
        Ok(Self {
            rows,
            cols,
            data,
            _layout: PhantomData,
        })
    }

    /// Build a matrix from row slices, whatever the storage layout.
    pub fn from_rows(rows: &[&[T]]) -> Result<Self> {
        let n_rows = rows.len();
        let n_cols = rows.first().map_or(0, |r| r.len());
        if let Some(bad) = rows.iter().find(|r| r.len() != n_cols) {
            return Err(LumenError::ShapeMismatch {
                expected: (n_rows, n_cols),
                found: (n_rows, bad.len()),
            });
        }
        Ok(Self::from_fn(n_rows, n_cols, |i, j| rows[i][j]))
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// `(rows, cols)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Total number of stored elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn layout(&self) -> Layout {
        L::LAYOUT
    }

    /// Raw elements in storage order.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    pub fn get(&self, i: usize, j: usize) -> Option<&T> {
        if i < self.rows && j < self.cols {
            self.data.get(L::LAYOUT.index(self.rows, self.cols, i, j))
        } else {
            None
        }
    }

    /// Change the shape. Existing contents are discarded (zero-filled).
    pub fn resize(&mut self, rows: usize, cols: usize) {
        self.rows = rows;
        self.cols = cols;
        self.data.clear();
        self.data.resize(dense_len::<L>(rows, cols), T::zero());
    }

    pub fn fill(&mut self, value: T) {
        self.data.iter_mut().for_each(|x| *x = value);
    }

    /// Largest element-wise distance to `other`, or `None` if shapes differ.
    pub fn max_distance(&self, other: &Self) -> Option<f64> {
        if self.shape() != other.shape() {
            return None;
        }
        Some(
            self.data
                .iter()
                .zip(&other.data)
                .map(|(a, b)| a.distance(*b))
                .fold(0.0, f64::max),
        )
    }
}

impl<T: Element, L: StorageOrder> Default for Matrix<T, L> {
    fn default() -> Self {
        Self::zeros(0, 0)
    }
}

impl<T: Element, L: StorageOrder> Index<(usize, usize)> for Matrix<T, L> {
    type Output = T;

    fn index(&self, (i, j): (usize, usize)) -> &T {
        assert!(i < self.rows && j < self.cols, "index ({i}, {j}) out of bounds for {}x{} matrix", self.rows, self.cols);
        &self.data[L::LAYOUT.index(self.rows, self.cols, i, j)]
    }
}

impl<T: Element, L: StorageOrder> IndexMut<(usize, usize)> for Matrix<T, L> {
    fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut T {
        assert!(i < self.rows && j < self.cols, "index ({i}, {j}) out of bounds for {}x{} matrix", self.rows, self.cols);
        &mut self.data[L::LAYOUT.index(self.rows, self.cols, i, j)]
    }
}

impl<T: Element, L: StorageOrder> fmt::Debug for Matrix<T, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Matrix({}x{}, {}, {}) [", self.rows, self.cols, T::DTYPE, L::LAYOUT)?;
        for i in 0..self.rows.min(6) {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "[")?;
            for j in 0..self.cols.min(6) {
                if j > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{:?}", self[(i, j)])?;
            }
            if self.cols > 6 {
                write!(f, ", ...")?;
            }
            write!(f, "]")?;
        }
        if self.rows > 6 {
            write!(f, ", ...")?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::ColumnMajor;

    #[test]
    fn test_storage_order_row_major() {
        let m: Matrix<f32> = Matrix::from_fn(2, 3, |i, j| (i * 3 + j) as f32);
        assert_eq!(m.as_slice(), &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_storage_order_column_major() {
        let m: Matrix<f32, ColumnMajor> = Matrix::from_fn(2, 3, |i, j| (i * 3 + j) as f32);
        assert_eq!(m.as_slice(), &[0.0, 3.0, 1.0, 4.0, 2.0, 5.0]);
        assert_eq!(m[(1, 2)], 5.0);
    }

    #[test]
    fn test_from_vec_rejects_wrong_length() {
        let err = Matrix::<f64>::from_vec(2, 2, vec![1.0; 3]).unwrap_err();
        assert!(matches!(err, LumenError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_from_rows() {
        let m: Matrix<f64, ColumnMajor> = Matrix::from_rows(&[&[1.0, 2.0], &[3.0, 4.0]]).unwrap();
        assert_eq!(m.shape(), (2, 2));
        assert_eq!(m[(0, 1)], 2.0);
        assert_eq!(m.as_slice(), &[1.0, 3.0, 2.0, 4.0]);
        assert!(Matrix::<f64>::from_rows(&[&[1.0, 2.0], &[3.0]]).is_err());
    }

    #[test]
    fn test_resize_discards() {
        let mut m: Matrix<f32> = Matrix::from_elem(2, 2, 7.0);
        m.resize(3, 1);
        assert_eq!(m.shape(), (3, 1));
        assert!(m.as_slice().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_get_out_of_bounds() {
        let m: Matrix<f32> = Matrix::zeros(2, 2);
        assert!(m.get(2, 0).is_none());
        assert_eq!(m.get(1, 1), Some(&0.0));
    }

    #[test]
    fn test_max_distance() {
        let a: Matrix<f64> = Matrix::from_elem(2, 2, 1.0);
        let mut b = a.clone();
        b[(1, 0)] = 1.5;
        assert_eq!(a.max_distance(&b), Some(0.5));
        assert_eq!(a.max_distance(&Matrix::zeros(1, 2)), None);
    }
}
