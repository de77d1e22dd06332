//! Host reference arithmetic.
//!
//! Straightforward triple loops over `(i, j)` indexing. These define the
//! expected results that device kernels are checked against.

use crate::dtype::Element;
use crate::error::invalid_dimensions;
use crate::layout::StorageOrder;
use crate::matrix::Matrix;
use crate::vector::Vector;
use crate::{LumenError, Result};

/// `A · B` for `[M, K] · [K, N] → [M, N]`.
pub fn prod<T: Element, L: StorageOrder>(a: &Matrix<T, L>, b: &Matrix<T, L>) -> Result<Matrix<T, L>> {
    if a.cols() != b.rows() {
        return Err(invalid_dimensions(
            "prod",
            format!("[{}x{}] · [{}x{}]", a.rows(), a.cols(), b.rows(), b.cols()),
        ));
    }
    let (m, k, n) = (a.rows(), a.cols(), b.cols());
    Ok(Matrix::from_fn(m, n, |i, j| {
        (0..k).fold(T::zero(), |acc, p| acc + a[(i, p)] * b[(p, j)])
    }))
}

/// `A · x` for `[M, K] · [K] → [M]`.
pub fn prod_mv<T: Element, L: StorageOrder>(a: &Matrix<T, L>, x: &Vector<T>) -> Result<Vector<T>> {
    if a.cols() != x.len() {
        return Err(invalid_dimensions(
            "prod_mv",
            format!("[{}x{}] · [{}]", a.rows(), a.cols(), x.len()),
        ));
    }
    Ok(Vector::from_fn(a.rows(), |i| {
        (0..a.cols()).fold(T::zero(), |acc, p| acc + a[(i, p)] * x[p])
    }))
}

/// `xᵀ · A` for `[K] · [K, N] → [N]`.
pub fn prod_vm<T: Element, L: StorageOrder>(x: &Vector<T>, a: &Matrix<T, L>) -> Result<Vector<T>> {
    if x.len() != a.rows() {
        return Err(invalid_dimensions(
            "prod_vm",
            format!("[{}] · [{}x{}]", x.len(), a.rows(), a.cols()),
        ));
    }
    Ok(Vector::from_fn(a.cols(), |j| {
        (0..a.rows()).fold(T::zero(), |acc, p| acc + x[p] * a[(p, j)])
    }))
}

/// `seed + Σ xᵢ·yᵢ`.
pub fn inner<T: Element>(x: &Vector<T>, y: &Vector<T>, seed: T) -> Result<T> {
    if x.len() != y.len() {
        return Err(invalid_dimensions(
            "inner",
            format!("lengths {} and {}", x.len(), y.len()),
        ));
    }
    Ok(x.as_slice()
        .iter()
        .zip(y.as_slice())
        .fold(seed, |acc, (&a, &b)| acc + a * b))
}

/// `x · yᵀ` for `[M] · [N] → [M, N]`.
pub fn outer<T: Element, L: StorageOrder>(x: &Vector<T>, y: &Vector<T>) -> Matrix<T, L> {
    Matrix::from_fn(x.len(), y.len(), |i, j| x[i] * y[j])
}

/// Apply `f` element by element to two equally shaped matrices.
pub fn zip_matrix<T: Element, L: StorageOrder>(
    a: &Matrix<T, L>,
    b: &Matrix<T, L>,
    f: impl Fn(T, T) -> T,
) -> Result<Matrix<T, L>> {
    if a.shape() != b.shape() {
        return Err(LumenError::ShapeMismatch {
            expected: a.shape(),
            found: b.shape(),
        });
    }
    let data = a.as_slice().iter().zip(b.as_slice()).map(|(&x, &y)| f(x, y)).collect();
    Matrix::from_vec(a.rows(), a.cols(), data)
}

/// Apply `f` element by element to two vectors of equal length.
pub fn zip_vector<T: Element>(a: &Vector<T>, b: &Vector<T>, f: impl Fn(T, T) -> T) -> Result<Vector<T>> {
    if a.len() != b.len() {
        return Err(LumenError::ShapeMismatch {
            expected: (a.len(), 1),
            found: (b.len(), 1),
        });
    }
    Ok(Vector::from_vec(
        a.as_slice().iter().zip(b.as_slice()).map(|(&x, &y)| f(x, y)).collect(),
    ))
}
