use std::ops::{Index, IndexMut};

use crate::dtype::Element;

/// Host-resident dense vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Vector<T> {
    data: Vec<T>,
}

impl<T: Element> Vector<T> {
    pub fn zeros(len: usize) -> Self {
        Self::from_elem(len, T::zero())
    }

    pub fn from_elem(len: usize, value: T) -> Self {
        Self { data: vec![value; len] }
    }

    pub fn from_fn(len: usize, f: impl FnMut(usize) -> T) -> Self {
        Self {
            data: (0..len).map(f).collect(),
        }
    }

    pub fn from_vec(data: Vec<T>) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    pub fn get(&self, i: usize) -> Option<&T> {
        self.data.get(i)
    }

    /// Change the length. Existing contents are discarded (zero-filled).
    pub fn resize(&mut self, len: usize) {
        self.data.clear();
        self.data.resize(len, T::zero());
    }

    pub fn fill(&mut self, value: T) {
        self.data.iter_mut().for_each(|x| *x = value);
    }

    /// Largest element-wise distance to `other`, or `None` if lengths differ.
    pub fn max_distance(&self, other: &Self) -> Option<f64> {
        if self.len() != other.len() {
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

impl<T: Element> Default for Vector<T> {
    fn default() -> Self {
        Self::zeros(0)
    }
}

impl<T: Element> From<Vec<T>> for Vector<T> {
    fn from(data: Vec<T>) -> Self {
        Self::from_vec(data)
    }
}

impl<T: Element> Index<usize> for Vector<T> {
    type Output = T;

    fn index(&self, i: usize) -> &T {
        &self.data[i]
    }
}

impl<T: Element> IndexMut<usize> for Vector<T> {
    fn index_mut(&mut self, i: usize) -> &mut T {
        &mut self.data[i]
    }
}
