use std::fmt;

use serde::{Deserialize, Serialize};

/// Element ordering of a 2-D container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    /// Consecutive elements of a row are adjacent in memory.
    #[default]
    RowMajor,
    /// Consecutive elements of a column are adjacent in memory.
    ColumnMajor,
}

impl Layout {
    pub const ALL: [Layout; 2] = [Layout::RowMajor, Layout::ColumnMajor];

    /// Number of elements backing a `rows × cols` matrix, or `None` if it
    /// does not fit in `usize`.
    pub fn storage_size(&self, rows: usize, cols: usize) -> Option<usize> {
        rows.checked_mul(cols)
    }

    /// Linear offset of element `(i, j)` in a `rows × cols` matrix.
    pub fn index(&self, rows: usize, cols: usize, i: usize, j: usize) -> usize {
        match self {
            Layout::RowMajor => i * cols + j,
            Layout::ColumnMajor => j * rows + i,
        }
    }

    /// BLAS leading dimension of a `rows × cols` matrix stored in this layout.
    ///
    /// Never smaller than 1, which BLAS requires even for empty extents.
    pub fn leading_dimension(&self, rows: usize, cols: usize) -> usize {
        let ld = match self {
            Layout::RowMajor => cols,
            Layout::ColumnMajor => rows,
        };
        ld.max(1)
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layout::RowMajor => write!(f, "row-major"),
            Layout::ColumnMajor => write!(f, "column-major"),
        }
    }
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::RowMajor {}
    impl Sealed for super::ColumnMajor {}
}

/// Type-level layout tag, so the layout of a container is known at compile time.
pub trait StorageOrder:
    sealed::Sealed + Copy + Default + fmt::Debug + PartialEq + Send + Sync + 'static
{
    const LAYOUT: Layout;
}

/// Row-major layout tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RowMajor;

/// Column-major layout tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ColumnMajor;

impl StorageOrder for RowMajor {
    const LAYOUT: Layout = Layout::RowMajor;
}

impl StorageOrder for ColumnMajor {
    const LAYOUT: Layout = Layout::ColumnMajor;
}
