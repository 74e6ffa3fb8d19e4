//! Array shapes.
//!
//! A [`Shape`] is the list of axis lengths of an [`NdArray`](super::NdArray),
//! outermost axis first (C order). Axis 0 is the "row" axis: one row per unit
//! or per event, depending on the array.

use smallvec::SmallVec;

/// Shape of a multi-dimensional array.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Shape {
    /// Size of each axis. Empty means scalar (rank 0).
    dims: SmallVec<[usize; 4]>,
}

impl Shape {
    /// Create scalar shape (rank 0).
    pub fn scalar() -> Self {
        Self { dims: SmallVec::new() }
    }

    /// Create 1D shape.
    pub fn d1(len: usize) -> Self {
        Self { dims: smallvec::smallvec![len] }
    }

    /// Create 2D shape.
    pub fn d2(rows: usize, cols: usize) -> Self {
        Self { dims: smallvec::smallvec![rows, cols] }
    }

    /// Create from a slice of sizes.
    pub fn from_slice(sizes: &[usize]) -> Self {
        Self { dims: SmallVec::from_slice(sizes) }
    }

    /// Number of axes.
    #[inline]
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Size of one axis, if it exists.
    pub fn size(&self, axis: usize) -> Option<usize> {
        self.dims.get(axis).copied()
    }

    /// All axis sizes.
    pub fn sizes(&self) -> &[usize] {
        &self.dims
    }

    /// Total number of elements (1 for a scalar).
    pub fn num_elements(&self) -> usize {
        self.dims.iter().product()
    }

    /// Check if this is a scalar (rank 0).
    #[inline]
    pub fn is_scalar(&self) -> bool {
        self.dims.is_empty()
    }

    /// Number of rows along axis 0. A scalar counts as one row.
    pub fn num_rows(&self) -> usize {
        self.dims.first().copied().unwrap_or(1)
    }

    /// Shape of a single row (every axis but the first).
    pub fn row_shape(&self) -> Shape {
        if self.dims.is_empty() {
            return Shape::scalar();
        }
        Shape::from_slice(&self.dims[1..])
    }

    /// Number of elements in one row.
    pub fn row_len(&self) -> usize {
        self.row_shape().num_elements()
    }

    /// Prepend a new outer axis.
    pub fn with_rows(&self, rows: usize) -> Shape {
        let mut dims = SmallVec::with_capacity(self.dims.len() + 1);
        dims.push(rows);
        dims.extend_from_slice(&self.dims);
        Shape { dims }
    }

    /// Reverse the axis order.
    pub fn reversed(&self) -> Shape {
        Shape { dims: self.dims.iter().rev().copied().collect() }
    }
}

impl From<usize> for Shape {
    fn from(len: usize) -> Self {
        Self::d1(len)
    }
}

impl From<(usize, usize)> for Shape {
    fn from((r, c): (usize, usize)) -> Self {
        Self::d2(r, c)
    }
}

impl From<Vec<usize>> for Shape {
    fn from(v: Vec<usize>) -> Self {
        Self { dims: SmallVec::from_vec(v) }
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(")?;
        for (i, s) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", s)?;
        }
        if self.dims.len() == 1 {
            write!(f, ",")?;
        }
        write!(f, ")")
    }
}
