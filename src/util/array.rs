//! Dense n-dimensional numeric arrays.
//!
//! Every array read from disk, whatever its stored element type, lands in an
//! [`NdArray`]: a C-ordered `f64` buffer plus its [`Shape`] and the
//! [`ElementKind`] it was stored as, so writers can restore integer dtypes.

use std::fmt;

use super::{Error, Result, Shape};

/// Element kind an array was stored with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ElementKind {
    /// Boolean (0.0 = false)
    Bool,
    /// Signed or unsigned integer
    Int,
    /// IEEE floating point
    #[default]
    Float,
}

impl ElementKind {
    /// Returns the name of this kind.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
        }
    }

    /// Kind able to hold values of both `self` and `other`.
    pub fn promote(self, other: Self) -> Self {
        self.max(other)
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A dense array of numbers in C (row-major) order.
#[derive(Clone, Debug, PartialEq)]
pub struct NdArray {
    shape: Shape,
    kind: ElementKind,
    data: Vec<f64>,
}

impl NdArray {
    /// Create an array, checking that `data` fills `shape`.
    pub fn new(shape: Shape, kind: ElementKind, data: Vec<f64>) -> Result<Self> {
        if shape.num_elements() != data.len() {
            return Err(Error::invalid(format!(
                "array of shape {} needs {} elements, got {}",
                shape,
                shape.num_elements(),
                data.len()
            )));
        }
        Ok(Self { shape, kind, data })
    }

    /// 1D float array.
    pub fn from_f64(data: Vec<f64>) -> Self {
        Self { shape: Shape::d1(data.len()), kind: ElementKind::Float, data }
    }

    /// 1D integer array.
    pub fn from_i64(data: &[i64]) -> Self {
        Self {
            shape: Shape::d1(data.len()),
            kind: ElementKind::Int,
            data: data.iter().map(|&v| v as f64).collect(),
        }
    }

    /// Rank-0 array holding one value.
    pub fn scalar(value: f64, kind: ElementKind) -> Self {
        Self { shape: Shape::scalar(), kind, data: vec![value] }
    }

    /// Array of the given shape filled with `value`.
    pub fn filled(shape: Shape, kind: ElementKind, value: f64) -> Self {
        let n = shape.num_elements();
        Self { shape, kind, data: vec![value; n] }
    }

    /// Float array of zeros.
    pub fn zeros(shape: Shape) -> Self {
        Self::filled(shape, ElementKind::Float, 0.0)
    }

    #[inline]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    #[inline]
    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    /// Flat element buffer in C order.
    #[inline]
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Consume into the flat element buffer.
    pub fn into_data(self) -> Vec<f64> {
        self.data
    }

    /// Total number of elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of rows along axis 0.
    pub fn num_rows(&self) -> usize {
        self.shape.num_rows()
    }

    /// Same data reinterpreted under another kind.
    pub fn with_kind(mut self, kind: ElementKind) -> Self {
        self.kind = kind;
        self
    }

    /// Same data under a new shape with the same element count.
    pub fn reshape(self, shape: Shape) -> Result<Self> {
        Self::new(shape, self.kind, self.data)
    }

    /// Flatten to 1D.
    pub fn flatten(self) -> Self {
        let n = self.data.len();
        Self { shape: Shape::d1(n), kind: self.kind, data: self.data }
    }

    /// The single value of a one-element array, whatever its rank.
    pub fn as_scalar(&self) -> Option<f64> {
        if self.data.len() == 1 {
            Some(self.data[0])
        } else {
            None
        }
    }

    /// Elements truncated to integers.
    pub fn to_i64_vec(&self) -> Vec<i64> {
        self.data.iter().map(|&v| v as i64).collect()
    }

    /// Largest element, ignoring NaN.
    pub fn max(&self) -> Option<f64> {
        self.data.iter().copied().filter(|v| !v.is_nan()).reduce(f64::max)
    }

    /// Row `index` along axis 0.
    pub fn row(&self, index: usize) -> Result<NdArray> {
        let rows = self.num_rows();
        if index >= rows {
            return Err(Error::ChildOutOfBounds { index, count: rows });
        }
        let len = self.shape.row_len();
        Ok(Self {
            shape: self.shape.row_shape(),
            kind: self.kind,
            data: self.data[index * len..(index + 1) * len].to_vec(),
        })
    }

    /// Iterate over rows along axis 0.
    pub fn rows(&self) -> impl Iterator<Item = NdArray> + '_ {
        let row_shape = self.shape.row_shape();
        let len = row_shape.num_elements().max(1);
        let kind = self.kind;
        let n = if self.shape.is_scalar() { 1 } else { self.num_rows() };
        (0..n).map(move |i| {
            let data = if row_shape.num_elements() == 0 {
                Vec::new()
            } else {
                self.data[i * len..(i + 1) * len].to_vec()
            };
            NdArray { shape: row_shape.clone(), kind, data }
        })
    }

    /// Rows picked by index, in the given order.
    pub fn gather_rows(&self, indices: &[usize]) -> Result<NdArray> {
        let rows = self.num_rows();
        let len = self.shape.row_len();
        let mut data = Vec::with_capacity(indices.len() * len);
        for &i in indices {
            if i >= rows {
                return Err(Error::ChildOutOfBounds { index: i, count: rows });
            }
            data.extend_from_slice(&self.data[i * len..(i + 1) * len]);
        }
        Ok(Self { shape: self.shape.row_shape().with_rows(indices.len()), kind: self.kind, data })
    }

    /// Reverse axis order. For 2D arrays this is the matrix transpose.
    pub fn transpose(&self) -> NdArray {
        let dims = self.shape.sizes();
        if dims.len() < 2 {
            return self.clone();
        }
        let rank = dims.len();
        let out_shape = self.shape.reversed();
        let out_dims = out_shape.sizes().to_vec();
        let mut data = vec![0.0; self.data.len()];

        // C-order strides of the source
        let mut strides = vec![1usize; rank];
        for ax in (0..rank - 1).rev() {
            strides[ax] = strides[ax + 1] * dims[ax + 1];
        }
        let mut index = vec![0usize; rank];
        for slot in data.iter_mut() {
            // `index` walks the output in C order; the source index is its reverse
            let src: usize = index.iter().rev().zip(&strides).map(|(i, s)| i * s).sum();
            *slot = self.data[src];
            for ax in (0..rank).rev() {
                index[ax] += 1;
                if index[ax] < out_dims[ax] {
                    break;
                }
                index[ax] = 0;
            }
        }
        Self { shape: out_shape, kind: self.kind, data }
    }

    /// Stack equally-shaped arrays along a new outer axis.
    pub fn stack(items: &[NdArray]) -> Result<NdArray> {
        let Some(first) = items.first() else {
            return Ok(Self::from_f64(Vec::new()));
        };
        let row_shape = first.shape.clone();
        let mut kind = first.kind;
        let mut data = Vec::with_capacity(items.len() * first.len());
        for item in items {
            if item.shape != row_shape {
                return Err(Error::TypeMismatch {
                    expected: format!("shape {}", row_shape),
                    actual: format!("shape {}", item.shape),
                });
            }
            kind = kind.promote(item.kind);
            data.extend_from_slice(&item.data);
        }
        Ok(Self { shape: row_shape.with_rows(items.len()), kind, data })
    }

    /// Concatenate arrays along axis 0. Trailing axes must agree.
    pub fn concat(items: &[NdArray]) -> Result<NdArray> {
        let Some(first) = items.first() else {
            return Ok(Self::from_f64(Vec::new()));
        };
        let row_shape = first.shape.row_shape();
        let mut kind = first.kind;
        let mut rows = 0;
        let mut data = Vec::new();
        for item in items {
            if item.shape.row_shape() != row_shape || item.shape.is_scalar() {
                return Err(Error::TypeMismatch {
                    expected: format!("rows of shape {}", row_shape),
                    actual: format!("shape {}", item.shape),
                });
            }
            kind = kind.promote(item.kind);
            rows += item.num_rows();
            data.extend_from_slice(&item.data);
        }
        Ok(Self { shape: row_shape.with_rows(rows), kind, data })
    }
}
