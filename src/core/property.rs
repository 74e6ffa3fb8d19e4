//! Per-unit property values.

use std::fmt;

use crate::util::{ElementKind, NdArray};

/// Value of one property for one unit.
#[derive(Clone, Debug, PartialEq)]
pub enum PropertyValue {
    /// Integer scalar
    Int(i64),
    /// Float scalar
    Float(f64),
    /// Text scalar (e.g. a curation label)
    Text(String),
    /// Fixed-shape numeric array (e.g. a template)
    Array(NdArray),
}

/// Kind of a [`PropertyValue`]; one kind per property name per store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    Int,
    Float,
    Text,
    Array,
}

impl PropertyValue {
    pub fn kind(&self) -> PropertyKind {
        match self {
            Self::Int(_) => PropertyKind::Int,
            Self::Float(_) => PropertyKind::Float,
            Self::Text(_) => PropertyKind::Text,
            Self::Array(_) => PropertyKind::Array,
        }
    }

    /// Check if this value fits a metric table cell.
    pub fn is_scalar(&self) -> bool {
        !matches!(self, Self::Array(_))
    }

    /// Numeric value of a scalar, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Text(_) => None,
            Self::Array(a) => a.as_scalar(),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            other => other.as_f64().map(|v| v as i64),
        }
    }

    pub fn as_array(&self) -> Option<&NdArray> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    /// This value as an array; scalars become rank-0 arrays, text has none.
    pub fn to_array(&self) -> Option<NdArray> {
        match self {
            Self::Int(v) => Some(NdArray::scalar(*v as f64, ElementKind::Int)),
            Self::Float(v) => Some(NdArray::scalar(*v, ElementKind::Float)),
            Self::Text(_) => None,
            Self::Array(a) => Some(a.clone()),
        }
    }

    /// Scalar from one row of a per-unit array; higher ranks stay arrays.
    pub fn from_row(row: NdArray) -> Self {
        if row.shape().is_scalar() {
            let v = row.data()[0];
            match row.kind() {
                ElementKind::Float => Self::Float(v),
                ElementKind::Int | ElementKind::Bool => Self::Int(v as i64),
            }
        } else {
            Self::Array(row)
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Text(s) => f.write_str(s),
            Self::Array(a) => write!(f, "array{}", a.shape()),
        }
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<NdArray> for PropertyValue {
    fn from(v: NdArray) -> Self {
        Self::Array(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::Shape;

    #[test]
    fn test_from_row() {
        let a = NdArray::from_i64(&[4, 5]);
        let rows: Vec<_> = a.rows().map(PropertyValue::from_row).collect();
        assert_eq!(rows, vec![PropertyValue::Int(4), PropertyValue::Int(5)]);

        let m = NdArray::zeros(Shape::d2(2, 3));
        let row = PropertyValue::from_row(m.row(0).unwrap());
        assert_eq!(row.kind(), PropertyKind::Array);
        assert!(!row.is_scalar());
    }

    #[test]
    fn test_conversions() {
        assert_eq!(PropertyValue::Float(2.5).as_i64(), Some(2));
        assert_eq!(PropertyValue::Text("good".into()).as_f64(), None);
        assert_eq!(PropertyValue::from("mua").to_string(), "mua");
        assert_eq!(PropertyValue::Int(3).to_array().unwrap().as_scalar(), Some(3.0));
    }
}
