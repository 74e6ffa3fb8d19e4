//! Utility types shared by every layer.
//!
//! - [`NdArray`] / [`ElementKind`] - dense numeric arrays
//! - [`Shape`] - array shapes
//! - [`Error`] / [`Result`] - error handling

mod array;
mod error;
mod shape;

pub use array::*;
pub use error::*;
pub use shape::*;
