//! Hierarchical binary container.
//!
//! The on-disk vessel for the HDSort format: a tree of named groups whose
//! leaves are typed n-dimensional datasets, with reference datasets that
//! point at other nodes. Layout follows a bottom-up write with the root
//! position patched into the header last.
//!
//! ## Binary layout
//!
//! ```text
//! Header (16 bytes):
//!   [0..5]   Magic: "SpkCt"
//!   [5]      Frozen flag: 0xFF when complete
//!   [6..8]   Version (u16 LE)
//!   [8..16]  Root group position (u64 LE)
//!
//! Group:     [u64 child count] [u64 tagged offset]...
//!            child 0 is a text dataset of NUL-separated keys
//! Dataset:   [u64 size] [u8 dtype] [u8 rank] [u64 dim]... [payload]
//! ```
//!
//! The high bit of a tagged offset marks a dataset; clear means group.

mod format;
mod reader;
mod resolve;
mod writer;

pub use format::*;
pub use reader::{Container, Dataset, Group, Node, Reference};
pub use resolve::{
    resolve_struct_array, struct_array_node, transpose_columns, StructLayout, StructRecord,
    StructSource,
};
pub use writer::{ContainerWriter, OData, OGroup, ONode, OStream};
