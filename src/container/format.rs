//! Container format constants and structures.

use crate::util::ElementKind;

/// Magic bytes at the start of a container file.
pub const CONTAINER_MAGIC: &[u8; 5] = b"SpkCt";

/// Size of the file header in bytes.
pub const HEADER_SIZE: usize = 16;

/// Offset of the frozen flag in the header.
pub const FROZEN_OFFSET: usize = 5;

/// Offset of the version in the header.
pub const VERSION_OFFSET: usize = 6;

/// Offset of the root group position in the header.
pub const ROOT_POS_OFFSET: usize = 8;

/// Current container format version.
pub const CURRENT_VERSION: u16 = 1;

/// Frozen flag value once the writer has finished.
pub const FROZEN_FLAG: u8 = 0xFF;

/// Frozen flag value while the file is being written.
pub const NOT_FROZEN_FLAG: u8 = 0x00;

/// Bit marking a child offset as a dataset (clear = group).
pub const TYPE_FLAG_MASK: u64 = 1 << 63;

/// Mask to extract the actual position from a child offset.
pub const OFFSET_MASK: u64 = !(1 << 63);

/// Bytes before the dims of a dataset payload: dtype and rank.
pub const DATASET_PREFIX_SIZE: usize = 2;

/// Check if a child offset points at a group.
#[inline]
pub const fn is_group_offset(offset: u64) -> bool {
    (offset & TYPE_FLAG_MASK) == 0
}

/// Check if a child offset points at a dataset.
#[inline]
pub const fn is_dataset_offset(offset: u64) -> bool {
    (offset & TYPE_FLAG_MASK) != 0
}

/// Extract the position from a child offset.
#[inline]
pub const fn extract_offset(offset: u64) -> u64 {
    offset & OFFSET_MASK
}

#[inline]
pub const fn make_group_offset(pos: u64) -> u64 {
    pos & OFFSET_MASK
}

#[inline]
pub const fn make_dataset_offset(pos: u64) -> u64 {
    pos | TYPE_FLAG_MASK
}

/// Element type of a dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DType {
    Float64 = 0,
    Int64 = 1,
    /// Tagged offset of another group or dataset
    Reference = 2,
    /// UTF-8 bytes
    Text = 3,
}

impl DType {
    pub const fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Float64),
            1 => Some(Self::Int64),
            2 => Some(Self::Reference),
            3 => Some(Self::Text),
            _ => None,
        }
    }

    /// Size of one element in bytes.
    pub const fn element_size(self) -> usize {
        match self {
            Self::Float64 | Self::Int64 | Self::Reference => 8,
            Self::Text => 1,
        }
    }

    /// Stored dtype for an in-memory array kind.
    pub const fn for_kind(kind: ElementKind) -> Self {
        match kind {
            ElementKind::Float => Self::Float64,
            ElementKind::Int | ElementKind::Bool => Self::Int64,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Float64 => "float64",
            Self::Int64 => "int64",
            Self::Reference => "reference",
            Self::Text => "text",
        }
    }
}
