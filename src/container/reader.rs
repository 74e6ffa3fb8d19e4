//! Container reader.
//!
//! A container is a tree of named groups whose leaves are typed datasets.
//! Datasets of [`DType::Reference`] hold handles to other nodes; reading
//! one as values fails with [`Error::ReferenceTyped`], which is how callers
//! tell the two kinds apart.

use std::path::Path;
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};

use super::format::*;
use crate::io::MappedFile;
use crate::util::{ElementKind, Error, NdArray, Result, Shape};

/// Open container file.
pub struct Container {
    file: Arc<MappedFile>,
    version: u16,
    root: Group,
}

impl Container {
    /// Open a container file for reading.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = Arc::new(MappedFile::open(path)?);
        if file.size() < HEADER_SIZE as u64 {
            return Err(Error::UnexpectedEof(file.size()));
        }
        let header = file.read_bytes(0, HEADER_SIZE)?;
        let (version, frozen) = parse_header(&header)?;
        if !frozen {
            return Err(Error::invalid("container was not finalized"));
        }
        let root_pos = LittleEndian::read_u64(&header[ROOT_POS_OFFSET..]);
        let root = Group::new(file.clone(), root_pos)?;
        Ok(Self { file, version, root })
    }

    /// Format version from the header.
    #[inline]
    pub fn version(&self) -> u16 {
        self.version
    }

    /// Root group.
    #[inline]
    pub fn root(&self) -> &Group {
        &self.root
    }

    /// Top-level lookup, shorthand for `root().get(key)`.
    pub fn get(&self, key: &str) -> Result<Node> {
        self.root.get(key)
    }

    /// Top-level keys.
    pub fn keys(&self) -> &[String] {
        self.root.keys()
    }

    /// Follow a reference to the node it points at.
    pub fn deref(&self, reference: Reference) -> Result<Node> {
        Node::at(self.file.clone(), reference.0)
    }
}

/// Parse and validate the header.
fn parse_header(data: &[u8]) -> Result<(u16, bool)> {
    if data.len() < HEADER_SIZE {
        return Err(Error::UnexpectedEof(data.len() as u64));
    }
    if &data[0..5] != CONTAINER_MAGIC {
        return Err(Error::InvalidMagic("container"));
    }
    let frozen = data[FROZEN_OFFSET] == FROZEN_FLAG;
    let version = LittleEndian::read_u16(&data[VERSION_OFFSET..]);
    if version > CURRENT_VERSION {
        return Err(Error::UnsupportedVersion(version.to_string()));
    }
    Ok((version, frozen))
}

/// Handle to another node, stored inside a reference dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Reference(pub u64);

/// A child in the container tree - either a group or a dataset.
pub enum Node {
    Group(Group),
    Dataset(Dataset),
}

impl Node {
    fn at(file: Arc<MappedFile>, tagged: u64) -> Result<Self> {
        let pos = extract_offset(tagged);
        if is_group_offset(tagged) {
            Ok(Self::Group(Group::new(file, pos)?))
        } else {
            Ok(Self::Dataset(Dataset::new(file, pos)?))
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, Self::Group(_))
    }

    /// Use this node as a group.
    pub fn into_group(self) -> Result<Group> {
        match self {
            Self::Group(g) => Ok(g),
            Self::Dataset(d) => Err(Error::TypeMismatch {
                expected: "group".to_string(),
                actual: format!("{} dataset", d.dtype().name()),
            }),
        }
    }

    /// Use this node as a dataset.
    pub fn into_dataset(self) -> Result<Dataset> {
        match self {
            Self::Dataset(d) => Ok(d),
            Self::Group(_) => Err(Error::TypeMismatch {
                expected: "dataset".to_string(),
                actual: "group".to_string(),
            }),
        }
    }
}

/// A group: named children.
#[derive(Clone)]
pub struct Group {
    file: Arc<MappedFile>,
    pos: u64,
    keys: Vec<String>,
    /// Tagged offsets, parallel to `keys`
    child_offsets: Vec<u64>,
}

impl Group {
    /// Read the group at `pos`. Child 0 is the key list.
    pub fn new(file: Arc<MappedFile>, pos: u64) -> Result<Self> {
        let num_children = file.read_u64(pos)?;
        if num_children == 0 {
            return Ok(Self { file, pos, keys: Vec::new(), child_offsets: Vec::new() });
        }
        let table = file.bytes(pos + 8, num_children as usize * 8)?;
        let mut offsets = vec![0u64; num_children as usize];
        LittleEndian::read_u64_into(&table, &mut offsets);
        drop(table);

        let names_offset = offsets.remove(0);
        if !is_dataset_offset(names_offset) {
            return Err(Error::invalid(format!("group at {:#x} has no key list", pos)));
        }
        let names = Dataset::new(file.clone(), extract_offset(names_offset))?.read_text()?;
        let keys: Vec<String> = if names.is_empty() {
            Vec::new()
        } else {
            names.split('\0').map(str::to_string).collect()
        };
        if keys.len() != offsets.len() {
            return Err(Error::invalid(format!(
                "group at {:#x} lists {} keys for {} children",
                pos,
                keys.len(),
                offsets.len()
            )));
        }
        Ok(Self { file, pos, keys, child_offsets: offsets })
    }

    /// Position of this group in the file.
    #[inline]
    pub fn pos(&self) -> u64 {
        self.pos
    }

    /// Child names in stored order.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }

    /// Look up a child by name.
    pub fn get(&self, key: &str) -> Result<Node> {
        let index = self
            .keys
            .iter()
            .position(|k| k == key)
            .ok_or_else(|| Error::KeyNotFound(key.to_string()))?;
        Node::at(self.file.clone(), self.child_offsets[index])
    }

    /// Look up a child group by name.
    pub fn group(&self, key: &str) -> Result<Group> {
        self.get(key)?.into_group()
    }

    /// Look up a child dataset by name.
    pub fn dataset(&self, key: &str) -> Result<Dataset> {
        self.get(key)?.into_dataset()
    }
}

/// A typed n-dimensional dataset.
pub struct Dataset {
    file: Arc<MappedFile>,
    pos: u64,
    dtype: DType,
    shape: Shape,
    /// Position of the first element
    data_pos: u64,
}

impl Dataset {
    /// Read the dataset header at `pos`.
    pub fn new(file: Arc<MappedFile>, pos: u64) -> Result<Self> {
        let size = file.read_u64(pos)?;
        if size < DATASET_PREFIX_SIZE as u64 {
            return Err(Error::invalid(format!("dataset at {:#x} is truncated", pos)));
        }
        let prefix = file.read_bytes(pos + 8, DATASET_PREFIX_SIZE)?;
        let dtype = DType::from_u8(prefix[0])
            .ok_or_else(|| Error::invalid(format!("unknown dtype {} at {:#x}", prefix[0], pos)))?;
        let rank = prefix[1] as usize;
        let dims_pos = pos + 8 + DATASET_PREFIX_SIZE as u64;
        let mut dims = Vec::with_capacity(rank);
        for i in 0..rank {
            dims.push(file.read_u64(dims_pos + 8 * i as u64)? as usize);
        }
        let shape = Shape::from(dims);
        let data_pos = dims_pos + 8 * rank as u64;
        let expected = (DATASET_PREFIX_SIZE + 8 * rank + shape.num_elements() * dtype.element_size()) as u64;
        if expected != size {
            return Err(Error::invalid(format!(
                "dataset at {:#x} declares {} bytes, shape {} needs {}",
                pos, size, shape, expected
            )));
        }
        Ok(Self { file, pos, dtype, shape, data_pos })
    }

    #[inline]
    pub fn pos(&self) -> u64 {
        self.pos
    }

    #[inline]
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    #[inline]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Check if this dataset holds references rather than values.
    pub fn is_reference(&self) -> bool {
        self.dtype == DType::Reference
    }

    fn payload_len(&self) -> usize {
        self.shape.num_elements() * self.dtype.element_size()
    }

    /// Read numeric values.
    ///
    /// Fails with [`Error::ReferenceTyped`] on reference datasets.
    pub fn read(&self) -> Result<NdArray> {
        let n = self.shape.num_elements();
        let bytes = self.file.bytes(self.data_pos, self.payload_len())?;
        match self.dtype {
            DType::Float64 => {
                let mut data = vec![0.0; n];
                LittleEndian::read_f64_into(&bytes, &mut data);
                NdArray::new(self.shape.clone(), ElementKind::Float, data)
            }
            DType::Int64 => {
                let mut ints = vec![0i64; n];
                LittleEndian::read_i64_into(&bytes, &mut ints);
                let data = ints.into_iter().map(|v| v as f64).collect();
                NdArray::new(self.shape.clone(), ElementKind::Int, data)
            }
            DType::Reference => Err(Error::ReferenceTyped(self.pos)),
            DType::Text => Err(Error::TypeMismatch {
                expected: "numeric dataset".to_string(),
                actual: "text dataset".to_string(),
            }),
        }
    }

    /// Read the handles of a reference dataset, in C order.
    pub fn references(&self) -> Result<Vec<Reference>> {
        if self.dtype != DType::Reference {
            return Err(Error::TypeMismatch {
                expected: "reference dataset".to_string(),
                actual: format!("{} dataset", self.dtype.name()),
            });
        }
        let bytes = self.file.bytes(self.data_pos, self.payload_len())?;
        let mut raw = vec![0u64; self.shape.num_elements()];
        LittleEndian::read_u64_into(&bytes, &mut raw);
        Ok(raw.into_iter().map(Reference).collect())
    }

    /// Read a text dataset.
    pub fn read_text(&self) -> Result<String> {
        if self.dtype != DType::Text {
            return Err(Error::TypeMismatch {
                expected: "text dataset".to_string(),
                actual: format!("{} dataset", self.dtype.name()),
            });
        }
        let bytes = self.file.bytes(self.data_pos, self.payload_len())?;
        Ok(String::from_utf8(bytes.into_owned())?)
    }
}
