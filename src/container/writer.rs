//! Container writer.
//!
//! The tree is assembled in memory as [`OGroup`] / [`ONode`] values and
//! written bottom-up: every child, and every target of a reference, lands
//! in the file before the group or reference dataset that points at it.
//! The header's root position and frozen flag are patched last.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};

use super::format::*;
use crate::util::{Error, NdArray, Result};

/// Output stream for writing container data.
pub struct OStream {
    writer: BufWriter<File>,
    pos: u64,
}

impl OStream {
    /// Create a new output stream for the given file path.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new().write(true).create(true).truncate(true).open(path)?;
        Ok(Self { writer: BufWriter::with_capacity(1024 * 1024, file), pos: 0 })
    }

    /// Get the current write position.
    #[inline]
    pub fn pos(&self) -> u64 {
        self.pos
    }

    /// Write bytes and advance position.
    pub fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        self.pos += data.len() as u64;
        Ok(())
    }

    /// Write a u64 value (little-endian).
    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.writer.write_u64::<LittleEndian>(value)?;
        self.pos += 8;
        Ok(())
    }

    /// Write an i64 value (little-endian).
    pub fn write_i64(&mut self, value: i64) -> Result<()> {
        self.writer.write_i64::<LittleEndian>(value)?;
        self.pos += 8;
        Ok(())
    }

    /// Write an f64 value (little-endian).
    pub fn write_f64(&mut self, value: f64) -> Result<()> {
        self.writer.write_f64::<LittleEndian>(value)?;
        self.pos += 8;
        Ok(())
    }

    /// Write a u16 value (little-endian).
    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.writer.write_u16::<LittleEndian>(value)?;
        self.pos += 2;
        Ok(())
    }

    /// Write a u8 value.
    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.writer.write_u8(value)?;
        self.pos += 1;
        Ok(())
    }

    /// Seek to a position and return it.
    pub fn seek(&mut self, pos: u64) -> Result<u64> {
        self.writer.flush()?;
        let new_pos = self.writer.seek(SeekFrom::Start(pos))?;
        self.pos = new_pos;
        Ok(new_pos)
    }

    /// Flush the buffer to disk.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// A node to be written.
#[derive(Clone, Debug)]
pub enum ONode {
    Group(OGroup),
    Data(OData),
}

/// Dataset contents to be written.
#[derive(Clone, Debug)]
pub enum OData {
    /// Numeric array; integer kinds are stored as int64
    Array(NdArray),
    /// UTF-8 text
    Text(String),
    /// One reference per target, targets written first
    References(Vec<ONode>),
}

/// A group to be written; children keep insertion order.
#[derive(Clone, Debug, Default)]
pub struct OGroup {
    children: Vec<(String, ONode)>,
}

impl OGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a child.
    pub fn insert(&mut self, key: impl Into<String>, node: ONode) -> &mut Self {
        let key = key.into();
        match self.children.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = node,
            None => self.children.push((key, node)),
        }
        self
    }

    pub fn insert_group(&mut self, key: impl Into<String>, group: OGroup) -> &mut Self {
        self.insert(key, ONode::Group(group))
    }

    pub fn insert_array(&mut self, key: impl Into<String>, array: NdArray) -> &mut Self {
        self.insert(key, ONode::Data(OData::Array(array)))
    }

    pub fn insert_text(&mut self, key: impl Into<String>, text: impl Into<String>) -> &mut Self {
        self.insert(key, ONode::Data(OData::Text(text.into())))
    }

    pub fn insert_references(&mut self, key: impl Into<String>, targets: Vec<ONode>) -> &mut Self {
        self.insert(key, ONode::Data(OData::References(targets)))
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

/// Container file writer.
pub struct ContainerWriter {
    stream: OStream,
}

impl ContainerWriter {
    /// Create a container file and write its provisional header.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let mut stream = OStream::create(path)?;
        stream.write_bytes(CONTAINER_MAGIC)?;
        stream.write_u8(NOT_FROZEN_FLAG)?;
        stream.write_u16(CURRENT_VERSION)?;
        stream.write_u64(0)?; // Root position placeholder.
        Ok(Self { stream })
    }

    /// Write the whole tree and finalize the file.
    pub fn write(mut self, root: &OGroup) -> Result<()> {
        let root_pos = extract_offset(self.write_group(root)?);
        self.stream.seek(ROOT_POS_OFFSET as u64)?;
        self.stream.write_u64(root_pos)?;
        self.stream.seek(FROZEN_OFFSET as u64)?;
        self.stream.write_u8(FROZEN_FLAG)?;
        self.stream.flush()
    }

    fn write_node(&mut self, node: &ONode) -> Result<u64> {
        match node {
            ONode::Group(g) => self.write_group(g),
            ONode::Data(d) => self.write_data(d),
        }
    }

    fn write_group(&mut self, group: &OGroup) -> Result<u64> {
        let mut names = String::new();
        for (i, (key, _)) in group.children.iter().enumerate() {
            if key.is_empty() || key.contains('\0') {
                return Err(Error::WriteFailed(format!("invalid group key {:?}", key)));
            }
            if i > 0 {
                names.push('\0');
            }
            names.push_str(key);
        }
        let mut offsets = Vec::with_capacity(group.children.len() + 1);
        offsets.push(self.write_data(&OData::Text(names))?);
        for (_, child) in &group.children {
            offsets.push(self.write_node(child)?);
        }

        let pos = self.stream.pos();
        self.stream.write_u64(offsets.len() as u64)?;
        for offset in offsets {
            self.stream.write_u64(offset)?;
        }
        Ok(make_group_offset(pos))
    }

    fn write_data(&mut self, data: &OData) -> Result<u64> {
        match data {
            OData::Array(array) => {
                let dtype = DType::for_kind(array.kind());
                let pos = self.write_dataset_header(dtype, array.shape().sizes())?;
                for &v in array.data() {
                    match dtype {
                        DType::Int64 => self.stream.write_i64(v as i64)?,
                        _ => self.stream.write_f64(v)?,
                    }
                }
                Ok(make_dataset_offset(pos))
            }
            OData::Text(text) => {
                let pos = self.write_dataset_header(DType::Text, &[text.len()])?;
                self.stream.write_bytes(text.as_bytes())?;
                Ok(make_dataset_offset(pos))
            }
            OData::References(targets) => {
                let tagged = targets
                    .iter()
                    .map(|t| self.write_node(t))
                    .collect::<Result<Vec<_>>>()?;
                let pos = self.write_dataset_header(DType::Reference, &[tagged.len()])?;
                for t in tagged {
                    self.stream.write_u64(t)?;
                }
                Ok(make_dataset_offset(pos))
            }
        }
    }

    /// Write size, dtype, rank and dims; return the dataset position.
    fn write_dataset_header(&mut self, dtype: DType, dims: &[usize]) -> Result<u64> {
        if dims.len() > u8::MAX as usize {
            return Err(Error::WriteFailed(format!("rank {} is too large", dims.len())));
        }
        let count: usize = dims.iter().product();
        let size = DATASET_PREFIX_SIZE + 8 * dims.len() + count * dtype.element_size();
        let pos = self.stream.pos();
        self.stream.write_u64(size as u64)?;
        self.stream.write_u8(dtype as u8)?;
        self.stream.write_u8(dims.len() as u8)?;
        for &d in dims {
            self.stream.write_u64(d as u64)?;
        }
        Ok(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{Container, Node};
    use crate::util::{ElementKind, Shape};
    use tempfile::NamedTempFile;

    #[test]
    fn test_write_and_read_tree() -> Result<()> {
        let temp = NamedTempFile::new()?;
        let mut inner = OGroup::new();
        inner.insert_array("x", NdArray::from_i64(&[1, 2, 3]));
        let mut root = OGroup::new();
        root.insert_array("rate", NdArray::scalar(20000.0, ElementKind::Float));
        root.insert_group("inner", inner.clone());
        root.insert_text("note", "hello");
        root.insert_references("refs", vec![ONode::Group(inner), ONode::Data(OData::Array(NdArray::from_f64(vec![9.0])))]);
        ContainerWriter::create(temp.path())?.write(&root)?;

        let c = Container::open(temp.path())?;
        assert_eq!(c.keys(), &["rate", "inner", "note", "refs"]);
        assert_eq!(c.get("rate")?.into_dataset()?.read()?.as_scalar(), Some(20000.0));
        let x = c.root().group("inner")?.dataset("x")?.read()?;
        assert_eq!(x.kind(), ElementKind::Int);
        assert_eq!(x.data(), &[1.0, 2.0, 3.0]);
        assert_eq!(c.root().dataset("note")?.read_text()?, "hello");

        let refs = c.root().dataset("refs")?;
        assert!(matches!(refs.read(), Err(Error::ReferenceTyped(_))));
        let handles = refs.references()?;
        assert_eq!(handles.len(), 2);
        assert!(matches!(c.deref(handles[0])?, Node::Group(_)));
        assert_eq!(c.deref(handles[1])?.into_dataset()?.read()?.data(), &[9.0]);
        Ok(())
    }

    #[test]
    fn test_empty_group_and_array() -> Result<()> {
        let temp = NamedTempFile::new()?;
        let mut root = OGroup::new();
        root.insert_group("empty", OGroup::new());
        root.insert_array("none", NdArray::zeros(Shape::d2(0, 3)));
        ContainerWriter::create(temp.path())?.write(&root)?;

        let c = Container::open(temp.path())?;
        assert!(c.root().group("empty")?.is_empty());
        let none = c.root().dataset("none")?.read()?;
        assert_eq!(none.shape(), &Shape::d2(0, 3));
        assert!(matches!(c.get("missing"), Err(Error::KeyNotFound(_))));
        Ok(())
    }

    #[test]
    fn test_rejects_bad_keys() -> Result<()> {
        let temp = NamedTempFile::new()?;
        let mut root = OGroup::new();
        root.insert_text("", "x");
        assert!(ContainerWriter::create(temp.path())?.write(&root).is_err());
        Ok(())
    }
}
