//! Structure-array resolution.
//!
//! An "array of structures" reaches us in one of two shapes, with nothing in
//! the file saying which:
//!
//! - **inline**: the struct node is a group with one column dataset per
//!   field. A column either holds the values directly (record `i` is row `i`)
//!   or holds one reference per record to a leaf dataset.
//! - **indirected**: the struct node is itself a reference dataset. Entry `i`
//!   points at a group keyed by field name that holds record `i`.
//!
//! [`StructSource::probe`] picks the shape by attempting a direct read and
//! falling back on [`Error::ReferenceTyped`]. Both shapes are accumulated
//! column-wise and transposed into [`StructRecord`]s.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::reader::{Container, Dataset, Group, Node, Reference};
use super::writer::{OData, OGroup, ONode};
use crate::util::{Error, NdArray, Result};

/// How a structure array is laid out on disk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StructLayout {
    /// One column dataset per field
    Inline,
    /// One reference per record to a group of fields
    #[default]
    Indirected,
}

/// One record of a structure array: field name to value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StructRecord {
    fields: BTreeMap<String, NdArray>,
}

impl StructRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field value.
    pub fn insert(&mut self, name: impl Into<String>, value: NdArray) -> &mut Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Get a field value.
    pub fn get(&self, name: &str) -> Result<&NdArray> {
        self.fields.get(name).ok_or_else(|| Error::FieldNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Field names, sorted.
    pub fn field_names(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    /// Iterate over fields in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &NdArray)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Single value of a field, read as an integer id.
    pub fn scalar_i64(&self, name: &str) -> Result<i64> {
        let value = self.get(name)?;
        value.data().first().map(|&v| v as i64).ok_or_else(|| Error::TypeMismatch {
            expected: format!("non-empty field {}", name),
            actual: format!("shape {}", value.shape()),
        })
    }
}

/// A structure array located and classified by probing.
pub enum StructSource {
    Inline(Group),
    Indirected(Vec<Reference>),
}

impl StructSource {
    /// Classify a struct node by attempting to read it directly.
    pub fn probe(node: Node) -> Result<Self> {
        match node {
            Node::Group(group) => Ok(Self::Inline(group)),
            Node::Dataset(dataset) => match dataset.read() {
                Err(Error::ReferenceTyped(_)) => Ok(Self::Indirected(dataset.references()?)),
                Err(e) => Err(e),
                Ok(_) => Err(Error::TypeMismatch {
                    expected: "structure array".to_string(),
                    actual: format!("plain dataset of shape {}", dataset.shape()),
                }),
            },
        }
    }

    pub fn layout(&self) -> StructLayout {
        match self {
            Self::Inline(_) => StructLayout::Inline,
            Self::Indirected(_) => StructLayout::Indirected,
        }
    }

    /// Accumulate field values column-wise.
    pub fn read_columns(&self, container: &Container) -> Result<BTreeMap<String, Vec<NdArray>>> {
        let mut columns = BTreeMap::new();
        match self {
            Self::Inline(group) => {
                for name in group.keys() {
                    let column = read_column(container, &group.dataset(name)?)?;
                    columns.insert(name.clone(), column);
                }
            }
            Self::Indirected(references) => {
                let mut expected: Option<Vec<String>> = None;
                for (index, &reference) in references.iter().enumerate() {
                    let record = container.deref(reference)?.into_group()?;
                    let mut keys = record.keys().to_vec();
                    keys.sort();
                    match &expected {
                        None => expected = Some(keys.clone()),
                        Some(first) if *first != keys => {
                            return Err(Error::HeterogeneousRecord {
                                index,
                                expected: first.clone(),
                                actual: keys,
                            });
                        }
                        Some(_) => {}
                    }
                    for name in keys {
                        let value = record.dataset(&name)?.read()?;
                        columns.entry(name).or_insert_with(Vec::new).push(value);
                    }
                }
            }
        }
        Ok(columns)
    }
}

/// Rows of a column dataset, following per-record references if present.
fn read_column(container: &Container, dataset: &Dataset) -> Result<Vec<NdArray>> {
    match dataset.read() {
        Ok(values) => Ok(values.rows().collect()),
        Err(Error::ReferenceTyped(_)) => dataset
            .references()?
            .into_iter()
            .map(|r| container.deref(r)?.into_dataset()?.read())
            .collect(),
        Err(e) => Err(e),
    }
}

/// Transpose column-wise field values into records.
///
/// Every column must have the same number of records.
pub fn transpose_columns(columns: BTreeMap<String, Vec<NdArray>>) -> Result<Vec<StructRecord>> {
    let Some(expected) = columns.values().map(Vec::len).next() else {
        return Ok(Vec::new());
    };
    if let Some((field, column)) = columns.iter().find(|(_, c)| c.len() != expected) {
        return Err(Error::ColumnLengthMismatch {
            field: field.clone(),
            expected,
            actual: column.len(),
        });
    }
    let mut records = vec![StructRecord::new(); expected];
    for (name, column) in columns {
        for (record, value) in records.iter_mut().zip(column) {
            record.fields.insert(name.clone(), value);
        }
    }
    Ok(records)
}

/// Resolve the structure array at `node` into row-oriented records.
#[tracing::instrument(skip_all)]
pub fn resolve_struct_array(container: &Container, node: Node) -> Result<Vec<StructRecord>> {
    let source = StructSource::probe(node)?;
    let records = transpose_columns(source.read_columns(container)?)?;
    tracing::debug!(layout = ?source.layout(), records = records.len(), "resolved struct array");
    Ok(records)
}

/// Build the on-disk node for a structure array.
///
/// Inline columns whose values share one shape are stored as a stacked
/// dataset; ragged columns get one reference per record.
pub fn struct_array_node(records: &[StructRecord], layout: StructLayout) -> Result<ONode> {
    let fields = match records.first() {
        Some(first) => first.field_names(),
        None => Vec::new(),
    };
    for (index, record) in records.iter().enumerate() {
        let names = record.field_names();
        if names != fields {
            return Err(Error::HeterogeneousRecord { index, expected: fields, actual: names });
        }
    }

    match layout {
        StructLayout::Inline => {
            let mut group = OGroup::new();
            for name in &fields {
                let values: Vec<NdArray> = records
                    .iter()
                    .map(|r| r.get(name).cloned())
                    .collect::<Result<_>>()?;
                let uniform = values.windows(2).all(|w| w[0].shape() == w[1].shape());
                if uniform {
                    group.insert_array(name.as_str(), NdArray::stack(&values)?);
                } else {
                    let leaves = values.into_iter().map(|v| ONode::Data(OData::Array(v))).collect();
                    group.insert_references(name.as_str(), leaves);
                }
            }
            Ok(ONode::Group(group))
        }
        StructLayout::Indirected => {
            let targets = records
                .iter()
                .map(|record| {
                    let mut group = OGroup::new();
                    for (name, value) in record.iter() {
                        group.insert_array(name, value.clone());
                    }
                    ONode::Group(group)
                })
                .collect();
            Ok(ONode::Data(OData::References(targets)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ContainerWriter;
    use crate::util::{ElementKind, Shape};
    use tempfile::NamedTempFile;

    fn records() -> Vec<StructRecord> {
        let mut a = StructRecord::new();
        a.insert("ID", NdArray::scalar(1001.0, ElementKind::Int))
            .insert("spikeTrain", NdArray::from_i64(&[10, 20, 30]))
            .insert("footprint", NdArray::zeros(Shape::d2(3, 4)));
        let mut b = StructRecord::new();
        b.insert("ID", NdArray::scalar(2000.0, ElementKind::Int))
            .insert("spikeTrain", NdArray::from_i64(&[15]))
            .insert("footprint", NdArray::filled(Shape::d2(3, 4), ElementKind::Float, 1.0));
        vec![a, b]
    }

    fn roundtrip(records: &[StructRecord], layout: StructLayout) -> Result<(StructLayout, Vec<StructRecord>)> {
        let temp = NamedTempFile::new()?;
        let mut root = OGroup::new();
        root.insert("Units", struct_array_node(records, layout)?);
        ContainerWriter::create(temp.path())?.write(&root)?;

        let container = Container::open(temp.path())?;
        let probed = StructSource::probe(container.get("Units")?)?.layout();
        let resolved = resolve_struct_array(&container, container.get("Units")?)?;
        Ok((probed, resolved))
    }

    #[test]
    fn test_both_layouts_resolve_identically() -> Result<()> {
        let original = records();
        let (inline_layout, inline) = roundtrip(&original, StructLayout::Inline)?;
        let (indirect_layout, indirect) = roundtrip(&original, StructLayout::Indirected)?;
        assert_eq!(inline_layout, StructLayout::Inline);
        assert_eq!(indirect_layout, StructLayout::Indirected);
        assert_eq!(inline, indirect);
        assert_eq!(inline, original);
        assert_eq!(inline[1].scalar_i64("ID")?, 2000);
        Ok(())
    }

    #[test]
    fn test_empty_struct_array() -> Result<()> {
        for layout in [StructLayout::Inline, StructLayout::Indirected] {
            let (_, resolved) = roundtrip(&[], layout)?;
            assert!(resolved.is_empty());
        }
        Ok(())
    }

    #[test]
    fn test_column_length_mismatch() {
        let mut columns = BTreeMap::new();
        columns.insert("ID".to_string(), vec![NdArray::from_f64(vec![1.0]); 2]);
        columns.insert("spikeTrain".to_string(), vec![NdArray::from_f64(vec![1.0]); 3]);
        let err = transpose_columns(columns).unwrap_err();
        assert!(matches!(err, Error::ColumnLengthMismatch { expected: 2, actual: 3, .. }));
    }

    #[test]
    fn test_heterogeneous_indirected_records() -> Result<()> {
        let temp = NamedTempFile::new()?;
        let mut first = OGroup::new();
        first.insert_array("ID", NdArray::from_f64(vec![1.0]));
        let mut second = OGroup::new();
        second.insert_array("ID", NdArray::from_f64(vec![2.0]));
        second.insert_array("extra", NdArray::from_f64(vec![0.0]));
        let mut root = OGroup::new();
        root.insert_references("Units", vec![ONode::Group(first), ONode::Group(second)]);
        ContainerWriter::create(temp.path())?.write(&root)?;

        let container = Container::open(temp.path())?;
        let err = resolve_struct_array(&container, container.get("Units")?).unwrap_err();
        assert!(matches!(err, Error::HeterogeneousRecord { index: 1, .. }));
        Ok(())
    }

    #[test]
    fn test_plain_dataset_is_not_a_struct() -> Result<()> {
        let temp = NamedTempFile::new()?;
        let mut root = OGroup::new();
        root.insert_array("Units", NdArray::from_f64(vec![1.0, 2.0]));
        ContainerWriter::create(temp.path())?.write(&root)?;

        let container = Container::open(temp.path())?;
        assert!(StructSource::probe(container.get("Units")?).is_err());
        Ok(())
    }
}
