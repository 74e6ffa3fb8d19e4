//! HDSort result files.
//!
//! HDSort stores its result as a structure container:
//!
//! ```text
//! Units             struct array: ID, spikeTrain, spikeAmplitudes,
//!                   detectionChannel, footprint, cutLeft
//! MultiElectrode    electrodePositions (n_channels, 2), electrodeNumbers
//! noiseStd          (1, n_channels)
//! samplingRate      scalar
//! sortingInfo       optional; startTimes holds the recording start frame
//! ```
//!
//! `Units` may be stored inline or through per-record references depending
//! on the producer; both are read through the struct-array resolver.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::container::{
    resolve_struct_array, struct_array_node, Container, ContainerWriter, Group, OGroup, StructLayout,
    StructRecord,
};
use crate::core::{Frame, FrameWindow, PropertyValue, SortingSink, SortingSource, UnitId, UnitStore};
use crate::schema::constants::*;
use crate::schema::{is_noise_unit, ContainerPlan, UnitPlan, Unrepresented};
use crate::util::{ElementKind, Error, NdArray, Result, Shape};

/// Options for reading HDSort files.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HdsortOptions {
    /// Drop units whose id is a multiple of 1000.
    pub remove_noise_units: bool,
}

impl Default for HdsortOptions {
    fn default() -> Self {
        Self { remove_noise_units: true }
    }
}

/// Options for writing HDSort files. Every field is optional.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HdsortWriteOptions {
    /// Electrode `(x, y)` per channel; synthesized when absent
    pub locations: Option<Vec<[f64; 2]>>,
    /// Noise level per channel; ones when absent
    pub noise_std_by_channel: Option<Vec<f64>>,
    /// Recording start frame, added to every stored spike frame
    pub start_frame: Frame,
    /// Struct array layout for `Units`
    pub layout: StructLayout,
}

impl HdsortWriteOptions {
    fn locations_array(&self) -> Result<Option<NdArray>> {
        self.locations
            .as_ref()
            .map(|locs| {
                let data = locs.iter().flat_map(|p| p.iter().copied()).collect();
                NdArray::from_f64(data).reshape(Shape::d2(locs.len(), 2))
            })
            .transpose()
    }
}

/// Reader for one HDSort file.
pub struct HdsortSorting {
    path: PathBuf,
    store: UnitStore,
    start_frame: Frame,
    layout: StructLayout,
    electrode_positions: Option<NdArray>,
}

/// First element of a dataset, whatever its rank.
fn first_value(group: &Group, key: &str) -> Result<f64> {
    let values = group.dataset(key)?.read()?;
    values.data().first().copied().ok_or_else(|| Error::TypeMismatch {
        expected: format!("non-empty {}", key),
        actual: format!("shape {}", values.shape()),
    })
}

/// Stable permutation that sorts `frames` ascending.
fn argsort(frames: &[Frame]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..frames.len()).collect();
    order.sort_by_key(|&i| frames[i]);
    order
}

impl HdsortSorting {
    /// Open a file with default options.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, &HdsortOptions::default())
    }

    /// Open a file.
    #[tracing::instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open_with(path: impl AsRef<Path>, options: &HdsortOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let container = Container::open(&path)?;
        let root = container.root();

        let sampling_rate = first_value(root, SAMPLING_RATE_KEY)?;
        let start_frame = match root.contains(SORTING_INFO_KEY) {
            true => first_value(&root.group(SORTING_INFO_KEY)?, START_TIMES_KEY)? as Frame,
            false => 0,
        };
        let electrode_positions = match root.contains(MULTI_ELECTRODE_KEY) {
            true => Some(root.group(MULTI_ELECTRODE_KEY)?.dataset(ELECTRODE_POSITIONS)?.read()?),
            false => None,
        };

        let units_node = root.get(UNITS_KEY)?;
        let layout = match units_node.is_group() {
            true => StructLayout::Inline,
            false => StructLayout::Indirected,
        };
        let mut records = resolve_struct_array(&container, units_node)?;
        if options.remove_noise_units {
            let before = records.len();
            records = records
                .into_iter()
                .map(|r| Ok((r.scalar_i64(FIELD_ID)?, r)))
                .collect::<Result<Vec<_>>>()?
                .into_iter()
                .filter(|(id, _)| !is_noise_unit(*id))
                .map(|(_, r)| r)
                .collect();
            tracing::debug!(removed = before - records.len(), "dropped noise units");
        }

        let store = build_store(&records, sampling_rate, start_frame, electrode_positions.as_ref())?;
        tracing::debug!(units = store.len(), ?layout, start_frame, "opened HDSort file");
        Ok(Self { path, store, start_frame, layout, electrode_positions })
    }

    /// File this reader was opened on.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Recording start frame subtracted from stored spike frames.
    pub fn start_frame(&self) -> Frame {
        self.start_frame
    }

    /// Layout `Units` was found in.
    pub fn layout(&self) -> StructLayout {
        self.layout
    }

    /// Electrode positions, `(n_channels, 2)`, if the file has them.
    pub fn electrode_positions(&self) -> Option<&NdArray> {
        self.electrode_positions.as_ref()
    }

    /// The materialized units.
    pub fn store(&self) -> &UnitStore {
        &self.store
    }
}

/// Populate a store from resolved unit records.
fn build_store(
    records: &[StructRecord],
    sampling_rate: f64,
    start_frame: Frame,
    electrode_positions: Option<&NdArray>,
) -> Result<UnitStore> {
    let ids = records.iter().map(|r| r.scalar_i64(FIELD_ID)).collect::<Result<Vec<_>>>()?;
    let mut store = UnitStore::new(ids.clone(), sampling_rate)?;
    let mut templates = Vec::new();
    let mut cut_lefts = Vec::new();

    for (record, &id) in records.iter().zip(&ids) {
        let raw: Vec<Frame> = record
            .get(FIELD_SPIKE_TRAIN)?
            .data()
            .iter()
            .map(|&f| f as Frame - start_frame)
            .collect();
        let order = argsort(&raw);
        store.set_event_sequence(id, order.iter().map(|&i| raw[i]).collect())?;

        if record.contains(FIELD_AMPLITUDES) {
            let amplitudes = record.get(FIELD_AMPLITUDES)?.clone().flatten();
            store.set_feature(id, AMPLITUDES, amplitudes.gather_rows(&order)?)?;
        }
        if record.contains(FIELD_DETECTION_CHANNEL) {
            let channels = record
                .get(FIELD_DETECTION_CHANNEL)?
                .clone()
                .flatten()
                .with_kind(ElementKind::Int)
                .gather_rows(&order)?;
            if let Some(positions) = electrode_positions {
                let rows: Vec<usize> = channels
                    .to_i64_vec()
                    .into_iter()
                    .map(|c| {
                        usize::try_from(c - 1)
                            .ok()
                            .filter(|&i| i < positions.num_rows())
                            .ok_or_else(|| Error::ChildOutOfBounds {
                                index: c.max(0) as usize,
                                count: positions.num_rows(),
                            })
                    })
                    .collect::<Result<_>>()?;
                store.set_feature(id, POSITIONS, positions.gather_rows(&rows)?)?;
            }
            store.set_feature(id, DETECTION_CHANNEL, channels)?;
        }
        if record.contains(FIELD_FOOTPRINT) {
            templates.push(PropertyValue::Array(record.get(FIELD_FOOTPRINT)?.transpose()));
        }
        if record.contains(FIELD_CUT_LEFT) {
            cut_lefts.push(PropertyValue::Int(record.scalar_i64(FIELD_CUT_LEFT)?));
        }
    }

    // Records share one key set, so these are all or nothing.
    if !templates.is_empty() {
        store.set_property(TEMPLATE, templates)?;
    }
    if !cut_lefts.is_empty() {
        store.set_property(TEMPLATE_CUT_LEFT, cut_lefts)?;
    }
    Ok(store)
}

impl SortingSource for HdsortSorting {
    fn format_name(&self) -> &str {
        "hdsort"
    }

    fn sampling_rate(&self) -> f64 {
        self.store.sampling_rate()
    }

    fn unit_ids(&self) -> Vec<UnitId> {
        self.store.unit_ids()
    }

    fn event_sequence(&self, unit: UnitId, window: FrameWindow) -> Result<Vec<Frame>> {
        self.store.event_sequence(unit, window)
    }

    fn property_names(&self) -> Vec<String> {
        self.store.property_names()
    }

    fn property(&self, unit: UnitId, name: &str) -> Result<PropertyValue> {
        self.store.property(unit, name)
    }

    fn unit_feature_names(&self, unit: UnitId) -> Result<Vec<String>> {
        self.store.unit_feature_names(unit)
    }

    fn feature(&self, unit: UnitId, name: &str) -> Result<NdArray> {
        self.store.feature(unit, name)
    }
}

impl UnitPlan {
    /// The `Units` record for this unit.
    fn to_record(&self) -> StructRecord {
        let mut record = StructRecord::new();
        record
            .insert(FIELD_ID, NdArray::scalar(self.id as f64, ElementKind::Int))
            .insert(FIELD_SPIKE_TRAIN, NdArray::from_i64(&self.spike_train))
            .insert(FIELD_AMPLITUDES, self.amplitudes.clone())
            .insert(FIELD_DETECTION_CHANNEL, self.detection_channel.clone())
            .insert(FIELD_FOOTPRINT, self.footprint.clone())
            .insert(FIELD_CUT_LEFT, NdArray::scalar(self.cut_left as f64, ElementKind::Int));
        record
    }
}

impl SortingSink for HdsortSorting {
    type Options = HdsortWriteOptions;

    #[tracing::instrument(skip_all, fields(path = %destination.display()))]
    fn write(source: &dyn SortingSource, destination: &Path, options: &HdsortWriteOptions) -> Result<()> {
        let noise_std = options.noise_std_by_channel.clone().map(NdArray::from_f64);
        let skipped = Unrepresented::of(source, "hdsort", &HDSORT_PROPERTIES, &HDSORT_FEATURES);
        let plan = ContainerPlan::resolve(source, options.locations_array()?, noise_std, options.start_frame)?;
        let records: Vec<StructRecord> = plan.units.iter().map(UnitPlan::to_record).collect();

        let mut electrode = OGroup::new();
        electrode
            .insert_array(ELECTRODE_POSITIONS, plan.locations.clone())
            .insert_array(
                ELECTRODE_NUMBERS,
                NdArray::from_i64(&(0..plan.n_channels as i64).collect::<Vec<_>>()),
            );

        let mut root = OGroup::new();
        root.insert(UNITS_KEY, struct_array_node(&records, options.layout)?)
            .insert_group(MULTI_ELECTRODE_KEY, electrode)
            .insert_array(NOISE_STD_KEY, plan.noise_std.clone())
            .insert_array(SAMPLING_RATE_KEY, NdArray::scalar(plan.sampling_rate, ElementKind::Float));
        if plan.start_frame != 0 {
            let mut info = OGroup::new();
            info.insert_array(START_TIMES_KEY, NdArray::scalar(plan.start_frame as f64, ElementKind::Int));
            root.insert_group(SORTING_INFO_KEY, info);
        }

        ContainerWriter::create(destination)?.write(&root)?;
        tracing::info!(
            skipped = skipped.properties.len() + skipped.features.len(),
            units = records.len(),
            layout = ?options.layout,
            "wrote HDSort file"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn source() -> UnitStore {
        let mut s = UnitStore::new(vec![1001, 2000, 1002], 20000.0).unwrap();
        s.set_event_sequence(1001, vec![5, 50, 500]).unwrap();
        s.set_event_sequence(2000, vec![7]).unwrap();
        s.set_event_sequence(1002, vec![]).unwrap();
        s
    }

    #[test]
    fn test_write_options_from_json() {
        let opts: HdsortWriteOptions =
            serde_json::from_str(r#"{"start_frame": 100, "layout": "inline"}"#).unwrap();
        assert_eq!(opts.start_frame, 100);
        assert_eq!(opts.layout, StructLayout::Inline);
        assert!(opts.locations.is_none());
        let read: HdsortOptions = serde_json::from_str("{}").unwrap();
        assert!(read.remove_noise_units);
    }

    #[test]
    fn test_noise_units_removed_by_default() -> Result<()> {
        let tmp = TempDir::new()?;
        let path = tmp.path().join("sorting.spk");
        HdsortSorting::write(&source(), &path, &HdsortWriteOptions::default())?;

        let filtered = HdsortSorting::open(&path)?;
        assert_eq!(filtered.unit_ids(), vec![1001, 1002]);
        let all = HdsortSorting::open_with(&path, &HdsortOptions { remove_noise_units: false })?;
        assert_eq!(all.unit_ids(), vec![1001, 2000, 1002]);
        Ok(())
    }

    #[test]
    fn test_start_frame_shift() -> Result<()> {
        let tmp = TempDir::new()?;
        let path = tmp.path().join("sorting.spk");
        let opts = HdsortWriteOptions { start_frame: 1000, ..Default::default() };
        HdsortSorting::write(&source(), &path, &opts)?;

        let back = HdsortSorting::open(&path)?;
        assert_eq!(back.start_frame(), 1000);
        assert_eq!(back.full_event_sequence(1001)?, vec![5, 50, 500]);

        let raw = Container::open(&path)?;
        assert!(raw.root().contains(SORTING_INFO_KEY));
        Ok(())
    }

    #[test]
    fn test_write_skips_unrepresented_data() -> Result<()> {
        let tmp = TempDir::new()?;
        let path = tmp.path().join("sorting.spk");
        let mut s = source();
        s.set_property("depths", vec![1.0.into(), 2.0.into(), 3.0.into()])?;
        s.set_feature(1001, "pc_features", NdArray::from_f64(vec![0.1, 0.2, 0.3]))?;
        HdsortSorting::write(&s, &path, &HdsortWriteOptions::default())?;

        let back = HdsortSorting::open(&path)?;
        assert!(!back.has_property("depths"));
        assert!(!back.has_feature(1001, "pc_features"));
        assert!(back.has_property(TEMPLATE));
        assert!(back.has_feature(1001, AMPLITUDES));
        Ok(())
    }

    #[test]
    fn test_positions_follow_detection_channel() -> Result<()> {
        let tmp = TempDir::new()?;
        let path = tmp.path().join("sorting.spk");
        let mut s = source();
        s.set_feature(1001, DETECTION_CHANNEL, NdArray::from_i64(&[2, 1, 3]))?;
        s.set_feature(2000, DETECTION_CHANNEL, NdArray::from_i64(&[1]))?;
        s.set_feature(1002, DETECTION_CHANNEL, NdArray::from_i64(&[]))?;
        let opts = HdsortWriteOptions {
            locations: Some(vec![[0.0, 0.0], [10.0, 20.0], [30.0, 40.0]]),
            ..Default::default()
        };
        HdsortSorting::write(&s, &path, &opts)?;

        let back = HdsortSorting::open(&path)?;
        let positions = back.feature(1001, POSITIONS)?;
        assert_eq!(positions.shape(), &Shape::d2(3, 2));
        assert_eq!(positions.data(), &[10.0, 20.0, 0.0, 0.0, 30.0, 40.0]);
        assert_eq!(back.electrode_positions().unwrap().num_rows(), 3);
        Ok(())
    }
}
