//! ALF probe directories.
//!
//! A probe directory holds flat arrays named `<object>.<attribute>.npy`:
//!
//! ```text
//! probe00/
//!   spikes.times.npy        event times in seconds
//!   spikes.clusters.npy     unit index of each event
//!   spikes.<name>.npy       per-event features, first axis = events
//!   clusters.<name>.npy     per-unit properties, first axis = units
//!   clusters.metrics.csv    scalar per-unit metrics, optional cluster_id
//! ```
//!
//! Event grouping is deferred to the first event or feature request and
//! cached for the lifetime of the reader.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::{
    to_seconds, EventCache, Frame, FrameWindow, GroupedEvents, PropertyValue, SortingSink, SortingSource,
    UnitId, UnitStore,
};
use crate::io::{load_array, load_table, save_array, save_table, Table};
use crate::schema::constants::*;
use crate::schema::{column_values, metric_table, property_artifact, PropertyPartition};
use crate::util::{Error, NdArray, Result};

/// Options for reading ALF directories.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlfOptions {
    /// Sampling rate used to convert stored seconds to frames.
    pub sampling_rate: f64,
}

impl Default for AlfOptions {
    fn default() -> Self {
        Self { sampling_rate: DEFAULT_ALF_SAMPLING_RATE }
    }
}

/// Reject directories whose name lacks the probe marker.
pub fn check_folder_name(path: &Path) -> Result<()> {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    if name.contains(ALF_FOLDER_MARKER) {
        Ok(())
    } else {
        Err(Error::InvalidFolderName {
            path: path.to_path_buf(),
            rule: format!("folder name must contain {:?}", ALF_FOLDER_MARKER),
        })
    }
}

/// Reader for one ALF probe directory.
pub struct AlfSorting {
    root: PathBuf,
    /// Unit ids and per-unit properties; events live in `events`
    catalog: UnitStore,
    times: Vec<f64>,
    labels: Vec<i64>,
    spike_features: BTreeMap<String, NdArray>,
    events: EventCache,
}

impl AlfSorting {
    /// Open a directory with default options.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, &AlfOptions::default())
    }

    /// Open a directory.
    #[tracing::instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open_with(path: impl AsRef<Path>, options: &AlfOptions) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        check_folder_name(&root)?;
        if !root.is_dir() {
            return Err(Error::FileNotFound(root));
        }

        let mut spikes = BTreeMap::new();
        let mut clusters = BTreeMap::new();
        let mut metrics: Option<Table> = None;
        for entry in fs::read_dir(&root)? {
            let path = entry?.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Some(stem) = file_name.strip_suffix(".npy") {
                if let Some(attr) = stem.strip_prefix("spikes.") {
                    spikes.insert(attr.to_string(), load_array(&path)?);
                } else if let Some(attr) = stem.strip_prefix("clusters.") {
                    clusters.insert(attr.to_string(), load_array(&path)?);
                }
            } else if file_name == format!("{}.csv", METRICS_TABLE) {
                metrics = Some(load_table(&path)?);
            }
        }

        let missing = |name: &str| Error::MissingArtifact { name: format!("{}.npy", name), dir: root.clone() };
        let times = spikes.remove("times").ok_or_else(|| missing(SPIKES_TIMES))?;
        let labels = spikes.remove("clusters").ok_or_else(|| missing(SPIKES_CLUSTERS))?;
        if times.len() != labels.len() {
            return Err(Error::ColumnLengthMismatch {
                field: SPIKES_CLUSTERS.to_string(),
                expected: times.len(),
                actual: labels.len(),
            });
        }
        let labels = labels.to_i64_vec();
        let times = times.into_data();

        let unit_count = match (clusters.values().next(), &metrics) {
            (Some(first), _) => first.num_rows(),
            (None, Some(table)) if !table.is_empty() => table.num_rows(),
            _ => labels.iter().max().map_or(0, |&m| (m + 1).max(0) as usize),
        };
        let ids: Vec<UnitId> = match metrics.as_ref().and_then(|t| t.column(CLUSTER_ID_COLUMN)) {
            Some(cells) => cells
                .iter()
                .map(|c| {
                    c.as_i64().ok_or_else(|| Error::TypeMismatch {
                        expected: "integer cluster_id".to_string(),
                        actual: c.to_string(),
                    })
                })
                .collect::<Result<_>>()?,
            None => (0..unit_count as UnitId).collect(),
        };

        let mut catalog = UnitStore::new(ids, options.sampling_rate)?;
        for (name, array) in &clusters {
            catalog.set_property(name, array.rows().map(PropertyValue::from_row).collect())?;
        }
        if let Some(table) = &metrics {
            for (name, cells) in table.iter() {
                catalog.set_property(name, column_values(cells))?;
            }
        }

        let n_spikes = times.len();
        let spike_features: BTreeMap<String, NdArray> = spikes
            .into_iter()
            .filter(|(name, array)| {
                let aligned = !array.shape().is_scalar() && array.num_rows() == n_spikes;
                if !aligned {
                    tracing::debug!(feature = %name, shape = %array.shape(), "not aligned with spikes; ignored");
                }
                aligned
            })
            .collect();

        tracing::debug!(
            units = catalog.len(),
            spikes = n_spikes,
            features = spike_features.len(),
            "opened ALF folder"
        );
        Ok(Self { root, catalog, times, labels, spike_features, events: EventCache::new() })
    }

    /// Directory this reader was opened on.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Check if events have been grouped yet.
    pub fn is_grouped(&self) -> bool {
        self.events.is_built()
    }

    fn grouped(&self) -> Result<Arc<GroupedEvents>> {
        self.events.get_or_try_build(|| {
            GroupedEvents::from_seconds(&self.times, &self.labels, self.catalog.sampling_rate())
        })
    }

    /// Largest event frame over all units.
    pub fn max_frame(&self) -> Result<Option<Frame>> {
        Ok(self.grouped()?.max_frame())
    }
}

impl SortingSource for AlfSorting {
    fn format_name(&self) -> &str {
        "alf"
    }

    fn sampling_rate(&self) -> f64 {
        self.catalog.sampling_rate()
    }

    fn unit_ids(&self) -> Vec<UnitId> {
        self.catalog.unit_ids()
    }

    fn event_sequence(&self, unit: UnitId, window: FrameWindow) -> Result<Vec<Frame>> {
        let index = self.catalog.unit_index(unit)?;
        let grouped = self.grouped()?;
        match grouped.get(index as i64) {
            Some(events) => window.select_clamped(&events.frames, events.min_frame, events.max_frame),
            None => Ok(Vec::new()),
        }
    }

    fn property_names(&self) -> Vec<String> {
        self.catalog.property_names()
    }

    fn property(&self, unit: UnitId, name: &str) -> Result<PropertyValue> {
        self.catalog.property(unit, name)
    }

    fn unit_feature_names(&self, unit: UnitId) -> Result<Vec<String>> {
        self.catalog.unit_index(unit)?;
        Ok(self.spike_features.keys().cloned().collect())
    }

    fn feature(&self, unit: UnitId, name: &str) -> Result<NdArray> {
        let index = self.catalog.unit_index(unit)?;
        let values = self
            .spike_features
            .get(name)
            .ok_or_else(|| Error::FeatureNotFound(name.to_string()))?;
        let grouped = self.grouped()?;
        let rows = grouped.get(index as i64).map_or(&[][..], |e| &e.source_index[..]);
        values.gather_rows(rows)
    }
}

impl SortingSink for AlfSorting {
    type Options = ();

    #[tracing::instrument(skip_all, fields(path = %destination.display()))]
    fn write(source: &dyn SortingSource, destination: &Path, _options: &()) -> Result<()> {
        check_folder_name(destination)?;
        fs::create_dir_all(destination)?;

        let partition = PropertyPartition::of(source)?;
        for name in &partition.array_artifacts {
            let path = destination.join(format!("{}.{}.npy", CLUSTERS_PREFIX, name));
            save_array(path, &property_artifact(source, name)?)?;
        }
        save_table(destination.join(format!("{}.csv", METRICS_TABLE)), &metric_table(source, &partition)?)?;

        let ids = source.unit_ids();
        let sampling_rate = source.sampling_rate();
        let features: Vec<String> = source
            .feature_names()
            .into_iter()
            .filter(|name| {
                let shared = ids.iter().all(|&id| source.has_feature(id, name));
                if !shared {
                    tracing::warn!(feature = %name, "feature missing on some units; skipped");
                }
                shared
            })
            .collect();

        let mut times = Vec::new();
        let mut clusters = Vec::new();
        let mut parts: Vec<Vec<NdArray>> = vec![Vec::new(); features.len()];
        for (unit_index, &id) in ids.iter().enumerate() {
            let frames = source.full_event_sequence(id)?;
            times.extend(frames.iter().map(|&f| to_seconds(f, sampling_rate)));
            clusters.extend(std::iter::repeat(unit_index as i64).take(frames.len()));
            for (name, part) in features.iter().zip(parts.iter_mut()) {
                part.push(source.feature(id, name)?);
            }
        }

        let mut order: Vec<usize> = (0..times.len()).collect();
        order.sort_by(|&a, &b| times[a].total_cmp(&times[b]));
        let sorted_times: Vec<f64> = order.iter().map(|&i| times[i]).collect();
        let sorted_clusters: Vec<i64> = order.iter().map(|&i| clusters[i]).collect();
        save_array(destination.join(format!("{}.npy", SPIKES_TIMES)), &NdArray::from_f64(sorted_times))?;
        save_array(destination.join(format!("{}.npy", SPIKES_CLUSTERS)), &NdArray::from_i64(&sorted_clusters))?;
        for (name, part) in features.iter().zip(parts) {
            let values = NdArray::concat(&part)?.gather_rows(&order)?;
            save_array(destination.join(format!("{}.{}.npy", SPIKES_PREFIX, name)), &values)?;
        }

        tracing::info!(units = ids.len(), spikes = order.len(), "wrote ALF folder");
        Ok(())
    }
}
