//! Yass output directories.
//!
//! ```text
//! root/
//!   config.yaml                                  recordings.sampling_rate
//!   tmp/output/spike_train.npy                   (N, 2) of [frame, unit]
//!   tmp/output/templates/templates_0sec.npy      (n_units, n_samples, n_channels), optional
//! ```
//!
//! Templates are exposed as property `template` with shape
//! `(n_channels, n_samples)`, matching the other adapters.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::core::{
    EventCache, Frame, FrameWindow, GroupedEvents, PropertyValue, SortingSink, SortingSource, UnitId,
    UnitStore,
};
use crate::io::{load_array, load_config, require_f64, save_array, save_config};
use crate::schema::constants::*;
use crate::schema::Unrepresented;
use crate::util::{ElementKind, Error, NdArray, Result, Shape};

/// Options for reading Yass output. The sampling rate comes from `config.yaml`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct YassOptions {
    /// Skip loading templates even when present.
    pub skip_templates: bool,
}

fn output_dir(root: &Path) -> PathBuf {
    YASS_OUTPUT_DIR.iter().fold(root.to_path_buf(), |p, part| p.join(part))
}

/// Reader for one Yass output directory.
pub struct YassSorting {
    root: PathBuf,
    /// Unit ids and properties; events live in `events`
    catalog: UnitStore,
    frames: Vec<Frame>,
    labels: Vec<i64>,
    events: EventCache,
}

impl YassSorting {
    /// Open an output directory with default options.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(root, &YassOptions::default())
    }

    /// Open an output directory.
    #[tracing::instrument(skip_all, fields(path = %root.as_ref().display()))]
    pub fn open_with(root: impl AsRef<Path>, options: &YassOptions) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let config_path = root.join(YASS_CONFIG);
        let train_path = output_dir(&root).join(YASS_SPIKE_TRAIN);
        for required in [&config_path, &train_path] {
            if !required.is_file() {
                return Err(Error::MissingArtifact {
                    name: required.strip_prefix(&root).unwrap_or(required.as_path()).display().to_string(),
                    dir: root.clone(),
                });
            }
        }

        let config = load_config(&config_path)?;
        let sampling_rate = require_f64(&config, YASS_SAMPLING_RATE_KEY)?;

        let train = load_array(&train_path)?;
        if train.shape().rank() != 2 || train.shape().size(1) != Some(2) {
            return Err(Error::TypeMismatch {
                expected: "spike train of shape (N, 2)".to_string(),
                actual: format!("shape {}", train.shape()),
            });
        }
        let pairs = train.to_i64_vec();
        let frames: Vec<Frame> = pairs.iter().step_by(2).copied().collect();
        let labels: Vec<i64> = pairs.iter().skip(1).step_by(2).copied().collect();

        let mut ids = labels.clone();
        ids.sort_unstable();
        ids.dedup();
        let mut catalog = UnitStore::new(ids, sampling_rate)?;

        let templates_path = output_dir(&root).join(YASS_TEMPLATES_DIR).join(YASS_TEMPLATES);
        if !options.skip_templates && templates_path.is_file() {
            let templates = load_array(&templates_path)?;
            let indexable = templates.shape().rank() == 3
                && catalog.ids().iter().all(|&id| id >= 0 && (id as usize) < templates.num_rows());
            if indexable {
                let values = catalog
                    .ids()
                    .iter()
                    .map(|&id| Ok(PropertyValue::Array(templates.row(id as usize)?.transpose())))
                    .collect::<Result<Vec<_>>>()?;
                catalog.set_property(TEMPLATE, values)?;
            } else {
                tracing::warn!(shape = %templates.shape(), "templates do not cover every unit; ignored");
            }
        }

        tracing::debug!(units = catalog.len(), spikes = frames.len(), sampling_rate, "opened Yass output");
        Ok(Self { root, catalog, frames, labels, events: EventCache::new() })
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
        self.events.get_or_try_build(|| GroupedEvents::from_frames(&self.frames, &self.labels))
    }
}

impl SortingSource for YassSorting {
    fn format_name(&self) -> &str {
        "yass"
    }

    fn sampling_rate(&self) -> f64 {
        self.catalog.sampling_rate()
    }

    fn unit_ids(&self) -> Vec<UnitId> {
        self.catalog.unit_ids()
    }

    fn event_sequence(&self, unit: UnitId, window: FrameWindow) -> Result<Vec<Frame>> {
        self.catalog.unit_index(unit)?;
        let grouped = self.grouped()?;
        match grouped.get(unit) {
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
        Ok(Vec::new())
    }

    fn feature(&self, unit: UnitId, name: &str) -> Result<NdArray> {
        self.catalog.unit_index(unit)?;
        Err(Error::FeatureNotFound(name.to_string()))
    }
}

/// Templates indexed by unit id, or `None` if any unit lacks one.
fn templates_by_id(source: &dyn SortingSource) -> Result<Option<NdArray>> {
    let ids = source.unit_ids();
    if !source.has_property(TEMPLATE) || ids.iter().any(|&id| id < 0) {
        return Ok(None);
    }
    let mut shape: Option<Shape> = None;
    let mut rows = Vec::with_capacity(ids.len());
    for &id in &ids {
        let PropertyValue::Array(t) = source.property(id, TEMPLATE)? else {
            return Ok(None);
        };
        let t = t.transpose();
        match &shape {
            Some(s) if s != t.shape() => return Ok(None),
            Some(_) => {}
            None => shape = Some(t.shape().clone()),
        }
        rows.push((id as usize, t));
    }
    let Some(shape) = shape else {
        return Ok(None);
    };
    let n_units = rows.iter().map(|(id, _)| id + 1).max().unwrap_or(0);
    let mut table = vec![NdArray::zeros(shape); n_units];
    for (id, t) in rows {
        table[id] = t;
    }
    Ok(Some(NdArray::stack(&table)?))
}

impl SortingSink for YassSorting {
    type Options = ();

    #[tracing::instrument(skip_all, fields(path = %destination.display()))]
    fn write(source: &dyn SortingSource, destination: &Path, _options: &()) -> Result<()> {
        let skipped = Unrepresented::of(source, "yass", &YASS_PROPERTIES, &YASS_FEATURES);
        let output = output_dir(destination);
        fs::create_dir_all(&output)?;

        let mut pairs: Vec<(Frame, UnitId)> = Vec::new();
        for id in source.unit_ids() {
            pairs.extend(source.full_event_sequence(id)?.into_iter().map(|f| (f, id)));
        }
        pairs.sort_by_key(|&(frame, _)| frame);
        let flat: Vec<i64> = pairs.iter().flat_map(|&(f, id)| [f, id]).collect();
        let train = NdArray::from_i64(&flat).reshape(Shape::d2(pairs.len(), 2))?;
        save_array(output.join(YASS_SPIKE_TRAIN), &train)?;

        let config = json!({ "recordings": { "sampling_rate": source.sampling_rate() } });
        save_config(destination.join(YASS_CONFIG), &config)?;

        match templates_by_id(source)? {
            Some(templates) => {
                let dir = output.join(YASS_TEMPLATES_DIR);
                fs::create_dir_all(&dir)?;
                save_array(dir.join(YASS_TEMPLATES), &templates.with_kind(ElementKind::Float))?;
            }
            None if source.has_property(TEMPLATE) => {
                tracing::warn!("templates differ in shape or id range; not written");
            }
            None => {}
        }

        tracing::info!(
            skipped = skipped.properties.len() + skipped.features.len(),
            units = source.num_units(),
            spikes = pairs.len(),
            "wrote Yass output"
        );
        Ok(())
    }
}
