//! Splitting a source's properties across output artifacts, and resolving
//! every optional write input to a concrete value before anything is written.

use crate::core::{Frame, PropertyKind, PropertyValue, SortingSource, UnitId};
use crate::io::{Cell, Table};
use crate::util::{ElementKind, Error, NdArray, Result, Shape};

use super::constants::*;

/// Where a property goes when a source is written as ALF.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Destination {
    /// A column of the combined metric table
    MetricColumn,
    /// Its own `clusters.<name>.npy`, one row per unit
    ArrayArtifact,
    /// Not representable (text outside the metric allow-list)
    Skipped,
}

/// Route a property by name and kind.
pub fn destination(name: &str, kind: PropertyKind) -> Destination {
    match kind {
        PropertyKind::Array => Destination::ArrayArtifact,
        PropertyKind::Text if is_metric_column(name) => Destination::MetricColumn,
        PropertyKind::Text => Destination::Skipped,
        PropertyKind::Int | PropertyKind::Float if is_metric_column(name) => Destination::MetricColumn,
        PropertyKind::Int | PropertyKind::Float => Destination::ArrayArtifact,
    }
}

/// Property names of a source grouped by [`Destination`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PropertyPartition {
    pub metric_columns: Vec<String>,
    pub array_artifacts: Vec<String>,
    pub skipped: Vec<String>,
}

impl PropertyPartition {
    /// Partition the properties of `source`, judging kinds by its first unit.
    pub fn of(source: &dyn SortingSource) -> Result<Self> {
        let mut partition = Self::default();
        let first = source.unit_ids().first().copied();
        for name in source.property_names() {
            let kind = match first {
                Some(unit) => source.property(unit, &name)?.kind(),
                None => PropertyKind::Float,
            };
            match destination(&name, kind) {
                Destination::MetricColumn => partition.metric_columns.push(name),
                Destination::ArrayArtifact => partition.array_artifacts.push(name),
                Destination::Skipped => {
                    tracing::warn!(property = %name, "text property has no ALF representation; skipped");
                    partition.skipped.push(name);
                }
            }
        }
        Ok(partition)
    }
}

/// Properties and features a target format has no place for.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Unrepresented {
    pub properties: Vec<String>,
    pub features: Vec<String>,
}

impl Unrepresented {
    /// Collect what `source` carries beyond `kept_properties` and
    /// `kept_features`, warning once per dropped name.
    pub fn of(
        source: &dyn SortingSource,
        format: &str,
        kept_properties: &[&str],
        kept_features: &[&str],
    ) -> Self {
        let properties: Vec<String> = source
            .property_names()
            .into_iter()
            .filter(|name| !kept_properties.contains(&name.as_str()))
            .collect();
        let features: Vec<String> = source
            .feature_names()
            .into_iter()
            .filter(|name| !kept_features.contains(&name.as_str()))
            .collect();
        for name in &properties {
            tracing::warn!(property = %name, format, "property has no representation; skipped");
        }
        for name in &features {
            tracing::warn!(feature = %name, format, "feature has no representation; skipped");
        }
        Self { properties, features }
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty() && self.features.is_empty()
    }
}

/// Metric table cell for a scalar property value.
pub fn metric_cell(value: &PropertyValue) -> Cell {
    match value {
        PropertyValue::Int(v) => Cell::Int(*v),
        PropertyValue::Float(v) if v.is_nan() => Cell::Missing,
        PropertyValue::Float(v) => Cell::Float(*v),
        PropertyValue::Text(s) if s.is_empty() => Cell::Missing,
        PropertyValue::Text(s) => Cell::Text(s.clone()),
        PropertyValue::Array(a) => match a.as_scalar() {
            Some(v) => Cell::Float(v),
            None => Cell::Text(value.to_string()),
        },
    }
}

/// Property values for one metric table column, with one kind for the whole column.
///
/// All-integer columns stay integers, numeric columns with gaps become floats
/// (gaps read as NaN), and anything else becomes text.
pub fn column_values(cells: &[Cell]) -> Vec<PropertyValue> {
    let all_int = cells.iter().all(|c| matches!(c, Cell::Int(_)));
    let all_numeric = cells.iter().all(|c| c.as_f64().is_some());
    cells
        .iter()
        .map(|cell| match cell {
            Cell::Int(v) if all_int => PropertyValue::Int(*v),
            c if all_numeric => PropertyValue::Float(c.as_f64().unwrap_or(f64::NAN)),
            c => PropertyValue::Text(c.to_string()),
        })
        .collect()
}

/// Build the combined metric table.
///
/// The id column always comes first: the source's `cluster_id` property when
/// it has one, else the unit ids.
pub fn metric_table(source: &dyn SortingSource, partition: &PropertyPartition) -> Result<Table> {
    let ids = source.unit_ids();
    let column = |name: &str| -> Result<Vec<Cell>> {
        ids.iter().map(|&id| Ok(metric_cell(&source.property(id, name)?))).collect()
    };

    let mut table = Table::new();
    let id_cells = if source.has_property(CLUSTER_ID_COLUMN) {
        column(CLUSTER_ID_COLUMN)?
    } else {
        ids.iter().map(|&id| Cell::Int(id)).collect()
    };
    table.push_column(CLUSTER_ID_COLUMN, id_cells)?;
    for name in partition.metric_columns.iter().filter(|n| *n != CLUSTER_ID_COLUMN) {
        table.push_column(name.as_str(), column(name)?)?;
    }
    Ok(table)
}

/// Stack one property over all units into an array indexed by unit.
pub fn property_artifact(source: &dyn SortingSource, name: &str) -> Result<NdArray> {
    let rows = source
        .unit_ids()
        .into_iter()
        .map(|id| {
            source.property(id, name)?.to_array().ok_or_else(|| Error::TypeMismatch {
                expected: "numeric property".to_string(),
                actual: format!("text property {}", name),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    NdArray::stack(&rows)
}

/// Channel count for synthesized geometry and footprints.
///
/// In priority order: an explicit geometry, the channel axis of the first
/// unit's template, the largest detection channel of any unit, then 1.
pub fn channel_count(source: &dyn SortingSource, explicit: Option<usize>) -> Result<usize> {
    if let Some(n) = explicit {
        return Ok(n);
    }
    let ids = source.unit_ids();
    if source.has_property(TEMPLATE) {
        if let Some(&first) = ids.first() {
            let template = source.property(first, TEMPLATE)?;
            if let Some(n) = template.as_array().and_then(|t| t.shape().size(0)) {
                return Ok(n);
            }
        }
    }
    let mut max_channel: Option<f64> = None;
    for &id in &ids {
        if source.has_feature(id, DETECTION_CHANNEL) {
            if let Some(m) = source.feature(id, DETECTION_CHANNEL)?.max() {
                max_channel = Some(max_channel.map_or(m, |c| c.max(m)));
            }
        }
    }
    Ok(max_channel.map_or(1, |m| (m.ceil() as usize).max(1)))
}

/// Electrode positions on a vertical line: x = 0, y = channel index.
pub fn synthesized_locations(n_channels: usize) -> Result<NdArray> {
    let data = (0..n_channels).flat_map(|i| [0.0, i as f64]).collect();
    NdArray::from_f64(data).reshape(Shape::d2(n_channels, 2))
}

/// Everything needed to write one unit to a container, defaults applied.
#[derive(Clone, Debug, PartialEq)]
pub struct UnitPlan {
    pub id: UnitId,
    /// Event frames shifted by the recording start frame
    pub spike_train: Vec<Frame>,
    /// Per-event amplitudes (ones when absent)
    pub amplitudes: NdArray,
    /// Per-event 1-based detection channel (ones when absent)
    pub detection_channel: NdArray,
    /// Footprint as stored: `(samples, channels)`
    pub footprint: NdArray,
    pub cut_left: i64,
}

/// Resolved container write: geometry, noise levels and per-unit plans.
#[derive(Clone, Debug, PartialEq)]
pub struct ContainerPlan {
    pub n_channels: usize,
    /// `(n_channels, 2)`
    pub locations: NdArray,
    /// `(1, n_channels)`
    pub noise_std: NdArray,
    pub sampling_rate: f64,
    pub start_frame: Frame,
    pub units: Vec<UnitPlan>,
}

impl ContainerPlan {
    /// Resolve every optional input of a container write.
    #[tracing::instrument(skip_all)]
    pub fn resolve(
        source: &dyn SortingSource,
        locations: Option<NdArray>,
        noise_std: Option<NdArray>,
        start_frame: Frame,
    ) -> Result<Self> {
        if let Some(l) = &locations {
            if l.shape().rank() != 2 || l.shape().size(1) != Some(2) {
                return Err(Error::TypeMismatch {
                    expected: "locations of shape (n_channels, 2)".to_string(),
                    actual: format!("shape {}", l.shape()),
                });
            }
        }
        let n_channels = channel_count(source, locations.as_ref().map(NdArray::num_rows))?;
        let locations = match locations {
            Some(l) => l,
            None => synthesized_locations(n_channels)?,
        };
        let noise_std = match noise_std {
            Some(n) if n.len() != n_channels => {
                return Err(Error::ColumnLengthMismatch {
                    field: NOISE_STD_KEY.to_string(),
                    expected: n_channels,
                    actual: n.len(),
                })
            }
            Some(n) => n.reshape(Shape::d2(1, n_channels))?,
            None => NdArray::filled(Shape::d2(1, n_channels), ElementKind::Float, 1.0),
        };

        let has_template = source.has_property(TEMPLATE);
        let has_cut_left = source.has_property(TEMPLATE_CUT_LEFT);
        let default_footprint = NdArray::zeros(Shape::d2(DEFAULT_FOOTPRINT_SAMPLES, n_channels));

        let mut units = Vec::new();
        for id in source.unit_ids() {
            let events = source.full_event_sequence(id)?;
            let n = events.len();
            let amplitudes = if source.has_feature(id, AMPLITUDES) {
                source.feature(id, AMPLITUDES)?
            } else {
                NdArray::filled(Shape::d1(n), ElementKind::Float, 1.0)
            };
            let detection_channel = if source.has_feature(id, DETECTION_CHANNEL) {
                source.feature(id, DETECTION_CHANNEL)?.with_kind(ElementKind::Int)
            } else {
                NdArray::filled(Shape::d1(n), ElementKind::Int, 1.0)
            };
            let footprint = match has_template {
                true => match source.property(id, TEMPLATE)? {
                    PropertyValue::Array(t) if t.shape().rank() == 2 => t.transpose(),
                    _ => default_footprint.clone(),
                },
                false => default_footprint.clone(),
            };
            let cut_left = match has_cut_left {
                true => source.property(id, TEMPLATE_CUT_LEFT)?.as_i64().unwrap_or(DEFAULT_CUT_LEFT),
                false => DEFAULT_CUT_LEFT,
            };
            units.push(UnitPlan {
                id,
                spike_train: events.iter().map(|&f| f + start_frame).collect(),
                amplitudes,
                detection_channel,
                footprint,
                cut_left,
            });
        }
        tracing::debug!(units = units.len(), n_channels, "resolved container write plan");
        Ok(Self {
            n_channels,
            locations,
            noise_std,
            sampling_rate: source.sampling_rate(),
            start_frame,
            units,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::UnitStore;

    fn store() -> UnitStore {
        let mut s = UnitStore::new(vec![5, 9], 20000.0).unwrap();
        s.set_event_sequence(5, vec![10, 20]).unwrap();
        s.set_event_sequence(9, vec![7]).unwrap();
        s
    }

    #[test]
    fn test_destinations() {
        assert_eq!(destination("firing_rate", PropertyKind::Float), Destination::MetricColumn);
        assert_eq!(destination("ks2_label", PropertyKind::Text), Destination::MetricColumn);
        assert_eq!(destination("firing_rate", PropertyKind::Array), Destination::ArrayArtifact);
        assert_eq!(destination("depths", PropertyKind::Float), Destination::ArrayArtifact);
        assert_eq!(destination("comment", PropertyKind::Text), Destination::Skipped);
    }

    #[test]
    fn test_unrepresented_names() -> Result<()> {
        let mut s = store();
        s.set_property(TEMPLATE, vec![NdArray::zeros(Shape::d2(2, 3)).into(); 2])?;
        s.set_property("depths", vec![100.0.into(), 200.0.into()])?;
        s.set_feature(5, AMPLITUDES, NdArray::from_f64(vec![1.0, 2.0]))?;
        s.set_feature(9, "pc_features", NdArray::from_f64(vec![0.5]))?;

        let hdsort = Unrepresented::of(&s, "hdsort", &HDSORT_PROPERTIES, &HDSORT_FEATURES);
        assert_eq!(hdsort.properties, vec!["depths"]);
        assert_eq!(hdsort.features, vec!["pc_features"]);

        let yass = Unrepresented::of(&s, "yass", &YASS_PROPERTIES, &YASS_FEATURES);
        assert_eq!(yass.properties, vec!["depths"]);
        assert_eq!(yass.features, vec!["amplitudes", "pc_features"]);

        assert!(Unrepresented::of(&store(), "yass", &YASS_PROPERTIES, &YASS_FEATURES).is_empty());
        Ok(())
    }

    #[test]
    fn test_synthesized_locations() -> Result<()> {
        let l = synthesized_locations(3)?;
        assert_eq!(l.shape(), &Shape::d2(3, 2));
        assert_eq!(l.data(), &[0.0, 0.0, 0.0, 1.0, 0.0, 2.0]);
        assert_eq!(synthesized_locations(0)?.shape(), &Shape::d2(0, 2));
        Ok(())
    }

    #[test]
    fn test_partition_and_table() -> Result<()> {
        let mut s = store();
        s.set_property("firing_rate", vec![1.5.into(), f64::NAN.into()])?;
        s.set_property("ks2_label", vec!["good".into(), "mua".into()])?;
        s.set_property("depths", vec![100.0.into(), 200.0.into()])?;
        s.set_property("note", vec!["x".into(), "y".into()])?;
        s.set_property(TEMPLATE, vec![NdArray::zeros(Shape::d2(4, 3)).into(); 2])?;

        let p = PropertyPartition::of(&s)?;
        assert_eq!(p.metric_columns, vec!["firing_rate", "ks2_label"]);
        assert_eq!(p.array_artifacts, vec!["depths", "template"]);
        assert_eq!(p.skipped, vec!["note"]);

        let table = metric_table(&s, &p)?;
        assert_eq!(table.names(), &["cluster_id", "firing_rate", "ks2_label"]);
        assert_eq!(table.column("cluster_id").unwrap(), &[Cell::Int(5), Cell::Int(9)]);
        assert_eq!(table.column("firing_rate").unwrap(), &[Cell::Float(1.5), Cell::Missing]);

        let depths = property_artifact(&s, "depths")?;
        assert_eq!(depths.data(), &[100.0, 200.0]);
        assert_eq!(property_artifact(&s, TEMPLATE)?.shape(), &Shape::from_slice(&[2, 4, 3]));
        assert!(property_artifact(&s, "note").is_err());
        Ok(())
    }

    #[test]
    fn test_column_values() {
        let ints = column_values(&[Cell::Int(1), Cell::Int(2)]);
        assert_eq!(ints, vec![PropertyValue::Int(1), PropertyValue::Int(2)]);

        let gaps = column_values(&[Cell::Int(1), Cell::Missing, Cell::Float(0.5)]);
        assert_eq!(gaps[0], PropertyValue::Float(1.0));
        assert!(matches!(gaps[1], PropertyValue::Float(v) if v.is_nan()));

        let text = column_values(&[Cell::Text("good".into()), Cell::Int(3)]);
        assert_eq!(text, vec![PropertyValue::Text("good".into()), PropertyValue::Text("3".into())]);
    }

    #[test]
    fn test_channel_count_priority() -> Result<()> {
        let mut s = store();
        assert_eq!(channel_count(&s, None)?, 1);

        s.set_feature(5, DETECTION_CHANNEL, NdArray::from_i64(&[3, 12]))?;
        s.set_feature(9, DETECTION_CHANNEL, NdArray::from_i64(&[4]))?;
        assert_eq!(channel_count(&s, None)?, 12);

        s.set_property(TEMPLATE, vec![NdArray::zeros(Shape::d2(8, 30)).into(); 2])?;
        assert_eq!(channel_count(&s, None)?, 8);
        assert_eq!(channel_count(&s, Some(64))?, 64);
        Ok(())
    }

    #[test]
    fn test_default_footprint_uses_max_detection_channel() -> Result<()> {
        let mut s = store();
        s.set_feature(5, DETECTION_CHANNEL, NdArray::from_i64(&[1, 12]))?;
        let plan = ContainerPlan::resolve(&s, None, None, 0)?;
        assert_eq!(plan.n_channels, 12);
        assert_eq!(plan.locations.shape(), &Shape::d2(12, 2));
        assert_eq!(plan.noise_std.shape(), &Shape::d2(1, 12));
        for unit in &plan.units {
            assert_eq!(unit.footprint.shape(), &Shape::d2(DEFAULT_FOOTPRINT_SAMPLES, 12));
            assert_eq!(unit.cut_left, DEFAULT_CUT_LEFT);
        }
        // Unit 9 had no detection channel and gets ones
        assert_eq!(plan.units[1].detection_channel.data(), &[1.0]);
        assert_eq!(plan.units[1].amplitudes.data(), &[1.0]);
        Ok(())
    }

    #[test]
    fn test_plan_shifts_start_frame_and_transposes_template() -> Result<()> {
        let mut s = store();
        let template = NdArray::new(Shape::d2(2, 3), ElementKind::Float, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])?;
        s.set_property(TEMPLATE, vec![template.clone().into(); 2])?;
        s.set_property(TEMPLATE_CUT_LEFT, vec![7i64.into(); 2])?;
        let plan = ContainerPlan::resolve(&s, None, Some(NdArray::from_f64(vec![2.0, 3.0])), 100)?;
        assert_eq!(plan.units[0].spike_train, vec![110, 120]);
        assert_eq!(plan.units[0].footprint, template.transpose());
        assert_eq!(plan.units[0].cut_left, 7);
        assert_eq!(plan.noise_std.data(), &[2.0, 3.0]);

        let bad = ContainerPlan::resolve(&s, None, Some(NdArray::from_f64(vec![1.0])), 0);
        assert!(matches!(bad, Err(Error::ColumnLengthMismatch { .. })));
        Ok(())
    }
}
