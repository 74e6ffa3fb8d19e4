//! Canonical in-memory unit store.
//!
//! Invariants upheld by every mutator:
//! - the unit id set is fixed at construction and contains no duplicates;
//! - each unit has exactly one ascending event sequence (possibly empty);
//! - a property is set for all units at once, with one kind per name;
//! - a feature's row count equals its unit's event count.

use std::collections::{BTreeMap, HashMap};

use super::traits::unknown_unit;
use super::{Frame, FrameWindow, PropertyKind, PropertyValue, SortingSource, UnitId};
use crate::util::{Error, NdArray, Result};

#[derive(Clone, Debug, Default)]
struct UnitData {
    events: Vec<Frame>,
    features: BTreeMap<String, NdArray>,
}

/// In-memory store of units, their events, properties and features.
#[derive(Clone, Debug)]
pub struct UnitStore {
    sampling_rate: f64,
    ids: Vec<UnitId>,
    index: HashMap<UnitId, usize>,
    units: Vec<UnitData>,
    properties: BTreeMap<String, (PropertyKind, Vec<PropertyValue>)>,
}

impl UnitStore {
    /// Create a store with the given units, all with empty event sequences.
    pub fn new(ids: Vec<UnitId>, sampling_rate: f64) -> Result<Self> {
        let mut index = HashMap::with_capacity(ids.len());
        for (i, &id) in ids.iter().enumerate() {
            if index.insert(id, i).is_some() {
                return Err(Error::DuplicateUnit(id));
            }
        }
        let units = vec![UnitData::default(); ids.len()];
        Ok(Self { sampling_rate, ids, index, units, properties: BTreeMap::new() })
    }

    /// Copy everything a source exposes into a new store.
    #[tracing::instrument(skip_all, fields(format = source.format_name()))]
    pub fn from_source(source: &dyn SortingSource) -> Result<Self> {
        let ids = source.unit_ids();
        let mut store = Self::new(ids.clone(), source.sampling_rate())?;
        for &id in &ids {
            store.set_event_sequence(id, source.full_event_sequence(id)?)?;
            for name in source.unit_feature_names(id)? {
                let feature = source.feature(id, &name)?;
                store.set_feature(id, &name, feature)?;
            }
        }
        for name in source.property_names() {
            let values = ids
                .iter()
                .map(|&id| source.property(id, &name))
                .collect::<Result<Vec<_>>>()?;
            store.set_property(&name, values)?;
        }
        tracing::debug!(units = ids.len(), "materialized store");
        Ok(store)
    }

    /// Position of a unit in iteration order.
    pub fn unit_index(&self, unit: UnitId) -> Result<usize> {
        self.index.get(&unit).copied().ok_or_else(|| unknown_unit(unit, &self.ids))
    }

    /// Unit ids in iteration order.
    pub fn ids(&self) -> &[UnitId] {
        &self.ids
    }

    /// Number of units.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Replace a unit's events. Frames are sorted ascending.
    pub fn set_event_sequence(&mut self, unit: UnitId, mut frames: Vec<Frame>) -> Result<()> {
        let idx = self.unit_index(unit)?;
        frames.sort_unstable();
        let data = &mut self.units[idx];
        if let Some((name, f)) = data.features.iter().find(|(_, f)| f.num_rows() != frames.len()) {
            return Err(Error::FeatureLength {
                unit,
                name: name.clone(),
                expected: frames.len(),
                actual: f.num_rows(),
            });
        }
        data.events = frames;
        Ok(())
    }

    /// Events of one unit.
    pub fn events(&self, unit: UnitId) -> Result<&[Frame]> {
        Ok(&self.units[self.unit_index(unit)?].events)
    }

    /// Set a property for every unit at once, in iteration order.
    pub fn set_property(&mut self, name: &str, values: Vec<PropertyValue>) -> Result<()> {
        if values.len() != self.ids.len() {
            return Err(Error::PropertyCount {
                name: name.to_string(),
                expected: self.ids.len(),
                actual: values.len(),
            });
        }
        let kind = match values.first() {
            Some(v) => v.kind(),
            None => PropertyKind::Float,
        };
        if let Some(odd) = values.iter().find(|v| v.kind() != kind) {
            return Err(Error::PropertyKind {
                name: name.to_string(),
                expected: format!("{:?}", kind),
                actual: format!("{:?}", odd.kind()),
            });
        }
        self.properties.insert(name.to_string(), (kind, values));
        Ok(())
    }

    /// Kind of a property, if set.
    pub fn property_kind(&self, name: &str) -> Option<PropertyKind> {
        self.properties.get(name).map(|(k, _)| *k)
    }

    /// Borrow a property value.
    pub fn property_ref(&self, unit: UnitId, name: &str) -> Result<&PropertyValue> {
        let idx = self.unit_index(unit)?;
        self.properties
            .get(name)
            .map(|(_, values)| &values[idx])
            .ok_or_else(|| Error::PropertyNotFound(name.to_string()))
    }

    /// Attach a per-event feature to one unit.
    pub fn set_feature(&mut self, unit: UnitId, name: &str, values: NdArray) -> Result<()> {
        let idx = self.unit_index(unit)?;
        let data = &mut self.units[idx];
        if values.num_rows() != data.events.len() || values.shape().is_scalar() {
            return Err(Error::FeatureLength {
                unit,
                name: name.to_string(),
                expected: data.events.len(),
                actual: if values.shape().is_scalar() { 1 } else { values.num_rows() },
            });
        }
        data.features.insert(name.to_string(), values);
        Ok(())
    }

    /// Borrow a feature.
    pub fn feature_ref(&self, unit: UnitId, name: &str) -> Result<&NdArray> {
        let idx = self.unit_index(unit)?;
        self.units[idx]
            .features
            .get(name)
            .ok_or_else(|| Error::FeatureNotFound(name.to_string()))
    }
}

impl SortingSource for UnitStore {
    fn format_name(&self) -> &str {
        "memory"
    }

    fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    fn unit_ids(&self) -> Vec<UnitId> {
        self.ids.clone()
    }

    fn event_sequence(&self, unit: UnitId, window: FrameWindow) -> Result<Vec<Frame>> {
        let events = self.events(unit)?;
        match (events.first(), events.last()) {
            (Some(&min), Some(&max)) if !window.is_unbounded() => window.select_clamped(events, min, max),
            _ => Ok(events.to_vec()),
        }
    }

    fn property_names(&self) -> Vec<String> {
        self.properties.keys().cloned().collect()
    }

    fn property(&self, unit: UnitId, name: &str) -> Result<PropertyValue> {
        self.property_ref(unit, name).cloned()
    }

    fn unit_feature_names(&self, unit: UnitId) -> Result<Vec<String>> {
        let idx = self.unit_index(unit)?;
        Ok(self.units[idx].features.keys().cloned().collect())
    }

    fn feature(&self, unit: UnitId, name: &str) -> Result<NdArray> {
        self.feature_ref(unit, name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::ErrorKind;

    fn store() -> UnitStore {
        let mut s = UnitStore::new(vec![3, 1, 2], 30000.0).unwrap();
        s.set_event_sequence(3, vec![30, 10, 20]).unwrap();
        s.set_event_sequence(1, vec![5]).unwrap();
        s
    }

    #[test]
    fn test_duplicate_ids() {
        assert!(matches!(UnitStore::new(vec![1, 1], 1.0), Err(Error::DuplicateUnit(1))));
    }

    #[test]
    fn test_events_sorted_and_empty_default() {
        let s = store();
        assert_eq!(s.events(3).unwrap(), &[10, 20, 30]);
        assert!(s.events(2).unwrap().is_empty());
        assert_eq!(s.unit_ids(), vec![3, 1, 2]);
    }

    #[test]
    fn test_unknown_unit_lists_valid_ids() {
        let s = store();
        let err = s.event_sequence(9, FrameWindow::ALL).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Range);
        match err {
            Error::UnknownUnit { unit, valid } => {
                assert_eq!(unit, 9);
                assert_eq!(valid, vec![3, 1, 2]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_window() {
        let s = store();
        assert_eq!(s.event_sequence(3, FrameWindow::between(15, 30)).unwrap(), vec![20]);
        assert_eq!(s.event_sequence(3, FrameWindow::new(Some(0), None)).unwrap(), vec![10, 20, 30]);
        assert!(s.event_sequence(3, FrameWindow::between(40, 50)).is_err());
        assert!(s.event_sequence(2, FrameWindow::between(40, 50)).unwrap().is_empty());
    }

    #[test]
    fn test_property_homogeneous() {
        let mut s = store();
        s.set_property("snr", vec![1.0.into(), 2.0.into(), 3.0.into()]).unwrap();
        assert_eq!(s.property(1, "snr").unwrap(), PropertyValue::Float(2.0));
        assert!(s.set_property("snr", vec![1.0.into()]).is_err());
        let err = s.set_property("mixed", vec![1.0.into(), 2i64.into(), 3.0.into()]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Schema);
        assert!(s.property(1, "missing").is_err());
    }

    #[test]
    fn test_feature_length() {
        let mut s = store();
        s.set_feature(3, "amplitudes", NdArray::from_f64(vec![1.0, 2.0, 3.0])).unwrap();
        assert!(s.set_feature(1, "amplitudes", NdArray::from_f64(vec![1.0, 2.0])).is_err());
        assert!(s.set_event_sequence(3, vec![1]).is_err());
        assert!(s.has_feature(3, "amplitudes"));
        assert!(!s.has_feature(1, "amplitudes"));
        assert_eq!(s.feature_names(), vec!["amplitudes".to_string()]);
    }

    #[test]
    fn test_from_source_copies_everything() {
        let mut s = store();
        s.set_property("label", vec!["a".into(), "b".into(), "c".into()]).unwrap();
        s.set_feature(1, "amplitudes", NdArray::from_f64(vec![7.0])).unwrap();
        let copy = UnitStore::from_source(&s).unwrap();
        assert_eq!(copy.ids(), s.ids());
        assert_eq!(copy.events(3).unwrap(), &[10, 20, 30]);
        assert_eq!(copy.property(2, "label").unwrap(), PropertyValue::Text("c".into()));
        assert_eq!(copy.feature(1, "amplitudes").unwrap().data(), &[7.0]);
    }
}
