//! Capability traits implemented by every format adapter.
//!
//! A [`SortingSource`] answers questions about units; a [`SortingSink`]
//! serializes any source into its own on-disk layout. [`UnitStore`] is both
//! the canonical in-memory model and a source, so adapters can be
//! materialized and written interchangeably.
//!
//! [`UnitStore`]: super::UnitStore

use std::collections::BTreeSet;
use std::path::Path;

use super::{Frame, FrameWindow, PropertyValue, UnitId};
use crate::util::{Error, NdArray, Result};

/// Reader interface for spike-sorted unit data.
pub trait SortingSource {
    /// Short format name (e.g. `"alf"`).
    fn format_name(&self) -> &str;

    /// Sampling rate in Hz shared by every unit.
    fn sampling_rate(&self) -> f64;

    /// Unit ids in iteration order.
    fn unit_ids(&self) -> Vec<UnitId>;

    /// Event frames of one unit, ascending, restricted to `window`.
    ///
    /// Fails with [`Error::UnknownUnit`] for ids not in [`unit_ids`](Self::unit_ids).
    fn event_sequence(&self, unit: UnitId, window: FrameWindow) -> Result<Vec<Frame>>;

    /// Names of the properties every unit carries.
    fn property_names(&self) -> Vec<String>;

    /// Value of one property for one unit.
    fn property(&self, unit: UnitId, name: &str) -> Result<PropertyValue>;

    /// Names of the per-event features one unit carries.
    fn unit_feature_names(&self, unit: UnitId) -> Result<Vec<String>>;

    /// Per-event feature of one unit; axis 0 matches the unit's events.
    fn feature(&self, unit: UnitId, name: &str) -> Result<NdArray>;

    /// Number of units.
    fn num_units(&self) -> usize {
        self.unit_ids().len()
    }

    /// Check if every unit carries property `name`.
    fn has_property(&self, name: &str) -> bool {
        self.property_names().iter().any(|n| n == name)
    }

    /// Check if `unit` carries feature `name`.
    fn has_feature(&self, unit: UnitId, name: &str) -> bool {
        self.unit_feature_names(unit)
            .map(|names| names.iter().any(|n| n == name))
            .unwrap_or(false)
    }

    /// Union of feature names over all units, sorted.
    fn feature_names(&self) -> Vec<String> {
        let mut names = BTreeSet::new();
        for unit in self.unit_ids() {
            if let Ok(unit_names) = self.unit_feature_names(unit) {
                names.extend(unit_names);
            }
        }
        names.into_iter().collect()
    }

    /// Full event sequence of one unit.
    fn full_event_sequence(&self, unit: UnitId) -> Result<Vec<Frame>> {
        self.event_sequence(unit, FrameWindow::ALL)
    }
}

/// Writer interface: serialize any source into this format.
pub trait SortingSink {
    /// Format-specific write options.
    type Options: Default;

    /// Write `source` to `destination` (a file or directory, per format).
    ///
    /// Writes are not transactional: on failure, partial output may remain.
    fn write(source: &dyn SortingSource, destination: &Path, options: &Self::Options) -> Result<()>;
}

/// Error for an id missing from `valid`, listing the valid ids.
pub(crate) fn unknown_unit(unit: UnitId, valid: &[UnitId]) -> Error {
    Error::UnknownUnit { unit, valid: valid.to_vec() }
}
