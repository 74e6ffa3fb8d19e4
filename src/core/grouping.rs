//! Per-unit event sequences from a flat `(time, label)` stream.
//!
//! Spike sorters commonly store every event in two parallel arrays: one of
//! times and one of unit labels. [`GroupedEvents`] regroups them by label,
//! sorts each group by time, and converts to frames. [`EventCache`] holds the
//! result for the lifetime of an adapter and builds it at most once.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::frames::{to_frame, Frame, FrameRounding, Seconds};
use crate::util::{Error, Result};

/// Events of one unit.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UnitEvents {
    /// Event frames, ascending.
    pub frames: Vec<Frame>,
    /// Position of each event in the source stream, in frame order.
    pub source_index: Vec<usize>,
    /// Floor of the earliest event time.
    pub min_frame: Frame,
    /// Ceiling of the latest event time.
    pub max_frame: Frame,
}

impl UnitEvents {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Event sequences grouped by unit label.
#[derive(Clone, Debug, Default)]
pub struct GroupedEvents {
    groups: BTreeMap<i64, UnitEvents>,
    max_frame: Option<Frame>,
}

impl GroupedEvents {
    /// Group event times in seconds by label and convert them to frames.
    pub fn from_seconds(times: &[Seconds], labels: &[i64], sampling_rate: f64) -> Result<Self> {
        check_lengths(times.len(), labels.len())?;
        let mut groups = BTreeMap::new();
        for (label, mut indices) in group_indices(labels) {
            // Source order may interleave units out of time order
            indices.sort_by(|&a, &b| times[a].total_cmp(&times[b]));
            let frames: Vec<Frame> = indices
                .iter()
                .map(|&i| to_frame(times[i], sampling_rate, FrameRounding::Floor))
                .collect();
            let first = times[indices[0]];
            let last = times[indices[indices.len() - 1]];
            groups.insert(
                label,
                UnitEvents {
                    frames,
                    source_index: indices,
                    min_frame: to_frame(first, sampling_rate, FrameRounding::Floor),
                    max_frame: to_frame(last, sampling_rate, FrameRounding::Ceil),
                },
            );
        }
        Ok(Self::with_running_max(groups))
    }

    /// Group event frames by label.
    pub fn from_frames(frames: &[Frame], labels: &[i64]) -> Result<Self> {
        check_lengths(frames.len(), labels.len())?;
        let mut groups = BTreeMap::new();
        for (label, mut indices) in group_indices(labels) {
            indices.sort_by_key(|&i| frames[i]);
            let unit_frames: Vec<Frame> = indices.iter().map(|&i| frames[i]).collect();
            let min_frame = unit_frames[0];
            let max_frame = unit_frames[unit_frames.len() - 1];
            groups.insert(
                label,
                UnitEvents { frames: unit_frames, source_index: indices, min_frame, max_frame },
            );
        }
        Ok(Self::with_running_max(groups))
    }

    fn with_running_max(groups: BTreeMap<i64, UnitEvents>) -> Self {
        let max_frame = groups.values().map(|g| g.max_frame).max();
        Self { groups, max_frame }
    }

    /// Events of one label; `None` if the stream never mentions it.
    pub fn get(&self, label: i64) -> Option<&UnitEvents> {
        self.groups.get(&label)
    }

    /// Frames of one label, empty if the stream never mentions it.
    pub fn frames(&self, label: i64) -> &[Frame] {
        self.groups.get(&label).map(|g| g.frames.as_slice()).unwrap_or(&[])
    }

    /// Labels present in the stream, ascending.
    pub fn labels(&self) -> impl Iterator<Item = i64> + '_ {
        self.groups.keys().copied()
    }

    /// Number of distinct labels.
    pub fn num_groups(&self) -> usize {
        self.groups.len()
    }

    /// Largest upper-bound frame over all units.
    pub fn max_frame(&self) -> Option<Frame> {
        self.max_frame
    }
}

fn check_lengths(times: usize, labels: usize) -> Result<()> {
    if times != labels {
        return Err(Error::ColumnLengthMismatch {
            field: "labels".to_string(),
            expected: times,
            actual: labels,
        });
    }
    Ok(())
}

/// Source positions per label, each in stream order.
fn group_indices(labels: &[i64]) -> BTreeMap<i64, Vec<usize>> {
    let mut groups: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (i, &label) in labels.iter().enumerate() {
        groups.entry(label).or_default().push(i);
    }
    groups
}

/// Build-once cell for [`GroupedEvents`].
///
/// The first successful build is kept until the owner is dropped. A failed
/// build leaves the cell empty. The write lock serializes concurrent first
/// accesses so the build runs once.
#[derive(Debug, Default)]
pub struct EventCache {
    slot: RwLock<Option<Arc<GroupedEvents>>>,
}

impl EventCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached value, building it first if needed.
    pub fn get_or_try_build(
        &self,
        build: impl FnOnce() -> Result<GroupedEvents>,
    ) -> Result<Arc<GroupedEvents>> {
        if let Some(cached) = self.slot.read().as_ref() {
            return Ok(Arc::clone(cached));
        }
        let mut slot = self.slot.write();
        if let Some(cached) = slot.as_ref() {
            return Ok(Arc::clone(cached));
        }
        let built = Arc::new(build()?);
        tracing::debug!(groups = built.num_groups(), "grouped event times");
        *slot = Some(Arc::clone(&built));
        Ok(built)
    }

    /// Check if the value has been built.
    pub fn is_built(&self) -> bool {
        self.slot.read().is_some()
    }
}
