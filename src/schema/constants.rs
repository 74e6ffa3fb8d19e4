//! Names and defaults shared by the format adapters.

use crate::core::UnitId;

/// Metric names written to the combined per-unit metric table.
///
/// Scalar properties outside this list get their own array artifact.
pub const ALF_METRIC_COLUMNS: [&str; 20] = [
    "cluster_id",
    "cluster_id.1",
    "num_spikes",
    "firing_rate",
    "presence_ratio",
    "presence_ratio_std",
    "frac_isi_viol",
    "contamination_est",
    "contamination_est2",
    "missed_spikes_est",
    "cum_amp_drift",
    "max_amp_drift",
    "cum_depth_drift",
    "max_depth_drift",
    "ks2_contamination_pct",
    "ks2_label",
    "amplitude_cutoff",
    "amplitude_std",
    "epoch_name",
    "isi_viol",
];

/// Metric table column holding unit ids.
pub const CLUSTER_ID_COLUMN: &str = "cluster_id";

/// Check if a property belongs in the metric table.
pub fn is_metric_column(name: &str) -> bool {
    ALF_METRIC_COLUMNS.contains(&name)
}

/// Ids that are multiples of this mark noise clusters.
pub const NOISE_UNIT_MODULUS: UnitId = 1000;

/// Check if a unit id marks a noise cluster.
#[inline]
pub fn is_noise_unit(id: UnitId) -> bool {
    id % NOISE_UNIT_MODULUS == 0
}

/// Sampling rate assumed for formats that store seconds without a rate.
pub const DEFAULT_ALF_SAMPLING_RATE: f64 = 30000.0;

/// Substring an ALF directory name must contain.
pub const ALF_FOLDER_MARKER: &str = "probe";

/// Samples in a synthesized footprint.
pub const DEFAULT_FOOTPRINT_SAMPLES: usize = 3;

/// Cut-left used when a unit has no template offset.
pub const DEFAULT_CUT_LEFT: i64 = 1;

// ALF artifacts
pub const SPIKES_PREFIX: &str = "spikes";
pub const CLUSTERS_PREFIX: &str = "clusters";
pub const SPIKES_TIMES: &str = "spikes.times";
pub const SPIKES_CLUSTERS: &str = "spikes.clusters";
pub const METRICS_TABLE: &str = "clusters.metrics";

// Canonical property and feature names
pub const TEMPLATE: &str = "template";
pub const TEMPLATE_CUT_LEFT: &str = "template_frames_cut_before";
pub const AMPLITUDES: &str = "amplitudes";
pub const DETECTION_CHANNEL: &str = "detection_channel";
pub const POSITIONS: &str = "positions";

// HDSort container keys
pub const UNITS_KEY: &str = "Units";
pub const MULTI_ELECTRODE_KEY: &str = "MultiElectrode";
pub const ELECTRODE_POSITIONS: &str = "electrodePositions";
pub const ELECTRODE_NUMBERS: &str = "electrodeNumbers";
pub const NOISE_STD_KEY: &str = "noiseStd";
pub const SAMPLING_RATE_KEY: &str = "samplingRate";
pub const SORTING_INFO_KEY: &str = "sortingInfo";
pub const START_TIMES_KEY: &str = "startTimes";

// HDSort unit fields
pub const FIELD_ID: &str = "ID";
pub const FIELD_SPIKE_TRAIN: &str = "spikeTrain";
pub const FIELD_AMPLITUDES: &str = "spikeAmplitudes";
pub const FIELD_DETECTION_CHANNEL: &str = "detectionChannel";
pub const FIELD_FOOTPRINT: &str = "footprint";
pub const FIELD_CUT_LEFT: &str = "cutLeft";

/// Properties and features an HDSort file can carry. Positions are rebuilt
/// from detection channels and electrode geometry on read.
pub const HDSORT_PROPERTIES: [&str; 2] = [TEMPLATE, TEMPLATE_CUT_LEFT];
pub const HDSORT_FEATURES: [&str; 3] = [AMPLITUDES, DETECTION_CHANNEL, POSITIONS];

// Yass layout, relative to the output root
pub const YASS_CONFIG: &str = "config.yaml";
pub const YASS_OUTPUT_DIR: [&str; 2] = ["tmp", "output"];
pub const YASS_SPIKE_TRAIN: &str = "spike_train.npy";
pub const YASS_TEMPLATES_DIR: &str = "templates";
pub const YASS_TEMPLATES: &str = "templates_0sec.npy";
pub const YASS_SAMPLING_RATE_KEY: &str = "recordings.sampling_rate";

/// Yass output keeps templates only, and no per-event features.
pub const YASS_PROPERTIES: [&str; 1] = [TEMPLATE];
pub const YASS_FEATURES: [&str; 0] = [];
