//! Format constants and the write-side partition of unit properties.

pub mod constants;
mod partition;

pub use constants::{is_metric_column, is_noise_unit, ALF_METRIC_COLUMNS, NOISE_UNIT_MODULUS};
pub use partition::{
    channel_count, column_values, destination, metric_cell, metric_table, property_artifact,
    synthesized_locations, ContainerPlan, Destination, PropertyPartition, UnitPlan, Unrepresented,
};
