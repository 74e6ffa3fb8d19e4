//! File-level collaborators: mapped views, `.npy` arrays, CSV tables and
//! YAML-style config files.

mod mapped;
pub mod config;
pub mod npy;
pub mod table;

pub use config::{load_config, lookup, parse_config, require_f64, save_config};
pub use mapped::MappedFile;
pub use npy::{load_array, save_array};
pub use table::{load_table, save_table, Cell, Table};
