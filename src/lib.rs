//! # spikeio
//!
//! Reading, converting and writing spike-sorted neural unit data.
//!
//! Every on-disk format is read into the same canonical model: a set of
//! units, each with an ascending sequence of event frames, per-unit
//! properties and optional per-event features. Any source can be written
//! back out in any supported format.
//!
//! ## Modules
//!
//! - [`util`] - Basic types (arrays, shapes, errors)
//! - [`core`] - Frame conversion, unit store, event grouping, adapter traits
//! - [`container`] - Legacy structured container and struct-array resolver
//! - [`io`] - Array, table and config file collaborators
//! - [`schema`] - Format constants and write planning
//! - [`extractors`] - ALF, HDSort and Yass adapters
//!
//! ## Example
//!
//! ```ignore
//! use spikeio::prelude::*;
//!
//! let sorting = AlfSorting::open("session/probe00")?;
//! for unit in sorting.unit_ids() {
//!     println!("{}: {} events", unit, sorting.full_event_sequence(unit)?.len());
//! }
//! HdsortSorting::write(&sorting, "sorting.spk".as_ref(), &HdsortWriteOptions::default())?;
//! ```

pub mod util;
pub mod core;
pub mod container;
pub mod io;
pub mod schema;
pub mod extractors;

// Re-export commonly used types
pub use util::{ElementKind, Error, ErrorKind, NdArray, Result, Shape};
pub use core::{Frame, FrameWindow, PropertyValue, SortingSink, SortingSource, UnitId, UnitStore};
pub use extractors::Format;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::core::{
        Frame, FrameWindow, PropertyKind, PropertyValue, SortingSink, SortingSource, UnitId, UnitStore,
    };
    pub use crate::extractors::{
        AlfOptions, AlfSorting, Format, HdsortOptions, HdsortSorting, HdsortWriteOptions, YassOptions,
        YassSorting,
    };
    pub use crate::util::{ElementKind, Error, NdArray, Result, Shape};
}
