//! Core layer - the canonical unit model and the logic shared by adapters.
//!
//! This module provides:
//! - [`frames`] - time/frame conversion and window clamping
//! - [`UnitStore`] - the canonical in-memory model
//! - [`GroupedEvents`] / [`EventCache`] - per-unit events from a flat stream
//! - [`SortingSource`] / [`SortingSink`] - adapter capability traits

pub mod frames;
mod grouping;
mod property;
mod store;
mod traits;

pub use frames::{clamp_window, to_frame, to_seconds, Frame, FrameRounding, FrameWindow, Seconds};
pub use grouping::{EventCache, GroupedEvents, UnitEvents};
pub use property::{PropertyKind, PropertyValue};
pub use store::UnitStore;
pub use traits::{SortingSink, SortingSource};

/// Unit identifier. Unique within one store only.
pub type UnitId = i64;
