//! Format adapters.
//!
//! Each submodule reads one on-disk layout into a [`SortingSource`] and
//! writes any source back out through [`SortingSink`].
//!
//! - [`alf`] - directory of `spikes.*` / `clusters.*` arrays plus a metrics table
//! - [`hdsort`] - legacy structured container with a `Units` struct array
//! - [`yass`] - `config.yaml` plus a `(N, 2)` spike train

pub mod alf;
pub mod hdsort;
pub mod yass;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

pub use alf::{AlfOptions, AlfSorting};
pub use hdsort::{HdsortOptions, HdsortSorting, HdsortWriteOptions};
pub use yass::{YassOptions, YassSorting};

use crate::core::{SortingSink, SortingSource};
use crate::util::{Error, Result};

/// On-disk formats known to this crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Format {
    Alf,
    Hdsort,
    Yass,
}

impl Format {
    pub const ALL: [Format; 3] = [Format::Alf, Format::Hdsort, Format::Yass];

    pub fn name(self) -> &'static str {
        match self {
            Format::Alf => "alf",
            Format::Hdsort => "hdsort",
            Format::Yass => "yass",
        }
    }

    /// Open `path` with default read options.
    pub fn open(self, path: &Path) -> Result<Box<dyn SortingSource>> {
        Ok(match self {
            Format::Alf => Box::new(AlfSorting::open(path)?),
            Format::Hdsort => Box::new(HdsortSorting::open(path)?),
            Format::Yass => Box::new(YassSorting::open(path)?),
        })
    }

    /// Write `source` to `path` with default write options.
    pub fn write(self, source: &dyn SortingSource, path: &Path) -> Result<()> {
        match self {
            Format::Alf => AlfSorting::write(source, path, &()),
            Format::Hdsort => HdsortSorting::write(source, path, &HdsortWriteOptions::default()),
            Format::Yass => YassSorting::write(source, path, &()),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Format::ALL
            .into_iter()
            .find(|f| f.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                let known: Vec<_> = Format::ALL.iter().map(|f| f.name()).collect();
                Error::Other(format!("unknown format '{}' (expected one of: {})", s, known.join(", ")))
            })
    }
}
