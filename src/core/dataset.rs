//! Map datasets, behavior profiles, and build algorithms
//!
//! Pure configuration types: constructing them performs no I/O beyond an
//! existence check on the referenced file.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::core::error::{Error, Result};

/// Build algorithm the dataset is prepared for
///
/// Determines which build-stage sequence runs and which query data layout
/// `osrm-routed` loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Algorithm {
    /// Contraction hierarchies: extract then contract
    #[default]
    Contraction,
    /// Multi-level Dijkstra: extract, partition, customize
    MultiLevel,
}

impl Algorithm {
    /// Flag value understood by the OSRM binaries
    pub fn as_flag(&self) -> &'static str {
        match self {
            Algorithm::Contraction => "ch",
            Algorithm::MultiLevel => "mld",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_flag())
    }
}

impl FromStr for Algorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ch" | "contraction" => Ok(Algorithm::Contraction),
            "mld" | "multi-level" => Ok(Algorithm::MultiLevel),
            other => Err(Error::Configuration(format!(
                "unknown algorithm '{}' (expected 'ch' or 'mld')",
                other
            ))),
        }
    }
}

/// Default logical name for a dataset file: the stem before the first dot,
/// so `swaziland-latest.osm.pbf` becomes `swaziland-latest`
fn default_name(path: &Path) -> String {
    path.file_name()
        .and_then(|f| f.to_str())
        .map(|f| f.split('.').next().unwrap_or(f).to_string())
        .unwrap_or_default()
}

/// OSM data file a route network will be extracted from
#[derive(Debug, Clone)]
pub struct MapDataset {
    path: PathBuf,
    name: String,
}

impl MapDataset {
    /// Reference an `.osm`/`.osm.pbf` file on disk; fails if the file is absent
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.is_file() {
            return Err(Error::Configuration(format!(
                "map dataset not found ({})",
                path.display()
            )));
        }
        let name = default_name(&path);
        Ok(Self { path, name })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Routing behavior profile: a Lua script describing which ways and nodes may
/// be traversed and at what speed
///
/// Some profiles only make sense under a specific build algorithm (e.g. ones
/// relying on traffic updates need multi-level rebuilds); such an affinity is
/// validated when the profile is attached to a scenario.
#[derive(Debug, Clone)]
pub struct BehaviorProfile {
    path: PathBuf,
    name: String,
    required_algorithm: Option<Algorithm>,
}

impl BehaviorProfile {
    /// Reference a `.lua` profile on disk; fails if the file is absent
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.is_file() {
            return Err(Error::Configuration(format!(
                "behavior profile not found ({})",
                path.display()
            )));
        }
        let name = default_name(&path);
        Ok(Self {
            path,
            name,
            required_algorithm: None,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Pin the profile to a build algorithm
    pub fn with_required_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.required_algorithm = Some(algorithm);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn required_algorithm(&self) -> Option<Algorithm> {
        self.required_algorithm
    }
}
