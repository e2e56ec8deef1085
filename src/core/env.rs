//! Shared environment for scenario builds and servers
//!
//! Holds the work directory compiled datasets land in, default verbosity and
//! overwrite behavior, and the names of the external OSRM executables.

use std::path::{Path, PathBuf};

/// Names (or paths) of the external OSRM executables
///
/// Kept explicit rather than hard-coded so tests and non-standard installs
/// can point individual stages at other binaries.
#[derive(Debug, Clone)]
pub struct Toolchain {
    pub extract: String,
    pub partition: String,
    pub customize: String,
    pub contract: String,
    pub routed: String,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            extract: "osrm-extract".to_string(),
            partition: "osrm-partition".to_string(),
            customize: "osrm-customize".to_string(),
            contract: "osrm-contract".to_string(),
            routed: "osrm-routed".to_string(),
        }
    }
}

/// Configuration shared by every scenario built under it
#[derive(Debug, Clone)]
pub struct Environment {
    work_dir: PathBuf,
    overwrite: bool,
    verbose: bool,
    toolchain: Toolchain,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new(std::env::temp_dir())
    }
}

impl Environment {
    /// Create an environment with compiled datasets placed under `work_dir`
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            overwrite: false,
            verbose: false,
            toolchain: Toolchain::default(),
        }
    }

    /// Recompile datasets even when a file with the same name already exists
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Mirror build-stage output to stderr
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_toolchain(mut self, toolchain: Toolchain) -> Self {
        self.toolchain = toolchain;
        self
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn overwrite(&self) -> bool {
        self.overwrite
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn toolchain(&self) -> &Toolchain {
        &self.toolchain
    }

    /// Ensure the work directory exists
    pub fn prepare(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.work_dir)
    }
}
