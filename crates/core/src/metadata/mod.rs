//! Installed package metadata.
//!
//! The resolvers only ever read installed metadata through the
//! [`PackageIndex`] trait: "which distributions provide this top-level import
//! name" and "which distribution has this name". [`SitePackagesIndex`] backs
//! it with the `*.dist-info` / `*.egg-info` directories of one or more
//! site-packages directories; [`InMemoryIndex`] is a fixed index for tests
//! and embedding.

mod discovery;
mod site_packages;

pub use discovery::{discover_site_packages, venv_site_packages};
pub use site_packages::{parse_metadata_headers, top_level_from_record_path, SitePackagesIndex};

use crate::models::normalize_package_name;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("no site-packages directory found")]
    NoSitePackages,
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed distribution metadata in {0}")]
    Malformed(PathBuf),
    #[error("failed to query interpreter '{python}': {reason}")]
    Interpreter { python: String, reason: String },
}

/// An installed distribution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distribution {
    /// Distribution name as recorded in its metadata
    pub name: String,
    pub version: Option<String>,
    /// Top-level import names the distribution installs
    pub top_level: Vec<String>,
}

impl Distribution {
    pub fn new(name: impl Into<String>, version: Option<&str>, top_level: &[&str]) -> Self {
        Self {
            name: name.into(),
            version: version.map(str::to_string),
            top_level: top_level.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn normalized_name(&self) -> String {
        normalize_package_name(&self.name)
    }
}

/// Read-only query interface over installed package metadata
pub trait PackageIndex: Send + Sync {
    /// Distributions that install the given top-level import name
    fn providers(&self, import_name: &str) -> Result<Vec<Distribution>, MetadataError>;

    /// The distribution with the given name (compared after PEP 503
    /// normalization), if installed
    fn distribution(&self, package_name: &str) -> Result<Option<Distribution>, MetadataError>;
}

/// Fixed, in-memory index
#[derive(Debug, Clone, Default)]
pub struct InMemoryIndex {
    distributions: Vec<Distribution>,
}

impl InMemoryIndex {
    pub fn new(distributions: Vec<Distribution>) -> Self {
        Self { distributions }
    }

    pub fn with_distribution(mut self, distribution: Distribution) -> Self {
        self.distributions.push(distribution);
        self
    }

    pub fn len(&self) -> usize {
        self.distributions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.distributions.is_empty()
    }
}

impl PackageIndex for InMemoryIndex {
    fn providers(&self, import_name: &str) -> Result<Vec<Distribution>, MetadataError> {
        Ok(self
            .distributions
            .iter()
            .filter(|d| d.top_level.iter().any(|t| t == import_name))
            .cloned()
            .collect())
    }

    fn distribution(&self, package_name: &str) -> Result<Option<Distribution>, MetadataError> {
        let wanted = normalize_package_name(package_name);
        Ok(self
            .distributions
            .iter()
            .find(|d| d.normalized_name() == wanted)
            .cloned())
    }
}
