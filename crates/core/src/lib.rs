//! MTA Rust AI Requirements Core Library
//!
//! This library scans a Python project (scripts and Jupyter notebooks),
//! works out which third-party packages its imports need, and writes a
//! `requirements.txt`.
//!
//! # Features
//!
//! - Parse Python imports (import, from...import) with tree-sitter
//! - Read notebook code cells, stripping IPython magics
//! - Filter out stdlib and first-party modules
//! - Resolve import names from installed distribution metadata
//! - Ask a generative model about names nothing installed provides
//! - Pin installed versions and write the manifest atomically
//! - Report the run in JSON, YAML or a human-readable summary
//!
//! # Example
//!
//! ```no_run
//! use mta_rust_aireqs_core::{
//!     ManifestConfig, RemoteConfig, RequirementsGenerator, ScanConfig, SiteConfig,
//! };
//! use std::path::PathBuf;
//!
//! let mut generator = RequirementsGenerator::new(
//!     ScanConfig::new(PathBuf::from(".")),
//!     SiteConfig::default(),
//!     RemoteConfig::default().with_api_key(std::env::var("GEMINI_API_KEY").ok()),
//!     ManifestConfig::default(),
//! );
//! let run = generator.run().unwrap();
//! print!("{}", run.rendered);
//! ```

pub mod categorizer;
pub mod config;
pub mod manifest;
pub mod metadata;
pub mod models;
pub mod output;
pub mod parsers;
pub mod resolver;
pub mod scanner;

// Re-exports for convenience
pub use config::{ManifestConfig, RemoteConfig, ScanConfig, SiteConfig};
pub use manifest::{write_atomic, Manifest, ManifestError};
pub use metadata::{InMemoryIndex, PackageIndex, SitePackagesIndex};
pub use models::*;
pub use output::{format_output, format_summary, OutputFormat};
pub use resolver::{GeminiLookup, LookupItem, RemoteError, RemoteResolver, Resolver};
pub use scanner::{ImportScanner, ScanError, ScanResult};

use std::time::Instant;
use thiserror::Error;

/// Errors that stop a run. Everything else is reported as a [`Warning`].
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("scan failed: {0}")]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

/// A finished run: the report plus the manifest text that was (or, on a
/// dry run, would have been) written
#[derive(Debug, Clone)]
pub struct GeneratedRequirements {
    pub report: RunReport,
    pub rendered: String,
}

/// Scan, resolve, and write a requirements manifest for one project
pub struct RequirementsGenerator {
    scan: ScanConfig,
    manifest: ManifestConfig,
    resolver: Resolver,
    setup_warnings: Vec<Warning>,
}

impl RequirementsGenerator {
    /// Locate installed metadata and set up the remote client. Neither step
    /// is fatal: missing metadata becomes a warning and an empty index,
    /// missing credentials skip remote resolution.
    pub fn new(
        scan: ScanConfig,
        site: SiteConfig,
        remote: RemoteConfig,
        manifest: ManifestConfig,
    ) -> Self {
        let mut setup_warnings = Vec::new();

        let index: Box<dyn PackageIndex> =
            match metadata::discover_site_packages(&site, &scan.root)
                .and_then(|dirs| SitePackagesIndex::load(&dirs))
            {
                Ok(index) => {
                    tracing::info!(
                        "indexed {} installed distributions from {:?}",
                        index.len(),
                        index.dirs()
                    );
                    Box::new(index)
                }
                Err(e) => {
                    tracing::debug!("installed package metadata unavailable: {}", e);
                    setup_warnings.push(Warning::MetadataUnavailable {
                        reason: e.to_string(),
                    });
                    Box::new(InMemoryIndex::default())
                }
            };

        let remote_resolver = GeminiLookup::from_config(&remote)
            .map(|lookup| RemoteResolver::new(Box::new(lookup)).with_config(&remote));

        let mut generator = Self::with_parts(scan, manifest, index, remote_resolver);
        generator.setup_warnings = setup_warnings;
        generator
    }

    /// Assemble a generator from an explicit index and remote stage
    pub fn with_parts(
        scan: ScanConfig,
        manifest: ManifestConfig,
        index: Box<dyn PackageIndex>,
        remote: Result<RemoteResolver, RemoteError>,
    ) -> Self {
        Self {
            scan,
            manifest,
            resolver: Resolver::new(index, remote),
            setup_warnings: Vec::new(),
        }
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Run the whole pipeline. Only an unusable project root or a failed
    /// manifest write is an error.
    pub fn run(&mut self) -> Result<GeneratedRequirements, PipelineError> {
        let start = Instant::now();
        let mut warnings = std::mem::take(&mut self.setup_warnings);

        let scanner = ImportScanner::new(self.scan.clone())?;
        let scanned = scanner.scan()?;
        warnings.extend(scanned.warnings);
        let mut stats = scanned.stats;
        tracing::info!(
            "found {} third-party modules in {} files",
            scanned.third_party.len(),
            stats.script_files + stats.notebook_files
        );

        let items: Vec<LookupItem> = scanned
            .third_party
            .iter()
            .map(|(name, occurrences)| {
                LookupItem::new(name.clone(), occurrences.first().map(|o| o.raw.clone()))
            })
            .collect();

        let resolved = self.resolver.resolve(&items);
        warnings.extend(resolved.warnings);

        for resolution in &resolved.resolutions {
            match resolution.source {
                ResolutionSource::Local => stats.resolved_local += 1,
                ResolutionSource::Remote => stats.resolved_remote += 1,
                ResolutionSource::Fallback => stats.fallback += 1,
            }
        }

        let manifest = Manifest::from_resolutions(&resolved.resolutions);
        if manifest.is_empty() {
            tracing::debug!("no third-party imports found");
            warnings.push(Warning::EmptyManifest);
        }
        let rendered = manifest.render(self.manifest.header.as_deref());

        let output = if self.manifest.dry_run {
            None
        } else {
            let path = self.manifest.output_path(&self.scan.root);
            write_atomic(&path, &rendered)?;
            Some(path)
        };

        let report = RunReport {
            root: self.scan.root.clone(),
            output,
            manifest: manifest.into_entries(),
            resolutions: resolved.resolutions,
            warnings,
            stats,
            metadata: RunMetadata {
                duration_ms: start.elapsed().as_millis() as u64,
                ..Default::default()
            },
        };

        Ok(GeneratedRequirements { report, rendered })
    }
}
