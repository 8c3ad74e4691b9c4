//! Import-name to package resolution: local metadata first, remote lookup
//! for the misses, with a per-run cache in front of both.

mod gemini;
mod local;
mod remote;

pub use gemini::GeminiLookup;
pub use local::{LocalOutcome, LocalResolver};
pub use remote::{
    is_valid_package_name, LookupItem, LookupRequest, LookupResponse, RemoteAnswer, RemoteError,
    RemoteLookup, RemoteOutcome, RemoteResolver,
};

use crate::metadata::PackageIndex;
use crate::models::{Resolution, ResolutionSource, ResolvedPackage, Warning};
use std::collections::{HashMap, HashSet};

/// Import name -> resolution for the current run. Never persisted.
#[derive(Debug, Default)]
pub struct ResolutionCache {
    entries: HashMap<String, Resolution>,
}

impl ResolutionCache {
    pub fn get(&self, import: &str) -> Option<&Resolution> {
        self.entries.get(import)
    }

    pub fn contains(&self, import: &str) -> bool {
        self.entries.contains_key(import)
    }

    pub fn insert(&mut self, resolution: Resolution) {
        self.entries.insert(resolution.import.clone(), resolution);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Resolutions for one `resolve` call plus the warnings it raised
#[derive(Debug, Default)]
pub struct ResolveOutcome {
    pub resolutions: Vec<Resolution>,
    pub warnings: Vec<Warning>,
}

/// Two-stage resolver owning the run's cache
pub struct Resolver {
    local: LocalResolver,
    remote: Result<RemoteResolver, RemoteError>,
    cache: ResolutionCache,
    remote_skip_reported: bool,
}

impl Resolver {
    /// `remote` is `Err` when remote resolution is unavailable for the whole
    /// run (e.g. missing credentials); misses then fall back to raw names.
    pub fn new(index: Box<dyn PackageIndex>, remote: Result<RemoteResolver, RemoteError>) -> Self {
        Self {
            local: LocalResolver::new(index),
            remote,
            cache: ResolutionCache::default(),
            remote_skip_reported: false,
        }
    }

    pub fn cache(&self) -> &ResolutionCache {
        &self.cache
    }

    /// Resolve each distinct name once per run; names already cached are
    /// answered from the cache without touching either stage.
    pub fn resolve(&mut self, items: &[LookupItem]) -> ResolveOutcome {
        let mut outcome = ResolveOutcome::default();

        let mut seen = HashSet::new();
        let requested: Vec<&LookupItem> = items
            .iter()
            .filter(|item| seen.insert(item.name.as_str()))
            .collect();

        let pending: Vec<&LookupItem> = requested
            .iter()
            .copied()
            .filter(|i| !self.cache.contains(&i.name))
            .collect();

        let mut misses = Vec::new();
        for item in pending {
            match self.local.resolve(&item.name) {
                LocalOutcome::Hit { package, ambiguity } => {
                    tracing::debug!("{} -> {} (installed)", item.name, package.name);
                    outcome.warnings.extend(ambiguity);
                    self.cache.insert(Resolution {
                        import: item.name.clone(),
                        package,
                        source: ResolutionSource::Local,
                    });
                }
                LocalOutcome::Miss => misses.push((*item).clone()),
            }
        }

        if !misses.is_empty() {
            self.resolve_misses(&misses, &mut outcome);
        }

        let mut guesses = Vec::new();
        for item in requested {
            if let Some(resolution) = self.cache.get(&item.name) {
                match resolution.source {
                    ResolutionSource::Fallback if misses.iter().any(|m| m.name == item.name) => {
                        guesses.push(item.name.clone());
                    }
                    ResolutionSource::Local | ResolutionSource::Remote
                        if resolution.package.version.is_none() =>
                    {
                        let warning = Warning::VersionUnknown {
                            package: resolution.package.name.clone(),
                        };
                        if !outcome.warnings.contains(&warning) {
                            outcome.warnings.push(warning);
                        }
                    }
                    _ => {}
                }
                outcome.resolutions.push(resolution.clone());
            }
        }

        if !guesses.is_empty() {
            guesses.sort();
            outcome.warnings.push(Warning::Unresolved { names: guesses });
        }

        outcome
    }

    fn resolve_misses(&mut self, misses: &[LookupItem], outcome: &mut ResolveOutcome) {
        let remote = match &self.remote {
            Ok(remote) => remote,
            Err(reason) => {
                if !self.remote_skip_reported {
                    tracing::debug!("skipping AI resolution: {}", reason);
                    outcome.warnings.push(Warning::RemoteSkipped {
                        reason: reason.to_string(),
                    });
                    self.remote_skip_reported = true;
                }
                for item in misses {
                    self.cache.insert(Self::fallback(&item.name));
                }
                return;
            }
        };

        tracing::info!(
            "resolving {} modules with AI: {}",
            misses.len(),
            misses
                .iter()
                .map(|m| m.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        let answers = remote.resolve(misses);

        for (reason, names) in answers.failures() {
            tracing::debug!("AI resolution failed for {}: {}", names.join(", "), reason);
            outcome.warnings.push(Warning::RemoteFailed { names, reason });
        }

        for item in misses {
            let resolution = match answers.answers.get(&item.name) {
                Some(RemoteAnswer::Package(package)) => {
                    tracing::info!("AI resolved '{}' to '{}'", item.name, package);
                    Resolution {
                        import: item.name.clone(),
                        package: ResolvedPackage::new(
                            package.clone(),
                            self.local.installed_version(package),
                        ),
                        source: ResolutionSource::Remote,
                    }
                }
                _ => Self::fallback(&item.name),
            };
            self.cache.insert(resolution);
        }
    }

    fn fallback(import: &str) -> Resolution {
        Resolution {
            import: import.to_string(),
            package: ResolvedPackage::new(import, None),
            source: ResolutionSource::Fallback,
        }
    }
}
