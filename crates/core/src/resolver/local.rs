use crate::metadata::{Distribution, PackageIndex};
use crate::models::{normalize_package_name, ResolvedPackage, Warning};

/// Result of a local lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalOutcome {
    /// An installed distribution provides the import name
    Hit {
        package: ResolvedPackage,
        /// Set when several distributions claimed the name and none matched
        /// it exactly
        ambiguity: Option<Warning>,
    },
    /// Nothing installed provides the name
    Miss,
}

/// Maps import names to installed distributions
pub struct LocalResolver {
    index: Box<dyn PackageIndex>,
}

impl LocalResolver {
    pub fn new(index: Box<dyn PackageIndex>) -> Self {
        Self { index }
    }

    /// Resolve one import name. Index errors count as a miss.
    ///
    /// When several distributions provide the name, the one whose name
    /// matches the import name (case-insensitively, PEP 503 normalized)
    /// wins; otherwise the alphabetically first one is chosen and the
    /// ambiguity is reported.
    pub fn resolve(&self, import: &str) -> LocalOutcome {
        let mut providers = match self.index.providers(import) {
            Ok(providers) => providers,
            Err(e) => {
                tracing::debug!("metadata lookup for '{}' failed: {}", import, e);
                return LocalOutcome::Miss;
            }
        };

        if providers.is_empty() {
            // Distributions without top-level metadata still match when
            // their own name is the import name
            return match self.index.distribution(import) {
                Ok(Some(dist)) => Self::hit(dist, None),
                Ok(None) => LocalOutcome::Miss,
                Err(e) => {
                    tracing::debug!("metadata lookup for '{}' failed: {}", import, e);
                    LocalOutcome::Miss
                }
            };
        }

        providers.sort_by_key(|d| d.normalized_name());
        providers.dedup_by_key(|d| d.normalized_name());

        if providers.len() == 1 {
            return Self::hit(providers.remove(0), None);
        }

        let wanted = normalize_package_name(import);
        if let Some(pos) = providers.iter().position(|d| d.normalized_name() == wanted) {
            return Self::hit(providers.remove(pos), None);
        }

        let candidates: Vec<String> = providers.iter().map(|d| d.name.clone()).collect();
        let chosen = providers.remove(0);
        tracing::debug!(
            "'{}' is provided by {:?}; choosing {}",
            import,
            candidates,
            chosen.name
        );
        let warning = Warning::AmbiguousDistribution {
            import: import.to_string(),
            chosen: chosen.name.clone(),
            candidates,
        };
        Self::hit(chosen, Some(warning))
    }

    /// Installed version of a distribution, by package name
    pub fn installed_version(&self, package: &str) -> Option<String> {
        match self.index.distribution(package) {
            Ok(dist) => dist.and_then(|d| d.version),
            Err(e) => {
                tracing::debug!("version lookup for '{}' failed: {}", package, e);
                None
            }
        }
    }

    fn hit(dist: Distribution, ambiguity: Option<Warning>) -> LocalOutcome {
        LocalOutcome::Hit {
            package: ResolvedPackage::new(dist.name, dist.version),
            ambiguity,
        }
    }
}
