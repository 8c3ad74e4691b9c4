use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Kind of source file the scanner understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    /// Plain Python script (.py, .pyw)
    Script,
    /// Jupyter notebook (.ipynb)
    Notebook,
}

impl FileKind {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "py" | "pyw" => Some(FileKind::Script),
            "ipynb" => Some(FileKind::Notebook),
            _ => None,
        }
    }
}

/// How a top-level import name was classified before resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportType {
    /// Third-party module that needs a package
    ThirdParty,
    /// Module that lives inside the scanned project
    FirstParty,
    /// Standard library
    Stdlib,
}

/// A single import of a top-level module name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportOccurrence {
    /// Top-level module name (`a` for `import a.b.c`)
    pub module: String,
    /// Dotted path as written in the source
    pub path: String,
    /// Line number in source file (cell-relative for notebooks)
    pub line: usize,
    /// Notebook cell index, if the import came from a notebook
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell: Option<usize>,
    /// Full import statement text
    pub raw: String,
}

/// A scanned source file with its absolute imports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFile {
    /// Relative path from project root
    pub path: PathBuf,
    /// Absolute path
    pub absolute_path: PathBuf,
    pub kind: FileKind,
    /// All absolute imports in this file
    pub imports: Vec<ImportOccurrence>,
}

/// Returns the top-level segment of a dotted module path, or `None` when the
/// path is not a valid absolute identifier path.
pub fn top_level_name(path: &str) -> Option<&str> {
    if path.is_empty() || !path.split('.').all(is_identifier) {
        return None;
    }
    path.split('.').next()
}

/// Python identifier check (PEP 3131, approximated with Unicode alphanumerics)
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_alphanumeric())
}

/// Normalize a distribution name per PEP 503: lowercase, with runs of
/// `-`, `_` and `.` collapsed to a single `-`.
pub fn normalize_package_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;
    for c in name.trim().chars() {
        if matches!(c, '-' | '_' | '.') {
            pending_sep = true;
            continue;
        }
        if pending_sep && !out.is_empty() {
            out.push('-');
        }
        pending_sep = false;
        out.extend(c.to_lowercase());
    }
    out
}

/// An installable package, optionally pinned to the installed version
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolvedPackage {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl ResolvedPackage {
    pub fn new(name: impl Into<String>, version: Option<String>) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }

    /// `name==version`, or the bare name when the version is unknown
    pub fn requirement_line(&self) -> String {
        match &self.version {
            Some(version) => format!("{}=={}", self.name, version),
            None => self.name.clone(),
        }
    }
}

/// Where a resolution came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    /// Installed distribution metadata provides the import name
    Local,
    /// Remote lookup suggested the package name
    Remote,
    /// Best-effort guess: the import name itself
    Fallback,
}

impl ResolutionSource {
    pub fn is_confident(&self) -> bool {
        !matches!(self, ResolutionSource::Fallback)
    }
}

/// Mapping of one import name to a package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub import: String,
    pub package: ResolvedPackage,
    pub source: ResolutionSource,
}

/// Non-fatal problems recorded during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// File could not be read or decoded as UTF-8 text
    UnreadableFile { path: PathBuf, reason: String },
    /// File (or notebook cell) has a syntax error and was skipped
    ParseFailure {
        path: PathBuf,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cell: Option<usize>,
        message: String,
    },
    /// Installed package metadata could not be loaded at all
    MetadataUnavailable { reason: String },
    /// Several installed distributions provide the same import name
    AmbiguousDistribution {
        import: String,
        chosen: String,
        candidates: Vec<String>,
    },
    /// Remote resolution was skipped for the whole run
    RemoteSkipped { reason: String },
    /// A remote call failed; the listed names fell back to raw names
    RemoteFailed { names: Vec<String>, reason: String },
    /// Names written as best-effort guesses that should be double-checked
    Unresolved { names: Vec<String> },
    /// Package resolved but no installed version was found
    VersionUnknown { package: String },
    /// No third-party imports were found
    EmptyManifest,
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::UnreadableFile { path, reason } => {
                write!(f, "skipped unreadable file {}: {}", path.display(), reason)
            }
            Warning::ParseFailure {
                path,
                cell: Some(cell),
                message,
            } => write!(
                f,
                "skipped cell {} of {} due to syntax error: {}",
                cell,
                path.display(),
                message
            ),
            Warning::ParseFailure {
                path,
                cell: None,
                message,
            } => write!(
                f,
                "skipped {} due to syntax error: {}",
                path.display(),
                message
            ),
            Warning::MetadataUnavailable { reason } => {
                write!(f, "installed package metadata unavailable: {}", reason)
            }
            Warning::AmbiguousDistribution {
                import,
                chosen,
                candidates,
            } => write!(
                f,
                "'{}' is provided by several distributions ({}); using '{}'",
                import,
                candidates.join(", "),
                chosen
            ),
            Warning::RemoteSkipped { reason } => {
                write!(f, "skipping AI resolution: {}", reason)
            }
            Warning::RemoteFailed { names, reason } => write!(
                f,
                "AI resolution failed for {}: {}",
                names.join(", "),
                reason
            ),
            Warning::Unresolved { names } => write!(
                f,
                "could not confidently resolve: {} (used import name as package name)",
                names.join(", ")
            ),
            Warning::VersionUnknown { package } => write!(
                f,
                "could not find an installed version for '{}'",
                package
            ),
            Warning::EmptyManifest => write!(f, "no third-party imports found"),
        }
    }
}

/// Statistics about a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub script_files: usize,
    pub notebook_files: usize,
    pub skipped_files: usize,
    pub total_imports: usize,
    pub stdlib_imports: usize,
    pub first_party_imports: usize,
    pub third_party_modules: usize,
    pub resolved_local: usize,
    pub resolved_remote: usize,
    pub fallback: usize,
}

/// Run metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub duration_ms: u64,
    pub timestamp: String,
    pub tool_version: String,
}

impl Default for RunMetadata {
    fn default() -> Self {
        Self {
            duration_ms: 0,
            timestamp: chrono::Utc::now().to_rfc3339(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// One requirement line plus the import names that implied it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub package: ResolvedPackage,
    pub imports: Vec<String>,
    pub source: ResolutionSource,
}

/// Everything a run produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Project root path
    pub root: PathBuf,
    /// Where the manifest was written, if it was
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    /// Final manifest entries in output order
    pub manifest: Vec<ManifestEntry>,
    /// Per-import resolutions
    pub resolutions: Vec<Resolution>,
    pub warnings: Vec<Warning>,
    pub stats: RunStats,
    pub metadata: RunMetadata,
}

impl RunReport {
    /// Import names that were only guessed
    pub fn guesses(&self) -> Vec<&str> {
        self.resolutions
            .iter()
            .filter(|r| !r.source.is_confident())
            .map(|r| r.import.as_str())
            .collect()
    }
}
