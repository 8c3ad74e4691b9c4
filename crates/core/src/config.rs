use crate::models::FileKind;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MANIFEST_NAME: &str = "requirements.txt";
pub const DEFAULT_HEADER: &str = "# Generated by aireqs";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to build glob pattern: {0}")]
    GlobError(#[from] globset::Error),
    #[error("Failed to parse gitignore: {0}")]
    GitignoreError(#[from] ignore::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Configuration for scanning
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Root directory to scan
    pub root: PathBuf,
    /// Additional ignore patterns (glob style)
    pub ignore_patterns: Vec<String>,
    /// Custom ignore file path
    pub ignore_file: Option<PathBuf>,
    /// Include virtualenvs / build output in scan
    pub include_deps: bool,
    /// Scan .ipynb notebooks as well as scripts
    pub include_notebooks: bool,
    /// Blank IPython magics and shell escapes in notebook cells
    pub strip_magics: bool,
    /// Number of threads (0 = auto)
    pub threads: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            ignore_patterns: vec![],
            ignore_file: None,
            include_deps: false,
            include_notebooks: true,
            strip_magics: true,
            threads: 0,
        }
    }
}

impl ScanConfig {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            ..Default::default()
        }
    }

    pub fn with_ignore_patterns(mut self, patterns: Vec<String>) -> Self {
        self.ignore_patterns = patterns;
        self
    }

    pub fn with_ignore_file(mut self, path: PathBuf) -> Self {
        self.ignore_file = Some(path);
        self
    }

    pub fn with_include_deps(mut self, include: bool) -> Self {
        self.include_deps = include;
        self
    }

    pub fn with_include_notebooks(mut self, include: bool) -> Self {
        self.include_notebooks = include;
        self
    }

    pub fn with_strip_magics(mut self, strip: bool) -> Self {
        self.strip_magics = strip;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }
}

/// Where to look for installed distribution metadata
#[derive(Debug, Clone)]
pub struct SiteConfig {
    /// Explicit site-packages directories; skips discovery when non-empty
    pub site_packages: Vec<PathBuf>,
    /// Virtual environment root (usually from `VIRTUAL_ENV`)
    pub venv: Option<PathBuf>,
    /// Interpreter asked for its site paths as a last resort
    pub python: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            site_packages: vec![],
            venv: None,
            python: "python3".to_string(),
        }
    }
}

impl SiteConfig {
    pub fn with_site_packages(mut self, dirs: Vec<PathBuf>) -> Self {
        self.site_packages = dirs;
        self
    }

    pub fn with_venv(mut self, venv: Option<PathBuf>) -> Self {
        self.venv = venv;
        self
    }

    pub fn with_python(mut self, python: impl Into<String>) -> Self {
        self.python = python.into();
        self
    }
}

/// Settings for the remote package-name lookup
#[derive(Clone)]
pub struct RemoteConfig {
    /// Turned off entirely, regardless of credentials
    pub enabled: bool,
    /// API credential; `None` disables remote resolution
    pub api_key: Option<String>,
    pub model: String,
    pub endpoint: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Total attempts per request, including the first
    pub max_attempts: u32,
    /// Maximum names per batched request
    pub batch_size: usize,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: Duration::from_secs(20),
            max_attempts: 2,
            batch_size: 50,
        }
    }
}

impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("enabled", &self.enabled)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .field("max_attempts", &self.max_attempts)
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

impl RemoteConfig {
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }
}

/// Where and how the manifest is written
#[derive(Debug, Clone, Default)]
pub struct ManifestConfig {
    /// Output path; defaults to `<root>/requirements.txt`
    pub output: Option<PathBuf>,
    /// Comment line written before the requirements
    pub header: Option<String>,
    /// Render only, never touch the filesystem
    pub dry_run: bool,
}

impl ManifestConfig {
    pub fn with_output(mut self, output: Option<PathBuf>) -> Self {
        self.output = output;
        self
    }

    pub fn with_header(mut self, header: Option<String>) -> Self {
        self.header = header;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn output_path(&self, root: &Path) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| root.join(DEFAULT_MANIFEST_NAME))
    }
}

/// Filter for ignoring files and directories
pub struct IgnoreFilter {
    root: PathBuf,
    gitignore: Option<Gitignore>,
    custom_globs: GlobSet,
    default_ignores: GlobSet,
}

impl IgnoreFilter {
    pub fn new(config: &ScanConfig) -> Result<Self, ConfigError> {
        // Load .gitignore if present
        let gitignore = if let Some(ref ignore_file) = config.ignore_file {
            let mut builder = GitignoreBuilder::new(&config.root);
            if let Some(err) = builder.add(ignore_file) {
                return Err(err.into());
            }
            Some(builder.build()?)
        } else {
            let gitignore_path = config.root.join(".gitignore");
            if gitignore_path.exists() {
                let mut builder = GitignoreBuilder::new(&config.root);
                builder.add(&gitignore_path);
                Some(builder.build()?)
            } else {
                None
            }
        };

        let mut custom_builder = GlobSetBuilder::new();
        for pattern in &config.ignore_patterns {
            custom_builder.add(Glob::new(pattern)?);
        }
        let custom_globs = custom_builder.build()?;

        // Default ignores (unless include_deps is true)
        let mut default_builder = GlobSetBuilder::new();
        if !config.include_deps {
            for dir in [
                "venv",
                ".venv",
                "env",
                ".env",
                ".git",
                ".ipynb_checkpoints",
                "__pycache__",
                "site-packages",
                "node_modules",
                "build",
                "dist",
                ".tox",
                ".nox",
                ".mypy_cache",
                ".pytest_cache",
            ] {
                default_builder.add(Glob::new(&format!("{dir}/**"))?);
                default_builder.add(Glob::new(&format!("**/{dir}/**"))?);
            }
        }
        let default_ignores = default_builder.build()?;

        Ok(Self {
            root: config.root.clone(),
            gitignore,
            custom_globs,
            default_ignores,
        })
    }

    /// Check if a path should be ignored. Globs see the path relative to
    /// the scan root so a root living under e.g. `build/` still scans.
    pub fn should_ignore(&self, path: &Path, is_dir: bool) -> bool {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);

        if self.default_ignores.is_match(relative) {
            return true;
        }

        if self.custom_globs.is_match(relative) {
            return true;
        }

        if let Some(ref gi) = self.gitignore {
            if gi.matched_path_or_any_parents(relative, is_dir).is_ignore() {
                return true;
            }
        }

        false
    }

    /// Check if a file is something the scanner can read
    pub fn file_kind(&self, path: &Path, include_notebooks: bool) -> Option<FileKind> {
        let ext = path.extension()?;
        match FileKind::from_extension(&ext.to_string_lossy())? {
            FileKind::Notebook if !include_notebooks => None,
            kind => Some(kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ScanConfig::default();
        assert_eq!(config.root, PathBuf::from("."));
        assert!(config.include_notebooks);
        assert!(!config.include_deps);
    }

    #[test]
    fn test_config_builder() {
        let config = ScanConfig::new(PathBuf::from("/test"))
            .with_ignore_patterns(vec!["**/tests/**".to_string()])
            .with_include_deps(true)
            .with_include_notebooks(false)
            .with_threads(4);

        assert_eq!(config.root, PathBuf::from("/test"));
        assert_eq!(config.ignore_patterns.len(), 1);
        assert!(config.include_deps);
        assert!(!config.include_notebooks);
        assert_eq!(config.threads, 4);
    }

    #[test]
    fn test_default_ignores_are_root_relative() {
        let config = ScanConfig::new(PathBuf::from("/home/me/build/project"));
        let filter = IgnoreFilter::new(&config).unwrap();

        assert!(!filter.should_ignore(Path::new("/home/me/build/project/main.py"), false));
        assert!(filter.should_ignore(
            Path::new("/home/me/build/project/.venv/lib/site.py"),
            false
        ));
        assert!(filter.should_ignore(
            Path::new("/home/me/build/project/pkg/__pycache__/x.py"),
            false
        ));
    }

    #[test]
    fn test_custom_patterns() {
        let config = ScanConfig::new(PathBuf::from("/p"))
            .with_ignore_patterns(vec!["scratch/**".to_string()]);
        let filter = IgnoreFilter::new(&config).unwrap();

        assert!(filter.should_ignore(Path::new("/p/scratch/a.py"), false));
        assert!(!filter.should_ignore(Path::new("/p/src/a.py"), false));
    }

    #[test]
    fn test_file_kind_respects_notebook_flag() {
        let config = ScanConfig::default();
        let filter = IgnoreFilter::new(&config).unwrap();

        assert_eq!(
            filter.file_kind(Path::new("a.ipynb"), true),
            Some(FileKind::Notebook)
        );
        assert_eq!(filter.file_kind(Path::new("a.ipynb"), false), None);
        assert_eq!(filter.file_kind(Path::new("a.py"), false), Some(FileKind::Script));
        assert_eq!(filter.file_kind(Path::new("README.md"), true), None);
    }

    #[test]
    fn test_manifest_output_path() {
        let config = ManifestConfig::default();
        assert_eq!(
            config.output_path(Path::new("/p")),
            PathBuf::from("/p/requirements.txt")
        );
        let config = config.with_output(Some(PathBuf::from("/tmp/reqs.txt")));
        assert_eq!(config.output_path(Path::new("/p")), PathBuf::from("/tmp/reqs.txt"));
    }

    #[test]
    fn test_remote_config_debug_redacts_key() {
        let config = RemoteConfig::default().with_api_key(Some("secret".to_string()));
        let debug = format!("{:?}", config);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("<redacted>"));
    }
}
