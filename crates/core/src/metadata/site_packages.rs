use super::{Distribution, MetadataError, PackageIndex};
use crate::models::{is_identifier, normalize_package_name};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

/// Index over the distributions installed in site-packages directories.
/// Earlier directories shadow later ones, as on `sys.path`.
#[derive(Debug, Default)]
pub struct SitePackagesIndex {
    dirs: Vec<PathBuf>,
    distributions: Vec<Distribution>,
    by_import: HashMap<String, Vec<usize>>,
    by_name: HashMap<String, usize>,
}

impl SitePackagesIndex {
    /// Read every distribution in the given directories. Unreadable or
    /// malformed distributions are skipped; the load only fails when none
    /// of the directories can be listed.
    pub fn load(dirs: &[PathBuf]) -> Result<Self, MetadataError> {
        let mut index = Self::default();
        let mut last_error = None;

        for dir in dirs {
            let entries = match fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(source) => {
                    tracing::debug!("cannot list {}: {}", dir.display(), source);
                    last_error = Some(MetadataError::Io {
                        path: dir.clone(),
                        source,
                    });
                    continue;
                }
            };
            index.dirs.push(dir.clone());

            let mut paths: Vec<PathBuf> = entries.filter_map(|e| e.ok()).map(|e| e.path()).collect();
            paths.sort();

            for path in paths {
                let Some(kind) = MetadataKind::of(&path) else {
                    continue;
                };
                match read_distribution(&path, kind) {
                    Ok(dist) => index.insert(dist),
                    Err(e) => tracing::warn!("skipping distribution: {}", e),
                }
            }
        }

        if index.dirs.is_empty() {
            return Err(last_error.unwrap_or(MetadataError::NoSitePackages));
        }

        tracing::debug!(
            "indexed {} distributions from {} site-packages directories",
            index.distributions.len(),
            index.dirs.len()
        );
        Ok(index)
    }

    fn insert(&mut self, dist: Distribution) {
        let key = dist.normalized_name();
        if self.by_name.contains_key(&key) {
            tracing::debug!("{} shadowed by an earlier installation", dist.name);
            return;
        }

        let slot = self.distributions.len();
        for name in &dist.top_level {
            self.by_import.entry(name.clone()).or_default().push(slot);
        }
        self.by_name.insert(key, slot);
        self.distributions.push(dist);
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    pub fn len(&self) -> usize {
        self.distributions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.distributions.is_empty()
    }
}

impl PackageIndex for SitePackagesIndex {
    fn providers(&self, import_name: &str) -> Result<Vec<Distribution>, MetadataError> {
        Ok(self
            .by_import
            .get(import_name)
            .map(|slots| {
                slots
                    .iter()
                    .map(|&slot| self.distributions[slot].clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    fn distribution(&self, package_name: &str) -> Result<Option<Distribution>, MetadataError> {
        Ok(self
            .by_name
            .get(&normalize_package_name(package_name))
            .map(|&slot| self.distributions[slot].clone()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetadataKind {
    DistInfo,
    EggInfoDir,
    EggInfoFile,
}

impl MetadataKind {
    fn of(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy();
        if name.ends_with(".dist-info") && path.is_dir() {
            Some(MetadataKind::DistInfo)
        } else if name.ends_with(".egg-info") {
            if path.is_dir() {
                Some(MetadataKind::EggInfoDir)
            } else {
                Some(MetadataKind::EggInfoFile)
            }
        } else {
            None
        }
    }
}

fn read_to_string(path: &Path) -> Result<String, MetadataError> {
    let bytes = fs::read(path).map_err(|source| MetadataError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn read_optional(path: &Path) -> Option<String> {
    path.is_file().then(|| read_to_string(path).ok()).flatten()
}

fn read_distribution(path: &Path, kind: MetadataKind) -> Result<Distribution, MetadataError> {
    let metadata_file = match kind {
        MetadataKind::DistInfo => path.join("METADATA"),
        MetadataKind::EggInfoDir => path.join("PKG-INFO"),
        MetadataKind::EggInfoFile => path.to_path_buf(),
    };

    let (mut name, mut version) = read_optional(&metadata_file)
        .map(|text| parse_metadata_headers(&text))
        .unwrap_or((None, None));

    if name.is_none() || version.is_none() {
        let (dir_name, dir_version) = name_from_directory(path);
        name = name.or(dir_name);
        version = version.or(dir_version);
    }

    let name = name
        .filter(|n| !n.is_empty())
        .ok_or_else(|| MetadataError::Malformed(path.to_path_buf()))?;

    let top_level = match kind {
        MetadataKind::EggInfoFile => BTreeSet::new(),
        _ => read_top_level(path, kind),
    };

    Ok(Distribution {
        name,
        version,
        top_level: top_level.into_iter().collect(),
    })
}

/// Import names from `top_level.txt`, else derived from the file list
fn read_top_level(path: &Path, kind: MetadataKind) -> BTreeSet<String> {
    if let Some(text) = read_optional(&path.join("top_level.txt")) {
        let names: BTreeSet<String> = text
            .lines()
            .map(|line| line.trim().replace('/', "."))
            .filter_map(|line| line.split('.').next().map(str::to_string))
            .filter(|name| is_identifier(name))
            .collect();
        if !names.is_empty() {
            return names;
        }
    }

    match kind {
        MetadataKind::DistInfo => read_optional(&path.join("RECORD"))
            .map(|record| {
                record
                    .lines()
                    .filter_map(record_path)
                    .filter_map(top_level_from_record_path)
                    .collect()
            })
            .unwrap_or_default(),
        // installed-files.txt paths are relative to the egg-info directory
        MetadataKind::EggInfoDir => read_optional(&path.join("installed-files.txt"))
            .map(|files| {
                files
                    .lines()
                    .map(|line| line.trim().strip_prefix("../").unwrap_or(line.trim()))
                    .filter_map(top_level_from_record_path)
                    .collect()
            })
            .unwrap_or_default(),
        MetadataKind::EggInfoFile => BTreeSet::new(),
    }
}

/// First CSV column of a RECORD line. Paths may contain commas, the two
/// trailing columns (hash, size) never do.
fn record_path(line: &str) -> Option<&str> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let path = line.rsplitn(3, ',').last()?;
    Some(path.trim_matches('"'))
}

/// Map one installed file path to the top-level import name it provides
pub fn top_level_from_record_path(path: &str) -> Option<String> {
    let path = path.trim_start_matches("./");
    let mut parts = path.split('/');
    let first = parts.next()?;
    let nested = parts.next().is_some();

    if first.is_empty()
        || first == ".."
        || first == "__pycache__"
        || first.ends_with(".dist-info")
        || first.ends_with(".egg-info")
        || first.ends_with(".data")
    {
        return None;
    }

    let name = if nested {
        first
    } else if let Some(stem) = first.strip_suffix(".py") {
        stem
    } else if first.ends_with(".so") || first.ends_with(".pyd") {
        // `_speedups.cpython-312-x86_64-linux-gnu.so` -> `_speedups`
        first.split('.').next()?
    } else {
        return None;
    };

    is_identifier(name).then(|| name.to_string())
}

/// Parse `Name:` and `Version:` from core metadata (RFC 822 style headers)
pub fn parse_metadata_headers(text: &str) -> (Option<String>, Option<String>) {
    let mut name = None;
    let mut version = None;

    for line in text.lines() {
        if line.trim().is_empty() {
            break;
        }
        if let Some((key, value)) = line.split_once(':') {
            let value = value.trim();
            match key.trim().to_ascii_lowercase().as_str() {
                "name" if name.is_none() => name = Some(value.to_string()),
                "version" if version.is_none() => version = Some(value.to_string()),
                _ => {}
            }
        }
    }

    (name, version.filter(|v| !v.is_empty()))
}

/// `requests-2.31.0.dist-info` -> (`requests`, `2.31.0`)
fn name_from_directory(path: &Path) -> (Option<String>, Option<String>) {
    let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
        return (None, None);
    };
    match stem.split_once('-') {
        Some((name, rest)) => {
            // egg-info names may carry a `-py3.11` suffix after the version
            let version = rest.split('-').next().unwrap_or(rest);
            (Some(name.to_string()), Some(version.to_string()))
        }
        None => (Some(stem), None),
    }
}
