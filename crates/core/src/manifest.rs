//! Building, rendering and writing the requirements manifest.

use crate::models::{normalize_package_name, ManifestEntry, Resolution, ResolutionSource};
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Ordered, deduplicated set of requirement entries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// One entry per normalized package name. When several imports map to
    /// the same package, a pinned version beats an unpinned one.
    pub fn from_resolutions(resolutions: &[Resolution]) -> Self {
        let mut by_name: HashMap<String, ManifestEntry> = HashMap::new();

        for resolution in resolutions {
            let key = normalize_package_name(&resolution.package.name);
            match by_name.get_mut(&key) {
                Some(entry) => {
                    if !entry.imports.contains(&resolution.import) {
                        entry.imports.push(resolution.import.clone());
                    }
                    if entry.package.version.is_none() && resolution.package.version.is_some() {
                        entry.package = resolution.package.clone();
                        entry.source = resolution.source;
                    } else if entry.source == ResolutionSource::Fallback
                        && resolution.source.is_confident()
                        && entry.package.version == resolution.package.version
                    {
                        entry.source = resolution.source;
                    }
                }
                None => {
                    by_name.insert(
                        key,
                        ManifestEntry {
                            package: resolution.package.clone(),
                            imports: vec![resolution.import.clone()],
                            source: resolution.source,
                        },
                    );
                }
            }
        }

        let mut entries: Vec<ManifestEntry> = by_name.into_values().collect();
        for entry in &mut entries {
            entry.imports.sort();
        }
        entries.sort_by(|a, b| {
            a.package
                .name
                .to_lowercase()
                .cmp(&b.package.name.to_lowercase())
                .then_with(|| a.package.name.cmp(&b.package.name))
        });

        Self { entries }
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<ManifestEntry> {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Requirements text, one line per package with a trailing newline.
    /// An empty manifest with no header renders as an empty string.
    pub fn render(&self, header: Option<&str>) -> String {
        let mut out = String::new();
        if let Some(header) = header.map(str::trim).filter(|h| !h.is_empty()) {
            for line in header.lines() {
                if line.starts_with('#') {
                    out.push_str(line);
                } else {
                    out.push_str("# ");
                    out.push_str(line);
                }
                out.push('\n');
            }
        }
        for entry in &self.entries {
            out.push_str(&entry.package.requirement_line());
            out.push('\n');
        }
        out
    }
}

/// Write `content` to `path` via a temporary file in the same directory,
/// so a failed write never leaves a partial manifest behind. A read-only
/// destination is refused; an existing file keeps its permissions and a new
/// one gets the usual umask-filtered mode.
pub fn write_atomic(path: &Path, content: &str) -> Result<(), ManifestError> {
    let write_error = |source| ManifestError::Write {
        path: path.to_path_buf(),
        source,
    };

    let existing = match fs::metadata(path) {
        Ok(metadata) => Some(metadata.permissions()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => return Err(write_error(e)),
    };
    if existing.as_ref().is_some_and(|perms| perms.readonly()) {
        return Err(write_error(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "destination is read-only",
        )));
    }

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut builder = tempfile::Builder::new();
    builder.prefix(".requirements").suffix(".tmp");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(fs::Permissions::from_mode(0o666));
    }

    let mut temp = builder.tempfile_in(parent).map_err(write_error)?;
    if let Some(perms) = existing {
        temp.as_file().set_permissions(perms).map_err(write_error)?;
    }
    temp.write_all(content.as_bytes()).map_err(write_error)?;
    temp.flush().map_err(write_error)?;
    temp.persist(path).map_err(|e| write_error(e.error))?;

    tracing::info!("wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResolvedPackage;
    use std::fs;
    use tempfile::TempDir;

    fn resolution(import: &str, name: &str, version: Option<&str>, source: ResolutionSource) -> Resolution {
        Resolution {
            import: import.to_string(),
            package: ResolvedPackage::new(name, version.map(str::to_string)),
            source,
        }
    }

    #[test]
    fn test_dedup_prefers_pinned_version() {
        let manifest = Manifest::from_resolutions(&[
            resolution("yaml", "PyYAML", None, ResolutionSource::Remote),
            resolution("_yaml", "pyyaml", Some("6.0.1"), ResolutionSource::Local),
        ]);

        assert_eq!(manifest.len(), 1);
        let entry = &manifest.entries()[0];
        assert_eq!(entry.package.requirement_line(), "pyyaml==6.0.1");
        assert_eq!(entry.imports, vec!["_yaml", "yaml"]);
        assert_eq!(entry.source, ResolutionSource::Local);
    }

    #[test]
    fn test_sorted_case_insensitively() {
        let manifest = Manifest::from_resolutions(&[
            resolution("yaml", "PyYAML", Some("6.0.1"), ResolutionSource::Local),
            resolution("attr", "attrs", Some("23.2.0"), ResolutionSource::Local),
            resolution("foobar123", "foobar123", None, ResolutionSource::Fallback),
            resolution("django", "Django", Some("5.0"), ResolutionSource::Local),
        ]);

        assert_eq!(
            manifest.render(None),
            "attrs==23.2.0\nDjango==5.0\nfoobar123\nPyYAML==6.0.1\n"
        );
    }

    #[test]
    fn test_render_header_and_empty() {
        let empty = Manifest::default();
        assert_eq!(empty.render(None), "");
        assert_eq!(empty.render(Some("  ")), "");
        assert_eq!(empty.render(Some("Generated")), "# Generated\n");

        let manifest = Manifest::from_resolutions(&[resolution(
            "numpy",
            "numpy",
            Some("1.26.4"),
            ResolutionSource::Local,
        )]);
        assert_eq!(
            manifest.render(Some("# Generated by aireqs")),
            "# Generated by aireqs\nnumpy==1.26.4\n"
        );
    }

    #[test]
    fn test_write_atomic_replaces_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("requirements.txt");
        fs::write(&path, "old\n").unwrap();

        write_atomic(&path, "numpy==1.26.4\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "numpy==1.26.4\n");
        let leftovers = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_write_atomic_unwritable_destination() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not_a_dir");
        fs::write(&blocker, "").unwrap();
        let path = blocker.join("requirements.txt");

        let err = write_atomic(&path, "numpy\n").unwrap_err();

        assert!(matches!(err, ManifestError::Write { .. }));
        assert!(err.to_string().contains("requirements.txt"));
        assert!(!path.exists());
    }

    #[test]
    fn test_write_atomic_refuses_read_only_manifest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("requirements.txt");
        fs::write(&path, "old\n").unwrap();
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_readonly(true);
        fs::set_permissions(&path, perms).unwrap();

        let err = write_atomic(&path, "numpy\n").unwrap_err();

        match err {
            ManifestError::Write { path: failed, source } => {
                assert_eq!(failed, path);
                assert_eq!(source.kind(), io::ErrorKind::PermissionDenied);
            }
        }
        assert_eq!(fs::read_to_string(&path).unwrap(), "old\n");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_write_atomic_keeps_existing_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("requirements.txt");
        fs::write(&path, "old\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).unwrap();

        write_atomic(&path, "numpy\n").unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o640);
    }

    #[cfg(unix)]
    #[test]
    fn test_write_atomic_new_file_is_not_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("requirements.txt");

        write_atomic(&path, "numpy\n").unwrap();

        // 0o666 minus the process umask; group/other read survives any
        // common umask (022, 002, 027 keeps group read)
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode & 0o600, 0o600);
        assert_ne!(mode, 0o600);
        assert_eq!(mode & 0o111, 0);
    }
}
