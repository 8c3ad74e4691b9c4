use super::MetadataError;
use crate::config::SiteConfig;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Prints the interpreter's package directories, one per line
const SITE_QUERY: &str = "import sys\nfor p in sys.path:\n    if p.endswith(('site-packages', 'dist-packages')):\n        print(p)";

/// Find the site-packages directories to index.
///
/// Order: explicit directories, the configured virtualenv, a `.venv` or
/// `venv` inside the project, then whatever the interpreter reports.
pub fn discover_site_packages(
    config: &SiteConfig,
    project_root: &Path,
) -> Result<Vec<PathBuf>, MetadataError> {
    if !config.site_packages.is_empty() {
        return Ok(config.site_packages.clone());
    }

    if let Some(ref venv) = config.venv {
        let dirs = venv_site_packages(venv);
        if !dirs.is_empty() {
            tracing::debug!("using virtualenv {}", venv.display());
            return Ok(dirs);
        }
    }

    for candidate in [".venv", "venv"] {
        let venv = project_root.join(candidate);
        if venv.join("pyvenv.cfg").is_file() {
            let dirs = venv_site_packages(&venv);
            if !dirs.is_empty() {
                tracing::debug!("using project virtualenv {}", venv.display());
                return Ok(dirs);
            }
        }
    }

    let dirs = interpreter_site_packages(&config.python)?;
    if dirs.is_empty() {
        return Err(MetadataError::NoSitePackages);
    }
    Ok(dirs)
}

/// site-packages directories inside a virtualenv (POSIX and Windows layouts)
pub fn venv_site_packages(venv: &Path) -> Vec<PathBuf> {
    let mut dirs = Vec::new();

    for lib in ["lib", "lib64"] {
        let Ok(entries) = fs::read_dir(venv.join(lib)) else {
            continue;
        };
        let mut found: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("python"))
            .map(|e| e.path().join("site-packages"))
            .filter(|p| p.is_dir())
            .collect();
        found.sort();
        for dir in found {
            let canonical = dir.canonicalize().unwrap_or_else(|_| dir.clone());
            if !dirs.iter().any(|d: &PathBuf| {
                d.canonicalize().unwrap_or_else(|_| d.clone()) == canonical
            }) {
                dirs.push(dir);
            }
        }
    }

    let windows = venv.join("Lib").join("site-packages");
    if windows.is_dir() && !dirs.contains(&windows) {
        dirs.push(windows);
    }

    dirs
}

fn interpreter_site_packages(python: &str) -> Result<Vec<PathBuf>, MetadataError> {
    let output = Command::new(python)
        .args(["-c", SITE_QUERY])
        .output()
        .map_err(|e| MetadataError::Interpreter {
            python: python.to_string(),
            reason: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(MetadataError::Interpreter {
            python: python.to_string(),
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .filter(|p| p.is_dir())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_explicit_dirs_win() {
        let config = SiteConfig::default().with_site_packages(vec![PathBuf::from("/x/site-packages")]);
        let dirs = discover_site_packages(&config, Path::new("/project")).unwrap();
        assert_eq!(dirs, vec![PathBuf::from("/x/site-packages")]);
    }

    #[test]
    fn test_venv_layout() {
        let venv = TempDir::new().unwrap();
        let site = venv.path().join("lib/python3.12/site-packages");
        fs::create_dir_all(&site).unwrap();

        assert_eq!(venv_site_packages(venv.path()), vec![site.clone()]);

        let config = SiteConfig::default().with_venv(Some(venv.path().to_path_buf()));
        let dirs = discover_site_packages(&config, Path::new("/project")).unwrap();
        assert_eq!(dirs, vec![site]);
    }

    #[test]
    fn test_project_venv() {
        let project = TempDir::new().unwrap();
        let site = project.path().join(".venv/lib/python3.11/site-packages");
        fs::create_dir_all(&site).unwrap();
        fs::write(project.path().join(".venv/pyvenv.cfg"), "home = /usr/bin\n").unwrap();

        let dirs = discover_site_packages(&SiteConfig::default(), project.path()).unwrap();
        assert_eq!(dirs, vec![site]);
    }

    #[test]
    fn test_missing_interpreter() {
        let project = TempDir::new().unwrap();
        let config = SiteConfig::default().with_python("definitely-not-a-python-binary");
        assert!(matches!(
            discover_site_packages(&config, project.path()),
            Err(MetadataError::Interpreter { .. })
        ));
    }
}
