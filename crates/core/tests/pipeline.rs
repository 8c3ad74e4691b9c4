use mta_rust_aireqs_core::metadata::Distribution;
use mta_rust_aireqs_core::resolver::{LookupRequest, LookupResponse, RemoteLookup};
use mta_rust_aireqs_core::{
    InMemoryIndex, ManifestConfig, ManifestError, PipelineError, RemoteError, RemoteResolver,
    RequirementsGenerator, ResolutionSource, ScanConfig, Warning,
};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Answers from a fixed table and records every requested name
#[derive(Clone, Default)]
struct Counting {
    table: HashMap<String, String>,
    requested: Arc<Mutex<Vec<String>>>,
}

impl Counting {
    fn with(mut self, import: &str, package: &str) -> Self {
        self.table.insert(import.to_string(), package.to_string());
        self
    }
}

impl RemoteLookup for Counting {
    fn lookup(&self, request: &LookupRequest) -> Result<LookupResponse, RemoteError> {
        let mut requested = self.requested.lock().unwrap();
        let packages = request
            .items
            .iter()
            .map(|item| {
                requested.push(item.name.clone());
                (item.name.clone(), self.table.get(&item.name).cloned())
            })
            .collect();
        Ok(LookupResponse { packages })
    }
}

/// A service that never answers
struct Down;

impl RemoteLookup for Down {
    fn lookup(&self, _request: &LookupRequest) -> Result<LookupResponse, RemoteError> {
        Err(RemoteError::Unavailable("connection refused".to_string()))
    }
}

fn write(dir: &Path, rel: &str, content: &str) {
    let path = dir.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn index() -> Box<InMemoryIndex> {
    Box::new(
        InMemoryIndex::default()
            .with_distribution(Distribution::new("numpy", Some("1.26.4"), &["numpy"]))
            .with_distribution(Distribution::new("opencv-python", Some("4.9.0.80"), &[])),
    )
}

fn generator(
    root: &Path,
    manifest: ManifestConfig,
    remote: Result<RemoteResolver, RemoteError>,
) -> RequirementsGenerator {
    RequirementsGenerator::with_parts(
        ScanConfig::new(root.to_path_buf()).with_threads(1),
        manifest,
        index(),
        remote,
    )
}

#[test]
fn test_remote_name_pinned_with_installed_version() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "vision.py", "import cv2\nimport os\n");

    let remote = Counting::default().with("cv2", "opencv-python");
    let mut generator = generator(
        dir.path(),
        ManifestConfig::default(),
        Ok(RemoteResolver::new(Box::new(remote))),
    );

    let run = generator.run().unwrap();

    let written = fs::read_to_string(dir.path().join("requirements.txt")).unwrap();
    assert_eq!(written, "opencv-python==4.9.0.80\n");
    assert_eq!(run.rendered, written);
    assert_eq!(run.report.stats.resolved_remote, 1);
    assert_eq!(run.report.stats.stdlib_imports, 1);
    assert!(run.report.guesses().is_empty());
}

#[test]
fn test_remote_failure_falls_back_to_raw_name() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "app.py", "import foobar123\n");

    let mut generator = generator(
        dir.path(),
        ManifestConfig::default(),
        Ok(RemoteResolver::new(Box::new(Down))),
    );

    let run = generator.run().unwrap();

    let written = fs::read_to_string(dir.path().join("requirements.txt")).unwrap();
    assert_eq!(written, "foobar123\n");
    assert!(run
        .report
        .warnings
        .iter()
        .any(|w| matches!(w, Warning::RemoteFailed { names, .. } if names == &["foobar123"])));
    assert!(run.report.warnings.contains(&Warning::Unresolved {
        names: vec!["foobar123".to_string()],
    }));
    assert_eq!(run.report.guesses(), vec!["foobar123"]);
}

#[test]
fn test_notebook_with_broken_cell() {
    let dir = TempDir::new().unwrap();
    let notebook = serde_json::json!({
        "cells": [
            { "cell_type": "markdown", "source": "# Analysis" },
            { "cell_type": "code", "source": "for x in:\n    pass\n" },
            { "cell_type": "code", "source": ["%matplotlib inline\n", "import numpy as np\n"] },
        ],
        "nbformat": 4,
        "nbformat_minor": 5,
    });
    write(dir.path(), "analysis.ipynb", &notebook.to_string());

    let mut generator = generator(
        dir.path(),
        ManifestConfig::default(),
        Err(RemoteError::MissingCredentials),
    );

    let run = generator.run().unwrap();

    assert_eq!(run.rendered, "numpy==1.26.4\n");
    assert!(run
        .report
        .warnings
        .iter()
        .any(|w| matches!(w, Warning::ParseFailure { cell: Some(_), .. })));
    // everything resolved locally, so the missing key never mattered
    assert!(!run
        .report
        .warnings
        .iter()
        .any(|w| matches!(w, Warning::RemoteSkipped { .. })));
}

#[test]
fn test_unwritable_output_is_fatal() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "app.py", "import numpy\n");
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, "").unwrap();
    let output = blocker.join("requirements.txt");

    let mut generator = generator(
        dir.path(),
        ManifestConfig::default().with_output(Some(output.clone())),
        Err(RemoteError::MissingCredentials),
    );

    let err = generator.run().unwrap_err();

    assert!(matches!(err, PipelineError::Manifest(ManifestError::Write { .. })));
    assert!(!output.exists());
}

#[test]
fn test_read_only_manifest_is_fatal_and_untouched() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "app.py", "import numpy\n");
    let manifest = dir.path().join("requirements.txt");
    fs::write(&manifest, "old\n").unwrap();
    let mut perms = fs::metadata(&manifest).unwrap().permissions();
    perms.set_readonly(true);
    fs::set_permissions(&manifest, perms).unwrap();

    let mut generator = generator(
        dir.path(),
        ManifestConfig::default(),
        Err(RemoteError::MissingCredentials),
    );

    let err = generator.run().unwrap_err();

    assert!(matches!(err, PipelineError::Manifest(ManifestError::Write { .. })));
    assert!(err.to_string().contains("requirements.txt"));
    assert_eq!(fs::read_to_string(&manifest).unwrap(), "old\n");
}

#[test]
fn test_dotted_import_uses_top_level_name() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "main.py", "import a.b.c\n");

    let mut generator = generator(
        dir.path(),
        ManifestConfig::default().with_dry_run(true),
        Err(RemoteError::MissingCredentials),
    );

    let run = generator.run().unwrap();

    assert_eq!(run.rendered, "a\n");
    assert_eq!(run.report.resolutions[0].import, "a");
    assert_eq!(run.report.resolutions[0].source, ResolutionSource::Fallback);
    assert_eq!(
        run.report
            .warnings
            .iter()
            .filter(|w| matches!(w, Warning::RemoteSkipped { .. }))
            .count(),
        1
    );
    assert!(run.report.output.is_none());
    assert!(!dir.path().join("requirements.txt").exists());
}

#[test]
fn test_remote_called_once_per_name_across_files() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.py", "import cv2\nimport bs4\n");
    write(dir.path(), "b.py", "from cv2 import imread\n");
    write(dir.path(), "pkg/c.py", "import bs4.element\nimport cv2\n");

    let remote = Counting::default()
        .with("cv2", "opencv-python")
        .with("bs4", "beautifulsoup4");
    let requested = remote.requested.clone();
    let mut generator = generator(
        dir.path(),
        ManifestConfig::default().with_dry_run(true),
        Ok(RemoteResolver::new(Box::new(remote))),
    );

    let run = generator.run().unwrap();

    let mut names = requested.lock().unwrap().clone();
    names.sort();
    assert_eq!(names, vec!["bs4", "cv2"]);
    assert_eq!(run.rendered, "beautifulsoup4\nopencv-python==4.9.0.80\n");
    assert!(run.report.warnings.contains(&Warning::VersionUnknown {
        package: "beautifulsoup4".to_string(),
    }));
}

#[test]
fn test_empty_project_writes_empty_manifest() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "script.py", "import os\nimport sys\n");

    let mut generator = generator(
        dir.path(),
        ManifestConfig::default(),
        Err(RemoteError::MissingCredentials),
    );

    let run = generator.run().unwrap();

    let written = fs::read_to_string(dir.path().join("requirements.txt")).unwrap();
    assert_eq!(written, "");
    assert!(run.report.warnings.contains(&Warning::EmptyManifest));
    assert!(run.report.manifest.is_empty());
}

#[test]
fn test_header_and_first_party_modules() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "app.py", "import utils\nfrom mypkg.models import User\nimport numpy\n");
    write(dir.path(), "utils.py", "import os\n");
    write(dir.path(), "mypkg/__init__.py", "");
    write(dir.path(), "mypkg/models.py", "from . import base\n");

    let mut generator = generator(
        dir.path(),
        ManifestConfig::default()
            .with_dry_run(true)
            .with_header(Some("# Generated by aireqs".to_string())),
        Err(RemoteError::MissingCredentials),
    );

    let run = generator.run().unwrap();

    assert_eq!(run.rendered, "# Generated by aireqs\nnumpy==1.26.4\n");
    assert_eq!(run.report.stats.first_party_imports, 2);
}
