use crate::categorizer::ImportCategorizer;
use crate::config::{IgnoreFilter, ScanConfig};
use crate::models::{FileKind, ImportOccurrence, ImportType, RunStats, SourceFile, Warning};
use crate::parsers::{ImportParser, NotebookParser, PythonParser};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Config error: {0}")]
    ConfigError(#[from] crate::config::ConfigError),
    #[error("Parser error: {0}")]
    ParserError(#[from] crate::parsers::ParserError),
    #[error("project path {0} is not a directory")]
    NotADirectory(PathBuf),
}

/// Result of walking and parsing a project
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    /// Files whose imports were extracted
    pub files: Vec<SourceFile>,
    /// Third-party top-level names with every place they were imported
    pub third_party: BTreeMap<String, Vec<ImportOccurrence>>,
    /// Names recognised as modules of the project itself
    pub first_party: BTreeSet<String>,
    pub warnings: Vec<Warning>,
    pub stats: RunStats,
}

/// Outcome of reading and parsing one file
struct FileScan {
    file: Option<SourceFile>,
    warnings: Vec<Warning>,
}

/// Walks a project, extracting imports from scripts and notebooks
pub struct ImportScanner {
    config: ScanConfig,
    ignore_filter: IgnoreFilter,
}

impl ImportScanner {
    pub fn new(config: ScanConfig) -> Result<Self, ScanError> {
        if !config.root.is_dir() {
            return Err(ScanError::NotADirectory(config.root.clone()));
        }
        let ignore_filter = IgnoreFilter::new(&config)?;
        Ok(Self {
            config,
            ignore_filter,
        })
    }

    /// Scan the project. Unreadable or unparsable files become warnings.
    pub fn scan(&self) -> Result<ScanResult, ScanError> {
        let source_files = self.find_source_files();
        tracing::info!("found {} files to scan", source_files.len());

        let scans: Vec<FileScan> = if self.config.threads == 1 {
            source_files
                .iter()
                .map(|(path, kind)| self.scan_file(path, *kind))
                .collect()
        } else {
            let pool = if self.config.threads > 0 {
                rayon::ThreadPoolBuilder::new()
                    .num_threads(self.config.threads)
                    .build()
                    .ok()
            } else {
                None
            };

            let run = || {
                source_files
                    .par_iter()
                    .map(|(path, kind)| self.scan_file(path, *kind))
                    .collect::<Vec<_>>()
            };
            match pool {
                Some(pool) => pool.install(run),
                None => run(),
            }
        };

        let categorizer = ImportCategorizer::from_project(&self.config.root, &source_files);
        Ok(self.aggregate(scans, &categorizer))
    }

    /// Find all scripts and notebooks, in path order
    fn find_source_files(&self) -> Vec<(PathBuf, FileKind)> {
        let mut files = Vec::new();

        let walker = WalkDir::new(&self.config.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || !self
                        .ignore_filter
                        .should_ignore(entry.path(), entry.file_type().is_dir())
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!("skipping unreadable entry: {}", e);
                    continue;
                }
            };

            if entry.file_type().is_dir() {
                continue;
            }

            if let Some(kind) = self
                .ignore_filter
                .file_kind(entry.path(), self.config.include_notebooks)
            {
                files.push((entry.path().to_path_buf(), kind));
            }
        }

        files
    }

    /// Read and parse a single file
    fn scan_file(&self, path: &Path, kind: FileKind) -> FileScan {
        let relative_path = path
            .strip_prefix(&self.config.root)
            .unwrap_or(path)
            .to_path_buf();

        let content = match read_source(path) {
            Ok(content) => content,
            Err(reason) => {
                tracing::debug!("skipping {}: {}", relative_path.display(), reason);
                return FileScan {
                    file: None,
                    warnings: vec![Warning::UnreadableFile {
                        path: relative_path,
                        reason,
                    }],
                };
            }
        };

        let mut warnings = Vec::new();
        let parsed = match kind {
            FileKind::Script => {
                PythonParser::new().and_then(|mut parser| parser.parse(&content))
            }
            FileKind::Notebook => NotebookParser::new(self.config.strip_magics)
                .and_then(|mut parser| parser.parse(&content))
                .map(|notebook| {
                    for failure in notebook.failures {
                        tracing::debug!(
                            "skipping cell {} of {}: {}",
                            failure.cell,
                            relative_path.display(),
                            failure.error
                        );
                        warnings.push(Warning::ParseFailure {
                            path: relative_path.clone(),
                            cell: Some(failure.cell),
                            message: failure.error.to_string(),
                        });
                    }
                    notebook.imports
                }),
        };

        match parsed {
            Ok(imports) => FileScan {
                file: Some(SourceFile {
                    path: relative_path,
                    absolute_path: path.to_path_buf(),
                    kind,
                    imports,
                }),
                warnings,
            },
            Err(error) => {
                tracing::debug!("skipping {}: {}", relative_path.display(), error);
                warnings.push(Warning::ParseFailure {
                    path: relative_path,
                    cell: None,
                    message: error.to_string(),
                });
                FileScan {
                    file: None,
                    warnings,
                }
            }
        }
    }

    fn aggregate(&self, scans: Vec<FileScan>, categorizer: &ImportCategorizer) -> ScanResult {
        let mut result = ScanResult::default();

        for scan in scans {
            result.warnings.extend(scan.warnings);

            let Some(file) = scan.file else {
                result.stats.skipped_files += 1;
                continue;
            };

            match file.kind {
                FileKind::Script => result.stats.script_files += 1,
                FileKind::Notebook => result.stats.notebook_files += 1,
            }

            for import in &file.imports {
                result.stats.total_imports += 1;
                match categorizer.categorize(&import.module) {
                    ImportType::Stdlib => result.stats.stdlib_imports += 1,
                    ImportType::FirstParty => {
                        result.stats.first_party_imports += 1;
                        result.first_party.insert(import.module.clone());
                    }
                    ImportType::ThirdParty => {
                        result
                            .third_party
                            .entry(import.module.clone())
                            .or_default()
                            .push(import.clone());
                    }
                }
            }

            result.files.push(file);
        }

        result.stats.third_party_modules = result.third_party.len();
        result
    }
}

/// Read a file as UTF-8 text; binary or undecodable content is an error
fn read_source(path: &Path) -> Result<String, String> {
    let bytes = fs::read(path).map_err(|e| e.to_string())?;
    if bytes.contains(&0) {
        return Err("binary content".to_string());
    }
    let text = String::from_utf8(bytes).map_err(|e| format!("not valid UTF-8: {}", e))?;
    Ok(match text.strip_prefix('\u{feff}') {
        Some(stripped) => stripped.to_string(),
        None => text,
    })
}
