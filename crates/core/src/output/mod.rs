mod json;
mod yaml;

pub use json::to_json;
pub use yaml::to_yaml;

use crate::models::{ResolutionSource, RunReport};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Yaml,
    Summary,
}

/// Format a RunReport according to the specified format
pub fn format_output(report: &RunReport, format: OutputFormat) -> Result<String, FormatError> {
    match format {
        OutputFormat::Json => to_json(report),
        OutputFormat::Yaml => to_yaml(report),
        OutputFormat::Summary => Ok(format_summary(report)),
    }
}

/// Generate a human-readable summary
pub fn format_summary(report: &RunReport) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "Requirements Summary\n\
         ====================\n\
         Root: {}\n",
        report.root.display()
    ));
    match &report.output {
        Some(path) => output.push_str(&format!("Manifest: {}\n\n", path.display())),
        None => output.push_str("Manifest: (not written)\n\n"),
    }

    output.push_str(&format!(
        "Files Scanned: {}\n\
         - Scripts: {}\n\
         - Notebooks: {}\n\
         - Skipped: {}\n\n",
        report.stats.script_files + report.stats.notebook_files,
        report.stats.script_files,
        report.stats.notebook_files,
        report.stats.skipped_files
    ));

    output.push_str(&format!(
        "Total Imports: {}\n\
         - Stdlib: {}\n\
         - First-party: {}\n\
         - Third-party modules: {}\n\n",
        report.stats.total_imports,
        report.stats.stdlib_imports,
        report.stats.first_party_imports,
        report.stats.third_party_modules
    ));

    output.push_str(&format!(
        "Resolved: {} installed, {} AI, {} guessed\n\n",
        report.stats.resolved_local, report.stats.resolved_remote, report.stats.fallback
    ));

    if !report.manifest.is_empty() {
        output.push_str("Requirements:\n");
        for entry in &report.manifest {
            let marker = match entry.source {
                ResolutionSource::Local => "",
                ResolutionSource::Remote => " (ai)",
                ResolutionSource::Fallback => " (guess)",
            };
            output.push_str(&format!(
                "  {}{}  <- {}\n",
                entry.package.requirement_line(),
                marker,
                entry.imports.join(", ")
            ));
        }
        output.push('\n');
    }

    if !report.warnings.is_empty() {
        output.push_str("Warnings:\n");
        for warning in &report.warnings {
            output.push_str(&format!("  {}\n", warning));
        }
        output.push('\n');
    }

    output.push_str(&format!(
        "Duration: {}ms\n\
         Timestamp: {}\n\
         Tool Version: {}\n",
        report.metadata.duration_ms, report.metadata.timestamp, report.metadata.tool_version
    ));

    output
}

#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("YAML serialization error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ManifestEntry, ResolvedPackage, RunMetadata, RunStats, Warning};
    use std::path::PathBuf;

    #[test]
    fn test_summary_marks_guesses() {
        let report = RunReport {
            root: PathBuf::from("/proj"),
            output: None,
            manifest: vec![
                ManifestEntry {
                    package: ResolvedPackage::new("opencv-python", Some("4.9.0.80".to_string())),
                    imports: vec!["cv2".to_string()],
                    source: ResolutionSource::Remote,
                },
                ManifestEntry {
                    package: ResolvedPackage::new("foobar123", None),
                    imports: vec!["foobar123".to_string()],
                    source: ResolutionSource::Fallback,
                },
            ],
            resolutions: vec![],
            warnings: vec![Warning::Unresolved {
                names: vec!["foobar123".to_string()],
            }],
            stats: RunStats::default(),
            metadata: RunMetadata::default(),
        };

        let summary = format_output(&report, OutputFormat::Summary).unwrap();
        assert!(summary.contains("Manifest: (not written)"));
        assert!(summary.contains("opencv-python==4.9.0.80 (ai)  <- cv2"));
        assert!(summary.contains("foobar123 (guess)"));
        assert!(summary.contains("could not confidently resolve: foobar123"));
    }
}
