use super::FormatError;
use crate::models::RunReport;

/// Serialize a RunReport to YAML
pub fn to_yaml(report: &RunReport) -> Result<String, FormatError> {
    serde_yaml::to_string(report).map_err(FormatError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RunMetadata, RunStats};
    use std::path::PathBuf;

    #[test]
    fn test_to_yaml() {
        let report = RunReport {
            root: PathBuf::from("/test"),
            output: Some(PathBuf::from("/test/requirements.txt")),
            manifest: vec![],
            resolutions: vec![],
            warnings: vec![],
            stats: RunStats::default(),
            metadata: RunMetadata::default(),
        };

        let yaml = to_yaml(&report).unwrap();
        assert!(yaml.contains("root: /test"));
        assert!(yaml.contains("manifest: []"));
    }
}
