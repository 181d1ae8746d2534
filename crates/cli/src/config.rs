use anyhow::{Context, Result};
use lumina_people::{ClusteringParams, QualityThresholds};
use lumina_regen::RegenConfig;
use lumina_search::FusionWeights;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Engine tuning loaded from a JSON file.
///
/// Every section and field is optional; anything omitted falls back to the
/// built-in defaults. Command-line flags override file values.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub fusion: FusionWeights,
    pub clustering: ClusteringParams,
    pub quality: QualityThresholds,
    pub regen: RegenConfig,
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&json)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.fusion.validate()?;
        self.clustering.validate()?;
        self.quality.validate()?;
        self.regen.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.fusion.keyword, 0.6);
        assert_eq!(config.clustering.similarity_threshold, 0.6);
        assert_eq!(config.quality.intra_floor, 0.55);
        assert_eq!(config.regen.batch_size, 50);
    }

    #[test]
    fn partial_sections_keep_unmentioned_defaults() {
        let json = r#"{"clustering": {"similarity_threshold": 0.7}, "regen": {"batch_size": 10}}"#;
        let config: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.clustering.similarity_threshold, 0.7);
        assert_eq!(config.clustering.min_points, 2);
        assert_eq!(config.regen.batch_size, 10);
        assert_eq!(config.regen.provider_timeout_ms, 10_000);
    }

    #[test]
    fn load_rejects_out_of_range_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"clustering": {"similarity_threshold": 7.0}}"#).unwrap();
        assert!(EngineConfig::load(&path).is_err());
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = EngineConfig::load(&dir.path().join("absent.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
