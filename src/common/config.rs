use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::common::error::{VoteError, Result};

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub election: ElectionConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub matcher: MatcherConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub admin: AdminConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ElectionConfig {
    #[serde(default = "default_election_name")]
    pub name: String,
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self { name: default_election_name() }
    }
}

pub fn default_election_name() -> String {
    "SecureVote Election 2024".to_string()
}

/// Frame geometry and layout of the pixel-statistics embedding.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct EmbeddingConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_region_size")]
    pub region_size: u32,
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    /// Distance in pixels between two edge samples
    #[serde(default = "default_edge_stride")]
    pub edge_stride: usize,
    #[serde(default = "default_edge_samples")]
    pub edge_samples: usize,
}

fn default_width() -> u32 { 640 }
fn default_height() -> u32 { 480 }
fn default_region_size() -> u32 { 64 }
fn default_dimensions() -> usize { 512 }
fn default_edge_stride() -> usize { 5 }
fn default_edge_samples() -> usize { 20 }

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            region_size: default_region_size(),
            dimensions: default_dimensions(),
            edge_stride: default_edge_stride(),
            edge_samples: default_edge_samples(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MatcherConfig {
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    #[serde(default)]
    pub reject_duplicate_faces: bool,
}

fn default_similarity_threshold() -> f32 { 0.7 }

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            reject_duplicate_faces: false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StorageConfig {
    /// Relative paths are resolved against the data directory
    #[serde(default = "default_ledger_file")]
    pub ledger_file: PathBuf,
}

fn default_ledger_file() -> PathBuf {
    PathBuf::from("ledger.bincode")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { ledger_file: default_ledger_file() }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct AdminConfig {
    #[serde(default)]
    pub key: String,
    /// Hex HMAC-SHA256 of the admin password under `key`; empty when unset
    #[serde(default)]
    pub password_digest: String,
}

impl Config {
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(VoteError::Other(anyhow::anyhow!(
                "Config file not found: {}", path.display()
            )));
        }

        tracing::info!("Loading config from: {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&contents)?;
        Ok(config)
    }

    /// Loads the file when present, falls back to defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from_path(path)
        } else {
            tracing::info!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)
            .map_err(|e| VoteError::Other(anyhow::anyhow!("Config parse error: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn ledger_path(&self, data_dir: &Path) -> PathBuf {
        if self.storage.ledger_file.is_relative() {
            data_dir.join(&self.storage.ledger_file)
        } else {
            self.storage.ledger_file.clone()
        }
    }

    pub fn validate(&self) -> Result<()> {
        let emb = &self.embedding;

        if emb.width == 0 || emb.width > 4096 {
            return Err(VoteError::Validation(format!(
                "Frame width must be between 1 and 4096, got {}", emb.width
            )));
        }
        if emb.height == 0 || emb.height > 4096 {
            return Err(VoteError::Validation(format!(
                "Frame height must be between 1 and 4096, got {}", emb.height
            )));
        }

        if emb.region_size == 0 || emb.region_size > emb.width.min(emb.height) {
            return Err(VoteError::Validation(format!(
                "Region size must be between 1 and {}, got {}",
                emb.width.min(emb.height), emb.region_size
            )));
        }

        if emb.dimensions == 0 || emb.dimensions > 65536 {
            return Err(VoteError::Validation(format!(
                "Embedding dimensions must be between 1 and 65536, got {}", emb.dimensions
            )));
        }
        if emb.edge_stride == 0 {
            return Err(VoteError::Validation("Edge stride must be at least 1".into()));
        }

        let threshold = self.matcher.similarity_threshold;
        if !(-1.0..=1.0).contains(&threshold) {
            return Err(VoteError::Validation(format!(
                "Similarity threshold must be between -1.0 and 1.0, got {}", threshold
            )));
        }

        if self.election.name.trim().is_empty() {
            return Err(VoteError::Validation("Election name must not be empty".into()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.embedding.width, 640);
        assert_eq!(config.embedding.height, 480);
        assert_eq!(config.embedding.region_size, 64);
        assert_eq!(config.embedding.dimensions, 512);
        assert_eq!(config.matcher.similarity_threshold, 0.7);
        assert!(!config.matcher.reject_duplicate_faces);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = Config::from_toml(
            "[matcher]\nsimilarity_threshold = 0.8\n\n[embedding]\ndimensions = 128\n",
        ).unwrap();
        assert_eq!(config.matcher.similarity_threshold, 0.8);
        assert_eq!(config.embedding.dimensions, 128);
        assert_eq!(config.embedding.width, 640);
        assert_eq!(config.election.name, "SecureVote Election 2024");
    }

    #[test]
    fn test_rejects_oversized_region() {
        let result = Config::from_toml("[embedding]\nwidth = 32\nheight = 32\nregion_size = 64\n");
        assert!(matches!(result, Err(VoteError::Validation(_))));
    }

    #[test]
    fn test_rejects_threshold_out_of_range() {
        let result = Config::from_toml("[matcher]\nsimilarity_threshold = 1.5\n");
        assert!(matches!(result, Err(VoteError::Validation(_))));
    }

    #[test]
    fn test_ledger_path_resolution() {
        let mut config = Config::default();
        let data_dir = Path::new("/tmp/data");
        assert_eq!(config.ledger_path(data_dir), data_dir.join("ledger.bincode"));

        config.storage.ledger_file = PathBuf::from("/srv/ledger.json");
        assert_eq!(config.ledger_path(data_dir), PathBuf::from("/srv/ledger.json"));
    }
}
