use std::path::PathBuf;
use std::fs;
use directories::ProjectDirs;
use crate::common::error::Result;
use crate::common::paths::{system_config_file, system_data_dir};

#[derive(Debug, Clone)]
pub struct DevMode {
    enabled: bool,
    base_dir: PathBuf,
}

impl DevMode {
    pub fn new(enabled: bool) -> Result<Self> {
        Self::with_base_dir(enabled, PathBuf::from("./dev_data"))
    }

    pub fn with_base_dir(enabled: bool, base_dir: PathBuf) -> Result<Self> {
        // Create dev directories if in dev mode
        if enabled {
            fs::create_dir_all(base_dir.join("ledger"))?;
            fs::create_dir_all(base_dir.join("config"))?;

            tracing::info!("Development mode enabled - data will be saved to: {}",
                           base_dir.display());
        }

        Ok(Self { enabled, base_dir })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Directory holding the ledger file.
    pub fn data_dir(&self) -> PathBuf {
        if self.enabled {
            return self.base_dir.join("ledger");
        }

        ProjectDirs::from("org", "facevote", "FaceVote")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(system_data_dir)
    }

    pub fn config_file(&self) -> PathBuf {
        if self.enabled {
            self.base_dir.join("config").join("facevote.toml")
        } else {
            system_config_file()
        }
    }
}
