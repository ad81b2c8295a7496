use crate::common::{VoteError, Result, DevMode, Config};
use crate::storage::ledger::{LedgerSnapshot, VotingLedger};
use std::path::{Path, PathBuf};
use std::fs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotFormat {
    Bincode,
    Json,
}

impl SnapshotFormat {
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => SnapshotFormat::Json,
            _ => SnapshotFormat::Bincode,
        }
    }
}

/// File-backed persistence for a [`VotingLedger`]. Loading and saving are explicit.
pub struct LedgerStore {
    path: PathBuf,
    format: SnapshotFormat,
}

impl LedgerStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let format = SnapshotFormat::for_path(&path);
        Ok(Self { path, format })
    }

    pub fn new_with_dev_mode(dev_mode: &DevMode, config: &Config) -> Result<Self> {
        let path = config.ledger_path(&dev_mode.data_dir());

        if dev_mode.is_enabled() {
            tracing::debug!("LedgerStore using dev path: {:?}", path);
        }

        Self::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> SnapshotFormat {
        self.format
    }

    /// Read the ledger from disk. A missing file is an empty ledger.
    pub fn load(&self) -> Result<VotingLedger> {
        if !self.path.exists() {
            tracing::info!("No ledger at {:?}, starting empty", self.path);
            return Ok(VotingLedger::new());
        }

        let data = fs::read(&self.path)?;
        let snapshot: LedgerSnapshot = match self.format {
            SnapshotFormat::Bincode => bincode::deserialize(&data)
                .map_err(|e| VoteError::Storage(format!("Failed to deserialize: {}", e)))?,
            SnapshotFormat::Json => serde_json::from_slice(&data)
                .map_err(|e| VoteError::Storage(format!("Failed to deserialize: {}", e)))?,
        };

        let ledger = VotingLedger::from_snapshot(snapshot)?;
        tracing::debug!("Loaded ledger from {:?}", self.path);
        Ok(ledger)
    }

    /// Write the ledger through a temp file so a crash never leaves a half-written ledger.
    pub fn save(&self, ledger: &VotingLedger) -> Result<()> {
        let snapshot = ledger.snapshot()?;
        let encoded = match self.format {
            SnapshotFormat::Bincode => bincode::serialize(&snapshot)
                .map_err(|e| VoteError::Storage(format!("Failed to serialize: {}", e)))?,
            SnapshotFormat::Json => serde_json::to_vec_pretty(&snapshot)
                .map_err(|e| VoteError::Storage(format!("Failed to serialize: {}", e)))?,
        };

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, encoded)?;
        fs::rename(&tmp, &self.path)?;

        tracing::debug!("Saved ledger to {:?}", self.path);
        Ok(())
    }
}
