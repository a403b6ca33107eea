//! Model Checkpointing
//!
//! Save and restore collaborator weights, with checkpoint names keyed by a
//! content hash of the gym configuration so weights trained under one
//! configuration are never silently applied under another.

use std::fs;
use std::path::{Path, PathBuf};

use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::config::GymConfig;
use crate::error::{GymError, Result};

/// Checkpointer for saving and restoring models
pub struct Checkpointer {
    /// Directory for checkpoints
    checkpoint_dir: PathBuf,
    /// Maximum checkpoints to keep
    max_checkpoints: usize,
}

impl Checkpointer {
    /// Create a new checkpointer
    pub fn new<P: AsRef<Path>>(checkpoint_dir: P, max_checkpoints: usize) -> Self {
        let checkpoint_dir = checkpoint_dir.as_ref().to_path_buf();

        // Create directory if it doesn't exist
        if !checkpoint_dir.exists() {
            if let Err(e) = fs::create_dir_all(&checkpoint_dir) {
                warn!("Failed to create checkpoint directory: {}", e);
            }
        }

        Self {
            checkpoint_dir,
            max_checkpoints,
        }
    }

    /// Get checkpoint path for a given name
    pub fn checkpoint_path(&self, name: &str) -> PathBuf {
        self.checkpoint_dir.join(format!("{}.mpk", name))
    }

    /// Save a model
    pub fn save<B, M>(&self, model: &M, name: &str) -> Result<PathBuf>
    where
        B: Backend,
        M: Module<B>,
    {
        let path = self.checkpoint_path(name);

        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        model
            .clone()
            .save_file(&path, &recorder)
            .map_err(|e| GymError::Checkpoint(format!("failed to save checkpoint: {e}")))?;

        info!("Saved checkpoint to {:?}", path);

        // Cleanup old checkpoints
        self.cleanup_old_checkpoints();

        Ok(path)
    }

    /// Restore a model, failing closed.
    ///
    /// The caller's module is cloned before loading: a missing file or an
    /// incompatible record yields an error and leaves the original weights
    /// untouched; weights are never partially applied.
    pub fn restore<B, M>(&self, model: &M, name: &str, device: &B::Device) -> Result<M>
    where
        B: Backend,
        M: Module<B>,
    {
        let path = self.checkpoint_path(name);

        if !path.exists() {
            return Err(GymError::Checkpoint(format!(
                "checkpoint not found: {}",
                path.display()
            )));
        }

        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        let restored = model
            .clone()
            .load_file(&path, &recorder, device)
            .map_err(|e| {
                GymError::Checkpoint(format!(
                    "cached weights are not compatible with the current model: {e}"
                ))
            })?;

        info!("Restored checkpoint from {:?}", path);
        Ok(restored)
    }

    /// List available checkpoints
    pub fn list_checkpoints(&self) -> Vec<String> {
        let mut checkpoints = Vec::new();

        if let Ok(entries) = fs::read_dir(&self.checkpoint_dir) {
            for entry in entries.flatten() {
                if let Some(name) = entry.file_name().to_str() {
                    if name.ends_with(".mpk") {
                        checkpoints.push(name.trim_end_matches(".mpk").to_string());
                    }
                }
            }
        }

        checkpoints.sort();
        checkpoints
    }

    /// Get latest checkpoint name
    pub fn latest_checkpoint(&self) -> Option<String> {
        self.list_checkpoints().into_iter().last()
    }

    /// Check if a checkpoint exists
    pub fn exists(&self, name: &str) -> bool {
        self.checkpoint_path(name).exists()
    }

    /// Cleanup old checkpoints keeping only max_checkpoints
    fn cleanup_old_checkpoints(&self) {
        let checkpoints = self.list_checkpoints();

        if checkpoints.len() <= self.max_checkpoints {
            return;
        }

        let to_remove = checkpoints.len() - self.max_checkpoints;
        for name in checkpoints.into_iter().take(to_remove) {
            let path = self.checkpoint_path(&name);
            if let Err(e) = fs::remove_file(&path) {
                warn!("Failed to remove old checkpoint {:?}: {}", path, e);
            } else {
                info!("Removed old checkpoint: {}", name);
            }
        }
    }
}

impl Default for Checkpointer {
    fn default() -> Self {
        Self::new("./checkpoints", 5)
    }
}

/// SHA-256 content hash of the resolved configuration, hex-encoded.
pub fn config_hash(config: &GymConfig) -> Result<String> {
    let bytes = serde_json::to_vec(config)?;
    let digest = Sha256::digest(&bytes);
    Ok(hex::encode(digest))
}

/// Checkpoint name carrying the configuration identity, so restoration under
/// a different configuration misses instead of applying stale weights.
pub fn config_checkpoint_name(prefix: &str, config: &GymConfig) -> Result<String> {
    let hash = config_hash(config)?;
    Ok(format!("{}_{}", prefix, &hash[..16]))
}

/// Generate a checkpoint name with timestamp
pub fn timestamped_name(prefix: &str) -> String {
    let now = chrono::Utc::now();
    format!("{}_{}", prefix, now.format("%Y%m%d_%H%M%S"))
}
