//! Settings for a transition run.

pub mod cli;

use code_trie::{commitment::CommitmentBackend, DEFAULT_CHUNK_SIZE};
use serde::{Deserialize, Serialize};

use crate::{
    env::load_dotenvy_vars_if_present,
    error::{TransitionError, TransitionResult},
};

/// Default number of worker tasks.
pub const DEFAULT_NUM_WORKERS: usize = 16;
/// Default capacity of the job and result queues.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// How code is chunked and committed, and how much parallelism is used.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct TransitionConfig {
    /// Chunk size in bytes.
    pub chunk_size: usize,
    /// Number of worker tasks of a concurrent transition.
    pub num_workers: usize,
    /// Capacity of the job and result queues of a concurrent transition.
    pub queue_capacity: usize,
    /// The trie code roots are computed with.
    pub backend: CommitmentBackend,
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            num_workers: DEFAULT_NUM_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            backend: CommitmentBackend::default(),
        }
    }
}

impl TransitionConfig {
    /// Reads the `CODE_TRIE_*` variables, after loading a local `.env` file
    /// if there is one. Unset variables keep their defaults.
    pub fn from_env() -> TransitionResult<Self> {
        load_dotenvy_vars_if_present();

        let config: Self = cli::CliTransitionConfig::from_env()
            .map_err(|e| TransitionError::InvalidConfig(e.to_string()))?
            .into();
        config.validate()?;

        Ok(config)
    }

    /// Checks that the settings can drive a transition.
    pub fn validate(&self) -> TransitionResult<()> {
        if self.chunk_size == 0 || self.chunk_size > u8::MAX as usize {
            return Err(TransitionError::InvalidConfig(format!(
                "chunk size must be within 1..=255 (got {})",
                self.chunk_size
            )));
        }
        if self.num_workers == 0 {
            return Err(TransitionError::InvalidConfig(
                "at least one worker is required".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(TransitionError::InvalidConfig(
                "queue capacity must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}
