use clap::{Args, Parser, ValueEnum};
use code_trie::commitment::CommitmentBackend;

use super::{TransitionConfig, DEFAULT_NUM_WORKERS, DEFAULT_QUEUE_CAPACITY};

const HELP_HEADING: &str = "Code trie transition options";

/// Commitment tries selectable from the command line.
#[derive(ValueEnum, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
pub enum CliBackend {
    /// In-memory Merkle Patricia trie.
    #[default]
    Mpt,
    /// Database-backed Merkle Patricia trie.
    EthTrie,
    /// One-pass hasher over sorted entries.
    Sorted,
}

impl From<CliBackend> for CommitmentBackend {
    fn from(backend: CliBackend) -> Self {
        match backend {
            CliBackend::Mpt => CommitmentBackend::Mpt,
            CliBackend::EthTrie => CommitmentBackend::EthTrie,
            CliBackend::Sorted => CommitmentBackend::Sorted,
        }
    }
}

/// Transition settings for embedding in a binary's command line.
#[derive(Args, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct CliTransitionConfig {
    /// Chunk size in bytes.
    #[arg(long, env = "CODE_TRIE_CHUNK_SIZE", help_heading = HELP_HEADING, default_value_t = 32)]
    chunk_size: usize,
    /// Number of worker tasks merkleizing code in parallel.
    #[arg(long, env = "CODE_TRIE_NUM_WORKERS", help_heading = HELP_HEADING, default_value_t = DEFAULT_NUM_WORKERS)]
    num_workers: usize,
    /// Capacity of the job and result queues.
    #[arg(long, env = "CODE_TRIE_QUEUE_CAPACITY", help_heading = HELP_HEADING, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    queue_capacity: usize,
    /// The trie code roots are computed with.
    #[arg(long, env = "CODE_TRIE_BACKEND", help_heading = HELP_HEADING, value_enum, default_value_t = CliBackend::Mpt)]
    backend: CliBackend,
}

/// A command line made of the transition options alone.
#[derive(Parser)]
struct EnvOnly {
    #[command(flatten)]
    config: CliTransitionConfig,
}

impl CliTransitionConfig {
    /// The settings given by `CODE_TRIE_*` environment variables, with
    /// defaults for the unset ones.
    pub fn from_env() -> Result<Self, clap::Error> {
        EnvOnly::try_parse_from([env!("CARGO_PKG_NAME")]).map(|cli| cli.config)
    }
}

impl From<CliTransitionConfig> for TransitionConfig {
    fn from(cli: CliTransitionConfig) -> Self {
        Self {
            chunk_size: cli.chunk_size,
            num_workers: cli.num_workers,
            queue_capacity: cli.queue_capacity,
            backend: cli.backend.into(),
        }
    }
}
