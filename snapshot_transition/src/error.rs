use code_trie::commitment::CommitmentError;
use ethereum_types::H256;
use thiserror::Error;

/// Stores the result of transition operations.
pub type TransitionResult<T> = Result<T, TransitionError>;

/// Errors that abort a transition.
#[derive(Debug, Error)]
pub enum TransitionError {
    /// An account record is not a slim account.
    #[error("Malformed account record: {0}")]
    Account(#[from] rlp::DecoderError),

    /// The code source could not provide the code for a hash.
    #[error("Failed to fetch code {code_hash:x}")]
    CodeSource {
        /// The requested code hash.
        code_hash: H256,
        /// The error reported by the source.
        #[source]
        source: anyhow::Error,
    },

    /// The code could not be merkleized.
    #[error(transparent)]
    Commitment(#[from] CommitmentError),

    /// A producer or worker task panicked or was cancelled.
    #[error("Transition task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// The configuration cannot drive a transition.
    #[error("Invalid transition config: {0}")]
    InvalidConfig(String),
}
