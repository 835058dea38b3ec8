//! Code-access witnesses over an SSZ hash tree of the chunked code.
//!
//! The tree follows the schema
//!
//! ```text
//! CodeTrie {
//!     metadata: Metadata { version: u8, code_hash: Bytes32, code_length: u16 },
//!     chunks: List[Chunk { fio: u8, code: Vector[u8, chunk_size] }, 1024],
//! }
//! ```
//!
//! and nodes are addressed by generalized index: the root is `1` and node `i`
//! has the children `2i` and `2i + 1`. The layout is fixed, so the indices of
//! interest are constants:
//!
//! | index               | node                                |
//! |---------------------|-------------------------------------|
//! | `2`                 | metadata                            |
//! | `3`                 | chunk list                          |
//! | `6`                 | chunk data root (depth 10 subtree)  |
//! | `7`                 | chunk count                         |
//! | `8`, `9`, `10`      | version, code hash, code length     |
//! | `6144 + k`          | chunk `k`                           |
//! | `(6144 + k) * 2`    | FIO of chunk `k`                    |
//! | `(6144 + k) * 2 + 1`| code of chunk `k`                   |

mod hasher;
mod proof;
pub mod serialize;
mod tree;

use thiserror::Error;

pub use self::hasher::WitnessHasher;
pub use self::proof::{CompressedMultiproof, Multiproof, ProofStats};
pub use self::tree::WitnessTree;
use crate::chunk::ChunkError;

/// Maximum number of chunks the chunk list can hold.
pub const MAX_CHUNKS: usize = 1 << CHUNKS_DEPTH;
/// Depth of the chunk data subtree below [`CHUNK_DATA_GINDEX`].
pub(crate) const CHUNKS_DEPTH: u32 = 10;

/// Generalized index of the metadata container.
pub const METADATA_GINDEX: u64 = 2;
/// Generalized index of the chunk data root.
pub const CHUNK_DATA_GINDEX: u64 = 6;
/// Generalized index of the chunk count.
pub const CHUNK_COUNT_GINDEX: u64 = 7;
/// Generalized index of the version field.
pub const VERSION_GINDEX: u64 = 8;
/// Generalized index of the code hash field.
pub const CODE_HASH_GINDEX: u64 = 9;
/// Generalized index of the code length field.
pub const CODE_LENGTH_GINDEX: u64 = 10;
/// Generalized index of the first chunk node.
pub const FIRST_CHUNK_GINDEX: u64 = CHUNK_DATA_GINDEX << CHUNKS_DEPTH;

/// Stores the result of witness operations.
pub type WitnessResult<T> = Result<T, WitnessError>;

/// Errors encountered while building, proving or encoding witnesses.
#[derive(Debug, Error)]
pub enum WitnessError {
    /// The code could not be chunked.
    #[error(transparent)]
    Chunk(#[from] ChunkError),

    /// Only a few chunk sizes have an SSZ layout.
    #[error("Chunk size {0} is not supported by the witness tree (expected 24, 32 or 40)")]
    UnsupportedChunkSize(usize),

    /// The code does not fit in the chunk list.
    #[error("Code has {0} chunks but the chunk list holds at most 1024")]
    TooManyChunks(usize),

    /// The code length does not fit the `u16` length field.
    #[error("Code length {0} does not fit in a u16")]
    CodeTooLong(usize),

    /// The index is not a node of the tree.
    #[error("Generalized index {0} is not part of the witness tree")]
    InvalidIndex(u64),

    /// A proof has a different number of leaves than indices.
    #[error("Proof has {indices} indices but {leaves} leaves")]
    LeafCountMismatch {
        /// Number of indices.
        indices: usize,
        /// Number of leaves.
        leaves: usize,
    },

    /// A proof does not carry exactly the helper hashes its indices need.
    #[error("Proof needs {expected} helper hashes but has {actual}")]
    HashCountMismatch {
        /// Number of helper hashes required by the indices.
        expected: usize,
        /// Number of helper hashes present.
        actual: usize,
    },

    /// A compressed proof has a different number of zero-hash placeholders
    /// than zero levels.
    #[error("Compressed proof has {placeholders} zero placeholders but {levels} zero levels")]
    ZeroLevelMismatch {
        /// Number of `None` hashes.
        placeholders: usize,
        /// Number of zero levels.
        levels: usize,
    },

    /// A zero level beyond the zero-hash table.
    #[error("Zero level {0} has no canonical zero hash")]
    UnknownZeroLevel(u8),

    /// The index does not fit the 2-byte wire format.
    #[error("Generalized index {0} does not fit in a u16")]
    IndexTooLarge(u64),

    /// A serialized proof could not be decoded.
    #[error("Malformed proof encoding: {0}")]
    Rlp(#[from] rlp::DecoderError),

    /// Compressing an encoded proof failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Chunk sizes the witness tree has a layout for.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum ChunkSize {
    /// 24-byte chunks, one leaf of code.
    Bytes24,
    /// 32-byte chunks, one leaf of code.
    #[default]
    Bytes32,
    /// 40-byte chunks, a two-leaf code subtree.
    Bytes40,
}

impl ChunkSize {
    /// The chunk size in bytes.
    pub const fn bytes(self) -> usize {
        match self {
            ChunkSize::Bytes24 => 24,
            ChunkSize::Bytes32 => 32,
            ChunkSize::Bytes40 => 40,
        }
    }

    /// Depth of the subtree holding a chunk's code.
    pub(crate) const fn code_depth(self) -> u32 {
        match self {
            ChunkSize::Bytes24 | ChunkSize::Bytes32 => 0,
            ChunkSize::Bytes40 => 1,
        }
    }
}

impl TryFrom<usize> for ChunkSize {
    type Error = WitnessError;

    fn try_from(size: usize) -> WitnessResult<Self> {
        match size {
            24 => Ok(ChunkSize::Bytes24),
            32 => Ok(ChunkSize::Bytes32),
            40 => Ok(ChunkSize::Bytes40),
            _ => Err(WitnessError::UnsupportedChunkSize(size)),
        }
    }
}

/// Generalized index of the FIO leaf of chunk `k`.
pub const fn fio_gindex(k: usize) -> u64 {
    (FIRST_CHUNK_GINDEX + k as u64) * 2
}

/// Generalized index of the code node of chunk `k`.
pub const fn code_gindex(k: usize) -> u64 {
    fio_gindex(k) + 1
}

/// Whether `index` addresses the FIO leaf of some chunk.
pub const fn is_fio_index(index: u64) -> bool {
    index >= fio_gindex(0) && index < fio_gindex(MAX_CHUNKS) && index % 2 == 0
}
