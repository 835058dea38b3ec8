//! Committing chunked code to an ordered key/value trie.
//!
//! Every chunk is inserted under its big-endian 2-byte index with the value
//! `fio ++ code`. Three metadata entries follow at sentinel keys above any
//! chunk index a program can produce:
//!
//! | key      | value                          |
//! |----------|--------------------------------|
//! | `0xfffd` | version (`0x00`)               |
//! | `0xfffe` | code length, 4 bytes BE        |
//! | `0xffff` | keccak hash of the code        |
//!
//! The trie itself is a [`CommitmentTree`] passed in by the caller. Any trie
//! whose root depends only on the final set of entries (not on insertion
//! order) yields the same code root.

mod eth;
mod mpt;
mod sorted;

use ethereum_types::H256;
use log::debug;
use mpt_trie::{nibbles::BytesToNibblesError, trie_ops::TrieOpError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use self::eth::EthTrieCommitment;
pub use self::mpt::MptCommitment;
pub use self::sorted::SortedCommitment;
use crate::{
    chunk::{chunkify, Chunk, ChunkError},
    hash_code,
};

/// Key of the code version entry.
pub const VERSION_KEY: [u8; 2] = [0xff, 0xfd];
/// Key of the code length entry.
pub const CODE_LENGTH_KEY: [u8; 2] = [0xff, 0xfe];
/// Key of the code hash entry.
pub const CODE_HASH_KEY: [u8; 2] = [0xff, 0xff];
/// Current code trie version.
pub const VERSION: u8 = 0x00;

/// Stores the result of commitment operations.
pub type CommitmentResult<T> = Result<T, CommitmentError>;

/// Errors encountered while committing code.
#[derive(Debug, Error)]
pub enum CommitmentError {
    /// The code could not be chunked.
    #[error(transparent)]
    Chunk(#[from] ChunkError),

    /// A key could not be turned into a trie path.
    #[error(transparent)]
    Key(#[from] BytesToNibblesError),

    /// The in-memory MPT rejected an operation.
    #[error(transparent)]
    Mpt(#[from] TrieOpError),

    /// The database-backed trie rejected an operation.
    #[error("Database trie operation failed: {0}")]
    EthTrie(#[from] eth_trie::TrieError),

    /// The code has more chunks than a 2-byte key can address without
    /// colliding with the metadata keys.
    #[error("Code has {0} chunks, which collides with the metadata keys")]
    TooManyChunks(usize),
}

/// An ordered key/value commitment with a deterministic root.
pub trait CommitmentTree {
    /// Inserts or replaces the value stored under `key`.
    fn update(&mut self, key: &[u8], value: &[u8]) -> CommitmentResult<()>;

    /// Root hash over every entry inserted so far.
    fn root_hash(&mut self) -> CommitmentResult<H256>;
}

/// The commitment trie implementations shipped with this crate.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitmentBackend {
    /// [`MptCommitment`].
    #[default]
    Mpt,
    /// [`EthTrieCommitment`].
    EthTrie,
    /// [`SortedCommitment`].
    Sorted,
}

impl CommitmentBackend {
    /// All available back ends.
    pub const ALL: [CommitmentBackend; 3] = [Self::Mpt, Self::EthTrie, Self::Sorted];
}

/// Chunks `code` and commits the chunks and metadata to `tree`, returning the
/// resulting code root.
pub fn merkleize<T: CommitmentTree + ?Sized>(
    code: &[u8],
    chunk_size: usize,
    tree: &mut T,
) -> CommitmentResult<H256> {
    let chunks = chunkify(code, chunk_size)?;
    merkleize_chunks(&chunks, tree)?;

    tree.update(&VERSION_KEY, &[VERSION])?;
    tree.update(&CODE_LENGTH_KEY, &(code.len() as u32).to_be_bytes())?;
    tree.update(&CODE_HASH_KEY, hash_code(code).as_bytes())?;

    let root = tree.root_hash()?;
    debug!(
        "Merkleized {} bytes ({} chunks) into code root {:x}",
        code.len(),
        chunks.len(),
        root
    );

    Ok(root)
}

fn merkleize_chunks<T: CommitmentTree + ?Sized>(
    chunks: &[Chunk<'_>],
    tree: &mut T,
) -> CommitmentResult<()> {
    // Keys at and above `0xff00` are reserved for metadata.
    if chunks.len() > 0xff00 {
        return Err(CommitmentError::TooManyChunks(chunks.len()));
    }

    for (i, chunk) in chunks.iter().enumerate() {
        tree.update(&(i as u16).to_be_bytes(), &chunk.serialize())?;
    }

    Ok(())
}

/// Merkleizes `code` into a fresh in-memory MPT.
pub fn merkleize_in_memory(code: &[u8], chunk_size: usize) -> CommitmentResult<H256> {
    merkleize(code, chunk_size, &mut MptCommitment::default())
}

/// Merkleizes `code` into a fresh trie of the given kind.
pub fn merkleize_with(
    code: &[u8],
    chunk_size: usize,
    backend: CommitmentBackend,
) -> CommitmentResult<H256> {
    match backend {
        CommitmentBackend::Mpt => merkleize(code, chunk_size, &mut MptCommitment::default()),
        CommitmentBackend::EthTrie => {
            merkleize(code, chunk_size, &mut EthTrieCommitment::default())
        }
        CommitmentBackend::Sorted => merkleize(code, chunk_size, &mut SortedCommitment::default()),
    }
}
