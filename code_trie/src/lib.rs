//! Chunked commitments and access witnesses for contract bytecode.
//!
//! Contract code is split into fixed-size chunks, each annotated with the
//! offset of its first real instruction (so that a verifier holding a single
//! chunk knows which bytes are PUSH operands carried over from the previous
//! chunk). Chunks can then be:
//! - committed to an ordered key/value trie ([`commitment`]), giving a single
//!   code root per contract;
//! - laid out in a fixed-shape binary hash tree ([`witness`]) from which
//!   multiproofs over an arbitrary subset of chunks can be extracted,
//!   compressed and serialized.
//!
//! [`contract::ContractBag`] ties these together: it records which parts of
//! each contract were accessed and measures the witness required to prove
//! those accesses.

#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_debug_implementations)]
#![deny(missing_docs)]

pub mod chunk;
pub mod commitment;
pub mod contract;
pub mod opcode;
pub mod witness;

#[cfg(test)]
pub(crate) mod testing_utils;

use ethereum_types::H256;
use keccak_hash::keccak;

/// The hash value of an account with empty EVM code.
/// 0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470
pub const EMPTY_CODE_HASH: H256 = H256([
    197, 210, 70, 1, 134, 247, 35, 60, 146, 126, 125, 178, 220, 199, 3, 192, 229, 0, 182, 83, 202,
    130, 39, 59, 123, 250, 216, 4, 93, 133, 164, 112,
]);

/// Chunk width used when none is specified.
pub const DEFAULT_CHUNK_SIZE: usize = 32;

/// Hashes contract bytecode the way accounts refer to it.
pub fn hash_code(code: &[u8]) -> H256 {
    keccak(code)
}

#[test]
fn test_empty_code_hash() {
    assert_eq!(EMPTY_CODE_HASH, hash_code(&[]));
}
