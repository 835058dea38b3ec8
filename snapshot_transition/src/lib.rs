//! Converts the code referenced by an account snapshot into chunked code
//! roots.
//!
//! Accounts are read from an [`AccountIterator`](source::AccountIterator),
//! their code fetched from a [`CodeSource`](source::CodeSource) and
//! committed with [`code_trie::commitment`]. Each distinct code body is
//! merkleized once; the resulting roots are kept in a
//! [`CodeRootIndex`](index::CodeRootIndex) keyed by code hash.
//!
//! [`transition`] walks the snapshot on the calling thread, while
//! [`transition_concurrent`] fans the work out over a bounded pool of
//! blocking workers.

pub mod account;
pub mod config;
pub mod env;
pub mod error;
pub mod index;
pub mod source;
pub mod tracing;
mod transition;

pub use transition::{
    bench_merkleization_overhead, transition, transition_concurrent, MerkleizationTiming,
    TransitionStats,
};
