//! Where accounts and code come from.

use anyhow::anyhow;
use code_trie::hash_code;
use ethereum_types::H256;
use hashbrown::HashMap;

/// Resolves code hashes to code.
pub trait CodeSource: Send + Sync {
    /// The code hashing to `code_hash`. A missing code body is an error.
    fn code(&self, code_hash: &H256) -> anyhow::Result<Vec<u8>>;
}

/// A cursor over the account records of a snapshot.
pub trait AccountIterator: Send {
    /// Advances to the next account, returning `false` once exhausted.
    fn next(&mut self) -> bool;

    /// The slim RLP record of the current account.
    fn account_record(&self) -> &[u8];
}

/// A [`CodeSource`] holding every code body in memory.
#[derive(Clone, Debug, Default)]
pub struct InMemoryCodeSource {
    codes: HashMap<H256, Vec<u8>>,
}

impl InMemoryCodeSource {
    /// Creates an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `code`, returning its hash.
    pub fn insert(&mut self, code: Vec<u8>) -> H256 {
        let code_hash = hash_code(&code);
        self.codes.insert(code_hash, code);
        code_hash
    }

    /// Number of code bodies held.
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// Whether no code is held.
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

impl CodeSource for InMemoryCodeSource {
    fn code(&self, code_hash: &H256) -> anyhow::Result<Vec<u8>> {
        self.codes
            .get(code_hash)
            .cloned()
            .ok_or_else(|| anyhow!("code {code_hash:x} not found"))
    }
}

/// An [`AccountIterator`] over records held in memory.
#[derive(Clone, Debug, Default)]
pub struct VecAccountIterator {
    records: Vec<Vec<u8>>,
    /// Index of the current record plus one; zero before the first call to
    /// `next`.
    position: usize,
}

impl VecAccountIterator {
    /// Iterates over `records` in order.
    pub fn new(records: Vec<Vec<u8>>) -> Self {
        Self {
            records,
            position: 0,
        }
    }
}

impl AccountIterator for VecAccountIterator {
    fn next(&mut self) -> bool {
        match self.position < self.records.len() {
            true => {
                self.position += 1;
                true
            }
            false => false,
        }
    }

    fn account_record(&self) -> &[u8] {
        self.position
            .checked_sub(1)
            .and_then(|i| self.records.get(i))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}
