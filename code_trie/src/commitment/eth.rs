use std::{fmt, sync::Arc};

use eth_trie::{EthTrie, MemoryDB, Trie};
use ethereum_types::H256;

use super::{CommitmentResult, CommitmentTree};

/// Code commitment backed by an [`EthTrie`] over an in-memory database.
///
/// Nodes are written to the database as the trie is hashed, so this is the
/// variant to use when the code trie nodes need to be kept around.
pub struct EthTrieCommitment {
    db: Arc<MemoryDB>,
    trie: EthTrie<MemoryDB>,
}

impl fmt::Debug for EthTrieCommitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EthTrieCommitment").finish_non_exhaustive()
    }
}

impl Default for EthTrieCommitment {
    fn default() -> Self {
        Self::new(Arc::new(MemoryDB::new(true)))
    }
}

impl EthTrieCommitment {
    /// Creates an empty trie writing its nodes to `db`.
    pub fn new(db: Arc<MemoryDB>) -> Self {
        Self {
            trie: EthTrie::new(db.clone()),
            db,
        }
    }

    /// The database the trie nodes are written to.
    pub fn db(&self) -> &Arc<MemoryDB> {
        &self.db
    }
}

impl CommitmentTree for EthTrieCommitment {
    fn update(&mut self, key: &[u8], value: &[u8]) -> CommitmentResult<()> {
        self.trie.insert(key, value)?;
        Ok(())
    }

    fn root_hash(&mut self) -> CommitmentResult<H256> {
        let root = self.trie.root_hash()?;

        // `eth_trie` may pull in a different `ethereum-types` release.
        Ok(H256(root.0))
    }
}
