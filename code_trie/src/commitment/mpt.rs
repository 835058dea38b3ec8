use ethereum_types::H256;
use mpt_trie::{
    nibbles::Nibbles,
    partial_trie::{HashedPartialTrie, Node, PartialTrie},
};

use super::{CommitmentResult, CommitmentTree};

/// Code commitment backed by an in-memory [`HashedPartialTrie`].
#[derive(Clone, Debug)]
pub struct MptCommitment {
    trie: HashedPartialTrie,
}

impl Default for MptCommitment {
    fn default() -> Self {
        Self {
            trie: HashedPartialTrie::new(Node::Empty),
        }
    }
}

impl MptCommitment {
    /// The underlying trie.
    pub const fn trie(&self) -> &HashedPartialTrie {
        &self.trie
    }
}

impl CommitmentTree for MptCommitment {
    fn update(&mut self, key: &[u8], value: &[u8]) -> CommitmentResult<()> {
        // Byte keys keep their leading zero nibbles, as Ethereum tries expect.
        let nibbles = Nibbles::from_bytes_be(key)?;
        self.trie.insert(nibbles, value.to_vec())?;
        Ok(())
    }

    fn root_hash(&mut self) -> CommitmentResult<H256> {
        Ok(self.trie.hash())
    }
}
