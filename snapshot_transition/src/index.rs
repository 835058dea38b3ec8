//! A concurrent map from code hash to code root.

use std::sync::Arc;

use ethereum_types::H256;
use hashbrown::HashMap;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;

/// Number of shards used by [`CodeRootIndex::default`].
pub const DEFAULT_NUM_SHARDS: usize = 64;

type Shard = Mutex<HashMap<H256, Arc<OnceCell<H256>>>>;

/// Code roots keyed by code hash, shared between workers.
///
/// Entries are split over independently locked shards. A shard lock is only
/// held to find or create an entry; the root itself is computed outside the
/// lock, in a cell that is initialised once. Workers racing on the same code
/// hash wait for the first one instead of merkleizing the code again.
#[derive(Debug)]
pub struct CodeRootIndex {
    shards: Vec<Shard>,
}

impl Default for CodeRootIndex {
    fn default() -> Self {
        Self::with_shards(DEFAULT_NUM_SHARDS)
    }
}

impl CodeRootIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty index with `num_shards` shards (at least one).
    pub fn with_shards(num_shards: usize) -> Self {
        Self {
            shards: (0..num_shards.max(1)).map(|_| Shard::default()).collect(),
        }
    }

    fn shard(&self, code_hash: &H256) -> &Shard {
        // Code hashes are uniformly distributed already.
        &self.shards[code_hash.to_low_u64_be() as usize % self.shards.len()]
    }

    /// The root of `code_hash`, computing it with `compute` if no root is
    /// known yet.
    ///
    /// Returns the root and whether it was computed by this call. If
    /// `compute` fails, the entry stays empty and the error is returned.
    pub fn get_or_compute<E, F>(&self, code_hash: H256, compute: F) -> Result<(H256, bool), E>
    where
        F: FnOnce() -> Result<H256, E>,
    {
        let cell = self.shard(&code_hash).lock().entry(code_hash).or_default().clone();

        let mut computed_here = false;
        let root = cell.get_or_try_init(|| {
            computed_here = true;
            compute()
        })?;

        Ok((*root, computed_here))
    }

    /// The root of `code_hash`, if it has been computed.
    pub fn get(&self, code_hash: &H256) -> Option<H256> {
        self.shard(code_hash)
            .lock()
            .get(code_hash)
            .and_then(|cell| cell.get().copied())
    }

    /// Number of computed roots.
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.lock().values().filter(|c| c.get().is_some()).count())
            .sum()
    }

    /// Whether no root has been computed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every computed `(code_hash, root)` pair, in no particular order.
    pub fn roots(&self) -> Vec<(H256, H256)> {
        self.shards
            .iter()
            .flat_map(|s| {
                s.lock()
                    .iter()
                    .filter_map(|(h, c)| c.get().map(|root| (*h, *root)))
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}
