use std::collections::{BTreeSet, BinaryHeap};

use ethereum_types::H256;
use hashbrown::{HashMap, HashSet};
use log::debug;

use super::{is_fio_index, WitnessError, WitnessHasher, WitnessResult};

/// A proof for several nodes of the same witness tree.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Multiproof {
    /// Generalized indices of the proven nodes.
    pub indices: Vec<u64>,
    /// Values of the proven nodes, in the order of `indices`.
    pub leaves: Vec<H256>,
    /// Helper hashes, ordered by descending generalized index.
    pub hashes: Vec<H256>,
}

/// A [`Multiproof`] whose zero-subtree helper hashes have been replaced by
/// their height.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CompressedMultiproof {
    /// Generalized indices of the proven nodes.
    pub indices: Vec<u64>,
    /// Values of the proven nodes, in the order of `indices`.
    pub leaves: Vec<H256>,
    /// Helper hashes; `None` marks a zero-subtree hash.
    pub hashes: Vec<Option<H256>>,
    /// Height of each zero-subtree hash, in the order of the `None`s in
    /// `hashes`.
    pub zero_levels: Vec<u8>,
}

/// Byte sizes of the parts of a compressed proof.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ProofStats {
    /// Two bytes per index.
    pub indices: usize,
    /// One byte per zero level.
    pub zero_levels: usize,
    /// 32 bytes per helper hash that was not compressed away.
    pub hashes: usize,
    /// One byte per FIO leaf, 32 per any other leaf.
    pub leaves: usize,
}

impl Multiproof {
    /// Replaces every helper hash that is the root of an all-zero subtree by
    /// a placeholder and records the subtree's height.
    pub fn compress(&self, hasher: WitnessHasher) -> CompressedMultiproof {
        let mut zero_levels = Vec::new();
        let hashes = self
            .hashes
            .iter()
            .map(|h| match hasher.zero_level(h) {
                Some(level) => {
                    zero_levels.push(level);
                    None
                }
                None => Some(*h),
            })
            .collect();

        debug!(
            "Compressed {} of {} helper hashes",
            zero_levels.len(),
            self.hashes.len()
        );

        CompressedMultiproof {
            indices: self.indices.clone(),
            leaves: self.leaves.clone(),
            hashes,
            zero_levels,
        }
    }

    /// Recomputes the root from the proven nodes and helper hashes and
    /// compares it against `root`.
    ///
    /// A proof with the wrong number of leaves or helper hashes is an error;
    /// a well-formed proof for a different root returns `false`.
    pub fn verify(&self, root: &H256, hasher: WitnessHasher) -> WitnessResult<bool> {
        if self.indices.len() != self.leaves.len() {
            return Err(WitnessError::LeafCountMismatch {
                indices: self.indices.len(),
                leaves: self.leaves.len(),
            });
        }

        let helpers = helper_indices(&self.indices);
        if helpers.len() != self.hashes.len() {
            return Err(WitnessError::HashCountMismatch {
                expected: helpers.len(),
                actual: self.hashes.len(),
            });
        }

        let mut nodes: HashMap<u64, H256> = self
            .indices
            .iter()
            .copied()
            .zip(self.leaves.iter().copied())
            .chain(helpers.into_iter().zip(self.hashes.iter().copied()))
            .collect();

        // Deepest nodes first, so both children of a parent are known before
        // it is computed.
        let mut pending: BinaryHeap<u64> = nodes.keys().copied().collect();
        while let Some(index) = pending.pop() {
            let parent = index / 2;
            if index <= 1 || nodes.contains_key(&parent) {
                continue;
            }

            let (left, right) = match (nodes.get(&(index & !1)), nodes.get(&(index | 1))) {
                (Some(left), Some(right)) => (*left, *right),
                _ => continue,
            };

            nodes.insert(parent, hasher.hash_pair(&left, &right));
            pending.push(parent);
        }

        Ok(nodes.get(&1) == Some(root))
    }
}

impl CompressedMultiproof {
    /// Restores the helper hashes replaced by [`Multiproof::compress`].
    pub fn decompress(&self, hasher: WitnessHasher) -> WitnessResult<Multiproof> {
        let placeholders = self.hashes.iter().filter(|h| h.is_none()).count();
        if placeholders != self.zero_levels.len() {
            return Err(WitnessError::ZeroLevelMismatch {
                placeholders,
                levels: self.zero_levels.len(),
            });
        }

        let zero_hashes = hasher.zero_hashes();
        let mut levels = self.zero_levels.iter();
        let hashes = self
            .hashes
            .iter()
            .map(|h| match h {
                Some(h) => Ok(*h),
                None => {
                    // Counts were checked above.
                    let level = levels.next().copied().unwrap_or_default();
                    zero_hashes
                        .get(level as usize)
                        .copied()
                        .ok_or(WitnessError::UnknownZeroLevel(level))
                }
            })
            .collect::<WitnessResult<_>>()?;

        Ok(Multiproof {
            indices: self.indices.clone(),
            leaves: self.leaves.clone(),
            hashes,
        })
    }
}

impl ProofStats {
    /// Sizes of the parts of `proof` when FIO leaves are sent as one byte.
    pub fn new(proof: &CompressedMultiproof) -> Self {
        Self {
            indices: proof.indices.len() * 2,
            zero_levels: proof.zero_levels.len(),
            hashes: proof.hashes.iter().flatten().count() * 32,
            leaves: proof
                .indices
                .iter()
                .map(|i| match is_fio_index(*i) {
                    true => 1,
                    false => 32,
                })
                .sum(),
        }
    }

    /// Accumulates `other` into `self`.
    pub fn add(&mut self, other: &ProofStats) {
        self.indices += other.indices;
        self.zero_levels += other.zero_levels;
        self.hashes += other.hashes;
        self.leaves += other.leaves;
    }

    /// Total size in bytes.
    pub const fn sum(&self) -> usize {
        self.indices + self.zero_levels + self.hashes + self.leaves
    }
}

/// Indices of the helper hashes needed to prove `indices`: the siblings
/// along every path to the root that are not themselves on a path, in
/// descending order.
pub(crate) fn helper_indices(indices: &[u64]) -> Vec<u64> {
    let mut siblings = BTreeSet::new();
    let mut path = HashSet::new();

    for &index in indices {
        let mut i = index;
        while i > 1 && path.insert(i) {
            siblings.insert(i ^ 1);
            i /= 2;
        }
    }

    siblings
        .into_iter()
        .rev()
        .filter(|i| !path.contains(i))
        .collect()
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

    use super::*;
    use crate::{
        testing_utils::{common_setup, generate_random_code},
        witness::{
            code_gindex, fio_gindex, ChunkSize, WitnessTree, CHUNK_COUNT_GINDEX,
            CODE_HASH_GINDEX, CODE_LENGTH_GINDEX, VERSION_GINDEX,
        },
    };

    const NUM_RANDOM_SUBSETS: u64 = 20;

    fn metadata_and_chunks(chunks: &[usize]) -> Vec<u64> {
        let mut indices = vec![
            CHUNK_COUNT_GINDEX,
            VERSION_GINDEX,
            CODE_HASH_GINDEX,
            CODE_LENGTH_GINDEX,
        ];
        for &k in chunks {
            indices.push(fio_gindex(k));
            indices.push(code_gindex(k));
        }
        indices
    }

    #[test]
    fn helper_indices_exclude_path_nodes() {
        assert_eq!(helper_indices(&[8]), vec![9, 5, 3]);
        assert_eq!(helper_indices(&[8, 9]), vec![5, 3]);
        assert_eq!(helper_indices(&[7, 8, 9, 10]), vec![11, 6]);
        assert_eq!(helper_indices(&[1]), Vec::<u64>::new());
    }

    #[test]
    fn proofs_verify_against_the_root() -> WitnessResult<()> {
        common_setup();

        let code = generate_random_code(5, 2000);
        for hasher in [WitnessHasher::Sha256, WitnessHasher::Keccak256] {
            let tree = WitnessTree::build(&code, ChunkSize::Bytes32, hasher)?;
            let proof = tree.prove(&metadata_and_chunks(&[0, 3, 4, 40]))?;

            assert!(proof.verify(&tree.root(), hasher)?);
            assert!(!proof.verify(&H256::repeat_byte(1), hasher)?);
        }

        Ok(())
    }

    #[test]
    fn tampered_proofs_fail() -> WitnessResult<()> {
        let code = generate_random_code(6, 500);
        let tree = WitnessTree::build(&code, ChunkSize::Bytes32, WitnessHasher::Sha256)?;
        let proof = tree.prove(&metadata_and_chunks(&[2, 7]))?;

        let mut bad_leaf = proof.clone();
        bad_leaf.leaves[5] = H256::repeat_byte(0xaa);
        assert!(!bad_leaf.verify(&tree.root(), WitnessHasher::Sha256)?);

        let mut bad_hash = proof.clone();
        bad_hash.hashes[0] = H256::repeat_byte(0xaa);
        assert!(!bad_hash.verify(&tree.root(), WitnessHasher::Sha256)?);

        let mut missing = proof;
        missing.hashes.pop();
        assert!(matches!(
            missing.verify(&tree.root(), WitnessHasher::Sha256),
            Err(WitnessError::HashCountMismatch { .. })
        ));

        Ok(())
    }

    #[test]
    fn random_subsets_survive_compression() -> WitnessResult<()> {
        common_setup();

        let mut rng = StdRng::seed_from_u64(0);
        let code = generate_random_code(9, 6000);

        for chunk_size in [ChunkSize::Bytes24, ChunkSize::Bytes32, ChunkSize::Bytes40] {
            let tree = WitnessTree::build(&code, chunk_size, WitnessHasher::Sha256)?;
            let mut chunks: Vec<usize> = (0..tree.num_chunks()).collect();

            for n in 1..=NUM_RANDOM_SUBSETS as usize {
                chunks.shuffle(&mut rng);
                let mut subset = chunks[..n].to_vec();
                subset.sort_unstable();

                let proof = tree.prove(&metadata_and_chunks(&subset))?;
                let compressed = proof.compress(WitnessHasher::Sha256);

                assert_eq!(compressed.decompress(WitnessHasher::Sha256)?, proof);
                assert!(proof.verify(&tree.root(), WitnessHasher::Sha256)?);
            }
        }

        Ok(())
    }

    #[test]
    fn small_code_compresses_the_empty_list_tail() -> WitnessResult<()> {
        let tree = WitnessTree::build(&[0x60, 0x00], ChunkSize::Bytes32, WitnessHasher::Sha256)?;
        let proof = tree.prove(&metadata_and_chunks(&[0]))?;
        let compressed = proof.compress(WitnessHasher::Sha256);

        // Siblings of chunk 0 on its way up the data subtree are all empty,
        // as is the padding leaf of the metadata.
        let zero_levels: Vec<u8> = (0..10).chain([0]).collect();
        assert_eq!(compressed.zero_levels, zero_levels);
        assert!(compressed.hashes.iter().all(Option::is_none));

        Ok(())
    }

    #[test]
    fn decompression_rejects_inconsistent_levels() {
        let proof = CompressedMultiproof {
            indices: vec![8],
            leaves: vec![H256::zero()],
            hashes: vec![None, Some(H256::repeat_byte(1)), None],
            zero_levels: vec![0],
        };
        assert!(matches!(
            proof.decompress(WitnessHasher::Sha256),
            Err(WitnessError::ZeroLevelMismatch {
                placeholders: 2,
                levels: 1
            })
        ));

        let proof = CompressedMultiproof {
            hashes: vec![None],
            zero_levels: vec![200],
            ..Default::default()
        };
        assert!(matches!(
            proof.decompress(WitnessHasher::Sha256),
            Err(WitnessError::UnknownZeroLevel(200))
        ));
    }

    #[test]
    fn proof_stats_count_fio_leaves_as_one_byte() -> WitnessResult<()> {
        let tree = WitnessTree::build(&[0x60, 0x00], ChunkSize::Bytes32, WitnessHasher::Sha256)?;
        let compressed = tree
            .prove(&metadata_and_chunks(&[0]))?
            .compress(WitnessHasher::Sha256);

        let stats = ProofStats::new(&compressed);
        assert_eq!(stats.indices, 12);
        assert_eq!(stats.zero_levels, 11);
        assert_eq!(stats.hashes, 0);
        assert_eq!(stats.leaves, 5 * 32 + 1);

        let mut total = ProofStats::default();
        total.add(&stats);
        total.add(&stats);
        assert_eq!(total.sum(), 2 * stats.sum());

        Ok(())
    }
}
