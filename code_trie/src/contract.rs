//! Tracking which parts of contracts were accessed, and the witness needed
//! to prove those accesses.

use std::collections::BTreeSet;

use ethereum_types::H256;
use hashbrown::{hash_map::Entry, HashMap};
use log::debug;
use thiserror::Error;

use crate::witness::{
    code_gindex, fio_gindex,
    serialize::EncodingStats,
    ChunkSize, Multiproof, ProofStats, WitnessError, WitnessHasher, WitnessTree,
    CHUNK_COUNT_GINDEX, CODE_HASH_GINDEX, CODE_LENGTH_GINDEX, VERSION_GINDEX,
};

/// Stores the result of contract operations.
pub type ContractResult<T> = Result<T, ContractError>;

/// Errors encountered while touching or proving contract code.
#[derive(Debug, Error)]
pub enum ContractError {
    /// The program counter is past the end of the code.
    #[error("PC {pc} to touch exceeds bytecode length {code_len}")]
    PcOutOfBounds {
        /// The offending program counter.
        pc: usize,
        /// Length of the code.
        code_len: usize,
    },

    /// The range is empty or reversed.
    #[error("Invalid range {from}..={to}")]
    InvalidRange {
        /// Start of the range.
        from: usize,
        /// End of the range.
        to: usize,
    },

    /// Building or encoding the witness failed.
    #[error(transparent)]
    Witness(#[from] WitnessError),
}

/// The code of one contract and the chunks of it that were accessed.
#[derive(Clone, Debug)]
pub struct Contract {
    code: Vec<u8>,
    chunk_size: ChunkSize,
    touched_chunks: BTreeSet<usize>,
}

impl Contract {
    /// A contract split into 32-byte chunks.
    pub fn new(code: Vec<u8>) -> Self {
        Self::with_chunk_size(code, ChunkSize::default())
    }

    /// A contract split into chunks of the given size.
    pub fn with_chunk_size(code: Vec<u8>, chunk_size: ChunkSize) -> Self {
        Self {
            code,
            chunk_size,
            touched_chunks: BTreeSet::new(),
        }
    }

    /// Marks the chunk holding `pc` as accessed.
    pub fn touch_pc(&mut self, pc: usize) -> ContractResult<()> {
        self.check_pc(pc)?;
        self.touched_chunks.insert(pc / self.chunk_size.bytes());
        Ok(())
    }

    /// Marks every chunk overlapping `from..=to` as accessed.
    pub fn touch_range(&mut self, from: usize, to: usize) -> ContractResult<()> {
        if from >= to {
            return Err(ContractError::InvalidRange { from, to });
        }
        self.check_pc(to)?;

        let size = self.chunk_size.bytes();
        self.touched_chunks.extend(from / size..=to / size);
        Ok(())
    }

    fn check_pc(&self, pc: usize) -> ContractResult<()> {
        match pc < self.code.len() {
            true => Ok(()),
            false => Err(ContractError::PcOutOfBounds {
                pc,
                code_len: self.code.len(),
            }),
        }
    }

    /// The contract code.
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    /// Length of the contract code.
    pub fn code_size(&self) -> usize {
        self.code.len()
    }

    /// The chunk size the code is split with.
    pub const fn chunk_size(&self) -> ChunkSize {
        self.chunk_size
    }

    /// Indices of the accessed chunks, in ascending order.
    pub const fn touched_chunks(&self) -> &BTreeSet<usize> {
        &self.touched_chunks
    }

    /// Builds the SHA-256 witness tree of the code.
    pub fn tree(&self) -> ContractResult<WitnessTree> {
        Ok(WitnessTree::build(
            &self.code,
            self.chunk_size,
            WitnessHasher::Sha256,
        )?)
    }

    /// Proves the chunk count, the metadata fields and both fields of every
    /// touched chunk.
    pub fn prove(&self) -> ContractResult<Multiproof> {
        let mut indices = vec![
            CHUNK_COUNT_GINDEX,
            VERSION_GINDEX,
            CODE_HASH_GINDEX,
            CODE_LENGTH_GINDEX,
        ];
        for &k in &self.touched_chunks {
            indices.push(fio_gindex(k));
            indices.push(code_gindex(k));
        }

        Ok(self.tree()?.prove(&indices)?)
    }
}

/// Witness statistics over every contract in a [`ContractBag`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CodeMerkleStats {
    /// Number of distinct contracts.
    pub num_contracts: usize,
    /// Total code size in bytes.
    pub code_size: usize,
    /// Total compressed proof size in bytes.
    pub proof_size: usize,
    /// Breakdown of `proof_size`.
    pub proof_stats: ProofStats,
    /// Sizes of the encoded proofs.
    pub encoding_stats: EncodingStats,
}

/// Contracts keyed by code hash.
#[derive(Clone, Debug, Default)]
pub struct ContractBag {
    contracts: HashMap<H256, Contract>,
}

impl ContractBag {
    /// Creates an empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// The contract with `code_hash`, created from `code` on first access.
    ///
    /// Accesses accumulate across every call with the same hash; `code` is
    /// ignored once the hash is known.
    pub fn get(&mut self, code_hash: H256, code: &[u8]) -> &mut Contract {
        match self.contracts.entry(code_hash) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => e.insert(Contract::new(code.to_vec())),
        }
    }

    /// Number of distinct contracts.
    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    /// Whether no contract was accessed.
    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }

    /// Proves every contract and sums up the proof sizes.
    ///
    /// Fails as a whole if any contract cannot be proven.
    pub fn stats(&self) -> ContractResult<CodeMerkleStats> {
        let mut stats = CodeMerkleStats {
            num_contracts: self.contracts.len(),
            ..Default::default()
        };

        for contract in self.contracts.values() {
            stats.code_size += contract.code_size();

            let proof = contract.prove()?;
            let compressed = proof.compress(WitnessHasher::Sha256);

            stats.proof_stats.add(&ProofStats::new(&compressed));
            stats
                .encoding_stats
                .add(&EncodingStats::new(&proof, &compressed)?);
        }
        stats.proof_size = stats.proof_stats.sum();

        debug!(
            "Proof size over {} contracts ({} bytes of code): {} bytes",
            stats.num_contracts, stats.code_size, stats.proof_size
        );

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        hash_code,
        testing_utils::{common_setup, generate_random_code},
    };

    #[test]
    fn touch_pc_marks_the_containing_chunk() -> ContractResult<()> {
        let mut contract = Contract::new(vec![0x5b; 100]);
        contract.touch_pc(0)?;
        contract.touch_pc(31)?;
        contract.touch_pc(64)?;
        contract.touch_pc(99)?;

        assert_eq!(
            contract.touched_chunks().iter().copied().collect::<Vec<_>>(),
            vec![0, 2, 3]
        );
        assert!(matches!(
            contract.touch_pc(100),
            Err(ContractError::PcOutOfBounds {
                pc: 100,
                code_len: 100
            })
        ));

        Ok(())
    }

    #[test]
    fn touch_range_is_inclusive() -> ContractResult<()> {
        let mut contract = Contract::with_chunk_size(vec![0x5b; 200], ChunkSize::Bytes24);
        contract.touch_range(20, 48)?;

        assert_eq!(
            contract.touched_chunks().iter().copied().collect::<Vec<_>>(),
            vec![0, 1, 2]
        );

        assert!(matches!(
            contract.touch_range(10, 10),
            Err(ContractError::InvalidRange { from: 10, to: 10 })
        ));
        assert!(matches!(
            contract.touch_range(10, 200),
            Err(ContractError::PcOutOfBounds { pc: 200, .. })
        ));

        Ok(())
    }

    #[test]
    fn proofs_cover_metadata_and_touched_chunks() -> ContractResult<()> {
        common_setup();

        let mut contract = Contract::new(generate_random_code(4, 300));
        contract.touch_pc(200)?;
        contract.touch_pc(10)?;

        let proof = contract.prove()?;
        assert_eq!(
            proof.indices,
            vec![7, 8, 9, 10, 12288, 12289, 12300, 12301]
        );
        assert!(proof.verify(&contract.tree()?.root(), WitnessHasher::Sha256)?);

        Ok(())
    }

    #[test]
    fn bag_deduplicates_by_code_hash() -> ContractResult<()> {
        common_setup();

        let code = vec![0x60, 0x00, 0x60, 0x00];
        let same_code = code.clone();
        let mut bag = ContractBag::new();

        bag.get(hash_code(&code), &code).touch_pc(0)?;
        bag.get(hash_code(&same_code), &same_code).touch_pc(3)?;

        assert_eq!(bag.len(), 1);
        assert_eq!(
            bag.get(hash_code(&code), &[]).touched_chunks().len(),
            1
        );

        let stats = bag.stats()?;
        assert_eq!(stats.num_contracts, 1);
        assert_eq!(stats.code_size, 4);

        Ok(())
    }

    #[test]
    fn bag_stats_sum_over_contracts() -> ContractResult<()> {
        common_setup();

        let mut bag = ContractBag::new();
        bag.get(hash_code(&[0x60, 0x00]), &[0x60, 0x00]).touch_pc(0)?;

        let single = bag.stats()?;
        assert_eq!(single.proof_stats.indices, 12);
        assert_eq!(single.proof_stats.zero_levels, 11);
        assert_eq!(single.proof_stats.hashes, 0);
        assert_eq!(single.proof_stats.leaves, 161);
        assert_eq!(single.proof_size, 184);
        assert!(single.encoding_stats.rlp_size > 0);

        let other = generate_random_code(8, 1000);
        bag.get(hash_code(&other), &other).touch_range(100, 900)?;

        let both = bag.stats()?;
        assert_eq!(both.num_contracts, 2);
        assert_eq!(both.code_size, 2 + other.len());
        assert!(both.proof_size > single.proof_size);
        assert_eq!(both.proof_size, both.proof_stats.sum());

        Ok(())
    }

    #[test]
    fn stats_fail_if_any_contract_fails() {
        let mut bag = ContractBag::new();
        bag.get(hash_code(&[0x00]), &[0x00]);

        let huge = vec![0x5b; 1025 * 32];
        bag.get(hash_code(&huge), &huge);

        assert!(matches!(
            bag.stats(),
            Err(ContractError::Witness(WitnessError::TooManyChunks(1025)))
        ));
    }
}
