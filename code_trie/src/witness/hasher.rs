use ethereum_types::H256;
use hashbrown::HashMap;
use keccak_hash::keccak;
use once_cell::sync::Lazy;
use sha2::{Digest, Sha256};

/// Number of precomputed zero-subtree hashes per hasher.
const NUM_ZERO_HASHES: usize = 64;

static SHA256_ZERO_HASHES: Lazy<Vec<H256>> =
    Lazy::new(|| compute_zero_hashes(WitnessHasher::Sha256));
static KECCAK256_ZERO_HASHES: Lazy<Vec<H256>> =
    Lazy::new(|| compute_zero_hashes(WitnessHasher::Keccak256));

static SHA256_ZERO_LEVELS: Lazy<HashMap<H256, u8>> = Lazy::new(|| zero_levels(&SHA256_ZERO_HASHES));
static KECCAK256_ZERO_LEVELS: Lazy<HashMap<H256, u8>> =
    Lazy::new(|| zero_levels(&KECCAK256_ZERO_HASHES));

/// Hash function combining two child nodes of the witness tree.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum WitnessHasher {
    /// SHA-256, as used by SSZ hash-tree roots.
    #[default]
    Sha256,
    /// Keccak-256.
    Keccak256,
}

impl WitnessHasher {
    /// Hashes the concatenation of two nodes.
    pub fn hash_pair(self, left: &H256, right: &H256) -> H256 {
        let mut buf = [0u8; 64];
        buf[..32].copy_from_slice(left.as_bytes());
        buf[32..].copy_from_slice(right.as_bytes());

        match self {
            WitnessHasher::Sha256 => H256::from_slice(&Sha256::digest(buf)),
            WitnessHasher::Keccak256 => keccak(buf),
        }
    }

    /// Root hashes of all-zero subtrees, indexed by height.
    pub fn zero_hashes(self) -> &'static [H256] {
        match self {
            WitnessHasher::Sha256 => &SHA256_ZERO_HASHES,
            WitnessHasher::Keccak256 => &KECCAK256_ZERO_HASHES,
        }
    }

    /// Root hash of an all-zero subtree of the given height.
    pub(crate) fn zero_hash(self, height: usize) -> H256 {
        self.zero_hashes()[height]
    }

    /// The height of the all-zero subtree hashing to `hash`, if any.
    pub fn zero_level(self, hash: &H256) -> Option<u8> {
        let levels = match self {
            WitnessHasher::Sha256 => &SHA256_ZERO_LEVELS,
            WitnessHasher::Keccak256 => &KECCAK256_ZERO_LEVELS,
        };

        levels.get(hash).copied()
    }
}

fn compute_zero_hashes(hasher: WitnessHasher) -> Vec<H256> {
    let mut hashes = Vec::with_capacity(NUM_ZERO_HASHES);
    hashes.push(H256::zero());

    for height in 1..NUM_ZERO_HASHES {
        let below = hashes[height - 1];
        hashes.push(hasher.hash_pair(&below, &below));
    }

    hashes
}

fn zero_levels(hashes: &[H256]) -> HashMap<H256, u8> {
    hashes
        .iter()
        .enumerate()
        .map(|(height, hash)| (*hash, height as u8))
        .collect()
}
