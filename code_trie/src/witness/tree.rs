use ethereum_types::H256;
use hashbrown::HashMap;
use log::trace;

use super::{
    proof::{helper_indices, Multiproof},
    ChunkSize, WitnessError, WitnessHasher, WitnessResult, CHUNKS_DEPTH, CHUNK_COUNT_GINDEX,
    CHUNK_DATA_GINDEX, FIRST_CHUNK_GINDEX, MAX_CHUNKS, METADATA_GINDEX,
};
use crate::{
    chunk::{chunkify, Chunk},
    commitment::VERSION,
    hash_code,
};

/// Depth of the metadata container, which has four leaves (three fields and
/// one padding leaf).
const METADATA_DEPTH: u32 = 2;

/// The SSZ hash tree of a piece of code.
///
/// Every node covering present data is materialised. Nodes of the chunk list
/// that only cover absent elements are answered with the canonical zero hash
/// of their height.
#[derive(Clone, Debug)]
pub struct WitnessTree {
    nodes: HashMap<u64, H256>,
    hasher: WitnessHasher,
    chunk_size: ChunkSize,
    num_chunks: usize,
}

impl WitnessTree {
    /// Chunks `code` and builds its hash tree.
    pub fn build(code: &[u8], chunk_size: ChunkSize, hasher: WitnessHasher) -> WitnessResult<Self> {
        if code.len() > u16::MAX as usize {
            return Err(WitnessError::CodeTooLong(code.len()));
        }

        let chunks = chunkify(code, chunk_size.bytes())?;
        if chunks.len() > MAX_CHUNKS {
            return Err(WitnessError::TooManyChunks(chunks.len()));
        }

        let mut tree = Self {
            nodes: HashMap::new(),
            hasher,
            chunk_size,
            num_chunks: chunks.len(),
        };

        let metadata = vec![
            uint_leaf(VERSION as u64),
            hash_code(code),
            uint_leaf(code.len() as u64),
            H256::zero(),
        ];
        let metadata_root = tree.merkleize_subtree(METADATA_GINDEX, METADATA_DEPTH, metadata);

        let chunk_roots = chunks
            .iter()
            .enumerate()
            .map(|(k, chunk)| tree.merkleize_chunk(k, chunk))
            .collect();
        let data_root = tree.merkleize_subtree(CHUNK_DATA_GINDEX, CHUNKS_DEPTH, chunk_roots);

        let count = uint_leaf(chunks.len() as u64);
        tree.nodes.insert(CHUNK_COUNT_GINDEX, count);

        let list_root = tree.insert_parent(3, &data_root, &count);
        tree.insert_parent(1, &metadata_root, &list_root);

        trace!(
            "Built witness tree over {} chunks with {} stored nodes",
            tree.num_chunks,
            tree.nodes.len()
        );

        Ok(tree)
    }

    /// The hash-tree root.
    pub fn root(&self) -> H256 {
        self.nodes.get(&1).copied().unwrap_or_default()
    }

    /// The hasher combining nodes of this tree.
    pub const fn hasher(&self) -> WitnessHasher {
        self.hasher
    }

    /// The chunk size the code was split with.
    pub const fn chunk_size(&self) -> ChunkSize {
        self.chunk_size
    }

    /// Number of chunks in the list.
    pub const fn num_chunks(&self) -> usize {
        self.num_chunks
    }

    /// The value of the node at a generalized index.
    pub fn node(&self, index: u64) -> WitnessResult<H256> {
        if let Some(hash) = self.nodes.get(&index) {
            return Ok(*hash);
        }

        if index != 0 {
            let depth = index.ilog2();
            let list_depth = CHUNK_DATA_GINDEX.ilog2();
            let leaf_depth = list_depth + CHUNKS_DEPTH;

            if (list_depth..=leaf_depth).contains(&depth)
                && index >> (depth - list_depth) == CHUNK_DATA_GINDEX
            {
                return Ok(self.hasher.zero_hash((leaf_depth - depth) as usize));
            }
        }

        Err(WitnessError::InvalidIndex(index))
    }

    /// Builds a multiproof for the nodes at `indices`.
    ///
    /// The helper hashes are the siblings along every path from a requested
    /// node to the root, excluding the nodes on those paths, in descending
    /// index order.
    pub fn prove(&self, indices: &[u64]) -> WitnessResult<Multiproof> {
        let leaves = indices
            .iter()
            .map(|i| self.node(*i))
            .collect::<WitnessResult<Vec<_>>>()?;

        let hashes = helper_indices(indices)
            .into_iter()
            .map(|i| self.node(i))
            .collect::<WitnessResult<Vec<_>>>()?;

        trace!(
            "Proved {} nodes with {} helper hashes",
            indices.len(),
            hashes.len()
        );

        Ok(Multiproof {
            indices: indices.to_vec(),
            leaves,
            hashes,
        })
    }

    fn merkleize_chunk(&mut self, k: usize, chunk: &Chunk<'_>) -> H256 {
        let fio_index = (FIRST_CHUNK_GINDEX + k as u64) * 2;
        let fio = uint_leaf(chunk.fio() as u64);
        self.nodes.insert(fio_index, fio);

        let code_depth = self.chunk_size.code_depth();
        let code_leaves = packed_leaves(chunk.code(), code_depth);
        let code = self.merkleize_subtree(fio_index + 1, code_depth, code_leaves);

        self.hasher.hash_pair(&fio, &code)
    }

    /// Hashes `level` into the subtree of `depth` rooted at `root`, padding
    /// the right with zero subtrees, and stores every non-zero-padding node.
    fn merkleize_subtree(&mut self, root: u64, depth: u32, mut level: Vec<H256>) -> H256 {
        let hasher = self.hasher;
        let mut first = root << depth;

        for height in 0..depth as usize {
            self.nodes
                .extend(level.iter().enumerate().map(|(i, h)| (first + i as u64, *h)));

            level = level
                .chunks(2)
                .map(|pair| {
                    let right = pair.get(1).copied().unwrap_or_else(|| hasher.zero_hash(height));
                    hasher.hash_pair(&pair[0], &right)
                })
                .collect();
            first >>= 1;
        }

        let hash = level
            .first()
            .copied()
            .unwrap_or_else(|| hasher.zero_hash(depth as usize));
        self.nodes.insert(root, hash);

        hash
    }

    fn insert_parent(&mut self, index: u64, left: &H256, right: &H256) -> H256 {
        let hash = self.hasher.hash_pair(left, right);
        self.nodes.insert(index, hash);
        hash
    }
}

/// SSZ leaf of an unsigned integer: little endian, right-padded with zeros.
fn uint_leaf(v: u64) -> H256 {
    let mut leaf = H256::zero();
    leaf.as_bytes_mut()[..8].copy_from_slice(&v.to_le_bytes());
    leaf
}

/// Packs `bytes` into the `2^depth` right-zero-padded leaves of a byte
/// vector.
fn packed_leaves(bytes: &[u8], depth: u32) -> Vec<H256> {
    let mut leaves = vec![H256::zero(); 1 << depth];
    for (leaf, piece) in leaves.iter_mut().zip(bytes.chunks(32)) {
        leaf.as_bytes_mut()[..piece.len()].copy_from_slice(piece);
    }
    leaves
}
