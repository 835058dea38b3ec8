//! A Merkle Patricia trie hasher that never materialises the trie.
//!
//! Entries are kept sorted by key. When the root is requested the trie is
//! hashed in one sweep over the sorted entries: every subtrie corresponds to
//! a contiguous run of keys sharing a prefix, so its node can be encoded as
//! soon as that run has been split on its next nibble.

use std::collections::BTreeMap;

use bytes::{Bytes, BytesMut};
use ethereum_types::H256;
use keccak_hash::keccak;
use rlp::RlpStream;

use super::{CommitmentResult, CommitmentTree};

/// The node type used for calculating the hash of a trie.
#[derive(Clone, Debug)]
enum EncodedNode {
    /// Node that is RLPed but not hashed.
    Raw(Bytes),
    /// Node that is hashed.
    Hashed([u8; 32]),
}

impl From<&EncodedNode> for H256 {
    fn from(v: &EncodedNode) -> Self {
        match v {
            EncodedNode::Raw(b) => keccak(b),
            EncodedNode::Hashed(h) => H256(*h),
        }
    }
}

/// Code commitment that buffers entries in key order and hashes them in a
/// single pass.
#[derive(Clone, Debug, Default)]
pub struct SortedCommitment {
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl CommitmentTree for SortedCommitment {
    fn update(&mut self, key: &[u8], value: &[u8]) -> CommitmentResult<()> {
        self.entries.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn root_hash(&mut self) -> CommitmentResult<H256> {
        let leaves: Vec<_> = self
            .entries
            .iter()
            .map(|(k, v)| (to_nibbles(k), v.as_slice()))
            .collect();

        Ok((&encode_subtrie(&leaves, 0)).into())
    }
}

type Leaf<'a> = (Vec<u8>, &'a [u8]);

fn to_nibbles(key: &[u8]) -> Vec<u8> {
    key.iter().flat_map(|b| [b >> 4, b & 0x0f]).collect()
}

/// Encodes the subtrie holding `leaves`, all of which share their first
/// `depth` nibbles. `leaves` must be sorted by key.
fn encode_subtrie(leaves: &[Leaf<'_>], depth: usize) -> EncodedNode {
    match leaves {
        [] => EncodedNode::Raw(Bytes::from_static(&rlp::NULL_RLP)),
        [(key, value)] => encode_leaf(&key[depth..], value),
        [(first, _), .., (last, _)] => {
            // Sorted keys: the prefix shared by the first and last key is
            // shared by every key in between.
            let shared = first[depth..]
                .iter()
                .zip(&last[depth..])
                .take_while(|(a, b)| a == b)
                .count();

            match shared {
                0 => encode_branch(leaves, depth),
                _ => {
                    let child = encode_branch(leaves, depth + shared);
                    let mut stream = RlpStream::new_list(2);

                    stream.append(&hex_prefix_encoding(&first[depth..depth + shared], false));
                    append_to_stream(&mut stream, child);

                    hash_bytes_if_large_enough(stream.out().freeze())
                }
            }
        }
    }
}

fn encode_leaf(path: &[u8], value: &[u8]) -> EncodedNode {
    let mut stream = RlpStream::new_list(2);

    stream.append(&hex_prefix_encoding(path, true));
    stream.append(&value);

    hash_bytes_if_large_enough(stream.out().freeze())
}

/// Encodes a branch at `depth`. A key ending exactly at `depth` becomes the
/// branch value; since it is a prefix of the others it sorts first.
fn encode_branch(leaves: &[Leaf<'_>], depth: usize) -> EncodedNode {
    let (value, mut rest) = match leaves.first() {
        Some((key, value)) if key.len() == depth => (Some(*value), &leaves[1..]),
        _ => (None, leaves),
    };

    let mut stream = RlpStream::new_list(17);
    for nibble in 0..16u8 {
        let run = rest.iter().take_while(|(k, _)| k[depth] == nibble).count();
        let (children, remaining) = rest.split_at(run);
        rest = remaining;

        match children.is_empty() {
            false => append_to_stream(&mut stream, encode_subtrie(children, depth + 1)),
            true => {
                stream.append_empty_data();
            }
        }
    }

    match value {
        Some(v) if !v.is_empty() => stream.append(&v),
        _ => stream.append_empty_data(),
    };

    hash_bytes_if_large_enough(stream.out().freeze())
}

/// Hex-prefix ("compact") encoding of a nibble path.
fn hex_prefix_encoding(nibbles: &[u8], is_leaf: bool) -> Bytes {
    let odd = nibbles.len() % 2 == 1;
    let flags = ((is_leaf as u8) << 1 | odd as u8) << 4;

    let mut out = BytesMut::with_capacity(nibbles.len() / 2 + 1);
    let pairs = match odd {
        true => {
            out.extend_from_slice(&[flags | nibbles[0]]);
            &nibbles[1..]
        }
        false => {
            out.extend_from_slice(&[flags]);
            nibbles
        }
    };
    for pair in pairs.chunks_exact(2) {
        out.extend_from_slice(&[pair[0] << 4 | pair[1]]);
    }

    out.freeze()
}

fn hash_bytes_if_large_enough(bytes: Bytes) -> EncodedNode {
    match bytes.len() >= 32 {
        false => EncodedNode::Raw(bytes),
        true => EncodedNode::Hashed(keccak(&bytes).0),
    }
}

fn append_to_stream(s: &mut RlpStream, node: EncodedNode) {
    match node {
        EncodedNode::Raw(b) => s.append_raw(&b, 1),
        EncodedNode::Hashed(h) => s.append(&h.as_ref()),
    };
}

#[cfg(test)]
mod tests {
    use eth_trie::{EthTrie, MemoryDB, Trie};
    use keccak_hash::KECCAK_NULL_RLP;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use std::sync::Arc;

    use super::*;
    use crate::testing_utils::common_setup;

    const NUM_RANDOM_ENTRIES: usize = 500;

    fn eth_trie_root(entries: &[(Vec<u8>, Vec<u8>)]) -> H256 {
        let mut trie = EthTrie::new(Arc::new(MemoryDB::new(true)));
        for (k, v) in entries {
            trie.insert(k, v).unwrap();
        }
        H256(trie.root_hash().unwrap().0)
    }

    fn sorted_root(entries: &[(Vec<u8>, Vec<u8>)]) -> H256 {
        let mut trie = SortedCommitment::default();
        for (k, v) in entries {
            trie.update(k, v).unwrap();
        }
        trie.root_hash().unwrap()
    }

    #[test]
    fn empty_hash_is_correct() {
        assert_eq!(SortedCommitment::default().root_hash().unwrap(), KECCAK_NULL_RLP);
    }

    #[test]
    fn hex_prefix_encoding_matches_yellow_paper() {
        assert_eq!(&hex_prefix_encoding(&[1, 2, 3, 4, 5], false)[..], &[0x11, 0x23, 0x45]);
        assert_eq!(&hex_prefix_encoding(&[0, 1, 2, 3, 4, 5], false)[..], &[0x00, 0x01, 0x23, 0x45]);
        assert_eq!(&hex_prefix_encoding(&[0, 15, 1, 12, 11, 8], true)[..], &[0x20, 0x0f, 0x1c, 0xb8]);
        assert_eq!(&hex_prefix_encoding(&[15, 1, 12, 11, 8], true)[..], &[0x3f, 0x1c, 0xb8]);
    }

    #[test]
    fn small_tries_agree_with_eth_trie() {
        common_setup();

        let cases: Vec<Vec<(Vec<u8>, Vec<u8>)>> = vec![
            vec![(vec![0x00, 0x00], vec![0x00, 0x60, 0x00])],
            vec![(vec![0x12, 0x34], vec![2]), (vec![0x12, 0x35], vec![3])],
            vec![(vec![0x12, 0x34], vec![2]), (vec![0x56, 0x78], vec![3])],
            vec![
                (vec![0x12], vec![1]),
                (vec![0x12, 0x34], vec![2; 40]),
                (vec![0x12, 0x34, 0x56], vec![3]),
            ],
        ];

        for entries in cases {
            assert_eq!(sorted_root(&entries), eth_trie_root(&entries));
        }
    }

    #[test]
    fn massive_random_data_insert_agrees_with_eth_trie() {
        common_setup();

        let mut rng = StdRng::seed_from_u64(0);
        let entries: Vec<_> = (0..NUM_RANDOM_ENTRIES)
            .map(|_| {
                let key_len = rng.gen_range(1..=8);
                let val_len = rng.gen_range(1..=64);
                (
                    (0..key_len).map(|_| rng.gen()).collect(),
                    (0..val_len).map(|_| rng.gen()).collect(),
                )
            })
            .collect();

        assert_eq!(sorted_root(&entries), eth_trie_root(&entries));
    }
}
