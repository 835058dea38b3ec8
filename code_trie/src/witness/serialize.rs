//! Wire encoding of multiproofs.
//!
//! A proof is sent as the RLP list
//! `[indices: [u16], leaves: [bytes], hashes: [bytes], zero_levels: bytes]`.
//! Uncompressed proofs omit `zero_levels`. In a compressed proof, FIO leaves
//! are cut down to their single significant byte and zero-subtree hashes are
//! sent as empty strings.

use std::io::Write;

use ethereum_types::H256;
use flate2::{write::DeflateEncoder, Compression};
use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};

use super::{is_fio_index, CompressedMultiproof, Multiproof, WitnessError, WitnessResult};

/// How a proof is turned into bytes.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum ProofEncoding {
    /// The plain RLP record.
    #[default]
    Rlp,
    /// The RLP record compressed with DEFLATE.
    RlpDeflate,
}

/// Encoded sizes of a proof, in bytes.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct EncodingStats {
    /// RLP of the compressed proof.
    pub rlp_size: usize,
    /// RLP of the uncompressed proof.
    pub un_rlp_size: usize,
    /// DEFLATE of the RLP of the uncompressed proof.
    pub deflate_size: usize,
}

impl EncodingStats {
    /// Measures the encodings of `proof` and its compressed form.
    pub fn new(proof: &Multiproof, compressed: &CompressedMultiproof) -> WitnessResult<Self> {
        let un_rlp = proof.to_rlp()?;

        Ok(Self {
            rlp_size: compressed.to_rlp()?.len(),
            un_rlp_size: un_rlp.len(),
            deflate_size: deflate(&un_rlp)?.len(),
        })
    }

    /// Accumulates `other` into `self`.
    pub fn add(&mut self, other: &EncodingStats) {
        self.rlp_size += other.rlp_size;
        self.un_rlp_size += other.un_rlp_size;
        self.deflate_size += other.deflate_size;
    }
}

impl Multiproof {
    /// The RLP record of this proof.
    pub fn to_rlp(&self) -> WitnessResult<Vec<u8>> {
        let record = ProofRecord {
            indices: to_wire_indices(&self.indices)?,
            leaves: self.leaves.iter().map(|l| l.as_bytes().to_vec()).collect(),
            hashes: self.hashes.iter().map(|h| h.as_bytes().to_vec()).collect(),
            zero_levels: None,
        };

        Ok(rlp::encode(&record).to_vec())
    }

    /// Encodes this proof.
    pub fn encode(&self, encoding: ProofEncoding) -> WitnessResult<Vec<u8>> {
        apply(encoding, self.to_rlp()?)
    }

    /// Decodes the RLP record produced by [`Multiproof::to_rlp`].
    pub fn from_rlp(bytes: &[u8]) -> WitnessResult<Self> {
        let record: ProofRecord = rlp::decode(bytes)?;
        if record.zero_levels.is_some() {
            return Err(DecoderError::RlpIncorrectListLen.into());
        }
        let indices = record.checked_indices()?;

        Ok(Self {
            indices,
            leaves: full_width(&record.leaves, "leaf must be 32 bytes")?,
            hashes: full_width(&record.hashes, "hash must be 32 bytes")?,
        })
    }
}

impl CompressedMultiproof {
    /// The RLP record of this proof.
    pub fn to_rlp(&self) -> WitnessResult<Vec<u8>> {
        let leaves = self
            .indices
            .iter()
            .zip(&self.leaves)
            .map(|(i, l)| match is_fio_index(*i) {
                true => l.as_bytes()[..1].to_vec(),
                false => l.as_bytes().to_vec(),
            })
            .collect();

        let record = ProofRecord {
            indices: to_wire_indices(&self.indices)?,
            leaves,
            hashes: self
                .hashes
                .iter()
                .map(|h| h.map(|h| h.as_bytes().to_vec()).unwrap_or_default())
                .collect(),
            zero_levels: Some(self.zero_levels.clone()),
        };

        Ok(rlp::encode(&record).to_vec())
    }

    /// Encodes this proof.
    pub fn encode(&self, encoding: ProofEncoding) -> WitnessResult<Vec<u8>> {
        apply(encoding, self.to_rlp()?)
    }

    /// Decodes the RLP record produced by [`CompressedMultiproof::to_rlp`].
    ///
    /// FIO leaves must be a single byte and every other leaf 32 bytes.
    pub fn from_rlp(bytes: &[u8]) -> WitnessResult<Self> {
        let record: ProofRecord = rlp::decode(bytes)?;
        let indices = record.checked_indices()?;

        let leaves = indices
            .iter()
            .zip(&record.leaves)
            .map(|(i, l)| match (is_fio_index(*i), l.len()) {
                (true, 1) => {
                    let mut leaf = H256::zero();
                    leaf.0[0] = l[0];
                    Ok(leaf)
                }
                (true, _) => Err(DecoderError::Custom("FIO leaf must be 1 byte")),
                (false, 32) => Ok(H256::from_slice(l)),
                (false, _) => Err(DecoderError::Custom("leaf must be 32 bytes")),
            })
            .collect::<Result<Vec<H256>, DecoderError>>()?;

        let hashes = record
            .hashes
            .iter()
            .map(|h| match h.len() {
                0 => Ok(None),
                32 => Ok(Some(H256::from_slice(h))),
                _ => Err(DecoderError::Custom("hash must be empty or 32 bytes")),
            })
            .collect::<Result<Vec<Option<H256>>, DecoderError>>()?;

        Ok(Self {
            indices,
            leaves,
            hashes,
            zero_levels: record.zero_levels.unwrap_or_default(),
        })
    }
}

fn full_width(items: &[Vec<u8>], err: &'static str) -> Result<Vec<H256>, DecoderError> {
    items
        .iter()
        .map(|item| match item.len() {
            32 => Ok(H256::from_slice(item)),
            _ => Err(DecoderError::Custom(err)),
        })
        .collect()
}

/// Compresses `bytes` with DEFLATE at the default level.
pub fn deflate(bytes: &[u8]) -> WitnessResult<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?)
}

fn apply(encoding: ProofEncoding, rlp: Vec<u8>) -> WitnessResult<Vec<u8>> {
    match encoding {
        ProofEncoding::Rlp => Ok(rlp),
        ProofEncoding::RlpDeflate => deflate(&rlp),
    }
}

fn to_wire_indices(indices: &[u64]) -> WitnessResult<Vec<u16>> {
    indices
        .iter()
        .map(|i| u16::try_from(*i).map_err(|_| WitnessError::IndexTooLarge(*i)))
        .collect()
}

/// The RLP record of a proof, after leaves and hashes have been cut to
/// their wire size.
#[derive(Debug, Eq, PartialEq)]
struct ProofRecord {
    indices: Vec<u16>,
    leaves: Vec<Vec<u8>>,
    hashes: Vec<Vec<u8>>,
    zero_levels: Option<Vec<u8>>,
}

impl ProofRecord {
    /// The indices, once they are known to pair up with the leaves.
    fn checked_indices(&self) -> WitnessResult<Vec<u64>> {
        if self.indices.len() != self.leaves.len() {
            return Err(WitnessError::LeafCountMismatch {
                indices: self.indices.len(),
                leaves: self.leaves.len(),
            });
        }

        Ok(self.indices.iter().copied().map(u64::from).collect())
    }
}

impl Encodable for ProofRecord {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(3 + self.zero_levels.is_some() as usize);
        s.append_list::<u16, _>(&self.indices);
        s.append_list::<Vec<u8>, _>(&self.leaves);
        s.append_list::<Vec<u8>, _>(&self.hashes);
        if let Some(levels) = &self.zero_levels {
            s.append(levels);
        }
    }
}

impl Decodable for ProofRecord {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        let zero_levels = match rlp.item_count()? {
            3 => None,
            4 => Some(rlp.val_at(3)?),
            _ => return Err(DecoderError::RlpIncorrectListLen),
        };

        Ok(Self {
            indices: rlp.list_at(0)?,
            leaves: rlp.list_at(1)?,
            hashes: rlp.list_at(2)?,
            zero_levels,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use flate2::read::DeflateDecoder;

    use super::*;
    use crate::{
        testing_utils::{common_setup, generate_random_code},
        witness::{
            code_gindex, fio_gindex, ChunkSize, WitnessHasher, WitnessTree, CODE_HASH_GINDEX,
        },
    };

    fn sample_proof() -> Multiproof {
        let code = generate_random_code(2, 1500);
        let tree = WitnessTree::build(&code, ChunkSize::Bytes32, WitnessHasher::Sha256).unwrap();
        let mut indices = vec![7, 8, 9, 10];
        for k in [0, 1, 20] {
            indices.extend([fio_gindex(k), code_gindex(k)]);
        }
        tree.prove(&indices).unwrap()
    }

    #[test]
    fn compressed_record_round_trips() -> WitnessResult<()> {
        common_setup();

        let compressed = sample_proof().compress(WitnessHasher::Sha256);
        let decoded = CompressedMultiproof::from_rlp(&compressed.to_rlp()?)?;

        assert_eq!(decoded, compressed);

        Ok(())
    }

    #[test]
    fn record_layout() -> WitnessResult<()> {
        let proof = sample_proof();
        let compressed = proof.compress(WitnessHasher::Sha256);

        let un_rlp = proof.to_rlp()?;
        let record = Rlp::new(&un_rlp);
        assert_eq!(record.item_count()?, 3);
        assert_eq!(
            record.list_at::<u16>(0)?,
            vec![7, 8, 9, 10, 12288, 12289, 12290, 12291, 12328, 12329]
        );

        let rlp = compressed.to_rlp()?;
        let record = Rlp::new(&rlp);
        assert_eq!(record.item_count()?, 4);
        assert_eq!(record.val_at::<Vec<u8>>(3)?, compressed.zero_levels);

        let leaves: Vec<Vec<u8>> = record.list_at(1)?;
        assert_eq!(leaves.iter().filter(|l| l.len() == 1).count(), 3);

        let hashes: Vec<Vec<u8>> = record.list_at(2)?;
        assert_eq!(
            hashes.iter().filter(|h| h.is_empty()).count(),
            compressed.zero_levels.len()
        );

        Ok(())
    }

    #[test]
    fn deflate_output_inflates_back() -> WitnessResult<()> {
        let proof = sample_proof();
        let rlp = proof.encode(ProofEncoding::Rlp)?;
        let deflated = proof.encode(ProofEncoding::RlpDeflate)?;

        let mut inflated = Vec::new();
        DeflateDecoder::new(&deflated[..]).read_to_end(&mut inflated)?;
        assert_eq!(inflated, rlp);

        Ok(())
    }

    #[test]
    fn encoding_stats_measure_each_encoding() -> WitnessResult<()> {
        let proof = sample_proof();
        let compressed = proof.compress(WitnessHasher::Sha256);
        let stats = EncodingStats::new(&proof, &compressed)?;

        assert_eq!(stats.rlp_size, compressed.to_rlp()?.len());
        assert_eq!(stats.un_rlp_size, proof.to_rlp()?.len());
        assert_eq!(stats.deflate_size, proof.encode(ProofEncoding::RlpDeflate)?.len());
        assert!(stats.rlp_size < stats.un_rlp_size);

        let mut total = EncodingStats::default();
        total.add(&stats);
        total.add(&stats);
        assert_eq!(total.un_rlp_size, 2 * stats.un_rlp_size);

        Ok(())
    }

    #[test]
    fn wide_indices_are_rejected() {
        let proof = Multiproof {
            indices: vec![1 << 16],
            leaves: vec![H256::zero()],
            hashes: vec![],
        };
        assert!(matches!(
            proof.to_rlp(),
            Err(WitnessError::IndexTooLarge(65536))
        ));
    }

    #[test]
    fn plain_record_round_trips() -> WitnessResult<()> {
        let proof = sample_proof();
        assert_eq!(Multiproof::from_rlp(&proof.to_rlp()?)?, proof);

        let compressed = proof.compress(WitnessHasher::Sha256).to_rlp()?;
        assert!(matches!(
            Multiproof::from_rlp(&compressed),
            Err(WitnessError::Rlp(DecoderError::RlpIncorrectListLen))
        ));

        Ok(())
    }

    #[test]
    fn leaf_widths_must_match_their_index() {
        let record = |index: u16, leaf: Vec<u8>| {
            rlp::encode(&ProofRecord {
                indices: vec![index],
                leaves: vec![leaf],
                hashes: vec![],
                zero_levels: Some(vec![]),
            })
            .to_vec()
        };

        let fio = fio_gindex(3) as u16;
        let code = code_gindex(3) as u16;

        let decoded = CompressedMultiproof::from_rlp(&record(fio, vec![7])).unwrap();
        assert_eq!(decoded.leaves[0].0[0], 7);
        assert!(CompressedMultiproof::from_rlp(&record(code, vec![0xaa; 32])).is_ok());

        let misfits = [
            (fio, vec![7; 32]),
            (code, vec![7]),
            (CODE_HASH_GINDEX as u16, vec![]),
        ];
        for (index, leaf) in misfits {
            assert!(matches!(
                CompressedMultiproof::from_rlp(&record(index, leaf)),
                Err(WitnessError::Rlp(DecoderError::Custom(_)))
            ));
        }
    }

    #[test]
    fn malformed_records_are_rejected() {
        let mut stream = RlpStream::new_list(2);
        stream.append_empty_data().append_empty_data();

        assert!(matches!(
            CompressedMultiproof::from_rlp(&stream.out()),
            Err(WitnessError::Rlp(DecoderError::RlpIncorrectListLen))
        ));
    }
}
