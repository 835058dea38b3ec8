//! Decoding the snapshot's slim account records.
//!
//! A slim account is the RLP list `[nonce, balance, storage_root, code_hash]`
//! in which an empty storage root and an empty code hash are both written as
//! empty strings.

use code_trie::EMPTY_CODE_HASH;
use ethereum_types::{H256, U256};
use rlp::{DecoderError, Rlp, RlpStream};

use crate::error::TransitionResult;

/// The code hash of a slim account record, or `None` for an account without
/// code.
pub fn code_hash_from_slim_rlp(record: &[u8]) -> TransitionResult<Option<H256>> {
    let rlp = Rlp::new(record);
    if rlp.item_count()? != 4 {
        return Err(DecoderError::RlpIncorrectListLen.into());
    }

    let code_hash: Vec<u8> = rlp.val_at(3)?;
    match code_hash.len() {
        0 => Ok(None),
        32 => {
            let code_hash = H256::from_slice(&code_hash);
            Ok((code_hash != EMPTY_CODE_HASH).then_some(code_hash))
        }
        _ => Err(DecoderError::RlpInvalidLength.into()),
    }
}

/// Encodes a slim account record.
pub fn slim_account_rlp(
    nonce: u64,
    balance: U256,
    storage_root: Option<H256>,
    code_hash: Option<H256>,
) -> Vec<u8> {
    let mut stream = RlpStream::new_list(4);
    stream.append(&nonce).append(&balance);

    for hash in [storage_root, code_hash] {
        match hash {
            Some(h) => stream.append(&h),
            None => stream.append_empty_data(),
        };
    }

    stream.out().to_vec()
}
