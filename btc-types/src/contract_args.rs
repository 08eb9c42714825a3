use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::hash::H256;

#[derive(Clone, Debug, BorshDeserialize, BorshSerialize, Serialize, Deserialize)]
pub struct InitArgs {
    /// Height of the anchor block; must sit on a retarget boundary.
    pub init_block_height: u64,
    /// Raw 80-byte anchor header, hex-encoded in JSON.
    #[serde(with = "crate::utils::serd_vec_hex")]
    pub init_block_header: Vec<u8>,
    /// Whether bits and proof-of-work checks are enforced on submission.
    /// Must be `true` in production.
    pub check_pow: bool,
}

#[derive(Clone, Debug, BorshDeserialize, BorshSerialize, Serialize, Deserialize)]
pub struct ProofArgs {
    /// Height of the block the transaction is claimed to be in. Must be zero
    /// when `block_hash` is given.
    pub block_height: u64,
    /// Hash of that block; the zero hash selects lookup by height instead.
    pub block_hash: H256,
    /// Require the block to be canonical and buried deep enough to be final.
    pub require_safe: bool,
    /// Index of the transaction in the block's merkle tree.
    pub tx_index: u64,
    /// Full serialized transaction (not its hash).
    pub tx_data: Vec<u8>,
    /// Bottom-up sibling path, raw sha256d order.
    pub merkle_proof: Vec<H256>,
}
