use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::{
    hash::{double_sha256, H256},
    u256::{I256, U256},
    utils::DecodeHeaderError,
};

pub type Target = U256;
pub type Work = U256;

pub const BLOCKS_PER_ADJUSTMENT: u64 = 2016;
pub const TARGET_BLOCK_TIME_SECS: u64 = 10 * 60;
pub const EXPECTED_TIME: u64 = BLOCKS_PER_ADJUSTMENT * TARGET_BLOCK_TIME_SECS;
pub const MAX_ADJUSTMENT_FACTOR: u64 = 4;
pub const POW_LIMIT: U256 = U256::new(
    0x0000_0000_ffff_ffff_ffff_ffff_ffff_ffff,
    0xffff_ffff_ffff_ffff_ffff_ffff_ffff_ffff,
);

/// Malformed compact target encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactBitsError {
    /// The compact sign bit is set with a nonzero mantissa.
    Negative,
    /// The encoded value does not fit in 256 bits.
    Overflow,
}

impl CompactBitsError {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            CompactBitsError::Negative => "BitsNegative",
            CompactBitsError::Overflow => "BitsOverflow",
        }
    }
}

impl std::fmt::Display for CompactBitsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for CompactBitsError {}

/// Decodes Bitcoin's compact "bits" encoding into a full 256-bit target.
///
/// This is a floating-point format inherited from OpenSSL: one exponent
/// byte and a signed three-byte mantissa.
pub fn bits_to_target(bits: u32) -> Result<Target, CompactBitsError> {
    let n_size = bits >> 24;
    let n_word = bits & 0x007f_ffff;

    if bits & 0x0080_0000 != 0 && n_word != 0 {
        return Err(CompactBitsError::Negative);
    }
    if n_size > 34 || (n_word > 0xff && n_size > 33) || (n_word > 0xffff && n_size > 32) {
        return Err(CompactBitsError::Overflow);
    }

    let target = if n_size <= 3 {
        U256::from(n_word >> (8 * (3 - n_size)))
    } else {
        U256::from(n_word) << (8 * (n_size - 3))
    };
    Ok(target)
}

/// Inverse of [`bits_to_target`]. See [`U256::target_to_bits`].
#[must_use]
pub fn target_to_bits(target: &Target) -> u32 {
    target.target_to_bits()
}

/// Expected number of hash attempts to find a block at this target.
#[must_use]
pub fn target_to_work(target: &Target) -> Work {
    target.inverse()
}

/// Work of a block whose header carries the given compact target.
pub fn bits_to_work(bits: u32) -> Result<Work, CompactBitsError> {
    Ok(target_to_work(&bits_to_target(bits)?))
}

#[derive(BorshDeserialize, BorshSerialize, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    /// Block version, now repurposed for soft fork signalling.
    pub version: i32,
    /// Reference to the previous block in the chain.
    pub prev_block_hash: H256,
    /// The root hash of the merkle tree of transactions in the block.
    pub merkle_root: H256,
    /// The timestamp of the block, as claimed by the miner.
    pub time: u32,
    /// The target value below which the blockhash must lie.
    pub bits: u32,
    /// The nonce, selected to obtain a low enough blockhash.
    pub nonce: u32,
}

impl Header {
    /// The number of bytes that the block header contributes to the size of a block.
    // Serialized length of fields (version, prev_blockhash, merkle_root, time, bits, nonce)
    pub const SIZE: usize = 4 + 32 + 32 + 4 + 4 + 4; // 80

    /// Parses the 80-byte wire encoding.
    ///
    /// Integers are little-endian; the embedded hashes arrive in raw
    /// double-SHA-256 order and are flipped to display order here so they
    /// compare directly against computed block hashes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeHeaderError> {
        if bytes.len() != Self::SIZE {
            return Err(DecodeHeaderError::InvalidLength);
        }

        let mut prev_block_hash = [0u8; 32];
        prev_block_hash.copy_from_slice(&bytes[4..36]);
        prev_block_hash.reverse();

        let mut merkle_root = [0u8; 32];
        merkle_root.copy_from_slice(&bytes[36..68]);
        merkle_root.reverse();

        Ok(Header {
            version: i32::from_le_bytes(bytes[0..4].try_into().unwrap()),
            prev_block_hash: H256(prev_block_hash),
            merkle_root: H256(merkle_root),
            time: u32::from_le_bytes(bytes[68..72].try_into().unwrap()),
            bits: u32::from_le_bytes(bytes[72..76].try_into().unwrap()),
            nonce: u32::from_le_bytes(bytes[76..80].try_into().unwrap()),
        })
    }

    /// Serializes back to the 80-byte wire encoding; the exact inverse of
    /// [`Header::from_bytes`].
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Self::SIZE);
        bytes.extend_from_slice(&self.version.to_le_bytes());
        bytes.extend(self.prev_block_hash.reversed().0);
        bytes.extend(self.merkle_root.reversed().0);
        bytes.extend_from_slice(&self.time.to_le_bytes());
        bytes.extend_from_slice(&self.bits.to_le_bytes());
        bytes.extend_from_slice(&self.nonce.to_le_bytes());
        bytes
    }

    /// Display-order block hash: `reverse(sha256d(serialized header))`.
    #[must_use]
    pub fn block_hash(&self) -> H256 {
        double_sha256(&self.to_bytes()).reversed()
    }
}

#[allow(clippy::module_name_repetitions)]
#[derive(BorshDeserialize, BorshSerialize, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExtendedHeader {
    pub block_header: Header,
    /// Below, state contains additional fields not presented in the standard
    /// blockchain header; they carry the bookkeeping the oracle needs for
    /// fork management and queries.
    ///
    /// Current `block_hash`
    pub block_hash: H256,
    /// Cumulative work from the anchor block up to and including this one.
    /// At or below zero for headers accepted below the anchor.
    pub chain_work: I256,
    /// Block height in the Bitcoin network
    pub block_height: u64,
    /// Whether this header currently lies on the most-work chain.
    pub is_canonical: bool,
}
