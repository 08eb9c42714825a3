use btc_types::contract_args::{InitArgs, ProofArgs};
use btc_types::hash::{double_sha256, H256};
use btc_types::header::{
    bits_to_target, bits_to_work, target_to_bits, target_to_work, ExtendedHeader, Header, Target,
    BLOCKS_PER_ADJUSTMENT, EXPECTED_TIME, MAX_ADJUSTMENT_FACTOR, POW_LIMIT,
};
use btc_types::u256::{I256, U256};
use near_sdk::borsh::{self, BorshSerialize};
use near_sdk::collections::LookupMap;
use near_sdk::{env, log, near, require, PanicOnDefault};

pub mod errors;
pub mod events;

use crate::errors::*;
use crate::events::NewBlockHeaderEvent;

/// Confirmation depth, counting the block itself, at which a canonical
/// block is treated as final.
pub const MIN_CONFIRMATIONS: u64 = 6;

#[derive(BorshSerialize, near_sdk::BorshStorageKey)]
enum StorageKey {
    HeadersPool,
    HeightToHash,
}

/// Bitcoin SPV header-chain oracle.
///
/// Ingests raw 80-byte block headers, tracks every observed fork, keeps the
/// most-work chain canonical, and answers block-metadata and
/// transaction-inclusion queries against it. This contract pairs with an
/// off-chain relay that watches the Bitcoin network and forwards headers.
#[near(contract_state)]
#[derive(PanicOnDefault)]
pub struct BtcHeaderOracle {
    // Every header ever accepted (including orphaned forks), keyed by
    // display-order block hash. Append-only; only `is_canonical` mutates.
    headers_pool: LookupMap<H256, ExtendedHeader>,

    // Height index over the canonical chain only. Rewritten during reorgs;
    // entries above a shorter winning chain are removed.
    height_to_hash: LookupMap<u64, H256>,

    // Tip of the canonical chain: the stored header with the greatest
    // cumulative chain work.
    latest_block_hash: H256,

    // The earliest canonical block we know; moves backward only through
    // pre-anchor extension.
    first_block_hash: H256,

    // Height the oracle was anchored at. Immutable.
    init_block_height: u64,

    // Whether bits and proof-of-work checks run on submission. Immutable,
    // and must be true in production.
    check_pow: bool,
}

#[near]
impl BtcHeaderOracle {
    /// Anchors the oracle at `init_block_height` with the supplied raw
    /// header. The height must sit on a retarget boundary so that future
    /// difficulty adjustments find their window start in the height index.
    #[init]
    #[must_use]
    pub fn init(args: InitArgs) -> Self {
        require!(
            args.init_block_height % BLOCKS_PER_ADJUSTMENT == 0,
            ERR_INIT_NOT_AT_RETARGET_BOUNDARY
        );

        let block_header = Header::from_bytes(&args.init_block_header)
            .unwrap_or_else(|_| env::panic_str(ERR_INVALID_HEADER_LENGTH));
        let block_hash = block_header.block_hash();
        let work = bits_to_work(block_header.bits).unwrap_or_else(|e| env::panic_str(e.as_str()));

        let mut contract = Self {
            headers_pool: LookupMap::new(StorageKey::HeadersPool),
            height_to_hash: LookupMap::new(StorageKey::HeightToHash),
            latest_block_hash: block_hash,
            first_block_hash: block_hash,
            init_block_height: args.init_block_height,
            check_pow: args.check_pow,
        };

        contract.store_canonical_header(&ExtendedHeader {
            block_header,
            block_hash,
            chain_work: I256::from_raw(work),
            block_height: args.init_block_height,
            is_canonical: true,
        });

        log!(
            "Init with block hash {} at height {}",
            block_hash,
            args.init_block_height
        );
        NewBlockHeaderEvent {
            block_hash: &block_hash,
            block_height: args.init_block_height,
            raw_block_header: hex::encode(&args.init_block_header),
            latest_updated: true,
        }
        .emit();

        contract
    }

    /// Submits one raw 80-byte header.
    pub fn submit_block_header(&mut self, #[serializer(borsh)] raw_block_header: Vec<u8>) {
        self.submit(&raw_block_header);
    }

    /// Submits a batch of raw headers, strictly in order. Any rejected
    /// element panics and the host rolls the whole transaction back, so a
    /// batch commits all-or-nothing.
    pub fn submit_block_headers(&mut self, #[serializer(borsh)] raw_block_headers: Vec<Vec<u8>>) {
        for raw_block_header in &raw_block_headers {
            self.submit(raw_block_header);
        }
    }

    /// Verifies that a transaction is committed to a block's merkle tree.
    ///
    /// The block is selected by `block_height` when `block_hash` is the zero
    /// hash, and by `block_hash` (with `block_height == 0`) otherwise.
    /// Gating failures (unknown block, safety gate) panic; a proof that
    /// merely fails to verify returns `false`, so callers can tell "bad
    /// proof" apart from "block not queryable".
    ///
    /// # Warning
    /// `tx_data` must be the full serialized transaction: hashing an inner
    /// merkle node instead is ruled out by the 64-byte length guard.
    pub fn verify_transaction_inclusion(&self, #[serializer(borsh)] args: ProofArgs) -> bool {
        // A 64-byte payload hashes exactly like an inner merkle node, which
        // would let a crafted "transaction" alias an internal tree level.
        require!(args.tx_data.len() > 64, ERR_BAD_PROOF_INPUT);

        let header = if args.block_hash.is_zero() {
            self.header_by_height(args.block_height, args.require_safe)
        } else {
            require!(args.block_height == 0, ERR_BAD_PROOF_INPUT);
            self.header_by_hash(&args.block_hash, args.require_safe)
        };

        let tx_hash = double_sha256(&args.tx_data);
        match merkle_tools::compute_root_from_merkle_proof(
            &tx_hash,
            args.tx_index,
            &args.merkle_proof,
        ) {
            // The walk runs in raw sha256d order; stored roots are reversed.
            Some(root) => root.reversed() == header.block_header.merkle_root,
            None => false,
        }
    }

    pub fn get_last_block_header(&self) -> ExtendedHeader {
        self.headers_pool
            .get(&self.latest_block_hash)
            .unwrap_or_else(|| env::panic_str(ERR_KEY_NOT_EXIST))
    }

    pub fn get_first_block_header(&self) -> ExtendedHeader {
        self.headers_pool
            .get(&self.first_block_hash)
            .unwrap_or_else(|| env::panic_str(ERR_KEY_NOT_EXIST))
    }

    pub fn get_mainchain_size(&self) -> u64 {
        self.get_last_block_header().block_height - self.get_first_block_header().block_height + 1
    }

    /// The only supported way to resolve a height to a block hash: unsafe
    /// lookups of recent heights may flip under reorg, so the raw height
    /// index stays internal.
    pub fn get_block_hash_by_height(&self, block_height: u64, require_safe: bool) -> H256 {
        self.header_by_height(block_height, require_safe).block_hash
    }

    pub fn get_block_height_by_hash(&self, block_hash: H256, require_safe: bool) -> u64 {
        self.header_by_hash(&block_hash, require_safe).block_height
    }

    pub fn get_block_header_by_height(
        &self,
        block_height: u64,
        require_safe: bool,
    ) -> ExtendedHeader {
        self.header_by_height(block_height, require_safe)
    }

    pub fn get_block_header_by_hash(&self, block_hash: H256, require_safe: bool) -> ExtendedHeader {
        self.header_by_hash(&block_hash, require_safe)
    }

    /// The 80-byte wire encoding of the stored header.
    pub fn get_raw_block_header_by_height(&self, block_height: u64, require_safe: bool) -> Vec<u8> {
        self.header_by_height(block_height, require_safe)
            .block_header
            .to_bytes()
    }

    pub fn get_raw_block_header_by_hash(&self, block_hash: H256, require_safe: bool) -> Vec<u8> {
        self.header_by_hash(&block_hash, require_safe)
            .block_header
            .to_bytes()
    }

    pub fn get_merkle_root_by_height(&self, block_height: u64, require_safe: bool) -> H256 {
        self.header_by_height(block_height, require_safe)
            .block_header
            .merkle_root
    }

    pub fn get_merkle_root_by_hash(&self, block_hash: H256, require_safe: bool) -> H256 {
        self.header_by_hash(&block_hash, require_safe)
            .block_header
            .merkle_root
    }

    pub fn get_prev_block_hash_by_height(&self, block_height: u64, require_safe: bool) -> H256 {
        self.header_by_height(block_height, require_safe)
            .block_header
            .prev_block_hash
    }

    pub fn get_prev_block_hash_by_hash(&self, block_hash: H256, require_safe: bool) -> H256 {
        self.header_by_hash(&block_hash, require_safe)
            .block_header
            .prev_block_hash
    }

    pub fn get_timestamp_by_height(&self, block_height: u64, require_safe: bool) -> u32 {
        self.header_by_height(block_height, require_safe)
            .block_header
            .time
    }

    pub fn get_timestamp_by_hash(&self, block_hash: H256, require_safe: bool) -> u32 {
        self.header_by_hash(&block_hash, require_safe)
            .block_header
            .time
    }

    pub fn get_bits_by_height(&self, block_height: u64, require_safe: bool) -> u32 {
        self.header_by_height(block_height, require_safe)
            .block_header
            .bits
    }

    pub fn get_bits_by_hash(&self, block_hash: H256, require_safe: bool) -> u32 {
        self.header_by_hash(&block_hash, require_safe)
            .block_header
            .bits
    }

    pub fn get_version_by_height(&self, block_height: u64, require_safe: bool) -> i32 {
        self.header_by_height(block_height, require_safe)
            .block_header
            .version
    }

    pub fn get_version_by_hash(&self, block_hash: H256, require_safe: bool) -> i32 {
        self.header_by_hash(&block_hash, require_safe)
            .block_header
            .version
    }

    pub fn get_nonce_by_height(&self, block_height: u64, require_safe: bool) -> u32 {
        self.header_by_height(block_height, require_safe)
            .block_header
            .nonce
    }

    pub fn get_nonce_by_hash(&self, block_hash: H256, require_safe: bool) -> u32 {
        self.header_by_hash(&block_hash, require_safe)
            .block_header
            .nonce
    }

    pub fn get_chain_work_by_height(&self, block_height: u64, require_safe: bool) -> I256 {
        self.header_by_height(block_height, require_safe).chain_work
    }

    pub fn get_chain_work_by_hash(&self, block_hash: H256, require_safe: bool) -> I256 {
        self.header_by_hash(&block_hash, require_safe).chain_work
    }

    /// Whether the canonical block at this height is buried at least
    /// `MIN_CONFIRMATIONS` deep. Never panics: a missing or shallow block
    /// is simply not final.
    pub fn is_block_finalized_by_height(&self, block_height: u64) -> bool {
        match self.height_to_hash.get(&block_height) {
            Some(block_hash) => match self.headers_pool.get(&block_hash) {
                Some(header) => self.is_finalized(&header),
                None => false,
            },
            None => false,
        }
    }

    pub fn is_block_finalized_by_hash(&self, block_hash: H256) -> bool {
        match self.headers_pool.get(&block_hash) {
            Some(header) => self.is_finalized(&header),
            None => false,
        }
    }
}

impl BtcHeaderOracle {
    fn submit(&mut self, raw_block_header: &[u8]) {
        let block_header = Header::from_bytes(raw_block_header)
            .unwrap_or_else(|_| env::panic_str(ERR_INVALID_HEADER_LENGTH));
        let block_hash = block_header.block_hash();

        require!(
            !self.headers_pool.contains_key(&block_hash),
            ERR_HEADER_ALREADY_EXISTS
        );

        let Some(prev_header) = self.headers_pool.get(&block_header.prev_block_hash) else {
            // An unknown parent is acceptable only for the block directly
            // below the current chain start.
            let first_header = self.get_first_block_header();
            if block_hash == first_header.block_header.prev_block_hash {
                self.extend_below_first(block_header, raw_block_header, &first_header);
                return;
            }
            env::panic_str(ERR_PREV_BLOCK_NOT_FOUND)
        };

        let block_height = prev_header.block_height + 1;
        require!(block_height > self.init_block_height, ERR_FORK_BELOW_ANCHOR);

        let target =
            bits_to_target(block_header.bits).unwrap_or_else(|e| env::panic_str(e.as_str()));
        if self.check_pow {
            require!(
                block_header.bits == self.next_block_bits(&prev_header, block_height),
                ERR_INVALID_BITS
            );
            require!(
                U256::from_be_bytes(&block_hash.0) <= target,
                ERR_INVALID_POW
            );
        }

        let mut header = ExtendedHeader {
            block_header,
            block_hash,
            chain_work: prev_header.chain_work.wrapping_add_unsigned(target_to_work(&target)),
            block_height,
            is_canonical: true,
        };

        let tip_header = self.get_last_block_header();
        let latest_updated;
        if tip_header.block_hash == header.block_header.prev_block_hash {
            // Fast path: extending the current tip.
            log!("Block {}: saving to mainchain", block_hash);
            self.store_canonical_header(&header);
            self.latest_block_hash = block_hash;
            latest_updated = true;
        } else if header.chain_work > tip_header.chain_work {
            // Strictly more work than the incumbent tip; an equal-work fork
            // stays on the side.
            log!("Block {}: chain reorg", block_hash);
            self.reorg_chain(&header, &tip_header);
            latest_updated = true;
        } else {
            log!("Block {}: saving to fork", block_hash);
            header.is_canonical = false;
            self.store_fork_header(&header);
            latest_updated = false;
        }

        NewBlockHeaderEvent {
            block_hash: &block_hash,
            block_height,
            raw_block_header: hex::encode(raw_block_header),
            latest_updated,
        }
        .emit();
    }

    /// Accepts the parent of the current first block, moving the chain
    /// start one block down. The submission is bound by hash, so no bits or
    /// proof-of-work check applies here.
    fn extend_below_first(
        &mut self,
        block_header: Header,
        raw_block_header: &[u8],
        first_header: &ExtendedHeader,
    ) {
        let block_hash = block_header.block_hash();
        let block_height = first_header.block_height - 1;
        let first_work = bits_to_work(first_header.block_header.bits)
            .unwrap_or_else(|e| env::panic_str(e.as_str()));

        // Subtracting the old first block's own work keeps
        // chain_work(child) - chain_work(parent) == work(child) across the
        // chain start; totals below the anchor land at zero and then go
        // negative.
        let header = ExtendedHeader {
            block_header,
            block_hash,
            chain_work: first_header.chain_work.wrapping_sub_unsigned(first_work),
            block_height,
            is_canonical: true,
        };

        self.store_canonical_header(&header);
        self.first_block_hash = block_hash;

        log!(
            "Block {}: extending chain start down to height {}",
            block_hash,
            block_height
        );
        NewBlockHeaderEvent {
            block_hash: &block_hash,
            block_height,
            raw_block_header: hex::encode(raw_block_header),
            latest_updated: false,
        }
        .emit();
    }

    /// Promotes the fork ending in `new_tip` over the current canonical
    /// chain. The caller has established that the fork carries strictly
    /// more work.
    fn reorg_chain(&mut self, new_tip: &ExtendedHeader, old_tip: &ExtendedHeader) {
        // Walk the fork towards the anchor, promoting every header up to
        // the first one that is already canonical: the common ancestor.
        let mut cursor = self
            .headers_pool
            .get(&new_tip.block_header.prev_block_hash)
            .unwrap_or_else(|| env::panic_str(ERR_KEY_NOT_EXIST));
        while !cursor.is_canonical {
            cursor.is_canonical = true;
            self.store_canonical_header(&cursor);
            cursor = self
                .headers_pool
                .get(&cursor.block_header.prev_block_hash)
                .unwrap_or_else(|| env::panic_str(ERR_KEY_NOT_EXIST));
        }
        let common_ancestor_hash = cursor.block_hash;

        // Demote the old chain down to the same ancestor. Heights above the
        // new tip lose their canonical entry entirely; the rest were just
        // overwritten by the promotion walk.
        let mut cursor = *old_tip;
        while cursor.block_hash != common_ancestor_hash {
            cursor.is_canonical = false;
            self.store_fork_header(&cursor);
            if cursor.block_height > new_tip.block_height {
                self.height_to_hash.remove(&cursor.block_height);
            }
            cursor = self
                .headers_pool
                .get(&cursor.block_header.prev_block_hash)
                .unwrap_or_else(|| env::panic_str(ERR_KEY_NOT_EXIST));
        }

        self.store_canonical_header(new_tip);
        self.latest_block_hash = new_tip.block_hash;
    }

    /// Expected `bits` for a block at `block_height` whose parent is
    /// `prev_header`, per the 2016-block retargeting schedule.
    fn next_block_bits(&self, prev_header: &ExtendedHeader, block_height: u64) -> u32 {
        if block_height % BLOCKS_PER_ADJUSTMENT != 0 {
            return prev_header.block_header.bits;
        }

        // The window start is read through the canonical index, so a fork
        // crossing a retarget boundary is checked against the canonical
        // window; cumulative work still decides the winner.
        let period_start_hash = self
            .height_to_hash
            .get(&(block_height - BLOCKS_PER_ADJUSTMENT))
            .unwrap_or_else(|| env::panic_str(ERR_BLOCK_NOT_FOUND));
        let period_start_header = self
            .headers_pool
            .get(&period_start_hash)
            .unwrap_or_else(|| env::panic_str(ERR_KEY_NOT_EXIST));

        let last_target = bits_to_target(prev_header.block_header.bits)
            .unwrap_or_else(|e| env::panic_str(e.as_str()));
        // Wrapping on purpose: a window start later than the window end
        // wraps into a huge timespan and clamps to maximum expansion below.
        let timespan = prev_header
            .block_header
            .time
            .wrapping_sub(period_start_header.block_header.time);

        target_to_bits(&adjusted_target(&last_target, timespan))
    }

    fn header_by_hash(&self, block_hash: &H256, require_safe: bool) -> ExtendedHeader {
        let header = self
            .headers_pool
            .get(block_hash)
            .unwrap_or_else(|| env::panic_str(ERR_BLOCK_NOT_FOUND));
        if require_safe {
            require!(header.is_canonical, ERR_NOT_CANONICAL);
            require!(self.is_finalized(&header), ERR_INSUFFICIENT_CONFIRMATIONS);
        }
        header
    }

    fn header_by_height(&self, block_height: u64, require_safe: bool) -> ExtendedHeader {
        let block_hash = self
            .height_to_hash
            .get(&block_height)
            .unwrap_or_else(|| env::panic_str(ERR_BLOCK_NOT_FOUND));
        let header = self
            .headers_pool
            .get(&block_hash)
            .unwrap_or_else(|| env::panic_str(ERR_KEY_NOT_EXIST));
        if require_safe {
            require!(self.is_finalized(&header), ERR_INSUFFICIENT_CONFIRMATIONS);
        }
        header
    }

    fn is_finalized(&self, header: &ExtendedHeader) -> bool {
        header.is_canonical
            && header.block_height + (MIN_CONFIRMATIONS - 1)
                <= self.get_last_block_header().block_height
    }

    /// Inserts the header and points the canonical height index at it.
    fn store_canonical_header(&mut self, header: &ExtendedHeader) {
        self.height_to_hash
            .insert(&header.block_height, &header.block_hash);
        self.headers_pool.insert(&header.block_hash, header);
    }

    /// Inserts the header without touching the height index.
    fn store_fork_header(&mut self, header: &ExtendedHeader) {
        self.headers_pool.insert(&header.block_hash, header);
    }
}

/// Observed retarget period length, clamped to a factor of four around the
/// expected two weeks.
fn modulated_timespan(timespan: u32) -> u64 {
    let mut modulated = u64::from(timespan);

    if modulated < EXPECTED_TIME / MAX_ADJUSTMENT_FACTOR {
        modulated = EXPECTED_TIME / MAX_ADJUSTMENT_FACTOR;
    }
    if modulated > EXPECTED_TIME * MAX_ADJUSTMENT_FACTOR {
        modulated = EXPECTED_TIME * MAX_ADJUSTMENT_FACTOR;
    }

    modulated
}

/// Scales the previous target by the clamped ratio of observed to expected
/// period duration, capped at the proof-of-work limit.
fn adjusted_target(last_target: &Target, timespan: u32) -> Target {
    let (scaled, overflow) = last_target.overflowing_mul(modulated_timespan(timespan));
    require!(!overflow, "new target overflow");

    let new_target = scaled / U256::from(EXPECTED_TIME);
    if new_target > POW_LIMIT {
        POW_LIMIT
    } else {
        new_target
    }
}

/*
 * The rest of this file holds the inline tests for the code above
 * Learn more about Rust tests: https://doc.rust-lang.org/book/ch11-01-writing-tests.html
 */
