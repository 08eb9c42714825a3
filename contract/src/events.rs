use btc_types::hash::H256;
use near_sdk::env;
use serde::Serialize;

pub const EVENT_STANDARD: &str = "btc_header_oracle";
pub const EVENT_STANDARD_VERSION: &str = "1.0.0";

/// NEP-297 event payload, emitted exactly once per accepted header
/// (including the anchor at initialization).
#[derive(Serialize, Debug)]
pub struct NewBlockHeaderEvent<'a> {
    pub block_hash: &'a H256,
    pub block_height: u64,
    /// The 80 bytes exactly as submitted, hex-encoded.
    pub raw_block_header: String,
    /// True only when this submission moved the canonical tip.
    pub latest_updated: bool,
}

impl NewBlockHeaderEvent<'_> {
    pub fn emit(&self) {
        let event = serde_json::json!({
            "standard": EVENT_STANDARD,
            "version": EVENT_STANDARD_VERSION,
            "event": "new_block_header",
            "data": [self],
        });
        env::log_str(&format!("EVENT_JSON:{event}"));
    }
}
