//! Panic codes raised by the oracle. A panic aborts the current call and the
//! host rolls the transaction back, so every failure below is atomic.

pub const ERR_INVALID_HEADER_LENGTH: &str = "InvalidHeaderLength";
pub const ERR_HEADER_ALREADY_EXISTS: &str = "HeaderAlreadyExists";
pub const ERR_PREV_BLOCK_NOT_FOUND: &str = "PrevBlockNotFound";
pub const ERR_FORK_BELOW_ANCHOR: &str = "ForkBelowAnchor";
pub const ERR_INVALID_BITS: &str = "InvalidBits";
pub const ERR_INVALID_POW: &str = "InvalidPoW";
pub const ERR_BLOCK_NOT_FOUND: &str = "BlockNotFound";
pub const ERR_NOT_CANONICAL: &str = "NotCanonical";
pub const ERR_INSUFFICIENT_CONFIRMATIONS: &str = "InsufficientConfirmations";
pub const ERR_BAD_PROOF_INPUT: &str = "BadProofInput";
pub const ERR_INIT_NOT_AT_RETARGET_BOUNDARY: &str = "InitNotAtRetargetBoundary";

/// Internal consistency failure: an index points at a record that is gone.
pub const ERR_KEY_NOT_EXIST: &str = "ERR_KEY_NOT_EXIST";
