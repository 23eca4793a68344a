//! Shared type definitions
//!
//! The chain block as observed through the explorer feed, plus clock helpers
//! used by rounds and orders.

use serde::{Deserialize, Serialize};

/// Block as reported by a block explorer
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Block hash, hex encoded as the explorer reports it
    pub hash: String,
    /// Block height
    pub number: u64,
    /// Block timestamp (Unix milliseconds)
    pub timestamp: u64,
    /// Hash of the previous block
    #[serde(default)]
    pub parent_hash: String,
}

/// Current Unix timestamp in milliseconds
pub fn current_timestamp_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// Current Unix timestamp in nanoseconds
pub fn current_timestamp_nanos() -> u64 {
    chrono::Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_default()
        .max(0) as u64
}
