//! Scripted block explorer and hash helpers for tests

use crate::common::types::Block;
use crate::oracle::{BlockExplorer, OracleError};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// In-memory explorer whose chain and failures are driven by the test
pub struct ScriptedExplorer {
    name: String,
    blocks: DashMap<u64, Block>,
    head: AtomicU64,
    fail_block_lookups: AtomicBool,
    fail_latest: AtomicBool,
    latency_ms: AtomicU64,
    calls: AtomicU64,
}

impl ScriptedExplorer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            blocks: DashMap::new(),
            head: AtomicU64::new(0),
            fail_block_lookups: AtomicBool::new(false),
            fail_latest: AtomicBool::new(false),
            latency_ms: AtomicU64::new(0),
            calls: AtomicU64::new(0),
        }
    }

    /// Make a historical block available without moving the head
    pub fn insert_block(&self, block: Block) {
        self.blocks.insert(block.number, block);
    }

    /// Append a block and make it the chain head
    pub fn push_block(&self, block: Block) {
        let number = block.number;
        self.blocks.insert(number, block);
        self.head.fetch_max(number, Ordering::SeqCst);
    }

    pub fn set_fail_block_lookups(&self, fail: bool) {
        self.fail_block_lookups.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_latest(&self, fail: bool) {
        self.fail_latest.store(fail, Ordering::SeqCst);
    }

    /// Delay every block lookup by `latency`
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms.store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Requests served so far, failed ones included
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn scripted_failure(&self) -> OracleError {
        OracleError::Request {
            endpoint: self.name.clone(),
            reason: "scripted failure".to_string(),
        }
    }
}

#[async_trait]
impl BlockExplorer for ScriptedExplorer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn block_by_number(&self, number: u64) -> Result<Block, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.fail_block_lookups.load(Ordering::SeqCst) {
            return Err(self.scripted_failure());
        }
        self.blocks
            .get(&number)
            .map(|b| b.value().clone())
            .ok_or_else(|| OracleError::EmptyPayload { endpoint: self.name.clone() })
    }

    async fn latest_block(&self) -> Result<Block, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_latest.load(Ordering::SeqCst) {
            return Err(self.scripted_failure());
        }
        let head = self.head.load(Ordering::SeqCst);
        self.blocks
            .get(&head)
            .map(|b| b.value().clone())
            .ok_or_else(|| OracleError::EmptyPayload { endpoint: self.name.clone() })
    }
}

/// Block with the given hash.
///
/// Timestamps are zero, so the oracle never holds back a refetch of the head.
pub fn block_with_hash(number: u64, hash: &str) -> Block {
    Block {
        hash: hash.to_string(),
        number,
        timestamp: 0,
        parent_hash: String::new(),
    }
}

/// A 64-character hex hash ending in `suffix`
pub fn hash_ending(suffix: &str) -> String {
    let fill = 64usize.saturating_sub(suffix.len());
    format!("0x{}{}", "e".repeat(fill), suffix)
}
