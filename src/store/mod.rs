//! Persistence gateway
//!
//! Rooms push round and order state through [`RoundStore`]. Writes are
//! best-effort from the room's point of view: failures are logged by the
//! caller and only settlement is retried.

pub mod memory;
pub mod rocks;

pub use memory::MemoryStore;
pub use rocks::RocksStore;

use crate::config::{StorageBackend, StorageConfig};
use crate::errors::PersistenceError;
use crate::games::types::{Order, RoundRecord};
use async_trait::async_trait;
use std::sync::Arc;

/// Outcome of a settlement batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettleReport {
    pub settled: usize,
    /// Order ids the store could not write
    pub failed: Vec<String>,
}

impl SettleReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[async_trait]
pub trait RoundStore: Send + Sync {
    async fn insert_round(&self, round: &RoundRecord) -> Result<(), PersistenceError>;

    async fn update_round(&self, round: &RoundRecord) -> Result<(), PersistenceError>;

    async fn create_order(&self, order: &Order) -> Result<(), PersistenceError>;

    async fn update_order(&self, order: &Order) -> Result<(), PersistenceError>;

    /// Persist a settled batch, atomically or reporting the order ids that failed
    async fn settle_player_orders(&self, orders: &[Order]) -> Result<SettleReport, PersistenceError>;
}

/// Open the configured backend
pub fn open_store(config: &StorageConfig) -> Result<Arc<dyn RoundStore>, PersistenceError> {
    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StorageBackend::RocksDb => Ok(Arc::new(RocksStore::open(&config.data_directory)?)),
    }
}
