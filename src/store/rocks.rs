//! RocksDB round store
//!
//! Records are JSON values under `round:{id}` and `order:{id}`. A settlement
//! batch is written through a single `WriteBatch`, so it lands completely or not
//! at all.

use super::{RoundStore, SettleReport};
use crate::errors::PersistenceError;
use crate::games::types::{Order, RoundRecord};
use async_trait::async_trait;
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;
use std::sync::Arc;

const ROUND_PREFIX: &str = "round:";
const ORDER_PREFIX: &str = "order:";

fn round_key(id: &str) -> String {
    format!("{}{}", ROUND_PREFIX, id)
}

fn order_key(id: &str) -> String {
    format!("{}{}", ORDER_PREFIX, id)
}

#[derive(Clone)]
pub struct RocksStore {
    db: Arc<DB>,
}

impl RocksStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, PersistenceError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let db = DB::open(&opts, path.as_ref()).map_err(|e| {
            PersistenceError::OpenFailed(format!("{}: {}", path.as_ref().display(), e))
        })?;
        Ok(Self { db: Arc::new(db) })
    }

    pub fn load_round(&self, id: &str) -> Result<Option<RoundRecord>, PersistenceError> {
        self.load(&round_key(id))
    }

    pub fn load_order(&self, id: &str) -> Result<Option<Order>, PersistenceError> {
        self.load(&order_key(id))
    }

    /// Every stored order belonging to `round_id`
    pub fn orders_for_round(&self, round_id: &str) -> Result<Vec<Order>, PersistenceError> {
        let mut orders = Vec::new();
        let iter = self
            .db
            .iterator(IteratorMode::From(ORDER_PREFIX.as_bytes(), Direction::Forward));

        for item in iter {
            let (key, value) = item.map_err(|e| PersistenceError::ReadFailed(e.to_string()))?;
            if !key.starts_with(ORDER_PREFIX.as_bytes()) {
                break;
            }
            let order: Order = decode(&String::from_utf8_lossy(&key), &value)?;
            if order.round_id == round_id {
                orders.push(order);
            }
        }
        Ok(orders)
    }

    fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, PersistenceError> {
        let Some(bytes) = self
            .db
            .get(key.as_bytes())
            .map_err(|e| PersistenceError::ReadFailed(e.to_string()))?
        else {
            return Ok(None);
        };
        decode(key, &bytes).map(Some)
    }

    fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<(), PersistenceError> {
        let bytes = encode(key, value)?;
        self.db.put(key.as_bytes(), bytes)?;
        Ok(())
    }
}

fn encode<T: Serialize>(key: &str, value: &T) -> Result<Vec<u8>, PersistenceError> {
    serde_json::to_vec(value)
        .map_err(|e| PersistenceError::WriteFailed(format!("Failed to encode {}: {}", key, e)))
}

fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> Result<T, PersistenceError> {
    serde_json::from_slice(bytes).map_err(|e| PersistenceError::CorruptedData {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

#[async_trait]
impl RoundStore for RocksStore {
    async fn insert_round(&self, round: &RoundRecord) -> Result<(), PersistenceError> {
        self.put(&round_key(&round.id), round)
    }

    async fn update_round(&self, round: &RoundRecord) -> Result<(), PersistenceError> {
        self.put(&round_key(&round.id), round)
    }

    async fn create_order(&self, order: &Order) -> Result<(), PersistenceError> {
        self.put(&order_key(&order.order_id), order)
    }

    async fn update_order(&self, order: &Order) -> Result<(), PersistenceError> {
        self.put(&order_key(&order.order_id), order)
    }

    async fn settle_player_orders(&self, orders: &[Order]) -> Result<SettleReport, PersistenceError> {
        let mut batch = WriteBatch::default();
        for order in orders {
            let key = order_key(&order.order_id);
            batch.put(key.as_bytes(), encode(&key, order)?);
        }

        self.db.write(batch)?;

        Ok(SettleReport {
            settled: orders.len(),
            failed: Vec::new(),
        })
    }
}
