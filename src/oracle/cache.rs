//! Fixed-capacity block cache keyed by height
//!
//! Settlement only ever looks back a few rounds, so when the cache is full the
//! lowest height goes first.

use crate::common::types::Block;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

pub struct BlockCache {
    capacity: usize,
    blocks: RwLock<BTreeMap<u64, Block>>,
}

impl BlockCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            blocks: RwLock::new(BTreeMap::new()),
        }
    }

    pub async fn get(&self, height: u64) -> Option<Block> {
        self.blocks.read().await.get(&height).cloned()
    }

    pub async fn insert(&self, block: Block) {
        let mut blocks = self.blocks.write().await;
        blocks.insert(block.number, block);
        while blocks.len() > self.capacity {
            blocks.pop_first();
        }
    }

    pub async fn len(&self) -> usize {
        self.blocks.read().await.len()
    }

    pub async fn lowest_height(&self) -> Option<u64> {
        self.blocks.read().await.keys().next().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(number: u64) -> Block {
        Block {
            hash: format!("{:064x}", number),
            number,
            timestamp: number * 3000,
            parent_hash: format!("{:064x}", number.saturating_sub(1)),
        }
    }

    #[tokio::test]
    async fn test_evicts_lowest_height_when_full() {
        let cache = BlockCache::new(3);
        for height in [10, 12, 11, 13] {
            cache.insert(block(height)).await;
        }

        assert_eq!(cache.len().await, 3);
        assert!(cache.get(10).await.is_none());
        assert_eq!(cache.lowest_height().await, Some(11));
        assert_eq!(cache.get(13).await.unwrap().number, 13);
    }

    #[tokio::test]
    async fn test_reinsert_does_not_evict() {
        let cache = BlockCache::new(2);
        cache.insert(block(1)).await;
        cache.insert(block(2)).await;
        cache.insert(block(2)).await;

        assert_eq!(cache.len().await, 2);
        assert!(cache.get(1).await.is_some());
    }
}
