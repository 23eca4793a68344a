//! Height notifications
//!
//! Each subscriber reads from its own cursor into a bounded broadcast buffer.
//! A subscriber that falls behind loses the oldest heights rather than slowing
//! the producer down, and never sees a height go backwards.

use futures::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

pub struct HeightSubscription {
    rx: broadcast::Receiver<u64>,
    last_seen: u64,
}

impl HeightSubscription {
    pub(crate) fn new(rx: broadcast::Receiver<u64>) -> Self {
        Self { rx, last_seen: 0 }
    }

    /// Wait for the next height above the last one delivered.
    ///
    /// Returns `None` once the oracle is gone.
    pub async fn recv(&mut self) -> Option<u64> {
        loop {
            match self.rx.recv().await {
                Ok(height) if height > self.last_seen => {
                    self.last_seen = height;
                    return Some(height);
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "height subscriber lagged; skipping to newer heights");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Consume the subscription as a stream of heights
    pub fn into_stream(self) -> impl Stream<Item = u64> + Send + 'static {
        let mut last_seen = self.last_seen;
        BroadcastStream::new(self.rx).filter_map(move |item| {
            let next = match item {
                Ok(height) if height > last_seen => {
                    last_seen = height;
                    Some(height)
                }
                _ => None,
            };
            futures::future::ready(next)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_slow_subscriber_skips_oldest() {
        let (tx, rx) = broadcast::channel(2);
        let mut sub = HeightSubscription::new(rx);

        for height in 1..=5 {
            tx.send(height).unwrap();
        }

        assert_eq!(sub.recv().await, Some(4));
        assert_eq!(sub.recv().await, Some(5));
    }

    #[tokio::test]
    async fn test_never_goes_backwards() {
        let (tx, rx) = broadcast::channel(8);
        let mut sub = HeightSubscription::new(rx);

        tx.send(10).unwrap();
        tx.send(9).unwrap();
        tx.send(11).unwrap();

        assert_eq!(sub.recv().await, Some(10));
        assert_eq!(sub.recv().await, Some(11));
    }

    #[tokio::test]
    async fn test_closed_channel_ends_subscription() {
        let (tx, rx) = broadcast::channel(4);
        let mut sub = HeightSubscription::new(rx);
        drop(tx);
        assert_eq!(sub.recv().await, None);
    }

    #[tokio::test]
    async fn test_stream_view() {
        let (tx, rx) = broadcast::channel(8);
        let stream = HeightSubscription::new(rx).into_stream();

        tx.send(3).unwrap();
        tx.send(2).unwrap();
        tx.send(4).unwrap();
        drop(tx);

        let heights: Vec<u64> = stream.collect().await;
        assert_eq!(heights, vec![3, 4]);
    }
}
