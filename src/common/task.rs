//! Panic isolation for background workers
//!
//! A room's listener and settlement worker handle each event inside
//! [`guarded`], so a bug in one event is logged and the loop keeps running.

use futures::FutureExt;
use std::{any::Any, future::Future, panic::AssertUnwindSafe};

/// Run one unit of background work, converting a panic into an error log.
///
/// Returns `false` if the work panicked.
pub async fn guarded<F>(label: &str, work: F) -> bool
where
    F: Future<Output = ()>,
{
    match AssertUnwindSafe(work).catch_unwind().await {
        Ok(()) => true,
        Err(panic) => {
            tracing::error!(task = label, panic = %panic_message(panic.as_ref()), "background task panicked; continuing");
            false
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_guarded_passes_through_normal_work() {
        let mut ran = false;
        assert!(guarded("ok", async { ran = true }).await);
        assert!(ran);
    }

    #[tokio::test]
    async fn test_guarded_contains_panics() {
        let survived = guarded("boom", async { panic!("room exploded") }).await;
        assert!(!survived);
    }
}
