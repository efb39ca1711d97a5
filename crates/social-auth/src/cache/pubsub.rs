//! Redis Pub/Sub for cross-instance cache invalidation.
//!
//! ```text
//! Instance 1: UserCache::invalidate(7)
//!   ↓
//! PUBLISH cache:invalidate "user-7"
//!   ↓
//! Instance 2, 3: listener removes "user-7" from L1
//! ```

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::backend::CachedEntry;

/// Channel carrying invalidated cache keys.
pub const INVALIDATION_CHANNEL: &str = "cache:invalidate";

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Subscribes to [`INVALIDATION_CHANNEL`] and evicts received keys from L1.
pub struct CacheInvalidationListener {
    pub redis_url: String,
    pub local_cache: Arc<DashMap<String, CachedEntry>>,
}

impl CacheInvalidationListener {
    /// Spawns the listener.
    ///
    /// The task reconnects with exponential backoff whenever the
    /// subscription fails or drops. A successful subscription resets the
    /// backoff.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut backoff = INITIAL_BACKOFF;

            loop {
                let reason = self.run(&mut backoff).await;
                tracing::error!(
                    error = %reason,
                    backoff_secs = backoff.as_secs(),
                    "Cache invalidation listener error, reconnecting"
                );
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        })
    }

    /// Subscribes and consumes invalidations until the subscription ends.
    ///
    /// Always returns the reason it stopped.
    async fn run(&self, backoff: &mut Duration) -> String {
        match self.subscribe().await {
            Ok(pubsub) => {
                *backoff = INITIAL_BACKOFF;
                self.consume(pubsub).await
            }
            Err(reason) => reason,
        }
    }

    async fn subscribe(&self) -> Result<redis::aio::PubSub, String> {
        let client = redis::Client::open(self.redis_url.as_str())
            .map_err(|e| format!("failed to create Redis client: {e}"))?;

        let mut pubsub = client
            .get_async_pubsub()
            .await
            .map_err(|e| format!("failed to get pub/sub connection: {e}"))?;

        pubsub
            .subscribe(INVALIDATION_CHANNEL)
            .await
            .map_err(|e| format!("failed to subscribe: {e}"))?;

        tracing::info!(channel = INVALIDATION_CHANNEL, "Subscribed to cache invalidations");
        Ok(pubsub)
    }

    async fn consume(&self, mut pubsub: redis::aio::PubSub) -> String {
        use futures_util::StreamExt;

        let mut stream = pubsub.on_message();
        while let Some(msg) = stream.next().await {
            match msg.get_payload::<String>() {
                Ok(key) => {
                    tracing::debug!(key = %key, "received cache invalidation");
                    self.local_cache.remove(&key);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to parse invalidation message payload");
                }
            }
        }

        "pub/sub connection closed".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_reconnects_with_backoff() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = accepted.clone();
        let server = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                drop(socket);
            }
        });

        let handle = CacheInvalidationListener {
            redis_url: format!("redis://{addr}"),
            local_cache: Arc::new(DashMap::new()),
        }
        .start();

        tokio::time::sleep(Duration::from_millis(500)).await;
        let attempts = accepted.load(Ordering::SeqCst);
        assert!(attempts >= 1);
        assert!(attempts <= 2, "reconnected {attempts} times in 500ms");

        handle.abort();
        server.abort();
    }
}
