//! Scripted origin for exercising the cache without a network.

use async_trait::async_trait;
use bytes::Bytes;
use darkroom_server::images::{FetchError, OriginFetcher};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

enum Scripted {
    Body(Bytes),
    Status(u16),
}

/// Origin fetcher that serves scripted responses and records its calls.
///
/// Unknown URLs answer 404.
#[allow(dead_code)]
#[derive(Default)]
pub struct MockFetcher {
    responses: Mutex<HashMap<String, Scripted>>,
    calls: Mutex<HashMap<String, usize>>,
    active: AtomicUsize,
    peak: AtomicUsize,
    delay: Duration,
}

#[allow(dead_code)]
impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every fetch takes at least `delay`.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn serve(&self, url: &str, body: Bytes) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), Scripted::Body(body));
    }

    pub fn fail(&self, url: &str, status: u16) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), Scripted::Status(status));
    }

    /// Total fetches across all URLs.
    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn calls_for(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    /// Most fetches observed running at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OriginFetcher for MockFetcher {
    async fn fetch(&self, url: &str, deadline: Instant) -> Result<Bytes, FetchError> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default() += 1;

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let slept = tokio::time::timeout_at(deadline, tokio::time::sleep(self.delay)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);

        if slept.is_err() {
            return Err(FetchError::Timeout {
                url: url.to_string(),
            });
        }

        match self.responses.lock().unwrap().get(url) {
            Some(Scripted::Body(body)) => Ok(body.clone()),
            Some(Scripted::Status(status)) => Err(FetchError::Status {
                url: url.to_string(),
                status: *status,
            }),
            None => Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}
