//! Origin fetching.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use darkroom_core::config::ImageConfig;
use reqwest::StatusCode;
use tokio::time::Instant;

/// Origin fetch failure.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("origin returned {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("transport error fetching {url}: {message}")]
    Transport { url: String, message: String },

    #[error("timed out fetching {url}")]
    Timeout { url: String },

    #[error("origin response for {url} exceeds {limit} bytes")]
    TooLarge { url: String, limit: u64 },
}

impl FetchError {
    /// Short label for metrics.
    pub fn cause(&self) -> &'static str {
        match self {
            Self::Status { .. } => "status",
            Self::Transport { .. } => "transport",
            Self::Timeout { .. } => "timeout",
            Self::TooLarge { .. } => "too_large",
        }
    }
}

/// Source of original image bytes.
#[async_trait]
pub trait OriginFetcher: Send + Sync + 'static {
    /// Fetch `url` with a single GET, giving up at `deadline`.
    async fn fetch(&self, url: &str, deadline: Instant) -> Result<Bytes, FetchError>;
}

/// HTTP origin fetcher.
pub struct HttpFetcher {
    client: reqwest::Client,
    max_bytes: u64,
}

impl HttpFetcher {
    pub fn new(config: &ImageConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.fetch_timeout())
            .build()?;
        Ok(Self {
            client,
            max_bytes: config.max_origin_bytes,
        })
    }

    async fn fetch_body(&self, url: &str) -> Result<Bytes, FetchError> {
        let transport = |e: reqwest::Error| {
            if e.is_timeout() {
                FetchError::Timeout {
                    url: url.to_string(),
                }
            } else {
                FetchError::Transport {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            }
        };
        let too_large = || FetchError::TooLarge {
            url: url.to_string(),
            limit: self.max_bytes,
        };

        let mut response = self.client.get(url).send().await.map_err(transport)?;
        if response.status() != StatusCode::OK {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        if response
            .content_length()
            .is_some_and(|len| len > self.max_bytes)
        {
            return Err(too_large());
        }

        let mut body = BytesMut::new();
        while let Some(chunk) = response.chunk().await.map_err(transport)? {
            if (body.len() + chunk.len()) as u64 > self.max_bytes {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body.freeze())
    }
}

#[async_trait]
impl OriginFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, deadline: Instant) -> Result<Bytes, FetchError> {
        match tokio::time::timeout_at(deadline, self.fetch_body(url)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                url: url.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use std::time::Duration;

    fn can_bind_localhost() -> bool {
        std::net::TcpListener::bind("127.0.0.1:0").is_ok()
    }

    fn fetcher(max_origin_bytes: u64) -> HttpFetcher {
        let config = ImageConfig {
            max_origin_bytes,
            ..ImageConfig::default()
        };
        HttpFetcher::new(&config).unwrap()
    }

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(10)
    }

    #[tokio::test]
    async fn test_fetch_ok_returns_body() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: localhost bind not permitted");
            return;
        }
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/img.png");
                then.status(200).body("pixels");
            })
            .await;

        let body = fetcher(1024)
            .fetch(&server.url("/img.png"), deadline())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(body, Bytes::from("pixels"));
    }

    #[tokio::test]
    async fn test_non_200_is_status_error() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: localhost bind not permitted");
            return;
        }
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/missing.png");
                then.status(404);
            })
            .await;

        let err = fetcher(1024)
            .fetch(&server.url("/missing.png"), deadline())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }));
        assert_eq!(err.cause(), "status");
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: localhost bind not permitted");
            return;
        }
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/big.png");
                then.status(200).body(vec![0u8; 4096]);
            })
            .await;

        let err = fetcher(1024)
            .fetch(&server.url("/big.png"), deadline())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::TooLarge { limit: 1024, .. }));
    }

    #[tokio::test]
    async fn test_deadline_exhaustion_is_timeout() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: localhost bind not permitted");
            return;
        }
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/slow.png");
                then.status(200)
                    .body("late")
                    .delay(Duration::from_millis(500));
            })
            .await;

        let err = fetcher(1024)
            .fetch(
                &server.url("/slow.png"),
                Instant::now() + Duration::from_millis(50),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_origin_is_transport_error() {
        let err = fetcher(1024)
            .fetch("http://127.0.0.1:1/nothing.png", deadline())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FetchError::Transport { .. } | FetchError::Timeout { .. }
        ));
    }
}
