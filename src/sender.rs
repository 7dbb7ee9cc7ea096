use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;

/// Raw response from one delivery attempt. Interpreting the status
/// code (2xx vs. not) is the engine's job.
#[derive(Debug, Clone)]
pub struct SenderResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
    pub duration: Duration,
}

/// Transport-level failure of a delivery attempt. A timeout is
/// treated identically to any other network failure by the retry
/// state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SenderError {
    Timeout,
    Network(String),
}

impl fmt::Display for SenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SenderError::Timeout => write!(f, "request timed out"),
            SenderError::Network(detail) => write!(f, "network error: {}", detail),
        }
    }
}

impl std::error::Error for SenderError {}

/// Transport seam for delivery attempts.
///
/// The engine depends only on this trait so tests can substitute a
/// deterministic fake for the real HTTP client.
#[async_trait]
pub trait HttpSender: Send + Sync {
    async fn send(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        body: &[u8],
        timeout: Duration,
    ) -> Result<SenderResponse, SenderError>;
}

/// Production sender backed by `reqwest`.
pub struct ReqwestSender {
    client: reqwest::Client,
}

impl ReqwestSender {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for ReqwestSender {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpSender for ReqwestSender {
    async fn send(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        body: &[u8],
        timeout: Duration,
    ) -> Result<SenderResponse, SenderError> {
        let started = Instant::now();

        let mut request = self
            .client
            .post(url)
            .timeout(timeout)
            .body(body.to_vec());
        for (name, value) in headers {
            request = request.header(name, value);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                let headers = response
                    .headers()
                    .iter()
                    .filter_map(|(name, value)| {
                        value
                            .to_str()
                            .ok()
                            .map(|v| (name.as_str().to_string(), v.to_string()))
                    })
                    .collect();
                let body = response.text().await.unwrap_or_default();
                Ok(SenderResponse {
                    status,
                    headers,
                    body,
                    duration: started.elapsed(),
                })
            }
            Err(err) => {
                if err.is_timeout() {
                    Err(SenderError::Timeout)
                } else {
                    Err(SenderError::Network(err.to_string()))
                }
            }
        }
    }
}
