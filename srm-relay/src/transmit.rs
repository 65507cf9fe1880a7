//! Regulator transport
//!
//! Thin HTTP layer: it sends exactly the signed bytes and reports what came
//! back. Classification lives in [`crate::classify`]; this module never
//! interprets a response beyond status and text.

use async_trait::async_trait;
use reqwest::Client;
use srm_sign::SignedHeaders;
use std::time::Duration;

/// Raw result of one send attempt, before classification.
#[derive(Debug, Clone)]
pub enum RawOutcome {
    /// The regulator answered; any status
    Response { status: u16, body: String },
    /// No HTTP response (connect failure, timeout, TLS error)
    TransportError { timeout: bool, detail: String },
}

/// Transport seam for the delivery worker.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, path: &str, body: &str, headers: &SignedHeaders) -> RawOutcome;
}

/// HTTPS transmitter against the regulator endpoint.
#[derive(Debug, Clone)]
pub struct HttpTransmitter {
    client: Client,
    base_url: String,
}

impl HttpTransmitter {
    pub fn new(base_url: &str, timeout_ms: u64) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Transport for HttpTransmitter {
    async fn send(&self, path: &str, body: &str, headers: &SignedHeaders) -> RawOutcome {
        let url = format!("{}{}", self.base_url, path);

        let mut request = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.to_string());
        for (name, value) in headers.iter() {
            request = request.header(name, value);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                RawOutcome::Response { status, body }
            }
            Err(e) => RawOutcome::TransportError {
                timeout: e.is_timeout(),
                detail: e.to_string(),
            },
        }
    }
}
