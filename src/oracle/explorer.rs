//! Block explorer clients
//!
//! The oracle talks to explorers only through [`BlockExplorer`], so failover
//! order, rate limiting and caching stay independent of the wire format.

use super::OracleError;
use crate::common::types::Block;
use async_trait::async_trait;
use http_body_util::{BodyExt, Empty};
use hyper::{body::Bytes, StatusCode, Uri};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use serde::{de::DeserializeOwned, Deserialize};
use std::time::Duration;

/// One remote source of blocks
#[async_trait]
pub trait BlockExplorer: Send + Sync {
    /// Endpoint name used in logs and errors
    fn name(&self) -> &str;

    /// Fetch the block at `number`
    async fn block_by_number(&self, number: u64) -> Result<Block, OracleError>;

    /// Fetch the chain head
    async fn latest_block(&self) -> Result<Block, OracleError>;
}

/// `GET {endpoint}/block?number=N` response body
#[derive(Debug, Deserialize)]
struct BlockListResponse {
    #[serde(default)]
    data: Vec<Block>,
}

/// Explorer reached over plain HTTP.
///
/// TLS is expected to be terminated by a local proxy in front of the public
/// explorer.
pub struct HttpExplorer {
    base_url: String,
    client: Client<HttpConnector, Empty<Bytes>>,
    timeout: Duration,
}

impl HttpExplorer {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let client = Client::builder(TokioExecutor::new()).build_http();
        Self {
            base_url,
            client,
            timeout,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path_and_query: &str) -> Result<T, OracleError> {
        let url = format!("{}{}", self.base_url, path_and_query);
        let uri = url.parse::<Uri>().map_err(|e| OracleError::InvalidEndpoint {
            endpoint: self.base_url.clone(),
            reason: e.to_string(),
        })?;

        let timeout_ms = self.timeout.as_millis() as u64;
        let response = tokio::time::timeout(self.timeout, self.client.get(uri))
            .await
            .map_err(|_| OracleError::Timeout {
                endpoint: self.base_url.clone(),
                timeout_ms,
            })?
            .map_err(|e| OracleError::Request {
                endpoint: self.base_url.clone(),
                reason: e.to_string(),
            })?;

        if response.status() != StatusCode::OK {
            return Err(OracleError::BadStatus {
                endpoint: self.base_url.clone(),
                status: response.status().as_u16(),
            });
        }

        let body = tokio::time::timeout(self.timeout, response.into_body().collect())
            .await
            .map_err(|_| OracleError::Timeout {
                endpoint: self.base_url.clone(),
                timeout_ms,
            })?
            .map_err(|e| OracleError::Request {
                endpoint: self.base_url.clone(),
                reason: e.to_string(),
            })?
            .to_bytes();

        if body.is_empty() {
            return Err(OracleError::EmptyPayload {
                endpoint: self.base_url.clone(),
            });
        }

        serde_json::from_slice(&body).map_err(|e| OracleError::Decode {
            endpoint: self.base_url.clone(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl BlockExplorer for HttpExplorer {
    fn name(&self) -> &str {
        &self.base_url
    }

    async fn block_by_number(&self, number: u64) -> Result<Block, OracleError> {
        let response: BlockListResponse = self.get_json(&format!("/block?number={}", number)).await?;
        let block = response
            .data
            .into_iter()
            .next()
            .ok_or_else(|| OracleError::EmptyPayload {
                endpoint: self.base_url.clone(),
            })?;
        check_block(&self.base_url, block, Some(number))
    }

    async fn latest_block(&self) -> Result<Block, OracleError> {
        let block: Block = self.get_json("/block/latest").await?;
        check_block(&self.base_url, block, None)
    }
}

/// Reject payloads that decoded but do not describe the requested block
fn check_block(endpoint: &str, block: Block, expected: Option<u64>) -> Result<Block, OracleError> {
    if block.hash.is_empty() {
        return Err(OracleError::EmptyPayload {
            endpoint: endpoint.to_string(),
        });
    }
    if let Some(expected) = expected {
        if block.number != expected {
            return Err(OracleError::Decode {
                endpoint: endpoint.to_string(),
                reason: format!("asked for block {}, got {}", expected, block.number),
            });
        }
    }
    Ok(block)
}
