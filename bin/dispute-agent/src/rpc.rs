//! A minimal bitcoind JSON-RPC client covering what the chain watcher needs.

use std::{
    str::FromStr,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use bitcoin::{consensus::encode::deserialize_hex, Block, BlockHash};
use dispute_primitives::types::BitcoinBlockHeight;
use dispute_tracker::chain::{ChainClient, ChainError};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use tracing::trace;

use crate::config::BtcClientConfig;

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

/// Talks to bitcoind over HTTP with basic auth.
#[derive(Debug)]
pub(crate) struct BitcoinRpcClient {
    client: Client,
    url: String,
    user: String,
    pass: String,
    next_id: AtomicU64,
}

impl BitcoinRpcClient {
    pub(crate) fn new(config: &BtcClientConfig, default_timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout.unwrap_or(default_timeout))
            .build()?;

        Ok(Self {
            client,
            url: config.url.clone(),
            user: config.user.clone(),
            pass: config.pass.clone(),
            next_id: AtomicU64::new(0),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, ChainError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        trace!(%method, %id, "calling bitcoind");

        let response = self
            .client
            .post(&self.url)
            .basic_auth(&self.user, Some(&self.pass))
            .json(&json!({
                "jsonrpc": "1.0",
                "id": id,
                "method": method,
                "params": params,
            }))
            .send()
            .await
            .map_err(|e| ChainError::Connection(e.to_string()))?;

        // bitcoind reports rpc errors with non-2xx statuses but a regular body
        let body: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| ChainError::InvalidResponse(format!("{method}: {e}")))?;

        if let Some(RpcError { code, message }) = body.error {
            return Err(ChainError::Rpc { code, message });
        }
        body.result
            .ok_or_else(|| ChainError::InvalidResponse(format!("{method}: empty result")))
    }
}

#[async_trait]
impl ChainClient for BitcoinRpcClient {
    async fn get_block_count(&self) -> Result<BitcoinBlockHeight, ChainError> {
        self.call("getblockcount", json!([])).await
    }

    async fn get_block_hash(&self, height: BitcoinBlockHeight) -> Result<BlockHash, ChainError> {
        let hash: String = self.call("getblockhash", json!([height])).await?;
        BlockHash::from_str(&hash).map_err(|e| ChainError::InvalidResponse(e.to_string()))
    }

    async fn get_block(&self, hash: &BlockHash) -> Result<Block, ChainError> {
        let raw: String = self.call("getblock", json!([hash.to_string(), 0])).await?;
        deserialize_hex(&raw).map_err(|e| ChainError::InvalidResponse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_responses() {
        let ok: RpcResponse<u64> =
            serde_json::from_str(r#"{"result": 812, "error": null, "id": 0}"#).unwrap();
        assert_eq!(ok.result, Some(812));
        assert!(ok.error.is_none());

        let err: RpcResponse<String> = serde_json::from_str(
            r#"{"result": null, "error": {"code": -8, "message": "Block height out of range"}, "id": 1}"#,
        )
        .unwrap();
        assert!(err.result.is_none());
        let err = err.error.unwrap();
        assert_eq!(err.code, -8);
        assert_eq!(err.message, "Block height out of range");
    }

    #[tokio::test]
    async fn test_unreachable_node() {
        let config = BtcClientConfig {
            url: "http://127.0.0.1:1".to_string(),
            user: "user".to_string(),
            pass: "pass".to_string(),
            timeout: Some(Duration::from_secs(1)),
        };
        let client = BitcoinRpcClient::new(&config, Duration::from_secs(1)).unwrap();

        assert!(matches!(
            client.get_block_count().await,
            Err(ChainError::Connection(_))
        ));
    }
}
