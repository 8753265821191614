//! Hash oracle client
//!
//! The oracle owns each hashchain's secret and derives the commitment at a
//! given iteration. The engine only sees the request/response contract:
//! a commitment value, or a rejection because the oracle considers the chain
//! superseded.

use crate::config::OracleConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// What the requested commitment will be used for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum HashContext {
    /// Root commitment of a new chain
    FetchingTerminalHash,
    /// Step commitment settling one dice bet
    CrashDice {
        amount: f64,
        target: f64,
        house_edge: f64,
        player_seed: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashRequest {
    pub hashchain_id: Uuid,
    pub iterations: u32,
    pub context: HashContext,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashResponse {
    Hash(Vec<u8>),
    /// The oracle no longer serves this chain
    HashchainTooOld,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum OracleError {
    #[error("Oracle transport failed: {0}")]
    Transport(String),

    #[error("Oracle did not answer within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Oracle returned HTTP {status}")]
    Status { status: u16 },

    #[error("Unexpected oracle response: {0}")]
    Protocol(String),
}

#[async_trait]
pub trait HashOracle: Send + Sync {
    async fn get_hash(&self, request: &HashRequest) -> Result<HashResponse, OracleError>;
}

/// Response body of `POST {base_url}/hash`
#[derive(Debug, Serialize, Deserialize)]
pub struct WireHashResponse {
    pub resp: Option<WireResp>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum WireResp {
    /// Hex-encoded commitment
    Hash(String),
    HashchainTooOldError,
}

impl WireHashResponse {
    pub fn into_response(self) -> Result<HashResponse, OracleError> {
        match self.resp {
            Some(WireResp::Hash(hex_value)) => hex::decode(&hex_value)
                .map(HashResponse::Hash)
                .map_err(|e| OracleError::Protocol(format!("hash is not hex: {}", e))),
            Some(WireResp::HashchainTooOldError) => Ok(HashResponse::HashchainTooOld),
            None => Err(OracleError::Protocol("missing resp".to_string())),
        }
    }
}

/// JSON-over-HTTP oracle client
pub struct HttpHashOracle {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpHashOracle {
    pub fn new(config: &OracleConfig) -> Result<Self, OracleError> {
        let timeout = Duration::from_millis(config.request_timeout_ms);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OracleError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/hash", config.base_url.trim_end_matches('/')),
            timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl HashOracle for HttpHashOracle {
    async fn get_hash(&self, request: &HashRequest) -> Result<HashResponse, OracleError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OracleError::Timeout {
                        timeout_ms: self.timeout.as_millis() as u64,
                    }
                } else {
                    OracleError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(OracleError::Status {
                status: status.as_u16(),
            });
        }

        let body: WireHashResponse = response
            .json()
            .await
            .map_err(|e| OracleError::Protocol(e.to_string()))?;

        body.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format() {
        let request = HashRequest {
            hashchain_id: Uuid::nil(),
            iterations: 9_999,
            context: HashContext::CrashDice {
                amount: 10.0,
                target: 2.0,
                house_edge: 0.01,
                player_seed: "seed".to_string(),
            },
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["iterations"], 9_999);
        assert_eq!(json["context"]["type"], "crash_dice");
        assert_eq!(json["context"]["value"]["player_seed"], "seed");

        let terminal = serde_json::to_value(HashContext::FetchingTerminalHash).unwrap();
        assert_eq!(terminal["type"], "fetching_terminal_hash");
    }

    #[test]
    fn test_response_decoding() {
        let hash: WireHashResponse =
            serde_json::from_str(r#"{"resp":{"type":"hash","value":"00ff"}}"#).unwrap();
        assert_eq!(hash.into_response().unwrap(), HashResponse::Hash(vec![0x00, 0xff]));

        let too_old: WireHashResponse =
            serde_json::from_str(r#"{"resp":{"type":"hashchain_too_old_error"}}"#).unwrap();
        assert_eq!(too_old.into_response().unwrap(), HashResponse::HashchainTooOld);
    }

    #[test]
    fn test_malformed_responses_are_protocol_errors() {
        let empty: WireHashResponse = serde_json::from_str(r#"{"resp":null}"#).unwrap();
        assert!(matches!(empty.into_response(), Err(OracleError::Protocol(_))));

        let not_hex: WireHashResponse =
            serde_json::from_str(r#"{"resp":{"type":"hash","value":"zz"}}"#).unwrap();
        assert!(matches!(not_hex.into_response(), Err(OracleError::Protocol(_))));

        let unknown = serde_json::from_str::<WireHashResponse>(r#"{"resp":{"type":"teapot"}}"#);
        assert!(unknown.is_err());
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let oracle = HttpHashOracle::new(&OracleConfig {
            base_url: "http://oracle:9090/".to_string(),
            request_timeout_ms: 100,
        })
        .unwrap();
        assert_eq!(oracle.endpoint(), "http://oracle:9090/hash");
    }
}
