//! Minimal JSON-RPC client for a Solana-style node.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use r3l_core::Pubkey;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::{Result, RpcError};

const COMMITMENT: &str = "confirmed";

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct WithContext<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
struct BlockhashInfo {
    blockhash: String,
}

#[derive(Debug, Deserialize)]
struct AccountInfo {
    /// `[payload, encoding]`
    data: (String, String),
}

#[derive(Debug, Deserialize)]
struct ProgramAccount {
    pubkey: String,
    account: AccountInfo,
}

/// Status of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureStatus {
    pub err: Option<Value>,
    pub confirmation_status: Option<String>,
}

impl SignatureStatus {
    pub fn is_confirmed(&self) -> bool {
        matches!(self.confirmation_status.as_deref(), Some("confirmed" | "finalized"))
    }
}

/// Unwrap a JSON-RPC envelope.
fn parse_response<T: DeserializeOwned>(body: Value) -> Result<T> {
    let response: RpcResponse<T> =
        serde_json::from_value(body).map_err(|e| RpcError::Malformed(e.to_string()))?;
    if let Some(err) = response.error {
        let logs = err
            .data
            .as_ref()
            .and_then(|d| d.get("logs"))
            .and_then(Value::as_array)
            .map(|logs| logs.iter().filter_map(Value::as_str).map(String::from).collect())
            .unwrap_or_default();
        return Err(RpcError::Response {
            code: err.code,
            message: err.message,
            logs,
        });
    }
    response
        .result
        .ok_or_else(|| RpcError::Malformed("response has neither result nor error".into()))
}

fn decode_account_data(info: &AccountInfo) -> Result<Vec<u8>> {
    let (payload, encoding) = &info.data;
    if encoding != "base64" {
        return Err(RpcError::Malformed(format!("unexpected account encoding {encoding}")));
    }
    STANDARD
        .decode(payload)
        .map_err(|e| RpcError::Malformed(format!("account data: {e}")))
}

fn decode_blockhash(raw: &str) -> Result<[u8; 32]> {
    let bytes = bs58::decode(raw)
        .into_vec()
        .map_err(|e| RpcError::Malformed(format!("blockhash: {e}")))?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| RpcError::Malformed(format!("blockhash of {} bytes", bytes.len())))
}

pub struct RpcClient {
    url: String,
    http: reqwest::Client,
    max_attempts: u32,
}

impl RpcClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: url.into(),
            http,
            max_attempts: 3,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Issue one JSON-RPC call, retrying only transport failures.
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let body = json!({"jsonrpc": "2.0", "id": 1, "method": method, "params": params});
        let mut attempt = 1;
        loop {
            match self.post(&body).await {
                Ok(value) => return parse_response(value),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    warn!(method, attempt, error = %e, "rpc transport error, retrying");
                    tokio::time::sleep(Duration::from_millis(250 * u64::from(attempt))).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn post(&self, body: &Value) -> Result<Value> {
        let response = self.http.post(&self.url).json(body).send().await?;
        Ok(response.json().await?)
    }

    pub async fn latest_blockhash(&self) -> Result<[u8; 32]> {
        let info: WithContext<BlockhashInfo> = self
            .call("getLatestBlockhash", json!([{"commitment": COMMITMENT}]))
            .await?;
        decode_blockhash(&info.value.blockhash)
    }

    pub async fn account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>> {
        let info: WithContext<Option<AccountInfo>> = self
            .call(
                "getAccountInfo",
                json!([address.to_string(), {"encoding": "base64", "commitment": COMMITMENT}]),
            )
            .await?;
        info.value.as_ref().map(decode_account_data).transpose()
    }

    /// Submit a signed transaction. Preflight simulation runs on the node, so
    /// program failures surface here as [`RpcError::Response`].
    pub async fn send_transaction(&self, wire: &[u8]) -> Result<String> {
        let signature: String = self
            .call(
                "sendTransaction",
                json!([STANDARD.encode(wire), {"encoding": "base64", "preflightCommitment": COMMITMENT}]),
            )
            .await?;
        debug!(%signature, "transaction sent");
        Ok(signature)
    }

    pub async fn signature_status(&self, signature: &str) -> Result<Option<SignatureStatus>> {
        let statuses: WithContext<Vec<Option<SignatureStatus>>> = self
            .call("getSignatureStatuses", json!([[signature]]))
            .await?;
        Ok(statuses.value.into_iter().next().flatten())
    }

    /// Every account owned by `program` whose data starts with `prefix`.
    pub async fn program_accounts(&self, program: &Pubkey, prefix: &[u8]) -> Result<Vec<(Pubkey, Vec<u8>)>> {
        let accounts: Vec<ProgramAccount> = self
            .call(
                "getProgramAccounts",
                json!([
                    program.to_string(),
                    {
                        "encoding": "base64",
                        "commitment": COMMITMENT,
                        "filters": [{"memcmp": {"offset": 0, "bytes": bs58::encode(prefix).into_string()}}]
                    }
                ]),
            )
            .await?;

        accounts
            .into_iter()
            .map(|entry| {
                let address = entry
                    .pubkey
                    .parse::<Pubkey>()
                    .map_err(|e| RpcError::Malformed(format!("pubkey {}: {e}", entry.pubkey)))?;
                Ok((address, decode_account_data(&entry.account)?))
            })
            .collect()
    }
}
