//! EVM JSON-RPC client with primary → fallback failover and circuit breaker.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use alloy_primitives::{Address, B256};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::Error;

const CIRCUIT_BREAKER_THRESHOLD: u64 = 5;
const CIRCUIT_BREAKER_WINDOW_MS: u64 = 30_000;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

struct CircuitState {
    failures: u64,
    last_failure_ms: u64,
    open: bool,
}

/// One raw log object from `eth_getLogs`, quantities left as hex strings.
#[derive(Debug, Clone, Deserialize)]
pub struct RawLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    #[serde(rename = "blockNumber")]
    pub block_number: String,
    #[serde(rename = "logIndex")]
    pub log_index: String,
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// JSON-RPC 2.0 client with primary → fallback failover.
///
/// Transport failures count against a circuit breaker; once it opens, calls
/// route to the fallback until the window elapses and the primary is retried.
/// Execution reverts are contract-level outcomes: they never trip the breaker
/// and never trigger failover.
pub struct EvmRpcClient {
    http: reqwest::Client,
    primary_url: String,
    fallback_url: String,
    next_id: AtomicU64,
    circuit: Mutex<CircuitState>,
    total_failovers: AtomicU64,
    requests_total: AtomicU64,
}

impl EvmRpcClient {
    pub fn new(primary_url: &str, fallback_url: &str, timeout: Duration) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| Error::Config(format!("HTTP client build failed: {e}")))?;
        info!(
            primary = primary_url,
            fallback = fallback_url,
            "RPC client initialized with failover"
        );
        Ok(Self {
            http,
            primary_url: primary_url.to_string(),
            fallback_url: fallback_url.to_string(),
            next_id: AtomicU64::new(1),
            circuit: Mutex::new(CircuitState {
                failures: 0,
                last_failure_ms: 0,
                open: false,
            }),
            total_failovers: AtomicU64::new(0),
            requests_total: AtomicU64::new(0),
        })
    }

    pub fn primary_url(&self) -> &str {
        &self.primary_url
    }

    pub fn fallback_url(&self) -> &str {
        &self.fallback_url
    }

    // --- Typed eth_* wrappers ---

    /// `eth_chainId`.
    pub async fn chain_id(&self) -> Result<u64, Error> {
        let out = self.request("eth_chainId", json!([])).await?;
        parse_quantity(&out)
    }

    /// `eth_blockNumber`.
    pub async fn block_number(&self) -> Result<u64, Error> {
        let out = self.request("eth_blockNumber", json!([])).await?;
        parse_quantity(&out)
    }

    /// Read-only `eth_call` against `to`; returns the raw ABI return data.
    pub async fn call(&self, to: Address, calldata: &[u8]) -> Result<Vec<u8>, Error> {
        let params = json!([
            { "to": to.to_string(), "data": encode_hex(calldata) },
            "latest"
        ]);
        let out = self.request("eth_call", params).await?;
        let s = out
            .as_str()
            .ok_or_else(|| Error::Rpc("eth_call returned non-string data".into()))?;
        decode_hex_str(s)
    }

    /// `eth_getLogs` for the given filter object.
    pub async fn get_logs(&self, filter: Value) -> Result<Vec<RawLog>, Error> {
        let out = self.request("eth_getLogs", json!([filter])).await?;
        serde_json::from_value(out).map_err(|e| Error::Rpc(format!("malformed log response: {e}")))
    }

    /// `eth_sendRawTransaction`; returns the transaction hash.
    pub async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256, Error> {
        let out = self
            .request("eth_sendRawTransaction", json!([encode_hex(raw)]))
            .await?;
        let s = out
            .as_str()
            .ok_or_else(|| Error::Rpc("non-string transaction hash".into()))?;
        s.parse()
            .map_err(|e| Error::Rpc(format!("malformed transaction hash: {e}")))
    }

    /// Quick connectivity check. Returns "ok", "degraded", or an error.
    pub async fn health_check(&self) -> Result<&'static str, Error> {
        let body = self.body("eth_blockNumber", json!([]));
        if self.request_one(&self.primary_url, &body).await.is_ok() {
            return Ok("ok");
        }
        match self.request_one(&self.fallback_url, &body).await {
            Ok(_) => Ok("degraded"),
            Err(e) => Err(Error::Rpc(format!("both RPCs unreachable: {e}"))),
        }
    }

    // --- Request core ---

    fn body(&self, method: &str, params: Value) -> Value {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params })
    }

    /// Issue one request with automatic failover.
    async fn request(&self, method: &str, params: Value) -> Result<Value, Error> {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        let body = self.body(method, params);
        let first = if self.is_circuit_open() {
            &self.fallback_url
        } else {
            &self.primary_url
        };
        match self.request_one(first, &body).await {
            Ok(v) => {
                self.record_success();
                Ok(v)
            }
            // A revert means the transport worked; the contract said no.
            Err(Error::Reverted(msg)) => {
                self.record_success();
                Err(Error::Reverted(msg))
            }
            Err(e) => {
                self.record_failure();
                warn!(method, error = %e, "Primary RPC request failed, trying fallback");
                match self.request_one(&self.fallback_url, &body).await {
                    Ok(v) => Ok(v),
                    Err(Error::Reverted(msg)) => Err(Error::Reverted(msg)),
                    Err(e2) => Err(Error::Rpc(format!(
                        "{method} failed on both RPCs: primary={e}, fallback={e2}"
                    ))),
                }
            }
        }
    }

    async fn request_one(&self, url: &str, body: &Value) -> Result<Value, Error> {
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Rpc(format!("request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Rpc(format!("HTTP {status}")));
        }
        let rpc: RpcResponse = response
            .json()
            .await
            .map_err(|e| Error::Rpc(format!("malformed response: {e}")))?;
        if let Some(err) = rpc.error {
            return Err(classify_rpc_error(err.code, &err.message));
        }
        rpc.result
            .ok_or_else(|| Error::Rpc("response missing result".into()))
    }

    // --- Failover / circuit breaker ---

    fn record_success(&self) {
        let mut circuit = self.circuit.lock().unwrap_or_else(|e| e.into_inner());
        if circuit.failures > 0 {
            info!(primary = %self.primary_url, "Primary RPC recovered");
            circuit.failures = 0;
            circuit.open = false;
        }
    }

    fn record_failure(&self) {
        let mut circuit = self.circuit.lock().unwrap_or_else(|e| e.into_inner());
        circuit.failures += 1;
        circuit.last_failure_ms = now_ms();
        if circuit.failures >= CIRCUIT_BREAKER_THRESHOLD && !circuit.open {
            circuit.open = true;
            self.total_failovers.fetch_add(1, Ordering::Relaxed);
            warn!(
                failures = circuit.failures,
                fallback = %self.fallback_url,
                "Circuit breaker opened, routing to fallback"
            );
        }
    }

    pub fn is_circuit_open(&self) -> bool {
        let mut circuit = self.circuit.lock().unwrap_or_else(|e| e.into_inner());
        if !circuit.open {
            return false;
        }
        if now_ms() - circuit.last_failure_ms > CIRCUIT_BREAKER_WINDOW_MS {
            circuit.open = false;
            circuit.failures = 0;
            info!(primary = %self.primary_url, "Circuit breaker half-open, retrying primary");
            return false;
        }
        true
    }

    pub fn failover_count(&self) -> u64 {
        self.total_failovers.load(Ordering::Relaxed)
    }

    pub fn request_count(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }
}

/// Execution reverts (EIP-1474 code 3, or the "revert" wording some nodes
/// attach to -32000) classify separately from transport failures.
fn classify_rpc_error(code: i64, message: &str) -> Error {
    if code == 3 || message.to_ascii_lowercase().contains("revert") {
        Error::Reverted(message.to_string())
    } else {
        Error::Rpc(format!("RPC error {code}: {message}"))
    }
}

// --- Hex helpers ---

pub(crate) fn encode_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

pub(crate) fn decode_hex_str(s: &str) -> Result<Vec<u8>, Error> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(stripped).map_err(|e| Error::Rpc(format!("malformed hex data {s:?}: {e}")))
}

pub(crate) fn parse_quantity_str(s: &str) -> Result<u64, Error> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(stripped, 16)
        .map_err(|e| Error::Rpc(format!("malformed quantity {s:?}: {e}")))
}

pub(crate) fn parse_quantity(value: &Value) -> Result<u64, Error> {
    let s = value
        .as_str()
        .ok_or_else(|| Error::Rpc(format!("non-string quantity: {value}")))?;
    parse_quantity_str(s)
}

pub(crate) fn format_quantity(v: u64) -> String {
    format!("0x{v:x}")
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
