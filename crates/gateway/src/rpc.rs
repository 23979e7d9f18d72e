//! JSON-RPC wire types for the gateway front.
//!
//! The gateway speaks standard JSON-RPC 2.0, single object or array batch.
//! Only a fixed method set is recognized; everything else is refused at the
//! batch level before any validation or chain read happens. Request bodies
//! are preserved verbatim for forwarding, so parsing here never normalizes.

use alloy_primitives::{Address, Bytes};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DenyReason;

/// A single JSON-RPC request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    #[serde(default = "default_jsonrpc")]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

fn default_jsonrpc() -> String {
    "2.0".to_string()
}

/// A request body: one call or a batch of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcBatch {
    Single(RpcRequest),
    Batch(Vec<RpcRequest>),
}

impl RpcBatch {
    pub fn requests(&self) -> &[RpcRequest] {
        match self {
            Self::Single(req) => std::slice::from_ref(req),
            Self::Batch(reqs) => reqs,
        }
    }
}

/// How a recognized method is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodClass {
    /// ERC-7677 paymaster data methods; carry a chain id in `params[2]`.
    PaymasterData,
    /// Bundler methods carrying a user operation to authorize.
    UserOperation,
    /// Read-only lookups forwarded without authorization.
    PassThrough,
}

/// Classifies a method name, or `None` for anything outside the fixed set.
pub fn classify_method(method: &str) -> Option<MethodClass> {
    match method {
        "pm_getPaymasterStubData" | "pm_getPaymasterData" => Some(MethodClass::PaymasterData),
        "eth_sendUserOperation" | "eth_estimateUserOperationGas" => {
            Some(MethodClass::UserOperation)
        }
        "eth_getUserOperationByHash" | "eth_getUserOperationReceipt" => {
            Some(MethodClass::PassThrough)
        }
        _ => None,
    }
}

/// An ERC-4337 user operation, v0.6 or v0.7 shape. Fields the policy never
/// inspects ride along untouched in `extra` so forwarding stays lossless.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
    pub sender: Address,
    pub call_data: Bytes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_code: Option<Bytes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory_data: Option<Bytes>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl UserOperation {
    /// The deployment init code, unified across operation versions: the
    /// v0.6 `initCode` blob, or v0.7 `factory ++ factoryData`.
    pub fn init_code(&self) -> Option<Bytes> {
        if let Some(code) = &self.init_code {
            if !code.is_empty() {
                return Some(code.clone());
            }
        }

        self.factory.map(|factory| {
            let mut out = factory.to_vec();
            if let Some(data) = &self.factory_data {
                out.extend_from_slice(data);
            }
            out.into()
        })
    }
}

/// The authorization-relevant content of one sponsorship request.
#[derive(Debug, Clone)]
pub struct SponsorshipItem {
    pub op: UserOperation,
    pub entry_point: Address,
    pub chain_id: Option<u64>,
}

/// Extracts the user operation, entry point, and (for paymaster-data
/// methods) chain id from a request's positional params.
pub fn parse_sponsorship_item(
    request: &RpcRequest,
    class: MethodClass,
) -> Result<SponsorshipItem, DenyReason> {
    let params = request
        .params
        .as_array()
        .ok_or_else(|| malformed("params must be a positional array"))?;

    let op_value = params
        .first()
        .ok_or_else(|| malformed("params[0] (user operation) is required"))?;
    let op: UserOperation = serde_json::from_value(op_value.clone())
        .map_err(|e| malformed(&format!("params[0] is not a user operation: {e}")))?;

    let entry_point: Address = params
        .get(1)
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("params[1] (entry point) is required"))?
        .parse()
        .map_err(|e| malformed(&format!("params[1] is not an address: {e}")))?;

    let chain_id = match class {
        MethodClass::PaymasterData => Some(
            params
                .get(2)
                .ok_or_else(|| malformed("params[2] (chain id) is required"))
                .and_then(parse_chain_id)?,
        ),
        MethodClass::UserOperation => None,
        MethodClass::PassThrough => None,
    };

    Ok(SponsorshipItem {
        op,
        entry_point,
        chain_id,
    })
}

/// Chain ids arrive as JSON numbers or as hex/decimal strings.
fn parse_chain_id(value: &Value) -> Result<u64, DenyReason> {
    if let Some(id) = value.as_u64() {
        return Ok(id);
    }
    if let Some(s) = value.as_str() {
        let parsed = match s.strip_prefix("0x") {
            Some(hex) => u64::from_str_radix(hex, 16),
            None => s.parse(),
        };
        if let Ok(id) = parsed {
            return Ok(id);
        }
    }
    Err(malformed("params[2] is not a chain id"))
}

fn malformed(detail: &str) -> DenyReason {
    DenyReason::MalformedRequest(detail.to_string())
}

/// JSON-RPC error response object.
pub fn error_response(id: &Value, code: i64, message: &str, data: Option<Value>) -> Value {
    let mut error = serde_json::json!({
        "code": code,
        "message": message,
    });
    if let Some(data) = data {
        error["data"] = data;
    }
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": error,
    })
}

/// Maps a denial onto its stable JSON-RPC error object.
pub fn deny_response(id: &Value, reason: &DenyReason) -> Value {
    error_response(
        id,
        reason.code(),
        &reason.to_string(),
        Some(Value::String(reason.reason().to_string())),
    )
}

/// `-32601` for methods outside the permitted set.
pub fn method_not_found(id: &Value, method: &str) -> Value {
    error_response(id, -32601, &format!("method {method} is not available"), None)
}

/// `-32700` for bodies that are not JSON-RPC at all.
pub fn parse_error() -> Value {
    error_response(&Value::Null, -32700, "parse error", None)
}
