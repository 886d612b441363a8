use serde_json::{Error as SerdeError, Value};
use thiserror::Error;

use crate::core::error::LedgerError;

use super::JSON_RPC_VERSION;

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("Invalid body in request")]
    ParseBodyError,
    #[error("Expected jsonrpc set to '2.0'")]
    InvalidVersion,
    #[error("Method '{}' in request was not found", _0)]
    MethodNotFound(String),
    #[error("Invalid params: {}", _0)]
    InvalidParams(#[from] SerdeError),
    #[error("Expected parameters for this method but was not present")]
    ExpectedParams,
    #[error(transparent)]
    SerializeResponse(SerdeError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl RpcError {
    pub fn code(&self) -> i16 {
        match self {
            // JSON RPC errors
            Self::ParseBodyError => -32700,
            Self::InvalidVersion => -32600,
            Self::MethodNotFound(_) => -32601,
            Self::InvalidParams(_) | Self::ExpectedParams => -32602,
            Self::SerializeResponse(_) => -32603,
            // Domain errors keep their own code table
            Self::Ledger(err) => err.rpc_code(),
        }
    }
}

// Build JSON envelopes manually instead of using json!() to avoid unwrap

pub fn success_body(id: Value, result: Value) -> Value {
    let mut obj = serde_json::Map::new();
    obj.insert(
        "jsonrpc".to_string(),
        Value::String(JSON_RPC_VERSION.to_string()),
    );
    obj.insert("id".to_string(), id);
    obj.insert("result".to_string(), result);
    Value::Object(obj)
}

pub fn error_body(id: Value, error: &RpcError) -> Value {
    let mut error_obj = serde_json::Map::new();
    error_obj.insert("code".to_string(), Value::Number(error.code().into()));
    error_obj.insert("message".to_string(), Value::String(format!("{:#}", error)));

    let mut obj = serde_json::Map::new();
    obj.insert(
        "jsonrpc".to_string(),
        Value::String(JSON_RPC_VERSION.to_string()),
    );
    obj.insert("id".to_string(), id);
    obj.insert("error".to_string(), Value::Object(error_obj));
    Value::Object(obj)
}
