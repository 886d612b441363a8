mod error;
mod rpc;

pub use error::*;
pub use rpc::*;

pub const JSON_RPC_VERSION: &str = "2.0";
