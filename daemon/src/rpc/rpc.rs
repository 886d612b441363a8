use actix_web::{web, HttpResponse};
use log::{debug, trace};
use metrics::counter;
use mint_common::api::{
    ConsumeParams, GetBalanceParams, GrantParams, HistoryParams, ProcessPaymentParams,
    RedeemParams,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::core::{ledger::Ledger, storage::Storage};

use super::{error_body, success_body, RpcError, JSON_RPC_VERSION};

#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

pub fn configure<S: Storage>(cfg: &mut web::ServiceConfig) {
    cfg.route("/json_rpc", web::post().to(json_rpc::<S>));
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, RpcError> {
    let params = params.ok_or(RpcError::ExpectedParams)?;
    Ok(serde_json::from_value(params)?)
}

fn to_result<T: serde::Serialize>(value: T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(RpcError::SerializeResponse)
}

async fn json_rpc<S: Storage>(ledger: web::Data<Ledger<S>>, body: web::Bytes) -> HttpResponse {
    let request: RpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(_) => {
            return HttpResponse::Ok().json(error_body(Value::Null, &RpcError::ParseBodyError))
        }
    };
    let id = request.id.unwrap_or(Value::Null);
    if request.jsonrpc != JSON_RPC_VERSION {
        return HttpResponse::Ok().json(error_body(id, &RpcError::InvalidVersion));
    }

    trace!("rpc request: {}", request.method);
    match dispatch(ledger.get_ref(), &request.method, request.params).await {
        Ok(result) => HttpResponse::Ok().json(success_body(id, result)),
        Err(error) => {
            if let RpcError::Ledger(err) = &error {
                counter!("error", "kind" => err.label()).increment(1);
                debug!("rpc method {} failed: {:#}", request.method, err);
            }
            HttpResponse::Ok().json(error_body(id, &error))
        }
    }
}

async fn dispatch<S: Storage>(
    ledger: &Ledger<S>,
    method: &str,
    params: Option<Value>,
) -> Result<Value, RpcError> {
    match method {
        "get_balance" => {
            let params: GetBalanceParams = parse_params(params)?;
            to_result(ledger.get_balance(&params.user_id).await?)
        }
        "get_transaction_history" => {
            let params: HistoryParams = parse_params(params)?;
            to_result(ledger.get_history(params).await?)
        }
        "grant" => {
            let params: GrantParams = parse_params(params)?;
            to_result(
                ledger
                    .grant(
                        &params.user_id,
                        &params.kind,
                        params.amount,
                        params.metadata,
                    )
                    .await?,
            )
        }
        "consume" => {
            let params: ConsumeParams = parse_params(params)?;
            to_result(
                ledger
                    .consume(
                        &params.user_id,
                        &params.kind,
                        params.amount,
                        params.metadata,
                    )
                    .await?,
            )
        }
        "process_payment" => {
            let params: ProcessPaymentParams = parse_params(params)?;
            to_result(ledger.process_payment(params).await?)
        }
        "redeem_code" => {
            let params: RedeemParams = parse_params(params)?;
            to_result(ledger.redeem_code(&params.code, &params.user_id).await?)
        }
        _ => Err(RpcError::MethodNotFound(method.to_string())),
    }
}
