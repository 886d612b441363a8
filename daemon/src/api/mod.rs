//! REST surface: user routes under `/api`, admin routes under `/admin`
//! behind the shared bearer token. Both are thin translations onto the
//! ledger use cases; all policy lives in the core.

use std::fmt::{self, Display, Formatter};

use actix_web::{
    dev::ServiceRequest,
    error::ErrorUnauthorized,
    http::StatusCode,
    web, HttpResponse, ResponseError,
};
use actix_web_httpauth::{extractors::bearer::BearerAuth, middleware::HttpAuthentication};
use log::debug;
use metrics::counter;
use mint_common::{
    api::{
        ConsumeParams, ConsumeResult, CreateCodeParams, GrantParams, GrantResult, HistoryParams,
        ProcessPaymentParams, RedeemParams,
    },
    currency::{EntryType, Kind, RedemptionCode},
};
use serde::Deserialize;

use crate::core::{error::LedgerError, ledger::Ledger, storage::Storage};

/// Shared secret expected on the admin surface. `None` disables it.
#[derive(Clone)]
pub struct AdminToken(pub Option<String>);

#[derive(Debug)]
pub struct ApiError(pub LedgerError);

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        counter!("error", "kind" => err.label()).increment(1);
        debug!("request failed: {:#}", err);
        Self(err)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        let mut error = serde_json::Map::new();
        error.insert(
            "kind".to_string(),
            serde_json::Value::String(self.0.label().to_string()),
        );
        error.insert(
            "message".to_string(),
            serde_json::Value::String(format!("{:#}", self.0)),
        );
        let mut body = serde_json::Map::new();
        body.insert("error".to_string(), serde_json::Value::Object(error));
        HttpResponse::build(self.status_code()).json(serde_json::Value::Object(body))
    }
}

pub fn configure_user<S: Storage>(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/consume", web::post().to(consume::<S>))
            .route("/payment/process", web::post().to(process_payment::<S>))
            .route("/redeem", web::post().to(redeem::<S>))
            .route("/balance/{user_id}", web::get().to(balance::<S>))
            .route("/history/{user_id}", web::get().to(history::<S>)),
    );
}

pub fn configure_admin<S: Storage>(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin")
            .wrap(HttpAuthentication::bearer(validate_admin))
            .route("/grant", web::post().to(admin_grant::<S>))
            .route("/codes", web::post().to(admin_create_code::<S>)),
    );
}

async fn validate_admin(
    req: ServiceRequest,
    credentials: BearerAuth,
) -> Result<ServiceRequest, (actix_web::Error, ServiceRequest)> {
    let expected = req
        .app_data::<web::Data<AdminToken>>()
        .and_then(|token| token.0.clone());
    match expected {
        Some(token) if credentials.token() == token => Ok(req),
        Some(_) => Err((ErrorUnauthorized("Invalid admin token"), req)),
        None => Err((ErrorUnauthorized("Admin surface is disabled"), req)),
    }
}

async fn consume<S: Storage>(
    ledger: web::Data<Ledger<S>>,
    body: web::Json<ConsumeParams>,
) -> Result<web::Json<ConsumeResult>, ApiError> {
    let params = body.into_inner();
    let result = ledger
        .consume(&params.user_id, &params.kind, params.amount, params.metadata)
        .await?;
    Ok(web::Json(result))
}

async fn process_payment<S: Storage>(
    ledger: web::Data<Ledger<S>>,
    body: web::Json<ProcessPaymentParams>,
) -> Result<HttpResponse, ApiError> {
    let result = ledger.process_payment(body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(result))
}

async fn redeem<S: Storage>(
    ledger: web::Data<Ledger<S>>,
    body: web::Json<RedeemParams>,
) -> Result<HttpResponse, ApiError> {
    let params = body.into_inner();
    let result = ledger.redeem_code(&params.code, &params.user_id).await?;
    Ok(HttpResponse::Ok().json(result))
}

async fn balance<S: Storage>(
    ledger: web::Data<Ledger<S>>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let user_id = path.into_inner();
    let result = ledger.get_balance(&user_id).await?;
    Ok(HttpResponse::Ok().json(result))
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    #[serde(default)]
    limit: usize,
    #[serde(default)]
    offset: usize,
    kind: Option<Kind>,
    #[serde(rename = "type")]
    entry_type: Option<EntryType>,
}

async fn history<S: Storage>(
    ledger: web::Data<Ledger<S>>,
    path: web::Path<String>,
    query: web::Query<HistoryQuery>,
) -> Result<HttpResponse, ApiError> {
    let query = query.into_inner();
    let params = HistoryParams {
        user_id: path.into_inner(),
        limit: query.limit,
        offset: query.offset,
        kind: query.kind,
        entry_type: query.entry_type,
    };
    let result = ledger.get_history(params).await?;
    Ok(HttpResponse::Ok().json(result))
}

async fn admin_grant<S: Storage>(
    ledger: web::Data<Ledger<S>>,
    body: web::Json<GrantParams>,
) -> Result<web::Json<GrantResult>, ApiError> {
    let params = body.into_inner();
    let result = ledger
        .grant(&params.user_id, &params.kind, params.amount, params.metadata)
        .await?;
    Ok(web::Json(result))
}

async fn admin_create_code<S: Storage>(
    ledger: web::Data<Ledger<S>>,
    body: web::Json<CreateCodeParams>,
) -> Result<web::Json<RedemptionCode>, ApiError> {
    let code = ledger.create_code(body.into_inner()).await?;
    Ok(web::Json(code))
}
