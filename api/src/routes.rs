//! Claim service routes (Axum).
//!
//! Two write-path operations (eligibility resolve, phase claim submission)
//! plus read-only record/listing endpoints for the admin view, health probes
//! and Prometheus metrics. Handlers are generic over [`ClaimStore`] so the
//! whole router runs against the in-memory store in tests.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use serde_json::json;

use claims_core::{
    resolve_eligibility, ClaimError, ClaimStore, EligibilityError, Phase, Snapshots, StoreError,
    VestingLedger,
};

pub struct AppState<S> {
    pub ledger: VestingLedger<S>,
    pub snapshots: Arc<Snapshots>,
    pub store: Arc<S>,
    /// Absent in tests; `/metrics` then renders nothing.
    pub metrics: Option<PrometheusHandle>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            ledger: self.ledger.clone(),
            snapshots: Arc::clone(&self.snapshots),
            store: Arc::clone(&self.store),
            metrics: self.metrics.clone(),
        }
    }
}

/// Normalized API failure: machine-checkable kind plus a human reason.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "error": self.kind, "message": self.message });
        (self.status, Json(body)).into_response()
    }
}

impl From<ClaimError> for ApiError {
    fn from(err: ClaimError) -> Self {
        let message = err.to_string();
        match err {
            ClaimError::MissingFields => {
                ApiError::new(StatusCode::BAD_REQUEST, "missing_fields", message)
            }
            ClaimError::InvalidPhase(_) => {
                ApiError::new(StatusCode::BAD_REQUEST, "invalid_phase", message)
            }
            ClaimError::WalletBlocked => {
                ApiError::new(StatusCode::FORBIDDEN, "wallet_blocked", message)
            }
            ClaimError::NoEligibleNfts => {
                ApiError::new(StatusCode::FORBIDDEN, "no_eligible_nfts", message)
            }
            ClaimError::PhaseAlreadyClaimed(_) => {
                ApiError::new(StatusCode::CONFLICT, "phase_already_claimed", message)
            }
            ClaimError::PrerequisiteMissing { .. } => {
                ApiError::new(StatusCode::BAD_REQUEST, "prerequisite_phase_missing", message)
            }
            ClaimError::Store(e) => e.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(_) => ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "store_unavailable",
                err.to_string(),
            ),
            _ => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
                err.to_string(),
            ),
        }
    }
}

impl From<EligibilityError> for ApiError {
    fn from(err: EligibilityError) -> Self {
        let message = err.to_string();
        match err {
            EligibilityError::Blocked => {
                ApiError::new(StatusCode::FORBIDDEN, "wallet_blocked", message)
            }
            EligibilityError::NotEligible => {
                ApiError::new(StatusCode::NOT_FOUND, "not_eligible", message)
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRequest {
    #[serde(default)]
    pub eth_address: String,
    #[serde(default)]
    pub sol_address: String,
    /// One of the five phase keys; omitted means TGE.
    #[serde(default)]
    pub phase: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimResponse {
    pub success: bool,
    pub phase: Phase,
    pub tokens: u64,
}

#[derive(Debug, Deserialize)]
pub struct Paging {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl Paging {
    fn normalize(self) -> (u32, u32) {
        let page = self.page.unwrap_or(1).max(1);
        let page_size = self.page_size.unwrap_or(25).clamp(1, 100);
        (page, page_size)
    }
}

pub fn router<S: ClaimStore>(state: AppState<S>) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/readyz", get(ready::<S>))
        .route("/metrics", get(render_metrics::<S>))
        .route("/v1/eligibility/:address", get(eligibility::<S>))
        .route("/v1/claims", post(submit_claim::<S>).get(list_claims::<S>))
        .route("/v1/claims/:address", get(claim_record::<S>))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn ready<S: ClaimStore>(State(state): State<AppState<S>>) -> Result<Response, ApiError> {
    state.store.ping().await?;
    Ok((StatusCode::OK, "ready").into_response())
}

async fn render_metrics<S: ClaimStore>(State(state): State<AppState<S>>) -> impl IntoResponse {
    let body = state
        .metrics
        .as_ref()
        .map(|h| h.render())
        .unwrap_or_default();
    (StatusCode::OK, body)
}

/// GET /v1/eligibility/{address}
///
/// Read-only resolver: owned tokens with tier and full reward, plus the
/// total potential airdrop. Reserves nothing.
async fn eligibility<S: ClaimStore>(
    State(state): State<AppState<S>>,
    Path(address): Path<String>,
) -> Result<Response, ApiError> {
    if address.trim().is_empty() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "missing_fields",
            "missing address",
        ));
    }

    let result = resolve_eligibility(&state.snapshots, &address);
    counter!(
        "api_eligibility_total",
        "result" => if result.is_ok() { "ok" } else { "rejected" }
    )
    .increment(1);
    let eligibility = result?;
    Ok(Json(eligibility).into_response())
}

/// POST /v1/claims
///
/// Submit one phase claim. The phase key defaults to TGE and is validated
/// before anything else, matching the ledger's check order.
async fn submit_claim<S: ClaimStore>(
    State(state): State<AppState<S>>,
    Json(req): Json<ClaimRequest>,
) -> Result<Response, ApiError> {
    let phase = match req.phase.as_deref() {
        None | Some("") => Phase::Tge,
        Some(raw) => raw
            .parse::<Phase>()
            .map_err(|_| ClaimError::InvalidPhase(raw.to_string()))?,
    };

    let result = state
        .ledger
        .submit_phase_claim(&req.eth_address, &req.sol_address, phase)
        .await;
    counter!(
        "api_claims_total",
        "result" => if result.is_ok() { "ok" } else { "rejected" }
    )
    .increment(1);

    let receipt = result?;
    Ok(Json(ClaimResponse {
        success: true,
        phase: receipt.phase,
        tokens: receipt.tokens,
    })
    .into_response())
}

/// GET /v1/claims/{address}
async fn claim_record<S: ClaimStore>(
    State(state): State<AppState<S>>,
    Path(address): Path<String>,
) -> Result<Response, ApiError> {
    let record = state.ledger.record_for(&address).await?;
    match record {
        Some(record) => Ok(Json(record).into_response()),
        None => Err(ApiError::new(
            StatusCode::NOT_FOUND,
            "not_found",
            "no claim record for this wallet",
        )),
    }
}

/// GET /v1/claims?page=&page_size=
async fn list_claims<S: ClaimStore>(
    State(state): State<AppState<S>>,
    Query(paging): Query<Paging>,
) -> Result<Response, ApiError> {
    let (page, page_size) = paging.normalize();
    let page = state.store.list(page, page_size).await?;
    Ok(Json(page).into_response())
}
