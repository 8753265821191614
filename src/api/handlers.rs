//! Request Handlers
//!
//! Thin adapters from HTTP to the settlement engine. Identity comes from the
//! gateway headers; a request without one is rejected by the engine itself.

use super::{
    errors::ApiError,
    middleware::{identity_from_headers, RequestId},
    models::*,
};
use crate::settlement::{BetSettlementEngine, DiceBetRequest, SettlementError};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::HeaderMap,
    Extension, Json,
};
use std::sync::Arc;
use uuid::Uuid;

/// Shared application state
pub struct AppState {
    pub engine: Arc<BetSettlementEngine>,
    pub version: String,
}

impl AppState {
    pub fn new(engine: Arc<BetSettlementEngine>) -> Self {
        Self {
            engine,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Health check handler
/// GET /health
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "Running".to_string(),
        version: state.version.clone(),
    })
}

/// Start a new hashchain seeded by the client
/// POST /hashchain
pub async fn rotate_hashchain_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<RotateHashchainRequest>, JsonRejection>,
) -> Result<Json<RotateHashchainResponse>, ApiError> {
    let identity = identity_from_headers(&headers);
    let Json(request) = body.map_err(|e| ApiError::bad_request(request_id.0.clone(), e.body_text()))?;

    let hashchain_id = state
        .engine
        .rotate_hashchain(identity.as_ref(), &request.client_seed)
        .await
        .map_err(|e| ApiError::settlement(request_id.0.clone(), e))?;

    Ok(Json(RotateHashchainResponse { hashchain_id }))
}

/// Place and settle a dice bet
/// POST /dice-bets
pub async fn place_dice_bet_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<PlaceDiceBetRequest>, JsonRejection>,
) -> Result<Json<DiceBetResponse>, ApiError> {
    let identity = identity_from_headers(&headers);
    let Json(request) = body.map_err(|e| ApiError::bad_request(request_id.0.clone(), e.body_text()))?;

    let bet_id = state
        .engine
        .place_bet(
            identity.as_ref(),
            &DiceBetRequest::new(request.wager, request.target, request.currency),
        )
        .await
        .map_err(|e| ApiError::settlement(request_id.0.clone(), e))?;

    // Settled bets are immutable, so reading back after commit is exact
    let bet = state
        .engine
        .store()
        .dice_bet(bet_id)
        .map_err(|e| ApiError::internal_error(request_id.0.clone(), format!("Failed to load bet: {}", e)))?
        .ok_or_else(|| {
            ApiError::internal_error(request_id.0.clone(), format!("Settled bet {} not found", bet_id))
        })?;

    Ok(Json(DiceBetResponse {
        dice_bet: bet.into(),
    }))
}

/// Look up one of the caller's settled bets
/// GET /dice-bets/:id
pub async fn dice_bet_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(bet_id): Path<String>,
) -> Result<Json<DiceBetResponse>, ApiError> {
    let identity = identity_from_headers(&headers)
        .ok_or_else(|| ApiError::settlement(request_id.0.clone(), SettlementError::NotAuthenticated))?;

    let bet_id = Uuid::parse_str(&bet_id).map_err(|_| {
        ApiError::bad_request(request_id.0.clone(), format!("Invalid bet id: {}", bet_id))
    })?;

    let bet = state
        .engine
        .store()
        .dice_bet(bet_id)
        .map_err(|e| ApiError::internal_error(request_id.0.clone(), format!("Failed to load bet: {}", e)))?
        .filter(|bet| bet.identity == identity)
        .ok_or_else(|| ApiError::not_found(request_id.0.clone(), format!("Dice bet {} not found", bet_id)))?;

    Ok(Json(DiceBetResponse {
        dice_bet: bet.into(),
    }))
}
