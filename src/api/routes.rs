//! Route Definitions

use super::handlers::*;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Build the API router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/hashchain", post(rotate_hashchain_handler))
        .route("/dice-bets", post(place_dice_bet_handler))
        .route("/dice-bets/:id", get(dice_bet_handler))
        .with_state(state)
}
