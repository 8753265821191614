//! API Request and Response Models

use crate::types::DiceBet;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// POST /hashchain
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotateHashchainRequest {
    pub client_seed: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotateHashchainResponse {
    pub hashchain_id: Uuid,
}

/// POST /dice-bets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceDiceBetRequest {
    pub wager: f64,
    pub target: f64,
    pub currency: String,
}

/// Body of POST /dice-bets and GET /dice-bets/:id
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiceBetResponse {
    pub dice_bet: DiceBetView,
}

/// Settled bet as shown to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiceBetView {
    pub id: Uuid,
    pub wager: f64,
    pub target: f64,
    pub actual: f64,
    pub net: f64,
    pub currency_key: String,
    pub created_at: DateTime<Utc>,
}

impl From<DiceBet> for DiceBetView {
    fn from(bet: DiceBet) -> Self {
        Self {
            id: bet.id,
            wager: bet.wager,
            target: bet.target,
            actual: bet.actual,
            net: bet.net,
            currency_key: bet.currency_key,
            created_at: bet.created_at,
        }
    }
}
