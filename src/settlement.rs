//! Bet settlement
//!
//! `place_bet` runs the whole wager in one ledger transaction: validation,
//! fund locks, hashchain step, oracle commitment, payout and statistics.
//! Any error drops the transaction, so nothing of a failed bet is persisted.

use crate::{
    config::EngineConfig,
    errors::StorageError,
    hashchain::HashchainManager,
    oracle::{HashContext, HashOracle, HashRequest, OracleError},
    outcome::OutcomeCalculator,
    storage::LedgerStore,
    types::{DiceBet, HashKind, HashRecord, Hashchain, Identity},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Settlement failures, one variant per client-visible kind
#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    #[error("You must be logged in")]
    NotAuthenticated,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Currency not found: {0}")]
    CurrencyNotFound(String),

    #[error("Insufficient funds for wager")]
    InsufficientFunds,

    #[error("House cannot afford payout")]
    HouseCannotAffordPayout,

    #[error("Hashchain too old")]
    ChainTooOld,

    #[error("Hashchain drained")]
    HashchainDrained,

    #[error("Oracle unavailable: {0}")]
    OracleUnavailable(#[from] OracleError),

    #[error("Ledger error: {0}")]
    Storage(#[from] StorageError),
}

impl SettlementError {
    /// Stable code reported to clients
    pub fn code(&self) -> &'static str {
        match self {
            SettlementError::NotAuthenticated => "NOT_AUTHENTICATED",
            SettlementError::InvalidInput(_) => "INVALID_INPUT",
            SettlementError::CurrencyNotFound(_) => "CURRENCY_NOT_FOUND",
            SettlementError::InsufficientFunds => "INSUFFICIENT_FUNDS",
            SettlementError::HouseCannotAffordPayout => "HOUSE_CANNOT_AFFORD_PAYOUT",
            SettlementError::ChainTooOld | SettlementError::HashchainDrained => "HASHCHAIN_EXPIRED",
            SettlementError::OracleUnavailable(_) => "ORACLE_UNAVAILABLE",
            SettlementError::Storage(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether rotating the hashchain lets the caller bet again
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SettlementError::ChainTooOld | SettlementError::HashchainDrained)
    }
}

/// Parameters of one dice wager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiceBetRequest {
    pub wager: f64,
    pub target: f64,
    pub currency: String,
}

impl DiceBetRequest {
    pub fn new(wager: f64, target: f64, currency: impl Into<String>) -> Self {
        Self {
            wager,
            target,
            currency: currency.into(),
        }
    }
}

/// Signed payout of a bet: the wager times `target - 1` on a win, the lost wager otherwise
pub fn compute_net(wager: f64, target: f64, actual: f64) -> f64 {
    if target <= actual {
        wager * (target - 1.0)
    } else {
        -wager
    }
}

/// Entry point for the two client operations: hashchain rotation and dice bets
pub struct BetSettlementEngine {
    store: Arc<LedgerStore>,
    hashchains: HashchainManager,
    outcome: Arc<dyn OutcomeCalculator>,
    config: EngineConfig,
}

impl BetSettlementEngine {
    pub fn new(
        store: Arc<LedgerStore>,
        oracle: Arc<dyn HashOracle>,
        outcome: Arc<dyn OutcomeCalculator>,
        config: EngineConfig,
        oracle_timeout: Duration,
    ) -> Self {
        let hashchains = HashchainManager::new(oracle, config.hash_iterations, oracle_timeout);
        Self {
            store,
            hashchains,
            outcome,
            config,
        }
    }

    pub fn store(&self) -> &Arc<LedgerStore> {
        &self.store
    }

    /// Replace the identity's active hashchain with a new one seeded by `client_seed`
    pub async fn rotate_hashchain(
        &self,
        identity: Option<&Identity>,
        client_seed: &str,
    ) -> Result<Uuid, SettlementError> {
        let identity = identity.ok_or(SettlementError::NotAuthenticated)?;

        let mut txn = self.store.begin();
        let chain = self.hashchains.rotate(&mut txn, identity, client_seed).await?;
        txn.commit()?;

        info!(
            user_id = %identity.user_id,
            casino_id = %identity.casino_id,
            hashchain_id = %chain.id,
            "Rotated hashchain"
        );
        Ok(chain.id)
    }

    /// Settle one dice bet and return its id
    pub async fn place_bet(
        &self,
        identity: Option<&Identity>,
        request: &DiceBetRequest,
    ) -> Result<Uuid, SettlementError> {
        let identity = identity.ok_or(SettlementError::NotAuthenticated)?;
        self.validate(request)?;

        let DiceBetRequest { wager, target, ref currency } = *request;
        let house_edge = self.config.house_edge;

        let mut txn = self.store.begin();

        if txn.currency(&identity.casino_id, currency)?.is_none() {
            return Err(SettlementError::CurrencyNotFound(currency.clone()));
        }

        // Balance before bankroll, on every path that locks both
        let mut balance = match txn.lock_balance(identity, currency)? {
            Some(balance) if balance.amount >= wager => balance,
            _ => return Err(SettlementError::InsufficientFunds),
        };

        let mut bankroll = match txn.lock_bankroll(&identity.casino_id, currency)? {
            Some(bankroll) if bankroll.amount >= wager * (target - 1.0) => bankroll,
            _ => return Err(SettlementError::HouseCannotAffordPayout),
        };

        let chain = self.hashchains.get_or_create_active(&txn, identity)?;
        let previous = self.hashchains.ensure_terminal(&mut txn, &chain).await?;

        let iterations = previous.iteration.saturating_sub(1);
        if iterations < 1 {
            warn!(
                user_id = %identity.user_id,
                hashchain_id = %chain.id,
                "Hashchain drained, rotation required"
            );
            return Err(SettlementError::HashchainDrained);
        }

        let step = self.request_step(&chain, iterations, request, house_edge).await?;
        txn.insert_hash(&step)?;

        let actual = self.outcome.compute(&step.value, &chain.client_seed, house_edge);
        let net = compute_net(wager, target, actual);

        balance.amount += net;
        bankroll.amount -= net;
        bankroll.bets += 1;
        bankroll.wagered += wager;
        bankroll.expected_value += wager * house_edge;

        let bet = DiceBet {
            id: step.id,
            identity: identity.clone(),
            wager,
            target,
            actual,
            net,
            currency_key: currency.clone(),
            created_at: Utc::now(),
        };

        txn.put_balance(&balance)?;
        txn.put_bankroll(&bankroll)?;
        txn.insert_dice_bet(&bet)?;
        txn.commit()?;

        info!(
            user_id = %identity.user_id,
            hashchain_id = %chain.id,
            iteration = iterations,
            wager,
            target,
            actual,
            net,
            "Settled dice bet"
        );
        Ok(bet.id)
    }

    fn validate(&self, request: &DiceBetRequest) -> Result<(), SettlementError> {
        if !request.wager.is_finite() || request.wager <= 0.0 {
            return Err(SettlementError::InvalidInput("Wager must be positive".to_string()));
        }

        if !request.target.is_finite() || request.target <= 1.0 {
            return Err(SettlementError::InvalidInput(
                "Target must be greater than 1".to_string(),
            ));
        }

        if request.target > self.config.max_target {
            return Err(SettlementError::InvalidInput(format!(
                "Target must be less than or equal to {}",
                self.config.max_target
            )));
        }

        Ok(())
    }

    async fn request_step(
        &self,
        chain: &Hashchain,
        iterations: u32,
        request: &DiceBetRequest,
        house_edge: f64,
    ) -> Result<HashRecord, SettlementError> {
        debug!(hashchain_id = %chain.id, iterations, "Requesting step hash");

        let value = self
            .hashchains
            .request_hash(HashRequest {
                hashchain_id: chain.id,
                iterations,
                context: HashContext::CrashDice {
                    amount: request.wager,
                    target: request.target,
                    house_edge,
                    player_seed: chain.client_seed.clone(),
                },
            })
            .await?;

        Ok(HashRecord {
            id: Uuid::new_v4(),
            kind: HashKind::DiceBet,
            hashchain_id: chain.id,
            identity: chain.identity.clone(),
            iteration: iterations,
            value,
            created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_net() {
        assert_eq!(compute_net(10.0, 2.0, 2.5), 10.0);
        assert_eq!(compute_net(10.0, 2.0, 1.5), -10.0);
    }

    #[test]
    fn test_target_equal_to_outcome_wins() {
        assert_eq!(compute_net(10.0, 2.0, 2.0), 10.0);
        assert_eq!(compute_net(4.0, 1.5, 1.49), -4.0);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(SettlementError::ChainTooOld.code(), "HASHCHAIN_EXPIRED");
        assert_eq!(SettlementError::HashchainDrained.code(), "HASHCHAIN_EXPIRED");
        assert_eq!(SettlementError::InsufficientFunds.code(), "INSUFFICIENT_FUNDS");
        assert_eq!(
            SettlementError::OracleUnavailable(OracleError::Timeout { timeout_ms: 5 }).code(),
            "ORACLE_UNAVAILABLE"
        );
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(SettlementError::ChainTooOld.is_recoverable());
        assert!(SettlementError::HashchainDrained.is_recoverable());
        assert!(!SettlementError::HouseCannotAffordPayout.is_recoverable());
        assert!(!SettlementError::Storage(StorageError::LockTimeout("x".into())).is_recoverable());
    }
}
