//! Test doubles for settlement
//!
//! `ScriptedOracle` answers hash requests deterministically and can be told to
//! reject chains, fail, or stall. `FixedOutcome` pins the outcome multiplier so
//! win/loss paths can be driven directly.

use crate::{
    oracle::{HashOracle, HashRequest, HashResponse, OracleError},
    outcome::OutcomeCalculator,
};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
    time::Duration,
};
use uuid::Uuid;

/// In-process oracle whose hashes are SHA-256(chain id || iteration)
#[derive(Default)]
pub struct ScriptedOracle {
    too_old: Mutex<HashSet<Uuid>>,
    unavailable: AtomicBool,
    delay: Mutex<Option<Duration>>,
    requests: Mutex<Vec<HashRequest>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value this oracle returns for `(hashchain_id, iteration)`
    pub fn hash_for(hashchain_id: Uuid, iteration: u32) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(hashchain_id.as_bytes());
        hasher.update(iteration.to_be_bytes());
        hasher.finalize().to_vec()
    }

    /// Answer every later request for this chain with `HashchainTooOld`
    pub fn reject_chain(&self, hashchain_id: Uuid) {
        self.lock_too_old().insert(hashchain_id);
    }

    /// Fail every later request with a transport error
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Sleep this long before answering
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap_or_else(|e| e.into_inner()) = delay;
    }

    /// Every request received so far, in arrival order
    pub fn requests(&self) -> Vec<HashRequest> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn lock_too_old(&self) -> std::sync::MutexGuard<'_, HashSet<Uuid>> {
        self.too_old.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl HashOracle for ScriptedOracle {
    async fn get_hash(&self, request: &HashRequest) -> Result<HashResponse, OracleError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        let delay = *self.delay.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(OracleError::Transport("scripted outage".to_string()));
        }

        if self.lock_too_old().contains(&request.hashchain_id) {
            return Ok(HashResponse::HashchainTooOld);
        }

        Ok(HashResponse::Hash(Self::hash_for(
            request.hashchain_id,
            request.iterations,
        )))
    }
}

/// Outcome calculator that always returns the same multiplier
#[derive(Debug, Clone, Copy)]
pub struct FixedOutcome(pub f64);

impl OutcomeCalculator for FixedOutcome {
    fn compute(&self, _hash: &[u8], _client_seed: &str, _house_edge: f64) -> f64 {
        self.0
    }
}
