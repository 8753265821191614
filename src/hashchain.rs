//! Hashchain lifecycle: lazy creation, rotation and terminal bootstrap
//!
//! A chain starts with a TERMINAL commitment at the configured iteration
//! count. Each bet then consumes one iteration below the latest commitment
//! until the next iteration would fall under 1, at which point the chain is
//! drained and the player must rotate.

use crate::{
    errors::{StorageError, StorageResult},
    oracle::{HashContext, HashOracle, HashRequest, HashResponse, OracleError},
    settlement::SettlementError,
    storage::LedgerTxn,
    types::{HashKind, HashRecord, Hashchain, Identity},
};
use chrono::Utc;
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct HashchainManager {
    oracle: Arc<dyn HashOracle>,
    hash_iterations: u32,
    oracle_timeout: Duration,
}

impl HashchainManager {
    pub fn new(oracle: Arc<dyn HashOracle>, hash_iterations: u32, oracle_timeout: Duration) -> Self {
        Self {
            oracle,
            hash_iterations,
            oracle_timeout,
        }
    }

    /// Return the identity's active chain, inserting an unseeded one if none exists.
    ///
    /// The insert is conditional on the active pointer being empty while this
    /// transaction holds its lock; a caller that finds it taken re-reads the
    /// winner's chain instead.
    pub fn get_or_create_active(&self, txn: &LedgerTxn<'_>, identity: &Identity) -> StorageResult<Hashchain> {
        if let Some(id) = txn.active_pointer(identity)? {
            if let Some(chain) = txn.lock_hashchain(id)? {
                if chain.active {
                    return Ok(chain);
                }
            }
        }

        if let Some(winner) = txn.lock_active_pointer(identity)? {
            return match txn.lock_hashchain(winner)? {
                Some(chain) if chain.active => {
                    debug!(hashchain_id = %chain.id, "Active hashchain created concurrently, using it");
                    Ok(chain)
                }
                _ => Err(StorageError::CorruptedData(format!(
                    "active pointer for {} references missing or inactive hashchain {}",
                    identity, winner
                ))),
            };
        }

        let chain = Hashchain {
            id: Uuid::new_v4(),
            identity: identity.clone(),
            client_seed: String::new(),
            active: true,
            created_at: Utc::now(),
        };
        txn.insert_hashchain(&chain)?;
        txn.set_active_pointer(identity, chain.id)?;

        info!(user_id = %identity.user_id, hashchain_id = %chain.id, "Created hashchain on first bet");
        Ok(chain)
    }

    /// Retire the identity's active chain and start a seeded one with its terminal hash
    pub async fn rotate(
        &self,
        txn: &mut LedgerTxn<'_>,
        identity: &Identity,
        client_seed: &str,
    ) -> Result<Hashchain, SettlementError> {
        if let Some(current) = txn.lock_active_pointer(identity)? {
            if let Some(mut retired) = txn.lock_hashchain(current)? {
                retired.active = false;
                txn.put_hashchain(&retired)?;
                debug!(hashchain_id = %retired.id, "Retired hashchain");
            }
        }

        let chain = Hashchain {
            id: Uuid::new_v4(),
            identity: identity.clone(),
            client_seed: client_seed.to_string(),
            active: true,
            created_at: Utc::now(),
        };
        txn.insert_hashchain(&chain)?;
        txn.set_active_pointer(identity, chain.id)?;

        self.insert_terminal(txn, &chain).await?;
        Ok(chain)
    }

    /// Most recent commitment of the chain, if it has been bootstrapped
    pub fn latest_commitment(&self, txn: &LedgerTxn<'_>, hashchain_id: Uuid) -> StorageResult<Option<HashRecord>> {
        txn.latest_hash(hashchain_id)
    }

    /// Latest commitment of the chain, fetching its terminal hash first if it has none
    pub async fn ensure_terminal(
        &self,
        txn: &mut LedgerTxn<'_>,
        chain: &Hashchain,
    ) -> Result<HashRecord, SettlementError> {
        if let Some(latest) = self.latest_commitment(txn, chain.id)? {
            return Ok(latest);
        }
        self.insert_terminal(txn, chain).await
    }

    async fn insert_terminal(
        &self,
        txn: &mut LedgerTxn<'_>,
        chain: &Hashchain,
    ) -> Result<HashRecord, SettlementError> {
        let value = self
            .request_hash(HashRequest {
                hashchain_id: chain.id,
                iterations: self.hash_iterations,
                context: HashContext::FetchingTerminalHash,
            })
            .await?;

        let record = HashRecord {
            id: Uuid::new_v4(),
            kind: HashKind::TerminalHash,
            hashchain_id: chain.id,
            identity: chain.identity.clone(),
            iteration: self.hash_iterations,
            value,
            created_at: Utc::now(),
        };
        txn.insert_hash(&record)?;

        info!(
            hashchain_id = %chain.id,
            iteration = record.iteration,
            "Recorded terminal hash"
        );
        Ok(record)
    }

    /// Ask the oracle for a commitment, bounded by the oracle timeout
    pub async fn request_hash(&self, request: HashRequest) -> Result<Vec<u8>, SettlementError> {
        let response = tokio::time::timeout(self.oracle_timeout, self.oracle.get_hash(&request))
            .await
            .map_err(|_| OracleError::Timeout {
                timeout_ms: self.oracle_timeout.as_millis() as u64,
            })??;

        match response {
            HashResponse::Hash(value) => Ok(value),
            HashResponse::HashchainTooOld => {
                warn!(
                    hashchain_id = %request.hashchain_id,
                    iterations = request.iterations,
                    "Oracle rejected hashchain as too old"
                );
                Err(SettlementError::ChainTooOld)
            }
        }
    }
}
