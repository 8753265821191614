//! Ledger storage on RocksDB pessimistic transactions
//!
//! Every row is a JSON value under a string key. Row locks are RocksDB
//! `get_for_update` locks held until the transaction commits or is dropped;
//! dropping an uncommitted [`LedgerTxn`] discards all of its writes.
//!
//! Key layout:
//!
//! ```text
//! currency:{casino}:{key}                    Currency
//! balance:{user}:{experience}:{casino}:{ccy} Balance
//! bankroll:{casino}:{ccy}                    Bankroll
//! hashchain:row:{id}                         Hashchain
//! hashchain:active:{user}:{experience}:{casino}  Uuid of the active chain
//! hash:{chain}:{iteration:010}               HashRecord
//! dice_bet:{id}                              DiceBet
//! ```
//!
//! Free-form ids are escaped (`%` as `%25`, `:` as `%3A`) before joining.
//!
//! Commitment keys sort by ascending iteration, so the first key under a
//! chain's prefix is its most recent commitment.

use crate::{
    config::StorageConfig,
    errors::{StorageError, StorageResult},
    types::{Balance, Bankroll, Currency, DiceBet, HashRecord, Hashchain, Identity},
};
use rocksdb::{
    Direction, IteratorMode, Options, Transaction, TransactionDB, TransactionDBOptions,
    TransactionOptions, WriteOptions,
};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    borrow::Cow,
    path::{Path, PathBuf},
};
use uuid::Uuid;

/// Escape a free-form id so that `:`-joined keys stay unambiguous
fn segment(id: &str) -> Cow<'_, str> {
    if id.contains([':', '%']) {
        Cow::Owned(id.replace('%', "%25").replace(':', "%3A"))
    } else {
        Cow::Borrowed(id)
    }
}

fn currency_key(casino_id: &str, key: &str) -> String {
    format!("currency:{}:{}", segment(casino_id), segment(key))
}

fn balance_key(identity: &Identity, currency_key: &str) -> String {
    format!("balance:{}:{}", identity_segment(identity), segment(currency_key))
}

fn bankroll_key(casino_id: &str, currency_key: &str) -> String {
    format!("bankroll:{}:{}", segment(casino_id), segment(currency_key))
}

fn hashchain_key(id: Uuid) -> String {
    format!("hashchain:row:{}", id)
}

fn active_hashchain_key(identity: &Identity) -> String {
    format!("hashchain:active:{}", identity_segment(identity))
}

fn identity_segment(identity: &Identity) -> String {
    format!(
        "{}:{}:{}",
        segment(&identity.user_id),
        segment(&identity.experience_id),
        segment(&identity.casino_id)
    )
}

fn hash_prefix(hashchain_id: Uuid) -> String {
    format!("hash:{}:", hashchain_id)
}

fn hash_key(hashchain_id: Uuid, iteration: u32) -> String {
    format!("hash:{}:{:010}", hashchain_id, iteration)
}

fn dice_bet_key(id: Uuid) -> String {
    format!("dice_bet:{}", id)
}

fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> StorageResult<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| StorageError::CorruptedData(format!("Failed to decode {}: {}", key, e)))
}

fn encode<T: Serialize>(key: &str, row: &T) -> StorageResult<Vec<u8>> {
    serde_json::to_vec(row)
        .map_err(|e| StorageError::WriteFailed(format!("Failed to encode {}: {}", key, e)))
}

/// Shared handle to the ledger database
pub struct LedgerStore {
    db: TransactionDB,
    path: PathBuf,
    lock_timeout_ms: i64,
}

impl LedgerStore {
    /// Open (or create) the ledger at `config.data_directory`
    pub fn open(config: &StorageConfig) -> StorageResult<Self> {
        let path = PathBuf::from(&config.data_directory);

        if config.clear_on_start && path.exists() {
            tracing::warn!(path = %path.display(), "Clearing ledger on startup");
            std::fs::remove_dir_all(&path).map_err(|e| {
                StorageError::DatabaseOpenFailed(format!("Failed to clear {}: {}", path.display(), e))
            })?;
        }

        let lock_timeout_ms = config.lock_timeout_ms as i64;

        let mut opts = Options::default();
        opts.create_if_missing(true);

        let mut txn_db_opts = TransactionDBOptions::default();
        txn_db_opts.set_txn_lock_timeout(lock_timeout_ms);
        txn_db_opts.set_default_lock_timeout(lock_timeout_ms);

        let db: TransactionDB = TransactionDB::open(&opts, &txn_db_opts, &path)
            .map_err(|e| StorageError::DatabaseOpenFailed(e.to_string()))?;

        tracing::info!(path = %path.display(), lock_timeout_ms, "Ledger opened");

        Ok(Self {
            db,
            path,
            lock_timeout_ms,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Start a transaction. Dropping it without [`LedgerTxn::commit`] rolls back.
    pub fn begin(&self) -> LedgerTxn<'_> {
        let mut txn_opts = TransactionOptions::default();
        txn_opts.set_lock_timeout(self.lock_timeout_ms);
        txn_opts.set_deadlock_detect(true);

        LedgerTxn {
            txn: self.db.transaction_opt(&WriteOptions::default(), &txn_opts),
        }
    }

    fn get_row<T: DeserializeOwned>(&self, key: &str) -> StorageResult<Option<T>> {
        self.db
            .get(key.as_bytes())
            .map_err(StorageError::from_read)?
            .map(|bytes| decode(key, &bytes))
            .transpose()
    }

    pub fn currency(&self, casino_id: &str, key: &str) -> StorageResult<Option<Currency>> {
        self.get_row(&currency_key(casino_id, key))
    }

    pub fn balance(&self, identity: &Identity, currency_key: &str) -> StorageResult<Option<Balance>> {
        self.get_row(&balance_key(identity, currency_key))
    }

    pub fn bankroll(&self, casino_id: &str, currency_key: &str) -> StorageResult<Option<Bankroll>> {
        self.get_row(&bankroll_key(casino_id, currency_key))
    }

    pub fn hashchain(&self, id: Uuid) -> StorageResult<Option<Hashchain>> {
        self.get_row(&hashchain_key(id))
    }

    pub fn active_hashchain(&self, identity: &Identity) -> StorageResult<Option<Hashchain>> {
        match self.get_row::<Uuid>(&active_hashchain_key(identity))? {
            Some(id) => self.hashchain(id),
            None => Ok(None),
        }
    }

    pub fn dice_bet(&self, id: Uuid) -> StorageResult<Option<DiceBet>> {
        self.get_row(&dice_bet_key(id))
    }

    /// All commitments of a chain, most recent first
    pub fn hashes_for_chain(&self, hashchain_id: Uuid) -> StorageResult<Vec<HashRecord>> {
        let prefix = hash_prefix(hashchain_id);
        let mut records = Vec::new();

        let iter = self
            .db
            .iterator(IteratorMode::From(prefix.as_bytes(), Direction::Forward));
        for item in iter {
            let (key, value) = item.map_err(StorageError::from_read)?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            records.push(decode(&String::from_utf8_lossy(&key), &value)?);
        }

        Ok(records)
    }

    /// Make `key` an accepted currency for `casino_id`. Idempotent.
    pub fn register_currency(&self, currency: &Currency) -> StorageResult<()> {
        let txn = self.begin();
        let key = currency_key(&currency.casino_id, &currency.key);
        txn.lock_row::<Currency>(&key)?;
        txn.put_row(&key, currency)?;

        if txn.lock_bankroll(&currency.casino_id, &currency.key)?.is_none() {
            txn.put_bankroll(&Bankroll::new(&currency.casino_id, &currency.key))?;
        }

        txn.commit()
    }

    /// Add `delta` to a player's balance, creating the row on first credit
    pub fn credit_balance(
        &self,
        identity: &Identity,
        currency_key: &str,
        delta: f64,
    ) -> StorageResult<Balance> {
        if !delta.is_finite() {
            return Err(StorageError::ConstraintViolation(format!(
                "balance delta must be finite, got {}",
                delta
            )));
        }

        let txn = self.begin();
        txn.require_currency(&identity.casino_id, currency_key)?;

        let mut balance = txn.lock_balance(identity, currency_key)?.unwrap_or_else(|| Balance {
            identity: identity.clone(),
            currency_key: currency_key.to_string(),
            amount: 0.0,
        });
        balance.amount += delta;
        if balance.amount < 0.0 {
            return Err(StorageError::ConstraintViolation(format!(
                "balance for {} in {} would become negative",
                identity, currency_key
            )));
        }

        txn.put_balance(&balance)?;
        txn.commit()?;
        Ok(balance)
    }

    /// Add `delta` to the house bankroll of a registered currency
    pub fn fund_bankroll(&self, casino_id: &str, currency_key: &str, delta: f64) -> StorageResult<Bankroll> {
        if !delta.is_finite() {
            return Err(StorageError::ConstraintViolation(format!(
                "bankroll delta must be finite, got {}",
                delta
            )));
        }

        let txn = self.begin();
        txn.require_currency(casino_id, currency_key)?;

        let mut bankroll = txn
            .lock_bankroll(casino_id, currency_key)?
            .unwrap_or_else(|| Bankroll::new(casino_id, currency_key));
        bankroll.amount += delta;
        if bankroll.amount < 0.0 {
            return Err(StorageError::ConstraintViolation(format!(
                "bankroll for {} in {} would become negative",
                casino_id, currency_key
            )));
        }

        txn.put_bankroll(&bankroll)?;
        txn.commit()?;
        Ok(bankroll)
    }
}

/// One ledger transaction.
///
/// `lock_*` methods take exclusive row locks that are held until commit or
/// drop. Callers acquire them in the order balance, bankroll, active
/// hashchain pointer, hashchain row.
pub struct LedgerTxn<'db> {
    txn: Transaction<'db, TransactionDB>,
}

impl<'db> LedgerTxn<'db> {
    fn read_row<T: DeserializeOwned>(&self, key: &str) -> StorageResult<Option<T>> {
        self.txn
            .get(key.as_bytes())
            .map_err(StorageError::from_read)?
            .map(|bytes| decode(key, &bytes))
            .transpose()
    }

    fn lock_row<T: DeserializeOwned>(&self, key: &str) -> StorageResult<Option<T>> {
        self.txn
            .get_for_update(key.as_bytes(), true)
            .map_err(StorageError::from_read)?
            .map(|bytes| decode(key, &bytes))
            .transpose()
    }

    fn put_row<T: Serialize>(&self, key: &str, row: &T) -> StorageResult<()> {
        let bytes = encode(key, row)?;
        self.txn
            .put(key.as_bytes(), bytes)
            .map_err(StorageError::from_write)
    }

    /// Write `row` under `key`, failing if the key is already taken
    fn insert_unique<T: Serialize>(&self, key: &str, row: &T) -> StorageResult<()> {
        let existing = self
            .txn
            .get_for_update(key.as_bytes(), true)
            .map_err(StorageError::from_read)?;
        if existing.is_some() {
            return Err(StorageError::ConstraintViolation(format!("{} already exists", key)));
        }
        self.put_row(key, row)
    }

    fn require_currency(&self, casino_id: &str, key: &str) -> StorageResult<Currency> {
        self.currency(casino_id, key)?.ok_or_else(|| {
            StorageError::ConstraintViolation(format!(
                "currency {} is not registered for casino {}",
                key, casino_id
            ))
        })
    }

    pub fn currency(&self, casino_id: &str, key: &str) -> StorageResult<Option<Currency>> {
        self.read_row(&currency_key(casino_id, key))
    }

    pub fn lock_balance(&self, identity: &Identity, currency_key: &str) -> StorageResult<Option<Balance>> {
        self.lock_row(&balance_key(identity, currency_key))
    }

    pub fn put_balance(&self, balance: &Balance) -> StorageResult<()> {
        self.put_row(&balance_key(&balance.identity, &balance.currency_key), balance)
    }

    pub fn lock_bankroll(&self, casino_id: &str, currency_key: &str) -> StorageResult<Option<Bankroll>> {
        self.lock_row(&bankroll_key(casino_id, currency_key))
    }

    pub fn put_bankroll(&self, bankroll: &Bankroll) -> StorageResult<()> {
        self.put_row(&bankroll_key(&bankroll.casino_id, &bankroll.currency_key), bankroll)
    }

    /// Id of the identity's active chain, read without locking
    pub fn active_pointer(&self, identity: &Identity) -> StorageResult<Option<Uuid>> {
        self.read_row(&active_hashchain_key(identity))
    }

    /// Id of the identity's active chain under an exclusive lock on the pointer
    pub fn lock_active_pointer(&self, identity: &Identity) -> StorageResult<Option<Uuid>> {
        self.lock_row(&active_hashchain_key(identity))
    }

    pub fn set_active_pointer(&self, identity: &Identity, hashchain_id: Uuid) -> StorageResult<()> {
        self.put_row(&active_hashchain_key(identity), &hashchain_id)
    }

    pub fn lock_hashchain(&self, id: Uuid) -> StorageResult<Option<Hashchain>> {
        self.lock_row(&hashchain_key(id))
    }

    pub fn insert_hashchain(&self, hashchain: &Hashchain) -> StorageResult<()> {
        self.insert_unique(&hashchain_key(hashchain.id), hashchain)
    }

    pub fn put_hashchain(&self, hashchain: &Hashchain) -> StorageResult<()> {
        self.put_row(&hashchain_key(hashchain.id), hashchain)
    }

    /// Most recent commitment of a chain, including uncommitted writes of this transaction
    pub fn latest_hash(&self, hashchain_id: Uuid) -> StorageResult<Option<HashRecord>> {
        let prefix = hash_prefix(hashchain_id);
        let mut iter = self
            .txn
            .iterator(IteratorMode::From(prefix.as_bytes(), Direction::Forward));

        match iter.next() {
            Some(Ok((key, value))) if key.starts_with(prefix.as_bytes()) => {
                decode(&String::from_utf8_lossy(&key), &value).map(Some)
            }
            Some(Err(e)) => Err(StorageError::from_read(e)),
            _ => Ok(None),
        }
    }

    /// Append a commitment; an iteration can be recorded once per chain
    pub fn insert_hash(&self, record: &HashRecord) -> StorageResult<()> {
        self.insert_unique(&hash_key(record.hashchain_id, record.iteration), record)
    }

    pub fn insert_dice_bet(&self, bet: &DiceBet) -> StorageResult<()> {
        self.insert_unique(&dice_bet_key(bet.id), bet)
    }

    pub fn commit(self) -> StorageResult<()> {
        self.txn
            .commit()
            .map_err(|e| StorageError::CommitFailed(e.to_string()))
    }
}
