//! Hashdice - Provably-Fair Dice Settlement
//!
//! Settles dice wagers against per-player hashchains. Each bet consumes one
//! commitment from an external hash oracle, and the outcome is derived from
//! that commitment and the player's client seed so it can be verified after
//! the fact. Balance, bankroll, commitment and bet rows of one wager commit
//! atomically in a RocksDB transaction.

pub mod api;
pub mod config;
pub mod errors;
pub mod hashchain;
pub mod oracle;
pub mod outcome;
pub mod settlement;
pub mod storage;
pub mod testing;
pub mod types;

pub use config::{ConfigLoader, HashdiceConfig};
pub use errors::{HashdiceError, HashdiceResult, StorageError};
pub use hashchain::HashchainManager;
pub use oracle::{HashContext, HashOracle, HashRequest, HashResponse, HttpHashOracle, OracleError};
pub use outcome::{CrashDiceCalculator, OutcomeCalculator};
pub use settlement::{BetSettlementEngine, DiceBetRequest, SettlementError};
pub use storage::{LedgerStore, LedgerTxn};
pub use types::{Balance, Bankroll, Currency, DiceBet, HashKind, HashRecord, Hashchain, Identity};
