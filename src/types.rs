//! Ledger entities: identities, hashchains, commitments, balances and bets

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Player context every hashchain, balance and bankroll row is scoped to.
///
/// Resolved by the session layer before reaching the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub experience_id: String,
    pub casino_id: String,
}

impl Identity {
    pub fn new(
        user_id: impl Into<String>,
        experience_id: impl Into<String>,
        casino_id: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            experience_id: experience_id.into(),
            casino_id: casino_id.into(),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.user_id, self.experience_id, self.casino_id)
    }
}

/// A per-identity sequence of commitments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hashchain {
    pub id: Uuid,
    pub identity: Identity,
    pub client_seed: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Commitment record kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HashKind {
    /// Root commitment of a chain
    TerminalHash,
    /// Step commitment consumed by a dice bet
    DiceBet,
}

impl fmt::Display for HashKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashKind::TerminalHash => write!(f, "TERMINAL_HASH"),
            HashKind::DiceBet => write!(f, "DICE_BET"),
        }
    }
}

/// One entry of a hashchain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashRecord {
    pub id: Uuid,
    pub kind: HashKind,
    pub hashchain_id: Uuid,
    pub identity: Identity,
    pub iteration: u32,
    #[serde(with = "hex_bytes")]
    pub value: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

/// Currency accepted by a casino
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Currency {
    pub casino_id: String,
    pub key: String,
    pub display_unit_name: String,
    pub display_unit_scale: u32,
}

/// Player funds in one currency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub identity: Identity,
    pub currency_key: String,
    pub amount: f64,
}

/// House funds and running statistics for one casino/currency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bankroll {
    pub casino_id: String,
    pub currency_key: String,
    pub amount: f64,
    pub bets: u64,
    pub wagered: f64,
    pub expected_value: f64,
}

impl Bankroll {
    pub fn new(casino_id: impl Into<String>, currency_key: impl Into<String>) -> Self {
        Self {
            casino_id: casino_id.into(),
            currency_key: currency_key.into(),
            amount: 0.0,
            bets: 0,
            wagered: 0.0,
            expected_value: 0.0,
        }
    }
}

/// A settled wager, keyed by the commitment it consumed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiceBet {
    pub id: Uuid,
    pub identity: Identity,
    pub wager: f64,
    pub target: f64,
    pub actual: f64,
    pub net: f64,
    pub currency_key: String,
    pub created_at: DateTime<Utc>,
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_display() {
        let identity = Identity::new("u1", "e1", "c1");
        assert_eq!(identity.to_string(), "u1:e1:c1");
    }

    #[test]
    fn test_hash_kind_serialization() {
        let json = serde_json::to_string(&HashKind::TerminalHash).unwrap();
        assert_eq!(json, "\"TERMINAL_HASH\"");
        assert_eq!(HashKind::DiceBet.to_string(), "DICE_BET");
    }

    #[test]
    fn test_hash_record_value_is_hex() {
        let record = HashRecord {
            id: Uuid::new_v4(),
            kind: HashKind::DiceBet,
            hashchain_id: Uuid::new_v4(),
            identity: Identity::new("u1", "e1", "c1"),
            iteration: 9_999,
            value: vec![0xde, 0xad, 0xbe, 0xef],
            created_at: Utc::now(),
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["value"], "deadbeef");

        let decoded: HashRecord = serde_json::from_value(json).unwrap();
        assert_eq!(decoded.value, record.value);
    }
}
