//! Outcome calculation from a revealed commitment
//!
//! Anyone holding the commitment value and the chain's client seed can
//! recompute a bet's outcome, which is what makes settlement verifiable.

use sha2::{Digest, Sha256};

/// Maps (commitment value, client seed, house edge) to an outcome multiplier.
///
/// Implementations must be deterministic and free of side effects.
pub trait OutcomeCalculator: Send + Sync {
    fn compute(&self, hash: &[u8], client_seed: &str, house_edge: f64) -> f64;
}

/// Crash-dice multiplier, floored to two decimals and never below 1.00
#[derive(Debug, Clone, Copy, Default)]
pub struct CrashDiceCalculator;

const DRAW_BITS: u32 = 52;

impl CrashDiceCalculator {
    /// Uniform draw in `[0, 1)` from the top 52 bits of SHA-256(hash || seed)
    pub fn draw(hash: &[u8], client_seed: &str) -> f64 {
        let mut hasher = Sha256::new();
        hasher.update(hash);
        hasher.update(client_seed.as_bytes());
        let digest = hasher.finalize();

        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        let bits = u64::from_be_bytes(head) >> (64 - DRAW_BITS);

        bits as f64 / (1u64 << DRAW_BITS) as f64
    }

    pub fn multiplier_from_draw(draw: f64, house_edge: f64) -> f64 {
        let raw = (1.0 - house_edge) / (1.0 - draw);
        ((raw * 100.0).floor() / 100.0).max(1.0)
    }
}

impl OutcomeCalculator for CrashDiceCalculator {
    fn compute(&self, hash: &[u8], client_seed: &str, house_edge: f64) -> f64 {
        Self::multiplier_from_draw(Self::draw(hash, client_seed), house_edge)
    }
}
