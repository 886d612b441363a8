use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::time::TimestampMillis;

use super::{Kind, Metadata};

/// Why a code cannot currently be redeemed. All variants surface to clients
/// as the same "not redeemable" failure; the split only feeds logging.
#[derive(Debug, Error)]
pub enum RedeemableError {
    #[error("Code is disabled")]
    Disabled,

    #[error("Code is outside its validity window")]
    OutsideWindow,

    #[error("Code has no uses left: {used}/{max}")]
    Exhausted { used: u64, max: u64 },
}

/// Bulk-grant code redeemable by many users, once each.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedemptionCode {
    /// Natural key.
    pub code: String,
    /// Opaque campaign label.
    pub code_type: String,
    pub kind: Kind,
    pub amount: u64,
    pub max_uses: u64,
    pub current_uses: u64,
    pub valid_from: TimestampMillis,
    pub valid_until: TimestampMillis,
    pub enabled: bool,
    #[serde(default)]
    pub metadata: Metadata,
}

impl RedemptionCode {
    /// Redeemable iff enabled, `now` inside [valid_from, valid_until] and
    /// uses remain. The upper bound is inclusive.
    pub fn redeemable_at(&self, now: TimestampMillis) -> Result<(), RedeemableError> {
        if !self.enabled {
            return Err(RedeemableError::Disabled);
        }
        if now < self.valid_from || now > self.valid_until {
            return Err(RedeemableError::OutsideWindow);
        }
        if self.current_uses >= self.max_uses {
            return Err(RedeemableError::Exhausted {
                used: self.current_uses,
                max: self.max_uses,
            });
        }
        Ok(())
    }

    /// Claim one use. Fails when the counter already reached the cap, which
    /// happens when a pre-check lost the race against another redeemer.
    pub fn consume_use(&mut self) -> Result<(), RedeemableError> {
        if self.current_uses >= self.max_uses {
            return Err(RedeemableError::Exhausted {
                used: self.current_uses,
                max: self.max_uses,
            });
        }
        self.current_uses += 1;
        Ok(())
    }
}

/// One successful redemption of a code by a user; unique per (code, user).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redemption {
    pub redemption_id: String,
    pub code: String,
    pub user_id: String,
    pub transaction_id: String,
    pub redeemed_at: TimestampMillis,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code() -> RedemptionCode {
        RedemptionCode {
            code: "WELCOME".to_string(),
            code_type: "campaign".to_string(),
            kind: Kind::Free,
            amount: 100,
            max_uses: 2,
            current_uses: 0,
            valid_from: 1_000,
            valid_until: 2_000,
            enabled: true,
            metadata: Metadata::new(),
        }
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let code = code();
        assert!(code.redeemable_at(1_000).is_ok());
        assert!(code.redeemable_at(2_000).is_ok());
        // one past the end is already out
        assert!(matches!(
            code.redeemable_at(2_001),
            Err(RedeemableError::OutsideWindow)
        ));
        assert!(matches!(
            code.redeemable_at(999),
            Err(RedeemableError::OutsideWindow)
        ));
    }

    #[test]
    fn disabled_code_is_never_redeemable() {
        let mut code = code();
        code.enabled = false;
        assert!(matches!(
            code.redeemable_at(1_500),
            Err(RedeemableError::Disabled)
        ));
    }

    #[test]
    fn uses_are_capped() {
        let mut code = code();
        code.consume_use().unwrap();
        code.consume_use().unwrap();
        assert_eq!(code.current_uses, 2);

        assert!(matches!(
            code.consume_use(),
            Err(RedeemableError::Exhausted { used: 2, max: 2 })
        ));
        assert!(matches!(
            code.redeemable_at(1_500),
            Err(RedeemableError::Exhausted { .. })
        ));
    }
}
