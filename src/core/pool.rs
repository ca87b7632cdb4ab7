//! Module-wide token aggregate.

use serde::{Deserialize, Serialize};

use crate::core::handler::StakeError;

/// Bonded tokens back Bonded validators. Loose tokens are held by the module but not bonded:
/// tokens of Unbonding/Unbonded validators and balances of pending unbonding entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub bonded_tokens: u128,
    pub loose_tokens: u128,
}

impl Pool {
    pub fn total(&self) -> Result<u128, StakeError> {
        self.bonded_tokens
            .checked_add(self.loose_tokens)
            .ok_or(StakeError::Overflow("pool"))
    }

    pub fn add(&mut self, bonded: bool, amount: u128) -> Result<(), StakeError> {
        let slot = self.slot(bonded);
        *slot = slot.checked_add(amount).ok_or(StakeError::Overflow("pool"))?;
        Ok(())
    }

    pub fn remove(&mut self, bonded: bool, amount: u128) -> Result<(), StakeError> {
        let slot = self.slot(bonded);
        *slot = slot
            .checked_sub(amount)
            .ok_or(StakeError::PoolUnderflow { bonded, amount })?;
        Ok(())
    }

    /// Moves tokens between the two buckets. A no-op when both sides are the same bucket.
    pub fn transfer(
        &mut self,
        from_bonded: bool,
        to_bonded: bool,
        amount: u128,
    ) -> Result<(), StakeError> {
        if from_bonded == to_bonded {
            return Ok(());
        }
        self.remove(from_bonded, amount)?;
        self.add(to_bonded, amount)
    }

    fn slot(&mut self, bonded: bool) -> &mut u128 {
        if bonded {
            &mut self.bonded_tokens
        } else {
            &mut self.loose_tokens
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_between_buckets() {
        let mut pool = Pool::default();
        pool.add(true, 100).unwrap();
        pool.transfer(true, false, 40).unwrap();
        assert_eq!(pool.bonded_tokens, 60);
        assert_eq!(pool.loose_tokens, 40);
        assert_eq!(pool.total(), Ok(100));
        pool.transfer(true, true, 1_000).unwrap();
        assert_eq!(pool.bonded_tokens, 60);
    }

    #[test]
    fn test_total_overflow_is_an_error() {
        let pool = Pool {
            bonded_tokens: u128::MAX,
            loose_tokens: 1,
        };
        assert_eq!(pool.total(), Err(StakeError::Overflow("pool")));
    }

    #[test]
    fn test_remove_underflow() {
        let mut pool = Pool::default();
        assert!(matches!(
            pool.remove(false, 1),
            Err(StakeError::PoolUnderflow { bonded: false, amount: 1 })
        ));
    }
}
