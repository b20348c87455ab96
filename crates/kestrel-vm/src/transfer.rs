//! Balance transfer between account states

use crate::error::{VmError, VmResult};
use kestrel_primitives::U256;
use kestrel_storage::AccountState;

/// Move `amount` from `sender` to `receiver`.
///
/// Fails without touching either side when the sender cannot cover the
/// amount. Self-transfer is not expressible here since both states are
/// borrowed mutably; callers holding a single record treat it as a no-op.
pub fn transfer(
    sender: &mut AccountState,
    receiver: &mut AccountState,
    amount: U256,
) -> VmResult<()> {
    if sender.balance < amount {
        return Err(VmError::InsufficientBalance {
            balance: sender.balance,
            amount,
        });
    }
    let credited = receiver
        .balance
        .checked_add(amount)
        .ok_or_else(|| VmError::Internal("receiver balance overflow".to_string()))?;
    sender.balance -= amount;
    receiver.balance = credited;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn state(balance: u64) -> AccountState {
        AccountState::with_balance(U256::from(balance))
    }

    #[test]
    fn test_transfer_moves_balance() {
        let mut a = state(100);
        let mut b = state(0);
        transfer(&mut a, &mut b, U256::from(30u64)).unwrap();
        assert_eq!(a.balance, U256::from(70u64));
        assert_eq!(b.balance, U256::from(30u64));
    }

    #[test]
    fn test_transfer_exact_balance() {
        let mut a = state(5);
        let mut b = state(1);
        transfer(&mut a, &mut b, U256::from(5u64)).unwrap();
        assert!(a.balance.is_zero());
        assert_eq!(b.balance, U256::from(6u64));
    }

    #[test]
    fn test_transfer_insufficient() {
        let mut a = state(10);
        let mut b = state(3);
        let err = transfer(&mut a, &mut b, U256::from(11u64)).unwrap_err();
        assert!(matches!(err, VmError::InsufficientBalance { .. }));
        assert_eq!(a.balance, U256::from(10u64));
        assert_eq!(b.balance, U256::from(3u64));
    }

    #[test]
    fn test_transfer_receiver_overflow() {
        let mut a = state(10);
        let mut b = AccountState::with_balance(U256::MAX);
        assert!(matches!(
            transfer(&mut a, &mut b, U256::one()),
            Err(VmError::Internal(_))
        ));
        assert_eq!(a.balance, U256::from(10u64));
    }

    proptest! {
        #[test]
        fn prop_transfer_conserves_sum(a in any::<u64>(), b in any::<u64>(), amount in any::<u64>()) {
            let mut sender = state(a);
            let mut receiver = state(b);
            let before = sender.balance + receiver.balance;
            let result = transfer(&mut sender, &mut receiver, U256::from(amount));

            prop_assert_eq!(sender.balance + receiver.balance, before);
            if amount > a {
                prop_assert!(result.is_err());
                prop_assert_eq!(sender.balance, U256::from(a));
                prop_assert_eq!(receiver.balance, U256::from(b));
            } else {
                prop_assert!(result.is_ok());
                prop_assert_eq!(sender.balance, U256::from(a - amount));
            }
        }
    }
}
