//! # Native Asset Chain
//!
//! An in-memory stand-in for the chain's native currency: per-address
//! balances, a faucet, and transfers. Addresses can register a receive hook
//! -- arbitrary code that runs after a transfer credits them, the way a
//! contract's `receive()` does. Hooks are how tests exercise reentrancy and
//! recipient rejection.
//!
//! ## Hook Semantics
//!
//! - The hook runs after the recipient is credited, with no lock held, so it
//!   may call back into anything (including the vault that sent the funds).
//! - If the hook returns `Err`, the transfer is reverted and the sender gets
//!   [`ChainError::Rejected`].
//! - A hook that spends what it just received and then rejects cannot be
//!   reverted. The funds have moved, so the transfer reports success and the
//!   rejection is only logged.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

use vault_protocol::primitives::{Address, Amount};
use vault_protocol::vault::{NativeAsset, TransferError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from native-asset operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChainError {
    /// The sender does not hold enough of the native asset.
    #[error("insufficient native balance: {address} has {balance}, needs {amount}")]
    InsufficientFunds {
        /// The sender.
        address: Address,
        /// The sender's balance.
        balance: Amount,
        /// The amount requested.
        amount: Amount,
    },

    /// Crediting would overflow the recipient or the total supply.
    #[error("native supply overflow crediting {amount}")]
    Overflow {
        /// The amount that did not fit.
        amount: Amount,
    },

    /// The recipient's receive hook rejected the transfer.
    #[error("recipient {address} rejected transfer: {reason}")]
    Rejected {
        /// The recipient.
        address: Address,
        /// Reason given by the hook.
        reason: String,
    },
}

/// Code run when an address receives native funds: `(from, amount)`.
pub type ReceiveHook = Arc<dyn Fn(&Address, Amount) -> Result<(), String> + Send + Sync>;

#[derive(Default)]
struct Ledger {
    balances: HashMap<Address, Amount>,
    total_supply: Amount,
}

impl Ledger {
    fn balance(&self, who: &Address) -> Amount {
        self.balances.get(who).copied().unwrap_or(0)
    }

    fn move_funds(&mut self, from: &Address, to: &Address, amount: Amount) -> Result<(), ChainError> {
        let balance = self.balance(from);
        if balance < amount {
            return Err(ChainError::InsufficientFunds {
                address: *from,
                balance,
                amount,
            });
        }
        if from == to {
            return Ok(());
        }
        // Recipient cannot overflow: total_supply bounds every balance.
        self.balances.insert(*from, balance - amount);
        *self.balances.entry(*to).or_insert(0) += amount;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// NativeChain
// ---------------------------------------------------------------------------

/// In-memory native-asset balances.
#[derive(Default)]
pub struct NativeChain {
    ledger: Mutex<Ledger>,
    hooks: Mutex<HashMap<Address, ReceiveHook>>,
}

impl NativeChain {
    /// Creates a chain with no balances.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates new native funds out of thin air for `to`. Returns the new
    /// balance.
    pub fn fund(&self, to: &Address, amount: Amount) -> Result<Amount, ChainError> {
        let mut ledger = self.ledger.lock();
        let supply = ledger
            .total_supply
            .checked_add(amount)
            .ok_or(ChainError::Overflow { amount })?;
        ledger.total_supply = supply;
        let balance = ledger.balances.entry(*to).or_insert(0);
        *balance += amount;
        debug!(%to, amount, "native funds minted");
        Ok(*balance)
    }

    /// Native balance of `who`.
    pub fn balance_of(&self, who: &Address) -> Amount {
        self.ledger.lock().balance(who)
    }

    /// Total native funds ever minted via [`fund`](Self::fund).
    pub fn total_supply(&self) -> Amount {
        self.ledger.lock().total_supply
    }

    /// Registers (or replaces) the receive hook of `address`.
    pub fn set_receive_hook(&self, address: Address, hook: ReceiveHook) {
        self.hooks.lock().insert(address, hook);
    }

    /// Removes the receive hook of `address`.
    pub fn clear_receive_hook(&self, address: &Address) {
        self.hooks.lock().remove(address);
    }

    /// Moves `amount` from `from` to `to`, then runs `to`'s receive hook.
    pub fn transfer(&self, from: &Address, to: &Address, amount: Amount) -> Result<(), ChainError> {
        self.ledger.lock().move_funds(from, to, amount)?;

        let hook = self.hooks.lock().get(to).cloned();
        if let Some(hook) = hook {
            if let Err(reason) = hook(from, amount) {
                let reverted = self.ledger.lock().move_funds(to, from, amount);
                if reverted.is_ok() {
                    return Err(ChainError::Rejected {
                        address: *to,
                        reason,
                    });
                }
                warn!(%from, %to, amount, %reason, "recipient rejected after spending funds; transfer stands");
            }
        }

        debug!(%from, %to, amount, "native transfer");
        Ok(())
    }
}

impl NativeAsset for NativeChain {
    fn transfer(&self, from: &Address, to: &Address, amount: Amount) -> Result<(), TransferError> {
        NativeChain::transfer(self, from, to, amount)
            .map_err(|e| TransferError::new("native transfer", e.to_string()))
    }
}
