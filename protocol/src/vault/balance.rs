//! # Balance Bookkeeping
//!
//! A [`BalanceSheet`] holds the two custody tables of the vault:
//!
//! ```text
//! native: Account -> Amount
//! tokens: Account -> TokenId -> Amount
//! ```
//!
//! Cells are created on first credit and pruned when they reach zero, so a
//! zero balance and a never-touched balance are the same thing. All
//! arithmetic is checked: a debit can never drive a cell negative and a
//! credit can never wrap.
//!
//! The sheet knows nothing about external transfers. Pairing every credit
//! with an inbound transfer (and every debit with an outbound one) is the
//! job of [`super::ledger::Vault`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::primitives::{Address, Amount, TokenId};

// ---------------------------------------------------------------------------
// Asset
// ---------------------------------------------------------------------------

/// Which balance table a cell lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Asset {
    /// The chain-native asset.
    Native,
    /// A fungible token, by contract identity.
    Token(TokenId),
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Asset::Native => write!(f, "native"),
            Asset::Token(token) => write!(f, "token {}", token),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during balance operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BalanceError {
    /// Attempted to debit more than the available balance.
    #[error(
        "insufficient balance: available {available}, requested {requested} ({asset} of {account})"
    )]
    InsufficientBalance {
        /// Owner of the cell.
        account: Address,
        /// Which table.
        asset: Asset,
        /// The current balance.
        available: Amount,
        /// The amount that was requested.
        requested: Amount,
    },

    /// Arithmetic overflow during a credit operation.
    #[error("balance overflow: current {current}, credit {credit} ({asset} of {account})")]
    Overflow {
        /// Owner of the cell.
        account: Address,
        /// Which table.
        asset: Asset,
        /// The current balance before the failed credit.
        current: Amount,
        /// The amount that caused the overflow.
        credit: Amount,
    },
}

// ---------------------------------------------------------------------------
// BalanceSheet
// ---------------------------------------------------------------------------

/// The complete custody tables of a vault.
///
/// Backed by `BTreeMap`s so that iteration (and therefore serialized
/// snapshots) is deterministic. Not `Sync` by itself -- the
/// [`Vault`](super::ledger::Vault) serializes access.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSheet {
    /// Native-asset balances.
    native: BTreeMap<Address, Amount>,
    /// Token balances, per account then per token.
    tokens: BTreeMap<Address, BTreeMap<TokenId, Amount>>,
}

impl BalanceSheet {
    /// Creates an empty balance sheet.
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Native balance of `account`; zero if never touched.
    pub fn native_balance(&self, account: &Address) -> Amount {
        self.native.get(account).copied().unwrap_or(0)
    }

    /// Balance of `token` held for `account`; zero if never touched.
    pub fn token_balance(&self, account: &Address, token: &TokenId) -> Amount {
        self.tokens
            .get(account)
            .and_then(|per_token| per_token.get(token))
            .copied()
            .unwrap_or(0)
    }

    /// Balance of any asset.
    pub fn balance(&self, account: &Address, asset: Asset) -> Amount {
        match asset {
            Asset::Native => self.native_balance(account),
            Asset::Token(token) => self.token_balance(account, &token),
        }
    }

    /// Sum of all native balances.
    ///
    /// Saturates rather than overflowing. Every unit in the sheet is backed
    /// by a unit the vault custodies, so a saturated total means the sheet
    /// is already insolvent.
    pub fn total_native(&self) -> Amount {
        self.native
            .values()
            .fold(0, |acc: Amount, v| acc.saturating_add(*v))
    }

    /// Sum of all balances of `token`.
    pub fn total_token(&self, token: &TokenId) -> Amount {
        self.tokens
            .values()
            .filter_map(|per_token| per_token.get(token))
            .fold(0, |acc: Amount, v| acc.saturating_add(*v))
    }

    /// All accounts with at least one non-zero balance, sorted.
    pub fn accounts(&self) -> Vec<Address> {
        let mut all: Vec<Address> = self
            .native
            .keys()
            .chain(self.tokens.keys())
            .copied()
            .collect();
        all.sort();
        all.dedup();
        all
    }

    /// All non-zero token balances of `account` as `(token, amount)` pairs.
    pub fn token_balances_of(&self, account: &Address) -> Vec<(TokenId, Amount)> {
        self.tokens
            .get(account)
            .map(|per_token| per_token.iter().map(|(t, a)| (*t, *a)).collect())
            .unwrap_or_default()
    }

    /// Returns `true` if every cell is zero.
    pub fn is_empty(&self) -> bool {
        self.native.is_empty() && self.tokens.is_empty()
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Checks that crediting `amount` would not overflow, without mutating.
    pub fn ensure_can_credit(
        &self,
        account: &Address,
        asset: Asset,
        amount: Amount,
    ) -> Result<(), BalanceError> {
        let current = self.balance(account, asset);
        current
            .checked_add(amount)
            .map(|_| ())
            .ok_or(BalanceError::Overflow {
                account: *account,
                asset,
                current,
                credit: amount,
            })
    }

    /// Credits (adds) `amount` to a cell and returns the new balance.
    ///
    /// # Errors
    ///
    /// Returns [`BalanceError::Overflow`] if the credit would exceed
    /// `u128::MAX`. The sheet is unchanged on error.
    pub fn credit(
        &mut self,
        account: &Address,
        asset: Asset,
        amount: Amount,
    ) -> Result<Amount, BalanceError> {
        self.ensure_can_credit(account, asset, amount)?;
        if amount == 0 {
            return Ok(self.balance(account, asset));
        }

        let cell = match asset {
            Asset::Native => self.native.entry(*account).or_insert(0),
            Asset::Token(token) => self
                .tokens
                .entry(*account)
                .or_default()
                .entry(token)
                .or_insert(0),
        };
        // Checked above.
        *cell += amount;
        Ok(*cell)
    }

    /// Debits (subtracts) `amount` from a cell and returns the new balance.
    ///
    /// Cells that reach zero are removed.
    ///
    /// # Errors
    ///
    /// Returns [`BalanceError::InsufficientBalance`] if the debit exceeds
    /// the current balance. The sheet is unchanged on error.
    pub fn debit(
        &mut self,
        account: &Address,
        asset: Asset,
        amount: Amount,
    ) -> Result<Amount, BalanceError> {
        let available = self.balance(account, asset);
        if available < amount {
            return Err(BalanceError::InsufficientBalance {
                account: *account,
                asset,
                available,
                requested: amount,
            });
        }
        if amount == 0 {
            return Ok(available);
        }

        let remaining = available - amount;
        match asset {
            Asset::Native => {
                if remaining == 0 {
                    self.native.remove(account);
                } else {
                    self.native.insert(*account, remaining);
                }
            }
            Asset::Token(token) => {
                // available > 0, so the inner map exists.
                if let Some(per_token) = self.tokens.get_mut(account) {
                    if remaining == 0 {
                        per_token.remove(&token);
                    } else {
                        per_token.insert(token, remaining);
                    }
                    if per_token.is_empty() {
                        self.tokens.remove(account);
                    }
                }
            }
        }
        Ok(remaining)
    }

    /// Credits the native table.
    pub fn credit_native(&mut self, account: &Address, amount: Amount) -> Result<Amount, BalanceError> {
        self.credit(account, Asset::Native, amount)
    }

    /// Debits the native table.
    pub fn debit_native(&mut self, account: &Address, amount: Amount) -> Result<Amount, BalanceError> {
        self.debit(account, Asset::Native, amount)
    }

    /// Credits the token table.
    pub fn credit_token(
        &mut self,
        account: &Address,
        token: &TokenId,
        amount: Amount,
    ) -> Result<Amount, BalanceError> {
        self.credit(account, Asset::Token(*token), amount)
    }

    /// Debits the token table.
    pub fn debit_token(
        &mut self,
        account: &Address,
        token: &TokenId,
        amount: Amount,
    ) -> Result<Amount, BalanceError> {
        self.debit(account, Asset::Token(*token), amount)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
