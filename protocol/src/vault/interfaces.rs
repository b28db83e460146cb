//! # External Collaborators
//!
//! The vault keeps the books; it does not move assets itself. Three traits
//! describe the primitives it calls out to:
//!
//! ```text
//! NativeAsset    -- move the chain-native asset between addresses
//! TokenTransfer  -- pull (transferFrom) and push (transfer) a token
//! AssetWrapper   -- convert native <-> wrapped native, 1:1
//! ```
//!
//! Any of these may run code the vault does not control (a recipient's
//! receive hook, a malicious token). Implementations therefore get `&self`
//! only and never see the vault's tables. The vault commits its own state
//! before calling them.

use std::sync::Arc;

use thiserror::Error;

use crate::primitives::{Address, Amount, TokenId};

/// A failed external transfer, pull, push, wrap, or unwrap.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{operation} failed: {reason}")]
pub struct TransferError {
    /// Which primitive failed (`"native transfer"`, `"token pull"`, ...).
    pub operation: &'static str,
    /// Human-readable cause reported by the collaborator.
    pub reason: String,
}

impl TransferError {
    /// Creates a transfer error.
    pub fn new(operation: &'static str, reason: impl Into<String>) -> Self {
        Self {
            operation,
            reason: reason.into(),
        }
    }
}

/// Native-asset transfer primitive.
pub trait NativeAsset: Send + Sync {
    /// Moves `amount` of the native asset from `from` to `to`.
    ///
    /// Must either complete fully or leave every balance untouched.
    fn transfer(&self, from: &Address, to: &Address, amount: Amount) -> Result<(), TransferError>;
}

/// Token transfer primitive with ERC20 semantics.
pub trait TokenTransfer: Send + Sync {
    /// Pulls `amount` of `token` from `from` to `to`, consuming an
    /// allowance that `from` granted to `to` beforehand.
    fn pull(
        &self,
        token: &TokenId,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), TransferError>;

    /// Pushes `amount` of `token` held by `from` to `to`.
    fn push(
        &self,
        token: &TokenId,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), TransferError>;
}

/// Wrap/unwrap primitive for the wrapped-native token.
pub trait AssetWrapper: Send + Sync {
    /// Identity of the token this wrapper mints and burns.
    fn wrapped_token(&self) -> TokenId;

    /// Converts `amount` native held by `holder` into `amount` wrapped
    /// tokens held by `holder`.
    fn wrap(&self, holder: &Address, amount: Amount) -> Result<(), TransferError>;

    /// Converts `amount` wrapped tokens held by `holder` back into native.
    fn unwrap(&self, holder: &Address, amount: Amount) -> Result<(), TransferError>;
}

/// The set of primitives a vault is wired to.
#[derive(Clone)]
pub struct Collaborators {
    /// Native-asset transfers.
    pub native: Arc<dyn NativeAsset>,
    /// Token pulls and pushes.
    pub tokens: Arc<dyn TokenTransfer>,
    /// Native <-> wrapped conversion.
    pub wrapper: Arc<dyn AssetWrapper>,
}

impl Collaborators {
    /// Bundles the three primitives.
    pub fn new(
        native: Arc<dyn NativeAsset>,
        tokens: Arc<dyn TokenTransfer>,
        wrapper: Arc<dyn AssetWrapper>,
    ) -> Self {
        Self {
            native,
            tokens,
            wrapper,
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("wrapped_token", &self.wrapper.wrapped_token())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_error_display() {
        let err = TransferError::new("token pull", "allowance 5 < 10");
        assert_eq!(err.to_string(), "token pull failed: allowance 5 < 10");
    }
}
