//! # Wrapped Native Asset (WETH)
//!
//! Converts the native asset into an ERC20 token and back, 1:1. The WETH
//! contract lives at the address of its own token: native funds deposited
//! into it are held there, and the token is self-issued so only the contract
//! can mint.
//!
//! Invariant: `supply() == reserves()` as long as nobody sends native funds
//! to the contract outside of [`Weth::deposit`].

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use vault_protocol::config::{DEFAULT_WRAPPED_NAME, DEFAULT_WRAPPED_SYMBOL, ETHER_DECIMALS};
use vault_protocol::primitives::{Address, Amount, TokenId};
use vault_protocol::vault::{AssetWrapper, TransferError};

use crate::native::{ChainError, NativeChain};
use crate::token_registry::{TokenError, TokenRegistry};

/// Errors from wrapping or unwrapping.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WethError {
    /// The native leg failed.
    #[error(transparent)]
    Native(#[from] ChainError),
    /// The token leg failed.
    #[error(transparent)]
    Token(#[from] TokenError),
}

/// The WETH contract.
pub struct Weth {
    address: TokenId,
    native: Arc<NativeChain>,
    tokens: Arc<TokenRegistry>,
}

impl Weth {
    /// Deploys the WETH token in `tokens` and binds it to `native`.
    pub fn deploy(native: Arc<NativeChain>, tokens: Arc<TokenRegistry>) -> Result<Self, TokenError> {
        let address =
            tokens.create_self_issued(DEFAULT_WRAPPED_NAME, DEFAULT_WRAPPED_SYMBOL, ETHER_DECIMALS)?;
        Ok(Self {
            address,
            native,
            tokens,
        })
    }

    /// Contract (and token) address.
    pub fn address(&self) -> TokenId {
        self.address
    }

    /// Moves `amount` native from `holder` into the contract and mints the
    /// same amount of WETH to `holder`.
    pub fn deposit(&self, holder: &Address, amount: Amount) -> Result<(), WethError> {
        self.native.transfer(holder, &self.address, amount)?;
        if let Err(err) = self.tokens.mint(&self.address, &self.address, holder, amount) {
            if let Err(revert) = self.native.transfer(&self.address, holder, amount) {
                warn!(%holder, amount, error = %revert, "weth deposit refund failed");
            }
            return Err(err.into());
        }
        debug!(%holder, amount, "weth deposit");
        Ok(())
    }

    /// Burns `amount` WETH from `holder` and releases the same amount of
    /// native to `holder`.
    pub fn withdraw(&self, holder: &Address, amount: Amount) -> Result<(), WethError> {
        self.tokens.burn(&self.address, holder, amount)?;
        if let Err(err) = self.native.transfer(&self.address, holder, amount) {
            if let Err(remint) = self.tokens.mint(&self.address, &self.address, holder, amount) {
                warn!(%holder, amount, error = %remint, "weth withdraw re-mint failed");
            }
            return Err(err.into());
        }
        debug!(%holder, amount, "weth withdraw");
        Ok(())
    }

    /// WETH balance of `who`.
    pub fn balance_of(&self, who: &Address) -> Amount {
        self.tokens.balance_of(&self.address, who)
    }

    /// Outstanding WETH.
    pub fn supply(&self) -> Amount {
        self.tokens.total_supply(&self.address)
    }

    /// Native funds held by the contract.
    pub fn reserves(&self) -> Amount {
        self.native.balance_of(&self.address)
    }
}

impl AssetWrapper for Weth {
    fn wrapped_token(&self) -> TokenId {
        self.address
    }

    fn wrap(&self, holder: &Address, amount: Amount) -> Result<(), TransferError> {
        self.deposit(holder, amount)
            .map_err(|e| TransferError::new("wrap", e.to_string()))
    }

    fn unwrap(&self, holder: &Address, amount: Amount) -> Result<(), TransferError> {
        self.withdraw(holder, amount)
            .map_err(|e| TransferError::new("unwrap", e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Arc<NativeChain>, Weth) {
        let native = Arc::new(NativeChain::new());
        let tokens = Arc::new(TokenRegistry::new(Address::derive("deployer")));
        let weth = Weth::deploy(Arc::clone(&native), tokens).unwrap();
        (native, weth)
    }

    #[test]
    fn deposit_and_withdraw_are_one_to_one() {
        let (native, weth) = setup();
        let alice = Address::derive("alice");
        native.fund(&alice, 100).unwrap();

        weth.deposit(&alice, 60).unwrap();
        assert_eq!(native.balance_of(&alice), 40);
        assert_eq!(weth.balance_of(&alice), 60);
        assert_eq!(weth.supply(), weth.reserves());

        weth.withdraw(&alice, 25).unwrap();
        assert_eq!(native.balance_of(&alice), 65);
        assert_eq!(weth.balance_of(&alice), 35);
        assert_eq!(weth.supply(), 35);
        assert_eq!(weth.reserves(), 35);
    }

    #[test]
    fn deposit_without_funds_fails_cleanly() {
        let (native, weth) = setup();
        let alice = Address::derive("alice");
        native.fund(&alice, 5).unwrap();
        assert!(matches!(
            weth.deposit(&alice, 6),
            Err(WethError::Native(ChainError::InsufficientFunds { .. }))
        ));
        assert_eq!(weth.supply(), 0);
        assert_eq!(native.balance_of(&alice), 5);
    }

    #[test]
    fn withdraw_into_rejecting_holder_restores_weth() {
        let (native, weth) = setup();
        let alice = Address::derive("alice");
        native.fund(&alice, 10).unwrap();
        weth.deposit(&alice, 10).unwrap();

        native.set_receive_hook(alice, Arc::new(|_, _| Err("closed".into())));
        assert!(weth.withdraw(&alice, 4).is_err());
        assert_eq!(weth.balance_of(&alice), 10);
        assert_eq!(weth.supply(), weth.reserves());
    }

    #[test]
    fn wrapper_trait_reports_token_identity() {
        let (_, weth) = setup();
        assert_eq!(AssetWrapper::wrapped_token(&weth), weth.address());
        let err = AssetWrapper::unwrap(&weth, &Address::derive("nobody"), 1).unwrap_err();
        assert_eq!(err.operation, "unwrap");
    }
}
