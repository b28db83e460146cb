//! # Vault Configuration & Constants
//!
//! Every magic number in the vault lives here. If you're hardcoding a
//! decimal count somewhere else, you're doing it wrong.
//!
//! Runtime configuration is deliberately tiny: a vault needs to know who it
//! is (the custody account) and which token is the wrapped form of the
//! native asset. Both are fixed at construction and never change.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::primitives::{Address, TokenId};

// ---------------------------------------------------------------------------
// Units
// ---------------------------------------------------------------------------

/// Decimal places of the native asset. 18, as on every EVM chain.
pub const ETHER_DECIMALS: u8 = 18;

/// Smallest units per whole native-asset unit.
pub const WEI_PER_ETHER: u128 = 1_000_000_000_000_000_000;

/// Largest decimal count whose scale factor fits in a `u128`.
/// `10^38 < u128::MAX < 10^39`.
pub const MAX_DECIMALS: u8 = 38;

// ---------------------------------------------------------------------------
// Well-known labels
// ---------------------------------------------------------------------------

/// Label from which the default custody account is derived.
pub const DEFAULT_CUSTODIAN_LABEL: &str = "vault";

/// Symbol of the wrapped native token deployed by the reference chain.
pub const DEFAULT_WRAPPED_SYMBOL: &str = "WETH";

/// Display name of the wrapped native token.
pub const DEFAULT_WRAPPED_NAME: &str = "Wrapped Ether";

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Default `tracing` filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "vault_node=info,vault_protocol=info,vault_contracts=info";

// ---------------------------------------------------------------------------
// VaultConfig
// ---------------------------------------------------------------------------

/// Errors returned by [`VaultConfig::validate`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The custody account is the zero address.
    #[error("custodian must not be the zero address")]
    ZeroCustodian,

    /// The wrapped token is the zero address.
    #[error("wrapped token must not be the zero address")]
    ZeroWrappedToken,

    /// The custody account and the wrapped token are the same identity.
    #[error("custodian and wrapped token must differ (both {0})")]
    CustodianIsWrappedToken(Address),
}

/// Construction-time parameters of a vault.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Address under which the vault holds custodied assets on the
    /// external chain.
    pub custodian: Address,

    /// The token that is the 1:1 wrapped form of the native asset.
    pub wrapped_token: TokenId,
}

impl VaultConfig {
    /// Creates a config. Call [`validate`](Self::validate) before use.
    pub fn new(custodian: Address, wrapped_token: TokenId) -> Self {
        Self {
            custodian,
            wrapped_token,
        }
    }

    /// Creates a config with the default custody account
    /// (`Address::derive(DEFAULT_CUSTODIAN_LABEL)`).
    pub fn with_wrapped_token(wrapped_token: TokenId) -> Self {
        Self::new(Address::derive(DEFAULT_CUSTODIAN_LABEL), wrapped_token)
    }

    /// Checks the structural invariants of the config.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.custodian.is_zero() {
            return Err(ConfigError::ZeroCustodian);
        }
        if self.wrapped_token.is_zero() {
            return Err(ConfigError::ZeroWrappedToken);
        }
        if self.custodian == self.wrapped_token {
            return Err(ConfigError::CustodianIsWrappedToken(self.custodian));
        }
        Ok(())
    }
}
