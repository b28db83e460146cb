//! # Token Registry Contract
//!
//! Hosts every ERC20-style token on the in-memory chain. Anyone can create a
//! token by giving a name, a symbol, decimal precision, and an issuer; the
//! registry deploys it at a deterministic contract address. Only the issuer
//! can mint additional supply.
//!
//! ## Security Model
//!
//! - **Mint gating**: `mint()` checks the caller against the token's issuer.
//!   Self-issued tokens (WETH) name their own contract address as issuer, so
//!   only the contract itself can mint.
//! - **Burn authorization**: a holder can only burn from their own balance.
//! - **Allowances**: `transfer_from` checks and consumes the allowance the
//!   owner granted to the spender. An allowance of `u128::MAX` is treated as
//!   unlimited and never decremented.
//! - **Supply tracking**: total supply and balances move together under one
//!   lock. Overflow is checked on every credit.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use vault_protocol::config::MAX_DECIMALS;
use vault_protocol::primitives::{Address, Amount, TokenId};
use vault_protocol::vault::{TokenTransfer, TransferError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during token operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    /// The referenced token does not exist.
    #[error("token not found: {0}")]
    TokenNotFound(TokenId),

    /// The caller is not the issuer of this token.
    #[error("unauthorized: {caller} is not the issuer of {token}")]
    UnauthorizedMint {
        /// The token.
        token: TokenId,
        /// Who tried to mint.
        caller: Address,
    },

    /// A supply or balance overflow would occur.
    #[error("supply overflow: minting {amount} would exceed u128::MAX")]
    SupplyOverflow {
        /// The amount that was attempted.
        amount: Amount,
    },

    /// The holder does not have enough tokens.
    #[error("insufficient balance: account has {balance}, needs {amount}")]
    InsufficientBalance {
        /// Current balance of the account.
        balance: Amount,
        /// Amount required.
        amount: Amount,
    },

    /// The spender's allowance is too small.
    #[error("insufficient allowance: {allowance} approved, needs {amount}")]
    InsufficientAllowance {
        /// Remaining allowance.
        allowance: Amount,
        /// Amount required.
        amount: Amount,
    },

    /// A token with this symbol already exists.
    #[error("duplicate symbol: a token with symbol '{0}' already exists")]
    DuplicateSymbol(String),

    /// Decimal precision beyond what `u128` amounts can express.
    #[error("unsupported decimals: {0}")]
    UnsupportedDecimals(u8),

    /// Transfers and mints to the zero address are not allowed.
    #[error("invalid recipient: the zero address")]
    ZeroRecipient,
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Metadata and supply information for a deployed token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    /// Contract address of the token.
    pub address: TokenId,
    /// Human-readable token name (e.g., "USD Coin").
    pub name: String,
    /// Ticker symbol, upper-cased. Unique across the registry.
    pub symbol: String,
    /// Number of decimal places (6 for USDC, 18 for WETH).
    pub decimals: u8,
    /// The only address allowed to mint.
    pub issuer: Address,
    /// Current total supply in the smallest denomination.
    pub total_supply: Amount,
    /// Timestamp when the token was created.
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
struct TokenState {
    info: TokenInfo,
    balances: HashMap<Address, Amount>,
    /// `(owner, spender) -> remaining allowance`.
    allowances: HashMap<(Address, Address), Amount>,
}

impl TokenState {
    fn balance(&self, who: &Address) -> Amount {
        self.balances.get(who).copied().unwrap_or(0)
    }

    fn allowance(&self, owner: &Address, spender: &Address) -> Amount {
        self.allowances
            .get(&(*owner, *spender))
            .copied()
            .unwrap_or(0)
    }

    fn move_tokens(&mut self, from: &Address, to: &Address, amount: Amount) -> Result<(), TokenError> {
        if to.is_zero() {
            return Err(TokenError::ZeroRecipient);
        }
        let balance = self.balance(from);
        if balance < amount {
            return Err(TokenError::InsufficientBalance { balance, amount });
        }
        if from != to {
            self.balances.insert(*from, balance - amount);
            // total_supply bounds every balance, so this cannot overflow.
            *self.balances.entry(*to).or_insert(0) += amount;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Registry {
    tokens: HashMap<TokenId, TokenState>,
    /// Upper-cased symbol -> token address.
    symbol_index: HashMap<String, TokenId>,
    /// Deployment counter, feeds address derivation.
    nonce: u64,
}

impl Registry {
    fn token(&self, token: &TokenId) -> Result<&TokenState, TokenError> {
        self.tokens.get(token).ok_or(TokenError::TokenNotFound(*token))
    }

    fn token_mut(&mut self, token: &TokenId) -> Result<&mut TokenState, TokenError> {
        self.tokens
            .get_mut(token)
            .ok_or(TokenError::TokenNotFound(*token))
    }
}

// ---------------------------------------------------------------------------
// TokenRegistry
// ---------------------------------------------------------------------------

/// The token registry: deployment, minting, burning, and ERC20 transfers.
#[derive(Debug)]
pub struct TokenRegistry {
    /// Address tokens are deployed from.
    deployer: Address,
    inner: Mutex<Registry>,
}

impl TokenRegistry {
    /// Creates an empty registry deploying from `deployer`.
    pub fn new(deployer: Address) -> Self {
        Self {
            deployer,
            inner: Mutex::new(Registry::default()),
        }
    }

    /// Deploys a new token and returns its contract address.
    ///
    /// The token starts with zero supply; the issuer must call
    /// [`mint`](Self::mint) to create the initial supply.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::DuplicateSymbol`] if the symbol is already taken
    /// and [`TokenError::UnsupportedDecimals`] above 38 decimals.
    pub fn create_token(
        &self,
        name: &str,
        symbol: &str,
        decimals: u8,
        issuer: Address,
    ) -> Result<TokenId, TokenError> {
        self.deploy(name, symbol, decimals, Some(issuer))
    }

    /// Deploys a token whose issuer is its own contract address. Used by
    /// wrapper contracts that mint against deposits.
    pub fn create_self_issued(
        &self,
        name: &str,
        symbol: &str,
        decimals: u8,
    ) -> Result<TokenId, TokenError> {
        self.deploy(name, symbol, decimals, None)
    }

    fn deploy(
        &self,
        name: &str,
        symbol: &str,
        decimals: u8,
        issuer: Option<Address>,
    ) -> Result<TokenId, TokenError> {
        if decimals > MAX_DECIMALS {
            return Err(TokenError::UnsupportedDecimals(decimals));
        }

        let mut registry = self.inner.lock();
        let symbol_upper = symbol.to_uppercase();
        if registry.symbol_index.contains_key(&symbol_upper) {
            return Err(TokenError::DuplicateSymbol(symbol.to_string()));
        }

        let address = Address::contract(&self.deployer, registry.nonce);
        registry.nonce += 1;

        let info = TokenInfo {
            address,
            name: name.to_string(),
            symbol: symbol_upper.clone(),
            decimals,
            issuer: issuer.unwrap_or(address),
            total_supply: 0,
            created_at: Utc::now(),
        };
        registry.tokens.insert(
            address,
            TokenState {
                info,
                balances: HashMap::new(),
                allowances: HashMap::new(),
            },
        );
        registry.symbol_index.insert(symbol_upper, address);

        debug!(%address, symbol, decimals, "token deployed");
        Ok(address)
    }

    /// Mints `amount` new tokens to `to`. Only the issuer may call this.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::TokenNotFound`] if the token does not exist.
    /// Returns [`TokenError::UnauthorizedMint`] if the caller is not the issuer.
    /// Returns [`TokenError::SupplyOverflow`] if the supply would overflow.
    pub fn mint(
        &self,
        token: &TokenId,
        caller: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), TokenError> {
        if to.is_zero() {
            return Err(TokenError::ZeroRecipient);
        }
        let mut registry = self.inner.lock();
        let state = registry.token_mut(token)?;
        if state.info.issuer != *caller {
            return Err(TokenError::UnauthorizedMint {
                token: *token,
                caller: *caller,
            });
        }

        let new_supply = state
            .info
            .total_supply
            .checked_add(amount)
            .ok_or(TokenError::SupplyOverflow { amount })?;
        state.info.total_supply = new_supply;
        *state.balances.entry(*to).or_insert(0) += amount;

        debug!(%token, %to, amount, "tokens minted");
        Ok(())
    }

    /// Burns `amount` from `from`'s own balance.
    pub fn burn(&self, token: &TokenId, from: &Address, amount: Amount) -> Result<(), TokenError> {
        let mut registry = self.inner.lock();
        let state = registry.token_mut(token)?;
        let balance = state.balance(from);
        if balance < amount {
            return Err(TokenError::InsufficientBalance { balance, amount });
        }
        state.balances.insert(*from, balance - amount);
        state.info.total_supply -= amount;

        debug!(%token, %from, amount, "tokens burned");
        Ok(())
    }

    /// Sets the allowance `owner` grants `spender`, replacing any previous one.
    pub fn approve(
        &self,
        token: &TokenId,
        owner: &Address,
        spender: &Address,
        amount: Amount,
    ) -> Result<(), TokenError> {
        let mut registry = self.inner.lock();
        let state = registry.token_mut(token)?;
        state.allowances.insert((*owner, *spender), amount);
        Ok(())
    }

    /// Remaining allowance `owner` granted `spender`, or 0.
    pub fn allowance(&self, token: &TokenId, owner: &Address, spender: &Address) -> Amount {
        self.inner
            .lock()
            .tokens
            .get(token)
            .map(|state| state.allowance(owner, spender))
            .unwrap_or(0)
    }

    /// Moves `amount` of `from`'s own tokens to `to`.
    pub fn transfer(
        &self,
        token: &TokenId,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), TokenError> {
        let mut registry = self.inner.lock();
        registry.token_mut(token)?.move_tokens(from, to, amount)?;
        debug!(%token, %from, %to, amount, "token transfer");
        Ok(())
    }

    /// Moves `amount` from `from` to `to` on `spender`'s behalf, consuming
    /// the allowance `from` granted `spender`.
    pub fn transfer_from(
        &self,
        token: &TokenId,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), TokenError> {
        let mut registry = self.inner.lock();
        let state = registry.token_mut(token)?;

        let allowance = state.allowance(from, spender);
        if allowance < amount {
            return Err(TokenError::InsufficientAllowance { allowance, amount });
        }
        state.move_tokens(from, to, amount)?;
        if allowance != Amount::MAX {
            state.allowances.insert((*from, *spender), allowance - amount);
        }

        debug!(%token, %spender, %from, %to, amount, "token transfer_from");
        Ok(())
    }

    /// Balance of `who` in `token`, or 0 if either is unknown.
    pub fn balance_of(&self, token: &TokenId, who: &Address) -> Amount {
        self.inner
            .lock()
            .tokens
            .get(token)
            .map(|state| state.balance(who))
            .unwrap_or(0)
    }

    /// Total supply of `token`, or 0 if it does not exist.
    pub fn total_supply(&self, token: &TokenId) -> Amount {
        self.inner
            .lock()
            .token(token)
            .map(|state| state.info.total_supply)
            .unwrap_or(0)
    }

    /// Metadata for `token`, or `None` if it does not exist.
    pub fn token_info(&self, token: &TokenId) -> Option<TokenInfo> {
        self.inner.lock().tokens.get(token).map(|s| s.info.clone())
    }

    /// Looks a token up by symbol (case-insensitive).
    pub fn find_by_symbol(&self, symbol: &str) -> Option<TokenId> {
        self.inner
            .lock()
            .symbol_index
            .get(&symbol.to_uppercase())
            .copied()
    }

    /// Number of deployed tokens.
    pub fn token_count(&self) -> usize {
        self.inner.lock().tokens.len()
    }
}

impl TokenTransfer for TokenRegistry {
    fn pull(
        &self,
        token: &TokenId,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), TransferError> {
        self.transfer_from(token, to, from, to, amount)
            .map_err(|e| TransferError::new("token pull", e.to_string()))
    }

    fn push(
        &self,
        token: &TokenId,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), TransferError> {
        self.transfer(token, from, to, amount)
            .map_err(|e| TransferError::new("token push", e.to_string()))
    }
}
