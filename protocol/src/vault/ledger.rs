//! # The Vault Ledger
//!
//! [`Vault`] owns a [`BalanceSheet`] and mediates every movement of value in
//! or out of it. Six operations change balances:
//!
//! ```text
//! deposit_native   external native  -> native[caller]
//! withdraw_native  native[caller]   -> external native
//! deposit_token    external token   -> tokens[caller][token]
//! withdraw_token   tokens[caller][token] -> external token
//! wrap_native      native[caller]   -> tokens[caller][WETH]
//! unwrap_wrapped   tokens[caller][WETH] -> native[caller]
//! ```
//!
//! ## Ordering
//!
//! Every operation follows the same shape:
//!
//! 1. Check sufficiency / overflow. Nothing has moved yet; failure is free.
//! 2. Debit the source cell (if it is a ledger cell).
//! 3. Call the external primitive.
//! 4. Credit the destination cell (if it is a ledger cell).
//!
//! Step 2 happens before step 3, so a collaborator that calls back into the
//! vault sees the decremented balance and cannot spend the same funds twice.
//! If step 3 fails, step 2 is compensated before the lock is released and
//! the caller gets [`VaultError::TransferFailed`].
//!
//! ## Locking
//!
//! A single `parking_lot::ReentrantMutex` serializes all operations across
//! threads. It is reentrant so that a collaborator calling back into the
//! vault on the same thread gets a normal answer (usually
//! `InsufficientBalance`) rather than a deadlock. The inner `RefCell` is
//! never borrowed across an external call.
//!
//! ## Solvency
//!
//! Each credit is paired with an inbound movement that has already
//! completed. Each debit is paired with an outbound movement about to
//! happen, or compensated. If a post-interaction credit ever overflows
//! (possible only if a reentrant call filled the cell in the meantime), the
//! surplus stays in custody uncredited: the ledger may under-report, never
//! over-report.

use std::cell::RefCell;

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::balance::{Asset, BalanceError, BalanceSheet};
use super::event::{EventJournal, EventRecord, VaultEvent};
use super::interfaces::{Collaborators, TransferError};
use crate::config::{ConfigError, VaultConfig};
use crate::primitives::{Address, Amount, TokenId};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors returned by vault operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VaultError {
    /// The caller's tracked balance is smaller than the requested amount.
    #[error("insufficient balance: available {available}, requested {requested} ({asset})")]
    InsufficientBalance {
        /// Which table was short.
        asset: Asset,
        /// The caller's balance.
        available: Amount,
        /// The amount asked for.
        requested: Amount,
    },

    /// An external transfer, pull, push, wrap, or unwrap reported failure.
    #[error("transfer failed: {0}")]
    TransferFailed(#[from] TransferError),

    /// Crediting the amount would overflow the caller's balance. Only
    /// raised by the pre-check, before anything has moved.
    #[error("balance overflow: current {current}, credit {credit} ({asset})")]
    BalanceOverflow {
        /// Which table would overflow.
        asset: Asset,
        /// The current balance.
        current: Amount,
        /// The amount that did not fit.
        credit: Amount,
    },

    /// The construction-time configuration is invalid.
    #[error("invalid vault configuration: {0}")]
    Config(#[from] ConfigError),

    /// The wrapper collaborator mints a different token than configured.
    #[error("wrapper mints {actual}, but the vault is configured for {configured}")]
    WrapperMismatch {
        /// Configured wrapped-token identity.
        configured: TokenId,
        /// Identity reported by the wrapper.
        actual: TokenId,
    },
}

impl From<BalanceError> for VaultError {
    fn from(err: BalanceError) -> Self {
        match err {
            BalanceError::InsufficientBalance {
                asset,
                available,
                requested,
                ..
            } => VaultError::InsufficientBalance {
                asset,
                available,
                requested,
            },
            BalanceError::Overflow {
                asset,
                current,
                credit,
                ..
            } => VaultError::BalanceOverflow {
                asset,
                current,
                credit,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// A point-in-time, serializable view of the whole ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    /// The custody account.
    pub custodian: Address,
    /// The wrapped-native token identity.
    pub wrapped_token: TokenId,
    /// Both balance tables.
    pub balances: BalanceSheet,
    /// Sequence number of the latest journaled event (0 if none).
    pub last_event_seq: u64,
}

// ---------------------------------------------------------------------------
// Vault
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct LedgerState {
    balances: BalanceSheet,
    journal: EventJournal,
}

type StateGuard<'a> = ReentrantMutexGuard<'a, RefCell<LedgerState>>;

/// The custodial balance ledger.
///
/// `Vault` is `Send + Sync`; share it behind an `Arc`. All operations take
/// `&self`.
pub struct Vault {
    config: VaultConfig,
    collaborators: Collaborators,
    state: ReentrantMutex<RefCell<LedgerState>>,
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Vault {
    /// Creates an empty vault.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Config`] if `config` fails validation and
    /// [`VaultError::WrapperMismatch`] if the wrapper collaborator does not
    /// mint `config.wrapped_token`.
    pub fn new(config: VaultConfig, collaborators: Collaborators) -> Result<Self, VaultError> {
        config.validate()?;
        let actual = collaborators.wrapper.wrapped_token();
        if actual != config.wrapped_token {
            return Err(VaultError::WrapperMismatch {
                configured: config.wrapped_token,
                actual,
            });
        }

        info!(
            custodian = %config.custodian,
            wrapped_token = %config.wrapped_token,
            "vault created"
        );

        Ok(Self {
            config,
            collaborators,
            state: ReentrantMutex::new(RefCell::new(LedgerState::default())),
        })
    }

    /// The construction-time configuration.
    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// The account under which the vault custodies assets.
    pub fn custodian(&self) -> Address {
        self.config.custodian
    }

    /// The wrapped-native token identity.
    pub fn wrapped_token(&self) -> TokenId {
        self.config.wrapped_token
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Native balance held for `account`.
    pub fn native_balance(&self, account: &Address) -> Amount {
        self.state.lock().borrow().balances.native_balance(account)
    }

    /// Balance of `token` held for `account`.
    pub fn token_balance(&self, account: &Address, token: &TokenId) -> Amount {
        self.state.lock().borrow().balances.token_balance(account, token)
    }

    /// Sum of all native balances. Equals the custodian's native holdings.
    pub fn total_native(&self) -> Amount {
        self.state.lock().borrow().balances.total_native()
    }

    /// Sum of all balances of `token`. Equals the custodian's holdings of it.
    pub fn total_token(&self, token: &TokenId) -> Amount {
        self.state.lock().borrow().balances.total_token(token)
    }

    /// A consistent copy of the whole ledger.
    pub fn snapshot(&self) -> LedgerSnapshot {
        let guard = self.state.lock();
        let state = guard.borrow();
        LedgerSnapshot {
            custodian: self.config.custodian,
            wrapped_token: self.config.wrapped_token,
            balances: state.balances.clone(),
            last_event_seq: state.journal.last_seq(),
        }
    }

    /// Every journaled event, oldest first.
    pub fn events(&self) -> Vec<EventRecord> {
        self.state.lock().borrow().journal.all().to_vec()
    }

    /// Journaled events with `seq > after`.
    pub fn events_since(&self, after: u64) -> Vec<EventRecord> {
        self.state.lock().borrow().journal.since(after).to_vec()
    }

    // -----------------------------------------------------------------------
    // Native asset
    // -----------------------------------------------------------------------

    /// Moves `amount` of the caller's native asset into custody and credits
    /// it. Returns the caller's new native balance.
    ///
    /// # Errors
    ///
    /// [`VaultError::TransferFailed`] if the inbound transfer fails;
    /// [`VaultError::BalanceOverflow`] if the credit would not fit. The
    /// ledger is unchanged in both cases.
    pub fn deposit_native(&self, caller: &Address, amount: Amount) -> Result<Amount, VaultError> {
        let guard = self.state.lock();
        if amount == 0 {
            return Ok(Self::current(&guard, caller, Asset::Native));
        }
        guard
            .borrow()
            .balances
            .ensure_can_credit(caller, Asset::Native, amount)?;

        self.collaborators
            .native
            .transfer(caller, &self.config.custodian, amount)
            .map_err(|err| self.rejected("deposit_native", caller, amount, err))?;

        let balance = self.credit_after_interaction(&guard, caller, Asset::Native, amount);
        self.commit(&guard, VaultEvent::NativeDeposited {
            account: *caller,
            amount,
        });
        Ok(balance)
    }

    /// Debits `amount` from the caller's native balance and sends it to the
    /// caller. Returns the caller's remaining native balance.
    ///
    /// # Errors
    ///
    /// [`VaultError::InsufficientBalance`] if the balance is short;
    /// [`VaultError::TransferFailed`] if the outbound transfer fails (the
    /// debit is rolled back).
    pub fn withdraw_native(&self, caller: &Address, amount: Amount) -> Result<Amount, VaultError> {
        let guard = self.state.lock();
        if amount == 0 {
            return Ok(Self::current(&guard, caller, Asset::Native));
        }
        self.debit_before_interaction(&guard, "withdraw_native", caller, Asset::Native, amount)?;

        if let Err(err) = self
            .collaborators
            .native
            .transfer(&self.config.custodian, caller, amount)
        {
            self.compensate(&guard, caller, Asset::Native, amount);
            return Err(self.rejected("withdraw_native", caller, amount, err));
        }

        self.commit(&guard, VaultEvent::NativeWithdrawn {
            account: *caller,
            amount,
        });
        Ok(Self::current(&guard, caller, Asset::Native))
    }

    // -----------------------------------------------------------------------
    // Tokens
    // -----------------------------------------------------------------------

    /// Pulls `amount` of `token` from the caller into custody and credits
    /// it. The caller must have authorized the custodian beforehand.
    /// Returns the caller's new balance of `token`.
    ///
    /// # Errors
    ///
    /// [`VaultError::TransferFailed`] if the pull fails (missing allowance,
    /// short balance, unknown token); [`VaultError::BalanceOverflow`] if the
    /// credit would not fit. The ledger is unchanged in both cases.
    pub fn deposit_token(
        &self,
        caller: &Address,
        token: &TokenId,
        amount: Amount,
    ) -> Result<Amount, VaultError> {
        let guard = self.state.lock();
        let asset = Asset::Token(*token);
        if amount == 0 {
            return Ok(Self::current(&guard, caller, asset));
        }
        guard
            .borrow()
            .balances
            .ensure_can_credit(caller, asset, amount)?;

        self.collaborators
            .tokens
            .pull(token, caller, &self.config.custodian, amount)
            .map_err(|err| self.rejected("deposit_token", caller, amount, err))?;

        let balance = self.credit_after_interaction(&guard, caller, asset, amount);
        self.commit(&guard, VaultEvent::TokenDeposited {
            account: *caller,
            token: *token,
            amount,
        });
        Ok(balance)
    }

    /// Debits `amount` of `token` from the caller and pushes it to the
    /// caller. Returns the caller's remaining balance of `token`.
    ///
    /// # Errors
    ///
    /// [`VaultError::InsufficientBalance`] if the balance is short;
    /// [`VaultError::TransferFailed`] if the push fails (the debit is
    /// rolled back).
    pub fn withdraw_token(
        &self,
        caller: &Address,
        token: &TokenId,
        amount: Amount,
    ) -> Result<Amount, VaultError> {
        let guard = self.state.lock();
        let asset = Asset::Token(*token);
        if amount == 0 {
            return Ok(Self::current(&guard, caller, asset));
        }
        self.debit_before_interaction(&guard, "withdraw_token", caller, asset, amount)?;

        if let Err(err) = self
            .collaborators
            .tokens
            .push(token, &self.config.custodian, caller, amount)
        {
            self.compensate(&guard, caller, asset, amount);
            return Err(self.rejected("withdraw_token", caller, amount, err));
        }

        self.commit(&guard, VaultEvent::TokenWithdrawn {
            account: *caller,
            token: *token,
            amount,
        });
        Ok(Self::current(&guard, caller, asset))
    }

    // -----------------------------------------------------------------------
    // Wrap / unwrap
    // -----------------------------------------------------------------------

    /// Converts `amount` of the caller's native balance into the same
    /// amount of wrapped-token balance. Returns the caller's new
    /// wrapped-token balance.
    ///
    /// # Errors
    ///
    /// [`VaultError::InsufficientBalance`] if the native balance is short;
    /// [`VaultError::BalanceOverflow`] if the wrapped balance would not fit;
    /// [`VaultError::TransferFailed`] if the wrapper fails (the native debit
    /// is rolled back).
    pub fn wrap_native(&self, caller: &Address, amount: Amount) -> Result<Amount, VaultError> {
        let wrapped = Asset::Token(self.config.wrapped_token);
        let guard = self.state.lock();
        if amount == 0 {
            return Ok(Self::current(&guard, caller, wrapped));
        }
        guard
            .borrow()
            .balances
            .ensure_can_credit(caller, wrapped, amount)?;
        self.debit_before_interaction(&guard, "wrap_native", caller, Asset::Native, amount)?;

        if let Err(err) = self
            .collaborators
            .wrapper
            .wrap(&self.config.custodian, amount)
        {
            self.compensate(&guard, caller, Asset::Native, amount);
            return Err(self.rejected("wrap_native", caller, amount, err));
        }

        let balance = self.credit_after_interaction(&guard, caller, wrapped, amount);
        self.commit(&guard, VaultEvent::Wrapped {
            account: *caller,
            amount,
        });
        Ok(balance)
    }

    /// Converts `amount` of the caller's wrapped-token balance back into
    /// native balance. Returns the caller's new native balance.
    ///
    /// # Errors
    ///
    /// [`VaultError::InsufficientBalance`] if the wrapped balance is short;
    /// [`VaultError::BalanceOverflow`] if the native balance would not fit;
    /// [`VaultError::TransferFailed`] if the wrapper fails (the wrapped
    /// debit is rolled back).
    pub fn unwrap_wrapped(&self, caller: &Address, amount: Amount) -> Result<Amount, VaultError> {
        let wrapped = Asset::Token(self.config.wrapped_token);
        let guard = self.state.lock();
        if amount == 0 {
            return Ok(Self::current(&guard, caller, Asset::Native));
        }
        guard
            .borrow()
            .balances
            .ensure_can_credit(caller, Asset::Native, amount)?;
        self.debit_before_interaction(&guard, "unwrap_wrapped", caller, wrapped, amount)?;

        if let Err(err) = self
            .collaborators
            .wrapper
            .unwrap(&self.config.custodian, amount)
        {
            self.compensate(&guard, caller, wrapped, amount);
            return Err(self.rejected("unwrap_wrapped", caller, amount, err));
        }

        let balance = self.credit_after_interaction(&guard, caller, Asset::Native, amount);
        self.commit(&guard, VaultEvent::Unwrapped {
            account: *caller,
            amount,
        });
        Ok(balance)
    }

    // -----------------------------------------------------------------------
    // Internal Helpers
    // -----------------------------------------------------------------------

    fn current(guard: &StateGuard<'_>, caller: &Address, asset: Asset) -> Amount {
        guard.borrow().balances.balance(caller, asset)
    }

    /// Step 2: commit the debit before any external call.
    fn debit_before_interaction(
        &self,
        guard: &StateGuard<'_>,
        operation: &'static str,
        caller: &Address,
        asset: Asset,
        amount: Amount,
    ) -> Result<Amount, VaultError> {
        let debited = guard.borrow_mut().balances.debit(caller, asset, amount);
        debited.map_err(|err| {
            warn!(%caller, %asset, amount, operation, error = %err, "operation rejected");
            VaultError::from(err)
        })
    }

    /// Step 4: credit the destination after the external call completed.
    ///
    /// The interaction already happened, so this cannot fail the operation.
    /// An overflow here leaves the surplus uncredited in custody and returns
    /// the unchanged balance.
    fn credit_after_interaction(
        &self,
        guard: &StateGuard<'_>,
        caller: &Address,
        asset: Asset,
        amount: Amount,
    ) -> Amount {
        let credited = guard.borrow_mut().balances.credit(caller, asset, amount);
        match credited {
            Ok(balance) => balance,
            Err(err) => {
                error!(
                    %caller, %asset, amount, error = %err,
                    "credit overflowed after completed interaction; surplus left uncredited in custody"
                );
                Self::current(guard, caller, asset)
            }
        }
    }

    /// Reverses a step-2 debit after the external call failed.
    fn compensate(&self, guard: &StateGuard<'_>, caller: &Address, asset: Asset, amount: Amount) {
        let restored = guard.borrow_mut().balances.credit(caller, asset, amount);
        match restored {
            Ok(balance) => debug!(%caller, %asset, amount, balance, "debit rolled back"),
            Err(err) => error!(
                %caller, %asset, amount, error = %err,
                "rollback overflowed; funds remain in custody uncredited"
            ),
        }
    }

    fn rejected(
        &self,
        operation: &'static str,
        caller: &Address,
        amount: Amount,
        err: TransferError,
    ) -> VaultError {
        warn!(%caller, amount, operation, error = %err, "external interaction failed");
        VaultError::TransferFailed(err)
    }

    fn commit(&self, guard: &StateGuard<'_>, event: VaultEvent) {
        let name = event.name();
        let account = *event.account();
        let seq = guard.borrow_mut().journal.record(event);
        debug!(seq, %account, event = name, "vault operation committed");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::interfaces::{AssetWrapper, NativeAsset, TokenTransfer};
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;

    // -- Mock collaborators -------------------------------------------------

    type Hook = Box<dyn Fn() + Send + Sync>;

    /// Records holdings per (asset, address) and can be told to fail.
    #[derive(Default)]
    struct MockChain {
        holdings: Mutex<HashMap<(Asset, Address), Amount>>,
        fail_native: Mutex<bool>,
        fail_tokens: Mutex<bool>,
        fail_wrapper: Mutex<bool>,
        on_native_out: Mutex<Option<Hook>>,
        on_wrap: Mutex<Option<Hook>>,
        weth: TokenId,
    }

    impl MockChain {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                weth: Address::derive("weth"),
                ..Default::default()
            })
        }

        fn fund(&self, asset: Asset, who: &Address, amount: Amount) {
            let mut h = self.holdings.lock();
            let held = h.entry((asset, *who)).or_insert(0);
            *held = held.saturating_add(amount);
        }

        fn held(&self, asset: Asset, who: &Address) -> Amount {
            self.holdings.lock().get(&(asset, *who)).copied().unwrap_or(0)
        }

        fn mv(&self, asset: Asset, from: &Address, to: &Address, amount: Amount) -> Result<(), String> {
            let mut h = self.holdings.lock();
            let src = h.entry((asset, *from)).or_insert(0);
            if *src < amount {
                return Err(format!("{} < {}", src, amount));
            }
            *src -= amount;
            let dst = h.entry((asset, *to)).or_insert(0);
            *dst = dst.saturating_add(amount);
            Ok(())
        }
    }

    impl NativeAsset for MockChain {
        fn transfer(&self, from: &Address, to: &Address, amount: Amount) -> Result<(), TransferError> {
            if *self.fail_native.lock() {
                return Err(TransferError::new("native transfer", "rejected"));
            }
            self.mv(Asset::Native, from, to, amount)
                .map_err(|r| TransferError::new("native transfer", r))?;
            if *to != vault_addr() {
                let hook = self.on_native_out.lock().take();
                if let Some(hook) = hook {
                    hook();
                }
            }
            Ok(())
        }
    }

    impl TokenTransfer for MockChain {
        fn pull(&self, token: &TokenId, from: &Address, to: &Address, amount: Amount) -> Result<(), TransferError> {
            if *self.fail_tokens.lock() {
                return Err(TransferError::new("token pull", "not approved"));
            }
            self.mv(Asset::Token(*token), from, to, amount)
                .map_err(|r| TransferError::new("token pull", r))
        }

        fn push(&self, token: &TokenId, from: &Address, to: &Address, amount: Amount) -> Result<(), TransferError> {
            if *self.fail_tokens.lock() {
                return Err(TransferError::new("token push", "paused"));
            }
            self.mv(Asset::Token(*token), from, to, amount)
                .map_err(|r| TransferError::new("token push", r))
        }
    }

    impl AssetWrapper for MockChain {
        fn wrapped_token(&self) -> TokenId {
            self.weth
        }

        fn wrap(&self, holder: &Address, amount: Amount) -> Result<(), TransferError> {
            if *self.fail_wrapper.lock() {
                return Err(TransferError::new("wrap", "wrapper down"));
            }
            self.mv(Asset::Native, holder, &self.weth, amount)
                .map_err(|r| TransferError::new("wrap", r))?;
            self.fund(Asset::Token(self.weth), holder, amount);
            let hook = self.on_wrap.lock().take();
            if let Some(hook) = hook {
                hook();
            }
            Ok(())
        }

        fn unwrap(&self, holder: &Address, amount: Amount) -> Result<(), TransferError> {
            if *self.fail_wrapper.lock() {
                return Err(TransferError::new("unwrap", "wrapper down"));
            }
            let weth = Asset::Token(self.weth);
            self.mv(weth, holder, &Address::ZERO, amount)
                .map_err(|r| TransferError::new("unwrap", r))?;
            self.mv(Asset::Native, &self.weth, holder, amount)
                .map_err(|r| TransferError::new("unwrap", r))
        }
    }

    fn vault_addr() -> Address {
        Address::derive("vault")
    }

    fn alice() -> Address {
        Address::derive("alice")
    }

    fn usdc() -> TokenId {
        Address::derive("usdc")
    }

    fn setup() -> (Arc<Vault>, Arc<MockChain>) {
        let chain = MockChain::new();
        let collab = Collaborators::new(chain.clone(), chain.clone(), chain.clone());
        let vault = Vault::new(VaultConfig::new(vault_addr(), chain.weth), collab).unwrap();
        (Arc::new(vault), chain)
    }

    fn assert_solvent(vault: &Vault, chain: &MockChain) {
        assert_eq!(vault.total_native(), chain.held(Asset::Native, &vault_addr()));
        assert_eq!(
            vault.total_token(&vault.wrapped_token()),
            chain.held(Asset::Token(vault.wrapped_token()), &vault_addr())
        );
        assert_eq!(vault.total_token(&usdc()), chain.held(Asset::Token(usdc()), &vault_addr()));
    }

    // -- Construction -------------------------------------------------------

    #[test]
    fn rejects_invalid_config() {
        let chain = MockChain::new();
        let collab = Collaborators::new(chain.clone(), chain.clone(), chain.clone());
        let err = Vault::new(VaultConfig::new(Address::ZERO, chain.weth), collab).unwrap_err();
        assert_eq!(err, VaultError::Config(ConfigError::ZeroCustodian));
    }

    #[test]
    fn rejects_wrapper_for_other_token() {
        let chain = MockChain::new();
        let collab = Collaborators::new(chain.clone(), chain.clone(), chain.clone());
        let other = Address::derive("not-weth");
        let err = Vault::new(VaultConfig::new(vault_addr(), other), collab).unwrap_err();
        assert!(matches!(err, VaultError::WrapperMismatch { configured, .. } if configured == other));
    }

    // -- Native -------------------------------------------------------------

    #[test]
    fn deposit_then_withdraw_native() {
        let (vault, chain) = setup();
        chain.fund(Asset::Native, &alice(), 1_000);

        assert_eq!(vault.deposit_native(&alice(), 1_000).unwrap(), 1_000);
        assert_eq!(chain.held(Asset::Native, &alice()), 0);
        assert_eq!(vault.withdraw_native(&alice(), 500).unwrap(), 500);
        assert_eq!(vault.native_balance(&alice()), 500);
        assert_eq!(chain.held(Asset::Native, &alice()), 500);
        assert_solvent(&vault, &chain);
    }

    #[test]
    fn withdraw_more_than_balance_fails_cleanly() {
        let (vault, chain) = setup();
        chain.fund(Asset::Native, &alice(), 1_000);
        vault.deposit_native(&alice(), 1_000).unwrap();

        let err = vault.withdraw_native(&alice(), 2_000).unwrap_err();
        assert_eq!(
            err,
            VaultError::InsufficientBalance {
                asset: Asset::Native,
                available: 1_000,
                requested: 2_000,
            }
        );
        assert_eq!(vault.native_balance(&alice()), 1_000);
        assert_eq!(vault.events().len(), 1);
        assert_solvent(&vault, &chain);
    }

    #[test]
    fn failed_inbound_transfer_leaves_no_trace() {
        let (vault, chain) = setup();
        // Alice has nothing on-chain.
        let err = vault.deposit_native(&alice(), 10).unwrap_err();
        assert!(matches!(err, VaultError::TransferFailed(_)));
        assert_eq!(vault.native_balance(&alice()), 0);
        assert!(vault.events().is_empty());
        assert_solvent(&vault, &chain);
    }

    #[test]
    fn failed_outbound_transfer_rolls_back_debit() {
        let (vault, chain) = setup();
        chain.fund(Asset::Native, &alice(), 100);
        vault.deposit_native(&alice(), 100).unwrap();

        *chain.fail_native.lock() = true;
        let err = vault.withdraw_native(&alice(), 60).unwrap_err();
        assert!(matches!(err, VaultError::TransferFailed(ref e) if e.operation == "native transfer"));
        assert_eq!(vault.native_balance(&alice()), 100);
        assert_eq!(vault.events().len(), 1);
        assert_solvent(&vault, &chain);
    }

    #[test]
    fn deposit_overflow_rejected_before_transfer() {
        let (vault, chain) = setup();
        chain.fund(Asset::Native, &alice(), u128::MAX);
        vault.deposit_native(&alice(), u128::MAX - 5).unwrap();

        let err = vault.deposit_native(&alice(), 10).unwrap_err();
        assert!(matches!(err, VaultError::BalanceOverflow { asset: Asset::Native, .. }));
        // Nothing moved on-chain for the rejected deposit.
        assert_eq!(chain.held(Asset::Native, &alice()), 5);
        assert_solvent(&vault, &chain);
    }

    #[test]
    fn reentrant_fill_during_wrap_keeps_wrap_committed() {
        let (vault, chain) = setup();
        let weth = vault.wrapped_token();
        chain.fund(Asset::Token(weth), &alice(), u128::MAX - 5);
        vault.deposit_token(&alice(), &weth, u128::MAX - 10).unwrap();
        chain.fund(Asset::Native, &alice(), 10);
        vault.deposit_native(&alice(), 10).unwrap();

        // Tops the wrapped cell up to MAX - 5 while the wrap is in flight.
        let reentrant = Arc::clone(&vault);
        *chain.on_wrap.lock() = Some(Box::new(move || {
            reentrant.deposit_token(&alice(), &weth, 5).unwrap();
        }));

        let balance = vault.wrap_native(&alice(), 10).unwrap();
        assert_eq!(balance, u128::MAX - 5);
        assert_eq!(vault.token_balance(&alice(), &weth), u128::MAX - 5);
        assert_eq!(vault.native_balance(&alice()), 0);
        assert_eq!(chain.held(Asset::Native, &vault_addr()), 0);
        assert_eq!(vault.events().last().unwrap().event.name(), "wrapped");
        // Under-reports, never over-reports.
        assert!(vault.total_token(&weth) <= chain.held(Asset::Token(weth), &vault_addr()));
    }

    #[test]
    fn zero_amounts_are_no_ops() {
        let (vault, chain) = setup();
        *chain.fail_native.lock() = true;
        *chain.fail_tokens.lock() = true;
        *chain.fail_wrapper.lock() = true;

        assert_eq!(vault.deposit_native(&alice(), 0).unwrap(), 0);
        assert_eq!(vault.withdraw_native(&alice(), 0).unwrap(), 0);
        assert_eq!(vault.deposit_token(&alice(), &usdc(), 0).unwrap(), 0);
        assert_eq!(vault.withdraw_token(&alice(), &usdc(), 0).unwrap(), 0);
        assert_eq!(vault.wrap_native(&alice(), 0).unwrap(), 0);
        assert_eq!(vault.unwrap_wrapped(&alice(), 0).unwrap(), 0);
        assert!(vault.events().is_empty());
        assert!(vault.snapshot().balances.is_empty());
    }

    // -- Tokens -------------------------------------------------------------

    #[test]
    fn token_deposit_and_withdraw() {
        let (vault, chain) = setup();
        chain.fund(Asset::Token(usdc()), &alice(), 1_000);

        assert_eq!(vault.deposit_token(&alice(), &usdc(), 100).unwrap(), 100);
        let err = vault.withdraw_token(&alice(), &usdc(), 200).unwrap_err();
        assert!(matches!(err, VaultError::InsufficientBalance { requested: 200, .. }));
        assert_eq!(vault.token_balance(&alice(), &usdc()), 100);

        assert_eq!(vault.withdraw_token(&alice(), &usdc(), 50).unwrap(), 50);
        assert_eq!(chain.held(Asset::Token(usdc()), &alice()), 950);
        assert_solvent(&vault, &chain);
    }

    #[test]
    fn failed_pull_is_transfer_failed() {
        let (vault, chain) = setup();
        chain.fund(Asset::Token(usdc()), &alice(), 1_000);
        *chain.fail_tokens.lock() = true;

        let err = vault.deposit_token(&alice(), &usdc(), 100).unwrap_err();
        assert!(matches!(err, VaultError::TransferFailed(_)));
        assert_eq!(vault.token_balance(&alice(), &usdc()), 0);
    }

    #[test]
    fn failed_push_rolls_back() {
        let (vault, chain) = setup();
        chain.fund(Asset::Token(usdc()), &alice(), 1_000);
        vault.deposit_token(&alice(), &usdc(), 300).unwrap();

        *chain.fail_tokens.lock() = true;
        assert!(vault.withdraw_token(&alice(), &usdc(), 300).is_err());
        assert_eq!(vault.token_balance(&alice(), &usdc()), 300);
        assert_solvent(&vault, &chain);
    }

    // -- Wrap / unwrap ------------------------------------------------------

    #[test]
    fn wrap_and_unwrap_reclassify_balances() {
        let (vault, chain) = setup();
        let weth = vault.wrapped_token();
        chain.fund(Asset::Native, &alice(), 1_000);
        vault.deposit_native(&alice(), 1_000).unwrap();

        assert_eq!(vault.wrap_native(&alice(), 1_000).unwrap(), 1_000);
        assert_eq!(vault.native_balance(&alice()), 0);
        assert_eq!(vault.token_balance(&alice(), &weth), 1_000);
        assert_solvent(&vault, &chain);

        assert_eq!(vault.unwrap_wrapped(&alice(), 500).unwrap(), 500);
        assert_eq!(vault.token_balance(&alice(), &weth), 500);
        assert_solvent(&vault, &chain);

        let err = vault.unwrap_wrapped(&alice(), 2_000).unwrap_err();
        assert!(matches!(err, VaultError::InsufficientBalance { asset: Asset::Token(t), .. } if t == weth));
        assert_eq!(vault.native_balance(&alice()), 500);
        assert_eq!(vault.token_balance(&alice(), &weth), 500);
    }

    #[test]
    fn wrap_more_than_native_fails() {
        let (vault, chain) = setup();
        chain.fund(Asset::Native, &alice(), 10);
        vault.deposit_native(&alice(), 10).unwrap();
        assert!(matches!(
            vault.wrap_native(&alice(), 11),
            Err(VaultError::InsufficientBalance { asset: Asset::Native, .. })
        ));
        assert_eq!(vault.native_balance(&alice()), 10);
    }

    #[test]
    fn failed_wrap_and_unwrap_roll_back() {
        let (vault, chain) = setup();
        let weth = vault.wrapped_token();
        chain.fund(Asset::Native, &alice(), 100);
        vault.deposit_native(&alice(), 100).unwrap();
        vault.wrap_native(&alice(), 40).unwrap();

        *chain.fail_wrapper.lock() = true;
        assert!(matches!(vault.wrap_native(&alice(), 10), Err(VaultError::TransferFailed(_))));
        assert!(matches!(vault.unwrap_wrapped(&alice(), 10), Err(VaultError::TransferFailed(_))));
        assert_eq!(vault.native_balance(&alice()), 60);
        assert_eq!(vault.token_balance(&alice(), &weth), 40);
        assert_solvent(&vault, &chain);
    }

    // -- Reentrancy & concurrency ------------------------------------------

    #[test]
    fn reentrant_withdraw_sees_committed_debit() {
        let (vault, chain) = setup();
        chain.fund(Asset::Native, &alice(), 100);
        vault.deposit_native(&alice(), 100).unwrap();

        let inner_result: Arc<Mutex<Option<Result<Amount, VaultError>>>> = Arc::new(Mutex::new(None));
        {
            let vault = Arc::clone(&vault);
            let inner_result = Arc::clone(&inner_result);
            *chain.on_native_out.lock() = Some(Box::new(move || {
                *inner_result.lock() = Some(vault.withdraw_native(&alice(), 100));
            }));
        }

        assert_eq!(vault.withdraw_native(&alice(), 100).unwrap(), 0);
        let inner = inner_result.lock().take().expect("hook ran");
        assert!(matches!(inner, Err(VaultError::InsufficientBalance { available: 0, .. })));
        assert_eq!(chain.held(Asset::Native, &alice()), 100);
        assert_solvent(&vault, &chain);
    }

    #[test]
    fn concurrent_deposits_are_serialized() {
        let (vault, chain) = setup();
        let users: Vec<Address> = (0..8).map(|i| Address::derive(&format!("user-{i}"))).collect();
        for u in &users {
            chain.fund(Asset::Native, u, 1_000);
        }

        let handles: Vec<_> = users
            .iter()
            .map(|u| {
                let vault = Arc::clone(&vault);
                let u = *u;
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        vault.deposit_native(&u, 10).unwrap();
                    }
                    for _ in 0..50 {
                        vault.withdraw_native(&u, 10).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        for u in &users {
            assert_eq!(vault.native_balance(u), 500);
        }
        assert_eq!(vault.events().len(), 8 * 150);
        assert_solvent(&vault, &chain);
    }

    // -- Journal & snapshot -------------------------------------------------

    #[test]
    fn successful_operations_are_journaled_in_order() {
        let (vault, chain) = setup();
        chain.fund(Asset::Native, &alice(), 10);
        vault.deposit_native(&alice(), 10).unwrap();
        vault.wrap_native(&alice(), 4).unwrap();
        vault.unwrap_wrapped(&alice(), 1).unwrap();
        vault.withdraw_native(&alice(), 7).unwrap();

        let names: Vec<&str> = vault.events().iter().map(|r| r.event.name()).collect();
        assert_eq!(names, vec!["native_deposited", "wrapped", "unwrapped", "native_withdrawn"]);
        assert_eq!(vault.events_since(2).len(), 2);
        assert_eq!(vault.snapshot().last_event_seq, 4);
    }

    #[test]
    fn snapshot_serialization_roundtrip() {
        let (vault, chain) = setup();
        chain.fund(Asset::Native, &alice(), 10);
        vault.deposit_native(&alice(), 10).unwrap();

        let snap = vault.snapshot();
        let json = serde_json::to_string(&snap).expect("serialize");
        let recovered: LedgerSnapshot = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(recovered, snap);
        assert_eq!(recovered.balances.native_balance(&alice()), 10);
    }
}
