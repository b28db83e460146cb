//! # Vault Module: Custodial Balances & Wrap/Unwrap
//!
//! The vault is where money lives. It holds the native asset and any number
//! of tokens on behalf of accounts, and converts between the native asset
//! and its wrapped token without changing anyone's economic position.
//!
//! ## Architecture
//!
//! ```text
//! balance.rs     -- BalanceSheet: the two custody tables, checked arithmetic
//! interfaces.rs  -- traits for the external transfer/wrap primitives
//! event.rs       -- append-only journal of committed operations
//! ledger.rs      -- Vault: the six operations, locking, rollback
//! ```
//!
//! ## Design Principles
//!
//! 1. **All amounts are `u128` in smallest units.** No floating point, ever.
//!
//! 2. **Effects before interactions.** A debit is committed before the
//!    external call that pays it out, so reentrant calls see it.
//!
//! 3. **Atomic or nothing.** A failed operation leaves every balance and the
//!    journal exactly as they were.
//!
//! 4. **Serializable state.** The balance sheet, events, and snapshots all
//!    derive `Serialize`/`Deserialize`.

pub mod balance;
pub mod event;
pub mod interfaces;
pub mod ledger;

pub use balance::{Asset, BalanceError, BalanceSheet};
pub use event::{EventJournal, EventRecord, VaultEvent};
pub use interfaces::{AssetWrapper, Collaborators, NativeAsset, TokenTransfer, TransferError};
pub use ledger::{LedgerSnapshot, Vault, VaultError};
