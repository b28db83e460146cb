// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Vault Protocol: Core Library
//!
//! A custodial balance ledger. Accounts deposit the chain-native asset or
//! any fungible token, withdraw it again, and convert between the native
//! asset and its wrapped token. The ledger keeps the books. Moving real
//! assets is delegated to collaborators behind traits.
//!
//! ## Architecture
//!
//! - **primitives** -- Addresses and amounts. The whole vocabulary.
//! - **vault** -- Balance sheet, collaborator traits, event journal, and
//!   the [`Vault`](vault::Vault) itself.
//! - **config** -- Constants and the construction-time [`VaultConfig`](config::VaultConfig).
//!
//! ## Design Philosophy
//!
//! 1. Solvency first: the sum of balances always equals what is custodied.
//! 2. No partial effects: every operation commits fully or not at all.
//! 3. If it touches money, it has tests. Plural.

pub mod config;
pub mod primitives;
pub mod vault;

pub use config::VaultConfig;
pub use primitives::{Address, Amount, TokenId};
pub use vault::{Vault, VaultError};
