//! # Vault Reference Contracts
//!
//! In-memory implementations of the primitives a vault calls out to:
//!
//! - **Native chain**: per-address balances of the native asset, with
//!   programmable receive hooks standing in for contract `receive()` code.
//! - **Token registry**: ERC20-style tokens with issuer-gated minting,
//!   allowances, and `transferFrom`.
//! - **WETH**: the 1:1 wrapped form of the native asset.
//! - **Chain**: a facade that owns all three and deploys vaults onto them.
//!
//! ## Design Principles
//!
//! 1. All monetary operations check for overflow. Wrapping arithmetic and
//!    money do not mix.
//! 2. Every operation either completes or leaves all balances untouched.
//! 3. No lock is held while user code (a receive hook) runs.

pub mod chain;
pub mod native;
pub mod token_registry;
pub mod weth;

pub use chain::Chain;
pub use native::{ChainError, NativeChain, ReceiveHook};
pub use token_registry::{TokenError, TokenInfo, TokenRegistry};
pub use weth::{Weth, WethError};
