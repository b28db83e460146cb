//! # Primitives
//!
//! The two value types everything else is built from: [`Address`] for
//! identities and [`Amount`] for quantities.

pub mod address;
pub mod units;

pub use address::{Address, AddressError, TokenId, ADDRESS_LENGTH};
pub use units::{format_ether, format_units, parse_ether, parse_units, Amount, UnitsError};
