//! # Addresses
//!
//! Every identity the vault deals with -- user accounts, token contracts,
//! the wrapped-native contract, the vault's own custody account -- is a
//! 20-byte [`Address`]. The vault never looks inside one. Addresses are map
//! keys and equality tokens, nothing more.
//!
//! The canonical text form is `0x` followed by 40 lowercase hex characters,
//! which is also the serde representation. That keeps JSON snapshots
//! readable and lets `HashMap<Address, _>` serialize as a JSON object
//! without a custom key adapter.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Length of an address in bytes.
pub const ADDRESS_LENGTH: usize = 20;

/// Identifier of a fungible-token contract. Token identities live in the
/// same address space as accounts.
pub type TokenId = Address;

/// Errors produced when parsing an address from text.
#[derive(Debug, Error, PartialEq)]
pub enum AddressError {
    /// The input was not valid hexadecimal.
    #[error("invalid hex in address: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// The input decoded to the wrong number of bytes.
    #[error("address must be {ADDRESS_LENGTH} bytes, got {0}")]
    InvalidLength(usize),
}

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// An opaque 20-byte identity.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address([u8; ADDRESS_LENGTH]);

impl Address {
    /// The all-zero address. Reserved: never a valid custodian or token.
    pub const ZERO: Address = Address([0u8; ADDRESS_LENGTH]);

    /// Creates an address from raw bytes.
    pub const fn from_bytes(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }

    /// Returns `true` for [`Address::ZERO`].
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_LENGTH]
    }

    /// Returns the `0x`-prefixed lowercase hex form.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Parses a hex address, with or without the `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, AddressError> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        let bytes = hex::decode(digits)?;
        if bytes.len() != ADDRESS_LENGTH {
            return Err(AddressError::InvalidLength(bytes.len()));
        }
        let mut arr = [0u8; ADDRESS_LENGTH];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// Derives a deterministic address from a human-readable label.
    ///
    /// Takes the first 20 bytes of `BLAKE3(label)`. The same label always
    /// maps to the same address, so tests and operator scripts can refer to
    /// `"alice"` instead of pasting hex around.
    pub fn derive(label: &str) -> Self {
        let digest = blake3::hash(label.as_bytes());
        let mut arr = [0u8; ADDRESS_LENGTH];
        arr.copy_from_slice(&digest.as_bytes()[..ADDRESS_LENGTH]);
        Self(arr)
    }

    /// Derives the address of a contract deployed by `deployer` with the
    /// given deployment `nonce`.
    ///
    /// The preimage is `deployer || 0x00 || nonce_le`. The separator keeps
    /// this namespace apart from [`Address::derive`] labels.
    pub fn contract(deployer: &Address, nonce: u64) -> Self {
        let mut preimage = Vec::with_capacity(ADDRESS_LENGTH + 9);
        preimage.extend_from_slice(&deployer.0);
        preimage.push(0x00);
        preimage.extend_from_slice(&nonce.to_le_bytes());
        let digest = blake3::hash(&preimage);
        let mut arr = [0u8; ADDRESS_LENGTH];
        arr.copy_from_slice(&digest.as_bytes()[..ADDRESS_LENGTH]);
        Self(arr)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({}...)", &self.to_hex()[..10])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
