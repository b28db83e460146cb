//! # Event Journal
//!
//! Every successful balance-changing operation leaves one [`EventRecord`]
//! behind. Failed operations and zero-amount no-ops leave nothing. Sequence
//! numbers start at 1 and have no gaps, so a consumer that remembers the
//! last `seq` it saw can resume with [`EventJournal::since`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::primitives::{Address, Amount, TokenId};

/// A balance-changing operation, as observed by the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VaultEvent {
    /// Native asset moved into custody.
    NativeDeposited {
        /// Depositor.
        account: Address,
        /// Amount credited.
        amount: Amount,
    },
    /// Native asset released from custody.
    NativeWithdrawn {
        /// Withdrawer.
        account: Address,
        /// Amount debited and sent.
        amount: Amount,
    },
    /// Token pulled into custody.
    TokenDeposited {
        /// Depositor.
        account: Address,
        /// Token contract.
        token: TokenId,
        /// Amount credited.
        amount: Amount,
    },
    /// Token pushed out of custody.
    TokenWithdrawn {
        /// Withdrawer.
        account: Address,
        /// Token contract.
        token: TokenId,
        /// Amount debited and sent.
        amount: Amount,
    },
    /// Native balance reclassified as wrapped-token balance.
    Wrapped {
        /// Account whose balances moved.
        account: Address,
        /// Amount converted.
        amount: Amount,
    },
    /// Wrapped-token balance reclassified as native balance.
    Unwrapped {
        /// Account whose balances moved.
        account: Address,
        /// Amount converted.
        amount: Amount,
    },
}

impl VaultEvent {
    /// The account the event concerns.
    pub fn account(&self) -> &Address {
        match self {
            VaultEvent::NativeDeposited { account, .. }
            | VaultEvent::NativeWithdrawn { account, .. }
            | VaultEvent::TokenDeposited { account, .. }
            | VaultEvent::TokenWithdrawn { account, .. }
            | VaultEvent::Wrapped { account, .. }
            | VaultEvent::Unwrapped { account, .. } => account,
        }
    }

    /// Short machine-friendly name, used for logs and metrics labels.
    pub fn name(&self) -> &'static str {
        match self {
            VaultEvent::NativeDeposited { .. } => "native_deposited",
            VaultEvent::NativeWithdrawn { .. } => "native_withdrawn",
            VaultEvent::TokenDeposited { .. } => "token_deposited",
            VaultEvent::TokenWithdrawn { .. } => "token_withdrawn",
            VaultEvent::Wrapped { .. } => "wrapped",
            VaultEvent::Unwrapped { .. } => "unwrapped",
        }
    }
}

/// A journaled event with its position and wall-clock time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// 1-based, gap-free sequence number.
    pub seq: u64,
    /// When the operation committed (UTC).
    pub at: DateTime<Utc>,
    /// What happened.
    pub event: VaultEvent,
}

/// Append-only list of [`EventRecord`]s.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EventJournal {
    records: Vec<EventRecord>,
}

impl EventJournal {
    /// Creates an empty journal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event and returns its sequence number.
    pub fn record(&mut self, event: VaultEvent) -> u64 {
        let seq = self.last_seq() + 1;
        self.records.push(EventRecord {
            seq,
            at: Utc::now(),
            event,
        });
        seq
    }

    /// Sequence number of the latest event, or 0 if empty.
    pub fn last_seq(&self) -> u64 {
        self.records.last().map(|r| r.seq).unwrap_or(0)
    }

    /// All records, oldest first.
    pub fn all(&self) -> &[EventRecord] {
        &self.records
    }

    /// Records with `seq > after`.
    pub fn since(&self, after: u64) -> &[EventRecord] {
        // seq == index + 1
        let start = usize::try_from(after).unwrap_or(usize::MAX).min(self.records.len());
        &self.records[start..]
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
