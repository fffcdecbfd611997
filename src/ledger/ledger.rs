//! Value transfer ledger
//!
//! The wallet does not move value itself: executing a transfer hands the
//! credit over to a [`Ledger`]. [`InMemoryLedger`] keeps balances in memory
//! and can be told to refuse payments to specific recipients.

use crate::core::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Maximum number of transfers kept in the history
pub const MAX_TRANSFER_HISTORY: usize = 100;

/// Ledger errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Recipient rejected the transfer: {0}")]
    Rejected(Address),
    #[error("Cannot credit the zero address")]
    ZeroRecipient,
    #[error("Balance overflow for {0}")]
    Overflow(Address),
}

/// Receiving side of outgoing wallet transfers
pub trait Ledger {
    /// Credit `value` to `to`, delivering `data` alongside
    ///
    /// On error nothing may have been credited.
    fn credit(
        &mut self,
        from: &Address,
        to: &Address,
        value: u128,
        data: &[u8],
    ) -> Result<(), LedgerError>;

    /// Balance currently held by `address`
    fn balance_of(&self, address: &Address) -> u128;
}

/// A completed credit
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferRecord {
    pub from: Address,
    pub to: Address,
    pub value: u128,
    pub data_len: usize,
    pub timestamp: DateTime<Utc>,
}

/// Balances kept in memory
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InMemoryLedger {
    /// Balances: address -> amount
    balances: BTreeMap<Address, u128>,
    /// Recipients that refuse every credit
    rejecting: BTreeSet<Address>,
    /// Transfer history (last 100)
    history: Vec<TransferRecord>,
}

impl InMemoryLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `address` refuse all future credits
    pub fn reject_transfers_to(&mut self, address: Address) {
        self.rejecting.insert(address);
    }

    /// Let `address` receive credits again
    pub fn accept_transfers_to(&mut self, address: &Address) {
        self.rejecting.remove(address);
    }

    /// Check if `address` refuses credits
    pub fn is_rejecting(&self, address: &Address) -> bool {
        self.rejecting.contains(address)
    }

    /// Recent transfers, oldest first
    pub fn history(&self) -> &[TransferRecord] {
        &self.history
    }

    /// All holders with a non-zero balance
    pub fn holders(&self) -> Vec<(Address, u128)> {
        self.balances
            .iter()
            .filter(|(_, &b)| b > 0)
            .map(|(a, &b)| (*a, b))
            .collect()
    }
}

impl Ledger for InMemoryLedger {
    fn credit(
        &mut self,
        from: &Address,
        to: &Address,
        value: u128,
        data: &[u8],
    ) -> Result<(), LedgerError> {
        if to.is_zero() {
            return Err(LedgerError::ZeroRecipient);
        }
        if self.rejecting.contains(to) {
            return Err(LedgerError::Rejected(*to));
        }

        let current = self.balance_of(to);
        let updated = current
            .checked_add(value)
            .ok_or(LedgerError::Overflow(*to))?;
        self.balances.insert(*to, updated);

        self.history.push(TransferRecord {
            from: *from,
            to: *to,
            value,
            data_len: data.len(),
            timestamp: Utc::now(),
        });
        if self.history.len() > MAX_TRANSFER_HISTORY {
            self.history.remove(0);
        }

        log::debug!("Ledger credited {} to {} from {}", value, to, from);
        Ok(())
    }

    fn balance_of(&self, address: &Address) -> u128 {
        *self.balances.get(address).unwrap_or(&0)
    }
}
