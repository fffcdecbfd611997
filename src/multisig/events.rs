//! Facts emitted by the wallet
//!
//! Every mutating operation returns the events it produced, in order, inside
//! a [`Receipt`]. A log of these events is enough to rebuild the owner set,
//! threshold, balance and transaction states, see [`EventReplay`].

use crate::core::Address;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

/// A state transition of the wallet
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletEvent {
    WalletCreated {
        wallet: Address,
        owners: Vec<Address>,
        required: usize,
    },
    Deposit {
        sender: Address,
        amount: u128,
        balance: u128,
    },
    TransactionSubmitted {
        index: u64,
        creator: Address,
        to: Address,
        value: u128,
    },
    TransactionConfirmed {
        index: u64,
        confirmed_by: Address,
    },
    ConfirmationRevoked {
        index: u64,
        revoked_by: Address,
    },
    TransactionExecuted {
        index: u64,
        to: Address,
        value: u128,
        executed_by: Address,
    },
    OwnerAdded {
        new_owner: Address,
    },
    OwnerRemoved {
        owner: Address,
    },
    RequirementChanged {
        requirement: usize,
    },
}

impl fmt::Display for WalletEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalletEvent::WalletCreated {
                wallet,
                owners,
                required,
            } => write!(
                f,
                "WalletCreated {} ({}-of-{})",
                wallet,
                required,
                owners.len()
            ),
            WalletEvent::Deposit {
                sender,
                amount,
                balance,
            } => write!(f, "Deposit {} from {} (balance {})", amount, sender, balance),
            WalletEvent::TransactionSubmitted {
                index,
                creator,
                to,
                value,
            } => write!(
                f,
                "TransactionSubmitted #{} by {} -> {} ({})",
                index, creator, to, value
            ),
            WalletEvent::TransactionConfirmed {
                index,
                confirmed_by,
            } => write!(f, "TransactionConfirmed #{} by {}", index, confirmed_by),
            WalletEvent::ConfirmationRevoked { index, revoked_by } => {
                write!(f, "ConfirmationRevoked #{} by {}", index, revoked_by)
            }
            WalletEvent::TransactionExecuted {
                index,
                to,
                value,
                executed_by,
            } => write!(
                f,
                "TransactionExecuted #{} -> {} ({}) by {}",
                index, to, value, executed_by
            ),
            WalletEvent::OwnerAdded { new_owner } => write!(f, "OwnerAdded {}", new_owner),
            WalletEvent::OwnerRemoved { owner } => write!(f, "OwnerRemoved {}", owner),
            WalletEvent::RequirementChanged { requirement } => {
                write!(f, "RequirementChanged {}", requirement)
            }
        }
    }
}

/// Result of a successful mutating call together with the events it emitted
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt<T> {
    pub output: T,
    pub events: Vec<WalletEvent>,
}

impl<T> Receipt<T> {
    pub fn new(output: T, events: Vec<WalletEvent>) -> Self {
        Self { output, events }
    }

    /// Discard the events
    pub fn into_output(self) -> T {
        self.output
    }
}

/// Errors found while replaying an event log
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReplayError {
    #[error("Event log must start with WalletCreated")]
    MissingGenesis,
    #[error("Duplicate WalletCreated at position {0}")]
    DuplicateGenesis(usize),
    #[error("Transaction {index} submitted out of order (expected {expected})")]
    OutOfOrder { index: u64, expected: u64 },
    #[error("Event at position {position} references unknown transaction {index}")]
    UnknownTransaction { position: usize, index: u64 },
    #[error("Inconsistent event at position {position}: {reason}")]
    Inconsistent { position: usize, reason: String },
}

/// A transaction as seen through the event log
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct ReplayedTransaction {
    pub to: Address,
    pub value: u128,
    pub confirmed_by: BTreeSet<Address>,
    pub executed: bool,
}

/// Wallet state rebuilt from an event log alone
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventReplay {
    pub wallet: Address,
    pub owners: Vec<Address>,
    pub required: usize,
    pub balance: u128,
    pub transactions: BTreeMap<u64, ReplayedTransaction>,
}

impl EventReplay {
    /// Fold an ordered event log into wallet state
    pub fn from_events<'a, I>(events: I) -> Result<Self, ReplayError>
    where
        I: IntoIterator<Item = &'a WalletEvent>,
    {
        let mut iter = events.into_iter();
        let mut replay = match iter.next() {
            Some(WalletEvent::WalletCreated {
                wallet,
                owners,
                required,
            }) => Self {
                wallet: *wallet,
                owners: owners.clone(),
                required: *required,
                balance: 0,
                transactions: BTreeMap::new(),
            },
            _ => return Err(ReplayError::MissingGenesis),
        };

        // An owner added right before a removal is a replacement
        let mut just_added = None;
        for (offset, event) in iter.enumerate() {
            replay.apply(offset + 1, event, just_added)?;
            just_added = match event {
                WalletEvent::OwnerAdded { new_owner } => Some(*new_owner),
                _ => None,
            };
        }

        Ok(replay)
    }

    fn apply(
        &mut self,
        position: usize,
        event: &WalletEvent,
        just_added: Option<Address>,
    ) -> Result<(), ReplayError> {
        let inconsistent = |reason: String| ReplayError::Inconsistent { position, reason };

        match event {
            WalletEvent::WalletCreated { .. } => {
                return Err(ReplayError::DuplicateGenesis(position));
            }
            WalletEvent::Deposit {
                amount, balance, ..
            } => {
                let expected = self
                    .balance
                    .checked_add(*amount)
                    .ok_or_else(|| inconsistent("balance overflow".to_string()))?;
                if expected != *balance {
                    return Err(inconsistent(format!(
                        "deposit reports balance {}, replay has {}",
                        balance, expected
                    )));
                }
                self.balance = expected;
            }
            WalletEvent::TransactionSubmitted {
                index, to, value, ..
            } => {
                let expected = self.transactions.len() as u64;
                if *index != expected {
                    return Err(ReplayError::OutOfOrder {
                        index: *index,
                        expected,
                    });
                }
                self.transactions.insert(
                    *index,
                    ReplayedTransaction {
                        to: *to,
                        value: *value,
                        ..Default::default()
                    },
                );
            }
            WalletEvent::TransactionConfirmed {
                index,
                confirmed_by,
            } => {
                let tx = self.transaction_mut(position, *index)?;
                if !tx.confirmed_by.insert(*confirmed_by) {
                    return Err(inconsistent(format!(
                        "{} confirmed transaction {} twice",
                        confirmed_by, index
                    )));
                }
            }
            WalletEvent::ConfirmationRevoked { index, revoked_by } => {
                let tx = self.transaction_mut(position, *index)?;
                if !tx.confirmed_by.remove(revoked_by) {
                    return Err(inconsistent(format!(
                        "{} revoked an absent confirmation on {}",
                        revoked_by, index
                    )));
                }
            }
            WalletEvent::TransactionExecuted { index, value, .. } => {
                let wallet = self.wallet;
                let tx = self.transaction_mut(position, *index)?;
                if tx.executed {
                    return Err(inconsistent(format!("transaction {} executed twice", index)));
                }
                tx.executed = true;
                let outgoing = tx.to != wallet;
                if outgoing {
                    self.balance = self.balance.checked_sub(*value).ok_or_else(|| {
                        inconsistent(format!("transaction {} overdraws the wallet", index))
                    })?;
                }
            }
            WalletEvent::OwnerAdded { new_owner } => {
                // A removal right after this turns it into a replacement
                self.owners.push(*new_owner);
            }
            WalletEvent::OwnerRemoved { owner } => {
                let position_of = self
                    .owners
                    .iter()
                    .position(|o| o == owner)
                    .ok_or_else(|| inconsistent(format!("{} is not an owner", owner)))?;
                match just_added {
                    Some(new_owner) if self.owners.last() == Some(&new_owner) => {
                        self.owners.pop();
                        self.owners[position_of] = new_owner;
                    }
                    _ => {
                        self.owners.remove(position_of);
                    }
                }
            }
            WalletEvent::RequirementChanged { requirement } => {
                self.required = *requirement;
            }
        }

        Ok(())
    }

    fn transaction_mut(
        &mut self,
        position: usize,
        index: u64,
    ) -> Result<&mut ReplayedTransaction, ReplayError> {
        self.transactions
            .get_mut(&index)
            .ok_or(ReplayError::UnknownTransaction { position, index })
    }
}
