//! Multisig Wallet: an M-of-N multi-signature custody wallet in Rust
//!
//! This crate provides:
//! - A wallet state machine where any owner proposes and M owners confirm
//! - Self-administration (add, delete and replace owners, change the
//!   threshold) through the same submit/confirm/execute pipeline
//! - An event for every state transition, and replay of event logs
//! - A pluggable ledger for outgoing transfers
//! - JSON persistence with backups and an event journal
//!
//! # Example
//!
//! ```rust
//! use multisig_wallet::core::Address;
//! use multisig_wallet::ledger::{InMemoryLedger, Ledger};
//! use multisig_wallet::multisig::{WalletAuthority, WalletConfig};
//!
//! let (alice, bob, carol) = (Address::random(), Address::random(), Address::random());
//! let recipient = Address::random();
//!
//! // Create a 2-of-3 wallet and fund it
//! let config = WalletConfig::new(vec![alice, bob, carol], 2).unwrap();
//! let mut wallet = WalletAuthority::new(config).unwrap().into_output();
//! wallet.deposit(alice, 10).unwrap();
//!
//! // Alice proposes a transfer, Bob co-signs
//! let index = wallet.submit_and_confirm(&alice, recipient, 4, vec![]).unwrap().output;
//! wallet.confirm_transaction(&bob, index).unwrap();
//!
//! // Execute once the threshold is met
//! let mut ledger = InMemoryLedger::new();
//! wallet.execute_transaction(&bob, index, &mut ledger).unwrap();
//!
//! assert_eq!(ledger.balance_of(&recipient), 4);
//! assert_eq!(wallet.balance(), 6);
//! ```

pub mod cli;
pub mod core;
pub mod crypto;
pub mod ledger;
pub mod multisig;
pub mod storage;

// Re-export commonly used types
pub use core::Address;
pub use ledger::{InMemoryLedger, Ledger};
pub use multisig::{
    Action, EventReplay, MultisigError, Receipt, WalletAuthority, WalletConfig, WalletEvent,
    WalletPolicy,
};
pub use storage::{Storage, StorageConfig, WalletState};
