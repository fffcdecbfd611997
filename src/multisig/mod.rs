//! M-of-N multisig custody wallet
//!
//! A fixed set of owners jointly controls the wallet's funds: any owner may
//! propose a transaction, and it executes only once M owners confirmed it.
//! The wallet administers itself through the same pipeline: transactions
//! addressed to the wallet's own address carry an encoded [`Action`] that
//! adds, removes or replaces owners, or changes the threshold.
//!
//! # Example
//!
//! ```ignore
//! use multisig_wallet::multisig::{Action, WalletAuthority, WalletConfig};
//!
//! // Create a 2-of-3 wallet
//! let config = WalletConfig::new(vec![alice, bob, carol], 2)?;
//! let mut wallet = WalletAuthority::new(config)?.into_output();
//!
//! // Propose and confirm a transfer
//! let index = wallet.submit_and_confirm(&alice, recipient, 1, vec![])?.output;
//! wallet.confirm_transaction(&bob, index)?;
//!
//! // Threshold met: deliver through the ledger
//! wallet.execute_transaction(&bob, index, &mut ledger)?;
//! ```

pub mod call;
pub mod events;
pub mod transaction;
pub mod wallet;

#[cfg(test)]
mod scenarios;

pub use call::{Action, CallError};
pub use events::{EventReplay, Receipt, ReplayError, ReplayedTransaction, WalletEvent};
pub use transaction::{TransactionFilter, TransactionRecord};
pub use wallet::{
    ExecutionAccess, MultisigError, RemovedOwnerConfirmations, RequirementOnRemoval,
    WalletAuthority, WalletConfig, WalletPolicy,
};
