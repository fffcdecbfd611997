//! External value transfers
//!
//! The wallet's outgoing payments are delivered through the [`Ledger`]
//! trait. [`InMemoryLedger`] is the implementation used by the CLI and tests.

pub mod ledger;

pub use ledger::{InMemoryLedger, Ledger, LedgerError, TransferRecord, MAX_TRANSFER_HISTORY};
