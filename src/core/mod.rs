//! Core primitives shared by the wallet, the ledger and the CLI

pub mod address;

pub use address::{Address, AddressError, ADDRESS_LEN};
