//! Proposed wallet transactions
//!
//! Records are append-only: once submitted a transaction keeps its index
//! forever and only its confirmation count and executed flag change.

use crate::core::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A transaction proposed by one of the owners
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransactionRecord {
    /// Position in the ledger, assigned at submission
    pub index: u64,
    /// Destination address (the wallet itself for administrative calls)
    pub to: Address,
    /// Value to transfer
    pub value: u128,
    /// Opaque call data
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
    /// Set exactly once, on successful execution
    pub executed: bool,
    /// Running confirmation counter
    pub confirmations: usize,
    /// Owner that submitted the transaction
    pub submitted_by: Address,
    /// Submission timestamp
    pub submitted_at: DateTime<Utc>,
    /// Execution timestamp
    pub executed_at: Option<DateTime<Utc>>,
}

impl TransactionRecord {
    /// Create a new, unconfirmed and unexecuted record
    pub fn new(index: u64, submitted_by: Address, to: Address, value: u128, data: Vec<u8>) -> Self {
        Self {
            index,
            to,
            value,
            data,
            executed: false,
            confirmations: 0,
            submitted_by,
            submitted_at: Utc::now(),
            executed_at: None,
        }
    }

    /// Check if the transaction still awaits execution
    pub fn is_pending(&self) -> bool {
        !self.executed
    }

    /// Payload as `0x`-prefixed hex
    pub fn data_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.data))
    }

    pub(crate) fn mark_executed(&mut self) {
        self.executed = true;
        self.executed_at = Some(Utc::now());
    }
}

/// Selection of transactions by execution state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TransactionFilter {
    #[default]
    All,
    Pending,
    Executed,
}

impl TransactionFilter {
    pub fn matches(&self, record: &TransactionRecord) -> bool {
        match self {
            TransactionFilter::All => true,
            TransactionFilter::Pending => record.is_pending(),
            TransactionFilter::Executed => record.executed,
        }
    }
}

/// Serde adapter storing byte payloads as `0x`-prefixed hex strings
mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        let digits = s.strip_prefix("0x").unwrap_or(&s);
        hex::decode(digits).map_err(serde::de::Error::custom)
    }
}
