//! Decoding of transaction payloads into wallet actions
//!
//! A transaction whose destination is the wallet itself carries an
//! administrative call in its payload:
//!
//! ```text
//! selector (4 bytes) || word (32 bytes) per argument
//! ```
//!
//! The selector is the first four bytes of SHA-256 over the canonical
//! signature. Addresses are right-aligned in their word behind 12 zero bytes,
//! integers are big-endian.

use crate::core::{Address, ADDRESS_LEN};
use crate::crypto::{selector, SELECTOR_LEN};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Size of one encoded argument
pub const WORD_LEN: usize = 32;

pub const ADD_OWNER_SIGNATURE: &str = "addOwner(address)";
pub const DELETE_OWNER_SIGNATURE: &str = "deleteOwner(address)";
pub const REPLACE_OWNERS_SIGNATURE: &str = "replaceOwners(address,address)";
pub const CHANGE_REQUIREMENT_SIGNATURE: &str = "changeRequirement(uint256)";

/// Payload decoding errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    #[error("Empty payload: the wallet only accepts administrative calls")]
    EmptyPayload,
    #[error("Unknown selector: 0x{}", hex::encode(.0))]
    UnknownSelector([u8; SELECTOR_LEN]),
    #[error("Invalid payload length for {call}: expected {expected} bytes, got {actual}")]
    InvalidLength {
        call: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("Argument {0} is not a valid address word")]
    InvalidAddressWord(usize),
    #[error("Argument {0} does not fit into a requirement")]
    RequirementOverflow(usize),
}

/// What executing a transaction does
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    /// Send value (and payload) to an external address
    Transfer {
        to: Address,
        value: u128,
        data: Vec<u8>,
    },
    /// Append a new owner
    AddOwner { owner: Address },
    /// Remove an existing owner
    DeleteOwner { owner: Address },
    /// Swap an existing owner for a new one in place
    ReplaceOwners {
        old_owner: Address,
        new_owner: Address,
    },
    /// Set the confirmation threshold
    ChangeRequirement { required: usize },
}

impl Action {
    /// Resolve a transaction record into the action it performs
    ///
    /// Any destination other than `wallet` is a plain transfer; payloads
    /// addressed to the wallet itself must decode to an administrative call.
    pub fn resolve(
        wallet: &Address,
        to: &Address,
        value: u128,
        data: &[u8],
    ) -> Result<Self, CallError> {
        if to != wallet {
            return Ok(Action::Transfer {
                to: *to,
                value,
                data: data.to_vec(),
            });
        }
        Self::decode(data)
    }

    /// Decode an administrative call payload
    pub fn decode(data: &[u8]) -> Result<Self, CallError> {
        if data.is_empty() {
            return Err(CallError::EmptyPayload);
        }
        if data.len() < SELECTOR_LEN {
            return Err(CallError::UnknownSelector(padded_selector(data)));
        }

        let mut sel = [0u8; SELECTOR_LEN];
        sel.copy_from_slice(&data[..SELECTOR_LEN]);
        let args = &data[SELECTOR_LEN..];

        if sel == selector(ADD_OWNER_SIGNATURE) {
            let words = split_words(ADD_OWNER_SIGNATURE, args, 1)?;
            Ok(Action::AddOwner {
                owner: decode_address(words[0], 0)?,
            })
        } else if sel == selector(DELETE_OWNER_SIGNATURE) {
            let words = split_words(DELETE_OWNER_SIGNATURE, args, 1)?;
            Ok(Action::DeleteOwner {
                owner: decode_address(words[0], 0)?,
            })
        } else if sel == selector(REPLACE_OWNERS_SIGNATURE) {
            let words = split_words(REPLACE_OWNERS_SIGNATURE, args, 2)?;
            Ok(Action::ReplaceOwners {
                old_owner: decode_address(words[0], 0)?,
                new_owner: decode_address(words[1], 1)?,
            })
        } else if sel == selector(CHANGE_REQUIREMENT_SIGNATURE) {
            let words = split_words(CHANGE_REQUIREMENT_SIGNATURE, args, 1)?;
            Ok(Action::ChangeRequirement {
                required: decode_uint(words[0], 0)?,
            })
        } else {
            Err(CallError::UnknownSelector(sel))
        }
    }

    /// Encode this action as a transaction payload
    ///
    /// Transfers carry their payload verbatim.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Action::Transfer { data, .. } => data.clone(),
            Action::AddOwner { owner } => encode_call(ADD_OWNER_SIGNATURE, &[address_word(owner)]),
            Action::DeleteOwner { owner } => {
                encode_call(DELETE_OWNER_SIGNATURE, &[address_word(owner)])
            }
            Action::ReplaceOwners {
                old_owner,
                new_owner,
            } => encode_call(
                REPLACE_OWNERS_SIGNATURE,
                &[address_word(old_owner), address_word(new_owner)],
            ),
            Action::ChangeRequirement { required } => {
                encode_call(CHANGE_REQUIREMENT_SIGNATURE, &[uint_word(*required as u64)])
            }
        }
    }

    /// Whether this action mutates the wallet's own owner set or threshold
    pub fn is_administrative(&self) -> bool {
        !matches!(self, Action::Transfer { .. })
    }

    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Action::Transfer { .. } => "transfer",
            Action::AddOwner { .. } => "addOwner",
            Action::DeleteOwner { .. } => "deleteOwner",
            Action::ReplaceOwners { .. } => "replaceOwners",
            Action::ChangeRequirement { .. } => "changeRequirement",
        }
    }
}

fn padded_selector(data: &[u8]) -> [u8; SELECTOR_LEN] {
    let mut sel = [0u8; SELECTOR_LEN];
    sel[..data.len()].copy_from_slice(data);
    sel
}

fn split_words<'a>(
    call: &'static str,
    args: &'a [u8],
    count: usize,
) -> Result<Vec<&'a [u8]>, CallError> {
    if args.len() != count * WORD_LEN {
        return Err(CallError::InvalidLength {
            call,
            expected: SELECTOR_LEN + count * WORD_LEN,
            actual: SELECTOR_LEN + args.len(),
        });
    }
    Ok(args.chunks(WORD_LEN).collect())
}

fn decode_address(word: &[u8], position: usize) -> Result<Address, CallError> {
    let (padding, body) = word.split_at(WORD_LEN - ADDRESS_LEN);
    if padding.iter().any(|b| *b != 0) {
        return Err(CallError::InvalidAddressWord(position));
    }
    Address::from_slice(body).map_err(|_| CallError::InvalidAddressWord(position))
}

fn decode_uint(word: &[u8], position: usize) -> Result<usize, CallError> {
    let (high, low) = word.split_at(WORD_LEN - 8);
    if high.iter().any(|b| *b != 0) {
        return Err(CallError::RequirementOverflow(position));
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(low);
    usize::try_from(u64::from_be_bytes(buf)).map_err(|_| CallError::RequirementOverflow(position))
}

fn address_word(address: &Address) -> [u8; WORD_LEN] {
    let mut word = [0u8; WORD_LEN];
    word[WORD_LEN - ADDRESS_LEN..].copy_from_slice(address.as_bytes());
    word
}

fn uint_word(value: u64) -> [u8; WORD_LEN] {
    let mut word = [0u8; WORD_LEN];
    word[WORD_LEN - 8..].copy_from_slice(&value.to_be_bytes());
    word
}

fn encode_call(signature: &str, words: &[[u8; WORD_LEN]]) -> Vec<u8> {
    let mut out = Vec::with_capacity(SELECTOR_LEN + words.len() * WORD_LEN);
    out.extend_from_slice(&selector(signature));
    for word in words {
        out.extend_from_slice(word);
    }
    out
}
