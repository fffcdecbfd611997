//! Multi-signature wallet authority
//!
//! Owners jointly authorize outgoing transfers and changes to the wallet's
//! own owner set and threshold. Everything goes through the same pipeline:
//!
//! 1. an owner submits a transaction
//! 2. owners confirm it
//! 3. once the threshold is met, the transaction is executed
//!
//! Transactions addressed to the wallet itself are administrative calls (see
//! [`Action`]). Every operation is all-or-nothing: a failed call leaves the
//! wallet exactly as it was.

use crate::core::Address;
use crate::ledger::Ledger;
use crate::multisig::call::{Action, CallError};
use crate::multisig::events::{Receipt, WalletEvent};
use crate::multisig::transaction::{TransactionFilter, TransactionRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Errors related to multisig operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MultisigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Not authorized: {0} is not an owner")]
    Unauthorized(Address),
    #[error("Transaction not found: {0}")]
    NotFound(u64),
    #[error("Transaction already executed: {0}")]
    AlreadyExecuted(u64),
    #[error("Transaction {index} already confirmed by {owner}")]
    AlreadyConfirmed { index: u64, owner: Address },
    #[error("Transaction {index} not confirmed by {owner}")]
    NotConfirmed { index: u64, owner: Address },
    #[error("Insufficient confirmations: have {have}, need {need}")]
    InsufficientConfirmations { have: usize, need: usize },
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
    #[error("Invalid call: {0}")]
    InvalidCall(#[from] CallError),
}

/// Who may trigger execution of a sufficiently confirmed transaction
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionAccess {
    /// Anyone: authorization already happened through confirmations
    #[default]
    Anyone,
    /// Current owners only
    OwnersOnly,
}

/// Whether confirmations of owners that were later removed still count
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemovedOwnerConfirmations {
    #[default]
    Count,
    Discard,
}

/// What deleting an owner does when fewer owners than the threshold remain
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequirementOnRemoval {
    /// Fail the execution
    #[default]
    Reject,
    /// Lower the threshold to the remaining owner count
    Clamp,
}

/// Policy decisions fixed at wallet creation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletPolicy {
    pub execution: ExecutionAccess,
    pub removed_owner_confirmations: RemovedOwnerConfirmations,
    pub requirement_on_removal: RequirementOnRemoval,
}

/// Configuration for a multisig wallet
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct WalletConfig {
    /// Initial owners, in order
    pub owners: Vec<Address>,
    /// Confirmations required to execute (M in M-of-N)
    pub required: usize,
    /// Policy decisions
    pub policy: WalletPolicy,
    /// Mixed into the wallet address so equal owner sets can hold several wallets
    pub salt: u64,
}

impl WalletConfig {
    /// Create a new wallet configuration
    ///
    /// # Errors
    /// Returns `InvalidConfiguration` if the owner list is empty, contains
    /// duplicates or the zero address, or if `required` is outside `1..=N`
    pub fn new(owners: Vec<Address>, required: usize) -> Result<Self, MultisigError> {
        let config = Self {
            owners,
            required,
            policy: WalletPolicy::default(),
            salt: 0,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_policy(mut self, policy: WalletPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_salt(mut self, salt: u64) -> Self {
        self.salt = salt;
        self
    }

    /// Check the owner set and threshold
    pub fn validate(&self) -> Result<(), MultisigError> {
        check_owner_set(&self.owners, self.required).map_err(MultisigError::InvalidConfiguration)
    }

    /// Get description like "2-of-3"
    pub fn description(&self) -> String {
        format!("{}-of-{}", self.required, self.owners.len())
    }

    /// Derive the wallet address
    ///
    /// Address = last 20 bytes of SHA256(salt || required || sorted owners)
    pub fn wallet_address(&self) -> Address {
        let mut sorted_owners = self.owners.clone();
        sorted_owners.sort();

        let mut seed = Vec::with_capacity(16 + sorted_owners.len() * 20);
        seed.extend_from_slice(&self.salt.to_be_bytes());
        seed.extend_from_slice(&(self.required as u64).to_be_bytes());
        for owner in &sorted_owners {
            seed.extend_from_slice(owner.as_bytes());
        }

        Address::derive(&seed)
    }
}

/// Check the owner set invariants, returning the violated rule
fn check_owner_set(owners: &[Address], required: usize) -> Result<(), String> {
    if owners.is_empty() {
        return Err("owner set must not be empty".to_string());
    }
    if owners.iter().any(Address::is_zero) {
        return Err("zero address cannot be an owner".to_string());
    }

    let mut seen = BTreeSet::new();
    for owner in owners {
        if !seen.insert(owner) {
            return Err(format!("duplicate owner {}", owner));
        }
    }

    if required == 0 {
        return Err("requirement must be at least 1".to_string());
    }
    if required > owners.len() {
        return Err(format!(
            "requirement {} exceeds owner count {}",
            required,
            owners.len()
        ));
    }

    Ok(())
}

/// The wallet state machine
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct WalletAuthority {
    /// The wallet's own address; transactions sent here are administrative
    address: Address,
    /// Current owners, in order
    owners: Vec<Address>,
    /// Confirmation threshold
    required: usize,
    /// Append-only transaction ledger
    transactions: Vec<TransactionRecord>,
    /// Confirmation matrix: index -> confirming addresses
    confirmations: BTreeMap<u64, BTreeSet<Address>>,
    /// Value held by the wallet
    balance: u128,
    policy: WalletPolicy,
    created_at: DateTime<Utc>,
}

impl WalletAuthority {
    /// Create a new wallet
    pub fn new(config: WalletConfig) -> Result<Receipt<Self>, MultisigError> {
        config.validate()?;

        let address = config.wallet_address();
        let wallet = Self {
            address,
            owners: config.owners,
            required: config.required,
            transactions: Vec::new(),
            confirmations: BTreeMap::new(),
            balance: 0,
            policy: config.policy,
            created_at: Utc::now(),
        };

        log::info!(
            "Multisig wallet {} created ({})",
            address,
            wallet.description()
        );

        let event = WalletEvent::WalletCreated {
            wallet: address,
            owners: wallet.owners.clone(),
            required: wallet.required,
        };
        Ok(Receipt::new(wallet, vec![event]))
    }

    /// Re-check every invariant, e.g. after loading from disk
    pub fn validate(&self) -> Result<(), MultisigError> {
        check_owner_set(&self.owners, self.required).map_err(MultisigError::InvariantViolation)?;

        for (position, tx) in self.transactions.iter().enumerate() {
            if tx.index != position as u64 {
                return Err(MultisigError::InvariantViolation(format!(
                    "transaction at position {} has index {}",
                    position, tx.index
                )));
            }
            let confirmed = self.confirmations.get(&tx.index).map_or(0, BTreeSet::len);
            if confirmed != tx.confirmations {
                return Err(MultisigError::InvariantViolation(format!(
                    "transaction {} counts {} confirmations, matrix holds {}",
                    tx.index, tx.confirmations, confirmed
                )));
            }
        }

        if let Some(index) = self
            .confirmations
            .keys()
            .find(|index| **index >= self.transaction_count())
        {
            return Err(MultisigError::InvariantViolation(format!(
                "confirmations recorded for unknown transaction {}",
                index
            )));
        }

        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Get the wallet address
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Current owners, in order
    pub fn owners(&self) -> &[Address] {
        &self.owners
    }

    /// Owner at a position of the owner list
    pub fn owner(&self, position: usize) -> Option<&Address> {
        self.owners.get(position)
    }

    pub fn owner_count(&self) -> usize {
        self.owners.len()
    }

    /// Check if an address is a current owner
    pub fn is_owner(&self, address: &Address) -> bool {
        self.owners.contains(address)
    }

    /// Get the confirmation threshold (M)
    pub fn required(&self) -> usize {
        self.required
    }

    /// Value currently held by the wallet
    pub fn balance(&self) -> u128 {
        self.balance
    }

    pub fn policy(&self) -> &WalletPolicy {
        &self.policy
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Get description like "2-of-3"
    pub fn description(&self) -> String {
        format!("{}-of-{}", self.required, self.owners.len())
    }

    /// Get a transaction by index
    pub fn transaction(&self, index: u64) -> Option<&TransactionRecord> {
        usize::try_from(index)
            .ok()
            .and_then(|slot| self.transactions.get(slot))
    }

    /// Number of submitted transactions; also the next index
    pub fn transaction_count(&self) -> u64 {
        self.transactions.len() as u64
    }

    /// Indices of transactions matching a filter, ascending
    pub fn transaction_indices(&self, filter: TransactionFilter) -> Vec<u64> {
        self.transactions
            .iter()
            .filter(|tx| filter.matches(tx))
            .map(|tx| tx.index)
            .collect()
    }

    /// Check if `address` holds a confirmation for transaction `index`
    pub fn is_confirmed(&self, index: u64, address: &Address) -> bool {
        self.confirmations
            .get(&index)
            .is_some_and(|set| set.contains(address))
    }

    /// Every address holding a confirmation for `index`, including removed owners
    pub fn confirmations(&self, index: u64) -> Vec<Address> {
        self.confirmations
            .get(&index)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Confirmations that count towards the threshold under the wallet policy
    pub fn effective_confirmations(&self, index: u64) -> Option<usize> {
        let tx = self.transaction(index)?;
        let count = match self.policy.removed_owner_confirmations {
            RemovedOwnerConfirmations::Count => tx.confirmations,
            RemovedOwnerConfirmations::Discard => self
                .confirmations
                .get(&index)
                .map_or(0, |set| set.iter().filter(|a| self.is_owner(a)).count()),
        };
        Some(count)
    }

    /// Check if the confirmations of `index` meet the current threshold
    pub fn is_confirmed_enough(&self, index: u64) -> bool {
        self.effective_confirmations(index)
            .is_some_and(|count| count >= self.required)
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Accept inbound value; anyone may fund the wallet
    pub fn deposit(&mut self, sender: Address, amount: u128) -> Result<Receipt<u128>, MultisigError> {
        let balance = self.balance.checked_add(amount).ok_or_else(|| {
            MultisigError::InvariantViolation("wallet balance overflow".to_string())
        })?;
        self.balance = balance;

        log::info!("Deposit of {} from {} (balance {})", amount, sender, balance);

        Ok(Receipt::new(
            balance,
            vec![WalletEvent::Deposit {
                sender,
                amount,
                balance,
            }],
        ))
    }

    /// Propose a new transaction and return its index
    ///
    /// The submitter's confirmation is not recorded; see
    /// [`submit_and_confirm`](Self::submit_and_confirm).
    pub fn submit_transaction(
        &mut self,
        caller: &Address,
        to: Address,
        value: u128,
        data: Vec<u8>,
    ) -> Result<Receipt<u64>, MultisigError> {
        self.require_owner(caller)?;

        let index = self.transaction_count();
        self.transactions
            .push(TransactionRecord::new(index, *caller, to, value, data));

        log::info!(
            "Transaction {} submitted by {}: {} -> {}",
            index,
            caller,
            value,
            to
        );

        Ok(Receipt::new(
            index,
            vec![WalletEvent::TransactionSubmitted {
                index,
                creator: *caller,
                to,
                value,
            }],
        ))
    }

    /// Propose a new transaction and confirm it as the submitter in one step
    pub fn submit_and_confirm(
        &mut self,
        caller: &Address,
        to: Address,
        value: u128,
        data: Vec<u8>,
    ) -> Result<Receipt<u64>, MultisigError> {
        let mut receipt = self.submit_transaction(caller, to, value, data)?;
        let event = self.record_confirmation(receipt.output, *caller);
        receipt.events.push(event);
        Ok(receipt)
    }

    /// Confirm a pending transaction, returning the new confirmation count
    pub fn confirm_transaction(
        &mut self,
        caller: &Address,
        index: u64,
    ) -> Result<Receipt<usize>, MultisigError> {
        self.require_owner(caller)?;
        let tx = self.transaction(index).ok_or(MultisigError::NotFound(index))?;
        if tx.executed {
            return Err(MultisigError::AlreadyExecuted(index));
        }
        if self.is_confirmed(index, caller) {
            return Err(MultisigError::AlreadyConfirmed {
                index,
                owner: *caller,
            });
        }

        let event = self.record_confirmation(index, *caller);
        let count = self.transaction(index).map_or(0, |tx| tx.confirmations);
        Ok(Receipt::new(count, vec![event]))
    }

    /// Withdraw a confirmation, returning the new confirmation count
    pub fn revoke_confirmation(
        &mut self,
        caller: &Address,
        index: u64,
    ) -> Result<Receipt<usize>, MultisigError> {
        self.require_owner(caller)?;
        let tx = self.transaction(index).ok_or(MultisigError::NotFound(index))?;
        if tx.executed {
            return Err(MultisigError::AlreadyExecuted(index));
        }
        if !self.is_confirmed(index, caller) {
            return Err(MultisigError::NotConfirmed {
                index,
                owner: *caller,
            });
        }

        if let Some(set) = self.confirmations.get_mut(&index) {
            set.remove(caller);
            if set.is_empty() {
                self.confirmations.remove(&index);
            }
        }
        let count = match self.transaction_mut(index) {
            Some(tx) => {
                tx.confirmations -= 1;
                tx.confirmations
            }
            None => 0,
        };

        log::info!(
            "Transaction {} confirmation revoked by {} ({}/{})",
            index,
            caller,
            count,
            self.required
        );

        Ok(Receipt::new(
            count,
            vec![WalletEvent::ConfirmationRevoked {
                index,
                revoked_by: *caller,
            }],
        ))
    }

    /// Execute a transaction whose confirmations meet the current threshold
    ///
    /// Transfers are delivered through `ledger`; transactions addressed to
    /// the wallet apply their administrative call. The executed flag is only
    /// set once the dispatch succeeded, so a failed execution may be retried.
    pub fn execute_transaction<L: Ledger + ?Sized>(
        &mut self,
        caller: &Address,
        index: u64,
        ledger: &mut L,
    ) -> Result<Receipt<Action>, MultisigError> {
        let result = self.try_execute(caller, index, ledger);
        if let Err(e) = &result {
            log::warn!("Execution of transaction {} rejected: {}", index, e);
        }
        result
    }

    fn try_execute<L: Ledger + ?Sized>(
        &mut self,
        caller: &Address,
        index: u64,
        ledger: &mut L,
    ) -> Result<Receipt<Action>, MultisigError> {
        if self.policy.execution == ExecutionAccess::OwnersOnly {
            self.require_owner(caller)?;
        }

        let tx = self.transaction(index).ok_or(MultisigError::NotFound(index))?;
        if tx.executed {
            return Err(MultisigError::AlreadyExecuted(index));
        }

        let have = self.effective_confirmations(index).unwrap_or(0);
        if have < self.required {
            return Err(MultisigError::InsufficientConfirmations {
                have,
                need: self.required,
            });
        }

        let (to, value) = (tx.to, tx.value);
        let action = Action::resolve(&self.address, &tx.to, tx.value, &tx.data)?;

        let mut events = match &action {
            Action::Transfer { to, value, data } => {
                self.dispatch_transfer(ledger, to, *value, data)?;
                Vec::new()
            }
            admin => {
                if value != 0 {
                    return Err(MultisigError::ExecutionFailed(format!(
                        "administrative call {} cannot carry value",
                        admin.name()
                    )));
                }
                self.apply_admin(admin)?
            }
        };

        if let Some(tx) = self.transaction_mut(index) {
            tx.mark_executed();
        }

        log::info!(
            "Transaction {} executed by {}: {} ({} -> {})",
            index,
            caller,
            action.name(),
            value,
            to
        );

        events.push(WalletEvent::TransactionExecuted {
            index,
            to,
            value,
            executed_by: *caller,
        });
        Ok(Receipt::new(action, events))
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn require_owner(&self, caller: &Address) -> Result<(), MultisigError> {
        if self.is_owner(caller) {
            Ok(())
        } else {
            Err(MultisigError::Unauthorized(*caller))
        }
    }

    fn transaction_mut(&mut self, index: u64) -> Option<&mut TransactionRecord> {
        usize::try_from(index)
            .ok()
            .and_then(|slot| self.transactions.get_mut(slot))
    }

    /// Record a confirmation whose preconditions were already checked
    fn record_confirmation(&mut self, index: u64, owner: Address) -> WalletEvent {
        self.confirmations.entry(index).or_default().insert(owner);
        let count = match self.transaction_mut(index) {
            Some(tx) => {
                tx.confirmations += 1;
                tx.confirmations
            }
            None => 0,
        };

        log::info!(
            "Transaction {} confirmed by {} ({}/{})",
            index,
            owner,
            count,
            self.required
        );

        WalletEvent::TransactionConfirmed {
            index,
            confirmed_by: owner,
        }
    }

    fn dispatch_transfer<L: Ledger + ?Sized>(
        &mut self,
        ledger: &mut L,
        to: &Address,
        value: u128,
        data: &[u8],
    ) -> Result<(), MultisigError> {
        if value > self.balance {
            return Err(MultisigError::ExecutionFailed(format!(
                "insufficient balance: have {}, need {}",
                self.balance, value
            )));
        }

        ledger
            .credit(&self.address, to, value, data)
            .map_err(|e| MultisigError::ExecutionFailed(e.to_string()))?;

        self.balance -= value;
        Ok(())
    }

    /// Apply an administrative call to a copy of the owner set and commit it
    /// only if every invariant still holds
    fn apply_admin(&mut self, action: &Action) -> Result<Vec<WalletEvent>, MultisigError> {
        let violation = MultisigError::InvariantViolation;
        let mut owners = self.owners.clone();
        let mut required = self.required;
        let mut events = Vec::new();

        match action {
            Action::AddOwner { owner } => {
                check_new_owner(&owners, owner).map_err(violation)?;
                owners.push(*owner);
                events.push(WalletEvent::OwnerAdded { new_owner: *owner });
            }
            Action::DeleteOwner { owner } => {
                let position = owners
                    .iter()
                    .position(|o| o == owner)
                    .ok_or_else(|| violation(format!("{} is not an owner", owner)))?;
                owners.remove(position);
                events.push(WalletEvent::OwnerRemoved { owner: *owner });

                if owners.is_empty() {
                    return Err(violation("cannot remove the last owner".to_string()));
                }
                if required > owners.len() {
                    match self.policy.requirement_on_removal {
                        RequirementOnRemoval::Reject => {
                            return Err(violation(format!(
                                "requirement {} exceeds {} remaining owners",
                                required,
                                owners.len()
                            )));
                        }
                        RequirementOnRemoval::Clamp => {
                            required = owners.len();
                            events.push(WalletEvent::RequirementChanged {
                                requirement: required,
                            });
                        }
                    }
                }
            }
            Action::ReplaceOwners {
                old_owner,
                new_owner,
            } => {
                let position = owners
                    .iter()
                    .position(|o| o == old_owner)
                    .ok_or_else(|| violation(format!("{} is not an owner", old_owner)))?;
                check_new_owner(&owners, new_owner).map_err(violation)?;
                owners[position] = *new_owner;
                events.push(WalletEvent::OwnerAdded {
                    new_owner: *new_owner,
                });
                events.push(WalletEvent::OwnerRemoved { owner: *old_owner });
            }
            Action::ChangeRequirement {
                required: requirement,
            } => {
                required = *requirement;
                events.push(WalletEvent::RequirementChanged {
                    requirement: required,
                });
            }
            Action::Transfer { .. } => {
                return Err(MultisigError::ExecutionFailed(
                    "transfer is not an administrative call".to_string(),
                ));
            }
        }

        check_owner_set(&owners, required).map_err(violation)?;

        self.owners = owners;
        self.required = required;
        log::info!(
            "Wallet {} applied {} (now {})",
            self.address,
            action.name(),
            self.description()
        );

        Ok(events)
    }
}

fn check_new_owner(owners: &[Address], candidate: &Address) -> Result<(), String> {
    if candidate.is_zero() {
        return Err("zero address cannot be an owner".to_string());
    }
    if owners.contains(candidate) {
        return Err(format!("{} is already an owner", candidate));
    }
    Ok(())
}
