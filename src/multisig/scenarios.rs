//! End-to-end wallet scenarios: administration through the transaction
//! pipeline, owner removal policies and event log replay.

use super::*;
use crate::core::Address;
use crate::ledger::{InMemoryLedger, Ledger};
use std::collections::BTreeSet;

fn addr(n: u64) -> Address {
    Address::from_low_u64(n)
}

/// A wallet, its ledger and every event it emitted so far
struct Harness {
    wallet: WalletAuthority,
    ledger: InMemoryLedger,
    log: Vec<WalletEvent>,
}

impl Harness {
    fn new(owners: Vec<Address>, required: usize) -> Self {
        Self::with_policy(owners, required, WalletPolicy::default())
    }

    fn with_policy(owners: Vec<Address>, required: usize, policy: WalletPolicy) -> Self {
        let config = WalletConfig::new(owners, required).unwrap().with_policy(policy);
        let receipt = WalletAuthority::new(config).unwrap();
        Self {
            log: receipt.events.clone(),
            wallet: receipt.output,
            ledger: InMemoryLedger::new(),
        }
    }

    fn record<T>(&mut self, result: Result<Receipt<T>, MultisigError>) -> Result<T, MultisigError> {
        let receipt = result?;
        self.log.extend(receipt.events);
        Ok(receipt.output)
    }

    fn deposit(&mut self, amount: u128) {
        let result = self.wallet.deposit(addr(1000), amount);
        self.record(result).unwrap();
    }

    fn submit(&mut self, caller: Address, to: Address, value: u128, data: Vec<u8>) -> u64 {
        let result = self.wallet.submit_transaction(&caller, to, value, data);
        self.record(result).unwrap()
    }

    /// Submit an administrative call addressed to the wallet itself
    fn propose(&mut self, caller: Address, action: Action) -> u64 {
        let to = *self.wallet.address();
        self.submit(caller, to, 0, action.encode())
    }

    fn confirm(&mut self, caller: Address, index: u64) -> Result<usize, MultisigError> {
        let result = self.wallet.confirm_transaction(&caller, index);
        self.record(result)
    }

    fn revoke(&mut self, caller: Address, index: u64) -> Result<usize, MultisigError> {
        let result = self.wallet.revoke_confirmation(&caller, index);
        self.record(result)
    }

    fn execute(&mut self, caller: Address, index: u64) -> Result<Action, MultisigError> {
        let result = self
            .wallet
            .execute_transaction(&caller, index, &mut self.ledger);
        self.record(result)
    }

    /// Execute and assert a failure leaves the wallet untouched
    fn execute_err(&mut self, caller: Address, index: u64) -> MultisigError {
        let before = self.wallet.clone();
        let events = self.log.len();
        let err = self.execute(caller, index).unwrap_err();
        assert_eq!(self.wallet, before);
        assert_eq!(self.log.len(), events);
        err
    }

    /// Rebuild state from the event log and compare it with the wallet
    fn assert_replay_matches(&self) {
        let replay = EventReplay::from_events(&self.log).unwrap();

        assert_eq!(replay.wallet, *self.wallet.address());
        assert_eq!(replay.owners, self.wallet.owners());
        assert_eq!(replay.required, self.wallet.required());
        assert_eq!(replay.balance, self.wallet.balance());
        assert_eq!(replay.transactions.len() as u64, self.wallet.transaction_count());

        for (index, replayed) in &replay.transactions {
            let record = self.wallet.transaction(*index).unwrap();
            let confirmed: BTreeSet<Address> =
                self.wallet.confirmations(*index).into_iter().collect();
            assert_eq!(replayed.to, record.to);
            assert_eq!(replayed.value, record.value);
            assert_eq!(replayed.executed, record.executed);
            assert_eq!(replayed.confirmed_by, confirmed);
        }
    }
}

const A: u64 = 1;
const B: u64 = 2;
const C: u64 = 3;

fn three_owners() -> Vec<Address> {
    vec![addr(A), addr(B), addr(C)]
}

#[test]
fn test_valid_configurations_read_back_in_order() {
    for n in 1..=6u64 {
        // Reverse order so read-back cannot rely on sorting
        let owners: Vec<Address> = (1..=n).rev().map(|i| addr(i * 11)).collect();
        for required in 1..=owners.len() {
            let config = WalletConfig::new(owners.clone(), required).unwrap();
            let wallet = WalletAuthority::new(config).unwrap().into_output();

            assert_eq!(wallet.owners(), owners.as_slice());
            assert_eq!(wallet.required(), required);
            assert!(owners.iter().all(|o| wallet.is_owner(o)));
            assert!(wallet.validate().is_ok());
        }
        assert!(WalletConfig::new(owners.clone(), 0).is_err());
        assert!(WalletConfig::new(owners.clone(), owners.len() + 1).is_err());
    }
}

#[test]
fn test_transfer_scenario() {
    let mut h = Harness::new(three_owners(), 2);
    let x = addr(500);
    h.deposit(10);

    let index = h.submit(addr(A), x, 1, vec![]);
    assert_eq!(h.confirm(addr(A), index).unwrap(), 1);
    assert_eq!(h.confirm(addr(B), index).unwrap(), 2);

    let before = h.ledger.balance_of(&x);
    let action = h.execute(addr(A), index).unwrap();

    assert!(matches!(action, Action::Transfer { value: 1, .. }));
    assert_eq!(h.ledger.balance_of(&x), before + 1);
    assert!(h.wallet.transaction(index).unwrap().executed);
    assert_eq!(h.wallet.balance(), 9);
    h.assert_replay_matches();
}

#[test]
fn test_add_owner_scenario() {
    let mut h = Harness::new(three_owners(), 2);
    let z = addr(26);

    let index = h.propose(addr(A), Action::AddOwner { owner: z });
    h.confirm(addr(A), index).unwrap();
    h.confirm(addr(B), index).unwrap();
    let action = h.execute(addr(C), index).unwrap();

    assert_eq!(action, Action::AddOwner { owner: z });
    assert!(h.wallet.is_owner(&z));
    assert_eq!(h.wallet.owners().last(), Some(&z));
    assert_eq!(h.wallet.required(), 2);
    assert!(h.log.contains(&WalletEvent::OwnerAdded { new_owner: z }));

    // The new owner takes part right away
    let again = h.propose(z, Action::AddOwner { owner: z });
    h.confirm(z, again).unwrap();
    h.confirm(addr(A), again).unwrap();
    let err = h.execute_err(addr(A), again);
    assert!(matches!(err, MultisigError::InvariantViolation(_)));
    assert!(!h.wallet.transaction(again).unwrap().executed);
    assert_eq!(h.wallet.owner_count(), 4);
    h.assert_replay_matches();
}

#[test]
fn test_add_zero_address_rejected() {
    let mut h = Harness::new(three_owners(), 1);
    let index = h.propose(addr(A), Action::AddOwner { owner: Address::ZERO });
    h.confirm(addr(A), index).unwrap();

    assert!(matches!(
        h.execute_err(addr(A), index),
        MultisigError::InvariantViolation(_)
    ));
}

#[test]
fn test_delete_owner_scenario() {
    let mut h = Harness::new(three_owners(), 2);

    // 3 -> 2 owners, threshold 2 still satisfiable
    let first = h.propose(addr(A), Action::DeleteOwner { owner: addr(C) });
    h.confirm(addr(A), first).unwrap();
    h.confirm(addr(B), first).unwrap();
    h.execute(addr(A), first).unwrap();

    assert_eq!(h.wallet.owners(), &[addr(A), addr(B)]);
    assert_eq!(h.wallet.required(), 2);
    assert!(!h.wallet.is_owner(&addr(C)));

    // 2 -> 1 owner would leave threshold 2 unreachable
    let second = h.propose(addr(A), Action::DeleteOwner { owner: addr(B) });
    h.confirm(addr(A), second).unwrap();
    h.confirm(addr(B), second).unwrap();

    assert!(matches!(
        h.execute_err(addr(A), second),
        MultisigError::InvariantViolation(_)
    ));
    assert_eq!(h.wallet.owners(), &[addr(A), addr(B)]);
    assert_eq!(h.wallet.required(), 2);
    h.assert_replay_matches();
}

#[test]
fn test_delete_owner_clamps_requirement_under_clamp_policy() {
    let policy = WalletPolicy {
        requirement_on_removal: RequirementOnRemoval::Clamp,
        ..Default::default()
    };
    let mut h = Harness::with_policy(vec![addr(A), addr(B)], 2, policy);

    let index = h.propose(addr(A), Action::DeleteOwner { owner: addr(B) });
    h.confirm(addr(A), index).unwrap();
    h.confirm(addr(B), index).unwrap();
    h.execute(addr(A), index).unwrap();

    assert_eq!(h.wallet.owners(), &[addr(A)]);
    assert_eq!(h.wallet.required(), 1);

    let tail: Vec<&WalletEvent> = h.log.iter().rev().take(3).collect();
    assert!(matches!(tail[0], WalletEvent::TransactionExecuted { .. }));
    assert_eq!(*tail[1], WalletEvent::RequirementChanged { requirement: 1 });
    assert_eq!(*tail[2], WalletEvent::OwnerRemoved { owner: addr(B) });
    h.assert_replay_matches();
}

#[test]
fn test_last_owner_can_never_be_deleted() {
    let policy = WalletPolicy {
        requirement_on_removal: RequirementOnRemoval::Clamp,
        ..Default::default()
    };
    let mut h = Harness::with_policy(vec![addr(A)], 1, policy);

    let index = h.propose(addr(A), Action::DeleteOwner { owner: addr(A) });
    h.confirm(addr(A), index).unwrap();

    assert!(matches!(
        h.execute_err(addr(A), index),
        MultisigError::InvariantViolation(_)
    ));
    assert!(h.wallet.is_owner(&addr(A)));
}

#[test]
fn test_delete_unknown_owner_rejected() {
    let mut h = Harness::new(three_owners(), 1);
    let index = h.propose(addr(A), Action::DeleteOwner { owner: addr(42) });
    h.confirm(addr(A), index).unwrap();

    assert!(matches!(
        h.execute_err(addr(A), index),
        MultisigError::InvariantViolation(_)
    ));
}

#[test]
fn test_replace_owner_keeps_position() {
    let mut h = Harness::new(three_owners(), 2);
    let z = addr(26);

    let index = h.propose(
        addr(A),
        Action::ReplaceOwners {
            old_owner: addr(B),
            new_owner: z,
        },
    );
    h.confirm(addr(A), index).unwrap();
    h.confirm(addr(C), index).unwrap();
    h.execute(addr(A), index).unwrap();

    assert_eq!(h.wallet.owners(), &[addr(A), z, addr(C)]);
    assert_eq!(h.wallet.required(), 2);

    let n = h.log.len();
    assert_eq!(h.log[n - 3], WalletEvent::OwnerAdded { new_owner: z });
    assert_eq!(h.log[n - 2], WalletEvent::OwnerRemoved { owner: addr(B) });
    h.assert_replay_matches();

    // Replaced owner lost every right
    assert_eq!(
        h.wallet.submit_transaction(&addr(B), addr(9), 0, vec![]),
        Err(MultisigError::Unauthorized(addr(B)))
    );
}

#[test]
fn test_replay_keeps_replaced_owner_position() {
    let mut h = Harness::new(three_owners(), 1);
    let z = addr(0x1a);

    let index = h.propose(
        addr(A),
        Action::ReplaceOwners {
            old_owner: addr(A),
            new_owner: z,
        },
    );
    h.confirm(addr(A), index).unwrap();
    h.execute(addr(B), index).unwrap();

    let replay = EventReplay::from_events(&h.log).unwrap();
    assert_eq!(replay.owners, vec![z, addr(B), addr(C)]);
    assert_eq!(replay.owners, h.wallet.owners());

    // A later plain addOwner still appends
    let add = h.propose(z, Action::AddOwner { owner: addr(4) });
    h.confirm(z, add).unwrap();
    h.execute(z, add).unwrap();
    assert_eq!(h.wallet.owners(), &[z, addr(B), addr(C), addr(4)]);
    h.assert_replay_matches();
}

#[test]
fn test_replace_with_existing_owner_rejected() {
    let mut h = Harness::new(three_owners(), 1);
    let index = h.propose(
        addr(A),
        Action::ReplaceOwners {
            old_owner: addr(B),
            new_owner: addr(C),
        },
    );
    h.confirm(addr(A), index).unwrap();

    assert!(matches!(
        h.execute_err(addr(A), index),
        MultisigError::InvariantViolation(_)
    ));
    assert_eq!(h.wallet.owners(), three_owners().as_slice());
}

#[test]
fn test_change_requirement_bounds() {
    let mut h = Harness::new(three_owners(), 1);

    for bad in [0usize, 4] {
        let index = h.propose(addr(A), Action::ChangeRequirement { required: bad });
        h.confirm(addr(A), index).unwrap();
        assert!(matches!(
            h.execute_err(addr(A), index),
            MultisigError::InvariantViolation(_)
        ));
        assert_eq!(h.wallet.required(), 1);
    }

    let index = h.propose(addr(A), Action::ChangeRequirement { required: 3 });
    h.confirm(addr(A), index).unwrap();
    h.execute(addr(A), index).unwrap();
    assert_eq!(h.wallet.required(), 3);
    h.assert_replay_matches();
}

#[test]
fn test_removed_owner_confirmation_counts_by_default() {
    let mut h = Harness::new(three_owners(), 2);

    let transfer = h.submit(addr(A), addr(500), 0, vec![]);
    h.confirm(addr(C), transfer).unwrap();

    let removal = h.propose(addr(A), Action::DeleteOwner { owner: addr(C) });
    h.confirm(addr(A), removal).unwrap();
    h.confirm(addr(B), removal).unwrap();
    h.execute(addr(A), removal).unwrap();

    // C's earlier confirmation still holds, one more suffices
    assert!(h.wallet.is_confirmed(transfer, &addr(C)));
    h.confirm(addr(A), transfer).unwrap();
    assert_eq!(h.wallet.effective_confirmations(transfer), Some(2));
    h.execute(addr(B), transfer).unwrap();

    // C may no longer touch it either way
    assert_eq!(
        h.revoke(addr(C), transfer),
        Err(MultisigError::Unauthorized(addr(C)))
    );
    h.assert_replay_matches();
}

#[test]
fn test_removed_owner_confirmation_discarded_under_policy() {
    let policy = WalletPolicy {
        removed_owner_confirmations: RemovedOwnerConfirmations::Discard,
        ..Default::default()
    };
    let mut h = Harness::with_policy(three_owners(), 2, policy);

    let transfer = h.submit(addr(A), addr(500), 0, vec![]);
    h.confirm(addr(C), transfer).unwrap();

    let removal = h.propose(addr(A), Action::DeleteOwner { owner: addr(C) });
    h.confirm(addr(A), removal).unwrap();
    h.confirm(addr(B), removal).unwrap();
    h.execute(addr(A), removal).unwrap();

    h.confirm(addr(A), transfer).unwrap();
    assert_eq!(h.wallet.transaction(transfer).unwrap().confirmations, 2);
    assert_eq!(h.wallet.effective_confirmations(transfer), Some(1));
    assert_eq!(
        h.execute_err(addr(B), transfer),
        MultisigError::InsufficientConfirmations { have: 1, need: 2 }
    );

    h.confirm(addr(B), transfer).unwrap();
    h.execute(addr(B), transfer).unwrap();
    h.assert_replay_matches();
}

#[test]
fn test_failed_transfer_retry_keeps_log_consistent() {
    let mut h = Harness::new(three_owners(), 1);
    let x = addr(500);
    h.deposit(4);
    h.ledger.reject_transfers_to(x);

    let index = h.submit(addr(A), x, 4, vec![0xca, 0xfe]);
    h.confirm(addr(B), index).unwrap();
    assert!(matches!(
        h.execute_err(addr(A), index),
        MultisigError::ExecutionFailed(_)
    ));
    h.assert_replay_matches();

    h.ledger.accept_transfers_to(&x);
    h.execute(addr(A), index).unwrap();
    assert_eq!(h.ledger.balance_of(&x), 4);
    assert_eq!(h.ledger.history()[0].data_len, 2);
    h.assert_replay_matches();
}

#[test]
fn test_full_session_replays() {
    let mut h = Harness::new(three_owners(), 2);
    h.deposit(100);

    let pay = h.submit(addr(B), addr(600), 30, vec![]);
    h.confirm(addr(A), pay).unwrap();
    h.confirm(addr(B), pay).unwrap();
    h.revoke(addr(B), pay).unwrap();
    h.confirm(addr(C), pay).unwrap();
    h.execute(addr(700), pay).unwrap();

    let add = h.propose(addr(C), Action::AddOwner { owner: addr(4) });
    h.confirm(addr(A), add).unwrap();
    h.confirm(addr(C), add).unwrap();
    h.execute(addr(A), add).unwrap();

    let raise = h.propose(addr(4), Action::ChangeRequirement { required: 3 });
    h.confirm(addr(4), raise).unwrap();
    h.confirm(addr(B), raise).unwrap();
    h.execute(addr(4), raise).unwrap();

    let pending = h.submit(addr(A), addr(601), 5, vec![]);
    h.confirm(addr(A), pending).unwrap();

    assert_eq!(h.wallet.balance(), 70);
    assert_eq!(h.wallet.required(), 3);
    assert_eq!(
        h.wallet.transaction_indices(TransactionFilter::Pending),
        vec![pending]
    );
    assert!(h.wallet.validate().is_ok());
    h.assert_replay_matches();
}
