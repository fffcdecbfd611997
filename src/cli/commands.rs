//! CLI commands for the multisig wallet
//!
//! Implements all command handlers for the CLI interface. Every command that
//! changes the wallet saves the state and then appends its events to the
//! journal.

use crate::core::Address;
use crate::ledger::Ledger;
use crate::multisig::{
    Action, EventReplay, MultisigError, TransactionFilter, TransactionRecord, WalletAuthority,
    WalletConfig, WalletEvent, WalletPolicy,
};
use crate::storage::{Storage, StorageConfig, WalletState};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Result type for CLI operations
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Application state
pub struct AppState {
    pub state: WalletState,
    pub storage: Storage,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Load the wallet stored in `data_dir`
    pub fn new(data_dir: PathBuf) -> CliResult<Self> {
        let storage = Storage::new(storage_config(&data_dir))?;

        if !storage.exists() {
            return Err(format!(
                "No wallet found in {:?}; run `multisig init` first",
                data_dir
            )
            .into());
        }

        let state = storage.load()?;
        log::debug!(
            "Loaded wallet {} ({})",
            state.wallet.address(),
            state.wallet.description()
        );

        Ok(Self {
            state,
            storage,
            data_dir,
        })
    }

    /// Save the current state
    pub fn save(&self) -> CliResult<()> {
        self.storage.save(&self.state)?;
        Ok(())
    }

    /// Save the state, then journal the events that produced it
    ///
    /// The journal never runs ahead of the saved state.
    fn commit(&self, events: &[WalletEvent]) -> CliResult<()> {
        self.save()?;
        self.storage.append_events(events)?;
        for event in events {
            println!("   📣 {}", event);
        }
        Ok(())
    }
}

fn storage_config(data_dir: &Path) -> StorageConfig {
    StorageConfig {
        data_dir: data_dir.to_path_buf(),
        ..Default::default()
    }
}

/// Parse a `0x`-prefixed hex address
pub fn parse_address(s: &str) -> CliResult<Address> {
    let address = s
        .trim()
        .parse::<Address>()
        .map_err(|e| format!("invalid address {:?}: {}", s, e))?;
    Ok(address)
}

/// Parse a comma-separated address list
pub fn parse_address_list(s: &str) -> CliResult<Vec<Address>> {
    s.split(',')
        .filter(|part| !part.trim().is_empty())
        .map(parse_address)
        .collect()
}

/// Parse an optionally `0x`-prefixed hex payload
pub fn parse_payload(s: &str) -> CliResult<Vec<u8>> {
    let digits = s.trim();
    let digits = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
        .unwrap_or(digits);
    Ok(hex::decode(digits)?)
}

/// Create a new wallet
pub fn cmd_init(
    data_dir: &Path,
    owners: &[Address],
    required: usize,
    policy: WalletPolicy,
    salt: u64,
    force: bool,
) -> CliResult<()> {
    let storage = Storage::new(storage_config(data_dir))?;

    if storage.exists() {
        if !force {
            println!("⚠️  Wallet already exists at {:?}", data_dir);
            println!("   Use --force to reinitialize (this will delete existing data)");
            return Ok(());
        }
        storage.delete()?;
    }

    let config = WalletConfig::new(owners.to_vec(), required)?
        .with_policy(policy)
        .with_salt(salt);
    let receipt = WalletAuthority::new(config)?;
    let state = WalletState::new(receipt.output);

    storage.save(&state)?;
    storage.append_events(&receipt.events)?;

    let wallet = &state.wallet;
    println!("✅ Multisig wallet initialized!");
    println!("   📁 Data directory: {:?}", data_dir);
    println!("   📍 Address: {}", wallet.address());
    println!("   🔐 Threshold: {}", wallet.description());
    for (position, owner) in wallet.owners().iter().enumerate() {
        println!("   👤 Owner {}: {}", position, owner);
    }

    Ok(())
}

/// Generate fresh random addresses
pub fn cmd_address_new(count: usize) -> CliResult<()> {
    println!("🔑 New addresses:");
    for _ in 0..count {
        println!("   {}", Address::random());
    }
    Ok(())
}

/// Show the wallet overview
pub fn cmd_info(state: &AppState) -> CliResult<()> {
    let wallet = &state.state.wallet;
    let pending = wallet.transaction_indices(TransactionFilter::Pending).len();
    let policy = wallet.policy();

    println!("🔐 Multisig Wallet");
    println!("   ├─ Address: {}", wallet.address());
    println!("   ├─ Threshold: {}", wallet.description());
    println!("   ├─ Balance: {}", wallet.balance());
    println!(
        "   ├─ Transactions: {} ({} pending)",
        wallet.transaction_count(),
        pending
    );
    println!("   ├─ Execution: {:?}", policy.execution);
    println!(
        "   ├─ Removed owner confirmations: {:?}",
        policy.removed_owner_confirmations
    );
    println!(
        "   ├─ Requirement on removal: {:?}",
        policy.requirement_on_removal
    );
    println!(
        "   └─ Created: {}",
        wallet.created_at().format("%Y-%m-%d %H:%M:%S")
    );

    Ok(())
}

/// List current owners
pub fn cmd_owners(state: &AppState) -> CliResult<()> {
    let wallet = &state.state.wallet;

    println!("👥 Owners ({}):", wallet.description());
    for (position, owner) in wallet.owners().iter().enumerate() {
        println!("   #{} {}", position, owner);
    }

    Ok(())
}

/// Fund the wallet
pub fn cmd_deposit(state: &mut AppState, from: &Address, amount: u128) -> CliResult<()> {
    let receipt = state.state.wallet.deposit(*from, amount)?;

    println!("💰 Deposited {} from {}", amount, from);
    println!("   New balance: {}", receipt.output);
    state.commit(&receipt.events)
}

/// Submit a transaction, optionally confirming it as the submitter
pub fn cmd_submit(
    state: &mut AppState,
    from: &Address,
    to: &Address,
    value: u128,
    data: Vec<u8>,
    confirm: bool,
) -> CliResult<()> {
    let wallet = &mut state.state.wallet;
    let receipt = if confirm {
        wallet.submit_and_confirm(from, *to, value, data)?
    } else {
        wallet.submit_transaction(from, *to, value, data)?
    };

    println!("📤 Transaction {} submitted", receipt.output);
    println!("   To: {}", to);
    println!("   Value: {}", value);
    state.commit(&receipt.events)
}

/// Submit an administrative call addressed to the wallet itself
pub fn cmd_propose(
    state: &mut AppState,
    from: &Address,
    action: Action,
    confirm: bool,
) -> CliResult<()> {
    if !action.is_administrative() {
        return Err("only administrative calls can be proposed".into());
    }

    let to = *state.state.wallet.address();
    let payload = action.encode();
    println!("🛠️  Proposing {}: {:?}", action.name(), action);
    println!("   Payload: 0x{}", hex::encode(&payload));

    cmd_submit(state, from, &to, 0, payload, confirm)
}

/// Confirm a transaction
pub fn cmd_confirm(state: &mut AppState, from: &Address, index: u64) -> CliResult<()> {
    let receipt = state.state.wallet.confirm_transaction(from, index)?;
    let wallet = &state.state.wallet;

    println!(
        "✍️  Transaction {} confirmed by {} ({}/{})",
        index,
        from,
        receipt.output,
        wallet.required()
    );
    if wallet.is_confirmed_enough(index) {
        println!("   ✅ Threshold reached, ready to execute");
    }
    state.commit(&receipt.events)
}

/// Revoke a confirmation
pub fn cmd_revoke(state: &mut AppState, from: &Address, index: u64) -> CliResult<()> {
    let receipt = state.state.wallet.revoke_confirmation(from, index)?;

    println!(
        "↩️  Confirmation on transaction {} revoked by {} ({} left)",
        index, from, receipt.output
    );
    state.commit(&receipt.events)
}

/// Execute a transaction
pub fn cmd_execute(state: &mut AppState, from: &Address, index: u64) -> CliResult<()> {
    let WalletState { wallet, ledger } = &mut state.state;

    let receipt = match wallet.execute_transaction(from, index, ledger) {
        Ok(receipt) => receipt,
        Err(e @ MultisigError::ExecutionFailed(_)) => {
            println!("❌ Execution of transaction {} failed: {}", index, e);
            println!("   The transaction stays pending and may be executed again.");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    println!("🚀 Transaction {} executed ({})", index, receipt.output.name());
    if let Action::Transfer { to, value, .. } = &receipt.output {
        println!("   {} -> {} (recipient balance {})", value, to, ledger.balance_of(to));
    }
    state.commit(&receipt.events)
}

fn print_transaction(wallet: &WalletAuthority, tx: &TransactionRecord) {
    let status = if tx.executed {
        "executed"
    } else if wallet.is_confirmed_enough(tx.index) {
        "ready"
    } else {
        "pending"
    };

    println!(
        "   #{} | {} | {} -> {} | {}/{} | {}",
        tx.index,
        status,
        tx.value,
        tx.to,
        wallet.effective_confirmations(tx.index).unwrap_or(0),
        wallet.required(),
        tx.submitted_at.format("%Y-%m-%d %H:%M:%S")
    );
}

/// List transactions
pub fn cmd_tx_list(state: &AppState, filter: TransactionFilter) -> CliResult<()> {
    let wallet = &state.state.wallet;
    let indices = wallet.transaction_indices(filter);

    println!("📜 Transactions ({:?}): {}", filter, indices.len());
    for index in indices {
        if let Some(tx) = wallet.transaction(index) {
            print_transaction(wallet, tx);
        }
    }

    Ok(())
}

/// Show one transaction in detail
pub fn cmd_tx_show(state: &AppState, index: u64) -> CliResult<()> {
    let wallet = &state.state.wallet;
    let tx = wallet
        .transaction(index)
        .ok_or(MultisigError::NotFound(index))?;

    println!("🧾 Transaction {}", index);
    println!("   ├─ To: {}", tx.to);
    println!("   ├─ Value: {}", tx.value);
    println!("   ├─ Data: {}", tx.data_hex());
    match Action::resolve(wallet.address(), &tx.to, tx.value, &tx.data) {
        Ok(action) => println!("   ├─ Action: {:?}", action),
        Err(e) => println!("   ├─ Action: undecodable ({})", e),
    }
    println!("   ├─ Submitted by: {}", tx.submitted_by);
    println!("   ├─ Executed: {}", tx.executed);
    if let Some(at) = tx.executed_at {
        println!("   ├─ Executed at: {}", at.format("%Y-%m-%d %H:%M:%S"));
    }
    println!(
        "   └─ Confirmations: {} (counting {}/{})",
        tx.confirmations,
        wallet.effective_confirmations(index).unwrap_or(0),
        wallet.required()
    );
    for owner in wallet.confirmations(index) {
        let note = if wallet.is_owner(&owner) {
            ""
        } else {
            " (removed)"
        };
        println!("      ✍️  {}{}", owner, note);
    }

    Ok(())
}

/// Show balances: the wallet and every ledger holder
pub fn cmd_balance(state: &AppState, address: Option<&Address>) -> CliResult<()> {
    let WalletState { wallet, ledger } = &state.state;

    match address {
        Some(address) if address == wallet.address() => {
            println!("💰 Wallet balance: {}", wallet.balance());
        }
        Some(address) => {
            println!("💰 Balance of {}: {}", address, ledger.balance_of(address));
        }
        None => {
            println!("💰 Wallet balance: {}", wallet.balance());
            for (holder, amount) in ledger.holders() {
                println!("   {} : {}", holder, amount);
            }
        }
    }

    Ok(())
}

/// Make a ledger recipient refuse or accept transfers
pub fn cmd_ledger_reject(state: &mut AppState, address: &Address, reject: bool) -> CliResult<()> {
    if reject {
        state.state.ledger.reject_transfers_to(*address);
        println!("🚫 {} now rejects incoming transfers", address);
    } else {
        state.state.ledger.accept_transfers_to(address);
        println!("✅ {} now accepts incoming transfers", address);
    }
    state.save()
}

/// Print the event journal
pub fn cmd_events(state: &AppState, limit: Option<usize>) -> CliResult<()> {
    let events = state.storage.load_events()?;
    let skip = limit.map_or(0, |l| events.len().saturating_sub(l));

    println!("📣 Events ({} total):", events.len());
    for (position, event) in events.iter().enumerate().skip(skip) {
        println!("   {:>4} {}", position, event);
    }

    Ok(())
}

/// Rebuild the wallet from its journal and compare with the saved state
pub fn cmd_replay(state: &AppState) -> CliResult<()> {
    let events = state.storage.load_events()?;
    let wallet = &state.state.wallet;

    println!("🔍 Replaying {} events...", events.len());
    let replay = EventReplay::from_events(&events)?;

    let mut mismatches = Vec::new();
    if replay.wallet != *wallet.address() {
        mismatches.push("wallet address".to_string());
    }
    if replay.owners != wallet.owners() {
        mismatches.push("owners".to_string());
    }
    if replay.required != wallet.required() {
        mismatches.push("requirement".to_string());
    }
    if replay.balance != wallet.balance() {
        mismatches.push("balance".to_string());
    }
    if replay.transactions.len() as u64 != wallet.transaction_count() {
        mismatches.push("transaction count".to_string());
    }
    for (index, replayed) in &replay.transactions {
        let confirmed: BTreeSet<Address> = wallet.confirmations(*index).into_iter().collect();
        match wallet.transaction(*index) {
            Some(tx) if tx.executed == replayed.executed && confirmed == replayed.confirmed_by => {}
            _ => mismatches.push(format!("transaction {}", index)),
        }
    }

    if !mismatches.is_empty() {
        println!("❌ Journal and saved wallet disagree:");
        for m in &mismatches {
            println!("   └─ {}", m);
        }
        return Err(format!("journal mismatch: {}", mismatches.join(", ")).into());
    }

    println!("✅ Journal matches the saved wallet");
    println!(
        "   {} owners, threshold {}, {} transactions",
        replay.owners.len(),
        replay.required,
        replay.transactions.len()
    );

    Ok(())
}

/// Export wallet state to file
pub fn cmd_export(state: &AppState, path: &Path) -> CliResult<()> {
    crate::storage::save_to_file(&state.state, path)?;
    println!("📦 Wallet exported to {:?}", path);
    Ok(())
}

/// Import wallet state from file
///
/// The journal describes the replaced wallet, so it is cleared.
pub fn cmd_import(state: &mut AppState, path: &Path) -> CliResult<()> {
    let imported = crate::storage::load_from_file(path)?;

    state.storage.delete()?;
    state.state = imported;
    state.save()?;

    println!("📥 Wallet imported from {:?}", path);
    println!("   Address: {}", state.state.wallet.address());
    println!("   Threshold: {}", state.state.wallet.description());
    println!("   ⚠️  Event journal cleared");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn addr(n: u64) -> Address {
        Address::from_low_u64(n)
    }

    fn init_state(dir: &Path, required: usize) -> AppState {
        cmd_init(
            dir,
            &[addr(1), addr(2), addr(3)],
            required,
            WalletPolicy::default(),
            0,
            false,
        )
        .unwrap();
        AppState::new(dir.to_path_buf()).unwrap()
    }

    #[test]
    fn test_parse_helpers() {
        let list = parse_address_list("0x01, 0x02,").unwrap_err();
        assert!(list.to_string().contains("invalid address"));

        let a = addr(1).to_string();
        let b = addr(2).to_string();
        let parsed = parse_address_list(&format!("{}, {}", a, b)).unwrap();
        assert_eq!(parsed, vec![addr(1), addr(2)]);

        assert_eq!(parse_payload("0xCAFE").unwrap(), vec![0xca, 0xfe]);
        assert_eq!(parse_payload("").unwrap(), Vec::<u8>::new());
        assert!(parse_payload("0xzz").is_err());
    }

    #[test]
    fn test_load_without_init_fails() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(AppState::new(temp_dir.path().to_path_buf()).is_err());
    }

    #[test]
    fn test_init_does_not_overwrite_without_force() {
        let temp_dir = tempfile::tempdir().unwrap();
        let state = init_state(temp_dir.path(), 2);
        let address = *state.state.wallet.address();

        cmd_init(temp_dir.path(), &[addr(7)], 1, WalletPolicy::default(), 0, false).unwrap();
        let reloaded = AppState::new(temp_dir.path().to_path_buf()).unwrap();
        assert_eq!(*reloaded.state.wallet.address(), address);

        cmd_init(temp_dir.path(), &[addr(7)], 1, WalletPolicy::default(), 0, true).unwrap();
        let replaced = AppState::new(temp_dir.path().to_path_buf()).unwrap();
        assert_eq!(replaced.state.wallet.owners(), &[addr(7)]);
        assert_eq!(replaced.storage.load_events().unwrap().len(), 1);
    }

    #[test]
    fn test_command_flow_persists_and_journals() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut state = init_state(temp_dir.path(), 2);

        cmd_deposit(&mut state, &addr(9), 10).unwrap();
        cmd_submit(&mut state, &addr(1), &addr(4), 3, vec![], true).unwrap();
        cmd_confirm(&mut state, &addr(2), 0).unwrap();
        cmd_propose(&mut state, &addr(1), Action::ChangeRequirement { required: 3 }, true)
            .unwrap();
        cmd_confirm(&mut state, &addr(3), 1).unwrap();
        cmd_execute(&mut state, &addr(1), 0).unwrap();
        cmd_execute(&mut state, &addr(1), 1).unwrap();

        let reloaded = AppState::new(temp_dir.path().to_path_buf()).unwrap();
        assert_eq!(reloaded.state, state.state);
        assert_eq!(reloaded.state.wallet.balance(), 7);
        assert_eq!(reloaded.state.wallet.required(), 3);
        assert_eq!(reloaded.state.ledger.balance_of(&addr(4)), 3);

        let events = reloaded.storage.load_events().unwrap();
        let replay = EventReplay::from_events(&events).unwrap();
        assert_eq!(replay.required, 3);
        assert_eq!(replay.balance, 7);
        cmd_replay(&reloaded).unwrap();
    }

    #[test]
    fn test_replay_fails_on_tampered_journal() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut state = init_state(temp_dir.path(), 2);
        cmd_submit(&mut state, &addr(1), &addr(4), 0, vec![], true).unwrap();
        cmd_confirm(&mut state, &addr(2), 0).unwrap();
        cmd_replay(&state).unwrap();

        // Drop the second confirmation from the journal
        let journal = temp_dir.path().join("events.jsonl");
        let content = fs::read_to_string(&journal).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        let kept: Vec<&str> = lines[..lines.len() - 1].to_vec();
        assert!(lines[lines.len() - 1].contains("transaction_confirmed"));
        fs::write(&journal, kept.join("\n") + "\n").unwrap();

        let err = cmd_replay(&state).unwrap_err();
        assert!(err.to_string().contains("transaction 0"));
    }

    #[test]
    fn test_replay_checks_owner_order() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut state = init_state(temp_dir.path(), 1);
        cmd_propose(
            &mut state,
            &addr(2),
            Action::ReplaceOwners {
                old_owner: addr(1),
                new_owner: addr(9),
            },
            true,
        )
        .unwrap();
        cmd_execute(&mut state, &addr(2), 0).unwrap();
        assert_eq!(state.state.wallet.owners(), &[addr(9), addr(2), addr(3)]);
        cmd_replay(&state).unwrap();

        // Same members, different order
        let mut shuffled = state.state.clone();
        let mut owners = shuffled.wallet.owners().to_vec();
        owners.rotate_left(1);
        let mut json = serde_json::to_value(&shuffled).unwrap();
        json["wallet"]["owners"] = serde_json::to_value(&owners).unwrap();
        shuffled = serde_json::from_value(json).unwrap();
        state.state = shuffled;

        let err = cmd_replay(&state).unwrap_err();
        assert!(err.to_string().contains("owners"));
    }

    #[test]
    fn test_failed_execution_is_reported_not_raised() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut state = init_state(temp_dir.path(), 1);

        cmd_submit(&mut state, &addr(1), &addr(4), 5, vec![], true).unwrap();
        cmd_execute(&mut state, &addr(1), 0).unwrap();
        assert!(state.state.wallet.transaction(0).unwrap().is_pending());

        // Authorization errors still surface
        assert!(cmd_confirm(&mut state, &addr(8), 0).is_err());
        assert!(cmd_propose(
            &mut state,
            &addr(1),
            Action::Transfer {
                to: addr(4),
                value: 1,
                data: vec![],
            },
            false
        )
        .is_err());
    }

    #[test]
    fn test_import_replaces_wallet_and_clears_journal() {
        let source_dir = tempfile::tempdir().unwrap();
        let target_dir = tempfile::tempdir().unwrap();
        let mut source = init_state(source_dir.path(), 2);
        cmd_deposit(&mut source, &addr(9), 4).unwrap();

        let export = source_dir.path().join("export.json");
        cmd_export(&source, &export).unwrap();

        let mut target = init_state(target_dir.path(), 1);
        cmd_import(&mut target, &export).unwrap();

        assert_eq!(target.state, source.state);
        assert!(target.storage.load_events().unwrap().is_empty());
        assert_eq!(AppState::new(target_dir.path().to_path_buf()).unwrap().state, source.state);
    }
}
