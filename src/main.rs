//! Multisig Wallet CLI Application
//!
//! A command-line interface for operating an M-of-N multisig wallet.

use clap::{Parser, Subcommand, ValueEnum};
use multisig_wallet::cli::{self, parse_address, parse_address_list, parse_payload, AppState};
use multisig_wallet::multisig::{
    Action, ExecutionAccess, RemovedOwnerConfirmations, RequirementOnRemoval, TransactionFilter,
    WalletPolicy,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "multisig")]
#[command(author = "Darshan")]
#[command(version = "0.1.0")]
#[command(about = "An M-of-N multi-signature custody wallet", long_about = None)]
struct Cli {
    /// Data directory for wallet storage
    #[arg(short, long, default_value = ".multisig_data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new multisig wallet
    Init {
        /// Owner addresses (comma-separated)
        #[arg(short, long)]
        owners: String,

        /// Confirmations required to execute
        #[arg(short, long)]
        required: usize,

        /// Salt mixed into the wallet address
        #[arg(long, default_value = "0")]
        salt: u64,

        /// Only owners may execute confirmed transactions
        #[arg(long)]
        owners_only_execution: bool,

        /// Ignore confirmations of owners that were removed
        #[arg(long)]
        discard_removed_confirmations: bool,

        /// Lower the threshold when deleting an owner would make it unreachable
        #[arg(long)]
        clamp_requirement: bool,

        /// Replace an existing wallet
        #[arg(long)]
        force: bool,
    },

    /// Generate random addresses
    Address {
        /// Number of addresses
        #[arg(short, long, default_value = "1")]
        count: usize,
    },

    /// Show wallet information
    Info,

    /// List current owners
    Owners,

    /// Fund the wallet (no authorization required)
    Deposit {
        /// Sender address
        #[arg(short, long)]
        from: String,

        /// Amount to deposit
        #[arg(short, long)]
        amount: u128,
    },

    /// Submit a transaction
    Submit {
        /// Submitting owner
        #[arg(short, long)]
        from: String,

        /// Destination address
        #[arg(short, long)]
        to: String,

        /// Value to transfer
        #[arg(short, long, default_value = "0")]
        value: u128,

        /// Call data (hex)
        #[arg(long, default_value = "")]
        data: String,

        /// Also confirm as the submitter
        #[arg(long)]
        confirm: bool,
    },

    /// Propose an administrative change to the wallet itself
    Propose {
        /// Submitting owner
        #[arg(short, long)]
        from: String,

        /// Also confirm as the submitter
        #[arg(long)]
        confirm: bool,

        #[command(subcommand)]
        action: ProposeCommands,
    },

    /// Confirm a transaction
    Confirm {
        /// Confirming owner
        #[arg(short, long)]
        from: String,

        /// Transaction index
        #[arg(short, long)]
        index: u64,
    },

    /// Revoke a confirmation
    Revoke {
        /// Revoking owner
        #[arg(short, long)]
        from: String,

        /// Transaction index
        #[arg(short, long)]
        index: u64,
    },

    /// Execute a confirmed transaction
    Execute {
        /// Executing address
        #[arg(short, long)]
        from: String,

        /// Transaction index
        #[arg(short, long)]
        index: u64,
    },

    /// Transaction queries
    Tx {
        #[command(subcommand)]
        action: TxCommands,
    },

    /// Show balances
    Balance {
        /// Address to query (defaults to the wallet and all holders)
        #[arg(short, long)]
        address: Option<String>,
    },

    /// Simulated ledger controls
    Ledger {
        #[command(subcommand)]
        action: LedgerCommands,
    },

    /// Show the event journal
    Events {
        /// Only show the most recent events
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Verify the event journal against the saved wallet
    Replay,

    /// Export wallet to file
    Export {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Import wallet from file
    Import {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,
    },
}

#[derive(Subcommand)]
enum ProposeCommands {
    /// Add an owner
    AddOwner {
        #[arg(short, long)]
        owner: String,
    },

    /// Remove an owner
    DeleteOwner {
        #[arg(short, long)]
        owner: String,
    },

    /// Swap an owner for a new one
    ReplaceOwner {
        #[arg(long)]
        old: String,

        #[arg(long)]
        new: String,
    },

    /// Change the confirmation threshold
    ChangeRequirement {
        #[arg(short, long)]
        required: usize,
    },
}

#[derive(Subcommand)]
enum TxCommands {
    /// List transactions
    List {
        #[arg(short, long, value_enum, default_value = "all")]
        status: Status,
    },

    /// Show one transaction
    Show {
        #[arg(short, long)]
        index: u64,
    },
}

#[derive(Subcommand)]
enum LedgerCommands {
    /// Make an address refuse incoming transfers
    Reject {
        #[arg(short, long)]
        address: String,
    },

    /// Make an address accept incoming transfers again
    Accept {
        #[arg(short, long)]
        address: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Status {
    All,
    Pending,
    Executed,
}

impl From<Status> for TransactionFilter {
    fn from(status: Status) -> Self {
        match status {
            Status::All => TransactionFilter::All,
            Status::Pending => TransactionFilter::Pending,
            Status::Executed => TransactionFilter::Executed,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Commands that don't need a loaded wallet
    match &cli.command {
        Commands::Init {
            owners,
            required,
            salt,
            owners_only_execution,
            discard_removed_confirmations,
            clamp_requirement,
            force,
        } => {
            let policy = WalletPolicy {
                execution: if *owners_only_execution {
                    ExecutionAccess::OwnersOnly
                } else {
                    ExecutionAccess::Anyone
                },
                removed_owner_confirmations: if *discard_removed_confirmations {
                    RemovedOwnerConfirmations::Discard
                } else {
                    RemovedOwnerConfirmations::Count
                },
                requirement_on_removal: if *clamp_requirement {
                    RequirementOnRemoval::Clamp
                } else {
                    RequirementOnRemoval::Reject
                },
            };
            let owners = parse_address_list(owners)?;
            return cli::cmd_init(&cli.data_dir, &owners, *required, policy, *salt, *force);
        }
        Commands::Address { count } => return cli::cmd_address_new(*count),
        _ => {}
    }

    // Initialize application state
    let mut state = AppState::new(cli.data_dir.clone())?;

    // Process commands
    match cli.command {
        Commands::Init { .. } | Commands::Address { .. } => unreachable!(),

        Commands::Info => cli::cmd_info(&state)?,

        Commands::Owners => cli::cmd_owners(&state)?,

        Commands::Deposit { from, amount } => {
            cli::cmd_deposit(&mut state, &parse_address(&from)?, amount)?;
        }

        Commands::Submit {
            from,
            to,
            value,
            data,
            confirm,
        } => {
            cli::cmd_submit(
                &mut state,
                &parse_address(&from)?,
                &parse_address(&to)?,
                value,
                parse_payload(&data)?,
                confirm,
            )?;
        }

        Commands::Propose {
            from,
            confirm,
            action,
        } => {
            let action = match action {
                ProposeCommands::AddOwner { owner } => Action::AddOwner {
                    owner: parse_address(&owner)?,
                },
                ProposeCommands::DeleteOwner { owner } => Action::DeleteOwner {
                    owner: parse_address(&owner)?,
                },
                ProposeCommands::ReplaceOwner { old, new } => Action::ReplaceOwners {
                    old_owner: parse_address(&old)?,
                    new_owner: parse_address(&new)?,
                },
                ProposeCommands::ChangeRequirement { required } => {
                    Action::ChangeRequirement { required }
                }
            };
            cli::cmd_propose(&mut state, &parse_address(&from)?, action, confirm)?;
        }

        Commands::Confirm { from, index } => {
            cli::cmd_confirm(&mut state, &parse_address(&from)?, index)?;
        }

        Commands::Revoke { from, index } => {
            cli::cmd_revoke(&mut state, &parse_address(&from)?, index)?;
        }

        Commands::Execute { from, index } => {
            cli::cmd_execute(&mut state, &parse_address(&from)?, index)?;
        }

        Commands::Tx { action } => match action {
            TxCommands::List { status } => cli::cmd_tx_list(&state, status.into())?,
            TxCommands::Show { index } => cli::cmd_tx_show(&state, index)?,
        },

        Commands::Balance { address } => {
            let address = address.as_deref().map(parse_address).transpose()?;
            cli::cmd_balance(&state, address.as_ref())?;
        }

        Commands::Ledger { action } => match action {
            LedgerCommands::Reject { address } => {
                cli::cmd_ledger_reject(&mut state, &parse_address(&address)?, true)?;
            }
            LedgerCommands::Accept { address } => {
                cli::cmd_ledger_reject(&mut state, &parse_address(&address)?, false)?;
            }
        },

        Commands::Events { limit } => cli::cmd_events(&state, limit)?,

        Commands::Replay => cli::cmd_replay(&state)?,

        Commands::Export { output } => cli::cmd_export(&state, &output)?,

        Commands::Import { input } => cli::cmd_import(&mut state, &input)?,
    }

    Ok(())
}
