//! Escrow wallet CLI
//!
//! Offline tooling for escrow scripts, payouts and signatures.

use clap::{Parser, Subcommand};
use escrow_wallet::cli::{self, ScriptCreateArgs};
use escrow_wallet::wallet::WalletConfig;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "escrow-wallet")]
#[command(author = "Darshan")]
#[command(version = "0.1.0")]
#[command(about = "Multi-party escrow wallet tooling", long_about = None)]
struct Cli {
    /// Data directory for watched scripts and pending transactions
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// JSON wallet configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new signing key file
    Keygen {
        /// Output key file
        #[arg(short, long)]
        output: PathBuf,

        /// Optional label for the key
        #[arg(short, long)]
        label: Option<String>,
    },

    /// Escrow script operations
    Script {
        #[command(subcommand)]
        action: ScriptCommands,
    },

    /// Preview the payouts of a release
    Payout {
        /// Serialized script (hex)
        #[arg(short, long)]
        script: String,

        /// Funding input values
        #[arg(short, long)]
        input: Vec<u64>,

        /// Requested outputs as <address>=<value>
        #[arg(short, long)]
        output: Vec<String>,
    },

    /// Sign a release with a key file
    Sign {
        /// Key file
        #[arg(short, long)]
        key: PathBuf,

        /// Serialized script (hex)
        #[arg(short, long)]
        script: String,

        /// Funding input values
        #[arg(short, long)]
        input: Vec<u64>,

        /// Requested outputs as <address>=<value>
        #[arg(short, long)]
        output: Vec<String>,
    },

    /// Pending transaction records
    Pending {
        #[command(subcommand)]
        action: PendingCommands,
    },
}

#[derive(Subcommand)]
enum ScriptCommands {
    /// Create an escrow script and watch its address
    Create {
        /// Buyer extended public key (<public key>:<chain code>)
        #[arg(long)]
        buyer: String,

        /// Seller extended public key
        #[arg(long)]
        seller: String,

        /// Moderator extended public key
        #[arg(long)]
        moderator: Option<String>,

        /// Signatures required to release
        #[arg(short, long, default_value = "2")]
        threshold: usize,

        /// Hours until the buyer may release alone (0 disables)
        #[arg(long, default_value = "0")]
        timeout_hours: u64,

        /// Escrow contract address
        #[arg(long)]
        contract: String,
    },

    /// Decode a serialized script
    Inspect {
        /// Serialized script (hex)
        script: String,
    },
}

#[derive(Subcommand)]
enum PendingCommands {
    /// List pending transactions
    List,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => WalletConfig::load(path)?,
        None => WalletConfig::default(),
    };
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }

    match cli.command {
        Commands::Keygen { output, label } => {
            cli::cmd_keygen(&output, label.as_deref())?;
        }
        Commands::Script { action } => match action {
            ScriptCommands::Create {
                buyer,
                seller,
                moderator,
                threshold,
                timeout_hours,
                contract,
            } => {
                let args = ScriptCreateArgs {
                    buyer: &buyer,
                    seller: &seller,
                    moderator: moderator.as_deref(),
                    threshold,
                    timeout_hours,
                    contract: &contract,
                };
                let rt = tokio::runtime::Runtime::new()?;
                rt.block_on(cli::cmd_script_create(&config, &args))?;
            }
            ScriptCommands::Inspect { script } => {
                cli::cmd_script_inspect(&script)?;
            }
        },
        Commands::Payout {
            script,
            input,
            output,
        } => {
            cli::cmd_payout(&script, &input, &output)?;
        }
        Commands::Sign {
            key,
            script,
            input,
            output,
        } => {
            cli::cmd_sign(&key, &script, &input, &output)?;
        }
        Commands::Pending { action } => match action {
            PendingCommands::List => {
                cli::cmd_pending_list(&config)?;
            }
        },
    }

    Ok(())
}
