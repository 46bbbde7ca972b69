//! Wallet module: the escrow wallet, its configuration, listeners,
//! pending-transaction recovery and key files

pub mod config;
pub mod keyfile;
pub mod listeners;
pub mod recovery;
pub mod wallet;

pub use config::WalletConfig;
pub use keyfile::{KeyFile, WalletError};
pub use listeners::{Listener, ListenerRegistry};
pub use recovery::{check_pending, CheckOutcome, RecoveryHandle, RecoveryLoop};
pub use wallet::{EscrowWallet, SpendRoute};
