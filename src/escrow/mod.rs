//! Escrow protocol
//!
//! Redeem scripts, payout aggregation, per-party signing and signature
//! combination into contract calls.

pub mod combine;
pub mod error;
pub mod payout;
pub mod script;
pub mod signing;

pub use combine::{build_release_call, combine, submit_call, EscrowCall, ReleaseRequest};
pub use error::EscrowError;
pub use payout::{aggregate, PayoutLine, Payouts};
pub use script::{generate, RedeemScript, MAX_PARTIES, SCRIPT_LENGTH, UNIQUE_ID_LENGTH};
pub use signing::{
    create_signature, message_hash, payload_hash, sign_payouts, PartialSignature, SignerRole,
    SIGNED_MESSAGE_PREFIX,
};
