//! Node and contract-registry services

pub mod client;
pub mod registry;

pub use client::{NodeClient, NodeError, SubmittedTx, TxParams};
pub use registry::{Registry, StaticRegistry};
