//! Contract registry lookup

use crate::core::Address;
use crate::rpc::client::NodeError;
use async_trait::async_trait;

/// Resolves the currently recommended implementation of a contract kind
#[async_trait]
pub trait Registry: Send + Sync {
    /// Recommended contract address for `kind`; zero when none is deployed
    async fn recommended_implementation(&self, kind: &str) -> Result<Address, NodeError>;
}

/// Registry answering every lookup with one configured address
#[derive(Debug, Clone, Copy)]
pub struct StaticRegistry {
    implementation: Address,
}

impl StaticRegistry {
    pub fn new(implementation: Address) -> Self {
        Self { implementation }
    }
}

#[async_trait]
impl Registry for StaticRegistry {
    async fn recommended_implementation(&self, kind: &str) -> Result<Address, NodeError> {
        log::debug!("Registry lookup for '{}' -> {}", kind, self.implementation);
        Ok(self.implementation)
    }
}
