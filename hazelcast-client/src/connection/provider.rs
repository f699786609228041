//! Sources of candidate member addresses.

use async_trait::async_trait;
use hazelcast_core::Result;

use super::Address;
use crate::config::NetworkConfig;

/// Supplies the addresses tried when connecting to a cluster.
#[async_trait]
pub trait AddressProvider: Send + Sync + std::fmt::Debug {
    /// Loads the current candidate addresses, in preference order.
    async fn load_addresses(&self) -> Result<Vec<Address>>;
}

/// Provider backed by a fixed address list.
#[derive(Debug, Clone)]
pub struct StaticAddressProvider {
    addresses: Vec<Address>,
}

impl StaticAddressProvider {
    /// Creates a provider for the given addresses.
    pub fn new(addresses: Vec<Address>) -> Self {
        Self { addresses }
    }

    /// Creates a provider for the addresses of a network configuration.
    pub fn from_config(network: &NetworkConfig) -> Self {
        Self::new(network.addresses().to_vec())
    }

    /// Returns the configured addresses.
    pub fn addresses(&self) -> &[Address] {
        &self.addresses
    }
}

#[async_trait]
impl AddressProvider for StaticAddressProvider {
    async fn load_addresses(&self) -> Result<Vec<Address>> {
        Ok(self.addresses.clone())
    }
}

impl<T> From<T> for StaticAddressProvider
where
    T: IntoIterator<Item = Address>,
{
    fn from(addresses: T) -> Self {
        Self::new(addresses.into_iter().collect())
    }
}
