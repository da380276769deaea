//! Mock AddressBackend for unit testing
//!
//! This module provides an in-memory implementation of [`AddressBackend`]
//! that can be used in unit tests without touching real interfaces.

use crate::backend_trait::AddressBackend;
use crate::error::AddressError;
use crate::prefix::InterfaceAddress;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A recorded call against the mock backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    /// `ensure_present` was invoked
    EnsurePresent {
        /// Interface name
        interface: String,
        /// Address and requested prefix length
        address: InterfaceAddress,
        /// Whether the interface changed
        changed: bool,
    },
    /// `ensure_absent` was invoked
    EnsureAbsent {
        /// Interface name
        interface: String,
        /// Address and requested prefix length
        address: InterfaceAddress,
        /// Whether the interface changed
        changed: bool,
    },
}

impl BackendCall {
    /// Whether this call mutated the interface
    #[must_use]
    pub fn changed(&self) -> bool {
        match self {
            Self::EnsurePresent { changed, .. } | Self::EnsureAbsent { changed, .. } => *changed,
        }
    }
}

/// Mock AddressBackend for testing
///
/// Stores interface addresses in memory, records every mutation call, and
/// can be configured to fail for specific addresses or for queries.
#[derive(Debug, Clone, Default)]
pub struct MockAddressBackend {
    interfaces: Arc<Mutex<HashMap<String, BTreeSet<InterfaceAddress>>>>,
    calls: Arc<Mutex<Vec<BackendCall>>>,
    failing_addresses: Arc<Mutex<HashSet<Ipv4Addr>>>,
    fail_queries: Arc<Mutex<bool>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockAddressBackend {
    /// Create an empty mock backend
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind an address directly (for test setup, not recorded as a call)
    pub fn bind(&self, interface: &str, address: InterfaceAddress) {
        lock(&self.interfaces)
            .entry(interface.to_string())
            .or_default()
            .insert(address);
    }

    /// Addresses currently bound to `interface`
    #[must_use]
    pub fn addresses(&self, interface: &str) -> BTreeSet<InterfaceAddress> {
        lock(&self.interfaces)
            .get(interface)
            .cloned()
            .unwrap_or_default()
    }

    /// Every mutation call made so far, in order
    #[must_use]
    pub fn calls(&self) -> Vec<BackendCall> {
        lock(&self.calls).clone()
    }

    /// Number of calls that actually changed an interface
    #[must_use]
    pub fn mutation_count(&self) -> usize {
        lock(&self.calls).iter().filter(|call| call.changed()).count()
    }

    /// Forget recorded calls (bound addresses are kept)
    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    /// Make every mutation of `address` fail
    pub fn fail_for(&self, address: Ipv4Addr) {
        lock(&self.failing_addresses).insert(address);
    }

    /// Make `query_assigned` fail
    pub fn fail_queries(&self, fail: bool) {
        *lock(&self.fail_queries) = fail;
    }

    fn check_failure(&self, address: Ipv4Addr) -> Result<(), AddressError> {
        if lock(&self.failing_addresses).contains(&address) {
            return Err(AddressError::Backend(format!("injected failure for {address}")));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl AddressBackend for MockAddressBackend {
    async fn query_assigned(
        &self,
        interface: &str,
    ) -> Result<BTreeSet<InterfaceAddress>, AddressError> {
        if *lock(&self.fail_queries) {
            return Err(AddressError::Backend(format!("injected query failure for {interface}")));
        }
        Ok(self.addresses(interface))
    }

    async fn ensure_present(
        &self,
        interface: &str,
        address: Ipv4Addr,
        prefix_len: u8,
    ) -> Result<bool, AddressError> {
        self.check_failure(address)?;
        let changed = {
            let mut interfaces = lock(&self.interfaces);
            let bound = interfaces.entry(interface.to_string()).or_default();
            if bound.iter().any(|a| a.address == address) {
                false
            } else {
                bound.insert(InterfaceAddress::new(address, prefix_len))
            }
        };
        lock(&self.calls).push(BackendCall::EnsurePresent {
            interface: interface.to_string(),
            address: InterfaceAddress::new(address, prefix_len),
            changed,
        });
        Ok(changed)
    }

    async fn ensure_absent(
        &self,
        interface: &str,
        address: Ipv4Addr,
        prefix_len: u8,
    ) -> Result<bool, AddressError> {
        self.check_failure(address)?;
        let changed = {
            let mut interfaces = lock(&self.interfaces);
            match interfaces.get_mut(interface) {
                Some(bound) => {
                    let before = bound.len();
                    bound.retain(|a| a.address != address);
                    bound.len() != before
                }
                None => false,
            }
        };
        lock(&self.calls).push(BackendCall::EnsureAbsent {
            interface: interface.to_string(),
            address: InterfaceAddress::new(address, prefix_len),
            changed,
        });
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ensure_present_is_idempotent() {
        let backend = MockAddressBackend::new();
        let addr = Ipv4Addr::new(10, 0, 0, 5);

        assert!(backend.ensure_present("lo", addr, 32).await.unwrap());
        assert!(!backend.ensure_present("lo", addr, 32).await.unwrap());

        assert_eq!(backend.addresses("lo").len(), 1);
        assert_eq!(backend.calls().len(), 2);
        assert_eq!(backend.mutation_count(), 1);
    }

    #[tokio::test]
    async fn test_ensure_absent_is_idempotent() {
        let backend = MockAddressBackend::new();
        let addr = Ipv4Addr::new(10, 0, 0, 9);
        backend.bind("lo", InterfaceAddress::host(addr));

        assert!(backend.ensure_absent("lo", addr, 32).await.unwrap());
        assert!(!backend.ensure_absent("lo", addr, 32).await.unwrap());
        assert!(!backend.ensure_absent("eth0", addr, 32).await.unwrap());

        assert!(backend.addresses("lo").is_empty());
        assert_eq!(backend.mutation_count(), 1);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let backend = MockAddressBackend::new();
        let addr = Ipv4Addr::new(10, 0, 0, 6);
        backend.fail_for(addr);
        assert!(backend.ensure_present("lo", addr, 32).await.is_err());
        assert!(backend.calls().is_empty());

        backend.fail_queries(true);
        assert!(backend.query_assigned("lo").await.is_err());
        backend.fail_queries(false);
        assert!(backend.query_assigned("lo").await.unwrap().is_empty());
    }
}
