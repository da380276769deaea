//! AddressBackend trait for mocking
//!
//! This trait abstracts interface address management so the agent's
//! reconciler can run against the real `ip` utility in production and an
//! in-memory mock in unit tests.

use crate::error::AddressError;
use crate::prefix::InterfaceAddress;
use std::collections::BTreeSet;
use std::net::Ipv4Addr;

/// Trait for interface address operations
///
/// Both mutations are idempotent: binding an already-bound address or
/// unbinding an absent one is a successful no-op. They return `true` only
/// when the interface actually changed.
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait AddressBackend: Send + Sync {
    /// Current IPv4 addresses bound to `interface`, read live from the OS
    async fn query_assigned(
        &self,
        interface: &str,
    ) -> Result<BTreeSet<InterfaceAddress>, AddressError>;

    /// Bind `address/prefix_len` to `interface` if it is not bound yet
    async fn ensure_present(
        &self,
        interface: &str,
        address: Ipv4Addr,
        prefix_len: u8,
    ) -> Result<bool, AddressError>;

    /// Unbind `address/prefix_len` from `interface` if it is bound
    async fn ensure_absent(
        &self,
        interface: &str,
        address: Ipv4Addr,
        prefix_len: u8,
    ) -> Result<bool, AddressError>;
}
