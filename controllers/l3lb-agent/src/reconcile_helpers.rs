//! Helper functions for the reconciliation pass
//!
//! Pure set computations kept apart from the I/O in the reconciler so they
//! can be tested directly.

use ifaddr_client::{InterfaceAddress, Ipv4Prefix};
use std::collections::BTreeSet;
use std::net::Ipv4Addr;

/// Check whether a service's recorded ingress differs from its desired addresses
///
/// Comparison is by set: order and duplicates are ignored. Ingress entries
/// that are not IPv4 addresses always count as a difference.
pub fn ingress_needs_update(current: &[String], desired: &[Ipv4Addr]) -> bool {
    if current.is_empty() {
        // No ingress recorded yet
        return !desired.is_empty();
    }

    let mut recorded = BTreeSet::new();
    for raw in current {
        match raw.parse::<Ipv4Addr>() {
            Ok(ip) => {
                recorded.insert(ip);
            }
            Err(_) => return true,
        }
    }
    recorded != desired.iter().copied().collect::<BTreeSet<_>>()
}

/// Addresses on the interface that the agent owns, i.e. those inside `prefix`
pub fn owned_addresses(
    assigned: &BTreeSet<InterfaceAddress>,
    prefix: &Ipv4Prefix,
) -> BTreeSet<InterfaceAddress> {
    assigned
        .iter()
        .filter(|bound| prefix.contains(bound.address))
        .copied()
        .collect()
}

/// Owned addresses that no selected service wants anymore
pub fn stale_addresses(
    owned: &BTreeSet<InterfaceAddress>,
    candidates: &BTreeSet<Ipv4Addr>,
) -> Vec<InterfaceAddress> {
    owned
        .iter()
        .filter(|bound| !candidates.contains(&bound.address))
        .copied()
        .collect()
}
