//! Integration tests for the iproute2 backend
//!
//! These tests drive the real `ip` binary. Tests that mutate an interface
//! also require `CAP_NET_ADMIN`. Set L3LB_TEST_INTERFACE (defaults to `lo`)
//! and run with `--ignored`.

use ifaddr_client::{AddressBackend, IpCommandBackend};
use std::net::Ipv4Addr;

fn test_interface() -> String {
    std::env::var("L3LB_TEST_INTERFACE").unwrap_or_else(|_| "lo".to_string())
}

#[tokio::test]
#[ignore] // Requires the iproute2 `ip` binary
async fn test_loopback_has_localhost() {
    let backend = IpCommandBackend::new("ip");

    let addresses = backend.query_assigned("lo").await
        .expect("Failed to query lo");

    assert!(
        addresses.iter().any(|a| a.address == Ipv4Addr::LOCALHOST),
        "lo should carry 127.0.0.1"
    );
}

#[tokio::test]
#[ignore]
async fn test_add_and_remove_address() {
    let backend = IpCommandBackend::new("ip");
    let interface = test_interface();
    let address = Ipv4Addr::new(198, 51, 100, 77);

    let added = backend.ensure_present(&interface, address, 32).await
        .expect("Failed to add address");
    assert!(added);

    // Second call is a no-op
    let added_again = backend.ensure_present(&interface, address, 32).await
        .expect("Redundant add should succeed");
    assert!(!added_again);

    let removed = backend.ensure_absent(&interface, address, 32).await
        .expect("Failed to remove address");
    assert!(removed);

    let removed_again = backend.ensure_absent(&interface, address, 32).await
        .expect("Redundant remove should succeed");
    assert!(!removed_again);
}
