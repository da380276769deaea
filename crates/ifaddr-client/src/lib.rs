//! Interface Address Client
//!
//! Queries and mutates the IPv4 addresses bound to a named network interface.
//! The l3lb agent drives every address change through the [`AddressBackend`]
//! trait so reconciliation logic can be tested against an in-memory mock.
//!
//! # Example
//!
//! ```no_run
//! use ifaddr_client::{AddressBackend, IpCommandBackend};
//! use std::net::Ipv4Addr;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = IpCommandBackend::new("ip");
//!
//! // Idempotent: a second call is a no-op
//! backend.ensure_present("lo", Ipv4Addr::new(10, 0, 0, 5), 32).await?;
//!
//! for address in backend.query_assigned("lo").await? {
//!     println!("{address}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **iproute2 backend**: [`IpCommandBackend`] shells out to `ip address`
//! - **Prefix math**: [`Ipv4Prefix`] for CIDR membership checks
//! - **Mocking**: `MockAddressBackend` behind the `test-util` feature

pub mod client;
pub mod error;
pub mod prefix;
#[path = "trait.rs"]
pub mod backend_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use backend_trait::AddressBackend;
pub use client::IpCommandBackend;
pub use error::AddressError;
pub use prefix::{InterfaceAddress, Ipv4Prefix};
#[cfg(any(test, feature = "test-util"))]
pub use mock::{BackendCall, MockAddressBackend};
