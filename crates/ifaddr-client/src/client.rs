//! iproute2-backed address client

use crate::backend_trait::AddressBackend;
use crate::error::AddressError;
use crate::prefix::InterfaceAddress;
use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, info};

/// Address backend that drives the `ip` utility from iproute2.
///
/// Every call reads live kernel state; nothing is cached between calls.
#[derive(Debug, Clone)]
pub struct IpCommandBackend {
    ip_binary: PathBuf,
}

impl IpCommandBackend {
    /// Create a backend using the given `ip` binary (a bare name is resolved via `PATH`)
    pub fn new(ip_binary: impl Into<PathBuf>) -> Self {
        Self {
            ip_binary: ip_binary.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<String, AddressError> {
        let command = format!("{} {}", self.ip_binary.display(), args.join(" "));
        debug!("Running {}", command);

        let output = Command::new(&self.ip_binary).args(args).output().await?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(AddressError::Command {
                command,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    async fn find_bound(
        &self,
        interface: &str,
        address: Ipv4Addr,
    ) -> Result<Option<InterfaceAddress>, AddressError> {
        Ok(self
            .query_assigned(interface)
            .await?
            .into_iter()
            .find(|bound| bound.address == address))
    }
}

#[async_trait::async_trait]
impl AddressBackend for IpCommandBackend {
    async fn query_assigned(
        &self,
        interface: &str,
    ) -> Result<BTreeSet<InterfaceAddress>, AddressError> {
        let stdout = self
            .run(&["-o", "-4", "address", "show", "dev", interface])
            .await?;
        Ok(parse_ip_addr_output(&stdout))
    }

    async fn ensure_present(
        &self,
        interface: &str,
        address: Ipv4Addr,
        prefix_len: u8,
    ) -> Result<bool, AddressError> {
        if self.find_bound(interface, address).await?.is_some() {
            debug!("{} already bound to {}", address, interface);
            return Ok(false);
        }

        let cidr = InterfaceAddress::new(address, prefix_len).to_string();
        info!("Assuming address {} on {}", cidr, interface);
        self.run(&["address", "add", &cidr, "dev", interface]).await?;
        Ok(true)
    }

    async fn ensure_absent(
        &self,
        interface: &str,
        address: Ipv4Addr,
        prefix_len: u8,
    ) -> Result<bool, AddressError> {
        let Some(bound) = self.find_bound(interface, address).await? else {
            debug!("{} not bound to {}", address, interface);
            return Ok(false);
        };

        // The kernel only deletes an exact address/length match
        if bound.prefix_len != prefix_len {
            debug!(
                "{} is bound as /{} on {}, not /{}",
                address, bound.prefix_len, interface, prefix_len
            );
        }
        let cidr = bound.to_string();
        info!("Forfeiting address {} on {}", cidr, interface);
        self.run(&["address", "del", &cidr, "dev", interface]).await?;
        Ok(true)
    }
}

/// Parse `ip -o -4 address show` output into interface addresses.
///
/// Lines look like `1: lo    inet 127.0.0.1/8 scope host lo\ ...`.
/// Entries whose address does not parse as IPv4 are skipped, as are
/// point-to-point entries (`inet 10.0.0.1 peer 10.0.0.2/32`): the agent never
/// binds those, and deleting one needs the peer as well.
pub fn parse_ip_addr_output(stdout: &str) -> BTreeSet<InterfaceAddress> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut tokens = line.split_whitespace();
            tokens.find(|token| *token == "inet")?;
            let local = tokens.next()?;
            if tokens.next() == Some("peer") {
                return None;
            }
            local.parse::<InterfaceAddress>().ok()
        })
        .collect()
}
