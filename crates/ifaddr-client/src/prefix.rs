//! IPv4 prefix and interface address types

use crate::error::AddressError;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// An IPv4 network in CIDR notation, e.g. `10.0.0.0/24`.
///
/// Host bits must be zero; `10.0.0.1/24` is rejected rather than silently
/// widened, so a typo cannot grow the range the agent garbage-collects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4Prefix {
    network: Ipv4Addr,
    len: u8,
}

impl Ipv4Prefix {
    /// Create a prefix from a network address and length
    ///
    /// # Errors
    ///
    /// Returns [`AddressError::InvalidPrefix`] if `len` exceeds 32 or the
    /// network address has host bits set.
    pub fn new(network: Ipv4Addr, len: u8) -> Result<Self, AddressError> {
        if len > 32 {
            return Err(AddressError::InvalidPrefix(format!(
                "prefix length {len} exceeds 32"
            )));
        }
        let mask = Self::mask_for(len);
        if u32::from(network) & !mask != 0 {
            return Err(AddressError::InvalidPrefix(format!(
                "{network}/{len} has host bits set"
            )));
        }
        Ok(Self { network, len })
    }

    /// Network address
    #[must_use]
    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    /// Prefix length in bits
    #[must_use]
    pub fn len(&self) -> u8 {
        self.len
    }

    /// Whether the address falls inside this prefix
    #[must_use]
    pub fn contains(&self, address: Ipv4Addr) -> bool {
        u32::from(address) & Self::mask_for(self.len) == u32::from(self.network)
    }

    fn mask_for(len: u8) -> u32 {
        if len == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(len))
        }
    }
}

impl FromStr for Ipv4Prefix {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (network, len) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| AddressError::InvalidPrefix(format!("{s}: missing '/<length>'")))?;
        let network = network
            .parse::<Ipv4Addr>()
            .map_err(|e| AddressError::InvalidPrefix(format!("{s}: {e}")))?;
        let len = len
            .parse::<u8>()
            .map_err(|e| AddressError::InvalidPrefix(format!("{s}: {e}")))?;
        Self::new(network, len)
    }
}

impl fmt::Display for Ipv4Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.len)
    }
}

/// An IPv4 address as bound to an interface, with its prefix length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InterfaceAddress {
    /// Bound address
    pub address: Ipv4Addr,
    /// Prefix length the address was bound with
    pub prefix_len: u8,
}

impl InterfaceAddress {
    /// Create an interface address
    #[must_use]
    pub fn new(address: Ipv4Addr, prefix_len: u8) -> Self {
        Self { address, prefix_len }
    }

    /// A single-host (`/32`) address
    #[must_use]
    pub fn host(address: Ipv4Addr) -> Self {
        Self::new(address, 32)
    }
}

impl FromStr for InterfaceAddress {
    type Err = AddressError;

    /// Parses `a.b.c.d/len`; a bare address is treated as `/32`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (address, len) = match s.split_once('/') {
            Some((address, len)) => (address, Some(len)),
            None => (s, None),
        };
        let address = address
            .parse::<Ipv4Addr>()
            .map_err(|e| AddressError::InvalidPrefix(format!("{s}: {e}")))?;
        let prefix_len = match len {
            Some(len) => len
                .parse::<u8>()
                .ok()
                .filter(|l| *l <= 32)
                .ok_or_else(|| AddressError::InvalidPrefix(format!("{s}: bad length")))?,
            None => 32,
        };
        Ok(Self::new(address, prefix_len))
    }
}

impl fmt::Display for InterfaceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_contains() {
        let prefix: Ipv4Prefix = "10.0.0.0/24".parse().unwrap();
        assert!(prefix.contains(Ipv4Addr::new(10, 0, 0, 5)));
        assert!(prefix.contains(Ipv4Addr::new(10, 0, 0, 255)));
        assert!(!prefix.contains(Ipv4Addr::new(10, 0, 1, 0)));
        assert!(!prefix.contains(Ipv4Addr::new(172, 16, 0, 1)));
    }

    #[test]
    fn test_prefix_edges() {
        let everything: Ipv4Prefix = "0.0.0.0/0".parse().unwrap();
        assert!(everything.contains(Ipv4Addr::new(203, 0, 113, 7)));

        let single: Ipv4Prefix = "192.168.1.10/32".parse().unwrap();
        assert!(single.contains(Ipv4Addr::new(192, 168, 1, 10)));
        assert!(!single.contains(Ipv4Addr::new(192, 168, 1, 11)));
    }

    #[test]
    fn test_prefix_rejects_malformed_input() {
        assert!("10.0.0.0".parse::<Ipv4Prefix>().is_err());
        assert!("10.0.0.0/33".parse::<Ipv4Prefix>().is_err());
        assert!("10.0.0.1/24".parse::<Ipv4Prefix>().is_err(), "host bits set");
        assert!("fd00::/64".parse::<Ipv4Prefix>().is_err());
        assert!("not-a-prefix/8".parse::<Ipv4Prefix>().is_err());
    }

    #[test]
    fn test_prefix_display() {
        let prefix: Ipv4Prefix = " 10.1.0.0/16 ".parse().unwrap();
        assert_eq!(prefix.to_string(), "10.1.0.0/16");
        assert_eq!(prefix.len(), 16);
    }

    #[test]
    fn test_interface_address_parse() {
        let addr: InterfaceAddress = "10.0.0.9/32".parse().unwrap();
        assert_eq!(addr, InterfaceAddress::host(Ipv4Addr::new(10, 0, 0, 9)));

        let bare: InterfaceAddress = "127.0.0.1".parse().unwrap();
        assert_eq!(bare.prefix_len, 32);

        let loopback: InterfaceAddress = "127.0.0.1/8".parse().unwrap();
        assert_eq!(loopback.prefix_len, 8);
        assert_eq!(loopback.to_string(), "127.0.0.1/8");

        assert!("127.0.0.1/40".parse::<InterfaceAddress>().is_err());
        assert!("::1/128".parse::<InterfaceAddress>().is_err());
    }
}
