//! Agent configuration.
//!
//! All settings come from `L3LB_*` environment variables. Parsing is built on
//! a lookup function so it can be tested without touching the process
//! environment.

use crate::error::ControllerError;
use crate::model::AddressSourcePreference;
use crate::selector::SelectorMatch;
use ifaddr_client::Ipv4Prefix;
use std::env;
use std::time::Duration;

/// Default managed interface
pub const DEFAULT_INTERFACE: &str = "lo";
/// Default watch reconnect backoff in milliseconds
pub const DEFAULT_WATCH_BACKOFF_MS: u64 = 1000;
/// Default periodic resync interval in seconds
pub const DEFAULT_RESYNC_SECONDS: u64 = 30;

/// Runtime configuration of the agent.
#[derive(Debug, Clone)]
pub struct Config {
    /// Addresses inside this prefix are owned (added and collected) by the agent
    pub prefix: Ipv4Prefix,
    /// Interface that receives the addresses
    pub interface: String,
    /// Verbose timing/diagnostic logging
    pub debug: bool,
    /// Use in-cluster service account credentials instead of a kubeconfig
    pub in_cluster: bool,
    /// Node whose pods count as local
    pub node_name: String,
    /// Selector matching mode
    pub selector_match: SelectorMatch,
    /// Which service field supplies the desired address
    pub address_source: AddressSourcePreference,
    /// Fixed delay before a failed watch reconnects
    pub watch_backoff: Duration,
    /// Periodic resync interval, `None` when disabled
    pub resync_interval: Option<Duration>,
    /// Write desired addresses back into service ingress status
    pub status_patch: bool,
    /// Path of the iproute2 `ip` binary
    pub ip_binary: String,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// The node name falls back to `/etc/hostname` when no variable names it.
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| {
            env::var(key).ok().or_else(|| {
                if key == "HOSTNAME" {
                    std::fs::read_to_string("/etc/hostname").ok()
                } else {
                    None
                }
            })
        })
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let prefix = get("L3LB_PREFIX")
            .ok_or_else(|| {
                ControllerError::InvalidConfig(
                    "L3LB_PREFIX environment variable is required".to_string(),
                )
            })?
            .parse::<Ipv4Prefix>()
            .map_err(|e| ControllerError::InvalidConfig(format!("L3LB_PREFIX: {e}")))?;

        let interface = get("L3LB_INTERFACE").unwrap_or_else(|| DEFAULT_INTERFACE.to_string());

        let node_name = get("L3LB_NODE_NAME")
            .or_else(|| get("NODE_NAME"))
            .or_else(|| get("HOSTNAME"))
            .ok_or_else(|| {
                ControllerError::InvalidConfig(
                    "unable to determine node name; set L3LB_NODE_NAME".to_string(),
                )
            })?;

        let selector_match = match get("L3LB_SELECTOR_MATCH") {
            Some(value) => value.parse::<SelectorMatch>().map_err(|e| {
                ControllerError::InvalidConfig(format!("L3LB_SELECTOR_MATCH: {e}"))
            })?,
            None => SelectorMatch::default(),
        };

        let address_source = match get("L3LB_ADDRESS_SOURCE") {
            Some(value) => value.parse::<AddressSourcePreference>().map_err(|e| {
                ControllerError::InvalidConfig(format!("L3LB_ADDRESS_SOURCE: {e}"))
            })?,
            None => AddressSourcePreference::default(),
        };

        let watch_backoff_ms = parse_number(
            get("L3LB_WATCH_BACKOFF_MS"),
            "L3LB_WATCH_BACKOFF_MS",
            DEFAULT_WATCH_BACKOFF_MS,
        )?;
        let resync_seconds = parse_number(
            get("L3LB_RESYNC_SECONDS"),
            "L3LB_RESYNC_SECONDS",
            DEFAULT_RESYNC_SECONDS,
        )?;

        Ok(Self {
            prefix,
            interface,
            debug: parse_flag(get("L3LB_DEBUG"), "L3LB_DEBUG", false)?,
            in_cluster: parse_flag(get("L3LB_IN_CLUSTER"), "L3LB_IN_CLUSTER", false)?,
            node_name,
            selector_match,
            address_source,
            watch_backoff: Duration::from_millis(watch_backoff_ms),
            resync_interval: (resync_seconds > 0).then(|| Duration::from_secs(resync_seconds)),
            status_patch: parse_flag(get("L3LB_STATUS_PATCH"), "L3LB_STATUS_PATCH", true)?,
            ip_binary: get("L3LB_IP_BINARY").unwrap_or_else(|| "ip".to_string()),
        })
    }
}

fn parse_flag(value: Option<String>, key: &str, default: bool) -> Result<bool, ControllerError> {
    let Some(value) = value else {
        return Ok(default);
    };
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ControllerError::InvalidConfig(format!(
            "{key}: expected a boolean, got '{other}'"
        ))),
    }
}

fn parse_number(value: Option<String>, key: &str, default: u64) -> Result<u64, ControllerError> {
    match value {
        Some(value) => value
            .parse::<u64>()
            .map_err(|e| ControllerError::InvalidConfig(format!("{key}: {e}"))),
        None => Ok(default),
    }
}
