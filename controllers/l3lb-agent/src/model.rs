//! Cluster data model as seen by the agent.
//!
//! These are transient snapshots read fresh from the cluster on every
//! reconciliation; nothing here is cached or mutated locally.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Pod lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodPhase {
    /// Accepted but not all containers are running
    Pending,
    /// Bound to a node and all containers created
    Running,
    /// All containers terminated successfully
    Succeeded,
    /// All containers terminated, at least one failed
    Failed,
    /// State could not be obtained
    Unknown,
}

impl PodPhase {
    /// Parse the API phase string; anything unrecognised is `Unknown`
    #[must_use]
    pub fn from_api(phase: Option<&str>) -> Self {
        match phase {
            Some("Pending") => Self::Pending,
            Some("Running") => Self::Running,
            Some("Succeeded") => Self::Succeeded,
            Some("Failed") => Self::Failed,
            _ => Self::Unknown,
        }
    }
}

/// A pod scheduled on this node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalPod {
    /// Pod name
    pub name: String,
    /// Pod namespace
    pub namespace: String,
    /// Node hosting the pod
    pub node_name: Option<String>,
    /// Pod labels
    pub labels: BTreeMap<String, String>,
    /// Lifecycle phase
    pub phase: PodPhase,
    /// Readiness of each container
    pub container_ready: Vec<bool>,
    /// Deletion timestamp is set
    pub terminating: bool,
}

impl LocalPod {
    /// Running, every container ready and not being deleted.
    ///
    /// A pod reporting no container statuses counts as all-ready.
    #[must_use]
    pub fn is_eligible(&self) -> bool {
        self.phase == PodPhase::Running
            && self.container_ready.iter().all(|ready| *ready)
            && !self.terminating
    }
}

/// Where a service's desired address comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressSource {
    /// `spec.loadBalancerIP`
    SingleIp(Ipv4Addr),
    /// `spec.externalIPs`
    IpList(Vec<Ipv4Addr>),
}

impl AddressSource {
    /// Addresses this node must bind when the service is selected
    #[must_use]
    pub fn addresses(&self) -> Vec<Ipv4Addr> {
        match self {
            Self::SingleIp(ip) => vec![*ip],
            Self::IpList(ips) => ips.clone(),
        }
    }
}

/// Which service field the agent reads desired addresses from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressSourcePreference {
    /// `loadBalancerIP` when set, otherwise `externalIPs`
    #[default]
    Auto,
    /// Only `loadBalancerIP`
    LoadBalancerIp,
    /// Only `externalIPs`
    ExternalIps,
}

impl AddressSourcePreference {
    /// Resolve the address source from raw service fields.
    ///
    /// Entries that are not IPv4 addresses are returned in `rejected` so the
    /// caller can report them.
    #[must_use]
    pub fn resolve(
        self,
        load_balancer_ip: Option<&str>,
        external_ips: &[String],
    ) -> (Option<AddressSource>, Vec<String>) {
        let mut rejected = Vec::new();

        let single = || {
            load_balancer_ip.and_then(|raw| match raw.parse::<Ipv4Addr>() {
                Ok(ip) => Some(AddressSource::SingleIp(ip)),
                Err(_) => None,
            })
        };
        let list = |rejected: &mut Vec<String>| {
            let ips: Vec<Ipv4Addr> = external_ips
                .iter()
                .filter_map(|raw| match raw.parse::<Ipv4Addr>() {
                    Ok(ip) => Some(ip),
                    Err(_) => {
                        rejected.push(raw.clone());
                        None
                    }
                })
                .collect();
            (!ips.is_empty()).then_some(AddressSource::IpList(ips))
        };
        let reject_single = |rejected: &mut Vec<String>| {
            if let Some(raw) = load_balancer_ip {
                if raw.parse::<Ipv4Addr>().is_err() {
                    rejected.push(raw.to_string());
                }
            }
        };

        let source = match self {
            Self::Auto => {
                reject_single(&mut rejected);
                match single() {
                    Some(source) => Some(source),
                    None => list(&mut rejected),
                }
            }
            Self::LoadBalancerIp => {
                reject_single(&mut rejected);
                single()
            }
            Self::ExternalIps => list(&mut rejected),
        };
        (source, rejected)
    }
}

impl FromStr for AddressSourcePreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "load-balancer-ip" | "loadbalancerip" => Ok(Self::LoadBalancerIp),
            "external-ips" | "externalips" => Ok(Self::ExternalIps),
            other => Err(format!(
                "unknown address source '{other}' (expected auto, load-balancer-ip or external-ips)"
            )),
        }
    }
}

/// A Service of type LoadBalancer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadBalancerService {
    /// Service name
    pub name: String,
    /// Service namespace
    pub namespace: String,
    /// Label selector
    pub selector: BTreeMap<String, String>,
    /// Desired address, `None` when the service carries no usable IPv4 address
    pub address: Option<AddressSource>,
    /// Ingress addresses currently recorded in status
    pub ingress: Vec<String>,
}

impl LoadBalancerService {
    /// Desired addresses, empty when no address is configured
    #[must_use]
    pub fn desired_addresses(&self) -> Vec<Ipv4Addr> {
        self.address
            .as_ref()
            .map(AddressSource::addresses)
            .unwrap_or_default()
    }
}

impl fmt::Display for LoadBalancerService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Kind of watched resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// core/v1 Service
    Service,
    /// core/v1 Endpoints
    Endpoints,
}

impl ResourceKind {
    /// Whether an event of this type should trigger reconciliation.
    ///
    /// A new LoadBalancer service has no ready endpoints yet, so its
    /// creation is covered by the Endpoints event that follows.
    #[must_use]
    pub fn forwards(self, event_type: WatchEventType) -> bool {
        match self {
            Self::Service => event_type == WatchEventType::Modified,
            Self::Endpoints => {
                matches!(event_type, WatchEventType::Modified | WatchEventType::Deleted)
            }
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Service => f.write_str("Service"),
            Self::Endpoints => f.write_str("Endpoints"),
        }
    }
}

/// Watch event type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventType {
    /// Object created
    Added,
    /// Object changed
    Modified,
    /// Object removed
    Deleted,
}

/// A single observed change on a watched resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    /// Resource kind
    pub kind: ResourceKind,
    /// Event type
    pub event_type: WatchEventType,
    /// `namespace/name` of the subject
    pub name: String,
    /// When the agent observed the event
    pub observed_at: DateTime<Utc>,
}

impl WatchEvent {
    /// Create an event observed now
    pub fn new(kind: ResourceKind, event_type: WatchEventType, name: impl Into<String>) -> Self {
        Self {
            kind,
            event_type,
            name: name.into(),
            observed_at: Utc::now(),
        }
    }
}
