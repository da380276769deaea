//! Service selector matching against local pods.

use crate::model::{LoadBalancerService, LocalPod};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::debug;

/// How a service selector is compared with pod labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectorMatch {
    /// At least one selector key carries the same non-empty value on the pod.
    ///
    /// `{app: x}` on a pod matches selector `{app: x, tier: y}`. Entries with
    /// an empty value never count as agreeing.
    #[default]
    AnyKey,
    /// Every selector key carries the same value on the pod (Kubernetes semantics)
    AllKeys,
}

impl SelectorMatch {
    /// Compare a selector with a pod's labels. An empty selector never matches.
    #[must_use]
    pub fn matches(
        self,
        selector: &BTreeMap<String, String>,
        labels: &BTreeMap<String, String>,
    ) -> bool {
        if selector.is_empty() {
            return false;
        }
        match self {
            Self::AnyKey => selector
                .iter()
                .any(|(key, value)| !value.is_empty() && labels.get(key) == Some(value)),
            Self::AllKeys => selector
                .iter()
                .all(|(key, value)| labels.get(key) == Some(value)),
        }
    }

    /// Whether any of the given pods backs the service
    #[must_use]
    pub fn selects(self, service: &LoadBalancerService, pods: &[LocalPod]) -> bool {
        match pods.iter().find(|pod| self.matches(&service.selector, &pod.labels)) {
            Some(pod) => {
                debug!("Pod {}/{} matches service {}", pod.namespace, pod.name, service);
                true
            }
            None => false,
        }
    }
}

impl FromStr for SelectorMatch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "any" | "any-key" => Ok(Self::AnyKey),
            "all" | "all-keys" => Ok(Self::AllKeys),
            other => Err(format!("unknown selector match '{other}' (expected any or all)")),
        }
    }
}
