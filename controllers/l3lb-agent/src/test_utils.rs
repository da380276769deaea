//! Test utilities for unit testing the agent
//!
//! This module provides an in-memory cluster and helpers for creating test
//! pods and services.

use crate::cluster::{ClusterStateProvider, WatchStream};
use crate::error::ControllerError;
use crate::model::{
    AddressSource, LoadBalancerService, LocalPod, PodPhase, ResourceKind, WatchEvent,
};
use futures::StreamExt;
use futures::stream;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

/// Helper to create a running, ready pod on the test node
pub fn create_test_pod(name: &str, labels: &[(&str, &str)]) -> LocalPod {
    LocalPod {
        name: name.to_string(),
        namespace: "default".to_string(),
        node_name: Some("node-a".to_string()),
        labels: labels
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect(),
        phase: PodPhase::Running,
        container_ready: vec![true],
        terminating: false,
    }
}

/// Helper to create a LoadBalancer service.
///
/// `load_balancer_ip` wins over `external_ips` when both are given.
pub fn create_test_service(
    name: &str,
    selector: &[(&str, &str)],
    load_balancer_ip: Option<&str>,
    external_ips: &[&str],
) -> LoadBalancerService {
    let address = match load_balancer_ip {
        Some(ip) => Some(AddressSource::SingleIp(ip.parse().unwrap())),
        None if !external_ips.is_empty() => Some(AddressSource::IpList(
            external_ips.iter().map(|ip| ip.parse().unwrap()).collect(),
        )),
        None => None,
    };
    LoadBalancerService {
        name: name.to_string(),
        namespace: "default".to_string(),
        selector: selector
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect::<BTreeMap<_, _>>(),
        address,
        ingress: Vec::new(),
    }
}

/// One scripted watch connection
pub enum WatchScript {
    /// Connecting fails with this message
    Refuse(String),
    /// Connecting succeeds and the stream yields these items, then ends
    Stream(Vec<Result<WatchEvent, ControllerError>>),
}

/// In-memory cluster for testing
///
/// Pods and services are returned as configured; status patches update the
/// stored service ingress. Watch connections follow per-kind scripts and
/// hang forever once a script is exhausted.
#[derive(Clone, Default)]
pub struct MockClusterState {
    pods: Arc<Mutex<Vec<LocalPod>>>,
    services: Arc<Mutex<Vec<LoadBalancerService>>>,
    patches: Arc<Mutex<Vec<(String, Vec<Ipv4Addr>)>>>,
    fail_patches: Arc<Mutex<bool>>,
    fail_listing: Arc<Mutex<bool>>,
    watch_scripts: Arc<Mutex<HashMap<ResourceKind, VecDeque<WatchScript>>>>,
    watch_attempts: Arc<Mutex<HashMap<ResourceKind, usize>>>,
}

impl MockClusterState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pod(&self, pod: LocalPod) {
        self.pods.lock().unwrap().push(pod);
    }

    pub fn clear_pods(&self) {
        self.pods.lock().unwrap().clear();
    }

    pub fn add_service(&self, service: LoadBalancerService) {
        self.services.lock().unwrap().push(service);
    }

    pub fn service(&self, name: &str) -> Option<LoadBalancerService> {
        self.services
            .lock()
            .unwrap()
            .iter()
            .find(|svc| svc.name == name)
            .cloned()
    }

    /// Status patches made so far as (`namespace/name`, ingress)
    pub fn patches(&self) -> Vec<(String, Vec<Ipv4Addr>)> {
        self.patches.lock().unwrap().clone()
    }

    pub fn fail_patches(&self, fail: bool) {
        *self.fail_patches.lock().unwrap() = fail;
    }

    pub fn fail_listing(&self, fail: bool) {
        *self.fail_listing.lock().unwrap() = fail;
    }

    pub fn script_watch(&self, kind: ResourceKind, script: WatchScript) {
        self.watch_scripts
            .lock()
            .unwrap()
            .entry(kind)
            .or_default()
            .push_back(script);
    }

    pub fn watch_attempts(&self, kind: ResourceKind) -> usize {
        self.watch_attempts
            .lock()
            .unwrap()
            .get(&kind)
            .copied()
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl ClusterStateProvider for MockClusterState {
    async fn list_local_ready_pods(&self) -> Result<Vec<LocalPod>, ControllerError> {
        if *self.fail_listing.lock().unwrap() {
            return Err(ControllerError::Watch("connection refused".to_string()));
        }
        Ok(self
            .pods
            .lock()
            .unwrap()
            .iter()
            .filter(|pod| pod.is_eligible())
            .cloned()
            .collect())
    }

    async fn list_load_balancer_services(
        &self,
    ) -> Result<Vec<LoadBalancerService>, ControllerError> {
        if *self.fail_listing.lock().unwrap() {
            return Err(ControllerError::Watch("connection refused".to_string()));
        }
        Ok(self.services.lock().unwrap().clone())
    }

    async fn patch_service_status(
        &self,
        service: &LoadBalancerService,
        ingress: &[Ipv4Addr],
    ) -> Result<(), ControllerError> {
        if *self.fail_patches.lock().unwrap() {
            return Err(ControllerError::Watch("status patch rejected".to_string()));
        }
        self.patches
            .lock()
            .unwrap()
            .push((service.to_string(), ingress.to_vec()));
        if let Some(stored) = self
            .services
            .lock()
            .unwrap()
            .iter_mut()
            .find(|svc| svc.name == service.name && svc.namespace == service.namespace)
        {
            stored.ingress = ingress.iter().map(ToString::to_string).collect();
        }
        Ok(())
    }

    async fn watch(&self, kind: ResourceKind) -> Result<WatchStream, ControllerError> {
        *self.watch_attempts.lock().unwrap().entry(kind).or_default() += 1;
        let script = self
            .watch_scripts
            .lock()
            .unwrap()
            .get_mut(&kind)
            .and_then(VecDeque::pop_front);
        match script {
            Some(WatchScript::Refuse(message)) => Err(ControllerError::Watch(message)),
            Some(WatchScript::Stream(items)) => Ok(stream::iter(items).boxed()),
            None => Ok(stream::pending().boxed()),
        }
    }
}
