//! Reconciliation logic for LoadBalancer service addresses.
//!
//! Each pass reads the cluster fresh, works out which addresses this node
//! should answer for and converges the managed interface towards that set.
//! Nothing is cached between passes, so a pass is safe to run any number of
//! times and a failed mutation is simply retried by the next one.

use crate::cluster::ClusterStateProvider;
use crate::error::ControllerError;
use crate::model::LoadBalancerService;
use crate::reconcile_helpers::{ingress_needs_update, owned_addresses, stale_addresses};
use crate::selector::SelectorMatch;
use ifaddr_client::{AddressBackend, InterfaceAddress, Ipv4Prefix};
use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Prefix length used when binding a service address
const HOST_PREFIX_LEN: u8 = 32;

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Addresses wanted by selected services
    pub candidates: BTreeSet<Ipv4Addr>,
    /// Addresses bound during this pass
    pub added: Vec<Ipv4Addr>,
    /// Addresses unbound during this pass
    pub removed: Vec<InterfaceAddress>,
    /// Individual operations that failed
    pub failures: usize,
    /// Services whose ingress status was patched
    pub status_patches: usize,
    /// Garbage collection did not run because the interface could not be read
    pub gc_skipped: bool,
}

/// Converges interface addresses with the cluster's LoadBalancer services.
pub struct Reconciler {
    cluster: Arc<dyn ClusterStateProvider>,
    backend: Arc<dyn AddressBackend>,
    prefix: Ipv4Prefix,
    interface: String,
    selector_match: SelectorMatch,
    status_patch: bool,
    debug: bool,
}

impl Reconciler {
    /// Creates a reconciler managing `interface`, owning addresses inside `prefix`.
    pub fn new(
        cluster: Arc<dyn ClusterStateProvider>,
        backend: Arc<dyn AddressBackend>,
        prefix: Ipv4Prefix,
        interface: impl Into<String>,
    ) -> Self {
        Self {
            cluster,
            backend,
            prefix,
            interface: interface.into(),
            selector_match: SelectorMatch::default(),
            status_patch: true,
            debug: false,
        }
    }

    /// Sets how service selectors are matched against pod labels.
    #[must_use]
    pub fn with_selector_match(mut self, selector_match: SelectorMatch) -> Self {
        self.selector_match = selector_match;
        self
    }

    /// Enables or disables ingress status write-back.
    #[must_use]
    pub fn with_status_patch(mut self, enabled: bool) -> Self {
        self.status_patch = enabled;
        self
    }

    /// Enables pass timing logs.
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Runs one reconciliation pass.
    ///
    /// Fails only when the cluster cannot be read, in which case nothing on
    /// the interface is touched. Failures of individual address or status
    /// operations are logged and counted in the report.
    pub async fn reconcile(&self) -> Result<ReconcileReport, ControllerError> {
        let started = Instant::now();
        let result = self.reconcile_pass().await;
        if self.debug {
            info!("Reconciliation took {:?}", started.elapsed());
        }
        result
    }

    async fn reconcile_pass(&self) -> Result<ReconcileReport, ControllerError> {
        let pods = self.cluster.list_local_ready_pods().await?;
        let services = self.cluster.list_load_balancer_services().await?;
        debug!(
            "Found {} local ready pods and {} LoadBalancer services",
            pods.len(),
            services.len()
        );

        let selected: Vec<&LoadBalancerService> = services
            .iter()
            .filter(|svc| self.selector_match.selects(svc, &pods))
            .collect();

        let mut candidates = BTreeSet::new();
        for svc in &selected {
            let desired = svc.desired_addresses();
            if desired.is_empty() {
                debug!("Service {} is backed locally but has no IPv4 address", svc);
            }
            for address in &desired {
                if !self.prefix.contains(*address) {
                    warn!(
                        "Service {} address {} is outside {} and will never be collected",
                        svc, address, self.prefix
                    );
                }
            }
            candidates.extend(desired);
        }

        let mut report = ReconcileReport::default();

        if self.status_patch {
            for svc in &selected {
                self.patch_ingress(svc, &mut report).await;
            }
        }

        for address in &candidates {
            match self
                .backend
                .ensure_present(&self.interface, *address, HOST_PREFIX_LEN)
                .await
            {
                Ok(true) => report.added.push(*address),
                Ok(false) => {}
                Err(e) => {
                    error!("Failed to bind {} on {}: {}", address, self.interface, e);
                    report.failures += 1;
                }
            }
        }

        let assigned = match self.backend.query_assigned(&self.interface).await {
            Ok(assigned) => assigned,
            Err(e) => {
                error!("Failed to read addresses of {}, skipping cleanup: {}", self.interface, e);
                report.failures += 1;
                report.gc_skipped = true;
                report.candidates = candidates;
                return Ok(report);
            }
        };

        let owned = owned_addresses(&assigned, &self.prefix);
        for stale in stale_addresses(&owned, &candidates) {
            match self
                .backend
                .ensure_absent(&self.interface, stale.address, stale.prefix_len)
                .await
            {
                Ok(true) => report.removed.push(stale),
                Ok(false) => {}
                Err(e) => {
                    error!("Failed to unbind {} from {}: {}", stale, self.interface, e);
                    report.failures += 1;
                }
            }
        }

        report.candidates = candidates;
        if !report.added.is_empty() || !report.removed.is_empty() || report.failures > 0 {
            info!(
                "Reconciled {}: {} added, {} removed, {} failures",
                self.interface,
                report.added.len(),
                report.removed.len(),
                report.failures
            );
        }
        Ok(report)
    }

    /// Best-effort ingress write-back; never fails the pass.
    async fn patch_ingress(&self, svc: &LoadBalancerService, report: &mut ReconcileReport) {
        let desired = svc.desired_addresses();
        if desired.is_empty() || !ingress_needs_update(&svc.ingress, &desired) {
            return;
        }

        match self.cluster.patch_service_status(svc, &desired).await {
            Ok(()) => {
                debug!("Patched ingress of {} to {:?}", svc, desired);
                report.status_patches += 1;
            }
            Err(e) => {
                warn!("Failed to patch ingress status of {}: {}", svc, e);
                report.failures += 1;
            }
        }
    }
}
