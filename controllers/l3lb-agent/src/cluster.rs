//! Cluster state access.
//!
//! `ClusterStateProvider` is the seam between the agent and the Kubernetes
//! API. `KubeClusterState` is the production implementation; tests use the
//! in-memory provider from `test_utils`.

use crate::error::ControllerError;
use crate::model::{
    AddressSourcePreference, LoadBalancerService, LocalPod, PodPhase, ResourceKind, WatchEvent,
    WatchEventType,
};
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt, future};
use k8s_openapi::api::core::v1::{
    Endpoints, LoadBalancerIngress, LoadBalancerStatus, Pod, Service, ServiceStatus,
};
use kube::api::{ListParams, Patch, PatchParams, WatchEvent as KubeWatchEvent, WatchParams};
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::net::Ipv4Addr;
use tracing::{debug, warn};

/// Server-side watch timeout; the stream ends cleanly afterwards and is reopened
const WATCH_TIMEOUT_SECS: u32 = 290;

/// Stream of watch events for one resource kind
pub type WatchStream = BoxStream<'static, Result<WatchEvent, ControllerError>>;

/// Read/write access to the cluster objects the agent depends on.
#[async_trait::async_trait]
pub trait ClusterStateProvider: Send + Sync {
    /// Pods on this node that are running, ready and not terminating
    async fn list_local_ready_pods(&self) -> Result<Vec<LocalPod>, ControllerError>;

    /// Every Service of type LoadBalancer
    async fn list_load_balancer_services(&self)
    -> Result<Vec<LoadBalancerService>, ControllerError>;

    /// Record `ingress` as the service's load balancer ingress
    async fn patch_service_status(
        &self,
        service: &LoadBalancerService,
        ingress: &[Ipv4Addr],
    ) -> Result<(), ControllerError>;

    /// Open a watch on the given resource kind
    async fn watch(&self, kind: ResourceKind) -> Result<WatchStream, ControllerError>;
}

/// Kubernetes-backed cluster state.
#[derive(Clone)]
pub struct KubeClusterState {
    client: Client,
    node_name: String,
    address_source: AddressSourcePreference,
}

impl std::fmt::Debug for KubeClusterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClusterState")
            .field("node_name", &self.node_name)
            .field("address_source", &self.address_source)
            .finish_non_exhaustive()
    }
}

impl KubeClusterState {
    /// Creates a provider scoped to `node_name`.
    pub fn new(client: Client, node_name: String, address_source: AddressSourcePreference) -> Self {
        Self {
            client,
            node_name,
            address_source,
        }
    }

    /// Connects using in-cluster service account credentials or the local kubeconfig.
    pub async fn connect(
        in_cluster: bool,
        node_name: String,
        address_source: AddressSourcePreference,
    ) -> Result<Self, ControllerError> {
        let config = if in_cluster {
            kube::Config::incluster()
                .map_err(|e| ControllerError::KubeConfig(format!("in-cluster config: {e}")))?
        } else {
            kube::Config::from_kubeconfig(&kube::config::KubeConfigOptions::default())
                .await
                .map_err(|e| ControllerError::KubeConfig(format!("kubeconfig: {e}")))?
        };
        let client = Client::try_from(config)?;
        Ok(Self::new(client, node_name, address_source))
    }
}

#[async_trait::async_trait]
impl ClusterStateProvider for KubeClusterState {
    async fn list_local_ready_pods(&self) -> Result<Vec<LocalPod>, ControllerError> {
        let api: Api<Pod> = Api::all(self.client.clone());
        let params = ListParams::default().fields(&format!("spec.nodeName={}", self.node_name));
        let pods = api.list(&params).await?;

        Ok(pods
            .items
            .iter()
            .map(local_pod_from)
            .filter(LocalPod::is_eligible)
            .collect())
    }

    async fn list_load_balancer_services(
        &self,
    ) -> Result<Vec<LoadBalancerService>, ControllerError> {
        let api: Api<Service> = Api::all(self.client.clone());
        let services = api.list(&ListParams::default()).await?;

        Ok(services
            .items
            .iter()
            .filter(|svc| {
                svc.spec.as_ref().and_then(|spec| spec.type_.as_deref()) == Some("LoadBalancer")
            })
            .map(|svc| load_balancer_service_from(svc, self.address_source))
            .collect())
    }

    async fn patch_service_status(
        &self,
        service: &LoadBalancerService,
        ingress: &[Ipv4Addr],
    ) -> Result<(), ControllerError> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), &service.namespace);
        let status = ServiceStatus {
            load_balancer: Some(LoadBalancerStatus {
                ingress: Some(
                    ingress
                        .iter()
                        .map(|ip| LoadBalancerIngress {
                            ip: Some(ip.to_string()),
                            ..Default::default()
                        })
                        .collect(),
                ),
                ..Default::default()
            }),
            ..Default::default()
        };
        let status_patch = serde_json::json!({ "status": status });

        api.patch_status(&service.name, &PatchParams::default(), &Patch::Merge(&status_patch))
            .await?;
        Ok(())
    }

    async fn watch(&self, kind: ResourceKind) -> Result<WatchStream, ControllerError> {
        match kind {
            ResourceKind::Service => {
                open_watch::<Service>(Api::all(self.client.clone()), kind).await
            }
            ResourceKind::Endpoints => {
                open_watch::<Endpoints>(Api::all(self.client.clone()), kind).await
            }
        }
    }
}

/// List to obtain a resource version, then watch from it so existing objects
/// are not replayed as `Added` events.
async fn open_watch<K>(api: Api<K>, kind: ResourceKind) -> Result<WatchStream, ControllerError>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + 'static,
{
    let list = api.list_metadata(&ListParams::default().limit(1)).await?;
    let version = list.metadata.resource_version.unwrap_or_else(|| "0".to_string());
    debug!("Opening {} watch at resourceVersion {}", kind, version);

    let stream = api
        .watch(&WatchParams::default().timeout(WATCH_TIMEOUT_SECS), &version)
        .await?;

    Ok(stream
        .map_err(ControllerError::from)
        .try_filter_map(move |event| future::ready(convert_watch_event(kind, event)))
        .boxed())
}

fn convert_watch_event<K>(
    kind: ResourceKind,
    event: KubeWatchEvent<K>,
) -> Result<Option<WatchEvent>, ControllerError>
where
    K: Resource,
{
    let (event_type, object) = match event {
        KubeWatchEvent::Added(obj) => (WatchEventType::Added, obj),
        KubeWatchEvent::Modified(obj) => (WatchEventType::Modified, obj),
        KubeWatchEvent::Deleted(obj) => (WatchEventType::Deleted, obj),
        KubeWatchEvent::Bookmark(_) => return Ok(None),
        KubeWatchEvent::Error(err) => {
            return Err(ControllerError::Watch(format!(
                "{kind} watch returned an API error: {err:?}"
            )));
        }
    };
    let name = format!(
        "{}/{}",
        object.namespace().unwrap_or_default(),
        object.name_any()
    );
    Ok(Some(WatchEvent::new(kind, event_type, name)))
}

/// Convert an API pod into the agent's view.
pub fn local_pod_from(pod: &Pod) -> LocalPod {
    let status = pod.status.as_ref();
    LocalPod {
        name: pod.name_any(),
        namespace: pod.namespace().unwrap_or_else(|| "default".to_string()),
        node_name: pod.spec.as_ref().and_then(|spec| spec.node_name.clone()),
        labels: pod.labels().clone(),
        phase: PodPhase::from_api(status.and_then(|s| s.phase.as_deref())),
        container_ready: status
            .and_then(|s| s.container_statuses.as_ref())
            .map(|statuses| statuses.iter().map(|c| c.ready).collect())
            .unwrap_or_default(),
        terminating: pod.metadata.deletion_timestamp.is_some(),
    }
}

/// Convert an API service into the agent's view.
pub fn load_balancer_service_from(
    svc: &Service,
    preference: AddressSourcePreference,
) -> LoadBalancerService {
    let spec = svc.spec.as_ref();
    let (address, rejected) = preference.resolve(
        spec.and_then(|s| s.load_balancer_ip.as_deref()),
        spec.and_then(|s| s.external_ips.as_deref()).unwrap_or_default(),
    );

    let namespace = svc.namespace().unwrap_or_else(|| "default".to_string());
    let name = svc.name_any();
    for raw in rejected {
        warn!("Service {}/{}: ignoring non-IPv4 address '{}'", namespace, name, raw);
    }

    LoadBalancerService {
        selector: spec.and_then(|s| s.selector.clone()).unwrap_or_default(),
        address,
        ingress: svc
            .status
            .as_ref()
            .and_then(|s| s.load_balancer.as_ref())
            .and_then(|lb| lb.ingress.as_ref())
            .map(|ingress| ingress.iter().filter_map(|i| i.ip.clone()).collect())
            .unwrap_or_default(),
        name,
        namespace,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{ContainerStatus, PodSpec, PodStatus, ServiceSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    fn api_pod(phase: &str, ready: &[bool]) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some("web-0".to_string()),
                namespace: Some("shop".to_string()),
                labels: Some(BTreeMap::from([("app".to_string(), "web".to_string())])),
                ..Default::default()
            },
            spec: Some(PodSpec {
                node_name: Some("node-a".to_string()),
                ..Default::default()
            }),
            status: Some(PodStatus {
                phase: Some(phase.to_string()),
                container_statuses: Some(
                    ready
                        .iter()
                        .map(|r| ContainerStatus {
                            ready: *r,
                            ..Default::default()
                        })
                        .collect(),
                ),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn test_local_pod_from_api() {
        let pod = local_pod_from(&api_pod("Running", &[true, true]));
        assert_eq!(pod.name, "web-0");
        assert_eq!(pod.namespace, "shop");
        assert_eq!(pod.node_name.as_deref(), Some("node-a"));
        assert_eq!(pod.labels.get("app").map(String::as_str), Some("web"));
        assert_eq!(pod.phase, PodPhase::Running);
        assert!(pod.is_eligible());

        let unready = local_pod_from(&api_pod("Running", &[true, false]));
        assert!(!unready.is_eligible());
    }

    #[test]
    fn test_load_balancer_service_from_api() {
        let svc = Service {
            metadata: ObjectMeta {
                name: Some("web".to_string()),
                namespace: Some("shop".to_string()),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                type_: Some("LoadBalancer".to_string()),
                selector: Some(BTreeMap::from([("app".to_string(), "web".to_string())])),
                external_ips: Some(vec!["10.0.0.5".to_string(), "fd00::5".to_string()]),
                ..Default::default()
            }),
            status: Some(ServiceStatus {
                load_balancer: Some(LoadBalancerStatus {
                    ingress: Some(vec![LoadBalancerIngress {
                        ip: Some("10.0.0.4".to_string()),
                        ..Default::default()
                    }]),
                    ..Default::default()
                }),
                ..Default::default()
            }),
        };

        let converted = load_balancer_service_from(&svc, AddressSourcePreference::Auto);
        assert_eq!(converted.to_string(), "shop/web");
        assert_eq!(converted.desired_addresses(), vec![Ipv4Addr::new(10, 0, 0, 5)]);
        assert_eq!(converted.ingress, vec!["10.0.0.4".to_string()]);
        assert_eq!(converted.selector.len(), 1);
    }

    #[test]
    fn test_convert_watch_events() {
        let svc = Service {
            metadata: ObjectMeta {
                name: Some("web".to_string()),
                namespace: Some("shop".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        let modified = KubeWatchEvent::Modified(svc.clone());
        let event = convert_watch_event(ResourceKind::Service, modified)
            .unwrap()
            .unwrap();
        assert_eq!(event.kind, ResourceKind::Service);
        assert_eq!(event.event_type, WatchEventType::Modified);
        assert_eq!(event.name, "shop/web");

        let deleted = convert_watch_event(ResourceKind::Endpoints, KubeWatchEvent::Deleted(svc))
            .unwrap()
            .unwrap();
        assert_eq!(deleted.event_type, WatchEventType::Deleted);
    }
}
