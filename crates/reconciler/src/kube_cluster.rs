//! Kubernetes-backed cluster reader and actuator.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing::{debug, info, warn};

use crate::cluster::{
    ClusterStateReader, ConvergenceActuator, RESTARTED_AT_ANNOTATION, label_selector,
};
use crate::error::{Error, Result};
use crate::types::ObservedDigests;

/// Cluster access through the Kubernetes API.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
    timeout: Duration,
}

impl KubeCluster {
    /// Wrap an existing client.
    #[must_use]
    pub const fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Build a client from a kubeconfig file, or infer one (in-cluster
    /// service account, then the default kubeconfig) when `kubeconfig` is
    /// `None`.
    ///
    /// # Errors
    ///
    /// Returns a transport error when the configuration cannot be loaded or
    /// the client cannot be built.
    pub async fn connect(kubeconfig: Option<&Path>, timeout: Duration) -> Result<Self> {
        let mut config = match kubeconfig {
            Some(path) => {
                let kubeconfig = Kubeconfig::read_from(path)
                    .map_err(|e| Error::transport("kubeconfig", e.to_string()))?;
                Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await
                    .map_err(|e| Error::transport("kubeconfig", e.to_string()))?
            }
            None => Config::infer()
                .await
                .map_err(|e| Error::transport("kubeconfig", e.to_string()))?,
        };
        config.connect_timeout = Some(timeout);
        config.read_timeout = Some(timeout);
        config.write_timeout = Some(timeout);

        let cluster_url = config.cluster_url.to_string();
        let client =
            Client::try_from(config).map_err(|e| Error::transport(&cluster_url, e.to_string()))?;
        info!(cluster = %cluster_url, "Kubernetes client ready");

        Ok(Self::new(client, timeout))
    }

    fn deployments(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn bounded<T, F>(&self, operation: String, call: F) -> Result<std::result::Result<T, kube::Error>>
    where
        F: Future<Output = std::result::Result<T, kube::Error>> + Send,
    {
        let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| Error::timeout(operation, timeout_ms))
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment> {
        let api = self.deployments(namespace);
        self.bounded(format!("get deployment {namespace}/{name}"), api.get(name))
            .await?
            .map_err(|e| match api_code(&e) {
                Some(404) => Error::deployment_not_found(namespace, name),
                _ => Error::transport(format!("deployment {namespace}/{name}"), e.to_string()),
            })
    }
}

#[async_trait]
impl ClusterStateReader for KubeCluster {
    async fn observed_digests(&self, namespace: &str, deployment: &str) -> Result<ObservedDigests> {
        let object = self.get_deployment(namespace, deployment).await?;
        let match_labels = object
            .spec
            .as_ref()
            .and_then(|spec| spec.selector.match_labels.clone())
            .unwrap_or_default();
        let selector = label_selector(&match_labels)
            .ok_or_else(|| Error::empty_selector(namespace, deployment))?;

        let api = self.pods(namespace);
        let params = ListParams::default().labels(&selector);
        let pods = self
            .bounded(format!("list pods {namespace}/{selector}"), api.list(&params))
            .await
            .map_err(|e| Error::pod_list_failed(namespace, &selector, e.to_string()))?
            .map_err(|e| Error::pod_list_failed(namespace, &selector, e.to_string()))?;

        let mut observed = ObservedDigests::new();
        let mut skipped = 0usize;
        for pod in &pods.items {
            if !is_live(pod) {
                skipped = skipped.saturating_add(1);
                debug!(
                    namespace,
                    deployment,
                    pod = pod.metadata.name.as_deref().unwrap_or_default(),
                    "Skipping finished or terminating pod"
                );
                continue;
            }
            observed.record_pod();
            let statuses = pod
                .status
                .as_ref()
                .and_then(|status| status.container_statuses.as_deref())
                .unwrap_or_default();
            for status in statuses {
                if !observed.record_image_id(&status.image_id) {
                    warn!(
                        namespace,
                        deployment,
                        pod = pod.metadata.name.as_deref().unwrap_or_default(),
                        container = %status.name,
                        image_id = %status.image_id,
                        "Dropping container image reference without digest"
                    );
                }
            }
        }

        debug!(
            namespace,
            deployment,
            selector = %selector,
            pods = observed.pods,
            skipped,
            digests = observed.digests.len(),
            dropped = observed.dropped,
            "Observed running digests"
        );
        Ok(observed)
    }
}

#[async_trait]
impl ConvergenceActuator for KubeCluster {
    async fn restart(&self, namespace: &str, deployment: &str) -> Result<()> {
        let mut object = self.get_deployment(namespace, deployment).await?;
        stamp_restart(&mut object, &Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));

        // The fetched resourceVersion travels with the object, so a concurrent
        // writer makes the API server answer 409 instead of overwriting.
        let api = self.deployments(namespace);
        let params = PostParams::default();
        self.bounded(
            format!("update deployment {namespace}/{deployment}"),
            api.replace(deployment, &params, &object),
        )
        .await?
        .map_err(|e| match api_code(&e) {
            Some(409) => Error::conflict(namespace, deployment),
            Some(404) => Error::deployment_not_found(namespace, deployment),
            _ => Error::update_failed(namespace, deployment, e.to_string()),
        })?;

        info!(namespace, deployment, "Deployment restarted");
        Ok(())
    }
}

/// Set the restart annotation on the pod template.
fn stamp_restart(deployment: &mut Deployment, timestamp: &str) {
    let template = &mut deployment.spec.get_or_insert_with(Default::default).template;
    template
        .metadata
        .get_or_insert_with(Default::default)
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(RESTARTED_AT_ANNOTATION.to_string(), timestamp.to_string());
}

/// Pods in a terminal phase (`Failed`, e.g. evicted, or `Succeeded`) and pods
/// marked for deletion keep reporting their last image; they are not observed.
fn is_live(pod: &Pod) -> bool {
    if pod.metadata.deletion_timestamp.is_some() {
        return false;
    }
    let phase = pod.status.as_ref().and_then(|status| status.phase.as_deref());
    !matches!(phase, Some("Failed" | "Succeeded"))
}

fn api_code(error: &kube::Error) -> Option<u16> {
    match error {
        kube::Error::Api(response) => Some(response.code),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use driftwatch_core::Digest;
    use k8s_openapi::api::apps::v1::DeploymentSpec;
    use k8s_openapi::api::core::v1::PodTemplateSpec;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use serde_json::{Value, json};
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    use super::*;
    use crate::error::ErrorKind;
    use crate::evaluator::evaluate;
    use crate::types::{DriftVerdict, IndeterminateReason};

    type TestResult<T = ()> = std::result::Result<T, Box<dyn std::error::Error>>;

    const DEPLOYMENT_PATH: &str = "/apis/apps/v1/namespaces/default/deployments/api";
    const PODS_PATH: &str = "/api/v1/namespaces/default/pods";

    fn cluster(server: &MockServer, timeout: Duration) -> TestResult<KubeCluster> {
        let config = Config::new(server.uri().parse()?);
        let client = Client::try_from(config)?;
        Ok(KubeCluster::new(client, timeout))
    }

    fn deployment_json(selector: Value) -> Value {
        json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": { "name": "api", "namespace": "default", "resourceVersion": "42" },
            "spec": {
                "selector": selector,
                "template": { "metadata": { "labels": { "app": "api" } } }
            }
        })
    }

    fn pod_json(name: &str, phase: &str, image_ids: &[&str]) -> Value {
        let statuses: Vec<Value> = image_ids
            .iter()
            .map(|image_id| {
                json!({
                    "name": "api",
                    "image": "ghcr.io/acme/api:prod",
                    "imageID": image_id,
                    "ready": true,
                    "restartCount": 0
                })
            })
            .collect();
        json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": { "name": name, "namespace": "default" },
            "status": { "phase": phase, "containerStatuses": statuses }
        })
    }

    fn with_field(mut value: Value, pointer: &str, key: &str, field: Value) -> Value {
        if let Some(object) = value.pointer_mut(pointer).and_then(Value::as_object_mut) {
            object.insert(key.to_string(), field);
        }
        value
    }

    fn status_json(code: u16, reason: &str) -> Value {
        json!({
            "apiVersion": "v1",
            "kind": "Status",
            "metadata": {},
            "status": "Failure",
            "message": format!("deployments.apps \"api\": {reason}"),
            "reason": reason,
            "code": code
        })
    }

    async fn mount_deployment(server: &MockServer, deployment: Value) {
        Mock::given(method("GET"))
            .and(path(DEPLOYMENT_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(deployment))
            .mount(server)
            .await;
    }

    async fn mount_pods(server: &MockServer, selector: &str, pods: Vec<Value>) {
        Mock::given(method("GET"))
            .and(path(PODS_PATH))
            .and(query_param("labelSelector", selector))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "apiVersion": "v1",
                "kind": "PodList",
                "metadata": { "resourceVersion": "7" },
                "items": pods
            })))
            .expect(1)
            .mount(server)
            .await;
    }

    fn has_restart_annotation(request: &Request) -> bool {
        serde_json::from_slice::<Value>(&request.body)
            .ok()
            .and_then(|body| {
                body.pointer("/spec/template/metadata/annotations/kubectl.kubernetes.io~1restartedAt")
                    .cloned()
            })
            .is_some()
    }

    fn restart_annotation(deployment: &Deployment) -> Option<String> {
        deployment
            .spec
            .as_ref()
            .and_then(|spec| spec.template.metadata.as_ref())
            .and_then(|meta| meta.annotations.as_ref())
            .and_then(|annotations| annotations.get(RESTARTED_AT_ANNOTATION).cloned())
    }

    #[test]
    fn test_stamp_restart_creates_annotations() {
        let mut deployment = Deployment::default();
        stamp_restart(&mut deployment, "2026-10-19T12:00:00Z");
        assert_eq!(
            restart_annotation(&deployment),
            Some("2026-10-19T12:00:00Z".to_string())
        );
    }

    #[test]
    fn test_stamp_restart_keeps_existing_annotations() {
        let mut deployment = Deployment {
            spec: Some(DeploymentSpec {
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        annotations: Some(BTreeMap::from([
                            ("team".to_string(), "payments".to_string()),
                            (
                                RESTARTED_AT_ANNOTATION.to_string(),
                                "2026-01-01T00:00:00Z".to_string(),
                            ),
                        ])),
                        ..ObjectMeta::default()
                    }),
                    spec: None,
                },
                ..DeploymentSpec::default()
            }),
            ..Deployment::default()
        };

        stamp_restart(&mut deployment, "2026-10-19T12:00:00Z");

        let annotations = deployment
            .spec
            .as_ref()
            .and_then(|spec| spec.template.metadata.as_ref())
            .and_then(|meta| meta.annotations.clone())
            .unwrap_or_default();
        assert_eq!(annotations.get("team").map(String::as_str), Some("payments"));
        assert_eq!(
            annotations.get(RESTARTED_AT_ANNOTATION).map(String::as_str),
            Some("2026-10-19T12:00:00Z")
        );
    }

    #[test]
    fn test_terminal_and_terminating_pods_are_not_live() -> TestResult {
        let running: Pod = serde_json::from_value(pod_json("a", "Running", &[]))?;
        let pending: Pod = serde_json::from_value(pod_json("b", "Pending", &[]))?;
        let evicted: Pod = serde_json::from_value(pod_json("c", "Failed", &[]))?;
        let completed: Pod = serde_json::from_value(pod_json("d", "Succeeded", &[]))?;
        let mut terminating: Pod = serde_json::from_value(pod_json("e", "Running", &[]))?;
        terminating.metadata.deletion_timestamp = serde_json::from_value(json!("2026-10-19T12:00:00Z"))?;

        assert!(is_live(&running));
        assert!(is_live(&pending));
        assert!(!is_live(&evicted));
        assert!(!is_live(&completed));
        assert!(!is_live(&terminating));
        Ok(())
    }

    #[tokio::test]
    async fn test_evicted_pod_does_not_cause_drift() -> TestResult {
        let server = MockServer::start().await;
        mount_deployment(&server, deployment_json(json!({ "matchLabels": { "app": "api" } }))).await;

        let evicted = with_field(
            pod_json("api-old", "Failed", &["ghcr.io/acme/api@sha256:OLD"]),
            "/status",
            "reason",
            json!("Evicted"),
        );
        let terminating = with_field(
            pod_json("api-going", "Running", &["ghcr.io/acme/api@sha256:OLD"]),
            "/metadata",
            "deletionTimestamp",
            json!("2026-10-19T12:00:00Z"),
        );
        mount_pods(
            &server,
            "app=api",
            vec![
                pod_json("api-new", "Running", &["ghcr.io/acme/api@sha256:NEW"]),
                evicted,
                terminating,
            ],
        )
        .await;

        let observed = cluster(&server, Duration::from_secs(5))?
            .observed_digests("default", "api")
            .await?;

        assert_eq!(observed.pods, 1);
        assert_eq!(observed.digests.len(), 1);
        let resolved = Digest::new("sha256:NEW")?;
        assert_eq!(evaluate(&resolved, &observed), DriftVerdict::Converged);
        Ok(())
    }

    #[tokio::test]
    async fn test_selector_joins_all_match_labels() -> TestResult {
        let server = MockServer::start().await;
        mount_deployment(
            &server,
            deployment_json(json!({ "matchLabels": { "tier": "web", "app": "api" } })),
        )
        .await;
        mount_pods(
            &server,
            "app=api,tier=web",
            vec![pod_json("api-1", "Running", &["ghcr.io/acme/api@sha256:AAA"])],
        )
        .await;

        let observed = cluster(&server, Duration::from_secs(5))?
            .observed_digests("default", "api")
            .await?;

        assert_eq!(observed.containers, 1);
        assert!(observed.digests.contains(&Digest::new("sha256:AAA")?));
        Ok(())
    }

    #[tokio::test]
    async fn test_pods_without_statuses_observe_nothing() -> TestResult {
        let server = MockServer::start().await;
        mount_deployment(&server, deployment_json(json!({ "matchLabels": { "app": "api" } }))).await;
        mount_pods(&server, "app=api", vec![pod_json("api-1", "Pending", &[])]).await;

        let observed = cluster(&server, Duration::from_secs(5))?
            .observed_digests("default", "api")
            .await?;

        let resolved = Digest::new("sha256:AAA")?;
        assert_eq!(
            evaluate(&resolved, &observed),
            DriftVerdict::Indeterminate(IndeterminateReason::NoRunningContainers)
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_deployment_is_not_found() -> TestResult {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(DEPLOYMENT_PATH))
            .respond_with(ResponseTemplate::new(404).set_body_json(status_json(404, "NotFound")))
            .mount(&server)
            .await;

        let result = cluster(&server, Duration::from_secs(5))?
            .observed_digests("default", "api")
            .await;

        assert!(matches!(result, Err(Error::DeploymentNotFound { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_selector_is_refused() -> TestResult {
        let server = MockServer::start().await;
        mount_deployment(&server, deployment_json(json!({}))).await;
        Mock::given(method("GET"))
            .and(path(PODS_PATH))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let result = cluster(&server, Duration::from_secs(5))?
            .observed_digests("default", "api")
            .await;

        assert_eq!(result.err().map(|e| e.kind()), Some(ErrorKind::Configuration));
        Ok(())
    }

    #[tokio::test]
    async fn test_restart_replaces_with_fetched_resource_version() -> TestResult {
        let server = MockServer::start().await;
        let deployment = deployment_json(json!({ "matchLabels": { "app": "api" } }));
        mount_deployment(&server, deployment.clone()).await;
        Mock::given(method("PUT"))
            .and(path(DEPLOYMENT_PATH))
            .and(body_partial_json(json!({ "metadata": { "resourceVersion": "42" } })))
            .and(has_restart_annotation)
            .respond_with(ResponseTemplate::new(200).set_body_json(deployment))
            .expect(1)
            .mount(&server)
            .await;

        cluster(&server, Duration::from_secs(5))?
            .restart("default", "api")
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_restart_conflict_is_reported() -> TestResult {
        let server = MockServer::start().await;
        mount_deployment(&server, deployment_json(json!({ "matchLabels": { "app": "api" } }))).await;
        Mock::given(method("PUT"))
            .and(path(DEPLOYMENT_PATH))
            .respond_with(ResponseTemplate::new(409).set_body_json(status_json(409, "Conflict")))
            .mount(&server)
            .await;

        let result = cluster(&server, Duration::from_secs(5))?
            .restart("default", "api")
            .await;

        assert!(matches!(
            result,
            Err(Error::Conflict { ref namespace, ref name }) if namespace == "default" && name == "api"
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_slow_api_times_out() -> TestResult {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(DEPLOYMENT_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(deployment_json(json!({ "matchLabels": { "app": "api" } })))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let result = cluster(&server, Duration::from_millis(200))?
            .observed_digests("default", "api")
            .await;

        let err = result.err();
        assert!(matches!(err, Some(Error::Timeout { timeout_ms: 200, .. })));
        assert_eq!(err.map(|e| e.kind()), Some(ErrorKind::Transport));
        Ok(())
    }
}
