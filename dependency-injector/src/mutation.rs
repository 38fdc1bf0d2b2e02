//! Init-container injection for pods with declared dependencies
//!
//! Each pod admission event runs through:
//!
//! 1. gating on `sidecar.dependency_manager=true` and the `app` label
//! 2. namespace resolution, through the owner when the pod has none
//! 3. `Dependency` lookup for the pod's application
//! 4. init-container synthesis and patch composition
//!
//! Steps 2 and 3 fail the request. Step 4 fails open: the error is logged and
//! the pod is admitted without the init container.

use std::sync::Arc;

use async_trait::async_trait;
use json_patch::Patch;
use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, Operation};
use tracing::{debug, info, warn};

use crate::admission::MutatingAdmissionHandler;
use crate::cluster::ClusterApi;
use crate::context::Context;
use crate::matcher::find_dependencies;
use crate::owner::resolve_namespace;
use crate::patch::MutationPatch;
use crate::pod::{MANAGED_LABEL, PodAdmissionContext};
use crate::template::InitContainerSynthesizer;
use crate::{Error, Result};

/// How a single pod admission event ended
#[derive(Debug)]
pub enum MutationOutcome {
    /// Not a CREATE/UPDATE of a pod carrying the gating label
    NotApplicable,
    /// Gated pod without an `app` label
    MissingAppLabel,
    /// No `Dependency` selects the pod's application
    NoDependency,
    /// Injection failed and was skipped
    Skipped(Error),
    Patched(MutationPatch),
}

/// Mutating webhook injecting the dependency init container
pub struct DependencyInjector<C = kube::Client> {
    context: Arc<Context<C>>,
    synthesizer: InitContainerSynthesizer,
}

impl<C> DependencyInjector<C>
where
    C: ClusterApi,
{
    pub fn new(context: impl Into<Context<C>>) -> Self {
        let context = Arc::new(context.into());
        let synthesizer = InitContainerSynthesizer::new(
            context.config.init_template.clone(),
            context.config.http_code.clone(),
        );

        Self {
            context,
            synthesizer,
        }
    }

    /// Decides what to do with `pod`
    ///
    /// Errors returned here reject the pod; an unusable `Dependency`, synthesis
    /// and patch failures are reported as [`MutationOutcome::Skipped`] instead.
    pub async fn plan(&self, pod: &PodAdmissionContext) -> Result<MutationOutcome> {
        if !matches!(pod.operation, Operation::Create | Operation::Update) {
            debug!(pod = %pod.name, operation = ?pod.operation, "operation not mutated, skipping");
            return Ok(MutationOutcome::NotApplicable);
        }
        if !pod.is_managed() {
            debug!(pod = %pod.name, "pod is not labeled {MANAGED_LABEL}=true, skipping");
            return Ok(MutationOutcome::NotApplicable);
        }

        let Some(app_name) = pod.app_name() else {
            info!(pod = %pod.name, "expected label 'app' not found in pod labels");
            return Ok(MutationOutcome::MissingAppLabel);
        };

        let namespace = match &pod.namespace {
            Some(namespace) => namespace.clone(),
            None => {
                debug!(pod = %pod.name, "no namespace in pod metadata, resolving through owner");
                resolve_namespace(&self.context.cluster, &pod.owner_references, app_name).await?
            }
        };

        info!(app = app_name, namespace = %namespace, "processing application");

        let found = find_dependencies(&self.context.cluster, app_name, &namespace).await;
        let depends_on = match found {
            Ok(Some(depends_on)) => depends_on,
            Ok(None) => return Ok(MutationOutcome::NoDependency),
            Err(err) if err.is_fail_open() => return Ok(MutationOutcome::Skipped(err)),
            Err(err) => return Err(err),
        };

        match self.compose(pod, &depends_on).await {
            Ok(patch) => Ok(MutationOutcome::Patched(patch)),
            Err(err) if err.is_fail_open() => Ok(MutationOutcome::Skipped(err)),
            Err(err) => Err(err),
        }
    }

    async fn compose(
        &self,
        pod: &PodAdmissionContext,
        depends_on: &[String],
    ) -> Result<MutationPatch> {
        let container = self.synthesizer.synthesize(depends_on).await?;
        MutationPatch::build(pod.init_containers.as_deref(), &container)
    }
}

#[async_trait]
impl<C> MutatingAdmissionHandler for DependencyInjector<C>
where
    C: ClusterApi + 'static,
{
    fn name(&self) -> &'static str {
        "DependencyInjector"
    }

    async fn mutate(&self, req: &AdmissionRequest<DynamicObject>) -> Result<AdmissionResponse> {
        let res = AdmissionResponse::from(req);
        let Some(pod) = PodAdmissionContext::from_request(req) else {
            return Ok(res);
        };

        let patch = match self.plan(&pod).await? {
            MutationOutcome::Patched(patch) => patch,
            MutationOutcome::Skipped(err) => {
                warn!(pod = %pod.name, error = %err, "init container injection skipped");
                return Ok(res);
            }
            _ => return Ok(res),
        };

        info!(
            pod = %pod.name,
            init_containers = patch.init_containers.len(),
            "patching init containers"
        );
        Ok(attach_patch(res, patch.to_json_patch(), &pod.name))
    }
}

/// Attaches `json_patch` to `res`, admitting the pod unmodified when it cannot be used
fn attach_patch(
    res: AdmissionResponse,
    json_patch: Result<Patch>,
    pod: &str,
) -> AdmissionResponse {
    let patched = json_patch.and_then(|json_patch| {
        res.clone()
            .with_patch(json_patch)
            .map_err(|e| Error::Patch(format!("failed to serialize patch: {e}")))
    });

    match patched {
        Ok(patched) => patched,
        Err(err) => {
            warn!(pod, error = %err, "init container injection skipped");
            res
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::cluster::testing::FakeCluster;
    use crate::config::Config;
    use crate::owner::OwnerKind;
    use kube::core::admission::AdmissionReview;
    use serde_json::{Value, json};

    fn injector(cluster: FakeCluster) -> DependencyInjector<FakeCluster> {
        DependencyInjector::new((cluster, Config::default()))
    }

    fn pod_request(
        operation: &str,
        namespace: Option<&str>,
        labels: Value,
        init_containers: Option<Value>,
    ) -> AdmissionRequest<DynamicObject> {
        let mut metadata = json!({
            "generateName": "checkout-7d9f8-",
            "labels": labels,
            "ownerReferences": [{
                "apiVersion": "apps/v1",
                "kind": "ReplicaSet",
                "name": "checkout-7d9f8",
                "uid": "rs-uid"
            }]
        });
        if let Some(namespace) = namespace {
            metadata["namespace"] = json!(namespace);
        }

        let mut spec = json!({ "containers": [{ "name": "app", "image": "shop/checkout:1.0" }] });
        if let Some(init_containers) = init_containers {
            spec["initContainers"] = init_containers;
        }

        let review_json = json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": "test-uid",
                "kind": {"group": "", "version": "v1", "kind": "Pod"},
                "resource": {"group": "", "version": "v1", "resource": "pods"},
                "operation": operation,
                "userInfo": {},
                "object": {
                    "apiVersion": "v1",
                    "kind": "Pod",
                    "metadata": metadata,
                    "spec": spec
                }
            }
        });

        let review: AdmissionReview<DynamicObject> = serde_json::from_value(review_json).unwrap();
        review.try_into().unwrap()
    }

    fn managed_labels() -> Value {
        json!({ "app": "checkout", "sidecar.dependency_manager": "true" })
    }

    fn patch_ops(res: &AdmissionResponse) -> Value {
        serde_json::from_slice(res.patch.as_ref().expect("response should carry a patch")).unwrap()
    }

    fn depends_on_env(container: &Value) -> &Value {
        container["env"]
            .as_array()
            .unwrap()
            .iter()
            .find(|var| var["name"] == "DEPENDS_ON")
            .map(|var| &var["value"])
            .unwrap()
    }

    #[tokio::test]
    async fn test_injects_comma_joined_dependencies() {
        let cluster = FakeCluster::default()
            .with_dependency("shop", "checkout", &["payments", "inventory"])
            .with_dependency("shop", "checkout", &["ignored"]);
        let req = pod_request("CREATE", Some("shop"), managed_labels(), None);

        let res = injector(cluster).mutate(&req).await.unwrap();

        assert!(res.allowed);
        let ops = patch_ops(&res);
        assert_eq!(ops[0]["path"], "/spec/initContainers");
        let injected = &ops[0]["value"][0];
        assert_eq!(injected["name"], "dependency-manager-init");
        assert_eq!(depends_on_env(injected), "payments,inventory");
    }

    #[tokio::test]
    async fn test_appends_after_existing_init_containers() {
        let cluster = FakeCluster::default().with_dependency("shop", "checkout", &["payments"]);
        let existing = json!([
            { "name": "migrate", "image": "shop/migrate:1.2" },
            { "name": "warm-cache", "image": "shop/cache:0.4" }
        ]);
        let req = pod_request("UPDATE", Some("shop"), managed_labels(), Some(existing.clone()));

        let res = injector(cluster).mutate(&req).await.unwrap();

        let value = &patch_ops(&res)[0]["value"];
        assert_eq!(value.as_array().unwrap().len(), 3);
        assert_eq!(value[0], existing[0]);
        assert_eq!(value[1], existing[1]);
        assert_eq!(value[2]["name"], "dependency-manager-init");
    }

    #[tokio::test]
    async fn test_no_dependency_is_a_no_op() {
        let cluster = FakeCluster::default().with_dependency("shop", "frontend", &["checkout"]);
        let req = pod_request("CREATE", Some("shop"), managed_labels(), None);

        let res = injector(cluster).mutate(&req).await.unwrap();

        assert!(res.allowed);
        assert!(res.patch.is_none());
    }

    #[tokio::test]
    async fn test_unlabeled_pod_never_reaches_cluster() {
        let injector = injector(FakeCluster::default().with_dependency("shop", "checkout", &["a"]));
        let req = pod_request("CREATE", None, json!({ "app": "checkout" }), None);

        let res = injector.mutate(&req).await.unwrap();

        assert!(res.allowed);
        assert!(res.patch.is_none());
        assert_eq!(injector.context.cluster.calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_app_label_is_not_an_error() {
        let injector = injector(FakeCluster::default());
        let req = pod_request(
            "CREATE",
            Some("shop"),
            json!({ "sidecar.dependency_manager": "true" }),
            None,
        );

        let pod = PodAdmissionContext::from_request(&req).unwrap();
        let outcome = injector.plan(&pod).await.unwrap();

        assert!(matches!(outcome, MutationOutcome::MissingAppLabel));
        assert_eq!(injector.context.cluster.calls(), 0);
    }

    #[tokio::test]
    async fn test_resolves_namespace_through_owner() {
        let cluster = FakeCluster::default()
            .with_owner(OwnerKind::ReplicaSet, "rs-uid", "shop")
            .with_dependency("shop", "checkout", &["payments"]);
        let req = pod_request("CREATE", None, managed_labels(), None);

        let res = injector(cluster).mutate(&req).await.unwrap();

        let ops = patch_ops(&res);
        assert_eq!(depends_on_env(&ops[0]["value"][0]), "payments");
    }

    #[tokio::test]
    async fn test_unresolvable_namespace_rejects() {
        let cluster = FakeCluster::default()
            .with_owner(OwnerKind::ReplicaSet, "other-uid", "shop")
            .with_dependency("shop", "checkout", &["payments"]);
        let req = pod_request("CREATE", None, managed_labels(), None);

        let err = injector(cluster).mutate(&req).await.unwrap_err();

        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(err.code(), 499);
    }

    #[tokio::test]
    async fn test_template_failure_fails_open() {
        let cluster = FakeCluster::default().with_dependency("shop", "checkout", &["payments"]);
        let config = Config {
            init_template: Some(PathBuf::from("/nonexistent/init-dependency.yaml")),
            ..Config::default()
        };
        let injector = DependencyInjector::new((cluster, config));
        let req = pod_request("CREATE", Some("shop"), managed_labels(), None);

        let pod = PodAdmissionContext::from_request(&req).unwrap();
        assert!(matches!(
            injector.plan(&pod).await.unwrap(),
            MutationOutcome::Skipped(Error::Template(_))
        ));

        let res = injector.mutate(&req).await.unwrap();
        assert!(res.allowed);
        assert!(res.patch.is_none());
    }

    #[tokio::test]
    async fn test_malformed_dependency_fails_open() {
        let cluster = FakeCluster::default().with_raw_dependency(
            "shop",
            json!({ "selector": { "app": "checkout" }, "depends_on": [1, 2] }),
        );
        let injector = injector(cluster);
        let req = pod_request("CREATE", Some("shop"), managed_labels(), None);

        let pod = PodAdmissionContext::from_request(&req).unwrap();
        assert!(matches!(
            injector.plan(&pod).await.unwrap(),
            MutationOutcome::Skipped(Error::InvalidDependency { .. })
        ));

        let res = injector.mutate(&req).await.unwrap();
        assert!(res.allowed);
        assert!(res.patch.is_none());
    }

    #[test]
    fn test_unusable_patch_admits_unmodified() {
        let req = pod_request("CREATE", Some("shop"), managed_labels(), None);
        let res = AdmissionResponse::from(&req);

        let res = attach_patch(res, Err(Error::Patch("invalid patch path".into())), "checkout");

        assert!(res.allowed);
        assert!(res.patch.is_none());
    }

    #[tokio::test]
    async fn test_ignores_delete() {
        let injector = injector(FakeCluster::default().with_dependency("shop", "checkout", &["a"]));
        let req = pod_request("DELETE", Some("shop"), managed_labels(), None);

        let pod = PodAdmissionContext::from_request(&req).unwrap();
        assert!(matches!(
            injector.plan(&pod).await.unwrap(),
            MutationOutcome::NotApplicable
        ));
        let res = injector.mutate(&req).await.unwrap();

        assert!(res.allowed);
        assert_eq!(injector.context.cluster.calls(), 0);
    }
}
