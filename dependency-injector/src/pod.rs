use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;
use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, Operation};
use serde_json::Value;

/// Label opting a pod into dependency injection
pub const MANAGED_LABEL: &str = "sidecar.dependency_manager";

/// Label carrying the application identity matched against `Dependency` selectors
pub const APP_LABEL: &str = "app";

/// The parts of a pod admission request the mutation path looks at
#[derive(Debug, Clone)]
pub struct PodAdmissionContext {
    pub name: String,
    pub operation: Operation,
    /// Namespace from the pod's own metadata, absent for some controller-created pods
    pub namespace: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub owner_references: Vec<OwnerReference>,
    /// `spec.initContainers` exactly as submitted
    pub init_containers: Option<Vec<Value>>,
}

impl PodAdmissionContext {
    /// Extracts the pod from `req`, `None` when the request carries no object
    pub fn from_request(req: &AdmissionRequest<DynamicObject>) -> Option<Self> {
        let obj = req.object.as_ref()?;

        let init_containers = obj
            .data
            .get("spec")
            .and_then(|spec| spec.get("initContainers"))
            .and_then(Value::as_array)
            .cloned();

        Some(Self {
            name: obj.name_any(),
            operation: req.operation.clone(),
            namespace: obj.metadata.namespace.clone().filter(|ns| !ns.is_empty()),
            labels: obj.labels().clone(),
            owner_references: obj.owner_references().to_vec(),
            init_containers,
        })
    }

    /// Whether the pod opted in with `sidecar.dependency_manager=true`
    pub fn is_managed(&self) -> bool {
        self.labels.get(MANAGED_LABEL).map(String::as_str) == Some("true")
    }

    pub fn app_name(&self) -> Option<&str> {
        self.labels.get(APP_LABEL).map(String::as_str)
    }
}
