//! Namespace resolution through a pod's owning controller
//!
//! Pods created from a controller's pod template can reach the webhook
//! without a namespace in their metadata. The owner reference still points at
//! the controller, so the namespace is recovered by listing that controller
//! kind across all namespaces and matching the owner's UID.
//!
//! Only the first owner reference is consulted.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use tracing::debug;

use crate::cluster::ClusterApi;
use crate::{Error, Result};

/// Controller kinds whose objects can be listed to resolve a pod's namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OwnerKind {
    ReplicaSet,
    StatefulSet,
    DaemonSet,
    Deployment,
    Job,
    CronJob,
    ReplicationController,
}

/// `(apiVersion, kind)` pairs that resolve to a typed list call
const OWNER_KINDS: &[(&str, &str, OwnerKind)] = &[
    ("apps/v1", "ReplicaSet", OwnerKind::ReplicaSet),
    ("apps/v1", "StatefulSet", OwnerKind::StatefulSet),
    ("apps/v1", "DaemonSet", OwnerKind::DaemonSet),
    ("apps/v1", "Deployment", OwnerKind::Deployment),
    ("batch/v1", "Job", OwnerKind::Job),
    ("batch/v1", "CronJob", OwnerKind::CronJob),
    ("v1", "ReplicationController", OwnerKind::ReplicationController),
];

impl OwnerKind {
    /// Looks up the owner kind declared for `api_version` and `kind`
    pub fn lookup(api_version: &str, kind: &str) -> Option<Self> {
        OWNER_KINDS
            .iter()
            .find(|(v, k, _)| *v == api_version && *k == kind)
            .map(|(_, _, owner)| *owner)
    }
}

/// Name of the client API object serving `api_version`, e.g. `apps/v1` -> `AppsV1Api`
pub fn api_object_name(api_version: &str) -> String {
    let mut name: String = api_version.split('/').map(capitalize).collect();
    name.push_str("Api");
    name
}

/// Snake-cased list target for `kind`, e.g. `ReplicaSet` -> `replica_set`
pub fn lookup_kind_name(kind: &str) -> String {
    match kind.strip_suffix("Set") {
        Some(base) => format!("{}_set", base.to_lowercase()),
        None => kind.to_lowercase(),
    }
}

fn capitalize(segment: &str) -> String {
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Resolves the namespace of a pod from its first owner reference
///
/// Owners are listed across all namespaces with the label selector
/// `app=<app_name>`, then matched by UID. Fails with [`Error::NotFound`] when
/// the pod has no owner, the owner kind is not mapped, or no listed object
/// carries the owner's UID.
pub async fn resolve_namespace<C>(
    cluster: &C,
    owner_references: &[OwnerReference],
    app_name: &str,
) -> Result<String>
where
    C: ClusterApi + ?Sized,
{
    let Some(owner) = owner_references.first() else {
        return Err(Error::NotFound("pod has no owner references".into()));
    };

    debug!(
        api = %api_object_name(&owner.api_version),
        kind = %lookup_kind_name(&owner.kind),
        uid = %owner.uid,
        "resolving namespace through owner"
    );

    let Some(kind) = OwnerKind::lookup(&owner.api_version, &owner.kind) else {
        return Err(Error::NotFound(format!(
            "unsupported owner kind {} ({})",
            owner.kind, owner.api_version
        )));
    };

    let label_selector = format!("app={app_name}");
    let candidates = cluster.list_owners(kind, &label_selector).await?;

    for meta in candidates {
        debug!(name = ?meta.name, uid = ?meta.uid, "checking owner candidate");
        if meta.uid.as_deref() == Some(owner.uid.as_str()) {
            return meta.namespace.ok_or_else(|| {
                Error::NotFound(format!("owner {} has no namespace", owner.name))
            });
        }
    }

    Err(Error::NotFound(format!(
        "no {} with uid {} labeled {label_selector}",
        owner.kind, owner.uid
    )))
}
