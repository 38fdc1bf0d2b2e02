use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::ReplicationController;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, ApiResource, DynamicObject, ListParams};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;

use crate::crd::Dependency;
use crate::owner::OwnerKind;

/// Read access to the cluster needed by the mutation path
///
/// Every call is a single round trip; failures are returned as-is and never
/// retried here.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Lists metadata of every `kind` object across all namespaces matching `label_selector`
    async fn list_owners(
        &self,
        kind: OwnerKind,
        label_selector: &str,
    ) -> kube::Result<Vec<ObjectMeta>>;

    /// Lists the `Dependency` resources of `namespace`, first page only
    ///
    /// Items are returned undecoded so that one malformed resource does not
    /// fail the whole listing.
    async fn list_dependencies(&self, namespace: &str) -> kube::Result<Vec<DynamicObject>>;
}

#[async_trait]
impl ClusterApi for Client {
    async fn list_owners(
        &self,
        kind: OwnerKind,
        label_selector: &str,
    ) -> kube::Result<Vec<ObjectMeta>> {
        let params = ListParams::default().labels(label_selector);

        match kind {
            OwnerKind::ReplicaSet => list_metadata::<ReplicaSet>(self, &params).await,
            OwnerKind::StatefulSet => list_metadata::<StatefulSet>(self, &params).await,
            OwnerKind::DaemonSet => list_metadata::<DaemonSet>(self, &params).await,
            OwnerKind::Deployment => list_metadata::<Deployment>(self, &params).await,
            OwnerKind::Job => list_metadata::<Job>(self, &params).await,
            OwnerKind::CronJob => list_metadata::<CronJob>(self, &params).await,
            OwnerKind::ReplicationController => {
                list_metadata::<ReplicationController>(self, &params).await
            }
        }
    }

    async fn list_dependencies(&self, namespace: &str) -> kube::Result<Vec<DynamicObject>> {
        let resource = ApiResource::erase::<Dependency>(&());
        let api = Api::<DynamicObject>::namespaced_with(self.clone(), namespace, &resource);
        Ok(api.list(&ListParams::default()).await?.items)
    }
}

async fn list_metadata<K>(client: &Client, params: &ListParams) -> kube::Result<Vec<ObjectMeta>>
where
    K: Resource + Clone + DeserializeOwned + Debug,
    K::DynamicType: Default,
{
    let api = Api::<K>::all(client.clone());
    let list = api.list_metadata(params).await?;

    Ok(list.items.into_iter().map(|obj| obj.metadata).collect())
}
