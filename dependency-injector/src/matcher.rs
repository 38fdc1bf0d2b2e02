use kube::ResourceExt;
use kube::api::DynamicObject;
use serde_json::Value;
use tracing::{info, warn};

use crate::cluster::ClusterApi;
use crate::crd::Dependency;
use crate::{Error, Result};

/// Value of `spec.selector.app` on an undecoded resource
fn selected_app(obj: &DynamicObject) -> Option<&str> {
    obj.data.pointer("/spec/selector/app").and_then(Value::as_str)
}

/// Returns the first resource in listing order that selects `app_name`
///
/// Resources that fail to decode are skipped, unless their selector names
/// `app_name`, in which case the match itself is unusable and
/// [`Error::InvalidDependency`] is returned.
pub fn first_match(objects: Vec<DynamicObject>, app_name: &str) -> Result<Option<Dependency>> {
    for obj in objects {
        let name = obj.name_any();
        let selects_app = selected_app(&obj) == Some(app_name);

        match obj.try_parse::<Dependency>() {
            Ok(dep) if dep.selects(app_name) => return Ok(Some(dep)),
            Ok(_) => {}
            Err(err) if selects_app => {
                return Err(Error::InvalidDependency {
                    name,
                    reason: err.to_string(),
                });
            }
            Err(err) => warn!(dependency = %name, error = %err, "skipping malformed Dependency"),
        }
    }

    Ok(None)
}

/// Finds the dependency list declared for `app_name` in `namespace`
///
/// `Ok(None)` means no resource selects the application, which is the normal
/// case for most pods. Only the first page of the listing is scanned.
pub async fn find_dependencies<C>(
    cluster: &C,
    app_name: &str,
    namespace: &str,
) -> Result<Option<Vec<String>>>
where
    C: ClusterApi + ?Sized,
{
    let objects = cluster.list_dependencies(namespace).await?;

    match first_match(objects, app_name)? {
        Some(dep) => {
            info!(
                dependency = ?dep.metadata.name,
                app = app_name,
                namespace,
                "found Dependency matching the pod selector"
            );
            Ok(Some(dep.spec.depends_on))
        }
        None => {
            info!(app = app_name, namespace, "no dependencies found for this application");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::testing::FakeCluster;
    use serde_json::json;

    #[tokio::test]
    async fn test_first_match_in_listing_order_wins() {
        let cluster = FakeCluster::default()
            .with_dependency("shop", "frontend", &["checkout"])
            .with_dependency("shop", "checkout", &["payments", "inventory"])
            .with_dependency("shop", "checkout", &["legacy-payments"]);

        let deps = find_dependencies(&cluster, "checkout", "shop").await.unwrap();

        assert_eq!(deps, Some(vec!["payments".into(), "inventory".into()]));
    }

    #[tokio::test]
    async fn test_no_match_is_not_an_error() {
        let cluster = FakeCluster::default().with_dependency("shop", "frontend", &["checkout"]);

        let deps = find_dependencies(&cluster, "checkout", "shop").await.unwrap();

        assert_eq!(deps, None);
    }

    #[tokio::test]
    async fn test_only_lists_requested_namespace() {
        let cluster = FakeCluster::default().with_dependency("staging", "checkout", &["payments"]);

        let deps = find_dependencies(&cluster, "checkout", "shop").await.unwrap();

        assert_eq!(deps, None);
    }

    #[tokio::test]
    async fn test_selector_match_is_exact() {
        let cluster = FakeCluster::default().with_dependency("shop", "Checkout", &["payments"]);

        let deps = find_dependencies(&cluster, "checkout", "shop").await.unwrap();

        assert_eq!(deps, None);
    }

    #[tokio::test]
    async fn test_malformed_resource_does_not_hide_valid_match() {
        let cluster = FakeCluster::default()
            .with_raw_dependency(
                "shop",
                json!({ "selector": { "app": "frontend" }, "depends_on": [1, 2] }),
            )
            .with_raw_dependency("shop", json!({ "selector": "frontend" }))
            .with_dependency("shop", "checkout", &["payments"]);

        let deps = find_dependencies(&cluster, "checkout", "shop").await.unwrap();

        assert_eq!(deps, Some(vec!["payments".into()]));
    }

    #[tokio::test]
    async fn test_malformed_match_fails_open() {
        let cluster = FakeCluster::default()
            .with_raw_dependency(
                "shop",
                json!({ "selector": { "app": "checkout" }, "depends_on": [1, 2] }),
            )
            .with_dependency("shop", "checkout", &["payments"]);

        let err = find_dependencies(&cluster, "checkout", "shop").await.unwrap_err();

        assert!(matches!(&err, Error::InvalidDependency { name, .. } if name == "dependency-0"));
        assert!(err.is_fail_open());
    }

    #[tokio::test]
    async fn test_listing_failure_propagates() {
        let cluster = FakeCluster {
            fail_dependencies: true,
            ..Default::default()
        };

        let err = find_dependencies(&cluster, "checkout", "shop").await.unwrap_err();

        assert!(matches!(err, Error::KubeError(_)));
    }
}
