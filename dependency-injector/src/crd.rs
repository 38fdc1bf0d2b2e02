//! The `Dependency` custom resource
//!
//! A `Dependency` declares which services an application has to wait for
//! before its pods may start:
//!
//! ```yaml
//! apiVersion: example.dependency-injector/v1
//! kind: Dependency
//! metadata:
//!   name: checkout
//!   namespace: shop
//! spec:
//!   selector:
//!     app: checkout
//!   depends_on:
//!     - payments
//!     - inventory
//! ```

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// API group shared by the custom resource and the webhook configuration
pub const GROUP: &str = "example.dependency-injector";

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[kube(
    group = "example.dependency-injector",
    version = "v1",
    kind = "Dependency",
    plural = "dependencies",
    shortname = "dep",
    namespaced
)]
pub struct DependencySpec {
    /// Pods this resource applies to
    pub selector: DependencySelector,
    /// Services the selected application waits for, in order
    pub depends_on: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct DependencySelector {
    /// Value of the pod's `app` label
    pub app: String,
}

impl Dependency {
    /// Whether this resource selects pods of `app_name`
    pub fn selects(&self, app_name: &str) -> bool {
        self.spec.selector.app == app_name
    }
}
