use json_patch::jsonptr::PointerBuf;
use json_patch::{AddOperation, Patch, PatchOperation};
use k8s_openapi::api::core::v1::Container;
use serde_json::Value;

use crate::{Error, Result};

const INIT_CONTAINERS_PATH: &str = "/spec/initContainers";

/// New value of a pod's `spec.initContainers`
///
/// Existing entries keep their position and content; the injected container is
/// always last. Building a patch twice for the same pod injects twice, there
/// is no de-duplication by name.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationPatch {
    pub init_containers: Vec<Value>,
}

impl MutationPatch {
    /// Appends `synthesized` to a copy of `existing`
    pub fn build(existing: Option<&[Value]>, synthesized: &Container) -> Result<Self> {
        let injected = serde_json::to_value(synthesized)
            .map_err(|e| Error::Patch(format!("failed to serialize init container: {e}")))?;

        let mut init_containers = existing.map(<[Value]>::to_vec).unwrap_or_default();
        init_containers.push(injected);

        Ok(Self { init_containers })
    }

    /// JSON patch replacing `spec.initContainers` with the composed list
    pub fn to_json_patch(&self) -> Result<Patch> {
        let path = PointerBuf::parse(INIT_CONTAINERS_PATH)
            .map_err(|e| Error::Patch(format!("invalid patch path: {e}")))?;

        Ok(Patch(vec![PatchOperation::Add(AddOperation {
            path,
            value: Value::Array(self.init_containers.clone()),
        })]))
    }
}
