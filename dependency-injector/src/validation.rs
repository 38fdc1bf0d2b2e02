//! Shape validation of `Dependency` resources
//!
//! Runs on the raw admission object rather than the typed resource so that
//! every malformed field is reported by name instead of as a generic
//! deserialization failure. Rejections are never suppressed.

use async_trait::async_trait;
use kube::ResourceExt;
use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, Operation};
use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crate::Result;
use crate::admission::{ValidatingAdmissionHandler, deny};
use crate::error::REJECTION_CODE;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("cannot find spec in definition")]
    MissingSpec,

    #[error("attribute 'depends_on' not found in spec")]
    MissingDependsOn,

    #[error("attribute 'selector' not found in spec")]
    MissingSelector,

    #[error("attribute 'depends_on' should be of type list, encountered {0}")]
    DependsOnNotList(&'static str),

    #[error("attribute 'selector' should be of type dict, encountered {0}")]
    SelectorNotMap(&'static str),

    #[error("attribute 'app' not found in spec.selector")]
    MissingApp,

    #[error("attribute 'app' should be of type string, encountered {0}")]
    AppNotString(&'static str),
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

/// Checks the shape of a `Dependency` spec, stopping at the first violation
pub fn validate_spec(spec: Option<&Value>) -> Result<(), ValidationError> {
    let Some(spec) = spec.and_then(Value::as_object) else {
        return Err(ValidationError::MissingSpec);
    };

    let depends_on = spec
        .get("depends_on")
        .ok_or(ValidationError::MissingDependsOn)?;
    let selector = spec.get("selector").ok_or(ValidationError::MissingSelector)?;

    if !depends_on.is_array() {
        return Err(ValidationError::DependsOnNotList(type_name(depends_on)));
    }

    let selector = selector
        .as_object()
        .ok_or_else(|| ValidationError::SelectorNotMap(type_name(selector)))?;

    let app = selector.get("app").ok_or(ValidationError::MissingApp)?;
    if !app.is_string() {
        return Err(ValidationError::AppNotString(type_name(app)));
    }

    Ok(())
}

/// Validating webhook for `Dependency` resources
///
/// CREATE and UPDATE are checked with the same rules; other operations pass.
pub struct DependencyValidator;

#[async_trait]
impl ValidatingAdmissionHandler for DependencyValidator {
    fn name(&self) -> &'static str {
        "DependencyValidator"
    }

    async fn validate(&self, req: &AdmissionRequest<DynamicObject>) -> Result<AdmissionResponse> {
        let res = AdmissionResponse::from(req);

        if !matches!(req.operation, Operation::Create | Operation::Update) {
            return Ok(res);
        }
        let Some(obj) = &req.object else {
            return Ok(res);
        };

        let name = obj.name_any();
        info!(name = %name, operation = ?req.operation, "validating Dependency");

        if let Err(err) = validate_spec(obj.data.get("spec")) {
            return Ok(deny(res, REJECTION_CODE, err));
        }

        info!(name = %name, namespace = ?req.namespace, "admitted Dependency");
        Ok(res)
    }
}
