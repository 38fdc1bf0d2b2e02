use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use kube::ResourceExt;
use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use tracing::{error, info, warn};

use crate::Result;

#[async_trait]
pub trait MutatingAdmissionHandler: Send + Sync {
    /// Returns the name of this handler for logging purposes
    fn name(&self) -> &'static str;

    /// Mutates the resource in the admission request
    ///
    /// Returns an `AdmissionResponse` that may include JSON patches to modify the resource.
    /// An `Err` denies the request with the error's code.
    async fn mutate(&self, req: &AdmissionRequest<DynamicObject>) -> Result<AdmissionResponse>;
}

#[async_trait]
pub trait ValidatingAdmissionHandler: Send + Sync {
    /// Returns the name of this handler for logging purposes
    fn name(&self) -> &'static str;

    /// Validates the resource in the admission request
    ///
    /// Returns an `AdmissionResponse` that either accepts or denies the request.
    async fn validate(&self, req: &AdmissionRequest<DynamicObject>) -> Result<AdmissionResponse>;
}

type RouteFuture = Pin<Box<dyn Future<Output = Result<warp::reply::Json, Infallible>> + Send>>;

/// Denies `res` with `reason`, reporting `code` as the status code
pub(crate) fn deny(res: AdmissionResponse, code: u16, reason: impl ToString) -> AdmissionResponse {
    let mut res = res.deny(reason);
    res.result.code = code;
    res
}

/// Creates a warp route handler for mutating admission webhooks
pub(crate) fn create_mutating_route(
    handlers: Vec<Box<dyn MutatingAdmissionHandler>>,
) -> impl Fn(AdmissionReview<DynamicObject>) -> RouteFuture + Clone {
    let handlers = Arc::new(handlers);
    move |body: AdmissionReview<DynamicObject>| {
        let handlers = handlers.clone();
        Box::pin(async move {
            let req: AdmissionRequest<_> = match body.try_into() {
                Ok(req) => req,
                Err(err) => {
                    error!("invalid admission request: {}", err);
                    return Ok(warp::reply::json(
                        &AdmissionResponse::invalid(err.to_string()).into_review(),
                    ));
                }
            };

            let mut res = AdmissionResponse::from(&req);

            if let Some(obj) = &req.object {
                let name = obj.name_any();
                let kind = obj.types.clone().unwrap_or_default().kind;

                for handler in handlers.iter() {
                    match handler.mutate(&req).await {
                        Ok(handler_res) => {
                            res = merge_responses(res, handler_res);
                            info!(
                                handler = handler.name(),
                                operation = ?req.operation,
                                kind = %kind,
                                name = %name,
                                "mutation finished"
                            );
                        }
                        Err(err) => {
                            error!(
                                handler = handler.name(),
                                operation = ?req.operation,
                                kind = %kind,
                                name = %name,
                                error = %err,
                                "mutation failed"
                            );
                            res = deny(res, err.code(), format!("{}: {}", handler.name(), err));
                            break;
                        }
                    }
                }
            }

            Ok(warp::reply::json(&res.into_review()))
        })
    }
}

/// Creates a warp route handler for validating admission webhooks
pub(crate) fn create_validating_route(
    handlers: Vec<Box<dyn ValidatingAdmissionHandler>>,
) -> impl Fn(AdmissionReview<DynamicObject>) -> RouteFuture + Clone {
    let handlers = Arc::new(handlers);
    move |body: AdmissionReview<DynamicObject>| {
        let handlers = handlers.clone();
        Box::pin(async move {
            let req: AdmissionRequest<_> = match body.try_into() {
                Ok(req) => req,
                Err(err) => {
                    error!("invalid admission request: {}", err);
                    return Ok(warp::reply::json(
                        &AdmissionResponse::invalid(err.to_string()).into_review(),
                    ));
                }
            };

            let mut res = AdmissionResponse::from(&req);

            if let Some(obj) = &req.object {
                let name = obj.name_any();
                let kind = obj.types.clone().unwrap_or_default().kind;

                for handler in handlers.iter() {
                    match handler.validate(&req).await {
                        Ok(handler_res) => {
                            if !handler_res.allowed {
                                warn!(
                                    handler = handler.name(),
                                    operation = ?req.operation,
                                    kind = %kind,
                                    name = %name,
                                    reason = %handler_res.result.message,
                                    "validation denied"
                                );
                                res = handler_res;
                                break;
                            }
                            info!(
                                handler = handler.name(),
                                operation = ?req.operation,
                                kind = %kind,
                                name = %name,
                                "validation passed"
                            );
                        }
                        Err(err) => {
                            error!(
                                handler = handler.name(),
                                operation = ?req.operation,
                                kind = %kind,
                                name = %name,
                                error = %err,
                                "validation error"
                            );
                            res = deny(res, err.code(), format!("{}: {}", handler.name(), err));
                            break;
                        }
                    }
                }
            }

            Ok(warp::reply::json(&res.into_review()))
        })
    }
}

fn merge_responses(base: AdmissionResponse, other: AdmissionResponse) -> AdmissionResponse {
    use json_patch::Patch;
    use serde_json::*;

    if !other.allowed {
        return other;
    }

    let Some(base_patch) = base.patch.as_ref() else {
        return other;
    };
    let Some(other_patch) = other.patch.as_ref() else {
        return base;
    };

    let (Ok(base_patches), Ok(other_patches)) = (
        from_slice::<Vec<Value>>(base_patch),
        from_slice::<Vec<Value>>(other_patch),
    ) else {
        return base;
    };

    let combined = [base_patches, other_patches]
        .into_iter()
        .flatten()
        .collect::<Value>();

    let Ok(patch) = from_value::<Patch>(json!(combined)) else {
        return base;
    };

    other.with_patch(patch).unwrap_or(base)
}
