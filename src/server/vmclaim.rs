//! Read access to VM claims, served from a local index

use super::response::{content, ApiError, ApiResult};
use crate::auth::{AuthGate, RbacRequest, Verb};
use crate::index::ResourceIndex;
use crate::resources::VirtualMachineClaim;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::get;
use axum::Router;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, error, info};

const RESOURCE_PLURAL: &str = "virtualmachineclaims";

#[derive(Clone)]
pub struct VMClaimServer {
    auth: Arc<dyn AuthGate>,
    claims: Arc<ResourceIndex<VirtualMachineClaim>>,
}

impl VMClaimServer {
    pub fn new(auth: Arc<dyn AuthGate>, claims: Arc<ResourceIndex<VirtualMachineClaim>>) -> Self {
        Self { auth, claims }
    }

    pub fn routes(self) -> Router {
        Router::new()
            .route("/vmclaim/{id}", get(get_claim))
            .with_state(self)
    }
}

/// Spec and status side by side, with `id` set to the claim's name
fn prepare(claim: &VirtualMachineClaim) -> Result<Value, serde_json::Error> {
    let mut prepared = Map::new();
    if let Value::Object(spec) = serde_json::to_value(&claim.spec)? {
        prepared.extend(spec);
    }
    if let Value::Object(status) = serde_json::to_value(claim.status.clone().unwrap_or_default())? {
        prepared.extend(status);
    }
    prepared.insert(
        "id".to_string(),
        Value::String(claim.metadata.name.clone().unwrap_or_default()),
    );
    Ok(Value::Object(prepared))
}

async fn get_claim(
    State(server): State<VMClaimServer>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult {
    let user = server
        .auth
        .authenticate(&headers)
        .await
        .map_err(ApiError::forbidden("no access to get vmc"))?;

    let Some(claim) = server.claims.get(&id) else {
        debug!("No virtual machine claim {} in index", id);
        return Err(ApiError::NotFound("no vm found".to_string()));
    };

    if claim.spec.user_id != user.name {
        server
            .auth
            .authorize(&user, &RbacRequest::new().permission(RESOURCE_PLURAL, Verb::Get))
            .await
            .map_err(ApiError::forbidden("access denied to get vmclaim"))?;
    }

    let prepared = prepare(&claim).map_err(|e| {
        error!("Failed to encode virtual machine claim {}: {}", id, e);
        ApiError::Internal("error encoding vmclaim".to_string())
    })?;

    info!("Retrieved vmc {}", id);
    content(&prepared)
}
