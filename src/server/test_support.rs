//! Router harness backed by the fake cluster

use super::{routes, EnvironmentServer, ProgressServer, Servers, VMClaimServer};
use crate::auth::{AuthGate, StaticAuthGate};
use crate::availability::ScheduledEventAvailability;
use crate::client::ResourceClient;
use crate::fake::{FakeClientBuilder, FakeCluster};
use crate::index::ResourceIndex;
use crate::resources::VirtualMachineClaim;
use crate::retry::Backoff;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

pub const NAMESPACE: &str = "hf";

/// Every permission
pub const ADMIN: &str = "admin-token";
/// Read-only admin
pub const AUDITOR: &str = "auditor-token";
/// Authenticated, no permissions
pub const ALICE: &str = "alice-token";
pub const BOB: &str = "bob-token";

pub struct TestApp {
    pub cluster: FakeCluster,
    pub router: Router,
    pub claims: Arc<ResourceIndex<VirtualMachineClaim>>,
}

fn auth_gate() -> Arc<dyn AuthGate> {
    let gate = StaticAuthGate::new()
        .with_user("admin", ADMIN, &["*:*"])
        .and_then(|gate| {
            gate.with_user(
                "auditor",
                AUDITOR,
                &["environments:get", "environments:list", "progresses:list"],
            )
        })
        .and_then(|gate| gate.with_user("alice", ALICE, &[]))
        .and_then(|gate| gate.with_user("bob", BOB, &[]))
        .unwrap();
    Arc::new(gate)
}

pub async fn app(builder: FakeClientBuilder) -> TestApp {
    let cluster = builder
        .with_default_namespace(NAMESPACE)
        .build()
        .await
        .unwrap();
    let client = cluster.client();
    let auth = auth_gate();
    let shutdown = CancellationToken::new();
    let backoff = Backoff {
        duration: Duration::from_millis(1),
        ..Backoff::default()
    };
    let claims = Arc::new(ResourceIndex::new());

    let availability = Arc::new(ScheduledEventAvailability::new(
        ResourceClient::namespaced(client.clone(), NAMESPACE),
        ResourceClient::namespaced(client.clone(), NAMESPACE),
    ));
    let servers = Servers {
        environment: EnvironmentServer::new(
            Arc::clone(&auth),
            ResourceClient::namespaced(client.clone(), NAMESPACE),
            availability,
            backoff.clone(),
            shutdown.clone(),
        ),
        progress: ProgressServer::new(
            Arc::clone(&auth),
            ResourceClient::namespaced(client, NAMESPACE),
            backoff,
            shutdown,
        ),
        vmclaim: VMClaimServer::new(auth, Arc::clone(&claims)),
    };

    TestApp {
        cluster,
        router: routes(servers),
        claims,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }
}

pub fn get(uri: &str, token: &str) -> Request<Body> {
    bodiless(Method::GET, uri, token)
}

pub fn delete(uri: &str, token: &str) -> Request<Body> {
    bodiless(Method::DELETE, uri, token)
}

/// A request with no body and no content type
pub fn bodiless(method: Method, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

pub fn form(method: Method, uri: &str, token: &str, fields: &[(&str, &str)]) -> Request<Body> {
    let body = fields
        .iter()
        .map(|(key, value)| format!("{}={}", urlencoding::encode(key), urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&");

    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .unwrap()
}
