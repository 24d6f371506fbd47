//! HTTP front-ends
//!
//! Each server owns one resource type and exposes its routes as an
//! `axum::Router`; [`routes`] merges them into the application router.

mod environment;
pub mod form;
mod progress;
pub mod response;
mod vmclaim;

#[cfg(test)]
mod environment_test;
#[cfg(test)]
mod test_support;

pub use environment::EnvironmentServer;
pub use progress::ProgressServer;
pub use vmclaim::VMClaimServer;

use axum::http::StatusCode;
use axum::response::Response;
use axum::Router;

/// The three front-ends served together
#[derive(Clone)]
pub struct Servers {
    pub environment: EnvironmentServer,
    pub progress: ProgressServer,
    pub vmclaim: VMClaimServer,
}

pub fn routes(servers: Servers) -> Router {
    Router::new()
        .merge(servers.environment.routes())
        .merge(servers.progress.routes())
        .merge(servers.vmclaim.routes())
        .fallback(not_found)
}

async fn not_found() -> Response {
    response::message(StatusCode::NOT_FOUND, "notfound", "no such route")
}
