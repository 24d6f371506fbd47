//! REST front-ends over the `hobbyfarm.io` custom resources.
//!
//! Three servers share one authentication gate and a namespaced Kubernetes
//! client:
//!
//! - [`server::EnvironmentServer`] administers lab environments and answers
//!   capacity questions through an [`availability::AvailabilityOracle`].
//! - [`server::ProgressServer`] reports and advances per-session progress.
//! - [`server::VMClaimServer`] serves VM claims from a watched
//!   [`index::ResourceIndex`].
//!
//! Writes go through [`retry::update_with_retry`], which re-reads the object
//! and retries on optimistic-concurrency conflicts.
//!
//! # Testing
//!
//! The [`fake`] module provides an in-memory cluster behind a real
//! `kube::Client`, so handlers can be exercised end to end:
//!
//! ```rust
//! use lab_apiserver::client::ResourceClient;
//! use lab_apiserver::fake::FakeClientBuilder;
//! use lab_apiserver::resources::{Environment, EnvironmentSpec};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cluster = FakeClientBuilder::new().build().await?;
//! let environments = ResourceClient::<Environment>::namespaced(cluster.client(), "hobbyfarm");
//!
//! environments
//!     .create(&Environment::new("env-1", EnvironmentSpec::default()))
//!     .await?;
//! assert_eq!(environments.get("env-1").await?.spec.display_name, "");
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod availability;
pub mod client;
pub mod config;
mod error;
pub mod fake;
pub mod index;
pub mod label_selector;
pub mod resources;
pub mod retry;
pub mod server;
pub mod utils;

#[cfg(test)]
mod availability_test;
#[cfg(test)]
mod config_test;
#[cfg(test)]
mod index_test;

pub use error::{Error, Result};
