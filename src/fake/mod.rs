//! In-memory fake cluster for testing the API front-ends
//!
//! [`FakeClientBuilder`] yields a real `kube::Client` whose requests are served by
//! an [`ObjectTracker`] instead of an API server. Each request is recorded as an
//! [`Action`], and [`Reactor`]s can intercept actions to inject failures.
//!
//! ```rust
//! use lab_apiserver::fake::{FakeClientBuilder, Verb};
//! use lab_apiserver::resources::{Environment, EnvironmentSpec};
//! use kube::api::{Api, PostParams};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cluster = FakeClientBuilder::new().build().await?;
//! let environments: Api<Environment> = Api::namespaced(cluster.client(), "default");
//!
//! let env = Environment::new("env-1", EnvironmentSpec::default());
//! environments.create(&PostParams::default(), &env).await?;
//!
//! assert_eq!(cluster.actions_for(Verb::Create, "environments").len(), 1);
//! # Ok(())
//! # }
//! ```

mod builder;
mod mock_service;
mod reactor;
mod tracker;


pub use builder::{FakeClientBuilder, FakeCluster};
pub use reactor::{Action, ActionLog, ReactionFunc, Reactor, Verb};
pub use tracker::{ObjectTracker, GVR};
