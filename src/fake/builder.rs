//! Builder for constructing fake clusters with seeded objects and reactors

use super::mock_service::MockService;
use super::reactor::{Action, ActionLog, Reactor, Verb};
use super::tracker::{ObjectTracker, GVR};
use crate::{Error, Result};
use kube::Resource;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Builder for [`FakeCluster`]
///
/// # Example
///
/// ```rust,no_run
/// use lab_apiserver::fake::FakeClientBuilder;
/// use lab_apiserver::resources::{Environment, EnvironmentSpec};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut env = Environment::new("env-1", EnvironmentSpec::default());
/// env.metadata.namespace = Some("hobbyfarm".to_string());
///
/// let cluster = FakeClientBuilder::new().with_object(&env)?.build().await?;
/// let environments: kube::Api<Environment> = kube::Api::namespaced(cluster.client(), "hobbyfarm");
/// # Ok(())
/// # }
/// ```
pub struct FakeClientBuilder {
    default_namespace: String,
    initial_objects: Vec<(GVR, Value)>,
    status_subresources: Vec<GVR>,
    reactors: Vec<Reactor>,
}

impl FakeClientBuilder {
    pub fn new() -> Self {
        Self {
            default_namespace: "default".to_string(),
            initial_objects: Vec::new(),
            status_subresources: Vec::new(),
            reactors: Vec::new(),
        }
    }

    /// Namespace used for seeded objects that do not name one
    pub fn with_default_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.default_namespace = namespace.into();
        self
    }

    /// Seed an object before the client is built
    ///
    /// Seeded objects keep any creationTimestamp or resourceVersion they carry.
    pub fn with_object<K>(mut self, obj: &K) -> Result<Self>
    where
        K: Resource<DynamicType = ()> + Serialize,
    {
        let value = serde_json::to_value(obj)?;
        self.initial_objects.push((gvr_of::<K>(), value));
        Ok(self)
    }

    pub fn with_objects<'a, K>(mut self, objects: impl IntoIterator<Item = &'a K>) -> Result<Self>
    where
        K: Resource<DynamicType = ()> + Serialize + 'a,
    {
        for obj in objects {
            self = self.with_object(obj)?;
        }
        Ok(self)
    }

    /// Plain updates to `K` leave its stored status alone
    pub fn with_status_subresource<K>(mut self) -> Self
    where
        K: Resource<DynamicType = ()>,
    {
        self.status_subresources.push(gvr_of::<K>());
        self
    }

    /// Append a reactor; the first reactor that answers an action wins
    pub fn with_reactor(mut self, reactor: Reactor) -> Self {
        self.reactors.push(reactor);
        self
    }

    /// Build a standard `kube::Client` routed to the in-memory backend
    ///
    /// # Errors
    ///
    /// Returns an error if any initial object cannot be stored.
    pub async fn build(self) -> Result<FakeCluster> {
        let tracker = Arc::new(ObjectTracker::new());

        for gvr in self.status_subresources {
            tracker.add_status_subresource(gvr);
        }

        for (gvr, obj) in self.initial_objects {
            let namespace = obj
                .pointer("/metadata/namespace")
                .and_then(Value::as_str)
                .unwrap_or(&self.default_namespace)
                .to_string();

            tracker
                .add(&gvr, obj, &namespace)
                .map_err(|e| Error::Internal(format!("Failed to add initial object: {}", e)))?;
        }

        let actions = ActionLog::default();
        let service = MockService::new(Arc::clone(&tracker), self.reactors, actions.clone());
        let client = kube::Client::new(service, self.default_namespace);

        Ok(FakeCluster {
            client,
            tracker,
            actions,
        })
    }
}

impl Default for FakeClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A `kube::Client` backed by an [`ObjectTracker`], plus the actions it received
#[derive(Clone)]
pub struct FakeCluster {
    client: kube::Client,
    tracker: Arc<ObjectTracker>,
    actions: ActionLog,
}

impl FakeCluster {
    pub fn client(&self) -> kube::Client {
        self.client.clone()
    }

    pub fn tracker(&self) -> &Arc<ObjectTracker> {
        &self.tracker
    }

    /// Every action received so far, in arrival order
    pub fn actions(&self) -> Vec<Action> {
        self.actions.snapshot()
    }

    /// Actions of one verb against one resource plural
    pub fn actions_for(&self, verb: Verb, resource: &str) -> Vec<Action> {
        self.actions
            .snapshot()
            .into_iter()
            .filter(|action| action.matches(verb, resource))
            .collect()
    }

    pub fn clear_actions(&self) {
        self.actions.clear();
    }
}

fn gvr_of<K: Resource<DynamicType = ()>>() -> GVR {
    GVR::new(K::group(&()), K::version(&()), K::plural(&()))
}
