//! Generic client for the namespaced custom resources

use crate::label_selector::LabelSelector;
use crate::{Error, Result};
use futures::Stream;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::runtime::watcher;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Debug;
use tracing::{debug, trace};

/// Type metadata for a resource kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceType {
    pub group: String,
    pub version: String,
    pub kind: String,
    pub plural: String,
}

impl ResourceType {
    pub fn of<K: Resource<DynamicType = ()>>() -> Self {
        Self {
            group: K::group(&()).into_owned(),
            version: K::version(&()).into_owned(),
            kind: K::kind(&()).into_owned(),
            plural: K::plural(&()).into_owned(),
        }
    }
}

/// CRUD and watch access to one resource type within one namespace
///
/// Every read returns the object's current resourceVersion, and `replace`
/// sends back whatever version the caller holds, so stale writes surface as
/// [`Error::Conflict`].
pub struct ResourceClient<K> {
    api: Api<K>,
    namespace: String,
    resource_type: ResourceType,
}

impl<K: Clone> Clone for ResourceClient<K> {
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
            namespace: self.namespace.clone(),
            resource_type: self.resource_type.clone(),
        }
    }
}

impl<K> ResourceClient<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static,
{
    pub fn namespaced(client: kube::Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            namespace: namespace.to_string(),
            resource_type: ResourceType::of::<K>(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn resource_type(&self) -> &ResourceType {
        &self.resource_type
    }

    pub async fn get(&self, name: &str) -> Result<K> {
        trace!("Getting {} {}/{}", self.resource_type.plural, self.namespace, name);
        self.api.get(name).await.map_err(|e| self.classify(e, name))
    }

    /// List objects matching `selector`; the empty selector lists everything
    pub async fn list(&self, selector: &LabelSelector) -> Result<Vec<K>> {
        trace!(
            "Listing {} in {} with selector {:?}",
            self.resource_type.plural,
            self.namespace,
            selector.to_string()
        );
        let params = Self::list_params(selector);
        let list = self.api.list(&params).await.map_err(|e| self.classify(e, ""))?;
        Ok(list.items)
    }

    pub async fn create(&self, obj: &K) -> Result<K> {
        let name = obj.meta().name.clone().unwrap_or_default();
        let created = self
            .api
            .create(&PostParams::default(), obj)
            .await
            .map_err(|e| self.classify(e, &name))?;
        debug!("Created {} {}/{}", self.resource_type.plural, self.namespace, name);
        Ok(created)
    }

    /// Whole-object update carrying the resourceVersion held by the caller
    pub async fn replace(&self, obj: &K) -> Result<K> {
        let name = obj.meta().name.clone().ok_or_else(|| {
            Error::InvalidRequest("resource name is required for update".to_string())
        })?;
        let updated = self
            .api
            .replace(&name, &PostParams::default(), obj)
            .await
            .map_err(|e| self.classify(e, &name))?;
        debug!("Updated {} {}/{}", self.resource_type.plural, self.namespace, name);
        Ok(updated)
    }

    /// Apply a JSON merge patch
    pub async fn patch(&self, name: &str, patch: &Value) -> Result<K> {
        self.api
            .patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await
            .map_err(|e| self.classify(e, name))
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        self.api
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| self.classify(e, name))?;
        debug!("Deleted {} {}/{}", self.resource_type.plural, self.namespace, name);
        Ok(())
    }

    pub async fn delete_collection(&self, selector: &LabelSelector) -> Result<()> {
        self.api
            .delete_collection(&DeleteParams::default(), &Self::list_params(selector))
            .await
            .map_err(|e| self.classify(e, ""))?;
        debug!(
            "Deleted {} in {} matching {:?}",
            self.resource_type.plural,
            self.namespace,
            selector.to_string()
        );
        Ok(())
    }

    /// Watch the namespace, starting with a full listing
    pub fn watch(&self) -> impl Stream<Item = std::result::Result<watcher::Event<K>, watcher::Error>> + Send {
        watcher(self.api.clone(), watcher::Config::default())
    }

    fn list_params(selector: &LabelSelector) -> ListParams {
        if selector.is_empty() {
            ListParams::default()
        } else {
            ListParams::default().labels(&selector.to_string())
        }
    }

    /// Attach the resource identity to errors that lost it on the wire
    fn classify(&self, err: kube::Error, name: &str) -> Error {
        match Error::from(err) {
            Error::NotFound { .. } => Error::NotFound {
                kind: self.resource_type.kind.clone(),
                name: name.to_string(),
                namespace: self.namespace.clone(),
            },
            Error::AlreadyExists { .. } => Error::AlreadyExists {
                kind: self.resource_type.kind.clone(),
                name: name.to_string(),
                namespace: self.namespace.clone(),
            },
            other => other,
        }
    }
}
