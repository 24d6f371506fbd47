//! In-memory object store backing the fake cluster

use crate::label_selector::LabelSelector;
use crate::{Error, Result};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, trace};

/// Group, version and plural resource name identifying a collection
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GVR {
    pub group: String,
    pub version: String,
    pub resource: String,
}

impl GVR {
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            resource: resource.into(),
        }
    }

    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

type ObjectsByName = BTreeMap<String, Value>;
type ObjectsByNamespace = HashMap<String, ObjectsByName>;
type ObjectStorage = HashMap<GVR, ObjectsByNamespace>;

/// Stores objects as JSON and enforces resourceVersion optimistic concurrency.
///
/// Resource versions come from a single tracker-wide counter, so they increase
/// across every write regardless of the object touched.
pub struct ObjectTracker {
    objects: RwLock<ObjectStorage>,
    status_subresources: RwLock<HashSet<GVR>>,
    last_resource_version: AtomicU64,
}

impl ObjectTracker {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            status_subresources: RwLock::new(HashSet::new()),
            last_resource_version: AtomicU64::new(0),
        }
    }

    /// Regular updates to this collection keep the stored status untouched
    pub fn add_status_subresource(&self, gvr: GVR) {
        self.status_subresources
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(gvr);
    }

    fn has_status_subresource(&self, gvr: &GVR) -> bool {
        self.status_subresources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(gvr)
    }

    fn read(&self) -> RwLockReadGuard<'_, ObjectStorage> {
        self.objects.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ObjectStorage> {
        self.objects.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_resource_version(&self) -> String {
        (self.last_resource_version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    /// Seed an object, replacing any existing one. A preset resourceVersion is kept.
    pub fn add(&self, gvr: &GVR, mut object: Value, namespace: &str) -> Result<Value> {
        trace!("Adding object: {:?} in namespace: {}", gvr, namespace);

        let mut meta = extract_metadata(&object)?;
        let name = require_name(&meta)?;

        if meta.resource_version.as_ref().is_none_or(|rv| rv.is_empty()) {
            meta.resource_version = Some(self.next_resource_version());
        }
        ensure_metadata(&mut meta, namespace);
        object["metadata"] = serde_json::to_value(&meta)?;

        self.write()
            .entry(gvr.clone())
            .or_default()
            .entry(namespace.to_string())
            .or_default()
            .insert(name.clone(), object.clone());

        debug!("Added object: {}/{}", namespace, name);
        Ok(object)
    }

    pub fn create(&self, gvr: &GVR, mut object: Value, namespace: &str) -> Result<Value> {
        trace!("Creating object: {:?} in namespace: {}", gvr, namespace);

        let mut meta = extract_metadata(&object)?;
        let name = require_name(&meta)?;

        if meta.resource_version.as_ref().is_some_and(|rv| !rv.is_empty()) {
            return Err(Error::InvalidRequest(
                "resourceVersion can not be set for Create requests".to_string(),
            ));
        }

        let mut objects = self.write();
        let ns_objects = objects
            .entry(gvr.clone())
            .or_default()
            .entry(namespace.to_string())
            .or_default();

        if ns_objects.contains_key(&name) {
            return Err(Error::AlreadyExists {
                kind: gvr.resource.clone(),
                name,
                namespace: namespace.to_string(),
            });
        }

        meta.resource_version = Some(self.next_resource_version());
        ensure_metadata(&mut meta, namespace);
        object["metadata"] = serde_json::to_value(&meta)?;
        ns_objects.insert(name.clone(), object.clone());

        debug!("Created object: {}/{}", namespace, name);
        Ok(object)
    }

    pub fn get(&self, gvr: &GVR, namespace: &str, name: &str) -> Result<Value> {
        trace!("Getting object: {:?} {}/{}", gvr, namespace, name);

        self.read()
            .get(gvr)
            .and_then(|by_ns| by_ns.get(namespace))
            .and_then(|by_name| by_name.get(name))
            .cloned()
            .ok_or_else(|| not_found(gvr, namespace, name))
    }

    /// Replace an object. A non-empty resourceVersion must match the stored one;
    /// the comparison and the write happen under one lock.
    pub fn update(&self, gvr: &GVR, mut object: Value, namespace: &str) -> Result<Value> {
        trace!("Updating object: {:?} in namespace: {}", gvr, namespace);

        let meta = extract_metadata(&object)?;
        let name = require_name(&meta)?;
        let keep_status = self.has_status_subresource(gvr);

        let mut objects = self.write();
        let existing = objects
            .get_mut(gvr)
            .and_then(|by_ns| by_ns.get_mut(namespace))
            .and_then(|by_name| by_name.get_mut(&name))
            .ok_or_else(|| not_found(gvr, namespace, &name))?;
        let existing_meta = extract_metadata(existing)?;

        if let (Some(provided), Some(current)) =
            (&meta.resource_version, &existing_meta.resource_version)
        {
            if !provided.is_empty() && provided != current {
                return Err(Error::Conflict(format!(
                    "Operation cannot be fulfilled on {} \"{}\": the object has been modified; \
                     expected resourceVersion {}, got {}",
                    gvr.resource, name, current, provided
                )));
            }
        }

        if keep_status {
            match existing.get("status") {
                Some(status) => object["status"] = status.clone(),
                None => {
                    if let Some(obj) = object.as_object_mut() {
                        obj.remove("status");
                    }
                }
            }
        }

        let mut new_meta = meta;
        new_meta.resource_version = Some(self.next_resource_version());
        new_meta.uid = existing_meta.uid;
        new_meta.creation_timestamp = existing_meta.creation_timestamp;
        new_meta.namespace = existing_meta.namespace;
        object["metadata"] = serde_json::to_value(&new_meta)?;

        *existing = object.clone();

        debug!("Updated object: {}/{}", namespace, name);
        Ok(object)
    }

    pub fn delete(&self, gvr: &GVR, namespace: &str, name: &str) -> Result<Value> {
        trace!("Deleting object: {:?} {}/{}", gvr, namespace, name);

        let removed = self
            .write()
            .get_mut(gvr)
            .and_then(|by_ns| by_ns.get_mut(namespace))
            .and_then(|by_name| by_name.remove(name))
            .ok_or_else(|| not_found(gvr, namespace, name))?;

        debug!("Deleted object: {}/{}", namespace, name);
        Ok(removed)
    }

    /// List objects, across all namespaces when `namespace` is `None`
    pub fn list(
        &self,
        gvr: &GVR,
        namespace: Option<&str>,
        selector: &LabelSelector,
    ) -> Result<Vec<Value>> {
        trace!("Listing objects: {:?} in namespace: {:?}", gvr, namespace);

        let objects = self.read();
        let Some(by_ns) = objects.get(gvr) else {
            return Ok(Vec::new());
        };

        let in_scope: Vec<&ObjectsByName> = match namespace {
            Some(ns) => by_ns.get(ns).into_iter().collect(),
            None => by_ns.values().collect(),
        };

        let mut result = Vec::new();
        for stored in in_scope.into_iter().flat_map(|by_name| by_name.values()) {
            if selector.matches(&labels_of(stored)) {
                result.push(stored.clone());
            }
        }
        Ok(result)
    }

    /// Remove every object in `namespace` matching `selector`, returning them
    pub fn delete_collection(
        &self,
        gvr: &GVR,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<Value>> {
        trace!("Deleting collection: {:?} in namespace: {}", gvr, namespace);

        let mut objects = self.write();
        let Some(by_name) = objects.get_mut(gvr).and_then(|by_ns| by_ns.get_mut(namespace)) else {
            return Ok(Vec::new());
        };

        let doomed: Vec<String> = by_name
            .iter()
            .filter(|(_, stored)| selector.matches(&labels_of(stored)))
            .map(|(name, _)| name.clone())
            .collect();

        let removed = doomed
            .iter()
            .filter_map(|name| by_name.remove(name))
            .collect::<Vec<_>>();

        debug!("Deleted {} objects in {}", removed.len(), namespace);
        Ok(removed)
    }

    /// The most recently issued resourceVersion
    pub fn resource_version(&self) -> String {
        self.last_resource_version.load(Ordering::SeqCst).to_string()
    }
}

impl Default for ObjectTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn not_found(gvr: &GVR, namespace: &str, name: &str) -> Error {
    Error::NotFound {
        kind: gvr.resource.clone(),
        name: name.to_string(),
        namespace: namespace.to_string(),
    }
}

fn require_name(meta: &ObjectMeta) -> Result<String> {
    meta.name
        .clone()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| Error::InvalidRequest("Object name is required".to_string()))
}

fn extract_metadata(object: &Value) -> Result<ObjectMeta> {
    let meta_value = object
        .get("metadata")
        .ok_or_else(|| Error::MetadataError("Object missing metadata field".to_string()))?;

    serde_json::from_value(meta_value.clone())
        .map_err(|e| Error::MetadataError(format!("Failed to parse metadata: {}", e)))
}

fn ensure_metadata(meta: &mut ObjectMeta, namespace: &str) {
    if namespace.is_empty() {
        meta.namespace = None;
    } else {
        meta.namespace = Some(namespace.to_string());
    }
    if meta.creation_timestamp.is_none() {
        meta.creation_timestamp = Some(Time(chrono::Utc::now()));
    }
    if meta.uid.is_none() {
        meta.uid = Some(uuid::Uuid::new_v4().to_string());
    }
}

fn labels_of(object: &Value) -> BTreeMap<String, String> {
    object
        .pointer("/metadata/labels")
        .and_then(Value::as_object)
        .map(|labels| {
            labels
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default()
}
