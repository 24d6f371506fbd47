//! Eventually consistent local index over one resource type
//!
//! A [`ResourceIndex`] is owned by whoever builds it and refreshed through
//! [`IndexEvent`]s, usually fed from a watch by [`ResourceIndex::spawn_watch`].
//! Reads load an immutable snapshot and never block writers.

use crate::client::ResourceClient;
use arc_swap::ArcSwap;
use futures::StreamExt;
use k8s_openapi::NamespaceResourceScope;
use kube::runtime::{watcher, WatchStreamExt};
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::fmt::Debug;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Computes the index values of an object
pub type IndexFunc<K> = Arc<dyn Fn(&K) -> Vec<String> + Send + Sync>;

#[derive(Debug, Clone)]
pub enum IndexEvent<K> {
    Apply(K),
    Delete(K),
    /// Replace the whole contents, e.g. after a relist
    Reset(Vec<K>),
}

struct Snapshot<K> {
    objects: HashMap<String, Arc<K>>,
    /// index name -> index value -> object names
    indices: HashMap<String, HashMap<String, BTreeSet<String>>>,
}

impl<K> Snapshot<K> {
    fn empty() -> Self {
        Self {
            objects: HashMap::new(),
            indices: HashMap::new(),
        }
    }
}

impl<K> Clone for Snapshot<K> {
    fn clone(&self) -> Self {
        Self {
            objects: self.objects.clone(),
            indices: self.indices.clone(),
        }
    }
}

pub struct ResourceIndex<K> {
    snapshot: ArcSwap<Snapshot<K>>,
    indexers: HashMap<String, IndexFunc<K>>,
    write_lock: Mutex<()>,
}

impl<K> ResourceIndex<K>
where
    K: Resource + Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(Snapshot::empty()),
            indexers: HashMap::new(),
            write_lock: Mutex::new(()),
        }
    }

    /// Register a secondary index, re-indexing whatever is already stored
    pub fn with_indexer<F>(mut self, name: &str, index: F) -> Self
    where
        F: Fn(&K) -> Vec<String> + Send + Sync + 'static,
    {
        self.indexers.insert(name.to_string(), Arc::new(index));
        let objects: Vec<K> = self
            .snapshot
            .load()
            .objects
            .values()
            .map(|obj| K::clone(obj))
            .collect();
        self.apply(IndexEvent::Reset(objects));
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<K>> {
        self.snapshot.load().objects.get(name).cloned()
    }

    /// Objects whose `index` produced `value`
    pub fn by_index(&self, index: &str, value: &str) -> Vec<Arc<K>> {
        let snapshot = self.snapshot.load();
        snapshot
            .indices
            .get(index)
            .and_then(|values| values.get(value))
            .map(|names| {
                names
                    .iter()
                    .filter_map(|name| snapshot.objects.get(name).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn list(&self) -> Vec<Arc<K>> {
        self.snapshot.load().objects.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.snapshot.load().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn apply(&self, event: IndexEvent<K>) {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let next = match event {
            IndexEvent::Reset(objects) => {
                let mut next = Snapshot::empty();
                for obj in objects {
                    self.insert(&mut next, obj);
                }
                next
            }
            IndexEvent::Apply(obj) => {
                let mut next = Snapshot::clone(&self.snapshot.load());
                self.insert(&mut next, obj);
                next
            }
            IndexEvent::Delete(obj) => {
                let mut next = Snapshot::clone(&self.snapshot.load());
                if let Some(name) = obj.meta().name.as_deref() {
                    self.remove(&mut next, name);
                }
                next
            }
        };

        self.snapshot.store(Arc::new(next));
    }

    /// Apply events from `rx` until every sender is gone
    pub fn subscribe(self: &Arc<Self>, mut rx: mpsc::Receiver<IndexEvent<K>>) -> JoinHandle<()> {
        let index = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                index.apply(event);
            }
            debug!("Index event channel closed");
        })
    }

    fn insert(&self, snapshot: &mut Snapshot<K>, obj: K) {
        let Some(name) = obj.meta().name.clone() else {
            return;
        };
        self.remove(snapshot, &name);

        for (index_name, index) in &self.indexers {
            let values = snapshot.indices.entry(index_name.clone()).or_default();
            for value in index(&obj) {
                values.entry(value).or_default().insert(name.clone());
            }
        }
        snapshot.objects.insert(name, Arc::new(obj));
    }

    fn remove(&self, snapshot: &mut Snapshot<K>, name: &str) {
        let Some(old) = snapshot.objects.remove(name) else {
            return;
        };

        for (index_name, index) in &self.indexers {
            let Some(values) = snapshot.indices.get_mut(index_name) else {
                continue;
            };
            for value in index(&old) {
                if let Some(names) = values.get_mut(&value) {
                    names.remove(name);
                    if names.is_empty() {
                        values.remove(&value);
                    }
                }
            }
        }
    }
}

impl<K> ResourceIndex<K>
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
    /// Translate a watch over `client`'s namespace into index events on `tx`
    ///
    /// The initial listing is delivered as one [`IndexEvent::Reset`]. The task
    /// ends when `cancel` fires or the receiving side goes away.
    pub fn spawn_watch(
        client: ResourceClient<K>,
        tx: mpsc::Sender<IndexEvent<K>>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let plural = client.resource_type().plural.clone();
            let mut stream = client.watch().default_backoff().boxed();
            let mut initial: Vec<K> = Vec::new();

            info!("Watching {} in {}", plural, client.namespace());
            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = stream.next() => event,
                };

                let forward = match event {
                    None => break,
                    Some(Err(err)) => {
                        warn!("Watch on {} failed: {}", plural, err);
                        continue;
                    }
                    Some(Ok(watcher::Event::Init)) => {
                        initial.clear();
                        continue;
                    }
                    Some(Ok(watcher::Event::InitApply(obj))) => {
                        initial.push(obj);
                        continue;
                    }
                    Some(Ok(watcher::Event::InitDone)) => IndexEvent::Reset(std::mem::take(&mut initial)),
                    Some(Ok(watcher::Event::Apply(obj))) => IndexEvent::Apply(obj),
                    Some(Ok(watcher::Event::Delete(obj))) => IndexEvent::Delete(obj),
                };

                if tx.send(forward).await.is_err() {
                    break;
                }
            }
            debug!("Stopped watching {}", plural);
        })
    }
}

impl<K> Default for ResourceIndex<K>
where
    K: Resource + Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
