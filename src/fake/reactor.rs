//! Recorded actions and reactors for the fake cluster
//!
//! Every request reaching the fake API server is recorded as an [`Action`].
//! Reactors run before the object tracker and may answer an action themselves,
//! which is how tests inject conflicts, outages or canned objects.

use crate::Result;
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    List,
    Create,
    Update,
    Patch,
    Delete,
    DeleteCollection,
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Verb::Get => "get",
            Verb::List => "list",
            Verb::Create => "create",
            Verb::Update => "update",
            Verb::Patch => "patch",
            Verb::Delete => "delete",
            Verb::DeleteCollection => "deletecollection",
        };
        f.write_str(name)
    }
}

/// One call made against the fake API server
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub verb: Verb,
    /// Plural resource name, e.g. `environments`
    pub resource: String,
    pub namespace: Option<String>,
    pub name: Option<String>,
    /// Request body for create, update and patch
    pub object: Option<Value>,
    pub label_selector: Option<String>,
}

impl Action {
    pub fn matches(&self, verb: Verb, resource: &str) -> bool {
        self.verb == verb && self.resource == resource
    }
}

/// Return `None` to fall through to the tracker, `Some(Ok(..))` to answer with
/// an object (an array of items for list verbs), or `Some(Err(..))` to fail.
pub type ReactionFunc = Arc<dyn Fn(&Action) -> Option<Result<Value>> + Send + Sync>;

#[derive(Clone)]
pub struct Reactor {
    verb: Option<Verb>,
    resource: Option<String>,
    reaction: ReactionFunc,
}

impl Reactor {
    /// React to `verb` on `resource`; `None` matches any verb or resource
    pub fn new<F>(verb: Option<Verb>, resource: Option<&str>, reaction: F) -> Self
    where
        F: Fn(&Action) -> Option<Result<Value>> + Send + Sync + 'static,
    {
        Self {
            verb,
            resource: resource.map(str::to_string),
            reaction: Arc::new(reaction),
        }
    }

    pub(crate) fn react(&self, action: &Action) -> Option<Result<Value>> {
        let verb_matches = self.verb.is_none_or(|verb| verb == action.verb);
        let resource_matches = self
            .resource
            .as_deref()
            .is_none_or(|resource| resource == action.resource);

        if verb_matches && resource_matches {
            (self.reaction)(action)
        } else {
            None
        }
    }
}

/// Shared, append-only record of actions
#[derive(Clone, Default)]
pub struct ActionLog {
    actions: Arc<Mutex<Vec<Action>>>,
}

impl ActionLog {
    pub(crate) fn record(&self, action: Action) {
        self.actions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(action);
    }

    pub fn snapshot(&self) -> Vec<Action> {
        self.actions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        self.actions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
