//! Exact-match label selectors
//!
//! The API front-ends only ever filter by `key=value` clauses combined with AND,
//! so this is deliberately narrower than the full Kubernetes selector grammar:
//! - Equality: `key=value` or `key==value`
//! - Multiple clauses separated by commas: `key1=value1,key2=value2`
//! - The empty selector matches everything

use crate::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;

/// An AND of exact `key=value` requirements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    clauses: Vec<(String, String)>,
}

impl LabelSelector {
    /// The empty selector, which matches every object
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a `key=value` requirement
    ///
    /// ```
    /// use lab_apiserver::label_selector::LabelSelector;
    ///
    /// let selector = LabelSelector::new().eq("app", "web").eq("finished", "false");
    /// assert_eq!(selector.to_string(), "app=web,finished=false");
    /// ```
    pub fn eq(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.clauses.push((key.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Parse a selector string such as `app=web,env==prod`
    ///
    /// Anything other than equality clauses is rejected.
    pub fn parse(selector: &str) -> Result<Self> {
        let mut parsed = Self::new();

        for requirement in selector.split(',') {
            let requirement = requirement.trim();
            if requirement.is_empty() {
                continue;
            }
            if requirement.contains("!=") {
                return Err(Error::InvalidRequest(format!(
                    "unsupported label requirement: {}",
                    requirement
                )));
            }

            let (key, value) = requirement
                .split_once("==")
                .or_else(|| requirement.split_once('='))
                .ok_or_else(|| {
                    Error::InvalidRequest(format!("unsupported label requirement: {}", requirement))
                })?;

            let key = key.trim();
            if key.is_empty() {
                return Err(Error::InvalidRequest(format!(
                    "label requirement without a key: {}",
                    requirement
                )));
            }
            parsed = parsed.eq(key, value.trim());
        }

        Ok(parsed)
    }

    /// Every clause must be present with exactly the given value
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.clauses
            .iter()
            .all(|(key, value)| labels.get(key) == Some(value))
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .clauses
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect();
        f.write_str(&rendered.join(","))
    }
}
