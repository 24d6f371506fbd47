//! Authentication and permission checks for the HTTP front-ends
//!
//! Handlers only see the [`AuthGate`] trait. The binary and the tests use
//! [`StaticAuthGate`], a bearer-token table loaded from YAML:
//!
//! ```yaml
//! users:
//!   - name: admin
//!     token: s3cret
//!     permissions: ["*:*"]
//!   - name: alice
//!     token: alice-token
//!     permissions: ["progresses:list", "environments:get"]
//! ```

use crate::resources::API_GROUP;
use crate::{Error, Result};
use async_trait::async_trait;
use http::header::AUTHORIZATION;
use http::HeaderMap;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    List,
    Create,
    Update,
    Delete,
    Watch,
    Patch,
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Verb::Get => "get",
            Verb::List => "list",
            Verb::Create => "create",
            Verb::Update => "update",
            Verb::Delete => "delete",
            Verb::Watch => "watch",
            Verb::Patch => "patch",
        };
        f.write_str(name)
    }
}

impl FromStr for Verb {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "get" => Ok(Verb::Get),
            "list" => Ok(Verb::List),
            "create" => Ok(Verb::Create),
            "update" => Ok(Verb::Update),
            "delete" => Ok(Verb::Delete),
            "watch" => Ok(Verb::Watch),
            "patch" => Ok(Verb::Patch),
            other => Err(Error::Config(format!("unknown verb: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permission {
    pub api_group: String,
    /// Plural resource name, e.g. `environments`
    pub resource: String,
    pub verb: Verb,
}

/// Permissions that must all be held
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RbacRequest {
    permissions: Vec<Permission>,
}

impl RbacRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `verb` on a resource of the platform's API group
    pub fn permission(mut self, resource: &str, verb: Verb) -> Self {
        self.permissions.push(Permission {
            api_group: API_GROUP.to_string(),
            resource: resource.to_string(),
            verb,
        });
        self
    }

    pub fn permissions(&self) -> &[Permission] {
        &self.permissions
    }
}

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub name: String,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authentication failed: {0}")]
    Unauthenticated(String),

    #[error("{principal} may not {verb} {resource}")]
    Forbidden {
        principal: String,
        verb: Verb,
        resource: String,
    },
}

#[async_trait]
pub trait AuthGate: Send + Sync {
    async fn authenticate(&self, headers: &HeaderMap) -> std::result::Result<Principal, AuthError>;

    async fn authorize(
        &self,
        principal: &Principal,
        request: &RbacRequest,
    ) -> std::result::Result<(), AuthError>;

    /// Authenticate, then authorize every permission in `request`
    async fn grant(
        &self,
        headers: &HeaderMap,
        request: &RbacRequest,
    ) -> std::result::Result<Principal, AuthError> {
        let principal = self.authenticate(headers).await?;
        self.authorize(&principal, request).await?;
        Ok(principal)
    }
}

/// `resource:verb`, where either side may be `*`
#[derive(Debug, Clone, PartialEq, Eq)]
struct Grant {
    resource: Option<String>,
    verb: Option<Verb>,
}

impl Grant {
    fn parse(raw: &str) -> Result<Self> {
        let (resource, verb) = raw
            .split_once(':')
            .ok_or_else(|| Error::Config(format!("permission must be resource:verb, got {:?}", raw)))?;

        let resource = match resource.trim() {
            "" => return Err(Error::Config(format!("permission {:?} names no resource", raw))),
            "*" => None,
            resource => Some(resource.to_string()),
        };
        let verb = match verb.trim() {
            "*" => None,
            verb => Some(verb.parse()?),
        };

        Ok(Self { resource, verb })
    }

    fn allows(&self, permission: &Permission) -> bool {
        permission.api_group == API_GROUP
            && self.resource.as_deref().is_none_or(|r| r == permission.resource)
            && self.verb.is_none_or(|v| v == permission.verb)
    }
}

#[derive(Debug, Clone)]
struct StaticUser {
    name: String,
    grants: Vec<Grant>,
}

#[derive(Deserialize)]
struct AuthFile {
    #[serde(default)]
    users: Vec<UserEntry>,
}

#[derive(Deserialize)]
struct UserEntry {
    name: String,
    token: String,
    #[serde(default)]
    permissions: Vec<String>,
}

/// Bearer tokens mapped to users and their permissions
#[derive(Debug, Clone, Default)]
pub struct StaticAuthGate {
    users: HashMap<String, StaticUser>,
}

impl StaticAuthGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user. Names and tokens must each be unique.
    pub fn with_user(mut self, name: &str, token: &str, permissions: &[&str]) -> Result<Self> {
        if self.user_for(name).is_some() {
            return Err(Error::Config(format!("duplicate user {}", name)));
        }
        if self.users.contains_key(token) {
            return Err(Error::Config(format!("duplicate token for user {}", name)));
        }
        let grants = permissions
            .iter()
            .map(|raw| Grant::parse(raw))
            .collect::<Result<Vec<_>>>()?;
        self.users.insert(
            token.to_string(),
            StaticUser {
                name: name.to_string(),
                grants,
            },
        );
        Ok(self)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let file: AuthFile =
            serde_yaml::from_str(yaml).map_err(|e| Error::Config(format!("invalid auth file: {}", e)))?;

        let mut gate = Self::new();
        for user in file.users {
            let permissions: Vec<&str> = user.permissions.iter().map(String::as_str).collect();
            gate = gate.with_user(&user.name, &user.token, &permissions)?;
        }
        Ok(gate)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_yaml(&yaml)
    }

    fn user_for(&self, name: &str) -> Option<&StaticUser> {
        self.users.values().find(|user| user.name == name)
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ").or_else(|| value.strip_prefix("bearer "))?;
    Some(token.trim()).filter(|token| !token.is_empty())
}

#[async_trait]
impl AuthGate for StaticAuthGate {
    async fn authenticate(&self, headers: &HeaderMap) -> std::result::Result<Principal, AuthError> {
        let token = bearer_token(headers)
            .ok_or_else(|| AuthError::Unauthenticated("missing bearer token".to_string()))?;

        self.users
            .get(token)
            .map(|user| Principal {
                name: user.name.clone(),
            })
            .ok_or_else(|| AuthError::Unauthenticated("unknown token".to_string()))
    }

    async fn authorize(
        &self,
        principal: &Principal,
        request: &RbacRequest,
    ) -> std::result::Result<(), AuthError> {
        let grants = self
            .user_for(&principal.name)
            .map(|user| user.grants.as_slice())
            .unwrap_or_default();

        for permission in request.permissions() {
            if !grants.iter().any(|grant| grant.allows(permission)) {
                debug!(
                    "Denied {} {} {}",
                    principal.name, permission.verb, permission.resource
                );
                return Err(AuthError::Forbidden {
                    principal: principal.name.clone(),
                    verb: permission.verb,
                    resource: permission.resource.clone(),
                });
            }
        }
        Ok(())
    }
}
