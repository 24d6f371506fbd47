//! Mock tower service that answers Kubernetes REST calls from the object tracker

use super::reactor::{Action, ActionLog, Reactor, Verb};
use super::tracker::{ObjectTracker, GVR};
use crate::error::Error;
use crate::label_selector::LabelSelector;
use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt};
use http::{Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use kube::client::Body as KubeBody;
use serde_json::{json, Value};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;
use tracing::trace;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Parsed Kubernetes API path information
#[derive(Debug, PartialEq)]
struct ParsedPath {
    gvr: GVR,
    namespace: Option<String>,
    name: Option<String>,
}

/// Patch flavours distinguished by Content-Type
#[derive(Debug, Clone, Copy, PartialEq)]
enum PatchType {
    /// RFC 6902 - application/json-patch+json
    Json,
    /// RFC 7386 - merge, strategic merge and apply are all treated as this
    Merge,
}

#[derive(Clone)]
pub struct MockService {
    tracker: Arc<ObjectTracker>,
    reactors: Arc<Vec<Reactor>>,
    actions: ActionLog,
}

impl MockService {
    pub fn new(tracker: Arc<ObjectTracker>, reactors: Vec<Reactor>, actions: ActionLog) -> Self {
        Self {
            tracker,
            reactors: Arc::new(reactors),
            actions,
        }
    }

    /// Parse URL path to extract API info
    /// Examples:
    /// - /api/v1/namespaces/default/pods
    /// - /apis/hobbyfarm.io/v1/namespaces/default/environments/env-1
    /// - /api/v1/nodes/node-1 (cluster-scoped)
    fn parse_path(path: &str) -> Option<ParsedPath> {
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        let (group, version_idx) = match parts.first() {
            Some(&"api") => (String::new(), 1),
            Some(&"apis") if parts.len() > 2 => (parts[1].to_string(), 2),
            _ => return None,
        };

        let version = parts.get(version_idx)?.to_string();
        let rest = &parts[version_idx + 1..];

        let (namespace, rest) = match rest {
            ["namespaces", ns, tail @ ..] if !tail.is_empty() => (Some(ns.to_string()), tail),
            _ => (None, rest),
        };

        let (resource, name) = match rest {
            [resource] => (resource.to_string(), None),
            [resource, name] => (resource.to_string(), Some(name.to_string())),
            _ => return None,
        };

        Some(ParsedPath {
            gvr: GVR::new(group, version, resource),
            namespace,
            name,
        })
    }

    /// Pull the label selector and watch flag out of the query string
    fn parse_query(query: Option<&str>) -> (Option<String>, bool) {
        let mut label_selector = None;
        let mut watch = false;

        for pair in query.unwrap_or_default().split('&') {
            if let Some((key, value)) = pair.split_once('=') {
                let decoded = urlencoding::decode(value)
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| value.to_string());
                match key {
                    "labelSelector" => label_selector = Some(decoded),
                    "watch" => watch = decoded == "true" || decoded == "1",
                    _ => {}
                }
            }
        }

        (label_selector, watch)
    }

    fn determine_patch_type(content_type: Option<&str>) -> PatchType {
        match content_type {
            Some(ct) if ct.contains("application/json-patch+json") => PatchType::Json,
            _ => PatchType::Merge,
        }
    }

    fn apply_patch(existing: &mut Value, patch: &Value, patch_type: PatchType) -> crate::Result<()> {
        match patch_type {
            PatchType::Json => {
                let operations: json_patch::Patch = serde_json::from_value(patch.clone())?;
                json_patch::patch(existing, &operations)?;
            }
            PatchType::Merge => json_patch::merge(existing, patch),
        }
        Ok(())
    }

    async fn handle_request(&self, req: Request<KubeBody>) -> Result<Response<Full<Bytes>>, BoxError> {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let query = req.uri().query().map(str::to_string);
        let content_type = req
            .headers()
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = req.into_body().collect().await?.to_bytes();

        trace!("Fake API server received {} {}", method, path);

        let Some(parsed) = Self::parse_path(&path) else {
            return Ok(Self::error_response(
                StatusCode::NOT_FOUND,
                "NotFound",
                &format!("the server could not find the requested resource: {}", path),
            ));
        };
        let (label_selector, watch) = Self::parse_query(query.as_deref());

        let verb = match (method.as_str(), parsed.name.is_some()) {
            ("GET", true) => Verb::Get,
            ("GET", false) if watch => {
                return Ok(Self::error_response(
                    StatusCode::METHOD_NOT_ALLOWED,
                    "MethodNotAllowed",
                    "watch is not supported by the fake API server",
                ));
            }
            ("GET", false) => Verb::List,
            ("POST", false) => Verb::Create,
            ("PUT", true) => Verb::Update,
            ("PATCH", true) => Verb::Patch,
            ("DELETE", true) => Verb::Delete,
            ("DELETE", false) => Verb::DeleteCollection,
            _ => {
                return Ok(Self::error_response(
                    StatusCode::METHOD_NOT_ALLOWED,
                    "MethodNotAllowed",
                    &format!("{} is not allowed on {}", method, path),
                ));
            }
        };

        let object = match verb {
            Verb::Create | Verb::Update | Verb::Patch => Some(serde_json::from_slice::<Value>(&body)?),
            _ => None,
        };

        let action = Action {
            verb,
            resource: parsed.gvr.resource.clone(),
            namespace: parsed.namespace.clone(),
            name: parsed.name.clone(),
            object,
            label_selector,
        };
        self.actions.record(action.clone());

        let result = match self.reactors.iter().find_map(|reactor| reactor.react(&action)) {
            Some(reaction) => reaction.map(|value| Self::shape_reaction(&parsed.gvr, verb, value)),
            None => self.dispatch(&parsed, &action, content_type.as_deref()),
        };

        Ok(match result {
            Ok(value) if verb == Verb::Create => Self::json_response(StatusCode::CREATED, &value),
            Ok(value) => Self::json_response(StatusCode::OK, &value),
            Err(err) => Self::error_to_response(&err),
        })
    }

    /// Route one recorded action into the tracker
    fn dispatch(
        &self,
        parsed: &ParsedPath,
        action: &Action,
        content_type: Option<&str>,
    ) -> crate::Result<Value> {
        let gvr = &parsed.gvr;
        let namespace = parsed.namespace.as_deref().unwrap_or("");
        let name = parsed.name.as_deref().unwrap_or("");
        let selector = LabelSelector::parse(action.label_selector.as_deref().unwrap_or(""))?;
        let body = || {
            action
                .object
                .clone()
                .ok_or_else(|| Error::InvalidRequest("request body is required".to_string()))
        };

        match action.verb {
            Verb::Get => self.tracker.get(gvr, namespace, name),
            Verb::List => {
                let items = self
                    .tracker
                    .list(gvr, parsed.namespace.as_deref(), &selector)?;
                Ok(self.list_object(gvr, items))
            }
            Verb::Create => {
                let mut object = body()?;
                Self::default_type_meta(gvr, &mut object);
                self.tracker.create(gvr, object, namespace)
            }
            Verb::Update => {
                let mut object = body()?;
                Self::default_type_meta(gvr, &mut object);
                if object.pointer("/metadata/name").and_then(Value::as_str) != Some(name) {
                    return Err(Error::InvalidRequest(format!(
                        "the name of the object does not match the name on the URL: {}",
                        name
                    )));
                }
                self.tracker.update(gvr, object, namespace)
            }
            Verb::Patch => {
                let patch = body()?;
                let mut existing = self.tracker.get(gvr, namespace, name)?;
                Self::apply_patch(&mut existing, &patch, Self::determine_patch_type(content_type))?;
                self.tracker.update(gvr, existing, namespace)
            }
            Verb::Delete => self.tracker.delete(gvr, namespace, name),
            Verb::DeleteCollection => {
                let removed = self.tracker.delete_collection(gvr, namespace, &selector)?;
                Ok(self.list_object(gvr, removed))
            }
        }
    }

    /// Reactions to list verbs hand back bare arrays; wrap them like the tracker would
    fn shape_reaction(gvr: &GVR, verb: Verb, value: Value) -> Value {
        match (verb, value) {
            (Verb::List | Verb::DeleteCollection, Value::Array(items)) => json!({
                "kind": "List",
                "apiVersion": gvr.api_version(),
                "metadata": { "resourceVersion": "" },
                "items": items,
            }),
            (_, value) => value,
        }
    }

    fn list_object(&self, gvr: &GVR, items: Vec<Value>) -> Value {
        let kind = items
            .first()
            .and_then(|item| item.get("kind"))
            .and_then(Value::as_str)
            .map(|kind| format!("{}List", kind))
            .unwrap_or_else(|| "List".to_string());

        json!({
            "kind": kind,
            "apiVersion": gvr.api_version(),
            "metadata": { "resourceVersion": self.tracker.resource_version() },
            "items": items,
        })
    }

    fn default_type_meta(gvr: &GVR, object: &mut Value) {
        if object.get("apiVersion").is_none() {
            object["apiVersion"] = json!(gvr.api_version());
        }
    }

    /// Render a crate error as a Kubernetes `Status` object
    fn error_to_response(err: &Error) -> Response<Full<Bytes>> {
        let (status, reason) = err.status();
        Self::error_response(status, reason, &err.to_string())
    }

    fn error_response(status: StatusCode, reason: &str, message: &str) -> Response<Full<Bytes>> {
        let body = json!({
            "kind": "Status",
            "apiVersion": "v1",
            "metadata": {},
            "status": "Failure",
            "message": message,
            "reason": reason,
            "code": status.as_u16(),
        });
        Self::json_response(status, &body)
    }

    fn json_response(status: StatusCode, body: &Value) -> Response<Full<Bytes>> {
        let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
        *response.status_mut() = status;
        response.headers_mut().insert(
            http::header::CONTENT_TYPE,
            http::HeaderValue::from_static("application/json"),
        );
        response
    }
}

impl Service<Request<KubeBody>> for MockService {
    type Response = Response<Full<Bytes>>;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<KubeBody>) -> Self::Future {
        let this = self.clone();
        async move { this.handle_request(req).await }.boxed()
    }
}
