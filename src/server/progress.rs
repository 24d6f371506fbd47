//! REST surface for scenario progress
//!
//! Admin routes list progress by scheduled event, user or creation window.
//! Self-service routes let a user record steps and list their own progress.

use super::form::{Fields, FormBody};
use super::response::{content, message, ApiError, ApiResult};
use crate::auth::{AuthGate, Principal, RbacRequest, Verb};
use crate::client::ResourceClient;
use crate::label_selector::LabelSelector;
use crate::resources::{
    Progress, ProgressSpec, ProgressStep, FINISHED_LABEL, SCHEDULED_EVENT_LABEL, SESSION_LABEL,
    USER_LABEL,
};
use crate::retry::{update_with_retry, Backoff};
use crate::utils::{format_unix_date, parse_unix_date};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

const RESOURCE_PLURAL: &str = "progresses";

#[derive(Clone)]
pub struct ProgressServer {
    auth: Arc<dyn AuthGate>,
    progresses: ResourceClient<Progress>,
    backoff: Backoff,
    shutdown: CancellationToken,
}

#[derive(Serialize)]
struct AdminPreparedProgress<'a> {
    id: &'a str,
    session: &'a str,
    #[serde(flatten)]
    spec: &'a ProgressSpec,
}

#[derive(Serialize)]
struct AdminPreparedProgressWithScheduledEvent<'a> {
    #[serde(flatten)]
    progress: AdminPreparedProgress<'a>,
    scheduled_event: &'a str,
}

fn label<'a>(progress: &'a Progress, key: &str) -> &'a str {
    progress
        .metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(key))
        .map(String::as_str)
        .unwrap_or_default()
}

fn prepare(progress: &Progress) -> AdminPreparedProgress<'_> {
    AdminPreparedProgress {
        id: progress.metadata.name.as_deref().unwrap_or_default(),
        session: label(progress, SESSION_LABEL),
        spec: &progress.spec,
    }
}

/// `includeFinished` is on unless absent, empty or `false`
fn include_finished(query: &Fields) -> bool {
    query.optional("includeFinished").is_some_and(|value| value != "false")
}

impl ProgressServer {
    pub fn new(
        auth: Arc<dyn AuthGate>,
        progresses: ResourceClient<Progress>,
        backoff: Backoff,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            auth,
            progresses,
            backoff,
            shutdown,
        }
    }

    pub fn routes(self) -> Router {
        Router::new()
            .route("/a/progress/scheduledevent/{id}", get(list_by_scheduled_event))
            .route("/a/progress/user/{id}", get(list_by_user))
            .route("/a/progress/count", get(count_by_scheduled_event))
            .route("/a/progress/range", get(list_by_range))
            .route("/progress/update/{id}", post(update))
            .route("/progress/list", get(list_for_user))
            .with_state(self)
    }

    async fn grant_list(&self, headers: &HeaderMap) -> Result<(), ApiError> {
        self.auth
            .grant(headers, &RbacRequest::new().permission(RESOURCE_PLURAL, Verb::List))
            .await
            .map(|_| ())
            .map_err(ApiError::forbidden("no access to list progress"))
    }

    async fn authenticate(&self, headers: &HeaderMap, denied: &'static str) -> Result<Principal, ApiError> {
        self.auth
            .authenticate(headers)
            .await
            .map_err(ApiError::forbidden(denied))
    }

    async fn list_by_label(&self, key: &str, value: &str, include_finished: bool) -> ApiResult {
        let mut selector = LabelSelector::new().eq(key, value);
        if !include_finished {
            selector = selector.eq(FINISHED_LABEL, "false");
        }

        let progresses = self
            .progresses
            .list(&selector)
            .await
            .map_err(ApiError::from_store("error listing progress"))?;

        let prepared: Vec<_> = progresses.iter().map(prepare).collect();
        content(&prepared)
    }
}

async fn list_by_scheduled_event(
    State(server): State<ProgressServer>,
    Path(id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> ApiResult {
    server.grant_list(&headers).await?;

    let include_finished = include_finished(&Fields::from(query));
    let response = server
        .list_by_label(SCHEDULED_EVENT_LABEL, &id, include_finished)
        .await?;

    info!("Listed progress for scheduled event {}", id);
    Ok(response)
}

async fn list_by_user(
    State(server): State<ProgressServer>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult {
    server.grant_list(&headers).await?;

    let response = server.list_by_label(USER_LABEL, &id, true).await?;
    info!("Listed progress for user {}", id);
    Ok(response)
}

async fn count_by_scheduled_event(State(server): State<ProgressServer>, headers: HeaderMap) -> ApiResult {
    server.grant_list(&headers).await?;

    let active = server
        .progresses
        .list(&LabelSelector::new().eq(FINISHED_LABEL, "false"))
        .await
        .map_err(ApiError::from_store("error listing progress"))?;

    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for progress in &active {
        *counts.entry(label(progress, SCHEDULED_EVENT_LABEL)).or_default() += 1;
    }

    content(&counts)
}

async fn list_by_range(
    State(server): State<ProgressServer>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> ApiResult {
    server.grant_list(&headers).await?;

    let query = Fields::from(query);
    let from = query
        .optional("from")
        .ok_or_else(|| ApiError::BadRequest("no start of range passed in".to_string()))?;
    let start = parse_unix_date(from)
        .map_err(|_| ApiError::BadRequest("error parsing start time".to_string()))?;
    let to = query
        .optional("to")
        .ok_or_else(|| ApiError::BadRequest("no end of range passed in".to_string()))?;
    let end = parse_unix_date(to)
        .map_err(|_| ApiError::BadRequest("error parsing end time".to_string()))?;

    let progresses = server
        .progresses
        .list(&LabelSelector::new())
        .await
        .map_err(ApiError::from_store("error listing progress"))?;

    let prepared: Vec<_> = progresses
        .iter()
        .filter(|progress| {
            progress
                .metadata
                .creation_timestamp
                .as_ref()
                .is_some_and(|created| created.0 >= start && created.0 <= end)
        })
        .map(|progress| AdminPreparedProgressWithScheduledEvent {
            progress: prepare(progress),
            scheduled_event: label(progress, SCHEDULED_EVENT_LABEL),
        })
        .collect();

    info!("Listed {} progress records for time range", prepared.len());
    content(&prepared)
}

async fn update(
    State(server): State<ProgressServer>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: FormBody,
) -> ApiResult {
    let now = format_unix_date(&Utc::now());
    let user = server
        .authenticate(&headers, "no access to update progress")
        .await?;

    let fields = Fields::from_body(body)?;
    let step: i32 = fields
        .optional("step")
        .ok_or_else(|| ApiError::BadRequest("no step was passed in".to_string()))?
        .parse()
        .map_err(|_| ApiError::BadRequest("provided step was invalid".to_string()))?;

    let selector = LabelSelector::new()
        .eq(SESSION_LABEL, id.as_str())
        .eq(USER_LABEL, user.name.as_str())
        .eq(FINISHED_LABEL, "false");
    let active = server
        .progresses
        .list(&selector)
        .await
        .map_err(ApiError::from_store("error listing progress"))?;

    if active.is_empty() {
        return Err(ApiError::NotFound(
            "no active progress for this session found".to_string(),
        ));
    }

    let cancel = server.shutdown.child_token();
    for progress in active {
        let name = progress.metadata.name.unwrap_or_default();
        update_with_retry(&server.progresses, &name, &server.backoff, &cancel, |mut progress: Progress| {
            let spec = &mut progress.spec;
            spec.max_step = spec.max_step.max(step);
            spec.current_step = step;
            spec.last_update = now.clone();
            spec.steps.push(ProgressStep {
                step,
                timestamp: now.clone(),
            });
            Ok(progress)
        })
        .await
        .map_err(ApiError::from_store("progress could not be updated"))?;
    }

    info!("Recorded step {} for session {} of {}", step, id, user.name);
    Ok(message(StatusCode::OK, "success", "Progress was updated"))
}

async fn list_for_user(State(server): State<ProgressServer>, headers: HeaderMap) -> ApiResult {
    let user = server
        .authenticate(&headers, "no access to list progress")
        .await?;

    server.list_by_label(USER_LABEL, &user.name, true).await
}
