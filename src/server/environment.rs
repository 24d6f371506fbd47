//! Admin REST surface for environments

use super::form::{Fields, FormBody};
use super::response::{content, message, ApiError, ApiResult};
use crate::auth::{AuthGate, RbacRequest, Verb};
use crate::availability::AvailabilityOracle;
use crate::client::ResourceClient;
use crate::label_selector::LabelSelector;
use crate::resources::{Environment, EnvironmentSpec};
use crate::retry::{update_with_retry, Backoff};
use crate::utils::generate_name;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post, put};
use axum::Router;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

const RESOURCE_PLURAL: &str = "environments";
const TEMPLATES_PLURAL: &str = "virtualmachinetemplates";

#[derive(Clone)]
pub struct EnvironmentServer {
    auth: Arc<dyn AuthGate>,
    environments: ResourceClient<Environment>,
    availability: Arc<dyn AvailabilityOracle>,
    backoff: Backoff,
    shutdown: CancellationToken,
}

/// Full view returned by get
#[derive(Serialize)]
struct PreparedEnvironment<'a> {
    name: &'a str,
    #[serde(flatten)]
    spec: &'a EnvironmentSpec,
}

/// Summary returned by list; template mappings keep only their keys
#[derive(Serialize)]
struct PreparedListEnvironment<'a> {
    name: &'a str,
    display_name: &'a str,
    provider: &'a str,
    template_mapping: BTreeMap<&'a str, BTreeMap<String, String>>,
}

impl EnvironmentServer {
    pub fn new(
        auth: Arc<dyn AuthGate>,
        environments: ResourceClient<Environment>,
        availability: Arc<dyn AvailabilityOracle>,
        backoff: Backoff,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            auth,
            environments,
            availability,
            backoff,
            shutdown,
        }
    }

    pub fn routes(self) -> Router {
        Router::new()
            .route("/a/environment/list", get(list))
            .route("/a/environment/create", post(create))
            .route("/a/environment/{id}", get(get_one).delete(remove))
            .route("/a/environment/{id}/update", put(update))
            .route("/a/environment/{id}/available", post(available))
            .with_state(self)
    }

    async fn grant(&self, headers: &HeaderMap, verb: Verb, denied: &'static str) -> Result<(), ApiError> {
        self.auth
            .grant(headers, &RbacRequest::new().permission(RESOURCE_PLURAL, verb))
            .await
            .map(|_| ())
            .map_err(ApiError::forbidden(denied))
    }
}

async fn list(State(server): State<EnvironmentServer>, headers: HeaderMap) -> ApiResult {
    server
        .grant(&headers, Verb::List, "no access to list environments")
        .await?;

    let environments = server
        .environments
        .list(&LabelSelector::new())
        .await
        .map_err(ApiError::from_store("error listing all environments"))?;

    let prepared: Vec<PreparedListEnvironment<'_>> = environments
        .iter()
        .map(|env| PreparedListEnvironment {
            name: env.metadata.name.as_deref().unwrap_or_default(),
            display_name: &env.spec.display_name,
            provider: &env.spec.provider,
            template_mapping: env
                .spec
                .template_mapping
                .keys()
                .map(|template| (template.as_str(), BTreeMap::new()))
                .collect(),
        })
        .collect();

    info!("Listed {} environments", prepared.len());
    content(&prepared)
}

async fn get_one(
    State(server): State<EnvironmentServer>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult {
    server
        .grant(&headers, Verb::Get, "no access to get environment")
        .await?;

    let env = server
        .environments
        .get(&id)
        .await
        .map_err(ApiError::from_store("error retrieving environment"))?;

    content(&PreparedEnvironment {
        name: &id,
        spec: &env.spec,
    })
}

async fn create(
    State(server): State<EnvironmentServer>,
    headers: HeaderMap,
    body: FormBody,
) -> ApiResult {
    server
        .grant(&headers, Verb::Create, "no access to create environments")
        .await?;

    let fields = Fields::from_body(body)?;
    let display_name = fields.required("display_name")?;
    let provider = fields.required("provider")?;
    let template_mapping = fields.required("template_mapping")?;
    let environment_specifics = fields.required("environment_specifics")?;
    let count_capacity = fields.required("count_capacity")?;
    let ip_translation_map = fields.required("ip_translation_map")?;
    let ws_endpoint = fields.required("ws_endpoint")?;

    let spec = EnvironmentSpec {
        display_name: display_name.to_string(),
        dnssuffix: fields.raw("dnssuffix").to_string(),
        provider: provider.to_string(),
        template_mapping: Fields::parse_json_field("template_mapping", template_mapping)?,
        count_capacity: Fields::parse_json_field("count_capacity", count_capacity)?,
        environment_specifics: Fields::parse_json_field("environment_specifics", environment_specifics)?,
        ip_translation_map: Fields::parse_json_field("ip_translation_map", ip_translation_map)?,
        ws_endpoint: ws_endpoint.to_string(),
    };

    let mut env = Environment::new(&generate_name("env-"), spec);
    env.metadata.namespace = Some(server.environments.namespace().to_string());

    let created = server
        .environments
        .create(&env)
        .await
        .map_err(ApiError::from_store("error creating environment"))?;

    let name = created.metadata.name.unwrap_or_default();
    info!("Created environment {}", name);
    Ok(message(StatusCode::CREATED, "created", name))
}

async fn update(
    State(server): State<EnvironmentServer>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: FormBody,
) -> ApiResult {
    server
        .grant(&headers, Verb::Update, "no access to update environment")
        .await?;

    let fields = Fields::from_body(body)?;
    let display_name = fields.optional("display_name").map(str::to_string);
    let dnssuffix = fields.raw("dnssuffix").to_string();
    let provider = fields.optional("provider").map(str::to_string);
    let template_mapping: Option<BTreeMap<String, BTreeMap<String, String>>> =
        fields.optional_json("template_mapping")?;
    let environment_specifics: Option<BTreeMap<String, String>> =
        fields.optional_json("environment_specifics")?;
    let count_capacity: Option<BTreeMap<String, i32>> = fields.optional_json("count_capacity")?;
    let ip_translation_map: Option<BTreeMap<String, String>> =
        fields.optional_json("ip_translation_map")?;
    let ws_endpoint = fields.optional("ws_endpoint").map(str::to_string);

    let cancel = server.shutdown.child_token();
    update_with_retry(&server.environments, &id, &server.backoff, &cancel, |mut env: Environment| {
        let spec = &mut env.spec;
        if let Some(display_name) = &display_name {
            spec.display_name = display_name.clone();
        }
        // an empty suffix is a legitimate value
        spec.dnssuffix = dnssuffix.clone();
        if let Some(provider) = &provider {
            spec.provider = provider.clone();
        }
        if let Some(template_mapping) = &template_mapping {
            spec.template_mapping = template_mapping.clone();
        }
        if let Some(environment_specifics) = &environment_specifics {
            spec.environment_specifics = environment_specifics.clone();
        }
        if let Some(count_capacity) = &count_capacity {
            spec.count_capacity = count_capacity.clone();
        }
        if let Some(ip_translation_map) = &ip_translation_map {
            spec.ip_translation_map = ip_translation_map.clone();
        }
        if let Some(ws_endpoint) = &ws_endpoint {
            spec.ws_endpoint = ws_endpoint.clone();
        }
        Ok(env)
    })
    .await
    .map_err(ApiError::from_store("error attempting to update"))?;

    info!("Updated environment {}", id);
    Ok(message(StatusCode::OK, "updated", ""))
}

async fn remove(
    State(server): State<EnvironmentServer>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult {
    server
        .grant(&headers, Verb::Delete, "no access to delete environment")
        .await?;

    server
        .environments
        .delete(&id)
        .await
        .map_err(ApiError::from_store("error deleting environment"))?;

    info!("Deleted environment {}", id);
    Ok(message(StatusCode::OK, "deleted", id))
}

async fn available(
    State(server): State<EnvironmentServer>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: FormBody,
) -> ApiResult {
    let request = RbacRequest::new()
        .permission(RESOURCE_PLURAL, Verb::List)
        .permission(TEMPLATES_PLURAL, Verb::List);
    server
        .auth
        .grant(&headers, &request)
        .await
        .map_err(ApiError::forbidden("no access to get environment"))?;

    let fields = Fields::from_body(body)?;
    let (Some(start), Some(end)) = (fields.optional("start"), fields.optional("end")) else {
        return Err(ApiError::BadRequest("start or end time not provided".to_string()));
    };

    let max = server
        .availability
        .max_available(&id, start, end)
        .await
        .map_err(ApiError::from_store("error getting max available vms for environment"))?;

    info!("Retrieved max available in environment {}", id);
    content(&max)
}
