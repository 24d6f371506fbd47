//! Typed access to form bodies and query strings

use super::response::ApiError;
use axum::extract::rejection::FormRejection;
use axum::extract::Form;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use tracing::debug;

/// A form body as extracted, with the rejection deferred to the handler
pub type FormBody = Result<Form<HashMap<String, String>>, FormRejection>;

/// Submitted form or query values, where an empty value counts as absent
#[derive(Debug, Clone, Default)]
pub struct Fields(HashMap<String, String>);

impl Fields {
    pub fn new(values: HashMap<String, String>) -> Self {
        Self(values)
    }

    /// Fields of a form body. A request without a form content type has no
    /// fields; a form body that cannot be decoded is a 400.
    pub fn from_body(body: FormBody) -> Result<Self, ApiError> {
        match body {
            Ok(Form(values)) => Ok(Self(values)),
            Err(FormRejection::InvalidFormContentType(_)) => Ok(Self::default()),
            Err(rejection) => {
                debug!("Rejected form body: {}", rejection.body_text());
                Err(ApiError::BadRequest("error parsing form".to_string()))
            }
        }
    }

    /// The value of `name`, or 400 when it is missing or empty
    pub fn required(&self, name: &str) -> Result<&str, ApiError> {
        self.optional(name)
            .ok_or_else(|| ApiError::BadRequest(format!("no {} passed in", name)))
    }

    pub fn optional(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str).filter(|value| !value.is_empty())
    }

    /// The value as sent, empty when absent
    pub fn raw(&self, name: &str) -> &str {
        self.0.get(name).map(String::as_str).unwrap_or_default()
    }

    /// Decode a JSON document carried inside a single field
    pub fn parse_json_field<T: DeserializeOwned>(name: &str, raw: &str) -> Result<T, ApiError> {
        serde_json::from_str(raw).map_err(|e| {
            debug!("Failed to parse {}: {}", name, e);
            ApiError::BadRequest(format!("error parsing {}", name))
        })
    }

    /// `parse_json_field` over a required field
    pub fn required_json<T: DeserializeOwned>(&self, name: &str) -> Result<T, ApiError> {
        Self::parse_json_field(name, self.required(name)?)
    }

    /// `parse_json_field` over an optional field; absent stays `None`
    pub fn optional_json<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, ApiError> {
        self.optional(name)
            .map(|raw| Self::parse_json_field(name, raw))
            .transpose()
    }
}

impl From<HashMap<String, String>> for Fields {
    fn from(values: HashMap<String, String>) -> Self {
        Self::new(values)
    }
}
