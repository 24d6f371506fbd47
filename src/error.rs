use http::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Resource not found: {kind} {name} in namespace {namespace}")]
    NotFound {
        kind: String,
        name: String,
        namespace: String,
    },

    #[error("Resource already exists: {kind} {name} in namespace {namespace}")]
    AlreadyExists {
        kind: String,
        name: String,
        namespace: String,
    },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("JSON patch error: {0}")]
    PatchError(#[from] json_patch::PatchError),

    #[error("Kubernetes API error: {0}")]
    Api(kube::Error),

    #[error("Gave up after {attempts} attempts")]
    RetryExhausted { attempts: u32 },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to access object metadata: {0}")]
    MetadataError(String),
}

impl Error {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// Conflicts and transient store outages are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Conflict(_) | Error::Unavailable(_))
    }

    /// Status code and reason used when the fake API server reports this error.
    pub fn status(&self) -> (StatusCode, &'static str) {
        match self {
            Error::NotFound { .. } => (StatusCode::NOT_FOUND, "NotFound"),
            Error::AlreadyExists { .. } => (StatusCode::CONFLICT, "AlreadyExists"),
            Error::Conflict(_) => (StatusCode::CONFLICT, "Conflict"),
            Error::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "ServiceUnavailable"),
            Error::InvalidRequest(_) | Error::SerializationError(_) | Error::PatchError(_) => {
                (StatusCode::BAD_REQUEST, "BadRequest")
            }
            Error::MetadataError(_) => (StatusCode::UNPROCESSABLE_ENTITY, "Invalid"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "InternalError"),
        }
    }
}

impl From<kube::Error> for Error {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(response) => match (response.code, response.reason.as_str()) {
                (404, _) => Error::NotFound {
                    kind: String::new(),
                    name: String::new(),
                    namespace: String::new(),
                },
                (409, "AlreadyExists") => Error::AlreadyExists {
                    kind: String::new(),
                    name: String::new(),
                    namespace: String::new(),
                },
                (409, _) => Error::Conflict(response.message),
                (429 | 503 | 504, _) => Error::Unavailable(response.message),
                _ => Error::Api(kube::Error::Api(response)),
            },
            other => Error::Api(other),
        }
    }
}
