use thiserror::Error;

/// Errors raised by the core document model and the reconciliation engine.
#[derive(Debug, Error)]
pub enum FnError {
    #[error("no resources present in the resourcelist")]
    EmptyResourceList,

    #[error("mandatory Kptfile is missing from the package")]
    MissingKptfile,

    #[error("invalid Kptfile: {0}")]
    InvalidKptfile(String),

    #[error("gvk not initialized, got: {0}")]
    InvalidCoordinate(String),

    #[error("gvk or name not initialized, got: {0}")]
    InvalidReference(String),

    #[error("wildcard reference cannot be used here: {0}")]
    WildcardTarget(String),

    #[error("invalid object: {0}")]
    InvalidObject(String),

    #[error("field `{field}` of {reference} is not a mapping")]
    MalformedSubtree { reference: String, field: String },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FnError {
    pub fn invalid_object(msg: impl Into<String>) -> Self {
        Self::InvalidObject(msg.into())
    }

    pub fn invalid_kptfile(msg: impl Into<String>) -> Self {
        Self::InvalidKptfile(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, FnError>;
