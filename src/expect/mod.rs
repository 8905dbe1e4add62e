//! Expectation documents: what correct firmware output looks like.
//!
//! Everything here is parsed and validated once at load time. Matching
//! later works on the typed [`SchemaNode`] and [`LineRule`] values only.
pub mod document;
pub mod line_rule;
pub mod schema;

pub use document::{ExpectationDocument, ExpectedResponses, DEFAULT_RESPONSE_TIMEOUT_MS};
pub use line_rule::{LineCheck, LineRule};
pub use schema::{CompareOp, JsonKind, SchemaNode};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("reception_mode '{mode}' requires expected_responses to be {required}, got {found}")]
    ModeShapeMismatch {
        mode: &'static str,
        required: &'static str,
        found: &'static str,
    },

    #[error("Unknown predicate prefix '{prefix}' at '{path}'")]
    UnknownPredicate { path: String, prefix: String },

    #[error("Invalid predicate at '{path}': {message}")]
    InvalidPredicate { path: String, message: String },

    #[error("Invalid regex at '{path}': {source}")]
    InvalidRegex {
        path: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid line rule '{response_id}': {message}")]
    InvalidLineRule { response_id: String, message: String },

    #[error("Duplicate response_id '{0}'")]
    DuplicateResponseId(String),

    #[error("Invalid setting: {0}")]
    InvalidSetting(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
