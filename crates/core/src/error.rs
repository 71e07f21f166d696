use thiserror::Error;

/// Errors that abort a classification run.
///
/// Per-record anomalies (no matching rule, missing UID) never show up here;
/// they are reported through the session outcome instead.
#[derive(Debug, Error)]
pub enum HeuristicError {
    #[error("output key template must not be empty")]
    EmptyTemplate,
    #[error("malformed template {template:?}: expected at least two '_'-delimited fields")]
    MalformedTemplate { template: String },
    #[error("run key {key:?} collides with an existing key")]
    KeyCollision { key: String },
    #[error("series {series_id:?} is listed under {template:?} but has no record")]
    UnknownSeries { template: String, series_id: String },
    #[error("series id {series_id:?} is carried by more than one record")]
    DuplicateSeries { series_id: String },
    #[error("failed to read rule table {path}: {source}")]
    RuleIo {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse rule table {path}: {source}")]
    RuleParse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("rule table path does not exist: {0}")]
    MissingRulePath(String),
}

pub type Result<T> = std::result::Result<T, HeuristicError>;
