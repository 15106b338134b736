// src/error.rs

use thiserror::Error;

/// Column-inference failures raised by the reshaper.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InferenceError {
    /// No column satisfied any predicate for a required role.
    #[error("no {role} column found among [{columns}]")]
    Missing { role: String, columns: String },

    /// Several columns matched the winning predicate and the role rejects ties.
    #[error("ambiguous {role} column: {candidates:?} all match rule `{rule}`")]
    Ambiguous {
        role: String,
        rule: String,
        candidates: Vec<String>,
    },

    /// An explicitly configured column is absent from the table.
    #[error("configured {role} column `{column}` not present in table")]
    NotPresent { role: String, column: String },
}

/// Failures while pivoting or joining normalized sources.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MergeError {
    /// Two rows in one source share a (country_code, year, indicator) key.
    #[error("source `{source_name}` has {count} duplicate (country_code, year, indicator) keys, first: {first:?}")]
    Collision {
        source_name: String,
        count: usize,
        first: (String, i32, String),
    },

    /// The same indicator column is produced by more than one source.
    #[error("indicator `{indicator}` is supplied by more than one source: {sources:?}")]
    DuplicateIndicator {
        indicator: String,
        sources: Vec<String>,
    },

    /// Nothing to join.
    #[error("merge needs at least one source table")]
    NoSources,
}

/// Errors building the country reference list.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("`{key}` folds to both {first} and {second}")]
    KeyConflict {
        key: String,
        first: String,
        second: String,
    },

    #[error("invalid ISO3 code `{0}`")]
    InvalidCode(String),

    #[error("duplicate ISO3 code `{0}`")]
    DuplicateCode(String),
}

/// Top-level error type of the library.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A source could not be mapped to the common long shape.
    #[error("schema inference failed for source `{source_name}`: {error}")]
    SchemaInference {
        source_name: String,
        #[source]
        error: InferenceError,
    },

    /// An indicator fetch timed out or returned a bad response.
    #[error("fetch of `{indicator}` failed: {reason}")]
    Fetch { indicator: String, reason: String },

    #[error(transparent)]
    Merge(#[from] MergeError),

    /// Boundary contract violation: the final artifact lacks required columns.
    #[error("{path} is missing required columns: {}", missing.join(", "))]
    MissingColumns { path: String, missing: Vec<String> },

    #[error(transparent)]
    Reference(#[from] ReferenceError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
