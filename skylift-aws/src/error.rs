use skylift_core::graph::GraphError;
use skylift_core::lookup::LookupError;
use skylift_core::schema::TypeError;
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error("No schema for resource type '{0}'")]
    UnknownResourceType(String),

    #[error("Invalid attributes on {resource}: {}", join_errors(.errors))]
    Schema {
        resource: String,
        errors: Vec<TypeError>,
    },

    #[error("Bucket policy check failed: {0}")]
    Isolation(String),
}

fn join_errors(errors: &[TypeError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
