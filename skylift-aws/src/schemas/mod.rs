//! AWS resource schema definitions

pub mod cloudfront;
pub mod ec2;
pub mod ecs;
pub mod iam;
pub mod route53;
pub mod s3;
pub mod types;

use std::collections::HashMap;

use log::debug;
use skylift_core::provider::AWS_PROVIDER_TYPE;
use skylift_core::schema::{AttributeSchema, ResourceSchema};
use skylift_core::stack::Stack;

use crate::error::ComposeError;

/// Explicit regional provider
pub fn provider_schema() -> ResourceSchema {
    ResourceSchema::new(AWS_PROVIDER_TYPE)
        .attribute(AttributeSchema::new("region", types::aws_region()).required())
}

/// Returns all AWS schemas
pub fn all_schemas() -> Vec<ResourceSchema> {
    let mut schemas = vec![provider_schema()];
    schemas.extend(s3::schemas());
    schemas.extend(cloudfront::schemas());
    schemas.extend(iam::schemas());
    schemas.extend(route53::schemas());
    schemas.extend(ec2::schemas());
    schemas.extend(ecs::schemas());
    schemas
}

pub fn schema_for(resource_type: &str) -> Option<ResourceSchema> {
    all_schemas()
        .into_iter()
        .find(|s| s.resource_type == resource_type)
}

/// Check every declared resource against its type's schema
///
/// Stops at the first resource with an unknown type or invalid attributes.
pub fn validate_stack(stack: &Stack) -> Result<(), ComposeError> {
    let schemas: HashMap<String, ResourceSchema> = all_schemas()
        .into_iter()
        .map(|s| (s.resource_type.clone(), s))
        .collect();

    for resource in stack.resources() {
        let schema = schemas
            .get(&resource.id.resource_type)
            .ok_or_else(|| ComposeError::UnknownResourceType(resource.id.resource_type.clone()))?;
        schema
            .validate(&resource.attributes)
            .map_err(|errors| ComposeError::Schema {
                resource: resource.id.to_string(),
                errors,
            })?;
        debug!("{} passed schema validation", resource.id);
    }
    Ok(())
}
