//! Provider - Explicit provider context threaded through every composer
//!
//! Nothing in a composition reads ambient account or region state. Each
//! composer receives a `ProviderContext` naming the region it targets and
//! the explicit provider resource its resources are bound to.

use crate::graph::GraphError;
use crate::resource::{Handle, Resource, ResourceKind};
use crate::stack::Stack;

/// Engine type token of the AWS provider resource
pub const AWS_PROVIDER_TYPE: &str = "pulumi:providers:aws";

/// Region and provider binding for a group of resources
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderContext {
    region: String,
    provider: Handle,
}

impl ProviderContext {
    /// Declare an explicit AWS provider for `region` and return its context
    pub fn declare(
        stack: &mut Stack,
        name: &str,
        region: &str,
    ) -> Result<Self, GraphError> {
        let provider = stack.declare(
            Resource::new(AWS_PROVIDER_TYPE, name)
                .with_kind(ResourceKind::Provider)
                .with_attribute("region", region),
        )?;
        Ok(Self {
            region: region.to_string(),
            provider,
        })
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn provider(&self) -> &Handle {
        &self.provider
    }

    /// Bind a resource to this context's provider
    pub fn bind(&self, resource: Resource) -> Resource {
        resource.with_provider(&self.provider)
    }

    /// Bind and declare in one step
    pub fn declare_in(&self, stack: &mut Stack, resource: Resource) -> Result<Handle, GraphError> {
        stack.declare(self.bind(resource))
    }
}
