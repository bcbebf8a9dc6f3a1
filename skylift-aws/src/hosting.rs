//! Static hosting: website bucket, access settings and the synced site folder

use log::warn;
use skylift_core::graph::GraphError;
use skylift_core::provider::ProviderContext;
use skylift_core::resource::{Handle, Resource, ResourceKind, Value};
use skylift_core::stack::Stack;

use crate::config::SiteConfig;

/// Handles to the hosting resources
#[derive(Debug, Clone)]
pub struct Hosting {
    pub bucket: Handle,
    pub ownership_controls: Handle,
    pub public_access_block: Handle,
    pub folder: Handle,
}

pub fn compose_hosting(
    stack: &mut Stack,
    ctx: &ProviderContext,
    config: &SiteConfig,
) -> Result<Hosting, GraphError> {
    let bucket = ctx.declare_in(
        stack,
        Resource::new("aws:s3:Bucket", "bucket").with_attribute(
            "website",
            Value::map([
                ("index_document", Value::from(&config.index_document)),
                ("error_document", Value::from(&config.error_document)),
            ]),
        ),
    )?;

    let ownership_controls = ctx.declare_in(
        stack,
        Resource::new("aws:s3:BucketOwnershipControls", "ownership-controls")
            .with_attribute("bucket", bucket.attr("bucket"))
            .with_attribute(
                "rule",
                Value::map([("object_ownership", Value::from("ObjectWriter"))]),
            ),
    )?;

    let public_access_block = ctx.declare_in(
        stack,
        Resource::new("aws:s3:BucketPublicAccessBlock", "public-access-block")
            .with_attribute("bucket", bucket.attr("bucket"))
            .with_attribute("block_public_acls", true)
            .with_attribute("block_public_policy", true)
            .with_attribute("ignore_public_acls", true)
            .with_attribute("restrict_public_buckets", true),
    )?;

    if !config.path.is_dir() {
        warn!(
            "Site directory {} does not exist; the synced folder will fail to upload",
            config.path.display()
        );
    }

    // Objects are written only once both access settings are in place
    let folder = ctx.declare_in(
        stack,
        Resource::new("synced-folder:index:S3BucketFolder", "bucket-folder")
            .with_kind(ResourceKind::Component)
            .with_attribute("path", config.path.display().to_string())
            .with_attribute("bucket_name", bucket.attr("bucket"))
            .with_attribute("acl", "public-read")
            .depends_on(&ownership_controls)
            .depends_on(&public_access_block),
    )?;

    Ok(Hosting {
        bucket,
        ownership_controls,
        public_access_block,
        folder,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::site_config;

    fn compose() -> (Stack, Hosting) {
        let mut stack = Stack::new("dev");
        let ctx = ProviderContext::declare(&mut stack, "primary", "us-east-1").unwrap();
        let hosting = compose_hosting(&mut stack, &ctx, &site_config()).unwrap();
        (stack, hosting)
    }

    #[test]
    fn bucket_serves_configured_documents() {
        let (stack, hosting) = compose();
        let bucket = stack.get(&hosting.bucket.binding).unwrap();
        assert_eq!(
            bucket.attributes["website"],
            Value::map([
                ("index_document", Value::from("index.html")),
                ("error_document", Value::from("error.html")),
            ])
        );
    }

    #[test]
    fn access_block_sets_all_flags() {
        let (stack, hosting) = compose();
        let pab = stack.get(&hosting.public_access_block.binding).unwrap();
        for flag in [
            "block_public_acls",
            "block_public_policy",
            "ignore_public_acls",
            "restrict_public_buckets",
        ] {
            assert_eq!(pab.attributes[flag], Value::Bool(true), "{}", flag);
        }
    }

    #[test]
    fn sync_runs_after_access_settings() {
        let (stack, hosting) = compose();
        let order: Vec<&str> = stack
            .ordered()
            .unwrap()
            .iter()
            .map(|r| r.binding.as_str())
            .collect();
        let pos = |b: &str| order.iter().position(|x| *x == b).unwrap();

        assert!(pos(&hosting.folder.binding) > pos(&hosting.ownership_controls.binding));
        assert!(pos(&hosting.folder.binding) > pos(&hosting.public_access_block.binding));

        let folder = stack.get(&hosting.folder.binding).unwrap();
        assert_eq!(folder.kind, ResourceKind::Component);
        assert_eq!(folder.attributes["acl"], Value::from("public-read"));
    }
}
