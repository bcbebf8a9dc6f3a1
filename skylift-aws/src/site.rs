//! Entry composition: the whole site stack from one configuration
//!
//! Lookups run first; everything after them is plain graph construction.

use log::info;
use skylift_core::lookup::{CertificateRegistry, HostedZone, ZoneRegistry, find_zone};
use skylift_core::policy::{AccessRequest, Decision, PolicyDocument, RequestPrincipal};
use skylift_core::program::{Outputs, Program, RenderError};
use skylift_core::provider::ProviderContext;
use skylift_core::resource::{Handle, Reference, Segment, Value};
use skylift_core::stack::Stack;

use crate::backend::{Backend, compose_backend};
use crate::cdn::{Cdn, compose_cdn};
use crate::certificate::{Certificates, EDGE_REGION, lookup_certificates};
use crate::config::SiteConfig;
use crate::dns::{AliasTarget, compose_alias_record};
use crate::edge::{EdgeFunction, compose_edge_function};
use crate::error::ComposeError;
use crate::hosting::{Hosting, compose_hosting};
use crate::iam::{
    PipelineUser, bucket_policy_document, compose_bucket_policy, compose_frontend_pipeline_user,
};
use crate::schemas::validate_stack;

const PRIMARY_PROVIDER: &str = "primary";

/// Distribution ARN that must never be able to read the bucket
const FOREIGN_DISTRIBUTION_ARN: &str =
    "arn:aws:cloudfront::000000000000:distribution/EFOREIGNDIST";

/// A fully composed site stack
pub struct Site {
    pub stack: Stack,
    pub outputs: Outputs,
    pub hosting: Hosting,
    pub edge: EdgeFunction,
    pub cdn: Cdn,
    pub record: Handle,
    pub frontend_user: PipelineUser,
    pub bucket_policy: PolicyDocument,
    pub backend: Backend,
}

impl Site {
    /// Synthesize the engine program for this stack
    pub fn program(&self, project: &str) -> Result<Program, RenderError> {
        let description = format!("Static site and API for {}", self.record_name());
        Program::render(project, &description, &self.stack, &self.outputs)
    }

    fn record_name(&self) -> &str {
        self.stack
            .get(&self.record.binding)
            .map(|r| r.id.name.as_str())
            .unwrap_or(self.stack.name())
    }
}

/// Look up certificates and the hosted zone, then compose the stack
pub async fn compose_site(
    stack_name: &str,
    config: &SiteConfig,
    certificates: &dyn CertificateRegistry,
    zones: &dyn ZoneRegistry,
) -> Result<Site, ComposeError> {
    let certs = lookup_certificates(certificates, config).await?;
    let zone = find_zone(zones, &config.domain).await?;
    compose_graph(stack_name, config, &certs, &zone)
}

/// Build and validate the resource graph from resolved lookups
pub fn compose_graph(
    stack_name: &str,
    config: &SiteConfig,
    certs: &Certificates,
    zone: &HostedZone,
) -> Result<Site, ComposeError> {
    let mut stack = Stack::new(stack_name);
    let primary = ProviderContext::declare(&mut stack, PRIMARY_PROVIDER, &config.region)?;
    let edge_ctx = ProviderContext::declare(&mut stack, EDGE_REGION, EDGE_REGION)?;

    let hosting = compose_hosting(&mut stack, &primary, config)?;
    let edge = compose_edge_function(&mut stack, &primary, &edge_ctx)?;
    let cdn = compose_cdn(
        &mut stack,
        &primary,
        config,
        &hosting.bucket,
        &edge,
        &certs.cdn.arn,
    )?;
    let record = compose_alias_record(
        &mut stack,
        &primary,
        zone,
        &config.subdomain,
        &config.domain_name(),
        AliasTarget {
            dns_name: cdn.domain_name(),
            zone_id: cdn.hosted_zone_id(),
        },
    )?;

    let frontend_user =
        compose_frontend_pipeline_user(&mut stack, &primary, &hosting.bucket, &cdn.distribution)?;
    let bucket_policy =
        bucket_policy_document(&hosting.bucket, &cdn.distribution, &frontend_user.user);
    compose_bucket_policy(
        &mut stack,
        &primary,
        &hosting.bucket,
        &hosting.public_access_block,
        &bucket_policy,
    )?;

    let backend = compose_backend(&mut stack, &primary, config, &certs.api, zone)?;

    let mut outputs = Outputs::new();
    let website_endpoint = hosting.bucket.output("websiteEndpoint");
    outputs.insert(
        "originURL",
        Value::interpolate([Segment::from("http://"), Segment::from(website_endpoint.clone())]),
    );
    outputs.insert("originHostname", website_endpoint);
    outputs.insert(
        "cdnURL",
        Value::interpolate([
            Segment::from("https://"),
            Segment::from(cdn.distribution.output("domainName")),
        ]),
    );
    outputs.insert("cdnHostname", cdn.domain_name());
    outputs.insert("domainURL", config.domain_url());
    outputs.extend(backend.outputs(config));

    // Surface ordering errors before schema errors
    stack.ordered()?;
    validate_stack(&stack)?;
    info!(
        "Composed {} resources for {} ({})",
        stack.len(),
        config.domain_name(),
        stack_name
    );

    Ok(Site {
        stack,
        outputs,
        hosting,
        edge,
        cdn,
        record,
        frontend_user,
        bucket_policy,
        backend,
    })
}

fn synthetic_arn(reference: &Reference) -> Option<String> {
    (reference.path == "arn").then(|| format!("arn:aws:synthetic:::{}", reference.binding))
}

/// Check that the bucket is readable by the site's distribution and no other
pub fn verify_bucket_isolation(site: &Site) -> Result<(), ComposeError> {
    let bucket_arn = synthetic_arn(&site.hosting.bucket.output("arn"))
        .ok_or_else(|| ComposeError::Isolation("bucket has no ARN".to_string()))?;
    let own_distribution = synthetic_arn(&site.cdn.distribution.output("arn"))
        .ok_or_else(|| ComposeError::Isolation("distribution has no ARN".to_string()))?;

    let read = |source: &str| {
        AccessRequest::new(
            RequestPrincipal::Service("cloudfront.amazonaws.com".to_string()),
            "s3:GetObject",
            format!("{}/index.html", bucket_arn),
        )
        .with_context("AWS:SourceArn", source)
    };

    if !site
        .bucket_policy
        .evaluate(&read(&own_distribution), &synthetic_arn)
        .is_allowed()
    {
        return Err(ComposeError::Isolation(
            "the site distribution cannot read the bucket".to_string(),
        ));
    }
    if site
        .bucket_policy
        .evaluate(&read(FOREIGN_DISTRIBUTION_ARN), &synthetic_arn)
        == Decision::Allow
    {
        return Err(ComposeError::Isolation(
            "a foreign distribution can read the bucket".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use skylift_core::lookup::{StaticCertificates, StaticZones};
    use skylift_core::resource::ResourceKind;

    use crate::testing::{CDN_CERT_ARN, certificates, site_config, zone};

    fn site() -> Site {
        compose_graph("dev", &site_config(), &certificates(), &zone()).unwrap()
    }

    #[test]
    fn derives_domain_and_url() {
        let site = site();
        assert_eq!(site.outputs.get("domainURL"), Some(&Value::from("https://dev.example.com")));
        let record = site.stack.get(&site.record.binding).unwrap();
        assert_eq!(record.id.name, "dev.example.com");
    }

    #[test]
    fn exports_every_endpoint() {
        let site = site();
        for name in [
            "originURL",
            "originHostname",
            "cdnURL",
            "cdnHostname",
            "domainURL",
            "backendUrl",
            "apiDomainURL",
            "repoName",
            "serviceName",
            "clusterName",
            "containerName",
        ] {
            assert!(site.outputs.get(name).is_some(), "missing output {}", name);
        }
        assert_eq!(
            site.outputs.get("originURL"),
            Some(&Value::interpolate([
                Segment::from("http://"),
                Segment::from(Reference::new("bucket", "websiteEndpoint")),
            ]))
        );
    }

    #[test]
    fn edge_function_uses_edge_provider() {
        let mut config = site_config();
        config.region = "eu-west-1".to_string();
        let site = compose_graph("dev", &config, &certificates(), &zone()).unwrap();

        let function = site.stack.get(&site.edge.function.binding).unwrap();
        assert_eq!(function.options.provider.as_deref(), Some("usEast1"));
        let bucket = site.stack.get(&site.hosting.bucket.binding).unwrap();
        assert_eq!(bucket.options.provider.as_deref(), Some("primary"));
    }

    #[test]
    fn every_resource_has_an_explicit_provider() {
        let site = site();
        for resource in site.stack.resources() {
            if resource.kind == ResourceKind::Provider {
                continue;
            }
            assert!(
                resource.options.provider.is_some(),
                "{} has no provider",
                resource.id
            );
        }
    }

    #[test]
    fn composed_site_isolates_its_bucket() {
        assert!(verify_bucket_isolation(&site()).is_ok());
    }

    #[test]
    fn program_renders_whole_stack() {
        let site = site();
        let yaml = site.program("site").unwrap().to_yaml().unwrap();
        assert!(yaml.contains("runtime: yaml"));
        assert!(yaml.contains("aws:cloudfront:Distribution"));
        assert!(yaml.contains("fn::invoke"));
    }

    #[test]
    fn synced_folder_path_is_absolute_in_program() {
        let dir = tempfile::tempdir_in(".").unwrap();
        std::fs::create_dir(dir.path().join("conf")).unwrap();
        let stack_file = dir.path().join("conf").join("Pulumi.dev.yaml");
        std::fs::write(
            &stack_file,
            "config:\n  site:domain: example.com\n  site:subdomain: dev\n",
        )
        .unwrap();

        let env = std::collections::BTreeMap::<String, String>::new();
        let config = SiteConfig::load(&stack_file, "site", &env).unwrap();
        let site = compose_graph("dev", &config, &certificates(), &zone()).unwrap();
        let program = site.program("site").unwrap();

        let path = program.document()["resources"]["bucketFolder"]["properties"]["path"]
            .as_str()
            .unwrap();
        assert!(std::path::Path::new(path).is_absolute());
        assert!(path.ends_with("www"));
    }

    #[tokio::test]
    async fn compose_site_runs_lookups() {
        let certs = StaticCertificates::single(CDN_CERT_ARN, "example.com");
        let zones = StaticZones::new(vec![zone()]);

        let site = compose_site("dev", &site_config(), &certs, &zones).await.unwrap();
        let distribution = site.stack.get(&site.cdn.distribution.binding).unwrap();
        assert_eq!(
            distribution.attributes["viewer_certificate"],
            Value::map([
                ("cloudfront_default_certificate", Value::Bool(false)),
                ("acm_certificate_arn", Value::from(CDN_CERT_ARN)),
                ("ssl_support_method", Value::from("sni-only")),
            ])
        );
    }

    #[tokio::test]
    async fn missing_zone_fails_composition() {
        let certs = StaticCertificates::single(CDN_CERT_ARN, "example.com");
        let zones = StaticZones::default();

        let err = compose_site("dev", &site_config(), &certs, &zones)
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("example.com"));
    }
}
