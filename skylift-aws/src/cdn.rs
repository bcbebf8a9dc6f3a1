//! CloudFront distribution in front of the site bucket

use skylift_core::graph::GraphError;
use skylift_core::provider::ProviderContext;
use skylift_core::resource::{Handle, Resource, Value};
use skylift_core::stack::Stack;

use crate::config::SiteConfig;
use crate::edge::EdgeFunction;

const CACHE_TTL_SECONDS: i64 = 600;
const PRICE_CLASS: &str = "PriceClass_100";
const CACHED_METHODS: [&str; 3] = ["GET", "HEAD", "OPTIONS"];

#[derive(Debug, Clone)]
pub struct Cdn {
    pub origin_access_control: Handle,
    pub distribution: Handle,
}

impl Cdn {
    pub fn domain_name(&self) -> Value {
        self.distribution.attr("domainName")
    }

    pub fn hosted_zone_id(&self) -> Value {
        self.distribution.attr("hostedZoneId")
    }
}

pub fn compose_cdn(
    stack: &mut Stack,
    ctx: &ProviderContext,
    config: &SiteConfig,
    bucket: &Handle,
    edge: &EdgeFunction,
    certificate_arn: &str,
) -> Result<Cdn, GraphError> {
    let origin_access_control = ctx.declare_in(
        stack,
        Resource::new("aws:cloudfront:OriginAccessControl", "oac")
            .with_attribute("name", format!("{}-oac", config.domain_name()))
            .with_attribute("origin_access_control_origin_type", "s3")
            .with_attribute("signing_behavior", "always")
            .with_attribute("signing_protocol", "sigv4"),
    )?;

    let origin = Value::map([
        ("origin_id", bucket.arn()),
        ("domain_name", bucket.attr("bucketRegionalDomainName")),
        ("origin_access_control_id", origin_access_control.id()),
    ]);

    let default_cache_behavior = Value::map([
        ("target_origin_id", bucket.arn()),
        ("viewer_protocol_policy", Value::from("redirect-to-https")),
        ("allowed_methods", Value::list(CACHED_METHODS)),
        ("cached_methods", Value::list(CACHED_METHODS)),
        ("default_ttl", Value::Int(CACHE_TTL_SECONDS)),
        ("max_ttl", Value::Int(CACHE_TTL_SECONDS)),
        ("min_ttl", Value::Int(CACHE_TTL_SECONDS)),
        (
            "forwarded_values",
            Value::map([
                ("query_string", Value::Bool(true)),
                ("cookies", Value::map([("forward", Value::from("all"))])),
            ]),
        ),
        (
            "lambda_function_associations",
            Value::list([Value::map([
                ("event_type", Value::from("origin-request")),
                ("lambda_arn", edge.qualified_arn()),
                ("include_body", Value::Bool(false)),
            ])]),
        ),
    ]);

    let distribution = ctx.declare_in(
        stack,
        Resource::new("aws:cloudfront:Distribution", "cdn")
            .with_attribute("enabled", true)
            .with_attribute("origins", Value::list([origin]))
            .with_attribute("default_root_object", &config.index_document)
            .with_attribute("default_cache_behavior", default_cache_behavior)
            .with_attribute("price_class", PRICE_CLASS)
            .with_attribute(
                "custom_error_responses",
                Value::list([Value::map([
                    ("error_code", Value::Int(404)),
                    ("response_code", Value::Int(404)),
                    (
                        "response_page_path",
                        Value::from(format!("/{}", config.error_document)),
                    ),
                ])]),
            )
            .with_attribute(
                "restrictions",
                Value::map([(
                    "geo_restriction",
                    Value::map([("restriction_type", Value::from("none"))]),
                )]),
            )
            .with_attribute("aliases", Value::list([config.domain_name()]))
            .with_attribute(
                "viewer_certificate",
                Value::map([
                    ("cloudfront_default_certificate", Value::Bool(false)),
                    ("acm_certificate_arn", Value::from(certificate_arn)),
                    ("ssl_support_method", Value::from("sni-only")),
                ]),
            ),
    )?;

    Ok(Cdn {
        origin_access_control,
        distribution,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate::EDGE_REGION;
    use crate::edge::compose_edge_function;
    use crate::hosting::compose_hosting;
    use crate::testing::{CDN_CERT_ARN, site_config};

    fn distribution() -> Resource {
        let mut stack = Stack::new("dev");
        let primary = ProviderContext::declare(&mut stack, "primary", "us-east-1").unwrap();
        let edge_ctx = ProviderContext::declare(&mut stack, EDGE_REGION, EDGE_REGION).unwrap();
        let config = site_config();
        let hosting = compose_hosting(&mut stack, &primary, &config).unwrap();
        let edge = compose_edge_function(&mut stack, &primary, &edge_ctx).unwrap();
        let cdn = compose_cdn(&mut stack, &primary, &config, &hosting.bucket, &edge, CDN_CERT_ARN)
            .unwrap();
        stack.get(&cdn.distribution.binding).unwrap().clone()
    }

    fn field<'a>(value: &'a Value, key: &str) -> &'a Value {
        match value {
            Value::Map(map) => &map[key],
            other => panic!("Expected map, got {:?}", other),
        }
    }

    #[test]
    fn cache_behavior_matches_site_defaults() {
        let cdn = distribution();
        let behavior = &cdn.attributes["default_cache_behavior"];

        assert_eq!(field(behavior, "viewer_protocol_policy"), &Value::from("redirect-to-https"));
        for ttl in ["min_ttl", "default_ttl", "max_ttl"] {
            assert_eq!(field(behavior, ttl), &Value::Int(600));
        }
        assert_eq!(
            field(behavior, "allowed_methods"),
            &Value::list(["GET", "HEAD", "OPTIONS"])
        );

        let Value::List(associations) = field(behavior, "lambda_function_associations") else {
            panic!("Expected list");
        };
        assert_eq!(field(&associations[0], "event_type"), &Value::from("origin-request"));
        assert_eq!(
            field(&associations[0], "lambda_arn"),
            &Value::ResourceRef(skylift_core::resource::Reference::new(
                "rewriterLambdaEdgeFunction",
                "qualifiedArn"
            ))
        );
    }

    #[test]
    fn viewer_certificate_and_aliases() {
        let cdn = distribution();
        assert_eq!(cdn.attributes["aliases"], Value::list(["dev.example.com"]));
        let cert = &cdn.attributes["viewer_certificate"];
        assert_eq!(field(cert, "acm_certificate_arn"), &Value::from(CDN_CERT_ARN));
        assert_eq!(field(cert, "ssl_support_method"), &Value::from("sni-only"));
        assert_eq!(cdn.attributes["price_class"], Value::from("PriceClass_100"));
    }

    #[test]
    fn error_page_and_origin() {
        let cdn = distribution();
        let Value::List(errors) = &cdn.attributes["custom_error_responses"] else {
            panic!("Expected list");
        };
        assert_eq!(field(&errors[0], "response_page_path"), &Value::from("/error.html"));

        let Value::List(origins) = &cdn.attributes["origins"] else {
            panic!("Expected list");
        };
        assert!(matches!(
            field(&origins[0], "origin_access_control_id"),
            Value::ResourceRef(r) if r.binding == "oac"
        ));
    }
}
