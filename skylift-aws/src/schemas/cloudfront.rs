//! CloudFront and edge function schema definitions

use skylift_core::resource::Value;
use skylift_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types as core_types};

use super::types;

fn variants(values: &[&str]) -> AttributeType {
    AttributeType::Enum(values.iter().map(|s| s.to_string()).collect())
}

fn methods() -> AttributeType {
    AttributeType::List(Box::new(variants(&[
        "GET", "HEAD", "OPTIONS", "PUT", "POST", "PATCH", "DELETE",
    ])))
}

/// Timeout of an origin-facing edge function, 1-30 seconds
fn edge_timeout() -> AttributeType {
    AttributeType::Custom {
        name: "EdgeTimeout".to_string(),
        base: Box::new(AttributeType::Int),
        validate: |value| match value {
            Value::Int(n) if (1..=30).contains(n) => Ok(()),
            Value::Int(n) => Err(format!("Timeout {} is outside 1-30 seconds", n)),
            _ => Err("Expected integer".to_string()),
        },
    }
}

pub fn origin_access_control_schema() -> ResourceSchema {
    ResourceSchema::new("aws:cloudfront:OriginAccessControl")
        .with_description("Signs origin requests from a distribution to S3")
        .attribute(AttributeSchema::new("name", AttributeType::String).required())
        .attribute(AttributeSchema::new("description", AttributeType::String))
        .attribute(
            AttributeSchema::new(
                "origin_access_control_origin_type",
                variants(&["s3", "mediastore"]),
            )
            .required(),
        )
        .attribute(
            AttributeSchema::new("signing_behavior", variants(&["always", "never", "no-override"]))
                .required(),
        )
        .attribute(AttributeSchema::new("signing_protocol", variants(&["sigv4"])).required())
}

fn cache_behavior() -> AttributeType {
    AttributeType::Object(vec![
        AttributeSchema::new("target_origin_id", AttributeType::String).required(),
        AttributeSchema::new(
            "viewer_protocol_policy",
            variants(&["allow-all", "https-only", "redirect-to-https"]),
        )
        .required(),
        AttributeSchema::new("allowed_methods", methods()).required(),
        AttributeSchema::new("cached_methods", methods()).required(),
        AttributeSchema::new("default_ttl", types::non_negative_int()),
        AttributeSchema::new("max_ttl", types::non_negative_int()),
        AttributeSchema::new("min_ttl", types::non_negative_int()),
        AttributeSchema::new(
            "forwarded_values",
            AttributeType::Object(vec![
                AttributeSchema::new("query_string", AttributeType::Bool).required(),
                AttributeSchema::new(
                    "cookies",
                    AttributeType::Object(vec![
                        AttributeSchema::new("forward", variants(&["none", "whitelist", "all"]))
                            .required(),
                    ]),
                )
                .required(),
            ]),
        ),
        AttributeSchema::new(
            "lambda_function_associations",
            AttributeType::List(Box::new(AttributeType::Object(vec![
                AttributeSchema::new(
                    "event_type",
                    variants(&[
                        "viewer-request",
                        "viewer-response",
                        "origin-request",
                        "origin-response",
                    ]),
                )
                .required(),
                AttributeSchema::new("lambda_arn", core_types::arn()).required(),
                AttributeSchema::new("include_body", AttributeType::Bool),
            ]))),
        ),
    ])
}

pub fn distribution_schema() -> ResourceSchema {
    ResourceSchema::new("aws:cloudfront:Distribution")
        .with_description("A CloudFront web distribution")
        .attribute(AttributeSchema::new("enabled", AttributeType::Bool).required())
        .attribute(
            AttributeSchema::new(
                "origins",
                AttributeType::List(Box::new(AttributeType::Object(vec![
                    AttributeSchema::new("origin_id", AttributeType::String).required(),
                    AttributeSchema::new("domain_name", AttributeType::String).required(),
                    AttributeSchema::new("origin_access_control_id", AttributeType::String),
                ]))),
            )
            .required(),
        )
        .attribute(AttributeSchema::new("default_root_object", AttributeType::String))
        .attribute(AttributeSchema::new("default_cache_behavior", cache_behavior()).required())
        .attribute(AttributeSchema::new(
            "price_class",
            variants(&["PriceClass_All", "PriceClass_200", "PriceClass_100"]),
        ))
        .attribute(AttributeSchema::new(
            "custom_error_responses",
            AttributeType::List(Box::new(AttributeType::Object(vec![
                AttributeSchema::new("error_code", AttributeType::Int).required(),
                AttributeSchema::new("response_code", AttributeType::Int),
                AttributeSchema::new("response_page_path", AttributeType::String),
            ]))),
        ))
        .attribute(
            AttributeSchema::new(
                "restrictions",
                AttributeType::Object(vec![
                    AttributeSchema::new(
                        "geo_restriction",
                        AttributeType::Object(vec![
                            AttributeSchema::new(
                                "restriction_type",
                                variants(&["none", "whitelist", "blacklist"]),
                            )
                            .required(),
                            AttributeSchema::new(
                                "locations",
                                AttributeType::List(Box::new(AttributeType::String)),
                            ),
                        ]),
                    )
                    .required(),
                ]),
            )
            .required(),
        )
        .attribute(AttributeSchema::new(
            "aliases",
            AttributeType::List(Box::new(AttributeType::String)),
        ))
        .attribute(
            AttributeSchema::new(
                "viewer_certificate",
                AttributeType::Object(vec![
                    AttributeSchema::new("cloudfront_default_certificate", AttributeType::Bool),
                    AttributeSchema::new("acm_certificate_arn", core_types::arn()),
                    AttributeSchema::new(
                        "ssl_support_method",
                        variants(&["sni-only", "vip", "static-ip"]),
                    ),
                    AttributeSchema::new("minimum_protocol_version", AttributeType::String),
                ]),
            )
            .required(),
        )
}

pub fn function_schema() -> ResourceSchema {
    ResourceSchema::new("aws:lambda:Function")
        .with_description("A Lambda function (edge functions must live in us-east-1)")
        .attribute(
            AttributeSchema::new("code", AttributeType::Any)
                .required()
                .with_description("Asset archive holding the handler module"),
        )
        .attribute(AttributeSchema::new("handler", AttributeType::String).required())
        .attribute(
            AttributeSchema::new("runtime", variants(&["nodejs18.x", "nodejs20.x"])).required(),
        )
        .attribute(AttributeSchema::new("role", core_types::arn()).required())
        .attribute(
            AttributeSchema::new("publish", AttributeType::Bool)
                .with_description("Publish a version; edge associations need one"),
        )
        .attribute(AttributeSchema::new("timeout", edge_timeout()))
}

pub fn schemas() -> Vec<ResourceSchema> {
    vec![
        origin_access_control_schema(),
        distribution_schema(),
        function_schema(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn edge_timeout_is_bounded() {
        assert!(edge_timeout().validate(&Value::Int(5)).is_ok());
        assert!(edge_timeout().validate(&Value::Int(31)).is_err());
        assert!(edge_timeout().validate(&Value::Int(0)).is_err());
    }

    #[test]
    fn distribution_requires_viewer_certificate() {
        let mut attrs = BTreeMap::new();
        attrs.insert("enabled".to_string(), Value::Bool(true));
        let errors = distribution_schema().validate(&attrs).unwrap_err();
        let missing: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        assert!(missing.iter().any(|m| m.contains("viewer_certificate")));
        assert!(missing.iter().any(|m| m.contains("origins")));
    }

    #[test]
    fn unknown_viewer_protocol_policy_is_rejected() {
        let behavior = Value::map([
            ("target_origin_id", Value::from("o")),
            ("viewer_protocol_policy", Value::from("https-please")),
            ("allowed_methods", Value::list(["GET"])),
            ("cached_methods", Value::list(["GET"])),
        ]);
        assert!(cache_behavior().validate(&behavior).is_err());
    }
}
