//! Route53 schema definitions

use skylift_core::schema::{AttributeSchema, AttributeType, ResourceSchema};

use super::types;

pub fn record_schema() -> ResourceSchema {
    ResourceSchema::new("aws:route53:Record")
        .with_description("A DNS record; alias records carry no TTL")
        .attribute(AttributeSchema::new("name", AttributeType::String).required())
        .attribute(AttributeSchema::new("zone_id", AttributeType::String).required())
        .attribute(
            AttributeSchema::new(
                "type",
                AttributeType::Enum(
                    ["A", "AAAA", "CNAME", "MX", "NS", "TXT"]
                        .iter()
                        .map(|s| s.to_string())
                        .collect(),
                ),
            )
            .required(),
        )
        .attribute(AttributeSchema::new("ttl", types::non_negative_int()))
        .attribute(AttributeSchema::new(
            "records",
            AttributeType::List(Box::new(AttributeType::String)),
        ))
        .attribute(AttributeSchema::new(
            "aliases",
            AttributeType::List(Box::new(AttributeType::Object(vec![
                AttributeSchema::new("name", AttributeType::String).required(),
                AttributeSchema::new("zone_id", AttributeType::String).required(),
                AttributeSchema::new("evaluate_target_health", AttributeType::Bool).required(),
            ]))),
        ))
}

pub fn schemas() -> Vec<ResourceSchema> {
    vec![record_schema()]
}
