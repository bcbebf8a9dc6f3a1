//! Network schema definitions: default VPC, security groups, load balancer

use skylift_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types as core_types};

use super::types;

/// Security group rule (ingress or egress)
pub fn security_group_rule() -> AttributeType {
    AttributeType::Object(vec![
        AttributeSchema::new("from_port", core_types::port()).required(),
        AttributeSchema::new("to_port", core_types::port()).required(),
        AttributeSchema::new("protocol", AttributeType::String)
            .required()
            .with_description("tcp, udp, icmp or -1 for all"),
        AttributeSchema::new(
            "cidr_blocks",
            AttributeType::List(Box::new(core_types::cidr())),
        ),
        AttributeSchema::new(
            "ipv6_cidr_blocks",
            AttributeType::List(Box::new(core_types::ipv6_cidr())),
        ),
        AttributeSchema::new(
            "security_groups",
            AttributeType::List(Box::new(AttributeType::String)),
        ),
    ])
}

fn rules() -> AttributeType {
    AttributeType::List(Box::new(security_group_rule()))
}

pub fn security_group_schema() -> ResourceSchema {
    ResourceSchema::new("aws:ec2:SecurityGroup")
        .attribute(AttributeSchema::new("vpc_id", AttributeType::String))
        .attribute(AttributeSchema::new("description", AttributeType::String))
        .attribute(AttributeSchema::new("ingress", rules()))
        .attribute(AttributeSchema::new("egress", rules()))
}

pub fn default_vpc_schema() -> ResourceSchema {
    ResourceSchema::new("awsx:ec2:DefaultVpc")
        .with_description("Adopts the account's default VPC and its subnets")
}

fn health_check() -> AttributeType {
    AttributeType::Object(vec![
        AttributeSchema::new("enabled", AttributeType::Bool),
        AttributeSchema::new("matcher", AttributeType::String),
        AttributeSchema::new("path", AttributeType::String),
        AttributeSchema::new("interval", core_types::positive_int()),
        AttributeSchema::new("protocol", types::http_protocol()),
    ])
}

pub fn application_load_balancer_schema() -> ResourceSchema {
    ResourceSchema::new("awsx:lb:ApplicationLoadBalancer")
        .with_description("Load balancer with a default listener and target group")
        .attribute(AttributeSchema::new(
            "listener",
            AttributeType::Object(vec![
                AttributeSchema::new("certificate_arn", core_types::arn()),
                AttributeSchema::new("port", core_types::port()).required(),
                AttributeSchema::new("protocol", types::http_protocol()).required(),
                AttributeSchema::new("ssl_policy", AttributeType::String),
            ]),
        ))
        .attribute(AttributeSchema::new(
            "default_security_group",
            AttributeType::Object(vec![AttributeSchema::new(
                "args",
                AttributeType::Object(vec![
                    AttributeSchema::new("ingress", rules()),
                    AttributeSchema::new("egress", rules()),
                ]),
            )]),
        ))
        .attribute(AttributeSchema::new(
            "default_target_group",
            AttributeType::Object(vec![
                AttributeSchema::new("port", core_types::port()),
                AttributeSchema::new("protocol", types::http_protocol()),
                AttributeSchema::new(
                    "target_type",
                    AttributeType::Enum(
                        ["instance", "ip", "lambda", "alb"]
                            .iter()
                            .map(|s| s.to_string())
                            .collect(),
                    ),
                ),
                AttributeSchema::new("health_check", health_check()),
            ]),
        ))
        .attribute(AttributeSchema::new(
            "subnet_ids",
            AttributeType::List(Box::new(AttributeType::String)),
        ))
}

pub fn schemas() -> Vec<ResourceSchema> {
    vec![
        security_group_schema(),
        default_vpc_schema(),
        application_load_balancer_schema(),
    ]
}
