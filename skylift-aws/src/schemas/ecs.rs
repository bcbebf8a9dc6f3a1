//! Container schema definitions: cluster, repository, secrets, Fargate

use skylift_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types as core_types};

use super::types;

fn strings() -> AttributeType {
    AttributeType::List(Box::new(AttributeType::String))
}

pub fn cluster_schema() -> ResourceSchema {
    ResourceSchema::new("aws:ecs:Cluster").attribute(AttributeSchema::new("name", AttributeType::String))
}

pub fn repository_schema() -> ResourceSchema {
    ResourceSchema::new("awsx:ecr:Repository")
        .with_description("Container image repository with an optional lifecycle policy")
        .attribute(
            AttributeSchema::new("force_delete", AttributeType::Bool)
                .with_description("Delete the repository even if it still holds images"),
        )
        .attribute(AttributeSchema::new(
            "lifecycle_policy",
            AttributeType::Object(vec![AttributeSchema::new(
                "rules",
                AttributeType::List(Box::new(AttributeType::Object(vec![
                    AttributeSchema::new("description", AttributeType::String),
                    AttributeSchema::new("maximum_number_of_images", core_types::positive_int()),
                    AttributeSchema::new("maximum_age_limit", core_types::positive_int()),
                    AttributeSchema::new(
                        "tag_status",
                        AttributeType::Enum(vec![
                            "any".to_string(),
                            "tagged".to_string(),
                            "untagged".to_string(),
                        ]),
                    )
                    .required(),
                    AttributeSchema::new("tag_prefix_list", strings()),
                ]))),
            )]),
        ))
}

/// Engine-side lookup of a repository image
pub fn get_image_schema() -> ResourceSchema {
    ResourceSchema::new("aws:ecr:getImage")
        .attribute(AttributeSchema::new("repository_name", AttributeType::String).required())
        .attribute(AttributeSchema::new("most_recent", AttributeType::Bool))
        .attribute(AttributeSchema::new("image_tag", AttributeType::String))
}

pub fn secret_schema() -> ResourceSchema {
    ResourceSchema::new("aws:secretsmanager:Secret")
        .attribute(AttributeSchema::new("name", AttributeType::String))
        .attribute(AttributeSchema::new("description", AttributeType::String))
        .attribute(AttributeSchema::new(
            "recovery_window_in_days",
            types::non_negative_int(),
        ))
}

pub fn secret_version_schema() -> ResourceSchema {
    ResourceSchema::new("aws:secretsmanager:SecretVersion")
        .attribute(AttributeSchema::new("secret_id", AttributeType::String).required())
        .attribute(
            AttributeSchema::new("secret_string", AttributeType::String)
                .required()
                .with_description("JSON object of secret values"),
        )
}

fn container() -> AttributeType {
    AttributeType::Object(vec![
        AttributeSchema::new("name", AttributeType::String).required(),
        AttributeSchema::new("image", AttributeType::String).required(),
        AttributeSchema::new("cpu", core_types::positive_int()),
        AttributeSchema::new("memory", core_types::positive_int()),
        AttributeSchema::new("essential", AttributeType::Bool),
        AttributeSchema::new(
            "port_mappings",
            AttributeType::List(Box::new(AttributeType::Object(vec![
                AttributeSchema::new("host_port", core_types::port()),
                AttributeSchema::new("container_port", core_types::port()).required(),
                AttributeSchema::new("target_group", AttributeType::Any),
            ]))),
        ),
        AttributeSchema::new(
            "secrets",
            AttributeType::List(Box::new(AttributeType::Object(vec![
                AttributeSchema::new("name", AttributeType::String).required(),
                AttributeSchema::new("value_from", AttributeType::String).required(),
            ]))),
        ),
    ])
}

fn role_arn() -> AttributeType {
    AttributeType::Object(vec![AttributeSchema::new("role_arn", core_types::arn()).required()])
}

pub fn fargate_task_definition_schema() -> ResourceSchema {
    ResourceSchema::new("awsx:ecs:FargateTaskDefinition")
        .attribute(AttributeSchema::new("container", container()).required())
        .attribute(AttributeSchema::new("execution_role", role_arn()))
        .attribute(AttributeSchema::new("task_role", role_arn()))
}

pub fn fargate_service_schema() -> ResourceSchema {
    ResourceSchema::new("awsx:ecs:FargateService")
        .attribute(AttributeSchema::new("cluster", core_types::arn()).required())
        .attribute(AttributeSchema::new("task_definition", core_types::arn()).required())
        .attribute(AttributeSchema::new("desired_count", types::non_negative_int()))
        .attribute(AttributeSchema::new(
            "load_balancers",
            AttributeType::List(Box::new(AttributeType::Object(vec![
                AttributeSchema::new("container_name", AttributeType::String).required(),
                AttributeSchema::new("container_port", core_types::port()).required(),
                AttributeSchema::new("target_group_arn", core_types::arn()).required(),
            ]))),
        ))
        .attribute(AttributeSchema::new(
            "network_configuration",
            AttributeType::Object(vec![
                AttributeSchema::new("assign_public_ip", AttributeType::Bool),
                AttributeSchema::new("subnets", strings()).required(),
                AttributeSchema::new("security_groups", strings()),
            ]),
        ))
}

pub fn schemas() -> Vec<ResourceSchema> {
    vec![
        cluster_schema(),
        repository_schema(),
        get_image_schema(),
        secret_schema(),
        secret_version_schema(),
        fargate_task_definition_schema(),
        fargate_service_schema(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use skylift_core::resource::{Reference, Value};
    use std::collections::BTreeMap;

    #[test]
    fn service_accepts_referenced_subnets() {
        let mut attrs = BTreeMap::new();
        attrs.insert(
            "cluster".to_string(),
            Value::ResourceRef(Reference::new("cluster", "arn")),
        );
        attrs.insert(
            "task_definition".to_string(),
            Value::ResourceRef(Reference::new("apiTaskDef", "taskDefinition.arn")),
        );
        attrs.insert(
            "network_configuration".to_string(),
            Value::map([(
                "subnets",
                Value::ResourceRef(Reference::new("defaultVpc", "publicSubnetIds")),
            )]),
        );
        assert!(fargate_service_schema().validate(&attrs).is_ok());
    }

    #[test]
    fn lifecycle_rule_requires_tag_status() {
        let mut attrs = BTreeMap::new();
        attrs.insert(
            "lifecycle_policy".to_string(),
            Value::map([(
                "rules",
                Value::list([Value::map([("maximum_number_of_images", Value::Int(1))])]),
            )]),
        );
        assert!(repository_schema().validate(&attrs).is_err());
    }

    #[test]
    fn container_memory_must_be_positive() {
        let value = Value::map([
            ("name", Value::from("api")),
            ("image", Value::from("repo:latest")),
            ("memory", Value::Int(0)),
        ]);
        assert!(container().validate(&value).is_err());
    }
}
