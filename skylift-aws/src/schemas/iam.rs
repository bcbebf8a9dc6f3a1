//! IAM schema definitions

use skylift_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

pub fn role_schema() -> ResourceSchema {
    ResourceSchema::new("aws:iam:Role")
        .attribute(AttributeSchema::new("name", AttributeType::String))
        .attribute(
            AttributeSchema::new("assume_role_policy", AttributeType::String)
                .required()
                .with_description("Trust policy JSON"),
        )
}

pub fn role_policy_attachment_schema() -> ResourceSchema {
    ResourceSchema::new("aws:iam:RolePolicyAttachment")
        .attribute(AttributeSchema::new("role", AttributeType::String).required())
        .attribute(AttributeSchema::new("policy_arn", types::arn()).required())
}

pub fn policy_schema() -> ResourceSchema {
    ResourceSchema::new("aws:iam:Policy")
        .attribute(AttributeSchema::new("description", AttributeType::String))
        .attribute(AttributeSchema::new("policy", AttributeType::String).required())
}

pub fn user_schema() -> ResourceSchema {
    ResourceSchema::new("aws:iam:User")
        .attribute(AttributeSchema::new("name", AttributeType::String))
        .attribute(AttributeSchema::new("path", AttributeType::String))
}

pub fn policy_attachment_schema() -> ResourceSchema {
    ResourceSchema::new("aws:iam:PolicyAttachment")
        .with_description("Attaches a managed policy to users, roles or groups")
        .attribute(AttributeSchema::new(
            "users",
            AttributeType::List(Box::new(AttributeType::String)),
        ))
        .attribute(AttributeSchema::new(
            "roles",
            AttributeType::List(Box::new(AttributeType::String)),
        ))
        .attribute(AttributeSchema::new("policy_arn", types::arn()).required())
}

pub fn schemas() -> Vec<ResourceSchema> {
    vec![
        role_schema(),
        role_policy_attachment_schema(),
        policy_schema(),
        user_schema(),
        policy_attachment_schema(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use skylift_core::resource::Value;
    use std::collections::BTreeMap;

    #[test]
    fn attachment_rejects_non_arn_policy() {
        let mut attrs = BTreeMap::new();
        attrs.insert("role".to_string(), Value::from("edge-role"));
        attrs.insert("policy_arn".to_string(), Value::from("AWSLambdaBasicExecutionRole"));
        assert!(role_policy_attachment_schema().validate(&attrs).is_err());

        attrs.insert(
            "policy_arn".to_string(),
            Value::from("arn:aws:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole"),
        );
        assert!(role_policy_attachment_schema().validate(&attrs).is_ok());
    }
}
