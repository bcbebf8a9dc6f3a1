//! S3 schema definitions

use skylift_core::schema::{AttributeSchema, AttributeType, ResourceSchema};

use super::types;

/// Returns the schema for website buckets
pub fn bucket_schema() -> ResourceSchema {
    ResourceSchema::new("aws:s3:Bucket")
        .with_description("An S3 bucket for object storage")
        .attribute(
            AttributeSchema::new("bucket", AttributeType::String)
                .with_description("Override bucket name (generated if not specified)"),
        )
        .attribute(
            AttributeSchema::new(
                "website",
                AttributeType::Object(vec![
                    AttributeSchema::new("index_document", AttributeType::String).required(),
                    AttributeSchema::new("error_document", AttributeType::String),
                ]),
            )
            .with_description("Static website hosting documents"),
        )
}

pub fn ownership_controls_schema() -> ResourceSchema {
    ResourceSchema::new("aws:s3:BucketOwnershipControls")
        .attribute(AttributeSchema::new("bucket", AttributeType::String).required())
        .attribute(
            AttributeSchema::new(
                "rule",
                AttributeType::Object(vec![
                    AttributeSchema::new(
                        "object_ownership",
                        AttributeType::Enum(vec![
                            "BucketOwnerPreferred".to_string(),
                            "ObjectWriter".to_string(),
                            "BucketOwnerEnforced".to_string(),
                        ]),
                    )
                    .required(),
                ]),
            )
            .required(),
        )
}

pub fn public_access_block_schema() -> ResourceSchema {
    ResourceSchema::new("aws:s3:BucketPublicAccessBlock")
        .attribute(AttributeSchema::new("bucket", AttributeType::String).required())
        .attribute(AttributeSchema::new("block_public_acls", AttributeType::Bool))
        .attribute(AttributeSchema::new("block_public_policy", AttributeType::Bool))
        .attribute(AttributeSchema::new("ignore_public_acls", AttributeType::Bool))
        .attribute(AttributeSchema::new("restrict_public_buckets", AttributeType::Bool))
}

pub fn bucket_policy_schema() -> ResourceSchema {
    ResourceSchema::new("aws:s3:BucketPolicy")
        .attribute(AttributeSchema::new("bucket", AttributeType::String).required())
        .attribute(
            AttributeSchema::new("policy", AttributeType::String)
                .required()
                .with_description("IAM policy JSON"),
        )
}

/// Component that mirrors a local directory into a bucket
pub fn bucket_folder_schema() -> ResourceSchema {
    ResourceSchema::new("synced-folder:index:S3BucketFolder")
        .with_description("Synchronizes a local folder with a bucket")
        .attribute(AttributeSchema::new("path", AttributeType::String).required())
        .attribute(AttributeSchema::new("bucket_name", AttributeType::String).required())
        .attribute(AttributeSchema::new("acl", types::canned_acl()).required())
        .attribute(
            AttributeSchema::new("managed_objects", AttributeType::Bool)
                .with_description("Manage each object as its own resource"),
        )
}

/// Returns all S3-related schemas
pub fn schemas() -> Vec<ResourceSchema> {
    vec![
        bucket_schema(),
        ownership_controls_schema(),
        public_access_block_schema(),
        bucket_policy_schema(),
        bucket_folder_schema(),
    ]
}
