//! AWS-specific type definitions

use skylift_core::resource::Value;
use skylift_core::schema::AttributeType;

/// Regions a stack may target
const VALID_REGIONS: &[&str] = &[
    "af-south-1",
    "ap-east-1",
    "ap-northeast-1",
    "ap-northeast-2",
    "ap-northeast-3",
    "ap-south-1",
    "ap-southeast-1",
    "ap-southeast-2",
    "ca-central-1",
    "eu-central-1",
    "eu-north-1",
    "eu-south-1",
    "eu-west-1",
    "eu-west-2",
    "eu-west-3",
    "me-south-1",
    "sa-east-1",
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
];

/// AWS region in API format (e.g., "eu-west-1")
pub fn aws_region() -> AttributeType {
    AttributeType::Custom {
        name: "Region".to_string(),
        base: Box::new(AttributeType::String),
        validate: |value| {
            if let Value::String(s) = value {
                if VALID_REGIONS.contains(&s.as_str()) {
                    Ok(())
                } else {
                    Err(format!(
                        "Invalid region '{}', expected one of: {}",
                        s,
                        VALID_REGIONS.join(", ")
                    ))
                }
            } else {
                Err("Expected string".to_string())
            }
        },
    }
}

/// Integer >= 0 (TTLs, replica counts)
pub fn non_negative_int() -> AttributeType {
    AttributeType::Custom {
        name: "NonNegativeInt".to_string(),
        base: Box::new(AttributeType::Int),
        validate: |value| match value {
            Value::Int(n) if *n >= 0 => Ok(()),
            Value::Int(_) => Err("Value must not be negative".to_string()),
            _ => Err("Expected integer".to_string()),
        },
    }
}

/// Canned ACL applied to uploaded objects
pub fn canned_acl() -> AttributeType {
    AttributeType::Enum(
        [
            "private",
            "public-read",
            "public-read-write",
            "authenticated-read",
            "bucket-owner-read",
            "bucket-owner-full-control",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect(),
    )
}

/// Protocol of a load balancer listener or target group
pub fn http_protocol() -> AttributeType {
    AttributeType::Enum(vec!["HTTP".to_string(), "HTTPS".to_string()])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_accepts_api_format() {
        assert!(aws_region().validate(&Value::from("eu-west-1")).is_ok());
    }

    #[test]
    fn region_rejects_invalid_region() {
        let result = aws_region().validate(&Value::from("invalid-region"));
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Invalid region"));
        assert!(err.contains("us-east-1"));
    }

    #[test]
    fn region_rejects_availability_zone() {
        assert!(aws_region().validate(&Value::from("us-east-1a")).is_err());
    }

    #[test]
    fn region_validates_all_valid_regions() {
        let region_type = aws_region();
        for region in VALID_REGIONS {
            assert!(
                region_type.validate(&Value::from(*region)).is_ok(),
                "Region {} should be valid",
                region
            );
        }
    }

    #[test]
    fn non_negative_int_bounds() {
        assert!(non_negative_int().validate(&Value::Int(0)).is_ok());
        assert!(non_negative_int().validate(&Value::Int(-1)).is_err());
        assert!(non_negative_int().validate(&Value::from("1")).is_err());
    }

    #[test]
    fn canned_acl_is_case_sensitive() {
        assert!(canned_acl().validate(&Value::from("public-read")).is_ok());
        assert!(canned_acl().validate(&Value::from("PublicRead")).is_err());
    }
}
