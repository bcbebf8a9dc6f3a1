//! Schema - Attribute types for declared resources
//!
//! Composers declare attributes loosely as `Value`s; schemas catch missing
//! or mistyped attributes before a program is handed to the engine.
//! References are opaque at composition time and satisfy every type.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::net::Ipv4Addr;

use crate::resource::Value;

/// Check applied by a `Custom` type after its base type matched
pub type Validator = fn(&Value) -> Result<(), String>;

#[derive(Debug, Clone)]
pub enum AttributeType {
    String,
    Int,
    Bool,
    /// One of a fixed set of strings
    Enum(Vec<String>),
    /// Base type narrowed by a validator
    Custom {
        name: String,
        base: Box<AttributeType>,
        validate: Validator,
    },
    List(Box<AttributeType>),
    /// Free-form keys, uniform values
    Map(Box<AttributeType>),
    /// Fixed keys, each with its own schema
    Object(Vec<AttributeSchema>),
    Any,
}

impl AttributeType {
    pub fn validate(&self, value: &Value) -> Result<(), TypeError> {
        match value {
            Value::ResourceRef(_) => return Ok(()),
            Value::Secret(inner) => return self.validate(inner),
            _ => {}
        }

        match self {
            AttributeType::Any => Ok(()),
            AttributeType::String => match value {
                Value::String(_) | Value::Interpolate(_) | Value::Json(_) => Ok(()),
                _ => Err(self.mismatch(value)),
            },
            AttributeType::Int => match value {
                Value::Int(_) => Ok(()),
                _ => Err(self.mismatch(value)),
            },
            AttributeType::Bool => match value {
                Value::Bool(_) => Ok(()),
                _ => Err(self.mismatch(value)),
            },
            AttributeType::Enum(variants) => match value {
                Value::String(s) if variants.contains(s) => Ok(()),
                Value::String(s) => Err(TypeError::InvalidEnumVariant {
                    value: s.clone(),
                    expected: variants.clone(),
                }),
                _ => Err(self.mismatch(value)),
            },
            AttributeType::Custom { base, validate, .. } => {
                base.validate(value)?;
                validate(value).map_err(|message| TypeError::ValidationFailed { message })
            }
            AttributeType::List(item) => match value {
                Value::List(items) => items.iter().enumerate().try_for_each(|(index, v)| {
                    item.validate(v).map_err(|e| TypeError::ListItemError {
                        index,
                        inner: Box::new(e),
                    })
                }),
                _ => Err(self.mismatch(value)),
            },
            AttributeType::Map(entry) => match value {
                Value::Map(map) => map.iter().try_for_each(|(key, v)| {
                    entry.validate(v).map_err(|e| TypeError::MapValueError {
                        key: key.clone(),
                        inner: Box::new(e),
                    })
                }),
                _ => Err(self.mismatch(value)),
            },
            AttributeType::Object(fields) => match value {
                Value::Map(map) => {
                    let fields = fields.iter().map(|f| (f.name.as_str(), f)).collect();
                    check_attributes(&fields, map).map_err(|mut errors| errors.swap_remove(0))
                }
                _ => Err(self.mismatch(value)),
            },
        }
    }

    fn mismatch(&self, value: &Value) -> TypeError {
        TypeError::TypeMismatch {
            expected: self.to_string(),
            got: value_kind(value).to_string(),
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeType::String => write!(f, "String"),
            AttributeType::Int => write!(f, "Int"),
            AttributeType::Bool => write!(f, "Bool"),
            AttributeType::Enum(variants) => write!(f, "Enum({})", variants.join(" | ")),
            AttributeType::Custom { name, .. } => write!(f, "{}", name),
            AttributeType::List(item) => write!(f, "List<{}>", item),
            AttributeType::Map(entry) => write!(f, "Map<{}>", entry),
            AttributeType::Object(_) => write!(f, "Object"),
            AttributeType::Any => write!(f, "Any"),
        }
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::String(_) => "String",
        Value::Int(_) => "Int",
        Value::Bool(_) => "Bool",
        Value::List(_) => "List",
        Value::Map(_) => "Map",
        Value::ResourceRef(_) => "Reference",
        Value::Interpolate(_) => "Interpolation",
        Value::Json(_) => "Json",
        Value::Secret(_) => "Secret",
        Value::Archive(_) => "Archive",
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum TypeError {
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("'{value}' is not one of: {}", expected.join(", "))]
    InvalidEnumVariant {
        value: String,
        expected: Vec<String>,
    },

    #[error("{message}")]
    ValidationFailed { message: String },

    #[error("Required attribute '{name}' is missing")]
    MissingRequired { name: String },

    #[error("Unknown attribute '{name}'")]
    UnknownAttribute { name: String },

    #[error("[{index}]: {inner}")]
    ListItemError { index: usize, inner: Box<TypeError> },

    #[error("{key}: {inner}")]
    MapValueError { key: String, inner: Box<TypeError> },
}

#[derive(Debug, Clone)]
pub struct AttributeSchema {
    pub name: String,
    pub attr_type: AttributeType,
    pub required: bool,
    pub description: Option<String>,
}

impl AttributeSchema {
    pub fn new(name: impl Into<String>, attr_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
            required: false,
            description: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }
}

/// Attribute schemas for one engine resource type
#[derive(Debug, Clone)]
pub struct ResourceSchema {
    /// Engine type token, e.g. "aws:s3:Bucket"
    pub resource_type: String,
    pub attributes: HashMap<String, AttributeSchema>,
    pub description: Option<String>,
}

impl ResourceSchema {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            attributes: HashMap::new(),
            description: None,
        }
    }

    pub fn attribute(mut self, schema: AttributeSchema) -> Self {
        self.attributes.insert(schema.name.clone(), schema);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Collect every violation in `attributes`
    ///
    /// Missing required attributes are reported first, in name order.
    pub fn validate(&self, attributes: &BTreeMap<String, Value>) -> Result<(), Vec<TypeError>> {
        let fields = self
            .attributes
            .iter()
            .map(|(name, schema)| (name.as_str(), schema))
            .collect();
        check_attributes(&fields, attributes)
    }
}

fn check_attributes(
    fields: &HashMap<&str, &AttributeSchema>,
    attributes: &BTreeMap<String, Value>,
) -> Result<(), Vec<TypeError>> {
    let mut missing: Vec<&str> = fields
        .values()
        .filter(|f| f.required && !attributes.contains_key(&f.name))
        .map(|f| f.name.as_str())
        .collect();
    missing.sort_unstable();

    let mut errors: Vec<TypeError> = missing
        .into_iter()
        .map(|name| TypeError::MissingRequired {
            name: name.to_string(),
        })
        .collect();

    for (name, value) in attributes {
        let Some(field) = fields.get(name.as_str()) else {
            errors.push(TypeError::UnknownAttribute { name: name.clone() });
            continue;
        };
        if let Err(e) = field.attr_type.validate(value) {
            errors.push(e);
        }
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

/// Narrowed types shared by provider schemas
pub mod types {
    use super::*;

    fn int_of(value: &Value) -> Result<i64, String> {
        match value {
            Value::Int(n) => Ok(*n),
            _ => Err("Expected integer".to_string()),
        }
    }

    pub fn positive_int() -> AttributeType {
        AttributeType::Custom {
            name: "PositiveInt".to_string(),
            base: Box::new(AttributeType::Int),
            validate: |value| match int_of(value)? {
                n if n > 0 => Ok(()),
                n => Err(format!("{} is not positive", n)),
            },
        }
    }

    /// TCP/UDP port, 0 allowed for "all ports" rules
    pub fn port() -> AttributeType {
        AttributeType::Custom {
            name: "Port".to_string(),
            base: Box::new(AttributeType::Int),
            validate: |value| match int_of(value)? {
                n if (0..=65535).contains(&n) => Ok(()),
                n => Err(format!("Port {} is out of range 0-65535", n)),
            },
        }
    }

    /// IPv4 block such as "10.0.0.0/16"
    pub fn cidr() -> AttributeType {
        AttributeType::Custom {
            name: "Cidr".to_string(),
            base: Box::new(AttributeType::String),
            validate: |value| match value {
                Value::String(s) => validate_cidr(s),
                _ => Err("CIDR must be a literal string".to_string()),
            },
        }
    }

    /// IPv6 block; only the shape is checked
    pub fn ipv6_cidr() -> AttributeType {
        AttributeType::Custom {
            name: "Ipv6Cidr".to_string(),
            base: Box::new(AttributeType::String),
            validate: |value| match value {
                Value::String(s) => match s.split_once('/') {
                    Some((addr, prefix))
                        if addr.contains(':') && prefix.parse::<u8>().is_ok_and(|p| p <= 128) =>
                    {
                        Ok(())
                    }
                    _ => Err(format!("Invalid IPv6 CIDR '{}'", s)),
                },
                _ => Err("CIDR must be a literal string".to_string()),
            },
        }
    }

    /// Literal ARN or a value built from references
    pub fn arn() -> AttributeType {
        AttributeType::Custom {
            name: "Arn".to_string(),
            base: Box::new(AttributeType::String),
            validate: |value| match value {
                Value::String(s) if s.starts_with("arn:") => Ok(()),
                Value::String(s) => Err(format!("'{}' is not an ARN", s)),
                _ => Ok(()),
            },
        }
    }
}

/// Check an IPv4 CIDR block ("10.0.0.0/16")
pub fn validate_cidr(cidr: &str) -> Result<(), String> {
    let (address, prefix) = cidr
        .split_once('/')
        .ok_or_else(|| format!("Invalid CIDR '{}': expected address/prefix", cidr))?;

    address
        .parse::<Ipv4Addr>()
        .map_err(|_| format!("Invalid CIDR '{}': '{}' is not an IPv4 address", cidr, address))?;

    match prefix.parse::<u8>() {
        Ok(p) if p <= 32 => Ok(()),
        _ => Err(format!("Invalid CIDR '{}': prefix must be 0-32", cidr)),
    }
}
