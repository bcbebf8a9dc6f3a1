//! Resource - Declared resources, their attributes and cross-resource references

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use heck::ToLowerCamelCase;

use crate::graph::GraphError;

/// Unique identifier for a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId {
    /// Engine type token (e.g., "aws:s3:Bucket", "awsx:ecr:Repository")
    pub resource_type: String,
    /// Logical resource name
    pub name: String,
}

impl ResourceId {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.resource_type, self.name)
    }
}

/// Reference to an output of another declared resource
///
/// `path` is the output path on the referenced resource (e.g., "arn",
/// "loadBalancer.dnsName", "imageTags[0]"). An empty path refers to the
/// resource itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reference {
    pub binding: String,
    pub path: String,
}

impl Reference {
    pub fn new(binding: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            binding: binding.into(),
            path: path.into(),
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "${{{}}}", self.binding)
        } else {
            write!(f, "${{{}.{}}}", self.binding, self.path)
        }
    }
}

/// Piece of an interpolated string
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Text(String),
    Ref(Reference),
}

impl From<&str> for Segment {
    fn from(s: &str) -> Self {
        Segment::Text(s.to_string())
    }
}

impl From<String> for Segment {
    fn from(s: String) -> Self {
        Segment::Text(s)
    }
}

impl From<Reference> for Segment {
    fn from(r: Reference) -> Self {
        Segment::Ref(r)
    }
}

/// File content shipped to the engine alongside a resource
#[derive(Debug, Clone, PartialEq)]
pub enum Asset {
    /// Inline text content
    String(String),
    /// Path to a directory or archive on disk
    FileArchive(String),
}

/// Attribute value of a resource
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Int(i64),
    Bool(bool),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// Reference to another resource's output
    ResourceRef(Reference),
    /// String assembled from literal text and resource outputs
    Interpolate(Vec<Segment>),
    /// Structured document serialized to a JSON string by the engine.
    /// Keys inside are kept verbatim.
    Json(Box<Value>),
    /// Value the engine must treat as secret
    Secret(Box<Value>),
    /// Archive assembled from named assets
    Archive(BTreeMap<String, Asset>),
}

impl Value {
    /// Build a map value from key/value pairs
    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Build a list value
    pub fn list<V: Into<Value>>(items: impl IntoIterator<Item = V>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }

    /// Build an interpolated string
    pub fn interpolate<S: Into<Segment>>(parts: impl IntoIterator<Item = S>) -> Self {
        let mut segments: Vec<Segment> = Vec::new();
        for part in parts {
            match (segments.last_mut(), part.into()) {
                (Some(Segment::Text(prev)), Segment::Text(next)) => prev.push_str(&next),
                (_, segment) => segments.push(segment),
            }
        }
        Value::Interpolate(segments)
    }

    pub fn json(value: Value) -> Self {
        Value::Json(Box::new(value))
    }

    pub fn secret(value: Value) -> Self {
        Value::Secret(Box::new(value))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Collect the bindings this value refers to
    pub fn collect_references(&self, out: &mut BTreeSet<String>) {
        match self {
            Value::ResourceRef(r) => {
                out.insert(r.binding.clone());
            }
            Value::Interpolate(segments) => {
                for segment in segments {
                    if let Segment::Ref(r) = segment {
                        out.insert(r.binding.clone());
                    }
                }
            }
            Value::List(items) => {
                for item in items {
                    item.collect_references(out);
                }
            }
            Value::Map(map) => {
                for v in map.values() {
                    v.collect_references(out);
                }
            }
            Value::Json(inner) | Value::Secret(inner) => inner.collect_references(out),
            Value::String(_) | Value::Int(_) | Value::Bool(_) | Value::Archive(_) => {}
        }
    }

    /// Resolve a string-like value to concrete text using known resource outputs
    ///
    /// Returns `None` if a referenced output is unknown or the value is not
    /// string-like.
    pub fn resolve<F>(&self, outputs: &F) -> Option<String>
    where
        F: Fn(&Reference) -> Option<String>,
    {
        match self {
            Value::String(s) => Some(s.clone()),
            Value::Int(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::ResourceRef(r) => outputs(r),
            Value::Interpolate(segments) => {
                let mut resolved = String::new();
                for segment in segments {
                    match segment {
                        Segment::Text(t) => resolved.push_str(t),
                        Segment::Ref(r) => resolved.push_str(&outputs(r)?),
                    }
                }
                Some(resolved)
            }
            Value::Secret(inner) => inner.resolve(outputs),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::String(s.clone())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<u16> for Value {
    fn from(n: u16) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Reference> for Value {
    fn from(r: Reference) -> Self {
        Value::ResourceRef(r)
    }
}

/// How the engine treats a declared resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// Plain provider resource
    Custom,
    /// Multi-resource component (e.g., awsx packages)
    Component,
    /// Explicit provider configuration
    Provider,
    /// Read-only lookup resolved by the engine (e.g., most recent image)
    DataSource,
}

/// Engine options attached to a resource
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceOptions {
    /// Explicit ordering edges not captured by references
    pub depends_on: Vec<String>,
    /// Binding of the explicit provider resource to use
    pub provider: Option<String>,
}

/// Desired state of a single resource
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub id: ResourceId,
    /// Graph-unique key other resources use to refer to this one
    pub binding: String,
    pub kind: ResourceKind,
    pub attributes: BTreeMap<String, Value>,
    pub options: ResourceOptions,
}

impl Resource {
    /// New custom resource; the binding defaults to the camel-cased name
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            binding: name.to_lower_camel_case(),
            id: ResourceId::new(resource_type, name),
            kind: ResourceKind::Custom,
            attributes: BTreeMap::new(),
            options: ResourceOptions::default(),
        }
    }

    pub fn with_binding(mut self, binding: impl Into<String>) -> Self {
        self.binding = binding.into();
        self
    }

    pub fn with_kind(mut self, kind: ResourceKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn depends_on(mut self, handle: &Handle) -> Self {
        if !self.options.depends_on.contains(&handle.binding) {
            self.options.depends_on.push(handle.binding.clone());
        }
        self
    }

    pub fn with_provider(mut self, handle: &Handle) -> Self {
        self.options.provider = Some(handle.binding.clone());
        self
    }

    /// Returns true if this resource is a data source (read-only)
    pub fn is_data_source(&self) -> bool {
        self.kind == ResourceKind::DataSource
    }

    /// Bindings referenced by attribute values
    pub fn references(&self) -> BTreeSet<String> {
        let mut refs = BTreeSet::new();
        for value in self.attributes.values() {
            value.collect_references(&mut refs);
        }
        refs
    }
}

/// Handle to a declared resource
///
/// Handles only expose outputs by reference; the values are resolved by the
/// engine after the graph is submitted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Handle {
    pub binding: String,
    pub resource_type: String,
}

impl Handle {
    pub fn output(&self, path: impl Into<String>) -> Reference {
        Reference::new(self.binding.clone(), path)
    }

    pub fn attr(&self, path: impl Into<String>) -> Value {
        Value::ResourceRef(self.output(path))
    }

    pub fn arn(&self) -> Value {
        self.attr("arn")
    }

    pub fn id(&self) -> Value {
        self.attr("id")
    }

    pub fn name(&self) -> Value {
        self.attr("name")
    }
}

/// ARN output of a handle that may not have been produced
///
/// Fails instead of yielding an empty reference when `handle` is absent.
pub fn arn_of(handle: Option<&Handle>, what: &str) -> Result<Value, GraphError> {
    handle
        .map(Handle::arn)
        .ok_or_else(|| GraphError::MissingHandle(what.to_string()))
}
