//! Program - Render a stack as a document the engine executes
//!
//! The engine consumes a YAML program: a `resources` section keyed by
//! binding, a `variables` section holding engine-side lookups, and an
//! `outputs` section. References render as `${binding.path}`.

use serde_yaml::{Mapping, Value as Yaml};
use thiserror::Error;

use crate::case_convert::to_property_name;
use crate::graph::GraphError;
use crate::resource::{Asset, Resource, ResourceKind, Segment, Value};
use crate::stack::Stack;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("Failed to serialize program: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Named values exported from a composition
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outputs {
    entries: Vec<(String, Value)>,
}

impl Outputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an output, keeping first-insertion order
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn extend(&mut self, other: Outputs) {
        for (name, value) in other.entries {
            self.insert(name, value);
        }
    }
}

/// Rendered program
#[derive(Debug, Clone)]
pub struct Program {
    document: Yaml,
}

impl Program {
    pub fn render(
        project: &str,
        description: &str,
        stack: &Stack,
        outputs: &Outputs,
    ) -> Result<Self, RenderError> {
        let mut document = Mapping::new();
        document.insert(key("name"), Yaml::String(project.to_string()));
        document.insert(key("runtime"), Yaml::String("yaml".to_string()));
        document.insert(key("description"), Yaml::String(description.to_string()));

        let mut variables = Mapping::new();
        let mut resources = Mapping::new();
        for resource in stack.ordered()? {
            if resource.is_data_source() {
                variables.insert(key(&resource.binding), render_invoke(resource));
            } else {
                resources.insert(key(&resource.binding), render_resource(stack, resource));
            }
        }

        if !variables.is_empty() {
            document.insert(key("variables"), Yaml::Mapping(variables));
        }
        document.insert(key("resources"), Yaml::Mapping(resources));

        if !outputs.is_empty() {
            let mut rendered = Mapping::new();
            for (name, value) in outputs.iter() {
                rendered.insert(key(name), render_value(value, false));
            }
            document.insert(key("outputs"), Yaml::Mapping(rendered));
        }

        Ok(Self {
            document: Yaml::Mapping(document),
        })
    }

    pub fn document(&self) -> &Yaml {
        &self.document
    }

    pub fn to_yaml(&self) -> Result<String, RenderError> {
        Ok(serde_yaml::to_string(&self.document)?)
    }
}

fn key(s: &str) -> Yaml {
    Yaml::String(s.to_string())
}

fn render_properties(resource: &Resource) -> Mapping {
    resource
        .attributes
        .iter()
        .map(|(k, v)| (key(&to_property_name(k)), render_value(v, false)))
        .collect()
}

fn render_resource(stack: &Stack, resource: &Resource) -> Yaml {
    let mut entry = Mapping::new();
    entry.insert(key("type"), key(&resource.id.resource_type));
    entry.insert(key("name"), key(&resource.id.name));

    let properties = render_properties(resource);
    if !properties.is_empty() {
        entry.insert(key("properties"), Yaml::Mapping(properties));
    }

    let mut options = Mapping::new();
    if !resource.options.depends_on.is_empty() {
        options.insert(
            key("dependsOn"),
            Yaml::Sequence(
                resource
                    .options
                    .depends_on
                    .iter()
                    .map(|b| Yaml::String(format!("${{{}}}", b)))
                    .collect(),
            ),
        );
    }
    if let Some(provider) = &resource.options.provider {
        let reference = Yaml::String(format!("${{{}}}", provider));
        if resource.kind == ResourceKind::Component {
            let package = stack
                .get(provider)
                .and_then(|p| p.id.resource_type.rsplit(':').next())
                .unwrap_or("aws");
            let mut providers = Mapping::new();
            providers.insert(key(package), reference);
            options.insert(key("providers"), Yaml::Mapping(providers));
        } else {
            options.insert(key("provider"), reference);
        }
    }
    if !options.is_empty() {
        entry.insert(key("options"), Yaml::Mapping(options));
    }

    Yaml::Mapping(entry)
}

fn render_invoke(resource: &Resource) -> Yaml {
    let mut invoke = Mapping::new();
    invoke.insert(key("function"), key(&resource.id.resource_type));
    invoke.insert(key("arguments"), Yaml::Mapping(render_properties(resource)));
    if let Some(provider) = &resource.options.provider {
        let mut options = Mapping::new();
        options.insert(key("provider"), Yaml::String(format!("${{{}}}", provider)));
        invoke.insert(key("options"), Yaml::Mapping(options));
    }

    let mut entry = Mapping::new();
    entry.insert(key("fn::invoke"), Yaml::Mapping(invoke));
    Yaml::Mapping(entry)
}

/// Literal text must not be read as an interpolation by the engine
fn escape(text: &str) -> String {
    text.replace("${", "$${")
}

fn render_value(value: &Value, raw_keys: bool) -> Yaml {
    match value {
        Value::String(s) => Yaml::String(escape(s)),
        Value::Int(n) => Yaml::Number((*n).into()),
        Value::Bool(b) => Yaml::Bool(*b),
        Value::List(items) => {
            Yaml::Sequence(items.iter().map(|v| render_value(v, raw_keys)).collect())
        }
        Value::Map(map) => Yaml::Mapping(
            map.iter()
                .map(|(k, v)| {
                    let name = if raw_keys {
                        k.clone()
                    } else {
                        to_property_name(k)
                    };
                    (Yaml::String(name), render_value(v, raw_keys))
                })
                .collect(),
        ),
        Value::ResourceRef(r) => Yaml::String(r.to_string()),
        Value::Interpolate(segments) => Yaml::String(
            segments
                .iter()
                .map(|s| match s {
                    Segment::Text(t) => escape(t),
                    Segment::Ref(r) => r.to_string(),
                })
                .collect(),
        ),
        Value::Json(inner) => builtin("fn::toJSON", render_value(inner, true)),
        Value::Secret(inner) => builtin("fn::secret", render_value(inner, raw_keys)),
        Value::Archive(assets) => {
            let mut archive = Mapping::new();
            for (name, asset) in assets {
                let rendered = match asset {
                    Asset::String(text) => builtin("fn::stringAsset", Yaml::String(escape(text))),
                    Asset::FileArchive(path) => {
                        builtin("fn::fileArchive", Yaml::String(path.clone()))
                    }
                };
                archive.insert(Yaml::String(name.clone()), rendered);
            }
            builtin("fn::assetArchive", Yaml::Mapping(archive))
        }
    }
}

fn builtin(name: &str, arg: Yaml) -> Yaml {
    let mut m = Mapping::new();
    m.insert(key(name), arg);
    Yaml::Mapping(m)
}
