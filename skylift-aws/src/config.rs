//! Stack configuration
//!
//! Settings come from a stack file (`Pulumi.<stack>.yaml`) whose `config:`
//! map holds `namespace:key` entries; keys without a namespace belong to the
//! project. `SKYLIFT_<NAMESPACE>_<KEY>` environment variables override the
//! file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use heck::ToShoutySnakeCase;
use log::debug;
use serde::Deserialize;
use thiserror::Error;

pub const ENV_PREFIX: &str = "SKYLIFT_";

pub const DEFAULT_PROJECT: &str = "site";
pub const API_NAMESPACE: &str = "api";
pub const AWS_NAMESPACE: &str = "aws";

const DEFAULT_PATH: &str = "./www";
const DEFAULT_INDEX_DOCUMENT: &str = "index.html";
const DEFAULT_ERROR_DOCUMENT: &str = "error.html";
const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_CONTAINER_PORT: u16 = 80;
const DEFAULT_CONTAINER_NAME: &str = "dev-backend-container";
const DEFAULT_CPU: u32 = 512;
const DEFAULT_MEMORY: u32 = 128;
const DEFAULT_DESIRED_COUNT: u32 = 1;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse stack configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Missing required configuration value '{0}'")]
    Missing(String),

    #[error("Configuration value '{0}' is encrypted; encrypted values are not supported")]
    Secure(String),

    #[error("Configuration value '{0}' must be a scalar")]
    NotScalar(String),

    #[error("Configuration value '{key}' must be an unsigned integer, got '{value}'")]
    InvalidNumber { key: String, value: String },

    #[error("Configuration value '{key}' is not a valid DNS name '{value}': {reason}")]
    InvalidName {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Invalid secrets file {path}: {message}")]
    Secrets { path: PathBuf, message: String },
}

/// Source of environment overrides
///
/// Keys are given without the `SKYLIFT_` prefix.
pub trait EnvSource {
    fn get(&self, key: &str) -> Option<String>;
}

/// Reads overrides from the process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(format!("{}{}", ENV_PREFIX, key)).ok()
    }
}

impl EnvSource for BTreeMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        BTreeMap::get(self, key).cloned()
    }
}

/// Environment variable name (without prefix) for a namespaced key
pub fn env_key(namespace: &str, key: &str) -> String {
    format!("{}_{}", namespace.to_shouty_snake_case(), key.to_shouty_snake_case())
}

#[derive(Debug, Deserialize)]
struct StackFile {
    #[serde(default)]
    config: BTreeMap<String, serde_yaml::Value>,
}

/// Raw `namespace:key` values of one stack
#[derive(Debug, Clone, Default)]
pub struct StackConfig {
    project: String,
    values: BTreeMap<String, serde_yaml::Value>,
    base_dir: PathBuf,
}

impl StackConfig {
    pub fn empty(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            values: BTreeMap::new(),
            base_dir: PathBuf::from("."),
        }
    }

    /// Load a stack file; relative paths in it resolve against its directory
    pub fn load(path: &Path, project: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_yaml(&content, project)?;
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            config.base_dir = dir.to_path_buf();
        }
        Ok(config)
    }

    pub fn from_yaml(content: &str, project: &str) -> Result<Self, ConfigError> {
        let file: StackFile = serde_yaml::from_str(content)?;
        let values = file
            .config
            .into_iter()
            .map(|(k, v)| {
                let key = if k.contains(':') {
                    k
                } else {
                    format!("{}:{}", project, k)
                };
                (key, v)
            })
            .collect();
        Ok(Self {
            project: project.to_string(),
            values,
            base_dir: PathBuf::from("."),
        })
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn set(&mut self, namespace: &str, key: &str, value: impl Into<String>) {
        self.values.insert(
            format!("{}:{}", namespace, key),
            serde_yaml::Value::String(value.into()),
        );
    }

    /// File value for `namespace:key`
    pub fn get(&self, namespace: &str, key: &str) -> Result<Option<String>, ConfigError> {
        let full = format!("{}:{}", namespace, key);
        match self.values.get(&full) {
            None | Some(serde_yaml::Value::Null) => Ok(None),
            Some(serde_yaml::Value::String(s)) => Ok(Some(s.clone())),
            Some(serde_yaml::Value::Number(n)) => Ok(Some(n.to_string())),
            Some(serde_yaml::Value::Bool(b)) => Ok(Some(b.to_string())),
            Some(serde_yaml::Value::Mapping(m)) if m.contains_key("secure") => {
                Err(ConfigError::Secure(full))
            }
            Some(_) => Err(ConfigError::NotScalar(full)),
        }
    }

    /// Absolute form of `path`; the engine runs from the program directory
    fn resolve_path(&self, path: &str) -> Result<PathBuf, ConfigError> {
        let joined = self.base_dir.join(path);
        std::path::absolute(&joined).map_err(|source| ConfigError::Io {
            path: joined,
            source,
        })
    }
}

/// Looks values up in the environment first, then in the stack file
struct Resolver<'a, E: EnvSource> {
    config: &'a StackConfig,
    env: &'a E,
}

impl<E: EnvSource> Resolver<'_, E> {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<String>, ConfigError> {
        if let Some(value) = self.env.get(&env_key(namespace, key)) {
            debug!("{}:{} overridden from environment", namespace, key);
            return Ok(Some(value));
        }
        self.config.get(namespace, key)
    }

    fn get_or(&self, namespace: &str, key: &str, default: &str) -> Result<String, ConfigError> {
        Ok(self
            .get(namespace, key)?
            .unwrap_or_else(|| default.to_string()))
    }

    fn require(&self, namespace: &str, key: &str) -> Result<String, ConfigError> {
        self.get(namespace, key)?
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ConfigError::Missing(format!("{}:{}", namespace, key)))
    }

    fn number<T: std::str::FromStr>(
        &self,
        namespace: &str,
        key: &str,
        default: T,
    ) -> Result<T, ConfigError> {
        match self.get(namespace, key)? {
            None => Ok(default),
            Some(value) => value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidNumber {
                    key: format!("{}:{}", namespace, key),
                    value,
                }),
        }
    }
}

/// Backend (container service) settings from the `api` namespace
#[derive(Debug, Clone, PartialEq)]
pub struct BackendSettings {
    pub container_port: u16,
    pub container_name: String,
    pub cpu: u32,
    pub memory: u32,
    pub desired_count: u32,
    /// Pinned image tag; the most recent tag in the repository otherwise
    pub image_tag: Option<String>,
    /// Secret bundle keyed by environment variable name
    pub secrets: BTreeMap<String, String>,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            container_port: DEFAULT_CONTAINER_PORT,
            container_name: DEFAULT_CONTAINER_NAME.to_string(),
            cpu: DEFAULT_CPU,
            memory: DEFAULT_MEMORY,
            desired_count: DEFAULT_DESIRED_COUNT,
            image_tag: None,
            secrets: BTreeMap::new(),
        }
    }
}

/// Resolved site configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SiteConfig {
    pub project: String,
    /// Local directory synced to the bucket
    pub path: PathBuf,
    pub index_document: String,
    pub error_document: String,
    /// Root domain with a hosted zone and certificate (e.g., "example.com")
    pub domain: String,
    /// Label under `domain` the site is served at (e.g., "dev")
    pub subdomain: String,
    /// Primary region
    pub region: String,
    pub backend: BackendSettings,
}

impl SiteConfig {
    pub fn from_stack<E: EnvSource>(config: &StackConfig, env: &E) -> Result<Self, ConfigError> {
        let r = Resolver { config, env };
        let project = config.project();

        let domain = r.require(project, "domain")?;
        validate_domain(&format!("{}:domain", project), &domain)?;
        let subdomain = r.require(project, "subdomain")?;
        validate_label(&format!("{}:subdomain", project), &subdomain)?;
        validate_label(&format!("{}:subdomain", project), &api_label(&subdomain))?;

        let secrets = match r.get(API_NAMESPACE, "secretsFile")? {
            Some(file) => load_secrets(&config.resolve_path(&file)?)?,
            None => BTreeMap::new(),
        };

        let backend = BackendSettings {
            container_port: r.number(API_NAMESPACE, "containerPort", DEFAULT_CONTAINER_PORT)?,
            container_name: r.get_or(API_NAMESPACE, "containerName", DEFAULT_CONTAINER_NAME)?,
            cpu: r.number(API_NAMESPACE, "cpu", DEFAULT_CPU)?,
            memory: r.number(API_NAMESPACE, "memory", DEFAULT_MEMORY)?,
            desired_count: r.number(API_NAMESPACE, "desiredCount", DEFAULT_DESIRED_COUNT)?,
            image_tag: r.get(API_NAMESPACE, "imageTag")?.filter(|t| !t.is_empty()),
            secrets,
        };

        Ok(Self {
            project: project.to_string(),
            path: config.resolve_path(&r.get_or(project, "path", DEFAULT_PATH)?)?,
            index_document: r.get_or(project, "indexDocument", DEFAULT_INDEX_DOCUMENT)?,
            error_document: r.get_or(project, "errorDocument", DEFAULT_ERROR_DOCUMENT)?,
            domain,
            subdomain,
            region: r.get_or(AWS_NAMESPACE, "region", DEFAULT_REGION)?,
            backend,
        })
    }

    /// Load and resolve a stack file
    pub fn load<E: EnvSource>(path: &Path, project: &str, env: &E) -> Result<Self, ConfigError> {
        Self::from_stack(&StackConfig::load(path, project)?, env)
    }

    /// Fully qualified site host, `<subdomain>.<domain>`
    pub fn domain_name(&self) -> String {
        format!("{}.{}", self.subdomain, self.domain)
    }

    pub fn domain_url(&self) -> String {
        format!("https://{}", self.domain_name())
    }

    /// Label of the backend record, `api-<subdomain>`
    pub fn api_subdomain(&self) -> String {
        api_label(&self.subdomain)
    }

    pub fn api_domain_name(&self) -> String {
        format!("{}.{}", self.api_subdomain(), self.domain)
    }

    pub fn api_domain_url(&self) -> String {
        format!("https://{}", self.api_domain_name())
    }
}

fn api_label(subdomain: &str) -> String {
    format!("api-{}", subdomain)
}

fn validate_label(key: &str, label: &str) -> Result<(), ConfigError> {
    let fail = |reason: &str| ConfigError::InvalidName {
        key: key.to_string(),
        value: label.to_string(),
        reason: reason.to_string(),
    };
    if label.is_empty() || label.len() > 63 {
        return Err(fail("labels must be 1-63 characters"));
    }
    if !label
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-')
    {
        return Err(fail("only letters, digits and '-' are allowed"));
    }
    if label.starts_with('-') || label.ends_with('-') {
        return Err(fail("labels cannot start or end with '-'"));
    }
    Ok(())
}

fn validate_domain(key: &str, domain: &str) -> Result<(), ConfigError> {
    let trimmed = domain.trim_end_matches('.');
    if !trimmed.contains('.') {
        return Err(ConfigError::InvalidName {
            key: key.to_string(),
            value: domain.to_string(),
            reason: "expected at least two labels".to_string(),
        });
    }
    trimmed
        .split('.')
        .try_for_each(|label| validate_label(key, label))
}

/// Read a flat JSON object of secret values
fn load_secrets(path: &Path) -> Result<BTreeMap<String, String>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let fail = |message: String| ConfigError::Secrets {
        path: path.to_path_buf(),
        message,
    };
    let raw: BTreeMap<String, serde_json::Value> =
        serde_json::from_str(&content).map_err(|e| fail(e.to_string()))?;

    raw.into_iter()
        .map(|(key, value)| match value {
            serde_json::Value::String(s) => Ok((key, s)),
            serde_json::Value::Number(n) => Ok((key, n.to_string())),
            serde_json::Value::Bool(b) => Ok((key, b.to_string())),
            _ => Err(fail(format!("value of '{}' must be a string", key))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const STACK: &str = r#"
config:
  aws:region: eu-west-1
  site:domain: example.com
  site:subdomain: dev
  api:containerPort: 8080
"#;

    fn no_env() -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    #[test]
    fn defaults_are_applied() {
        let stack = StackConfig::from_yaml(STACK, "site").unwrap();
        let config = SiteConfig::from_stack(&stack, &no_env()).unwrap();

        assert!(config.path.is_absolute());
        assert!(config.path.ends_with("www"));
        assert_eq!(config.index_document, "index.html");
        assert_eq!(config.error_document, "error.html");
        assert_eq!(config.region, "eu-west-1");
        assert_eq!(config.backend.container_port, 8080);
        assert_eq!(config.backend.container_name, "dev-backend-container");
        assert_eq!(config.backend.cpu, 512);
        assert_eq!(config.backend.memory, 128);
        assert_eq!(config.backend.desired_count, 1);
        assert!(config.backend.image_tag.is_none());
        assert!(config.backend.secrets.is_empty());
    }

    #[test]
    fn derived_names() {
        let stack = StackConfig::from_yaml(STACK, "site").unwrap();
        let config = SiteConfig::from_stack(&stack, &no_env()).unwrap();

        assert_eq!(config.domain_name(), "dev.example.com");
        assert_eq!(config.domain_url(), "https://dev.example.com");
        assert_eq!(config.api_domain_name(), "api-dev.example.com");
    }

    #[test]
    fn project_namespace_is_implicit() {
        let yaml = "config:\n  domain: example.com\n  subdomain: www\n";
        let stack = StackConfig::from_yaml(yaml, "site").unwrap();
        let config = SiteConfig::from_stack(&stack, &no_env()).unwrap();
        assert_eq!(config.domain_name(), "www.example.com");
        assert_eq!(config.region, "us-east-1");
    }

    #[test]
    fn missing_domain_is_an_error() {
        let stack = StackConfig::from_yaml("config:\n  site:subdomain: dev\n", "site").unwrap();
        let err = SiteConfig::from_stack(&stack, &no_env()).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(ref k) if k == "site:domain"));
    }

    #[test]
    fn environment_overrides_file() {
        let stack = StackConfig::from_yaml(STACK, "site").unwrap();
        let mut env = no_env();
        env.insert("API_CONTAINER_PORT".to_string(), "3000".to_string());
        env.insert("SITE_SUBDOMAIN".to_string(), "staging".to_string());
        env.insert("API_IMAGE_TAG".to_string(), "v1.2.3".to_string());

        let config = SiteConfig::from_stack(&stack, &env).unwrap();
        assert_eq!(config.backend.container_port, 3000);
        assert_eq!(config.subdomain, "staging");
        assert_eq!(config.backend.image_tag.as_deref(), Some("v1.2.3"));
    }

    #[test]
    fn env_key_format() {
        assert_eq!(env_key("api", "containerPort"), "API_CONTAINER_PORT");
        assert_eq!(env_key("aws", "region"), "AWS_REGION");
    }

    #[test]
    fn secure_values_are_rejected() {
        let yaml = "config:\n  site:domain:\n    secure: AAABAD\n  site:subdomain: dev\n";
        let stack = StackConfig::from_yaml(yaml, "site").unwrap();
        let err = SiteConfig::from_stack(&stack, &no_env()).unwrap_err();
        assert!(matches!(err, ConfigError::Secure(ref k) if k == "site:domain"));
    }

    #[test]
    fn invalid_numbers_and_names() {
        let mut stack = StackConfig::from_yaml(STACK, "site").unwrap();
        stack.set("api", "cpu", "lots");
        let err = SiteConfig::from_stack(&stack, &no_env()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidNumber { .. }));

        let mut stack = StackConfig::from_yaml(STACK, "site").unwrap();
        stack.set("site", "subdomain", "dev.internal");
        let err = SiteConfig::from_stack(&stack, &no_env()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidName { .. }));

        let mut stack = StackConfig::from_yaml(STACK, "site").unwrap();
        stack.set("api", "containerPort", "70000");
        assert!(SiteConfig::from_stack(&stack, &no_env()).is_err());
    }

    #[test]
    fn load_resolves_paths_relative_to_stack_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("secrets.json"),
            r#"{"DATABASE_URL": "postgres://db", "PORT": 5432}"#,
        )
        .unwrap();
        let stack_file = dir.path().join("Pulumi.dev.yaml");
        std::fs::write(
            &stack_file,
            format!("{}  api:secretsFile: secrets.json\n", STACK.trim_start()),
        )
        .unwrap();

        let config = SiteConfig::load(&stack_file, "site", &no_env()).unwrap();
        assert_eq!(config.path, dir.path().join("www"));
        assert_eq!(config.backend.secrets.len(), 2);
        assert_eq!(config.backend.secrets["PORT"], "5432");
    }

    #[test]
    fn relative_stack_file_yields_absolute_site_path() {
        let dir = tempfile::tempdir_in(".").unwrap();
        std::fs::create_dir(dir.path().join("conf")).unwrap();
        let stack_file = dir.path().join("conf").join("Pulumi.dev.yaml");
        std::fs::write(&stack_file, STACK.trim_start()).unwrap();
        assert!(stack_file.is_relative());

        let config = SiteConfig::load(&stack_file, "site", &no_env()).unwrap();
        assert!(config.path.is_absolute());
        assert_eq!(
            config.path,
            std::env::current_dir().unwrap().join(dir.path()).join("conf").join("www")
        );
    }

    #[test]
    fn api_label_must_fit_a_dns_label() {
        let mut stack = StackConfig::from_yaml(STACK, "site").unwrap();
        stack.set("site", "subdomain", "a".repeat(60));
        let err = SiteConfig::from_stack(&stack, &no_env()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidName { ref value, .. } if value.starts_with("api-")));

        stack.set("site", "subdomain", "a".repeat(59));
        let config = SiteConfig::from_stack(&stack, &no_env()).unwrap();
        assert_eq!(config.api_subdomain().len(), 63);
    }

    #[test]
    fn nested_secret_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.json");
        std::fs::write(&path, r#"{"NESTED": {"a": 1}}"#).unwrap();

        let err = load_secrets(&path).unwrap_err();
        assert!(err.to_string().contains("NESTED"));
    }
}
