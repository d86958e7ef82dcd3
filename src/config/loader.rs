//! Configuration providers with environment variable expansion

use super::{Config, ConfigError};
use lazy_static::lazy_static;
use std::path::PathBuf;

/// Prefix for environment overrides, e.g. `UPLOADR__STORAGE__BUCKET`
pub const ENV_PREFIX: &str = "UPLOADR";

lazy_static! {
    // ${VAR} or ${VAR:-default}
    static ref ENV_VAR_PATTERN: regex_lite::Regex =
        regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]+))?\}")
            .expect("env var pattern is a valid regex");
}

/// Expand environment variables in a string.
///
/// Supports two syntaxes:
/// - `${VAR_NAME}` - Simple expansion, keeps placeholder if var not found
/// - `${VAR_NAME:-default}` - Expansion with default value
///
/// Variable names must start with a letter or underscore and contain only
/// uppercase letters, digits, and underscores.
pub fn expand_env_vars(s: &str) -> String {
    let mut last_match = 0;
    let mut result = String::with_capacity(s.len());

    for cap in ENV_VAR_PATTERN.captures_iter(s) {
        let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
            continue;
        };

        result.push_str(&s[last_match..full_match.start()]);

        let value = match std::env::var(var_name.as_str()) {
            Ok(val) => val,
            Err(_) => match cap.get(2) {
                Some(default) => default.as_str().to_string(),
                None => full_match.as_str().to_string(),
            },
        };
        result.push_str(&value);

        last_match = full_match.end();
    }

    result.push_str(&s[last_match..]);
    result
}

/// Source of the startup configuration
///
/// Implementations are free to read files, the environment, or nothing at all.
pub trait ConfigProvider {
    /// Produce a validated configuration
    fn load(&self) -> Result<Config, ConfigError>;
}

/// Loads a YAML file, expands `${VAR}` placeholders, then applies
/// `UPLOADR__SECTION__FIELD` environment overrides.
#[derive(Debug, Clone)]
pub struct FileConfigProvider {
    path: PathBuf,
    env_prefix: String,
}

impl FileConfigProvider {
    /// Create a provider for the given file
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            env_prefix: ENV_PREFIX.to_string(),
        }
    }

    /// Use a different prefix for environment overrides
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Parse YAML content into a validated configuration
    pub fn parse(&self, content: &str) -> Result<Config, ConfigError> {
        let expanded = expand_env_vars(content);

        let config: Config = ::config::Config::builder()
            .add_source(::config::File::from_str(
                &expanded,
                ::config::FileFormat::Yaml,
            ))
            .add_source(
                ::config::Environment::with_prefix(&self.env_prefix)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }
}

impl ConfigProvider for FileConfigProvider {
    fn load(&self) -> Result<Config, ConfigError> {
        let content = std::fs::read_to_string(&self.path)?;
        self.parse(&content)
    }
}

/// Hands out a fixed configuration
#[derive(Debug, Clone)]
pub struct StaticConfigProvider {
    config: Config,
}

impl StaticConfigProvider {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigProvider for StaticConfigProvider {
    fn load(&self) -> Result<Config, ConfigError> {
        self.config.validate()?;
        Ok(self.config.clone())
    }
}
