//! Loader for fetch configuration with YAML + environment overlays.
//!
//! A configuration document carries the process-wide [`GlobalSettings`] and
//! a map of named [`SourceConfig`]s:
//!
//! ```yaml
//! version: "1"
//! settings:
//!   verify_tls: true
//!   user_agent: "trawl/0.1"
//!   browser_endpoint: "http://127.0.0.1:9222/json/version"
//! sources:
//!   news:
//!     driver:
//!       use_browser: true
//!       sleep: 3
//!       headers:
//!         - { key: "Accept-Language", value: "en" }
//!       clicks:
//!         - { xpath: "//button[@id='more']", sleep: 1 }
//! ```
//!
//! Precedence: later sources override earlier ones, and `TRAWL__`-prefixed
//! environment variables (`__` between path segments, values parsed) override
//! every file. `${VAR}` placeholders in string values are expanded after
//! merging.
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use trawl_common::{GlobalSettings, SourceConfig};

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrawlConfig {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub settings: GlobalSettings,
    #[serde(default)]
    pub sources: BTreeMap<String, SourceConfig>,
}

impl TrawlConfig {
    pub fn source(&self, name: &str) -> Option<&SourceConfig> {
        self.sources.get(name)
    }
}

fn expand_env_in_value(v: &mut Value) {
    match v {
        Value::String(s) => {
            if s.contains('$') {
                let mut cur = std::mem::take(s);
                for _ in 0..MAXIMUM_ENV_EXPANSION_DEPTH {
                    let expanded = match shellexpand::env(&cur) {
                        Ok(cow) => cow.into_owned(),
                        Err(_) => cur.clone(),
                    };
                    if expanded == cur {
                        break;
                    }
                    cur = expanded;
                }
                *s = cur;
            }
        }
        Value::Array(arr) => arr.iter_mut().for_each(expand_env_in_value),
        Value::Object(obj) => obj.values_mut().for_each(expand_env_in_value),
        _ => {}
    }
}

/// Builder hides the `config` crate wiring (YAML + env overrides).
pub struct TrawlConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
}

impl Default for TrawlConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl TrawlConfigLoader {
    /// Start with no file sources. The `TRAWL__` environment overlay is
    /// applied by [`load`](Self::load) on top of everything added here.
    ///
    /// ```
    /// use trawl_config::TrawlConfigLoader;
    ///
    /// let config = TrawlConfigLoader::new()
    ///     .with_yaml_str("version: '1'\nsources: {}")
    ///     .load()
    ///     .expect("valid config");
    ///
    /// assert_eq!(config.version.as_deref(), Some("1"));
    /// assert!(config.settings.verify_tls);
    /// assert!(config.sources.is_empty());
    /// ```
    pub fn new() -> Self {
        Self {
            builder: Config::builder(),
        }
    }

    /// Attach a required YAML/TOML/JSON file; the `config` crate infers format by suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Attach a file that may be absent.
    pub fn with_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(false));
        self
    }

    /// Merge an inline YAML snippet.
    ///
    /// ```
    /// use trawl_config::TrawlConfigLoader;
    ///
    /// let cfg = TrawlConfigLoader::new()
    ///     .with_yaml_str(
    ///         r#"
    /// settings:
    ///   verify_tls: false
    ///   user_agent: "TestAgent/1.0"
    /// sources:
    ///   news:
    ///     driver:
    ///       use_browser: true
    ///       sleep: 1
    /// "#,
    ///     )
    ///     .load()
    ///     .unwrap();
    ///
    /// assert!(!cfg.settings.verify_tls);
    /// assert_eq!(cfg.settings.user_agent, "TestAgent/1.0");
    /// assert!(cfg.source("news").unwrap().uses_browser());
    /// ```
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(yaml, config::FileFormat::Yaml));
        self
    }

    /// Merge all sources with the environment last, expand `${VAR}`
    /// placeholders and deserialize.
    pub fn load(self) -> Result<TrawlConfig, ConfigError> {
        let cfg = self
            .builder
            .add_source(
                Environment::with_prefix("TRAWL")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut v: Value = cfg.try_deserialize()?;
        expand_env_in_value(&mut v);

        serde_json::from_value(v).map_err(|e| ConfigError::Message(e.to_string()))
    }
}
