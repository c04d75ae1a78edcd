//! Normalizer configuration.

use std::fs;
use std::path::{Path, PathBuf};

use jsonc_parser::ParseOptions;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::factory::LognormFactory;
use crate::loader::RuleSource;
use crate::options::LognormOptions;
use crate::{Library, LognormError};

/// Configuration for one normalizer.
///
/// ```jsonc
/// {
///   // optional; otherwise RSM_LOGNORM_LIBRARY / RSM_LOGNORM_PATH / system lookup
///   "library": "/usr/lib/librsmlognorm.so",
///   "options": { "add_original_msg": true },
///   "rulebase": "rules/syslog.rulebase"
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NormalizerConfig {
    /// Explicit path to the shared library.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library: Option<PathBuf>,

    /// Context feature toggles.
    #[serde(default)]
    pub options: LognormOptions,

    /// Inline rule text. Mutually exclusive with `rulebase`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<String>,

    /// Rulebase file. Mutually exclusive with `rules`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rulebase: Option<PathBuf>,

    /// Forces the debug callback on or off.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<bool>,

    /// Base directory for resolving relative paths.
    /// This is usually the directory containing the configuration file.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

impl NormalizerConfig {
    /// Config file names, in lookup order.
    pub const CONFIG_FILES: &'static [&'static str] =
        &[".rsm-lognorm.jsonc", ".rsm-lognorm.json"];

    /// Loads configuration from a JSON or JSONC file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LognormError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            error!("Failed to read config {}: {}", path.display(), e);
            LognormError::Io(e)
        })?;

        let mut config = Self::from_json(&content)?;
        if let Some(parent) = path.parent() {
            config.base_dir = Some(parent.to_path_buf());
        }
        Ok(config)
    }

    /// Looks for a config file in `dir`.
    pub fn discover(dir: impl AsRef<Path>) -> Option<PathBuf> {
        let dir = dir.as_ref();
        Self::CONFIG_FILES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
    }

    /// Parses configuration from a JSON string. Comments and trailing
    /// commas are accepted.
    pub fn from_json(json: &str) -> Result<Self, LognormError> {
        let value = jsonc_parser::parse_to_serde_value(json, &ParseOptions::default())
            .map_err(|e| LognormError::config(format!("Invalid JSON: {}", e)))?
            .unwrap_or(serde_json::Value::Object(serde_json::Map::new()));

        let config: Self = serde_json::from_value(value)
            .map_err(|e| LognormError::config(format!("Invalid config: {}", e)))?;
        config.rule_source()?;
        Ok(config)
    }

    /// The configured rule source, with relative rulebase paths resolved
    /// against `base_dir`.
    pub fn rule_source(&self) -> Result<RuleSource, LognormError> {
        match (&self.rules, &self.rulebase) {
            (Some(rules), None) => Ok(RuleSource::text(rules.clone())),
            (None, Some(path)) => Ok(RuleSource::File(self.resolve(path))),
            (Some(_), Some(_)) => Err(LognormError::config(
                "`rules` and `rulebase` are mutually exclusive",
            )),
            (None, None) => Err(LognormError::config(
                "one of `rules` or `rulebase` is required",
            )),
        }
    }

    /// Builds a factory from this configuration.
    ///
    /// An explicit `library` is bound here; otherwise the factory binds the
    /// system library when it first builds.
    pub fn into_factory(self) -> Result<LognormFactory, LognormError> {
        let mut factory = LognormFactory::new(self.rule_source()?).with_options(self.options);
        if let Some(path) = &self.library {
            factory = factory.with_library(Library::open(self.resolve(path))?);
        }
        if let Some(debug) = self.debug {
            factory = factory.with_debug(debug);
        }
        Ok(factory)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}
