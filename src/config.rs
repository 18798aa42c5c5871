//! Pipeline configuration loader describing the application layout and middleware order.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

const DEFAULT_CONFIG_FILE: &str = "stagehand.config.json";

/// Environment variable overriding the configured environment.
pub const ENVIRONMENT_VAR: &str = "STAGEHAND_ENV";

/// Runtime environment the pipeline is booted in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
  /// Per-request resolution caches, overlays for compile errors, outside-root serving.
  #[default]
  Development,
  /// Same as development; kept distinct so fixtures can opt out of dev-only middleware.
  Test,
  /// Manifest lookups, process-wide resolution cache, generic 5xx responses.
  Production,
}

impl Environment {
  /// Read the environment from [`ENVIRONMENT_VAR`], if set to a known value.
  pub fn from_env() -> Option<Self> {
    std::env::var(ENVIRONMENT_VAR)
      .ok()
      .and_then(|value| Self::parse(&value))
  }

  /// Parse a case-insensitive environment name.
  pub fn parse(value: &str) -> Option<Self> {
    match value.trim().to_ascii_lowercase().as_str() {
      "development" | "dev" => Some(Self::Development),
      "test" => Some(Self::Test),
      "production" | "prod" => Some(Self::Production),
      _ => None,
    }
  }

  /// Lower-case name used for per-environment file lookups.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Development => "development",
      Self::Test => "test",
      Self::Production => "production",
    }
  }

  /// True in production.
  pub fn is_production(self) -> bool {
    self == Self::Production
  }
}

/// Command used to invoke the external builder.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BuilderCommandConfig {
  /// Executable, relative to the application root or on `PATH`.
  pub program: String,
  /// Extra arguments placed before the generated ones.
  pub args: Vec<String>,
}

impl Default for BuilderCommandConfig {
  fn default() -> Self {
    Self {
      program: "node_modules/.bin/stagehand-builder".into(),
      args: Vec::new(),
    }
  }
}

/// Discoverable pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
  /// Application root; relative values are resolved against the config file directory.
  pub root: PathBuf,
  /// Directory (relative to root) holding precompiled and static files.
  pub public_dir: String,
  /// Build manifest written by the production build, relative to root.
  pub manifest_path: String,
  /// Import map JSON file, relative to root.
  pub import_map_path: String,
  /// Runtime environment.
  pub environment: Environment,
  /// Join multiple side-loaded scripts into one multi-entry build.
  pub code_splitting: bool,
  /// `max-age` used for immutable responses.
  pub cache_max_age: u64,
  /// Ordered middleware candidate names.
  pub middleware: Vec<String>,
  /// Installed packages addressable through the `gem:` prefix, by name.
  pub packages: BTreeMap<String, PathBuf>,
  /// External builder invocation.
  pub builder: BuilderCommandConfig,
  /// Keep fetched `url:` responses in memory for the life of the process.
  pub remote_cache: bool,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      root: PathBuf::from("."),
      public_dir: "public".into(),
      manifest_path: "public/assets/manifest.json".into(),
      import_map_path: "config/import_map.json".into(),
      environment: Environment::Development,
      code_splitting: true,
      cache_max_age: 2_592_000,
      middleware: ["static", "url", "gem", "npm", "build", "outside_root"]
        .into_iter()
        .map(String::from)
        .collect(),
      packages: BTreeMap::new(),
      builder: BuilderCommandConfig::default(),
      remote_cache: true,
    }
  }
}

impl PipelineConfig {
  /// Attempt to load configuration from the provided directory.
  ///
  /// A missing or unparsable file falls back to defaults rooted at `dir`.
  pub fn discover(dir: &Path) -> Self {
    let candidate = dir.join(DEFAULT_CONFIG_FILE);
    let mut config = Self::from_path(&candidate).unwrap_or_else(|err| {
      if candidate.exists() {
        tracing::warn!(path = %candidate.display(), error = %err, "ignoring unreadable config");
      }
      Self::default()
    });
    config.anchor(dir);
    config
  }

  /// Read configuration from a specific JSON file.
  pub fn from_path(path: &Path) -> Result<Self> {
    let content = fs::read_to_string(path)
      .with_context(|| format!("failed to read {}", path.display()))?;
    let mut config: Self = serde_json::from_str(&content)
      .with_context(|| format!("failed to parse {}", path.display()))?;
    if let Some(parent) = path.parent() {
      config.anchor(parent);
    }
    if let Some(environment) = Environment::from_env() {
      config.environment = environment;
    }
    Ok(config)
  }

  fn anchor(&mut self, dir: &Path) {
    if self.root.is_relative() {
      self.root = dir.join(&self.root);
    }
    for path in self.packages.values_mut() {
      if path.is_relative() {
        *path = self.root.join(&*path);
      }
    }
  }

  /// Directory static files are served from.
  pub fn public_root(&self) -> PathBuf {
    self.root.join(&self.public_dir)
  }

  /// Absolute location of the production manifest.
  pub fn manifest_file(&self) -> PathBuf {
    self.root.join(&self.manifest_path)
  }

  /// Import map for the current environment, preferring `<stem>.<environment>.json`.
  pub fn import_map_file(&self) -> PathBuf {
    let base = self.root.join(&self.import_map_path);
    let specific = base.with_extension(format!("{}.json", self.environment.as_str()));
    if specific.is_file() { specific } else { base }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::tempdir;

  #[test]
  fn discover_defaults_when_missing() {
    let dir = tempdir().unwrap();
    let config = PipelineConfig::discover(dir.path());

    assert_eq!(config.root, dir.path().join("."));
    assert_eq!(config.environment, Environment::Development);
    assert_eq!(config.middleware.first().map(String::as_str), Some("static"));
    assert_eq!(config.public_root(), dir.path().join(".").join("public"));
  }

  #[test]
  fn reads_partial_config_with_defaults() {
    let dir = tempdir().unwrap();
    fs::write(
      dir.path().join(DEFAULT_CONFIG_FILE),
      r#"{"environment": "production", "packages": {"ui": "vendor/ui"}, "code_splitting": false}"#,
    )
    .unwrap();

    let config = PipelineConfig::discover(dir.path());
    assert!(config.environment.is_production() || Environment::from_env().is_some());
    assert!(!config.code_splitting);
    assert_eq!(config.packages["ui"], dir.path().join(".").join("vendor/ui"));
    assert_eq!(config.public_dir, "public");
  }

  #[test]
  fn prefers_environment_specific_import_map() {
    let dir = tempdir().unwrap();
    fs::create_dir_all(dir.path().join("config")).unwrap();
    fs::write(dir.path().join("config/import_map.json"), "{}").unwrap();

    let mut config = PipelineConfig {
      root: dir.path().to_path_buf(),
      ..PipelineConfig::default()
    };
    assert_eq!(config.import_map_file(), dir.path().join("config/import_map.json"));

    fs::write(dir.path().join("config/import_map.test.json"), "{}").unwrap();
    config.environment = Environment::Test;
    assert_eq!(
      config.import_map_file(),
      dir.path().join("config/import_map.test.json")
    );
  }

  #[test]
  fn parses_environment_names() {
    assert_eq!(Environment::parse("PROD"), Some(Environment::Production));
    assert_eq!(Environment::parse(" development "), Some(Environment::Development));
    assert_eq!(Environment::parse("staging"), None);
  }
}
