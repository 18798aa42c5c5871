//! Loading and interpreting the production build manifest.
//!
//! The manifest is written by the production build and read once at boot. Each output maps a
//! compiled, content-hashed file back to the entry point it was built from; lookups go the
//! other way, from an entry point to the URL of its compiled output.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ManifestFile {
  #[serde(default)]
  outputs: HashMap<String, ManifestOutput>,
}

#[derive(Debug, Deserialize)]
struct ManifestOutput {
  #[serde(default, rename = "entryPoint")]
  entry_point: Option<String>,
}

/// Entry point to compiled URL mapping.
///
/// An unloaded manifest answers every lookup with `None`, leaving callers on the
/// non-manifest path.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
  entries: Option<HashMap<String, String>>,
}

impl Manifest {
  /// A manifest that was never loaded (development and test).
  pub fn unloaded() -> Self {
    Self::default()
  }

  /// Load the manifest from disk; compiled paths are made relative to `public_dir`.
  pub fn load(path: &Path, public_dir: &str) -> Result<Self> {
    let content = fs::read_to_string(path)
      .with_context(|| format!("manifest not found at {}", path.display()))?;
    let manifest = Self::from_json(&content, public_dir)
      .with_context(|| format!("failed to parse manifest JSON at {}", path.display()))?;
    tracing::info!(
      path = %path.display(),
      entries = manifest.len(),
      "loaded build manifest"
    );
    Ok(manifest)
  }

  /// Parse manifest JSON.
  pub fn from_json(content: &str, public_dir: &str) -> Result<Self> {
    let file: ManifestFile = serde_json::from_str(content)?;
    let public_prefix = format!("{}/", public_dir.trim_matches('/'));

    let entries = file
      .outputs
      .into_iter()
      .filter_map(|(compiled, output)| {
        let entry_point = output.entry_point?;
        let compiled = compiled.replace('\\', "/");
        let relative = compiled
          .strip_prefix(&public_prefix)
          .unwrap_or(&compiled)
          .trim_start_matches('/');
        Some((normalise_key(&entry_point).to_string(), format!("/{relative}")))
      })
      .collect();

    Ok(Self {
      entries: Some(entries),
    })
  }

  /// True when a manifest file was loaded.
  pub fn is_loaded(&self) -> bool {
    self.entries.is_some()
  }

  /// Number of mapped entry points.
  pub fn len(&self) -> usize {
    self.entries.as_ref().map_or(0, HashMap::len)
  }

  /// True when nothing is mapped.
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// URL of the compiled output for an entry point such as `lib/foo.js` or `/lib/foo.js`.
  pub fn lookup(&self, entry_point: &str) -> Option<&str> {
    self
      .entries
      .as_ref()?
      .get(normalise_key(entry_point))
      .map(String::as_str)
  }
}

fn normalise_key(key: &str) -> &str {
  key.trim_start_matches('/')
}
