//! Request-scoped tracking of assets implied by what a page renders.
//!
//! Rendering a view or component side-loads the scripts and stylesheets sharing its basename.
//! Each logical path is scanned once per request; the template drains the collected assets into
//! tags, and [`SideLoad::ensure_included`] reports anything it forgot to emit.

mod render;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Serialize;

pub use render::{LAZY_SCRIPTS_ID, javascript_tags, stylesheet_tags};

use crate::css_module::{MODULE_EXTENSION, path_digest};
use crate::error::{Error, Result};
use crate::models::{JAVASCRIPT_EXTENSIONS, ResolvedPath, STYLESHEET_EXTENSIONS};
use crate::resolver::PathResolver;

/// Which assets a side-load should look for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SideLoadKind {
  /// Both a script and a stylesheet.
  All,
  /// Scripts only.
  Javascript,
  /// Stylesheets only.
  Stylesheet,
}

impl SideLoadKind {
  fn javascript(self) -> bool {
    matches!(self, Self::All | Self::Javascript)
  }

  fn stylesheet(self) -> bool {
    matches!(self, Self::All | Self::Stylesheet)
  }
}

/// Asset kinds already scanned for one side-loaded path.
#[derive(Debug, Clone, Copy, Default)]
struct Scanned {
  javascript: bool,
  stylesheet: bool,
}

/// An asset waiting to be emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SideLoadAsset {
  /// URL to emit, manifest path preferred.
  pub url: String,
  /// Non-manifest URL path, used as the entry point for multi-entry builds.
  pub source: String,
  /// Path digest of a CSS module, shared with its compiled class names.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub digest: Option<String>,
  /// Loaded by the client once visible rather than eagerly.
  pub lazy: bool,
}

impl SideLoadAsset {
  fn new(resolved: &ResolvedPath, digest: Option<String>, lazy: bool) -> Self {
    Self {
      url: resolved.url().to_string(),
      source: resolved.url_path().to_string(),
      digest,
      lazy,
    }
  }
}

/// Side-load state for one request.
///
/// Never shared between requests: create one per render (see `RenderScope`) and drop it when
/// the response is done.
#[derive(Debug, Default)]
pub struct SideLoad {
  entries: BTreeMap<String, Scanned>,
  javascript: IndexMap<String, SideLoadAsset>,
  stylesheets: IndexMap<String, SideLoadAsset>,
  css_modules: BTreeSet<String>,
}

impl SideLoad {
  /// Empty state.
  pub fn new() -> Self {
    Self::default()
  }

  /// Side-load the assets next to `path` (extension-less, app-relative or absolute).
  pub fn append(&mut self, resolver: &PathResolver, path: &str, kind: SideLoadKind) -> Result<()> {
    self.append_with(resolver, path, kind, false)
  }

  /// Like [`Self::append`], marking scripts for lazy loading.
  pub fn append_lazy(
    &mut self,
    resolver: &PathResolver,
    path: &str,
    kind: SideLoadKind,
  ) -> Result<()> {
    self.append_with(resolver, path, kind, true)
  }

  fn append_with(
    &mut self,
    resolver: &PathResolver,
    path: &str,
    kind: SideLoadKind,
    lazy: bool,
  ) -> Result<()> {
    let scanned = self.entries.entry(path.to_string()).or_default();
    let scan_javascript = kind.javascript() && !scanned.javascript;
    let scan_stylesheet = kind.stylesheet() && !scanned.stylesheet;
    scanned.javascript |= scan_javascript;
    scanned.stylesheet |= scan_stylesheet;
    if !scan_javascript && !scan_stylesheet {
      tracing::trace!(path, "side-load already scanned");
      return Ok(());
    }

    let base = side_load_base(resolver.root(), path);
    if scan_javascript {
      if let Some(file) = first_existing(&base, &JAVASCRIPT_EXTENSIONS) {
        let resolved = resolver.resolve_paths(&file)?;
        tracing::debug!(path, url = resolved.url(), "side-loaded script");
        self
          .javascript
          .entry(resolved.url().to_string())
          .or_insert_with(|| SideLoadAsset::new(&resolved, None, lazy));
      }
    }

    if scan_stylesheet {
      if let Some(file) = first_existing(&base, &STYLESHEET_EXTENSIONS) {
        let resolved = resolver.resolve_paths(&file)?;
        if file.ends_with(MODULE_EXTENSION) {
          let digest = path_digest(resolved.url_path());
          self.register_css_module(&resolved, &digest);
        } else {
          tracing::debug!(path, url = resolved.url(), "side-loaded stylesheet");
          self
            .stylesheets
            .entry(resolved.url().to_string())
            .or_insert_with(|| SideLoadAsset::new(&resolved, None, false));
        }
      }
    }

    Ok(())
  }

  /// Queue a CSS module whose classes were compiled; later registrations of the same module
  /// in this request are ignored, even after it has been emitted.
  pub fn register_css_module(&mut self, resolved: &ResolvedPath, digest: &str) {
    if !self.css_modules.insert(resolved.url_path().to_string()) {
      return;
    }

    tracing::debug!(url = resolved.url(), digest, "side-loaded css module");
    self
      .stylesheets
      .entry(resolved.url().to_string())
      .or_insert_with(|| SideLoadAsset::new(resolved, Some(digest.to_string()), false));
  }

  /// Queued stylesheets in registration order, drained when `delete` is set.
  pub fn each_stylesheet(&mut self, delete: bool) -> Vec<SideLoadAsset> {
    collect(&mut self.stylesheets, delete)
  }

  /// Queued scripts in registration order, drained when `delete` is set.
  pub fn each_javascript(&mut self, delete: bool) -> Vec<SideLoadAsset> {
    collect(&mut self.javascript, delete)
  }

  /// True while any stylesheet is queued.
  pub fn css_imported(&self) -> bool {
    !self.stylesheets.is_empty()
  }

  /// True while any script is queued.
  pub fn js_imported(&self) -> bool {
    !self.javascript.is_empty()
  }

  /// Number of distinct paths scanned so far.
  pub fn entry_count(&self) -> usize {
    self.entries.len()
  }

  /// Forget everything.
  pub fn reset(&mut self) {
    self.entries.clear();
    self.javascript.clear();
    self.stylesheets.clear();
    self.css_modules.clear();
  }

  /// URLs still queued, scripts first.
  pub fn leftovers(&self) -> Vec<String> {
    self
      .javascript
      .keys()
      .chain(self.stylesheets.keys())
      .cloned()
      .collect()
  }

  /// Fail when queued assets were never drained into the page.
  pub fn ensure_included(&self) -> Result<()> {
    let leftovers = self.leftovers();
    if leftovers.is_empty() {
      Ok(())
    } else {
      Err(Error::NotIncluded(leftovers))
    }
  }
}

fn collect(assets: &mut IndexMap<String, SideLoadAsset>, delete: bool) -> Vec<SideLoadAsset> {
  if delete {
    assets.drain(..).map(|(_, asset)| asset).collect()
  } else {
    assets.values().cloned().collect()
  }
}

fn side_load_base(root: &Path, path: &str) -> PathBuf {
  let candidate = Path::new(path);
  if candidate.starts_with(root) {
    candidate.to_path_buf()
  } else {
    root.join(path.trim_start_matches('/'))
  }
}

/// First `base + extension` that is a readable file.
fn first_existing(base: &Path, extensions: &[&str]) -> Option<String> {
  let base = base.to_string_lossy();
  extensions
    .iter()
    .map(|extension| format!("{base}{extension}"))
    .find(|candidate| Path::new(candidate).is_file())
}
