//! Value types shared between the resolver, the side-load tracker and the middleware chain.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

/// Result of resolving a specifier to something the browser can request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedPath {
  /// Content-hashed output path, when a production manifest maps this asset.
  pub manifest: Option<String>,
  /// URL path served by the development middleware.
  pub non_manifest: String,
  /// Location of the source file on disk.
  pub absolute: PathBuf,
}

impl ResolvedPath {
  /// The URL to emit: the manifest path when present, otherwise the non-manifest path.
  pub fn url(&self) -> &str {
    self.manifest.as_deref().unwrap_or(&self.non_manifest)
  }

  /// Non-manifest URL without any `?bundle` style query.
  pub fn url_path(&self) -> &str {
    self
      .non_manifest
      .split_once('?')
      .map_or(self.non_manifest.as_str(), |(path, _)| path)
  }
}

/// Kind of asset a side-load or a build targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AssetKind {
  /// `.js`, `.jsx`, `.ts`, `.tsx`.
  Javascript,
  /// Plain `.css`.
  Stylesheet,
  /// `.module.css`.
  CssModule,
}

impl AssetKind {
  /// Classify a path by extension; `.map` suffixes are ignored.
  pub fn from_path(path: &str) -> Option<Self> {
    let path = path.strip_suffix(".map").unwrap_or(path);
    if path.ends_with(".module.css") {
      Some(Self::CssModule)
    } else if path.ends_with(".css") {
      Some(Self::Stylesheet)
    } else if JAVASCRIPT_EXTENSIONS
      .iter()
      .any(|extension| path.ends_with(extension))
    {
      Some(Self::Javascript)
    } else {
      None
    }
  }

  /// MIME type of the compiled output.
  pub fn content_type(self) -> &'static str {
    match self {
      Self::Javascript => "application/javascript",
      Self::Stylesheet | Self::CssModule => "text/css",
    }
  }

  /// True for either stylesheet flavour.
  pub fn is_stylesheet(self) -> bool {
    matches!(self, Self::Stylesheet | Self::CssModule)
  }
}

/// Script extensions checked by the side-loader, in priority order.
pub const JAVASCRIPT_EXTENSIONS: [&str; 4] = [".js", ".ts", ".jsx", ".tsx"];

/// Stylesheet extensions checked by the side-loader; CSS modules win over plain CSS.
pub const STYLESHEET_EXTENSIONS: [&str; 2] = [".module.css", ".css"];

/// How much of the dependency graph the builder should inline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum BundleMode {
  /// Leave imports as separate requests.
  #[default]
  Unbundled,
  /// `?bundle`: inline local imports.
  Bundle,
  /// `?bundle-all`: inline everything, packages included.
  BundleAll,
}

impl BundleMode {
  /// Read the mode from a request query string such as `bundle` or `v=1&bundle-all`.
  pub fn from_query(query: Option<&str>) -> Self {
    let Some(query) = query else {
      return Self::Unbundled;
    };

    let mut mode = Self::Unbundled;
    for pair in query.split('&') {
      match pair.split_once('=').map_or(pair, |(key, _)| key) {
        "bundle-all" => return Self::BundleAll,
        "bundle" => mode = Self::Bundle,
        _ => {}
      }
    }
    mode
  }

  /// Query flag appended to URLs, if any.
  pub fn query_flag(self) -> Option<&'static str> {
    match self {
      Self::Unbundled => None,
      Self::Bundle => Some("bundle"),
      Self::BundleAll => Some("bundle-all"),
    }
  }
}

impl fmt::Display for BundleMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.query_flag().unwrap_or("none"))
  }
}
