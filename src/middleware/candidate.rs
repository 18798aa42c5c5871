//! The middleware strategy table.
//!
//! Every candidate is the same struct; they differ only in the predicate deciding whether a
//! request path concerns them, the root they serve from and how the path is rewritten relative
//! to that root.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::models::AssetKind;
use crate::resolver::{NPM_PREFIX, PACKAGE_PREFIX, URL_PREFIX};

use super::path::clean_path;

/// A request path after cleaning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPath {
  /// Path exactly as received, still percent-encoded.
  pub raw: String,
  /// Decoded, normalised path.
  pub cleaned: String,
  /// Query string without the `?`.
  pub query: Option<String>,
  /// The request asked for `<asset>.map`.
  pub source_map: bool,
}

impl RequestPath {
  /// Clean `raw`, returning `None` when it is unsafe.
  pub fn parse(raw: &str, query: Option<&str>) -> Option<Self> {
    let cleaned = clean_path(raw)?;
    Some(Self {
      raw: raw.to_string(),
      source_map: cleaned.ends_with(".map"),
      cleaned,
      query: query.map(str::to_string),
    })
  }

  /// Cleaned path of the underlying asset, without any `.map` suffix.
  pub fn asset_path(&self) -> &str {
    if self.source_map {
      self.cleaned.strip_suffix(".map").unwrap_or(&self.cleaned)
    } else {
      &self.cleaned
    }
  }

  /// Kind of asset named by the path.
  pub fn asset_kind(&self) -> Option<AssetKind> {
    AssetKind::from_path(self.asset_path())
  }

  /// Last segment of the asset path, used in `sourceMappingURL` trailers.
  pub fn file_name(&self) -> &str {
    let path = self.asset_path();
    path.rsplit('/').next().unwrap_or(path)
  }
}

/// Where candidates may serve from.
#[derive(Debug, Clone)]
pub struct CandidateRoots {
  /// Application root.
  pub root: PathBuf,
  /// Static file root.
  pub public_root: PathBuf,
  /// Installed packages by name.
  pub packages: BTreeMap<String, PathBuf>,
}

/// What a matching candidate does with the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateAction {
  /// Serve the file as-is.
  Static,
  /// Compile through the builder.
  Build,
  /// Fetch from the network through the remote cache.
  Remote,
}

/// One entry of the ordered middleware list.
#[derive(Debug, Clone, Copy)]
pub struct MiddlewareCandidate {
  /// Configuration name, echoed in the `X-Stagehand-Middleware` header.
  pub name: &'static str,
  /// Skipped outside development and test.
  pub development_only: bool,
  /// Prefix and extension test; readability is checked separately.
  pub applies: fn(&RequestPath) -> bool,
  /// Effective filesystem root for the request.
  pub root: fn(&CandidateRoots, &RequestPath) -> Option<PathBuf>,
  /// Path relative to the effective root.
  pub path: fn(&RequestPath) -> Option<String>,
  /// What to do on a match.
  pub action: CandidateAction,
}

impl MiddlewareCandidate {
  /// Look up a candidate by its configuration name.
  pub fn named(name: &str) -> Option<Self> {
    let candidate = match name {
      "static" => Self {
        name: "static",
        development_only: false,
        applies: |_| true,
        root: |roots, _| Some(roots.public_root.clone()),
        path: |request| Some(request.cleaned.clone()),
        action: CandidateAction::Static,
      },
      "url" => Self {
        name: "url",
        development_only: false,
        applies: |request| request.raw.starts_with(&format!("/{URL_PREFIX}")),
        root: |_, _| Some(PathBuf::new()),
        path: |request| {
          request
            .raw
            .strip_prefix('/')
            .and_then(|raw| raw.strip_prefix(URL_PREFIX))
            .map(str::to_string)
        },
        action: CandidateAction::Remote,
      },
      "gem" => Self {
        name: "gem",
        development_only: false,
        applies: |request| {
          request.asset_kind().is_some() && prefixed(request, PACKAGE_PREFIX).is_some()
        },
        root: |roots, request| {
          let (name, _) = prefixed(request, PACKAGE_PREFIX)?.split_once('/')?;
          roots.packages.get(name).cloned()
        },
        path: |request| {
          let (_, rest) = prefixed(request, PACKAGE_PREFIX)?.split_once('/')?;
          Some(rest.to_string())
        },
        action: CandidateAction::Build,
      },
      "npm" => Self {
        name: "npm",
        development_only: false,
        applies: |request| {
          request.asset_kind().is_some() && prefixed(request, NPM_PREFIX).is_some()
        },
        root: |roots, _| Some(roots.root.join("node_modules")),
        path: |request| prefixed(request, NPM_PREFIX).map(str::to_string),
        action: CandidateAction::Build,
      },
      "build" => Self {
        name: "build",
        development_only: false,
        applies: |request| request.asset_kind().is_some() && !is_virtual(request),
        root: |roots, _| Some(roots.root.clone()),
        path: |request| Some(request.cleaned.clone()),
        action: CandidateAction::Build,
      },
      "outside_root" => Self {
        name: "outside_root",
        development_only: true,
        applies: |request| request.asset_kind().is_some() && !is_virtual(request),
        root: |_, _| Some(PathBuf::from("/")),
        path: |request| Some(request.cleaned.clone()),
        action: CandidateAction::Build,
      },
      _ => return None,
    };
    Some(candidate)
  }
}

/// Remainder of the cleaned path after `/<prefix>`.
fn prefixed<'a>(request: &'a RequestPath, prefix: &str) -> Option<&'a str> {
  request.cleaned.strip_prefix('/')?.strip_prefix(prefix)
}

fn is_virtual(request: &RequestPath) -> bool {
  [PACKAGE_PREFIX, NPM_PREFIX, URL_PREFIX]
    .iter()
    .any(|prefix| prefixed(request, prefix).is_some())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn request(raw: &str) -> RequestPath {
    RequestPath::parse(raw, None).unwrap()
  }

  fn roots() -> CandidateRoots {
    let mut packages = BTreeMap::new();
    packages.insert("ui".to_string(), PathBuf::from("/gems/ui"));
    CandidateRoots {
      root: PathBuf::from("/srv/app"),
      public_root: PathBuf::from("/srv/app/public"),
      packages,
    }
  }

  fn rewrite(name: &str, raw: &str) -> Option<(PathBuf, String)> {
    let candidate = MiddlewareCandidate::named(name).unwrap();
    let request = request(raw);
    if !(candidate.applies)(&request) {
      return None;
    }
    Some(((candidate.root)(&roots(), &request)?, (candidate.path)(&request)?))
  }

  #[test]
  fn splits_source_map_requests() {
    let map = request("/lib/foo.js.map");
    assert!(map.source_map);
    assert_eq!(map.asset_path(), "/lib/foo.js");
    assert_eq!(map.file_name(), "foo.js");
    assert_eq!(map.asset_kind(), Some(AssetKind::Javascript));
  }

  #[test]
  fn build_serves_app_assets() {
    assert_eq!(
      rewrite("build", "/lib/foo.js"),
      Some((PathBuf::from("/srv/app"), "/lib/foo.js".into()))
    );
    assert_eq!(rewrite("build", "/lib/logo.png"), None);
    assert_eq!(rewrite("build", "/gem:ui/button.js"), None);
  }

  #[test]
  fn gem_rewrites_the_root_to_the_package() {
    assert_eq!(
      rewrite("gem", "/gem:ui/lib/button.js"),
      Some((PathBuf::from("/gems/ui"), "lib/button.js".into()))
    );
    assert_eq!(rewrite("gem", "/gem:nope/button.js"), None);
  }

  #[test]
  fn npm_serves_from_node_modules() {
    assert_eq!(
      rewrite("npm", "/npm:react/index.js"),
      Some((PathBuf::from("/srv/app/node_modules"), "react/index.js".into()))
    );
  }

  #[test]
  fn url_keeps_the_encoded_remainder() {
    assert_eq!(
      rewrite("url", "/url:https%3A%2F%2Fcdn.test%2Fx.js"),
      Some((PathBuf::new(), "https%3A%2F%2Fcdn.test%2Fx.js".into()))
    );
  }

  #[test]
  fn outside_root_widens_to_filesystem_root() {
    let candidate = MiddlewareCandidate::named("outside_root").unwrap();
    assert!(candidate.development_only);
    assert_eq!(
      rewrite("outside_root", "/home/dev/linked/index.js"),
      Some((PathBuf::from("/"), "/home/dev/linked/index.js".into()))
    );
  }

  #[test]
  fn unknown_names_are_rejected() {
    assert!(MiddlewareCandidate::named("sprockets").is_none());
  }
}
