//! Classification of the specifier forms accepted by the path resolver.

use crate::models::BundleMode;

/// Prefix selecting an installed package by name.
pub const PACKAGE_PREFIX: &str = "gem:";
/// Prefix forcing package (node-style) resolution.
pub const NPM_PREFIX: &str = "npm:";
/// Prefix marking a remote URL.
pub const URL_PREFIX: &str = "url:";

/// Shape of a specifier once flags and prefixes are peeled off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecifierKind<'a> {
  /// `./x` or `../x`; only the builder can resolve these.
  Relative,
  /// `url:https://...` or a plain `http(s)://` URL.
  Remote(&'a str),
  /// `gem:name/path`.
  Package {
    /// Installed package name.
    name: &'a str,
    /// Path inside the package root, possibly empty.
    path: &'a str,
  },
  /// `/lib/x.js` or a filesystem path.
  Absolute(&'a str),
  /// `pkg/sub/path`, including `npm:` prefixed names.
  Bare(&'a str),
}

/// A classified specifier and the bundle flag it carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Specifier<'a> {
  /// Classified path.
  pub kind: SpecifierKind<'a>,
  /// `bundle:`/`bundle-all:` prefix or `?bundle`/`?bundle-all` query.
  pub bundle: BundleMode,
}

impl<'a> Specifier<'a> {
  /// Classify `input`.
  pub fn parse(input: &'a str) -> Self {
    let (input, mut bundle) = if let Some(rest) = input.strip_prefix("bundle-all:") {
      (rest, BundleMode::BundleAll)
    } else if let Some(rest) = input.strip_prefix("bundle:") {
      (rest, BundleMode::Bundle)
    } else {
      (input, BundleMode::Unbundled)
    };

    let input = match input.split_once('?') {
      Some((path, query)) if !is_remote(path) => {
        let from_query = BundleMode::from_query(Some(query));
        if from_query != BundleMode::Unbundled {
          bundle = from_query;
        }
        path
      }
      _ => input,
    };

    Self {
      kind: classify(input),
      bundle,
    }
  }
}

fn classify(input: &str) -> SpecifierKind<'_> {
  if input.starts_with("./") || input.starts_with("../") {
    return SpecifierKind::Relative;
  }
  if let Some(url) = input.strip_prefix(URL_PREFIX) {
    return SpecifierKind::Remote(url);
  }
  if is_remote(input) {
    return SpecifierKind::Remote(input);
  }
  if let Some(package) = input.strip_prefix(PACKAGE_PREFIX) {
    let (name, path) = package.split_once('/').unwrap_or((package, ""));
    return SpecifierKind::Package { name, path };
  }
  if let Some(bare) = input.strip_prefix(NPM_PREFIX) {
    return SpecifierKind::Bare(bare);
  }
  if input.starts_with('/') {
    return SpecifierKind::Absolute(input);
  }
  SpecifierKind::Bare(input)
}

fn is_remote(input: &str) -> bool {
  input.starts_with("https://") || input.starts_with("http://")
}
