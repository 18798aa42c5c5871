//! Canonical specifier to URL resolution.
//!
//! Resolution order for a specifier that is not already cached:
//!
//! 1. Paths inside an installed package root become virtual `/gem:<name>/...` paths.
//! 2. Paths inside the application root become app-relative URL paths.
//! 3. Everything else is looked up in the import map, then handed to the builder.
//!
//! Each result is checked against the production manifest; without a manifest the
//! non-manifest URL is used as-is.

mod cache;
mod specifier;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

pub use cache::ResolutionCache;
pub use specifier::{NPM_PREFIX, PACKAGE_PREFIX, Specifier, SpecifierKind, URL_PREFIX};

use crate::builder::Builder;
use crate::config::Environment;
use crate::error::{Error, Result};
use crate::import_map::ImportMap;
use crate::manifest::Manifest;
use crate::models::{BundleMode, ResolvedPath};

/// Characters escaped when a remote URL is embedded in a `/url:` path.
pub const URL_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
  .remove(b'-')
  .remove(b'.')
  .remove(b'_')
  .remove(b'~');

const MAX_ALIAS_DEPTH: usize = 8;

/// Everything the resolver reads; immutable once the pipeline has booted.
pub struct ResolverContext {
  /// Application root.
  pub root: PathBuf,
  /// Runtime environment.
  pub environment: Environment,
  /// Installed package roots by name.
  pub packages: BTreeMap<String, PathBuf>,
  /// Production manifest, unloaded outside production.
  pub manifest: Manifest,
  /// Import map consulted for bare specifiers.
  pub import_map: ImportMap,
  /// External builder used for node-style resolution.
  pub builder: Arc<dyn Builder>,
}

/// Resolves specifiers to URLs, memoising successes for the life of its cache scope.
///
/// In production every clone shares one process-wide cache. Elsewhere [`Self::for_request`]
/// hands out a fresh cache so edits on disk are picked up by the next request.
#[derive(Clone)]
pub struct PathResolver {
  context: Arc<ResolverContext>,
  cache: Arc<ResolutionCache>,
}

impl PathResolver {
  /// Create a resolver with an empty cache.
  pub fn new(context: ResolverContext) -> Self {
    Self {
      context: Arc::new(context),
      cache: Arc::default(),
    }
  }

  /// Resolver for one request: shares the cache in production, starts empty otherwise.
  pub fn for_request(&self) -> Self {
    let cache = if self.context.environment.is_production() {
      Arc::clone(&self.cache)
    } else {
      Arc::default()
    };

    Self {
      context: Arc::clone(&self.context),
      cache,
    }
  }

  /// Application root.
  pub fn root(&self) -> &Path {
    &self.context.root
  }

  /// Shared resolver inputs.
  pub fn context(&self) -> &ResolverContext {
    &self.context
  }

  /// Builder used for resolution and multi-entry builds.
  pub fn builder(&self) -> &dyn Builder {
    self.context.builder.as_ref()
  }

  /// Memoised resolutions in this scope.
  pub fn cache(&self) -> &ResolutionCache {
    &self.cache
  }

  /// Resolve `path` to the URL to emit (manifest path preferred).
  pub fn resolve(&self, path: &str) -> Result<String> {
    self.resolve_paths(path).map(|resolved| resolved.url().to_string())
  }

  /// Resolve `path` to its manifest, non-manifest and filesystem paths.
  pub fn resolve_paths(&self, path: &str) -> Result<ResolvedPath> {
    if path.starts_with("./") || path.starts_with("../") {
      return Err(Error::InvalidSpecifier(path.to_string()));
    }

    if let Some(resolved) = self.cache.get(path) {
      tracing::trace!(specifier = path, url = resolved.url(), "resolution cache hit");
      return Ok(resolved);
    }

    let resolved = self.resolve_uncached(path, 0)?;
    tracing::debug!(specifier = path, url = resolved.url(), "resolved specifier");
    self.cache.insert(path, resolved.clone());
    Ok(resolved)
  }

  fn resolve_uncached(&self, input: &str, depth: usize) -> Result<ResolvedPath> {
    let specifier = Specifier::parse(input);
    let resolved = match specifier.kind {
      SpecifierKind::Relative => return Err(Error::InvalidSpecifier(input.to_string())),
      SpecifierKind::Remote(url) => remote_path(url),
      SpecifierKind::Package { name, path } => self.package_path(input, name, path)?,
      SpecifierKind::Absolute(path) => self.resolve_absolute(input, path)?,
      SpecifierKind::Bare(bare) => self.resolve_bare(input, bare, depth)?,
    };

    Ok(with_bundle_flag(resolved, specifier.bundle))
  }

  fn resolve_absolute(&self, input: &str, path: &str) -> Result<ResolvedPath> {
    let fs_path = Path::new(path);
    if let Some(resolved) = self.classify_fs_path(fs_path)? {
      return Ok(resolved);
    }

    let relative = path.trim_start_matches('/');
    let candidate = self.context.root.join(relative);
    if self.context.environment.is_production() || candidate.is_file() {
      return Ok(self.app_path(relative, candidate));
    }

    if fs_path.is_file() {
      return Ok(outside_root_path(fs_path));
    }

    self.resolve_with_builder(input, path)
  }

  fn resolve_bare(&self, input: &str, bare: &str, depth: usize) -> Result<ResolvedPath> {
    let mapped = self.context.import_map.resolve(bare, "/")?;
    if let (true, Some(target)) = (mapped.matched, mapped.resolved) {
      if target != bare {
        if depth >= MAX_ALIAS_DEPTH {
          return Err(Error::resolve(input, "import map aliases form a cycle"));
        }
        tracing::debug!(specifier = bare, target = %target, "import map matched");
        return self.resolve_uncached(&target, depth + 1);
      }
    }

    self.resolve_with_builder(input, bare)
  }

  fn resolve_with_builder(&self, input: &str, specifier: &str) -> Result<ResolvedPath> {
    let resolved = self
      .builder()
      .resolve(&self.context.root, specifier)
      .map_err(|failure| Error::resolve(input, failure.into_error(specifier).to_string()))?
      .ok_or_else(|| Error::resolve(input, "the builder could not resolve it"))?;

    if let Some(path) = self.classify_fs_path(&resolved)? {
      return Ok(path);
    }

    if self.context.environment.is_production() {
      return Err(Error::resolve(
        input,
        format!("{} is outside the application root", resolved.display()),
      ));
    }
    Ok(outside_root_path(&resolved))
  }

  /// Package roots first, then the application root.
  fn classify_fs_path(&self, path: &Path) -> Result<Option<ResolvedPath>> {
    for (name, package_root) in &self.context.packages {
      if let Ok(rest) = path.strip_prefix(package_root) {
        let rest = slash_path(rest);
        return self.package_path(&path.display().to_string(), name, &rest).map(Some);
      }
    }

    if let Ok(rest) = path.strip_prefix(&self.context.root) {
      let rest = slash_path(rest);
      if rest.is_empty() {
        return Ok(None);
      }
      let absolute = self.context.root.join(&rest);
      if !self.context.environment.is_production() && !absolute.is_file() {
        return Err(Error::resolve(
          path.display().to_string(),
          "no such file under the application root",
        ));
      }
      return Ok(Some(self.app_path(&rest, absolute)));
    }

    Ok(None)
  }

  fn package_path(&self, input: &str, name: &str, path: &str) -> Result<ResolvedPath> {
    let package_root = self
      .context
      .packages
      .get(name)
      .ok_or_else(|| Error::resolve(input, format!("unknown package `{name}`")))?;

    let path = path.trim_start_matches('/');
    let key = format!("{PACKAGE_PREFIX}{name}/{path}");
    Ok(ResolvedPath {
      manifest: self.context.manifest.lookup(&key).map(str::to_string),
      non_manifest: format!("/{key}"),
      absolute: package_root.join(path),
    })
  }

  fn app_path(&self, relative: &str, absolute: PathBuf) -> ResolvedPath {
    ResolvedPath {
      manifest: self.context.manifest.lookup(relative).map(str::to_string),
      non_manifest: format!("/{relative}"),
      absolute,
    }
  }
}

fn remote_path(url: &str) -> ResolvedPath {
  ResolvedPath {
    manifest: None,
    non_manifest: format!("/{URL_PREFIX}{}", utf8_percent_encode(url, URL_COMPONENT)),
    absolute: PathBuf::new(),
  }
}

fn outside_root_path(path: &Path) -> ResolvedPath {
  ResolvedPath {
    manifest: None,
    non_manifest: slash_path(path),
    absolute: path.to_path_buf(),
  }
}

fn with_bundle_flag(mut resolved: ResolvedPath, bundle: BundleMode) -> ResolvedPath {
  if let Some(flag) = bundle.query_flag() {
    let separator = if resolved.non_manifest.contains('?') { '&' } else { '?' };
    resolved.non_manifest = format!("{}{separator}{flag}", resolved.non_manifest);
  }
  resolved
}

fn slash_path(path: &Path) -> String {
  path.to_string_lossy().replace('\\', "/")
}
