//! Memoisation of successful resolutions.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::models::ResolvedPath;

/// Successful resolutions keyed by the literal input string.
///
/// Failures are never stored, so a missing asset keeps failing until it appears.
#[derive(Debug, Default)]
pub struct ResolutionCache {
  entries: RwLock<HashMap<String, ResolvedPath>>,
}

impl ResolutionCache {
  /// Cached result for `specifier`.
  pub fn get(&self, specifier: &str) -> Option<ResolvedPath> {
    self.entries.read().get(specifier).cloned()
  }

  /// Store a successful resolution.
  pub fn insert(&self, specifier: &str, resolved: ResolvedPath) {
    self.entries.write().insert(specifier.to_string(), resolved);
  }

  /// Number of memoised specifiers.
  pub fn len(&self) -> usize {
    self.entries.read().len()
  }

  /// True when nothing has been memoised.
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

#[cfg(test)]
mod tests {
  use std::path::PathBuf;

  use super::*;

  #[test]
  fn stores_and_returns_copies() {
    let cache = ResolutionCache::default();
    assert!(cache.get("/lib/a.js").is_none());

    let resolved = ResolvedPath {
      manifest: None,
      non_manifest: "/lib/a.js".into(),
      absolute: PathBuf::from("/app/lib/a.js"),
    };
    cache.insert("/lib/a.js", resolved.clone());

    assert_eq!(cache.get("/lib/a.js"), Some(resolved));
    assert_eq!(cache.len(), 1);
  }
}
