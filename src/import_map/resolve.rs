use crate::error::ImportMapError;

use super::parse::{
  ImportMap, SpecifierMap, Target, display_url, normalise_specifier, parse_base_url,
  parse_url_like,
};

/// Outcome of an import map lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
  /// True when an entry in the map produced the result.
  pub matched: bool,
  /// The mapped target, or the specifier parsed as a URL when nothing matched.
  ///
  /// `None` only for unmatched bare specifiers.
  pub resolved: Option<String>,
}

impl ImportMap {
  /// Resolve `specifier` as imported from `base_url`.
  ///
  /// Only the most specific matching scope is consulted before the top-level `imports`. A
  /// URL-like specifier that matches nothing still comes back parsed, with
  /// `matched: false`, so callers can pass it through unchanged.
  pub fn resolve(&self, specifier: &str, base_url: &str) -> Result<Resolution, ImportMapError> {
    let base = parse_base_url(base_url)?;
    let referrer = display_url(&base);
    let as_url = parse_url_like(specifier, &base);
    let normalised = normalise_specifier(specifier, &base);

    let scope = self
      .scopes
      .iter()
      .find(|(prefix, _)| scope_matches(prefix, &referrer));
    if let Some((_, map)) = scope {
      if let Some(resolved) = resolve_imports_match(&normalised, map, &base)? {
        return Ok(Resolution {
          matched: true,
          resolved: Some(resolved),
        });
      }
    }

    if let Some(resolved) = resolve_imports_match(&normalised, &self.imports, &base)? {
      return Ok(Resolution {
        matched: true,
        resolved: Some(resolved),
      });
    }

    Ok(Resolution {
      matched: false,
      resolved: as_url.map(|url| display_url(&url)),
    })
  }
}

fn scope_matches(prefix: &str, referrer: &str) -> bool {
  prefix == referrer || (prefix.ends_with('/') && referrer.starts_with(prefix))
}

fn resolve_imports_match(
  normalised: &str,
  map: &SpecifierMap,
  base: &url::Url,
) -> Result<Option<String>, ImportMapError> {
  if let Some(target) = map.get(normalised) {
    return match target {
      Target::Address(address) => Ok(Some(address.clone())),
      Target::Blocked => Err(ImportMapError::Blocked(normalised.to_string())),
    };
  }

  for (key, target) in map.iter() {
    if !key.ends_with('/') || !normalised.starts_with(key) {
      continue;
    }

    let Target::Address(address) = target else {
      return Err(ImportMapError::Blocked(normalised.to_string()));
    };

    let after_prefix = &normalised[key.len()..];
    let backtracking = || ImportMapError::Backtracking {
      specifier: normalised.to_string(),
      prefix: key.to_string(),
    };

    let resolved = match parse_url_like(address, base) {
      Some(target_url) => target_url
        .join(after_prefix)
        .map(|url| display_url(&url))
        .map_err(|_| backtracking())?,
      None => format!("{address}{after_prefix}"),
    };

    if !resolved.starts_with(address.as_str()) {
      return Err(backtracking());
    }
    return Ok(Some(resolved));
  }

  Ok(None)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn map(json: &str) -> ImportMap {
    ImportMap::parse(json, "/").unwrap()
  }

  #[test]
  fn exact_match_wins_over_prefix() {
    let map = map(r#"{"imports": {"lodash/": "/vendor/lodash/", "lodash/fp": "/vendor/fp.js"}}"#);

    let exact = map.resolve("lodash/fp", "/app/").unwrap();
    assert_eq!(exact.resolved.as_deref(), Some("/vendor/fp.js"));

    let prefix = map.resolve("lodash/map.js", "/app/").unwrap();
    assert!(prefix.matched);
    assert_eq!(prefix.resolved.as_deref(), Some("/vendor/lodash/map.js"));
  }

  #[test]
  fn longest_prefix_wins() {
    let map = map(r#"{"imports": {"ui/": "/ui/", "ui/icons/": "/icons/"}}"#);
    let resolution = map.resolve("ui/icons/star.js", "/").unwrap();
    assert_eq!(resolution.resolved.as_deref(), Some("/icons/star.js"));
  }

  #[test]
  fn most_specific_scope_wins() {
    let map = map(
      r#"{
        "imports": {"dep": "/top.js"},
        "scopes": {"/a/": {"dep": "/a.js"}, "/a/b/": {"dep": "/ab.js"}}
      }"#,
    );

    assert_eq!(map.resolve("dep", "/a/b/c").unwrap().resolved.as_deref(), Some("/ab.js"));
    assert_eq!(map.resolve("dep", "/a/c").unwrap().resolved.as_deref(), Some("/a.js"));
    assert_eq!(map.resolve("dep", "/z/").unwrap().resolved.as_deref(), Some("/top.js"));
  }

  #[test]
  fn scope_falls_through_to_imports() {
    let map = map(r#"{"imports": {"dep": "/top.js"}, "scopes": {"/a/": {"other": "/o.js"}}}"#);
    let resolution = map.resolve("dep", "/a/x.js").unwrap();
    assert!(resolution.matched);
    assert_eq!(resolution.resolved.as_deref(), Some("/top.js"));
  }

  #[test]
  fn only_the_most_specific_scope_is_consulted() {
    let map = map(
      r#"{
        "imports": {"dep": "/top.js"},
        "scopes": {"/a/": {"dep": "/a.js"}, "/a/b/": {"other": "/o.js"}}
      }"#,
    );
    assert_eq!(map.resolve("dep", "/a/b/c").unwrap().resolved.as_deref(), Some("/top.js"));
  }

  #[test]
  fn null_entries_block_resolution() {
    let map = map(r#"{"imports": {"left-pad": null, "blocked/": null}}"#);

    assert_eq!(
      map.resolve("left-pad", "/").unwrap_err(),
      ImportMapError::Blocked("left-pad".into())
    );
    assert_eq!(
      map.resolve("blocked/x.js", "/").unwrap_err(),
      ImportMapError::Blocked("blocked/x.js".into())
    );
  }

  #[test]
  fn unmatched_url_like_specifier_is_passed_through() {
    let map = map(r#"{"imports": {}}"#);

    let resolution = map.resolve("./utils.js", "/lib/app.js").unwrap();
    assert!(!resolution.matched);
    assert_eq!(resolution.resolved.as_deref(), Some("/lib/utils.js"));

    let bare = map.resolve("react", "/").unwrap();
    assert_eq!(bare, Resolution { matched: false, resolved: None });
  }

  #[test]
  fn relative_specifiers_match_normalised_keys() {
    let map = map(r#"{"imports": {"/lib/utils.js": "/lib/utils-shim.js"}}"#);
    let resolution = map.resolve("../utils.js", "/lib/nested/app.js").unwrap();
    assert!(resolution.matched);
    assert_eq!(resolution.resolved.as_deref(), Some("/lib/utils-shim.js"));
  }

  #[test]
  fn bare_alias_prefixes_concatenate() {
    let map = map(r#"{"imports": {"@app/": "lib/"}}"#);
    let resolution = map.resolve("@app/button.js", "/").unwrap();
    assert_eq!(resolution.resolved.as_deref(), Some("lib/button.js"));
  }

  #[test]
  fn rejects_backtracking_out_of_prefix() {
    let map = map(r#"{"imports": {"pkg/": "/vendor/pkg/"}}"#);
    let err = map.resolve("pkg/../../secret.js", "/").unwrap_err();
    assert!(matches!(err, ImportMapError::Backtracking { .. }));
  }
}
