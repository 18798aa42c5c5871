use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use serde_json::{Map, Value};
use url::{Position, Url};

use crate::error::ImportMapError;

/// Value an import map key points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
  /// Normalised URL path, absolute URL or literal alias.
  Address(String),
  /// Explicitly disabled with `null` (or an invalid value).
  Blocked,
}

/// Specifier keys and targets sorted by descending key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpecifierMap {
  entries: Vec<(String, Target)>,
}

impl SpecifierMap {
  fn from_sorted(entries: BTreeMap<String, Target>) -> Self {
    Self {
      entries: entries.into_iter().rev().collect(),
    }
  }

  /// Exact lookup of a normalised key.
  pub fn get(&self, key: &str) -> Option<&Target> {
    self
      .entries
      .binary_search_by(|(candidate, _)| candidate.as_str().cmp(key).reverse())
      .ok()
      .map(|index| &self.entries[index].1)
  }

  /// Entries in lookup order (descending key).
  pub fn iter(&self) -> impl Iterator<Item = (&str, &Target)> {
    self
      .entries
      .iter()
      .map(|(key, target)| (key.as_str(), target))
  }

  /// Number of entries.
  pub fn len(&self) -> usize {
    self.entries.len()
  }

  /// True when the map has no entries.
  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  fn to_value(&self) -> Value {
    let map: Map<String, Value> = self
      .entries
      .iter()
      .map(|(key, target)| {
        let value = match target {
          Target::Address(address) => Value::String(address.clone()),
          Target::Blocked => Value::Null,
        };
        (key.clone(), value)
      })
      .collect();
    Value::Object(map)
  }
}

/// Parsed and normalised import map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportMap {
  /// Top-level specifier map.
  pub imports: SpecifierMap,
  /// Scope prefix and its specifier map, sorted by descending prefix.
  pub scopes: Vec<(String, SpecifierMap)>,
}

impl ImportMap {
  /// Parse import map JSON, normalising URL-like keys against `base_url`.
  pub fn parse(json: &str, base_url: &str) -> Result<Self, ImportMapError> {
    let value: Value = serde_json::from_str(json)
      .map_err(|err| ImportMapError::Parse(format!("malformed JSON: {err}")))?;
    Self::from_value(&value, base_url)
  }

  /// Read and parse an import map file. A missing file yields an empty map.
  pub fn load(path: &Path, base_url: &str) -> Result<Self, ImportMapError> {
    let content = match fs::read_to_string(path) {
      Ok(content) => content,
      Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
        tracing::debug!(path = %path.display(), "no import map");
        return Ok(Self::default());
      }
      Err(err) => {
        return Err(ImportMapError::Parse(format!(
          "failed to read {}: {err}",
          path.display()
        )));
      }
    };

    let map = Self::parse(&content, base_url)?;
    tracing::info!(
      path = %path.display(),
      imports = map.imports.len(),
      scopes = map.scopes.len(),
      "loaded import map"
    );
    Ok(map)
  }

  /// Normalise an already-deserialised import map document.
  pub fn from_value(value: &Value, base_url: &str) -> Result<Self, ImportMapError> {
    let Value::Object(root) = value else {
      return Err(ImportMapError::Parse(
        "top-level value must be a JSON object".into(),
      ));
    };

    if let Some(key) = root
      .keys()
      .find(|key| !matches!(key.as_str(), "imports" | "scopes"))
    {
      return Err(ImportMapError::Parse(format!("unknown top-level key `{key}`")));
    }

    let base = parse_base_url(base_url)?;

    let imports = match root.get("imports") {
      None => SpecifierMap::default(),
      Some(Value::Object(imports)) => normalise_specifier_map(imports, &base),
      Some(_) => {
        return Err(ImportMapError::Parse("`imports` must be a JSON object".into()));
      }
    };

    let scopes = match root.get("scopes") {
      None => Vec::new(),
      Some(Value::Object(scopes)) => normalise_scopes(scopes, &base)?,
      Some(_) => {
        return Err(ImportMapError::Parse("`scopes` must be a JSON object".into()));
      }
    };

    Ok(Self { imports, scopes })
  }

  /// Serialise the normalised map back into import map JSON.
  pub fn to_value(&self) -> Value {
    let mut root = Map::new();
    root.insert("imports".into(), self.imports.to_value());
    let scopes: Map<String, Value> = self
      .scopes
      .iter()
      .map(|(prefix, map)| (prefix.clone(), map.to_value()))
      .collect();
    root.insert("scopes".into(), Value::Object(scopes));
    Value::Object(root)
  }

  /// True when neither imports nor scopes are defined.
  pub fn is_empty(&self) -> bool {
    self.imports.is_empty() && self.scopes.is_empty()
  }
}

fn normalise_scopes(
  scopes: &Map<String, Value>,
  base: &Url,
) -> Result<Vec<(String, SpecifierMap)>, ImportMapError> {
  let mut sorted = BTreeMap::new();
  for (prefix, map) in scopes {
    let Value::Object(map) = map else {
      return Err(ImportMapError::Parse(format!(
        "scope `{prefix}` must map to a JSON object"
      )));
    };

    let Some(prefix_url) = base.join(prefix).ok() else {
      tracing::warn!(scope = %prefix, "ignoring scope that is not a valid URL");
      continue;
    };
    sorted.insert(display_url(&prefix_url), normalise_specifier_map(map, base));
  }

  Ok(sorted.into_iter().rev().collect())
}

fn normalise_specifier_map(map: &Map<String, Value>, base: &Url) -> SpecifierMap {
  let mut sorted = BTreeMap::new();

  for (key, value) in map {
    if key.is_empty() {
      tracing::warn!("ignoring empty import map specifier key");
      continue;
    }
    let normalised_key = normalise_specifier(key, base);

    let target = match value {
      Value::String(address) => {
        let address = normalise_specifier(address, base);
        if normalised_key.ends_with('/') && !address.ends_with('/') {
          tracing::warn!(
            key = %key,
            target = %address,
            "package prefix target must end with a slash"
          );
          Target::Blocked
        } else {
          Target::Address(address)
        }
      }
      Value::Null => Target::Blocked,
      other => {
        tracing::warn!(key = %key, value = %other, "import map targets must be strings");
        Target::Blocked
      }
    };

    sorted.insert(normalised_key, target);
  }

  SpecifierMap::from_sorted(sorted)
}

/// Normalise a key or specifier: URL-like values become URL paths, bare ones stay literal.
pub(super) fn normalise_specifier(specifier: &str, base: &Url) -> String {
  parse_url_like(specifier, base)
    .map(|url| display_url(&url))
    .unwrap_or_else(|| specifier.to_string())
}

/// Parse `/x`, `./x`, `../x` against `base`, or an absolute URL with an authority-bearing scheme.
pub(super) fn parse_url_like(specifier: &str, base: &Url) -> Option<Url> {
  if is_url_like(specifier) {
    return base.join(specifier).ok();
  }

  Url::parse(specifier)
    .ok()
    .filter(|url| !url.cannot_be_a_base())
}

/// True for specifiers that are resolved relative to a base URL.
fn is_url_like(specifier: &str) -> bool {
  specifier.starts_with('/') || specifier.starts_with("./") || specifier.starts_with("../")
}

pub(super) fn parse_base_url(base_url: &str) -> Result<Url, ImportMapError> {
  if let Ok(url) = Url::parse(base_url) {
    return Ok(url);
  }
  app_origin()
    .join(base_url)
    .map_err(|err| ImportMapError::Parse(format!("invalid base URL `{base_url}`: {err}")))
}

/// App-relative URLs are displayed as bare paths; everything else as full URLs.
pub(super) fn display_url(url: &Url) -> String {
  if url.scheme() == "file" && url.host().is_none() {
    url[Position::BeforePath..].to_string()
  } else {
    url.to_string()
  }
}

fn app_origin() -> &'static Url {
  static ORIGIN: OnceLock<Url> = OnceLock::new();
  ORIGIN.get_or_init(|| Url::parse("file:///").expect("invalid app origin URL"))
}
