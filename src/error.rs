//! Error taxonomy shared by the resolver, the side-load tracker and the middleware chain.

use std::fmt;
use std::path::PathBuf;

use serde::Deserialize;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures raised synchronously to the caller or request handler.
///
/// None of these are retried: builds are deterministic, so a retry would reproduce the same
/// failure.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// A relative specifier reached a resolver that only accepts absolute or bare input.
  #[error("invalid specifier `{0}`: relative paths can only be resolved by the builder")]
  InvalidSpecifier(String),

  /// The specifier could not be resolved to any known path.
  #[error("could not resolve `{specifier}`: {reason}")]
  Resolve {
    /// Specifier as passed by the caller.
    specifier: String,
    /// Human readable cause.
    reason: String,
  },

  /// A CSS module referenced from markup does not exist on disk.
  #[error("stylesheet not found: {0}")]
  StylesheetNotFound(String),

  /// The builder reported a structured diagnostic.
  #[error(transparent)]
  Compile(#[from] CompileError),

  /// The builder exited unsuccessfully without a structured diagnostic.
  #[error("build failed for `{path}`: {stderr}")]
  Build {
    /// Entry point that was being built.
    path: String,
    /// Raw standard error of the builder.
    stderr: String,
  },

  /// Side-loaded assets were registered but never emitted into the page.
  #[error("side-loaded assets were never included in the page: {}", .0.join(", "))]
  NotIncluded(Vec<String>),

  /// Import map parsing or resolution failed.
  #[error(transparent)]
  ImportMap(#[from] ImportMapError),

  /// A `url:` asset could not be fetched.
  #[error("failed to fetch `{url}`: {reason}")]
  Remote {
    /// Decoded remote URL.
    url: String,
    /// Transport or status failure.
    reason: String,
  },

  /// The production manifest could not be loaded.
  #[error("failed to load manifest at {path}: {message}")]
  Manifest {
    /// Manifest location.
    path: PathBuf,
    /// Flattened cause chain.
    message: String,
  },

  /// Configuration could not be read or is inconsistent.
  #[error("configuration error: {0}")]
  Config(String),

  /// Underlying filesystem failure that could not be folded into a "not found" result.
  #[error(transparent)]
  Io(#[from] std::io::Error),

  /// JSON emitted into a page or response could not be encoded.
  #[error("failed to encode json: {0}")]
  Json(#[from] serde_json::Error),
}

impl Error {
  pub(crate) fn resolve(specifier: impl Into<String>, reason: impl Into<String>) -> Self {
    Self::Resolve {
      specifier: specifier.into(),
      reason: reason.into(),
    }
  }

  /// True for failures that originate from authored source code rather than the pipeline.
  pub fn is_compile_error(&self) -> bool {
    matches!(self, Self::Compile(_))
  }
}

/// Errors produced by the import map parser and resolver.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ImportMapError {
  /// The import map document is malformed.
  #[error("invalid import map: {0}")]
  Parse(String),

  /// A matching entry exists but is explicitly disabled with `null`.
  #[error("resolution of `{0}` was blocked by a null entry")]
  Blocked(String),

  /// A package-prefix match produced a URL outside its target prefix.
  #[error("resolution of `{specifier}` backtracks above its prefix `{prefix}`")]
  Backtracking {
    /// Specifier being resolved.
    specifier: String,
    /// Key that matched.
    prefix: String,
  },
}

/// Source location attached to a builder diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Location {
  /// File the diagnostic refers to.
  pub file: String,
  /// One-based line number.
  #[serde(default)]
  pub line: u32,
  /// Zero-based column.
  #[serde(default)]
  pub column: u32,
}

/// Structured builder failure, rendered as an overlay in development.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CompileError {
  /// Entry point that failed to compile.
  #[serde(skip)]
  pub path: String,
  /// Diagnostic message.
  pub text: String,
  /// Optional location of the offending source.
  #[serde(default)]
  pub location: Option<Location>,
}

impl fmt::Display for CompileError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.location {
      Some(location) => write!(
        f,
        "failed to compile `{}`: {} ({}:{}:{})",
        self.path, self.text, location.file, location.line, location.column
      ),
      None => write!(f, "failed to compile `{}`: {}", self.path, self.text),
    }
  }
}

impl std::error::Error for CompileError {}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn compile_error_includes_location_when_present() {
    let error = CompileError {
      path: "lib/foo.js".into(),
      text: "Unexpected token".into(),
      location: Some(Location {
        file: "lib/foo.js".into(),
        line: 3,
        column: 7,
      }),
    };

    assert_eq!(
      error.to_string(),
      "failed to compile `lib/foo.js`: Unexpected token (lib/foo.js:3:7)"
    );
  }

  #[test]
  fn not_included_lists_every_leftover() {
    let error = Error::NotIncluded(vec!["/app/views/a.js".into(), "/app/views/a.css".into()]);
    let message = error.to_string();
    assert!(message.contains("/app/views/a.js, /app/views/a.css"));
  }

  #[test]
  fn compile_errors_are_flagged() {
    let error = Error::from(CompileError {
      path: "x.js".into(),
      text: "boom".into(),
      location: None,
    });
    assert!(error.is_compile_error());
    assert!(!Error::InvalidSpecifier("./x".into()).is_compile_error());
  }
}
