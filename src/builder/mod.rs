//! The external builder seam: resolution of bare specifiers and compilation of entry points.
//!
//! The pipeline never parses JavaScript or CSS itself. Everything it cannot answer from the
//! filesystem, the manifest or the import map is delegated to a [`Builder`].

mod command;
mod entries;
pub mod sourcemap;

use std::path::{Path, PathBuf};

pub use command::CommandBuilder;
pub use entries::{ENTRY_DELIMITER, ENTRY_PAIR_SEPARATOR, join_entry_points, parse_entry_map};

use crate::error::{CompileError, Error};
use crate::models::{AssetKind, BundleMode};

/// A single compilation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
  /// Root the entry point is relative to.
  pub root: PathBuf,
  /// Entry point relative to `root`, using forward slashes.
  pub path: String,
  /// What kind of output is expected.
  pub kind: AssetKind,
  /// How much of the import graph to inline.
  pub bundle: BundleMode,
}

/// Compiled output of a build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOutput {
  /// Compiled source, possibly ending with an inline source map comment.
  pub contents: Vec<u8>,
  /// External source map, when the builder produced one separately.
  pub source_map: Option<Vec<u8>>,
}

/// Ways a builder invocation can fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuilderFailure {
  /// Non-zero exit with a structured diagnostic.
  Diagnostic(CompileError),
  /// Non-zero exit with unstructured standard error.
  Failed {
    /// Captured standard error.
    stderr: String,
  },
  /// The builder could not be started or its output was unusable.
  Unavailable(String),
}

impl BuilderFailure {
  /// Map the failure onto the crate taxonomy for an entry point at `path`.
  pub fn into_error(self, path: &str) -> Error {
    match self {
      Self::Diagnostic(mut diagnostic) => {
        diagnostic.path = path.to_string();
        Error::Compile(diagnostic)
      }
      Self::Failed { stderr } => Error::Build {
        path: path.to_string(),
        stderr,
      },
      Self::Unavailable(reason) => Error::Build {
        path: path.to_string(),
        stderr: reason,
      },
    }
  }
}

/// External build tool.
///
/// Implementations block the calling request until the tool answers.
pub trait Builder: Send + Sync {
  /// Resolve a bare or absolute-URL specifier to a file on disk, node-style.
  ///
  /// `Ok(None)` means the builder ran but found nothing.
  fn resolve(&self, root: &Path, specifier: &str) -> Result<Option<PathBuf>, BuilderFailure>;

  /// Compile one entry point.
  fn build(&self, request: &BuildRequest) -> Result<BuildOutput, BuilderFailure>;

  /// Compile several entry points at once.
  ///
  /// `entries` is [`join_entry_points`] output; the answer is `in::out` pairs joined with
  /// [`ENTRY_DELIMITER`].
  fn build_entries(&self, root: &Path, entries: &str) -> Result<String, BuilderFailure>;
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn diagnostics_become_compile_errors() {
    let failure = BuilderFailure::Diagnostic(CompileError {
      path: String::new(),
      text: "Expected \";\"".into(),
      location: None,
    });

    match failure.into_error("lib/foo.js") {
      Error::Compile(error) => assert_eq!(error.path, "lib/foo.js"),
      other => panic!("unexpected error: {other:?}"),
    }
  }

  #[test]
  fn unstructured_failures_become_build_errors() {
    let failure = BuilderFailure::Failed {
      stderr: "segfault".into(),
    };
    assert!(matches!(
      failure.into_error("lib/foo.js"),
      Error::Build { path, stderr } if path == "lib/foo.js" && stderr == "segfault"
    ));
  }
}
