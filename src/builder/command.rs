//! [`Builder`] backed by an external executable.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use crate::config::BuilderCommandConfig;
use crate::error::CompileError;

use super::{BuildOutput, BuildRequest, Builder, BuilderFailure};

/// Runs the configured build tool once per call.
///
/// Invocations:
///
/// * `<program> <args..> resolve --root <root> <specifier>` prints the resolved path.
/// * `<program> <args..> build --root <root> --kind <kind> [--bundle|--bundle-all] <path>`
///   prints compiled output.
/// * `<program> <args..> entries --root <root> <a;b;c>` prints `in::out` pairs.
///
/// A failing build that prints a JSON object `{"text", "location"}` on stderr is reported as
/// a diagnostic; any other failure as raw stderr.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
  program: PathBuf,
  args: Vec<String>,
}

impl CommandBuilder {
  /// Create a builder for `config`, resolving a relative program path against `root`.
  pub fn new(config: &BuilderCommandConfig, root: &Path) -> Self {
    let program = PathBuf::from(&config.program);
    let program = if program.components().count() > 1 && program.is_relative() {
      root.join(program)
    } else {
      program
    };

    Self {
      program,
      args: config.args.clone(),
    }
  }

  fn run(&self, subcommand: &str, root: &Path, extra: &[&str]) -> Result<Output, BuilderFailure> {
    tracing::debug!(
      program = %self.program.display(),
      subcommand,
      root = %root.display(),
      args = ?extra,
      "invoking builder"
    );

    Command::new(&self.program)
      .args(&self.args)
      .arg(subcommand)
      .arg("--root")
      .arg(root)
      .args(extra)
      .current_dir(root)
      .output()
      .map_err(|err| {
        BuilderFailure::Unavailable(format!(
          "failed to run `{}`: {err}",
          self.program.display()
        ))
      })
  }
}

impl Builder for CommandBuilder {
  fn resolve(&self, root: &Path, specifier: &str) -> Result<Option<PathBuf>, BuilderFailure> {
    let output = self.run("resolve", root, &[specifier])?;
    if !output.status.success() {
      // Silent non-zero exit: unknown specifier.
      if output.stderr.trim_ascii().is_empty() {
        return Ok(None);
      }
      return Err(classify_failure(&output.stderr));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let resolved = stdout.trim();
    if resolved.is_empty() {
      return Ok(None);
    }

    let path = PathBuf::from(resolved);
    Ok(Some(if path.is_relative() { root.join(path) } else { path }))
  }

  fn build(&self, request: &BuildRequest) -> Result<BuildOutput, BuilderFailure> {
    let kind = if request.kind.is_stylesheet() {
      "css"
    } else {
      "js"
    };
    let mut extra = vec!["--kind", kind];
    let flag = request.bundle.query_flag().map(|flag| format!("--{flag}"));
    if let Some(flag) = flag.as_deref() {
      extra.push(flag);
    }
    extra.push(request.path.as_str());

    let output = self.run("build", &request.root, &extra)?;
    if !output.status.success() {
      return Err(classify_failure(&output.stderr));
    }

    Ok(BuildOutput {
      contents: output.stdout,
      source_map: None,
    })
  }

  fn build_entries(&self, root: &Path, entries: &str) -> Result<String, BuilderFailure> {
    let output = self.run("entries", root, &[entries])?;
    if !output.status.success() {
      return Err(classify_failure(&output.stderr));
    }

    String::from_utf8(output.stdout)
      .map_err(|err| BuilderFailure::Unavailable(format!("builder printed invalid UTF-8: {err}")))
  }
}

/// Structured diagnostics win; anything else is reported verbatim.
fn classify_failure(stderr: &[u8]) -> BuilderFailure {
  let text = String::from_utf8_lossy(stderr);
  match serde_json::from_str::<CompileError>(text.trim()) {
    Ok(diagnostic) => BuilderFailure::Diagnostic(diagnostic),
    Err(_) => BuilderFailure::Failed {
      stderr: text.trim().to_string(),
    },
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::Location;

  #[test]
  fn classifies_structured_diagnostics() {
    let failure = classify_failure(
      br#"{"text": "Unexpected end of file", "location": {"file": "lib/a.js", "line": 2, "column": 4}}"#,
    );

    assert_eq!(
      failure,
      BuilderFailure::Diagnostic(CompileError {
        path: String::new(),
        text: "Unexpected end of file".into(),
        location: Some(Location {
          file: "lib/a.js".into(),
          line: 2,
          column: 4,
        }),
      })
    );
  }

  #[test]
  fn classifies_plain_stderr() {
    assert_eq!(
      classify_failure(b"node: command not found\n"),
      BuilderFailure::Failed {
        stderr: "node: command not found".into()
      }
    );
  }

  #[test]
  fn anchors_relative_program_paths() {
    let config = BuilderCommandConfig {
      program: "bin/build".into(),
      args: Vec::new(),
    };
    let builder = CommandBuilder::new(&config, Path::new("/srv/app"));
    assert_eq!(builder.program, PathBuf::from("/srv/app/bin/build"));

    let config = BuilderCommandConfig {
      program: "esbuild".into(),
      args: Vec::new(),
    };
    let builder = CommandBuilder::new(&config, Path::new("/srv/app"));
    assert_eq!(builder.program, PathBuf::from("esbuild"));
  }

  #[cfg(unix)]
  fn shell(script: &str) -> CommandBuilder {
    let config = BuilderCommandConfig {
      program: "/bin/sh".into(),
      args: vec!["-c".into(), script.into()],
    };
    CommandBuilder::new(&config, Path::new("/"))
  }

  #[cfg(unix)]
  #[test]
  fn silent_resolve_failures_mean_unknown() {
    let dir = tempfile::tempdir().unwrap();
    assert_eq!(shell("exit 1").resolve(dir.path(), "react"), Ok(None));
  }

  #[cfg(unix)]
  #[test]
  fn resolve_crashes_keep_their_stderr() {
    let dir = tempfile::tempdir().unwrap();
    assert_eq!(
      shell("echo 'builder crashed' >&2; exit 2").resolve(dir.path(), "react"),
      Err(BuilderFailure::Failed {
        stderr: "builder crashed".into()
      })
    );
  }

  #[test]
  fn missing_program_is_unavailable() {
    let config = BuilderCommandConfig {
      program: "/nonexistent/stagehand-builder".into(),
      args: Vec::new(),
    };
    let builder = CommandBuilder::new(&config, Path::new("/"));
    let request = BuildRequest {
      root: PathBuf::from("/"),
      path: "lib/a.js".into(),
      kind: crate::models::AssetKind::Javascript,
      bundle: Default::default(),
    };
    assert!(matches!(builder.build(&request), Err(BuilderFailure::Unavailable(_))));
  }
}
