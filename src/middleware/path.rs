//! Request path cleaning and filesystem checks done before any candidate touches the disk.

use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use percent_encoding::percent_decode_str;

/// Percent-decode `raw` and normalise it to `/a/b/c`.
///
/// Returns `None` for traversal (`..`), NUL bytes, backslashes and invalid UTF-8.
pub fn clean_path(raw: &str) -> Option<String> {
  let decoded = percent_decode_str(raw).decode_utf8().ok()?;
  if decoded.contains(['\0', '\\']) {
    return None;
  }

  let mut segments = Vec::new();
  for segment in decoded.split('/') {
    match segment {
      "" | "." => {}
      ".." => return None,
      segment => segments.push(segment),
    }
  }

  Some(format!("/{}", segments.join("/")))
}

/// Join a cleaned path onto `root`, refusing anything that would land outside it.
///
/// Containment is checked on canonical paths, so a symlink under `root` that points elsewhere
/// is refused as well. A path that cannot be canonicalised counts as unreadable.
pub fn safe_join(root: &Path, cleaned: &str) -> Option<PathBuf> {
  let relative = Path::new(cleaned.trim_start_matches('/'));
  let plain = relative
    .components()
    .all(|component| matches!(component, Component::Normal(_)));
  if !plain {
    return None;
  }

  let joined = root.join(relative);
  let canonical_root = canonical(root)?;
  let canonical_file = canonical(&joined)?;
  if !canonical_file.starts_with(&canonical_root) {
    tracing::debug!(
      path = %joined.display(),
      target = %canonical_file.display(),
      root = %canonical_root.display(),
      "refusing path that resolves outside its root"
    );
    return None;
  }
  Some(joined)
}

fn canonical(path: &Path) -> Option<PathBuf> {
  match fs::canonicalize(path) {
    Ok(canonical) => Some(canonical),
    Err(err) => {
      if err.kind() != ErrorKind::NotFound {
        tracing::trace!(path = %path.display(), error = %err, "failed to canonicalise path");
      }
      None
    }
  }
}

/// True when `path` is a regular file that can be opened. Any I/O failure counts as "no".
pub fn is_readable(path: &Path) -> bool {
  match File::open(path).and_then(|file| file.metadata()) {
    Ok(metadata) => metadata.is_file(),
    Err(err) => {
      if err.kind() != ErrorKind::NotFound {
        tracing::trace!(path = %path.display(), error = %err, "treating path as unreadable");
      }
      false
    }
  }
}

#[cfg(test)]
mod tests {
  use std::fs;

  use tempfile::tempdir;

  use super::*;

  #[test]
  fn cleans_and_decodes_paths() {
    assert_eq!(clean_path("/lib/foo.js").as_deref(), Some("/lib/foo.js"));
    assert_eq!(clean_path("//lib/./a%20b.js").as_deref(), Some("/lib/a b.js"));
    assert_eq!(clean_path("/").as_deref(), Some("/"));
  }

  #[test]
  fn rejects_traversal() {
    assert_eq!(clean_path("/../etc/passwd"), None);
    assert_eq!(clean_path("/lib/%2e%2e/%2e%2e/etc/passwd"), None);
    assert_eq!(clean_path("/lib/..%5c..%5cwin.ini"), None);
    assert_eq!(clean_path("/lib/a%00.js"), None);
    assert_eq!(clean_path("/lib/%ff.js"), None);
  }

  #[test]
  fn joins_inside_the_root_only() {
    let dir = tempdir().unwrap();
    fs::create_dir(dir.path().join("lib")).unwrap();
    fs::write(dir.path().join("lib/a.js"), "").unwrap();

    assert_eq!(safe_join(dir.path(), "/lib/a.js"), Some(dir.path().join("lib/a.js")));
    assert_eq!(safe_join(dir.path(), "/lib/../../etc"), None);
    assert_eq!(safe_join(dir.path(), "/lib/missing.js"), None);
  }

  #[cfg(unix)]
  #[test]
  fn refuses_symlinks_leaving_the_root() {
    let dir = tempdir().unwrap();
    let public = dir.path().join("public");
    fs::create_dir(&public).unwrap();
    fs::write(dir.path().join("secret.txt"), "TOP SECRET").unwrap();
    fs::write(public.join("shared.txt"), "ok").unwrap();
    std::os::unix::fs::symlink("../secret.txt", public.join("leak.txt")).unwrap();
    std::os::unix::fs::symlink("shared.txt", public.join("alias.txt")).unwrap();

    assert_eq!(safe_join(&public, "/leak.txt"), None);
    assert_eq!(safe_join(&public, "/alias.txt"), Some(public.join("alias.txt")));
    assert!(safe_join(Path::new("/"), &dir.path().join("secret.txt").to_string_lossy()).is_some());
  }

  #[test]
  fn unreadable_paths_are_not_errors() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.js"), "").unwrap();

    assert!(is_readable(&dir.path().join("a.js")));
    assert!(!is_readable(&dir.path().join("missing.js")));
    assert!(!is_readable(dir.path()));
  }
}
