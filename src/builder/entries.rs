//! Wire format for multi-entry builds.

use crate::error::{Error, Result};

/// Separates entry points in a multi-entry request and pairs in its answer.
pub const ENTRY_DELIMITER: &str = ";";

/// Separates the input and output path of one compiled entry.
pub const ENTRY_PAIR_SEPARATOR: &str = "::";

/// Join entry points into a single multi-entry request.
pub fn join_entry_points<S: AsRef<str>>(paths: &[S]) -> String {
  paths
    .iter()
    .map(AsRef::as_ref)
    .collect::<Vec<_>>()
    .join(ENTRY_DELIMITER)
}

/// Split a multi-entry answer into `(input, output)` pairs, preserving order.
pub fn parse_entry_map(output: &str) -> Result<Vec<(String, String)>> {
  output
    .trim()
    .split(ENTRY_DELIMITER)
    .filter(|pair| !pair.trim().is_empty())
    .map(|pair| {
      pair
        .trim()
        .split_once(ENTRY_PAIR_SEPARATOR)
        .map(|(input, output)| (input.to_string(), output.to_string()))
        .ok_or_else(|| Error::Build {
          path: pair.to_string(),
          stderr: format!("malformed multi-entry output `{pair}`"),
        })
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn joins_paths_with_delimiter() {
    assert_eq!(
      join_entry_points(&["/app/a.js", "/app/b.js"]),
      "/app/a.js;/app/b.js"
    );
  }

  #[test]
  fn parses_pairs_in_order() {
    let pairs = parse_entry_map("/a.js::/assets/a-1.js;/b.js::/assets/b-2.js\n").unwrap();
    assert_eq!(pairs, vec![
      ("/a.js".to_string(), "/assets/a-1.js".to_string()),
      ("/b.js".to_string(), "/assets/b-2.js".to_string()),
    ]);
  }

  #[test]
  fn rejects_pairs_without_separator() {
    assert!(matches!(parse_entry_map("/a.js"), Err(Error::Build { .. })));
  }
}
