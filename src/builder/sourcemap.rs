//! Source map comments: extracting inline maps and appending external trailers.

use std::sync::OnceLock;

use base64::{Engine as _, engine::general_purpose};
use regex::bytes::Regex;

use crate::models::AssetKind;

fn source_map_comment() -> &'static Regex {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| {
    Regex::new(r"(?m)\n?(?://[#@] sourceMappingURL=(\S+)[ \t]*|/\*[#@] sourceMappingURL=(\S+)[ \t]*\*/)\s*\z")
      .expect("invalid sourceMappingURL regex")
  })
}

const DATA_URL_PREFIX: &str = "data:application/json;";

/// Compiled code with any trailing `sourceMappingURL` comment removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitSource {
  /// Code without the trailing comment.
  pub code: Vec<u8>,
  /// Decoded inline source map, if the comment carried a base64 data URL.
  pub inline_map: Option<Vec<u8>>,
}

/// Remove the trailing source map comment, decoding it when it is an inline data URL.
pub fn split_source_map(contents: &[u8]) -> SplitSource {
  let Some(captures) = source_map_comment().captures(contents) else {
    return SplitSource {
      code: contents.to_vec(),
      inline_map: None,
    };
  };

  let whole = captures.get(0).map_or(contents.len(), |m| m.start());
  let url = captures
    .get(1)
    .or_else(|| captures.get(2))
    .map(|m| m.as_bytes())
    .unwrap_or_default();

  SplitSource {
    code: contents[..whole].to_vec(),
    inline_map: decode_data_url(url),
  }
}

fn decode_data_url(url: &[u8]) -> Option<Vec<u8>> {
  let url = std::str::from_utf8(url).ok()?;
  let rest = url.strip_prefix(DATA_URL_PREFIX)?;
  let (_, payload) = rest.split_once("base64,")?;
  general_purpose::STANDARD.decode(payload).ok()
}

/// Append a `sourceMappingURL` comment pointing at `<file_name>.map`.
pub fn append_trailer(code: &mut Vec<u8>, file_name: &str, kind: AssetKind) {
  if !code.ends_with(b"\n") {
    code.push(b'\n');
  }
  let trailer = if kind.is_stylesheet() {
    format!("/*# sourceMappingURL={file_name}.map */")
  } else {
    format!("//# sourceMappingURL={file_name}.map")
  };
  code.extend_from_slice(trailer.as_bytes());
}
