//! Parsing of class name references and the naming scheme for CSS module classes.

use heck::ToLowerCamelCase;
use sha1::{Digest, Sha1};

/// Length of the hex digest appended to module class names.
pub const DIGEST_LENGTH: usize = 8;

/// Extension of CSS module stylesheets.
pub const MODULE_EXTENSION: &str = ".module.css";

/// A class name as written in markup or component code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassNameRef<'a> {
  /// `title`: used verbatim unless prefixes are optional.
  Plain(&'a str),
  /// `@title`: scoped to the stylesheet next to the source file.
  Implicit(&'a str),
  /// `path/to/file@title`, `/abs/path@title` or `@scope/pkg/path@title`.
  Explicit {
    /// Stylesheet specifier, without the `.module.css` extension.
    stylesheet: &'a str,
    /// Local class name.
    local: &'a str,
  },
}

impl<'a> ClassNameRef<'a> {
  /// Split a reference at its last `@`.
  pub fn parse(name: &'a str) -> Self {
    match name.rsplit_once('@') {
      Some((_, "")) | None => Self::Plain(name),
      Some(("", local)) => Self::Implicit(local),
      Some((stylesheet, local)) => Self::Explicit { stylesheet, local },
    }
  }
}

/// `<camelCasedName>_<digest>`; a leading underscore survives camel-casing.
pub fn module_class_name(local: &str, digest: &str) -> String {
  format!("{}_{digest}", camelize(local))
}

/// Camel-case a local name with a lower-case first letter.
pub fn camelize(local: &str) -> String {
  match local.strip_prefix('_') {
    Some(rest) => format!("_{}", rest.to_lower_camel_case()),
    None => local.to_lower_camel_case(),
  }
}

/// First eight hex characters of the SHA-1 of a stylesheet's URL path.
///
/// The digest covers the path, not the contents: moving a stylesheet renames its classes,
/// editing it does not.
pub fn path_digest(url_path: &str) -> String {
  let hash = Sha1::digest(url_path.as_bytes());
  let mut digest = hex::encode(hash);
  digest.truncate(DIGEST_LENGTH);
  digest
}

/// The CSS module co-located with a source file: same basename, `.module.css` extension.
pub fn implicit_stylesheet(source_path: &str) -> String {
  format!("{}{MODULE_EXTENSION}", strip_extension(source_path))
}

/// Stylesheet path for an explicit reference, adding `.module.css` when missing.
pub fn explicit_stylesheet(stylesheet: &str) -> String {
  if stylesheet.ends_with(".css") {
    stylesheet.to_string()
  } else {
    format!("{stylesheet}{MODULE_EXTENSION}")
  }
}

/// Drop the final extension of the last path segment, if any.
pub fn strip_extension(path: &str) -> &str {
  let file_start = path.rfind('/').map_or(0, |index| index + 1);
  match path[file_start..].rfind('.') {
    Some(0) | None => path,
    Some(dot) => &path[..file_start + dot],
  }
}
