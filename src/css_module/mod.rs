//! CSS module class name compilation.
//!
//! Class names referenced with an `@` are rewritten to `<camelCasedName>_<digest>`, where the
//! digest is derived from the resolved URL path of the stylesheet that defines them. Every
//! stylesheet touched this way is side-loaded so the page ships the CSS its markup uses.

mod names;

pub use names::{
  ClassNameRef, DIGEST_LENGTH, MODULE_EXTENSION, camelize, explicit_stylesheet,
  implicit_stylesheet, module_class_name, path_digest, strip_extension,
};

use crate::error::{Error, Result};
use crate::resolver::PathResolver;
use crate::side_load::SideLoad;

/// Compiles class name references for one render.
pub struct CssModuleCompiler<'a> {
  resolver: &'a PathResolver,
}

impl<'a> CssModuleCompiler<'a> {
  /// Create a compiler resolving stylesheets through `resolver`.
  pub fn new(resolver: &'a PathResolver) -> Self {
    Self { resolver }
  }

  /// Compile `names` referenced from `source_path`.
  ///
  /// With `require_prefix`, plain names pass through untouched and only `@` references are
  /// transformed; without it, plain names are scoped to the implicit stylesheet too.
  pub fn class_names<S: AsRef<str>>(
    &self,
    names: &[S],
    source_path: &str,
    require_prefix: bool,
    side_load: &mut SideLoad,
  ) -> Result<Vec<String>> {
    names
      .iter()
      .map(|name| {
        let name = name.as_ref();
        match ClassNameRef::parse(name) {
          ClassNameRef::Plain(plain) if require_prefix => Ok(plain.to_string()),
          ClassNameRef::Plain(local) | ClassNameRef::Implicit(local) => {
            self.transform(local, &implicit_stylesheet(source_path), side_load)
          }
          ClassNameRef::Explicit { stylesheet, local } => {
            self.transform(local, &explicit_stylesheet(stylesheet), side_load)
          }
        }
      })
      .collect()
  }

  /// Compile a single name, always scoping it; a plain name uses the implicit stylesheet.
  pub fn class_name(
    &self,
    name: &str,
    source_path: &str,
    side_load: &mut SideLoad,
  ) -> Result<String> {
    let mut compiled = self.class_names(&[name], source_path, false, side_load)?;
    compiled
      .pop()
      .ok_or_else(|| Error::StylesheetNotFound(implicit_stylesheet(source_path)))
  }

  fn transform(&self, local: &str, stylesheet: &str, side_load: &mut SideLoad) -> Result<String> {
    let resolved = match self.resolver.resolve_paths(stylesheet) {
      Ok(resolved) => resolved,
      Err(Error::Resolve { .. }) => return Err(Error::StylesheetNotFound(stylesheet.to_string())),
      Err(err) => return Err(err),
    };

    if !resolved.absolute.is_file() {
      return Err(Error::StylesheetNotFound(resolved.url_path().to_string()));
    }

    let digest = path_digest(resolved.url_path());
    side_load.register_css_module(&resolved, &digest);
    Ok(module_class_name(local, &digest))
  }
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeMap;
  use std::fs;
  use std::sync::Arc;

  use regex::Regex;
  use tempfile::{TempDir, tempdir};

  use super::*;
  use crate::builder::testing::RecordingBuilder;
  use crate::config::Environment;
  use crate::import_map::ImportMap;
  use crate::manifest::Manifest;
  use crate::resolver::ResolverContext;

  fn fixture() -> (TempDir, PathResolver) {
    let dir = tempdir().unwrap();
    let root = dir.path().join("app");
    for file in ["lib/basic.module.css", "lib/card.module.css", "lib/plain.css"] {
      let path = root.join(file);
      fs::create_dir_all(path.parent().unwrap()).unwrap();
      fs::write(path, ".title { color: red }").unwrap();
    }
    let ui = dir.path().join("vendor/ui");
    fs::create_dir_all(&ui).unwrap();
    fs::write(ui.join("button.module.css"), ".root {}").unwrap();

    let mut packages = BTreeMap::new();
    packages.insert("ui".to_string(), ui);
    let resolver = PathResolver::new(ResolverContext {
      root,
      environment: Environment::Development,
      packages,
      manifest: Manifest::unloaded(),
      import_map: ImportMap::default(),
      builder: Arc::new(RecordingBuilder::default()),
    });
    (dir, resolver)
  }

  #[test]
  fn scopes_implicit_references_with_a_path_digest() {
    let (_dir, resolver) = fixture();
    let compiler = CssModuleCompiler::new(&resolver);
    let mut side_load = SideLoad::new();

    let names = compiler
      .class_names(&["@title"], "/lib/basic", true, &mut side_load)
      .unwrap();

    let pattern = Regex::new(r"^title_[0-9a-f]{8}$").unwrap();
    assert!(pattern.is_match(&names[0]), "unexpected name {}", names[0]);
    assert_eq!(names[0], format!("title_{}", path_digest("/lib/basic.module.css")));

    let again = compiler
      .class_names(&["@title"], "/lib/basic", true, &mut side_load)
      .unwrap();
    assert_eq!(names, again);
  }

  #[test]
  fn plain_names_pass_through_when_prefix_required() {
    let (_dir, resolver) = fixture();
    let compiler = CssModuleCompiler::new(&resolver);
    let mut side_load = SideLoad::new();

    let names = compiler
      .class_names(&["container", "@big_title"], "/lib/basic.rs", true, &mut side_load)
      .unwrap();
    assert_eq!(names[0], "container");
    assert!(names[1].starts_with("bigTitle_"));

    let scoped = compiler
      .class_names(&["container"], "/lib/basic", false, &mut side_load)
      .unwrap();
    assert!(scoped[0].starts_with("container_"));
  }

  #[test]
  fn resolves_explicit_and_package_stylesheets() {
    let (_dir, resolver) = fixture();
    let compiler = CssModuleCompiler::new(&resolver);
    let mut side_load = SideLoad::new();

    let names = compiler
      .class_names(
        &["/lib/card@_hidden", "gem:ui/button@root"],
        "/lib/basic",
        true,
        &mut side_load,
      )
      .unwrap();

    assert_eq!(names[0], format!("_hidden_{}", path_digest("/lib/card.module.css")));
    assert_eq!(names[1], format!("root_{}", path_digest("/gem:ui/button.module.css")));
  }

  #[test]
  fn registers_stylesheets_for_side_loading() {
    let (_dir, resolver) = fixture();
    let compiler = CssModuleCompiler::new(&resolver);
    let mut side_load = SideLoad::new();

    compiler
      .class_names(&["@title", "@subtitle"], "/lib/basic", true, &mut side_load)
      .unwrap();

    let stylesheets = side_load.each_stylesheet(false);
    assert_eq!(stylesheets.len(), 1);
    assert_eq!(stylesheets[0].url, "/lib/basic.module.css");
    assert_eq!(
      stylesheets[0].digest.as_deref(),
      Some(path_digest("/lib/basic.module.css").as_str())
    );
  }

  #[test]
  fn missing_stylesheets_are_errors() {
    let (_dir, resolver) = fixture();
    let compiler = CssModuleCompiler::new(&resolver);
    let mut side_load = SideLoad::new();

    let err = compiler
      .class_names(&["/lib/missing@title"], "/lib/basic", true, &mut side_load)
      .unwrap_err();
    assert!(matches!(err, Error::StylesheetNotFound(path) if path == "/lib/missing.module.css"));

    let strict = compiler
      .class_name("title", "/lib/nothing", &mut side_load)
      .unwrap_err();
    assert!(matches!(strict, Error::StylesheetNotFound(_)));
    assert!(!side_load.css_imported());
  }

  #[test]
  fn strict_variant_scopes_plain_names() {
    let (dir, resolver) = fixture();
    let compiler = CssModuleCompiler::new(&resolver);
    let mut side_load = SideLoad::new();

    let absolute = dir.path().join("app/lib/basic.rs");
    let name = compiler
      .class_name("title", absolute.to_str().unwrap(), &mut side_load)
      .unwrap();
    assert_eq!(name, format!("title_{}", path_digest("/lib/basic.module.css")));
  }
}
