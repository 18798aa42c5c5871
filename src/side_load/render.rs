//! Turning queued side-loads into `<link>` and `<script>` tags.

use std::collections::BTreeMap;

use html_escape::encode_double_quoted_attribute;

use super::{SideLoad, SideLoadAsset};
use crate::builder::{join_entry_points, parse_entry_map};
use crate::error::Result;
use crate::resolver::PathResolver;

/// `id` of the JSON blob listing lazily loaded scripts.
pub const LAZY_SCRIPTS_ID: &str = "stagehand-lazy-scripts";

/// Drain queued stylesheets into `<link>` tags.
pub fn stylesheet_tags(side_load: &mut SideLoad) -> String {
  side_load
    .each_stylesheet(true)
    .iter()
    .map(|asset| {
      format!(
        "<link rel=\"stylesheet\" href=\"{}\" data-original-href=\"{}\">\n",
        encode_double_quoted_attribute(&asset.url),
        encode_double_quoted_attribute(&asset.source),
      )
    })
    .collect()
}

/// Drain queued scripts into module `<script>` tags.
///
/// With code splitting on and more than one script queued, all of them are compiled in a single
/// multi-entry build and the tags point at its outputs. Lazy scripts are not tagged; they are
/// listed in a JSON blob for the client-side loader.
pub fn javascript_tags(
  side_load: &mut SideLoad,
  resolver: &PathResolver,
  code_splitting: bool,
) -> Result<String> {
  let assets = side_load.each_javascript(true);
  if assets.is_empty() {
    return Ok(String::new());
  }

  let outputs = if code_splitting && assets.len() > 1 {
    split_outputs(resolver, &assets)?
  } else {
    BTreeMap::new()
  };

  let mut html = String::new();
  let mut lazy = BTreeMap::new();
  for asset in &assets {
    let src = outputs.get(&asset.source).unwrap_or(&asset.url);
    if asset.lazy {
      lazy.insert(asset.source.as_str(), src.as_str());
    } else {
      html.push_str(&format!(
        "<script type=\"module\" src=\"{}\"></script>\n",
        encode_double_quoted_attribute(src)
      ));
    }
  }

  if !lazy.is_empty() {
    let json = serde_json::to_string(&lazy)?.replace("</", "<\\/");
    html.push_str(&format!(
      "<script type=\"application/json\" id=\"{LAZY_SCRIPTS_ID}\">{json}</script>\n"
    ));
  }

  Ok(html)
}

fn split_outputs(
  resolver: &PathResolver,
  assets: &[SideLoadAsset],
) -> Result<BTreeMap<String, String>> {
  let sources: Vec<&str> = assets.iter().map(|asset| asset.source.as_str()).collect();
  let entries = join_entry_points(&sources);
  let answer = resolver
    .builder()
    .build_entries(resolver.root(), &entries)
    .map_err(|failure| failure.into_error(&entries))?;

  let outputs: BTreeMap<String, String> = parse_entry_map(&answer)?.into_iter().collect();
  tracing::debug!(entries = %entries, outputs = outputs.len(), "built split entries");
  Ok(outputs)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::side_load::SideLoadKind;
  use crate::side_load::tests::app;

  #[test]
  fn shared_partials_are_emitted_once() {
    let (_dir, resolver, _) = app(&[
      "layouts/application.js",
      "views/users/show.js",
      "views/shared/avatar.js",
      "views/shared/avatar.css",
    ]);
    let mut side_load = SideLoad::new();

    for path in ["layouts/application", "views/shared/avatar"] {
      side_load.append(&resolver, path, SideLoadKind::All).unwrap();
    }
    for path in ["views/users/show", "views/shared/avatar"] {
      side_load.append(&resolver, path, SideLoadKind::All).unwrap();
    }

    let html = format!(
      "{}{}",
      stylesheet_tags(&mut side_load),
      javascript_tags(&mut side_load, &resolver, false).unwrap()
    );

    assert_eq!(html.matches("src=\"/views/shared/avatar.js\"").count(), 1);
    assert_eq!(
      html.matches("<link rel=\"stylesheet\" href=\"/views/shared/avatar.css\"").count(),
      1
    );
    assert_eq!(html.matches("<script").count(), 3);
    assert!(side_load.ensure_included().is_ok());
  }

  #[test]
  fn multiple_scripts_use_one_split_build() {
    let (_dir, resolver, builder) = app(&["views/a.js", "views/b.js"]);
    let mut side_load = SideLoad::new();
    side_load.append(&resolver, "views/a", SideLoadKind::Javascript).unwrap();
    side_load.append(&resolver, "views/b", SideLoadKind::Javascript).unwrap();

    let html = javascript_tags(&mut side_load, &resolver, true).unwrap();

    assert_eq!(*builder.entries_calls.lock(), vec!["/views/a.js;/views/b.js".to_string()]);
    assert!(html.contains("<script type=\"module\" src=\"/assets/views/a-SPLIT000.js\"></script>"));
    assert!(html.contains("<script type=\"module\" src=\"/assets/views/b-SPLIT000.js\"></script>"));
    assert!(!side_load.js_imported());
  }

  #[test]
  fn single_scripts_skip_the_split_build() {
    let (_dir, resolver, builder) = app(&["views/a.js"]);
    let mut side_load = SideLoad::new();
    side_load.append(&resolver, "views/a", SideLoadKind::Javascript).unwrap();

    let html = javascript_tags(&mut side_load, &resolver, true).unwrap();
    assert_eq!(html, "<script type=\"module\" src=\"/views/a.js\"></script>\n");
    assert!(builder.entries_calls.lock().is_empty());
  }

  #[test]
  fn lazy_scripts_are_listed_as_json() {
    let (_dir, resolver, _) = app(&["views/a.js", "components/chart.js"]);
    let mut side_load = SideLoad::new();
    side_load.append(&resolver, "views/a", SideLoadKind::Javascript).unwrap();
    side_load
      .append_lazy(&resolver, "components/chart", SideLoadKind::Javascript)
      .unwrap();

    let html = javascript_tags(&mut side_load, &resolver, true).unwrap();
    assert!(html.contains("src=\"/assets/views/a-SPLIT000.js\""));
    assert!(html.contains(&format!(
      "<script type=\"application/json\" id=\"{LAZY_SCRIPTS_ID}\">{{\"/components/chart.js\":\"/assets/components/chart-SPLIT000.js\"}}</script>"
    )));
    assert!(!html.contains("src=\"/assets/components"));
  }

  #[test]
  fn escapes_attribute_values() {
    let (_dir, resolver, _) = app(&["views/a.js"]);
    let mut side_load = SideLoad::new();
    side_load.append(&resolver, "views/a", SideLoadKind::Javascript).unwrap();
    let mut assets = side_load.each_javascript(true);
    assets[0].url = r#"/a.js?x="1"&y<2>"#.to_string();
    side_load.javascript.insert(assets[0].source.clone(), assets[0].clone());

    let html = javascript_tags(&mut side_load, &resolver, false).unwrap();
    assert_eq!(
      html,
      "<script type=\"module\" src=\"/a.js?x=&quot;1&quot;&amp;y&lt;2&gt;\"></script>\n"
    );
  }
}
