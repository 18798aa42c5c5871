//! Response construction shared by the candidates.

use std::sync::OnceLock;

use http::{HeaderValue, Response, StatusCode, header};
use regex::Regex;

use crate::config::Environment;
use crate::error::{CompileError, Error};
use crate::models::AssetKind;

/// Header naming the candidate that produced a response.
pub const MIDDLEWARE_HEADER: &str = "x-stagehand-middleware";

fn content_hashed_name() -> &'static Regex {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| {
    Regex::new(r"[-.]([0-9A-Za-z]{8,})(?:\.[0-9A-Za-z]+)+$").expect("invalid content hash regex")
  })
}

/// True for file names carrying a build hash, such as `foo-ABCD1234.js`.
pub fn is_content_hashed(path: &str) -> bool {
  let name = path.rsplit('/').next().unwrap_or(path);
  content_hashed_name()
    .captures(name)
    .and_then(|captures| captures.get(1))
    .is_some_and(|hash| hash.as_str().bytes().any(|byte| byte.is_ascii_digit()))
}

/// `200 OK` with the given body and headers.
pub fn ok(
  middleware: &str,
  content_type: &str,
  body: Vec<u8>,
  cache_max_age: Option<u64>,
) -> Response<Vec<u8>> {
  let mut response = Response::new(body);
  let headers = response.headers_mut();
  insert(headers, header::CONTENT_TYPE, content_type);
  insert(headers, MIDDLEWARE_HEADER, middleware);
  if let Some(max_age) = cache_max_age {
    insert(
      headers,
      header::CACHE_CONTROL,
      &format!("public, max-age={max_age}, immutable"),
    );
  }
  response
}

/// Response for a failed build or fetch.
///
/// Development turns compile errors into something the browser shows to the developer; every
/// other case is a 5xx whose details only reach the log in production.
pub fn failure(
  middleware: &str,
  error: &Error,
  environment: Environment,
  kind: Option<AssetKind>,
) -> Response<Vec<u8>> {
  let status = match error {
    Error::Remote { .. } => StatusCode::BAD_GATEWAY,
    _ => StatusCode::INTERNAL_SERVER_ERROR,
  };

  if environment.is_production() {
    tracing::error!(middleware, error = %error, "asset request failed");
    let mut response = ok(
      middleware,
      "text/plain; charset=utf-8",
      status.canonical_reason().unwrap_or("Error").as_bytes().to_vec(),
      None,
    );
    *response.status_mut() = status;
    return response;
  }

  tracing::warn!(middleware, error = %error, "asset request failed");
  match (error, kind) {
    (Error::Compile(compile), Some(kind)) => {
      let (content_type, body) = if kind.is_stylesheet() {
        ("text/css", stylesheet_overlay(compile))
      } else {
        ("application/javascript", javascript_overlay(compile))
      };
      ok(middleware, content_type, body.into_bytes(), None)
    }
    _ => {
      let mut response = ok(
        middleware,
        "text/plain; charset=utf-8",
        error.to_string().into_bytes(),
        None,
      );
      *response.status_mut() = status;
      response
    }
  }
}

/// A module that logs the diagnostic and paints it over the page.
fn javascript_overlay(error: &CompileError) -> String {
  let message = serde_json::Value::String(error.to_string()).to_string();
  format!(
    r#"const message = {message};
console.error(message);
const overlay = document.createElement("pre");
overlay.id = "stagehand-error-overlay";
overlay.textContent = message;
overlay.style.cssText = "position:fixed;inset:0;z-index:2147483647;margin:0;padding:2rem;overflow:auto;background:rgba(24,24,27,.95);color:#fca5a5;font:14px/1.5 monospace;white-space:pre-wrap";
document.body.appendChild(overlay);
throw new Error(message);
"#
  )
}

/// A stylesheet that shows the diagnostic in a banner above the page.
fn stylesheet_overlay(error: &CompileError) -> String {
  let message = error.to_string();
  let comment = message.replace("*/", "* /");
  let content = serde_json::Value::String(message).to_string();
  format!(
    "/* {comment} */\nbody::before {{ content: {content}; display: block; padding: 1rem; background: #18181b; color: #fca5a5; font: 14px/1.5 monospace; white-space: pre-wrap; }}\n"
  )
}

fn insert<K: header::IntoHeaderName>(headers: &mut http::HeaderMap, name: K, value: &str) {
  match HeaderValue::from_str(value) {
    Ok(value) => {
      headers.insert(name, value);
    }
    Err(err) => tracing::warn!(value, error = %err, "dropping invalid header value"),
  }
}
