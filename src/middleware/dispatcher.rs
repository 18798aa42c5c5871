//! Per-request selection of the candidate that answers an asset request.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use http::{Method, Request, Response, StatusCode, header};

use crate::builder::sourcemap::{append_trailer, split_source_map};
use crate::builder::{BuildRequest, Builder};
use crate::config::Environment;
use crate::models::{AssetKind, BundleMode};

use super::candidate::{CandidateAction, CandidateRoots, MiddlewareCandidate, RequestPath};
use super::path::{is_readable, safe_join};
use super::remote::{RemoteCache, decode_remote_url};
use super::response::{self, is_content_hashed};

/// Walks the configured candidates in order; the first that can serve a request does.
pub struct MiddlewareDispatcher {
  roots: CandidateRoots,
  environment: Environment,
  cache_max_age: u64,
  candidates: Vec<MiddlewareCandidate>,
  builder: Arc<dyn Builder>,
  remote: RemoteCache,
}

impl MiddlewareDispatcher {
  /// Build the candidate list from configured `names`.
  ///
  /// Unknown names are skipped with a warning, as are development-only candidates in production.
  pub fn new(
    roots: CandidateRoots,
    environment: Environment,
    cache_max_age: u64,
    names: &[String],
    builder: Arc<dyn Builder>,
    remote: RemoteCache,
  ) -> Self {
    let candidates = names
      .iter()
      .filter_map(|name| {
        let candidate = MiddlewareCandidate::named(name);
        if candidate.is_none() {
          tracing::warn!(name = %name, "unknown middleware ignored");
        }
        candidate
      })
      .filter(|candidate| !(candidate.development_only && environment.is_production()))
      .collect();

    Self {
      roots,
      environment,
      cache_max_age,
      candidates,
      builder,
      remote,
    }
  }

  /// Names of the active candidates, in evaluation order.
  pub fn candidate_names(&self) -> Vec<&'static str> {
    self.candidates.iter().map(|candidate| candidate.name).collect()
  }

  /// Answer `request`, or `None` to let the host application handle it.
  pub fn dispatch<B>(&self, request: &Request<B>) -> Option<Response<Vec<u8>>> {
    let method = request.method();
    if method != Method::GET && method != Method::HEAD {
      return None;
    }

    let Some(path) = RequestPath::parse(request.uri().path(), request.uri().query()) else {
      tracing::debug!(path = request.uri().path(), "rejected unsafe request path");
      return None;
    };

    let mut response = self
      .candidates
      .iter()
      .find_map(|candidate| self.try_candidate(candidate, &path))?;

    if method == Method::HEAD {
      let length = response.body().len();
      response
        .headers_mut()
        .insert(header::CONTENT_LENGTH, length.into());
      response.body_mut().clear();
    }
    Some(response)
  }

  fn try_candidate(
    &self,
    candidate: &MiddlewareCandidate,
    request: &RequestPath,
  ) -> Option<Response<Vec<u8>>> {
    if !(candidate.applies)(request) {
      return None;
    }
    let root = (candidate.root)(&self.roots, request)?;
    let relative = (candidate.path)(request)?;

    match candidate.action {
      CandidateAction::Remote => {
        let url = decode_remote_url(&relative)?;
        tracing::debug!(middleware = candidate.name, url = %url, "dispatching remote asset");
        Some(self.serve_remote(candidate, &url))
      }
      CandidateAction::Static => {
        let file = safe_join(&root, &relative)?;
        if !is_readable(&file) {
          return None;
        }
        tracing::debug!(middleware = candidate.name, file = %file.display(), "serving static file");
        self.serve_static(candidate, request, &file)
      }
      CandidateAction::Build => {
        let relative = if request.source_map {
          relative.strip_suffix(".map").unwrap_or(&relative)
        } else {
          &relative
        };
        let file = safe_join(&root, relative)?;
        if !is_readable(&file) {
          return None;
        }
        tracing::debug!(middleware = candidate.name, file = %file.display(), "building asset");
        Some(self.serve_build(candidate, request, root, relative))
      }
    }
  }

  fn serve_static(
    &self,
    candidate: &MiddlewareCandidate,
    request: &RequestPath,
    file: &Path,
  ) -> Option<Response<Vec<u8>>> {
    let body = match fs::read(file) {
      Ok(body) => body,
      Err(err) => {
        tracing::debug!(file = %file.display(), error = %err, "static file vanished");
        return None;
      }
    };

    let content_type = mime_guess::from_path(file).first_or_octet_stream();
    let max_age = is_content_hashed(&request.cleaned).then_some(self.cache_max_age);
    Some(response::ok(candidate.name, content_type.as_ref(), body, max_age))
  }

  fn serve_build(
    &self,
    candidate: &MiddlewareCandidate,
    request: &RequestPath,
    root: PathBuf,
    relative: &str,
  ) -> Response<Vec<u8>> {
    let kind = request.asset_kind().unwrap_or(AssetKind::Javascript);
    let build = BuildRequest {
      root,
      path: relative.trim_start_matches('/').to_string(),
      kind,
      bundle: BundleMode::from_query(request.query.as_deref()),
    };

    let output = match self.builder.build(&build) {
      Ok(output) => output,
      Err(failure) => {
        let error = failure.into_error(&build.path);
        return response::failure(candidate.name, &error, self.environment, Some(kind));
      }
    };

    let split = split_source_map(&output.contents);
    let source_map = output.source_map.or(split.inline_map);

    if request.source_map {
      return match source_map {
        Some(map) => response::ok(candidate.name, "application/json", map, None),
        None => {
          let mut missing =
            response::ok(candidate.name, "text/plain; charset=utf-8", Vec::new(), None);
          *missing.status_mut() = StatusCode::NOT_FOUND;
          missing
        }
      };
    }

    let body = match source_map {
      Some(_) => {
        let mut code = split.code;
        append_trailer(&mut code, request.file_name(), kind);
        code
      }
      None => output.contents,
    };
    response::ok(candidate.name, kind.content_type(), body, None)
  }

  fn serve_remote(&self, candidate: &MiddlewareCandidate, url: &url::Url) -> Response<Vec<u8>> {
    let kind = AssetKind::from_path(url.path());
    match self.remote.get(url) {
      Ok(body) => {
        let content_type = kind.map_or_else(
          || mime_guess::from_path(url.path()).first_or_octet_stream().to_string(),
          |kind| kind.content_type().to_string(),
        );
        response::ok(candidate.name, &content_type, (*body).clone(), None)
      }
      Err(error) => response::failure(candidate.name, &error, self.environment, kind),
    }
  }
}
