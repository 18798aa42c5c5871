//! Fetching and caching `url:` assets.

use std::collections::HashMap;
use std::io::{self, Read};
use std::sync::Arc;

use parking_lot::Mutex;
use percent_encoding::percent_decode_str;
use url::Url;

use crate::error::{Error, Result};

/// Largest remote body accepted, in bytes.
pub const MAX_REMOTE_BODY: u64 = 16 * 1024 * 1024;

/// Bodies kept by a [`RemoteCache`] unless configured otherwise.
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

/// Transport used for `url:` requests.
pub trait RemoteFetch: Send + Sync {
  /// Download `url`, failing on transport errors and non-success statuses.
  fn fetch(&self, url: &Url) -> Result<Vec<u8>>;
}

/// Blocking HTTP fetcher.
#[derive(Debug, Clone)]
pub struct UreqFetcher {
  agent: ureq::Agent,
}

impl Default for UreqFetcher {
  fn default() -> Self {
    Self {
      agent: ureq::AgentBuilder::new()
        .user_agent(concat!("stagehand/", env!("CARGO_PKG_VERSION")))
        .build(),
    }
  }
}

impl RemoteFetch for UreqFetcher {
  fn fetch(&self, url: &Url) -> Result<Vec<u8>> {
    let failure = |reason: String| Error::Remote {
      url: url.to_string(),
      reason,
    };

    let response = self
      .agent
      .request_url("GET", url)
      .call()
      .map_err(|err| failure(err.to_string()))?;

    read_capped(response.into_reader(), MAX_REMOTE_BODY)
      .map_err(|err| failure(err.to_string()))?
      .ok_or_else(|| failure(format!("body exceeds {MAX_REMOTE_BODY} bytes")))
  }
}

/// Read at most `limit` bytes; `None` when the reader has more.
fn read_capped(reader: impl Read, limit: u64) -> io::Result<Option<Vec<u8>>> {
  let mut body = Vec::new();
  reader.take(limit + 1).read_to_end(&mut body)?;
  Ok((body.len() as u64 <= limit).then_some(body))
}

/// Decode the part of a request path after `/url:` into an `http(s)` URL.
pub fn decode_remote_url(encoded: &str) -> Option<Url> {
  let decoded = percent_decode_str(encoded).decode_utf8().ok()?;
  let url = Url::parse(&decoded).ok()?;
  matches!(url.scheme(), "http" | "https").then_some(url)
}

/// Fetched bodies keyed by decoded URL.
pub struct RemoteCache {
  fetcher: Arc<dyn RemoteFetch>,
  enabled: bool,
  capacity: usize,
  entries: Mutex<HashMap<String, Arc<Vec<u8>>>>,
}

impl RemoteCache {
  /// Cache in front of `fetcher`; with `enabled` unset every request hits the network.
  pub fn new(fetcher: Arc<dyn RemoteFetch>, enabled: bool) -> Self {
    Self {
      fetcher,
      enabled,
      capacity: DEFAULT_CACHE_CAPACITY,
      entries: Mutex::default(),
    }
  }

  /// Keep at most `capacity` bodies; once full, further URLs are fetched on every request.
  pub fn with_capacity(mut self, capacity: usize) -> Self {
    self.capacity = capacity;
    self
  }

  /// Cached body for `url`, fetching it on first use.
  pub fn get(&self, url: &Url) -> Result<Arc<Vec<u8>>> {
    let key = url.as_str();
    if self.enabled {
      if let Some(body) = self.entries.lock().get(key) {
        tracing::trace!(url = key, "remote cache hit");
        return Ok(Arc::clone(body));
      }
    }

    tracing::debug!(url = key, "fetching remote asset");
    let body = Arc::new(self.fetcher.fetch(url)?);
    if self.enabled {
      let mut entries = self.entries.lock();
      if entries.len() < self.capacity {
        entries.insert(key.to_string(), Arc::clone(&body));
      } else {
        tracing::debug!(url = key, capacity = self.capacity, "remote cache full");
      }
    }
    Ok(body)
  }

  /// Number of cached bodies.
  pub fn len(&self) -> usize {
    self.entries.lock().len()
  }

  /// True when nothing is cached.
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}
