//! Development and production asset middleware.
//!
//! A request flows `received -> path cleaned -> candidate matching` and ends in a static file,
//! a builder invocation, or `None` so the host application can answer it.

mod candidate;
mod dispatcher;
mod path;
mod remote;
mod response;

pub use candidate::{CandidateAction, CandidateRoots, MiddlewareCandidate, RequestPath};
pub use dispatcher::MiddlewareDispatcher;
pub use path::{clean_path, is_readable, safe_join};
pub use remote::{RemoteCache, RemoteFetch, UreqFetcher, decode_remote_url};
pub use response::{MIDDLEWARE_HEADER, is_content_hashed};

#[cfg(test)]
pub(crate) use remote::tests::StubFetcher;
