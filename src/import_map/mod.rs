//! Import map parsing and resolution.
//!
//! Maps follow the WHATWG import maps layout (`imports` plus path-scoped `scopes`) with one
//! relaxation: keys and targets that do not look like URLs are kept as literal strings, so
//! authors can alias bare names to other bare names.
//!
//! Every specifier map is kept as a slice sorted by descending key, which is what makes
//! longest-prefix matching a simple first-hit scan.

mod parse;
mod resolve;

pub use parse::{ImportMap, SpecifierMap, Target};
pub use resolve::Resolution;
