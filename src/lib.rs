#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![allow(clippy::module_inception)]

pub mod builder;
pub mod config;
pub mod css_module;
pub mod error;
pub mod import_map;
pub mod manifest;
pub mod middleware;
pub mod models;
pub mod pipeline;
pub mod resolver;
pub mod side_load;

pub use builder::{BuildOutput, BuildRequest, Builder, BuilderFailure, CommandBuilder};
pub use config::{Environment, PipelineConfig};
pub use css_module::CssModuleCompiler;
pub use error::{CompileError, Error, ImportMapError, Result};
pub use import_map::{ImportMap, Resolution};
pub use manifest::Manifest;
pub use middleware::{MiddlewareCandidate, MiddlewareDispatcher};
pub use models::{AssetKind, BundleMode, ResolvedPath};
pub use pipeline::{Pipeline, RenderScope};
pub use resolver::{PathResolver, ResolverContext};
pub use side_load::{SideLoad, SideLoadAsset, SideLoadKind};
