//! Boot-time composition of the pipeline and the per-render scope handed to templates.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use http::{Request, Response};

use crate::builder::{Builder, CommandBuilder};
use crate::config::PipelineConfig;
use crate::css_module::CssModuleCompiler;
use crate::error::{Error, Result};
use crate::import_map::ImportMap;
use crate::manifest::Manifest;
use crate::middleware::{
  CandidateRoots, MiddlewareDispatcher, RemoteCache, RemoteFetch, UreqFetcher,
};
use crate::resolver::{PathResolver, ResolverContext};
use crate::side_load::{self, SideLoad, SideLoadKind};

/// Everything booted once per process: resolver inputs, the middleware chain and the builder.
pub struct Pipeline {
  config: PipelineConfig,
  resolver: PathResolver,
  dispatcher: MiddlewareDispatcher,
}

impl Pipeline {
  /// Boot with the configured external builder and a real HTTP fetcher.
  pub fn boot(config: PipelineConfig) -> Result<Self> {
    let root = canonical_root(&config.root)?;
    let builder = Arc::new(CommandBuilder::new(&config.builder, &root));
    Self::with_services(config, builder, Arc::new(UreqFetcher::default()))
  }

  /// Boot with explicit collaborators.
  pub fn with_services(
    mut config: PipelineConfig,
    builder: Arc<dyn Builder>,
    fetcher: Arc<dyn RemoteFetch>,
  ) -> Result<Self> {
    config.root = canonical_root(&config.root)?;
    for (name, path) in config.packages.iter_mut() {
      match fs::canonicalize(&*path) {
        Ok(canonical) => *path = canonical,
        Err(err) => tracing::warn!(
          package = %name,
          path = %path.display(),
          error = %err,
          "package root is not readable"
        ),
      }
    }

    let manifest = if config.environment.is_production() {
      let path = config.manifest_file();
      Manifest::load(&path, &config.public_dir).map_err(|err| Error::Manifest {
        path,
        message: format!("{err:#}"),
      })?
    } else {
      Manifest::unloaded()
    };

    let import_map_file = config.import_map_file();
    let import_map = ImportMap::load(&import_map_file, "/")?;
    tracing::info!(
      root = %config.root.display(),
      environment = config.environment.as_str(),
      import_map = %import_map_file.display(),
      manifest_entries = manifest.len(),
      "pipeline booted"
    );

    let resolver = PathResolver::new(ResolverContext {
      root: config.root.clone(),
      environment: config.environment,
      packages: config.packages.clone(),
      manifest,
      import_map,
      builder: Arc::clone(&builder),
    });

    let dispatcher = MiddlewareDispatcher::new(
      CandidateRoots {
        root: config.root.clone(),
        public_root: config.public_root(),
        packages: config.packages.clone(),
      },
      config.environment,
      config.cache_max_age,
      &config.middleware,
      builder,
      RemoteCache::new(fetcher, config.remote_cache),
    );

    Ok(Self {
      config,
      resolver,
      dispatcher,
    })
  }

  /// Effective configuration, with the root canonicalised.
  pub fn config(&self) -> &PipelineConfig {
    &self.config
  }

  /// Process-wide resolver. Renders should use [`Self::begin_render`] instead.
  pub fn resolver(&self) -> &PathResolver {
    &self.resolver
  }

  /// Middleware chain.
  pub fn dispatcher(&self) -> &MiddlewareDispatcher {
    &self.dispatcher
  }

  /// Answer an asset request, or `None` to fall through to the host application.
  pub fn dispatch<B>(&self, request: &Request<B>) -> Option<Response<Vec<u8>>> {
    self.dispatcher.dispatch(request)
  }

  /// Fresh state for rendering one page.
  pub fn begin_render(&self) -> RenderScope {
    RenderScope {
      resolver: self.resolver.for_request(),
      side_load: SideLoad::new(),
      code_splitting: self.config.code_splitting,
      finished: false,
    }
  }
}

fn canonical_root(root: &Path) -> Result<PathBuf> {
  fs::canonicalize(root).map_err(|err| {
    Error::Config(format!(
      "application root {} is not readable: {err}",
      root.display()
    ))
  })
}

/// Resolver and side-load state for one render.
///
/// Call [`RenderScope::finish`] once the page is complete; it fails when side-loaded assets
/// never made it into the markup.
pub struct RenderScope {
  resolver: PathResolver,
  side_load: SideLoad,
  code_splitting: bool,
  finished: bool,
}

impl RenderScope {
  /// Resolver whose cache lives as long as this scope (or the process, in production).
  pub fn resolver(&self) -> &PathResolver {
    &self.resolver
  }

  /// Resolve a specifier to the URL to emit.
  pub fn resolve(&self, specifier: &str) -> Result<String> {
    self.resolver.resolve(specifier)
  }

  /// Side-load the assets sharing `path`'s basename.
  pub fn side_load(&mut self, path: &str, kind: SideLoadKind) -> Result<()> {
    self.side_load.append(&self.resolver, path, kind)
  }

  /// Side-load scripts for lazy mounting by the client.
  pub fn side_load_lazy(&mut self, path: &str, kind: SideLoadKind) -> Result<()> {
    self.side_load.append_lazy(&self.resolver, path, kind)
  }

  /// Compile CSS module class names referenced from `source_path`.
  pub fn class_names<S: AsRef<str>>(
    &mut self,
    names: &[S],
    source_path: &str,
    require_prefix: bool,
  ) -> Result<Vec<String>> {
    CssModuleCompiler::new(&self.resolver).class_names(
      names,
      source_path,
      require_prefix,
      &mut self.side_load,
    )
  }

  /// Compile one class name, failing when its stylesheet is missing.
  pub fn class_name(&mut self, name: &str, source_path: &str) -> Result<String> {
    CssModuleCompiler::new(&self.resolver).class_name(name, source_path, &mut self.side_load)
  }

  /// Drain queued stylesheets into `<link>` tags.
  pub fn stylesheet_tags(&mut self) -> String {
    side_load::stylesheet_tags(&mut self.side_load)
  }

  /// Drain queued scripts into `<script>` tags.
  pub fn javascript_tags(&mut self) -> Result<String> {
    side_load::javascript_tags(&mut self.side_load, &self.resolver, self.code_splitting)
  }

  /// Side-load state, for templates that render tags themselves.
  pub fn state(&mut self) -> &mut SideLoad {
    &mut self.side_load
  }

  /// End the render, failing if queued assets were never emitted.
  pub fn finish(mut self) -> Result<()> {
    self.finished = true;
    self.side_load.ensure_included()
  }
}

impl Drop for RenderScope {
  fn drop(&mut self) {
    if self.finished {
      return;
    }
    let leftovers = self.side_load.leftovers();
    if !leftovers.is_empty() {
      tracing::warn!(?leftovers, "render scope dropped with side-loaded assets never included");
    }
  }
}
