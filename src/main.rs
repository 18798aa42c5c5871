use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use http::Request;
use stagehand::{Environment, Pipeline, PipelineConfig};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

#[derive(Parser, Debug)]
#[command(author, version, about = "Inspect asset resolution and middleware dispatch", long_about = None)]
struct Cli {
  /// Configuration file; defaults to `stagehand.config.json` in the current directory.
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  /// Override the configured environment (development, test, production).
  #[arg(long, global = true)]
  env: Option<String>,

  /// Log at debug level unless RUST_LOG says otherwise.
  #[arg(long, global = true)]
  trace: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Resolve specifiers to the URLs a page would emit.
  Resolve {
    /// Specifiers such as `/lib/app.js`, `react` or `gem:ui/button.js`.
    #[arg(required = true)]
    specifiers: Vec<String>,
  },
  /// Look a specifier up in the import map only.
  ImportMap {
    /// Specifier to look up.
    specifier: String,
    /// Base URL selecting scopes.
    #[arg(long, default_value = "/")]
    base: String,
  },
  /// Run a GET request through the middleware chain.
  Dispatch {
    /// Request path, with an optional query.
    path: String,
  },
}

fn install_subscriber(trace: bool) {
  let default = if trace { "debug" } else { "info" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
  fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn load_config(cli: &Cli) -> Result<PipelineConfig> {
  let mut config = match &cli.config {
    Some(path) => PipelineConfig::from_path(path)?,
    None => {
      let cwd = std::env::current_dir().context("failed to read the current directory")?;
      PipelineConfig::discover(&cwd)
    }
  };

  if let Some(env) = &cli.env {
    config.environment =
      Environment::parse(env).with_context(|| format!("unknown environment `{env}`"))?;
  }
  Ok(config)
}

fn run(cli: Cli) -> Result<bool> {
  let config = load_config(&cli)?;
  let pipeline = Pipeline::boot(config).context("failed to boot the pipeline")?;

  match cli.command {
    Command::Resolve { specifiers } => {
      let render = pipeline.begin_render();
      let mut ok = true;
      for specifier in specifiers {
        match render.resolver().resolve_paths(&specifier) {
          Ok(resolved) => println!("{specifier}\t{}\t{}", resolved.url(), resolved.absolute.display()),
          Err(err) => {
            eprintln!("{specifier}\terror: {err}");
            ok = false;
          }
        }
      }
      Ok(ok)
    }
    Command::ImportMap { specifier, base } => {
      let import_map = &pipeline.resolver().context().import_map;
      let resolution = import_map.resolve(&specifier, &base)?;
      match (resolution.matched, resolution.resolved) {
        (true, Some(target)) => println!("{specifier} -> {target}"),
        (false, Some(target)) => println!("{specifier} (unmapped) -> {target}"),
        (_, None) => println!("{specifier} is not mapped"),
      }
      Ok(resolution.matched)
    }
    Command::Dispatch { path } => {
      let request = Request::get(path.as_str())
        .body(())
        .with_context(|| format!("invalid request path `{path}`"))?;
      match pipeline.dispatch(&request) {
        Some(response) => {
          println!("{}", response.status());
          for (name, value) in response.headers() {
            println!("{name}: {}", value.to_str().unwrap_or("<binary>"));
          }
          println!("\n{} bytes", response.body().len());
          Ok(response.status().is_success())
        }
        None => {
          println!("not handled; the host application would answer");
          Ok(false)
        }
      }
    }
  }
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  install_subscriber(cli.trace);

  match run(cli) {
    Ok(true) => ExitCode::SUCCESS,
    Ok(false) => ExitCode::FAILURE,
    Err(err) => {
      eprintln!("error: {err:#}");
      ExitCode::FAILURE
    }
  }
}
