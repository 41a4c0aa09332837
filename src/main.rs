//! Command line front end: match a path or assemble one from a config file.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use route_stack::config::{load_config, RouterConfig};
use route_stack::observability::init_logging;
use route_stack::routing::{AssembleOptions, ContainerValue, Containers, Params, Router};

#[derive(Parser)]
#[command(name = "route-stack")]
#[command(about = "Match and assemble paths against a route tree", long_about = None)]
struct Cli {
    /// Route configuration (TOML). Defaults to an empty route tree.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Match a path and print the match tree as JSON
    Match {
        path: String,
        #[arg(short, long, default_value = "GET")]
        method: String,
    },
    /// Assemble a path from params and container overrides
    Assemble {
        /// Slash-separated route name, e.g. `blog/post`
        #[arg(short, long)]
        name: Option<String>,
        /// Route parameter as `key=value`
        #[arg(short, long = "param", value_parser = parse_pair)]
        params: Vec<(String, String)>,
        /// Container override as `key=path`; `key=` strips the container
        #[arg(short = 'C', long = "container", value_parser = parse_pair)]
        containers: Vec<(String, String)>,
        /// Path to match first, so nested stacks have a match to rebuild
        #[arg(long = "from")]
        from: Option<String>,
    },
}

fn parse_pair(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got \"{raw}\""))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => RouterConfig::default(),
    };
    init_logging(&config.observability);
    tracing::info!(config = ?cli.config, "route-stack starting");

    let router = Router::from_config(&config)?;

    match cli.command {
        Commands::Match { path, method } => match router.match_path(&method, &path)? {
            Some(found) => println!("{}", serde_json::to_string_pretty(&found.to_json())?),
            None => {
                println!("no match");
            }
        },
        Commands::Assemble {
            name,
            params,
            containers,
            from,
        } => {
            if let Some(path) = from {
                if router.match_path("GET", &path)?.is_none() {
                    tracing::warn!(path = %path, "path to assemble from did not match");
                }
            }
            let params: Params = params.into_iter().collect();
            let mut options = AssembleOptions {
                name,
                ..AssembleOptions::default()
            };
            if !containers.is_empty() {
                let containers: Containers = containers
                    .into_iter()
                    .map(|(key, value)| {
                        let value = if value.is_empty() {
                            ContainerValue::Strip
                        } else {
                            ContainerValue::Path(value)
                        };
                        (key, value)
                    })
                    .collect();
                options = options.with_containers(containers);
            }
            println!("{}", router.assemble(&params, &options)?);
        }
    }

    Ok(())
}
