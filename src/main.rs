//! data-router CLI
//!
//! Inspect a route table written in TOML: match locations, list ranked
//! branches, build hrefs from patterns, and replay navigations against the
//! in-memory history.
//!
//! ```text
//! data-router --config routes.toml match /todos/7
//! data-router --config routes.toml branches
//! data-router generate /todos/:id id=7
//! data-router --config routes.toml navigate /todos /todos/7 -1
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::json;

use data_router::config::load_config;
use data_router::navigation::NavigateOptions;
use data_router::observability::logging::init_logging;
use data_router::routing::{generate_path, RouteHandlers};
use data_router::{RouterConfig, Router, RouterOptions, RouteTree};

#[derive(Parser)]
#[command(name = "data-router")]
#[command(about = "Inspect and exercise a nested route table", long_about = None)]
struct Cli {
    /// Route table (TOML). Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the matched chain for a pathname
    Match { pathname: String },
    /// List flattened branches in ranking order
    Branches,
    /// Fill a pattern with key=value params
    Generate {
        pattern: String,
        params: Vec<String>,
    },
    /// Apply hrefs (or signed history deltas like -1) in order
    Navigate {
        #[arg(allow_hyphen_values = true)]
        steps: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => RouterConfig::default(),
    };
    init_logging(&config.observability);

    tracing::debug!(
        routes = config.routes.len(),
        basename = %config.basename,
        "Configuration loaded"
    );

    match cli.command {
        Commands::Match { pathname } => {
            let tree = RouteTree::from_config(&config.routes, &RouteHandlers::default())?;
            let basename = config.normalized_basename();
            let matches = tree.match_routes(&pathname, basename.as_deref());
            if matches.is_none() {
                tracing::warn!(pathname = %pathname, "No route matches");
            }
            println!("{}", serde_json::to_string_pretty(&matches)?);
        }
        Commands::Branches => {
            let tree = RouteTree::from_config(&config.routes, &RouteHandlers::default())?;
            for branch in tree.branches() {
                let ids: Vec<&str> = branch.segments.iter().map(|s| s.route_id.as_str()).collect();
                println!("{:>4}  {:<32} {}", branch.score, branch.path, ids.join(" > "));
            }
        }
        Commands::Generate { pattern, params } => {
            let params = parse_params(&params)?;
            println!("{}", generate_path(&pattern, &params)?);
        }
        Commands::Navigate { steps } => {
            let options = RouterOptions::from_config(&config, &RouteHandlers::default())?;
            let router = Router::new(options);
            router.initialize().await?;
            for step in steps {
                match step.parse::<isize>() {
                    Ok(delta) => router.go(delta).await?,
                    Err(_) => router.navigate(&step, NavigateOptions::default()).await?,
                };
                let state = router.snapshot();
                let summary = json!({
                    "action": state.history_action,
                    "location": state.location.href(),
                    "matches": state.matches.iter().map(|m| &m.route_id).collect::<Vec<_>>(),
                    "params": state.params(),
                    "errors": state.errors.as_ref().map(|errors| {
                        errors
                            .iter()
                            .map(|(id, error)| (id.clone(), error.to_string()))
                            .collect::<BTreeMap<_, _>>()
                    }),
                });
                println!("{summary}");
            }
            router.dispose();
        }
    }

    Ok(())
}

fn parse_params(raw: &[String]) -> Result<BTreeMap<String, String>, String> {
    raw.iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .ok_or_else(|| format!("expected key=value, got {pair:?}"))
        })
        .collect()
}
