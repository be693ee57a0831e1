use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use coverage_map::config::AppConfig;
use coverage_map::context::AppContext;
use coverage_map::export::{self, ExportKind};
use coverage_map::{render, search, server, stats};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the map viewer and its API
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Search place names from the terminal
    Search {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        query: String,
    },
    /// Print legend counts per category
    Stats {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Write one export (e.g. names-short) or "all" six of them
    Export {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        kind: String,
        /// Overrides output.export_dir
        #[arg(short, long, value_name = "DIR")]
        out: Option<PathBuf>,
    },
    /// Render per-category marker tiles
    Render {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
}

fn load_context(config: &Path) -> Result<AppContext> {
    tracing::info!("Using config {:?}", config);
    let app_config = AppConfig::load_from_file(config)?;
    AppContext::load(app_config)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "coverage_map=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Serve { config } => {
            let ctx = load_context(config)?;
            server::start_server(ctx).await?;
        }
        Commands::Search { config, query } => {
            let ctx = load_context(config)?;
            for hit in search::search(&ctx, query) {
                println!(
                    "{:>3}  {:<5}  {}, {}",
                    u8::from(hit.score),
                    hit.category,
                    hit.name,
                    hit.province
                );
            }
        }
        Commands::Stats { config } => {
            let ctx = load_context(config)?;
            let legend = stats::Legend::new(&ctx.counts, &ctx.config.categories);
            for entry in &legend.entries {
                println!(
                    "{:<12} {:>8} {:>8}",
                    entry.label, entry.count, entry.cumulative
                );
            }
            println!("{:<12} {:>8}", "Total", legend.total);
        }
        Commands::Export { config, kind, out } => {
            let ctx = load_context(config)?;
            let kinds: Vec<ExportKind> = if kind == "all" {
                ExportKind::ALL.to_vec()
            } else {
                vec![kind.parse()?]
            };
            let dir = out.clone().unwrap_or_else(|| ctx.config.output.export_dir.clone());
            for kind in kinds {
                let path = export::write(kind, &ctx.places, &dir)?;
                println!("{}", path.display());
            }
        }
        Commands::Render { config } => {
            let ctx = load_context(config)?;
            render::generate_tiles(&ctx)?;
            println!("Generation complete!");
        }
    }

    Ok(())
}
