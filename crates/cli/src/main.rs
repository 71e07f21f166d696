use anyhow::Result;
use clap::{Parser, Subcommand};
use heuristic_cli::{render, session};
use heuristic_core::config;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Classify {
            records,
            rules,
            json,
        } => {
            let outcome = session::classify_file(&cfg, &records, rules.as_deref())?;
            if json {
                println!("{}", render::outcome_json(&outcome, cfg.output.pretty)?);
            } else {
                print!("{}", render::outcome_text(&outcome, cfg.output.show_empty));
            }
            Ok(())
        }
        Commands::Rules { rules } => {
            let table = session::load_table(&cfg, rules.as_deref())?;
            print!("{}", render::rules_text(&table));
            Ok(())
        }
    }
}

#[derive(Parser)]
#[command(name = "heuristic")]
#[command(about = "Classify imaging series into output keys and split repeated runs", long_about = None)]
struct Cli {
    /// Path to config TOML
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify a session's series records
    Classify {
        /// JSON array of series records in scan order
        records: PathBuf,
        /// Rule table file or directory (overrides config)
        #[arg(long)]
        rules: Option<String>,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// List the rule table in matching order
    Rules {
        /// Rule table file or directory (overrides config)
        #[arg(long)]
        rules: Option<String>,
    },
}
