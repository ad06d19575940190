//! # docsage CLI (`sage`)
//!
//! ## Usage
//!
//! ```bash
//! sage --config ./docsage.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sage ask "<question>"` | Answer one question and print the JSON response |
//! | `sage serve` | Start the HTTP server |
//! | `sage config` | Print the resolved configuration |
//! | `sage completions <shell>` | Print shell completions |
//!
//! Environment variables (`VECTOR_STORE_ENDPOINT`, `RETRIEVAL_K`, ...)
//! override the config file; see [`docsage::config`]. Log verbosity is
//! controlled with `RUST_LOG` (default `info`); `--log-format json` (or
//! `LOG_FORMAT=json`) switches stderr logs to one JSON object per line,
//! including the enclosing `request` span and its `request_id`.

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

use docsage::config::{self, Config};
use docsage::handler::{QueryOverrides, QueryService};
use docsage::server;

/// docsage: grounded answers about your project's documentation, with sources.
#[derive(Parser)]
#[command(name = "sage", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Optional; defaults plus environment variables are used without it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log output format.
    #[arg(
        long,
        global = true,
        value_enum,
        env = "LOG_FORMAT",
        default_value_t = LogFormat::Text
    )]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a question and print the response body.
    ///
    /// Exits with status 1 when the request fails; the error body is still
    /// printed.
    Ask {
        /// The question.
        query: String,

        /// Maximum number of sources to cite.
        #[arg(long)]
        max_results: Option<usize>,
    },

    /// Start the HTTP server.
    Serve {
        /// Override `[server].bind`.
        #[arg(long)]
        bind: Option<String>,
    },

    /// Print the resolved configuration as TOML (secrets omitted).
    Config,

    /// Print shell completions.
    Completions {
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    match cli.log_format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
    }

    if let Commands::Completions { shell } = &cli.command {
        clap_complete::generate(*shell, &mut Cli::command(), "sage", &mut std::io::stdout());
        return Ok(());
    }

    let mut cfg: Config = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Ask { query, max_results } => {
            let service = QueryService::from_config(&cfg);
            let body = serde_json::json!({ "query": query }).to_string();
            let response = service
                .handle_query(&body, QueryOverrides { max_results })
                .await;
            let pretty = response
                .json()
                .and_then(|v| serde_json::to_string_pretty(&v))
                .unwrap_or_else(|_| response.body.clone());
            println!("{}", pretty);
            // Flush buffered metrics before exiting.
            drop(service);
            if response.status_code != 200 {
                std::process::exit(1);
            }
        }
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                cfg.server.bind = bind;
            }
            server::run_server(&cfg).await?;
        }
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&cfg)?);
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}
