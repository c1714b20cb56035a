//! insights-metrics MCP Server & CLI
//!
//! Dual-mode application:
//! - MCP Server Mode (default): Model Context Protocol server using stdio
//! - CLI Mode: Command-line utility for direct tool execution
//!
//! Extracts analytics metric definitions from a markdown reference document,
//! persists them as JSON and serves four tools over them:
//! - `metrics.list()` - All metrics with basic information
//! - `metrics.get(name)` - Full definition of one metric
//! - `metrics.search(q, limit)` - Fuzzy search by name, description, tags or level
//! - `metrics.refreshNow()` - Re-extract and reload

mod cli;
mod config;
mod error;
mod extractor;
mod mcp;
mod metrics;
mod search;
mod service;
mod store;
mod tools;

#[cfg(test)]
mod tests_protocol;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use config::{Config, Overrides};
use error::AppError;
use service::MetricsService;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Help and version go to stdout with status 0; usage errors are invalid input
            let _ = e.print();
            std::process::exit(if e.use_stderr() { 1 } else { 0 });
        }
    };

    init_logging(cli.verbose, cli.quiet);

    let overrides = Overrides {
        data_path: cli.data_path.clone(),
        document_path: cli.document_path.clone(),
    };
    let config = match Config::resolve(&overrides) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };
    info!(
        "Using metrics file {} and reference document {}",
        config.data_path.display(),
        config.document_path.display()
    );

    let mut service = MetricsService::from_config(&config);

    // Detect mode: MCP server without a subcommand, CLI otherwise
    match cli.command {
        None => run_mcp_mode(&mut service, false).await,
        Some(Commands::Serve(args)) => run_mcp_mode(&mut service, args.rebuild).await,
        Some(command) => run_cli_mode(&mut service, command),
    }
}

/// Initialize logging based on verbosity flags; `RUST_LOG` takes precedence
fn init_logging(verbose: bool, quiet: bool) {
    let log_level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "info"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr) // Log to stderr to keep stdout clean
        .init();
}

/// Run in MCP server mode
async fn run_mcp_mode(service: &mut MetricsService, rebuild: bool) -> Result<()> {
    info!("Starting insights-metrics MCP Server");

    if let Err(e) = service.startup(rebuild) {
        error!("Startup failed: {}", e);
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }

    // Handle stdio MCP communication
    mcp::handle_stdio(service).await?;

    Ok(())
}

/// Run in CLI mode
fn run_cli_mode(service: &mut MetricsService, command: Commands) -> Result<()> {
    match execute_command(service, command) {
        Ok(output) => {
            println!("{}", output);
            Ok(())
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}

/// Execute one CLI command, returning the text to print
fn execute_command(service: &mut MetricsService, command: Commands) -> Result<String, AppError> {
    // A refresh extracts from scratch; everything else needs a loaded index
    if !matches!(command, Commands::Refresh(_)) {
        service.startup(false)?;
    }

    let result = match command {
        Commands::List(args) => tools::list::execute_list(args, service)?,
        Commands::Get(args) => tools::get::execute_get(args, service)?,
        Commands::Search(args) => tools::search::execute_search(args, service)?,
        Commands::Suggest(args) => {
            mcp::ToolResult::json(&service.suggest(&args.q, args.effective_limit())?)?
        }
        Commands::Refresh(args) => tools::refresh::execute_refresh(args, service)?,
        Commands::Tags => mcp::ToolResult::json(&service.tags())?,
        Commands::Levels => mcp::ToolResult::json(&service.levels())?,
        Commands::DataTypes => mcp::ToolResult::json(&service.data_types())?,
        Commands::Serve(_) => {
            return Err(AppError::Internal("serve is handled in server mode".to_string()))
        }
    };

    Ok(result.first_text())
}
