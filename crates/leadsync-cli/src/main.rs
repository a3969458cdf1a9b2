//! leadsync - bulk export and cleanup of Lemlist leads
//!
//! Exports every campaign's leads, reconciles exports against contact lists,
//! and runs rate-limited bulk lookups and variable erasure.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use leadsync_core::RateWindow;

mod cmd;
mod config;

use cmd::{Session, Settings};
use config::Config;

#[derive(Parser)]
#[command(name = "leadsync")]
#[command(about = "Bulk export and cleanup of Lemlist leads")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Config file path (default: ./leadsync.toml or ~/.config/leadsync/config.toml)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Number of concurrent workers
    #[arg(short, long, global = true)]
    workers: Option<usize>,

    /// Maximum attempts per request (429s and transient failures)
    #[arg(long, global = true)]
    max_retries: Option<u32>,

    /// Requests allowed per rate window
    #[arg(long, global = true)]
    rate_requests: Option<usize>,

    /// Rate window length in seconds
    #[arg(long, global = true)]
    rate_window: Option<f64>,

    /// Request timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Data directory for exports, ID lists, and failure logs
    #[arg(long, global = true)]
    output_dir: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Export the leads of every campaign to all_leads_<timestamp>.json
    Export(cmd::export::ExportArgs),
    /// Write the unique lead IDs of an export to unique_lead_ids.csv
    ExtractIds(cmd::extract::ExtractArgs),
    /// Write IDs of exported leads found in a contacts CSV to matched_lead_ids.csv
    Match(cmd::extract::MatchArgs),
    /// Look up lead IDs by email through the API
    Lookup(cmd::lookup::LookupArgs),
    /// Clear a variable (default: phone) on every listed lead
    Erase(cmd::erase::EraseArgs),
    /// Show current configuration
    Config,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = Arc::new(leadsync_core::ProgressContext::new());

    // Logging:
    //   TTY:     warn unless --debug; progress bars show activity
    //   non-TTY: info unless --debug; logs are the only progress indicator
    let multi = if progress.is_tty() {
        Some(progress.multi())
    } else {
        None
    };
    leadsync_core::init_logging(cli.debug, multi);

    let config = if let Some(path) = &cli.config {
        Config::from_file(path)?
    } else {
        Config::load()?
    };

    // Config file defaults, CLI overrides
    let window = cmd::rate_window_duration(cli.rate_window.unwrap_or(config.rate.window_secs))?;
    let settings = Settings {
        base_url: config.api.base_url.clone(),
        api_key: config.api.api_key.clone(),
        timeout: Duration::from_secs(cli.timeout.unwrap_or(config.api.timeout_secs)),
        rate: RateWindow::new(
            cli.rate_requests.unwrap_or(config.rate.requests),
            window,
        ),
        max_retries: cli.max_retries.unwrap_or(config.rate.max_retries).max(1),
        workers: cli.workers.unwrap_or(config.workers.default).max(1),
        output_dir: cli
            .output_dir
            .clone()
            .unwrap_or_else(|| config.output.dir.clone()),
    };

    let session = Session::new(settings, progress);
    match cli.command {
        Command::Export(args) => cmd::export::run(args, &session),
        Command::ExtractIds(args) => cmd::extract::run_extract(args, &session),
        Command::Match(args) => cmd::extract::run_match(args, &session),
        Command::Lookup(args) => cmd::lookup::run(args, &session),
        Command::Erase(args) => cmd::erase::run(args, &session),
        Command::Config => {
            print_config(&session.settings);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_config(settings: &Settings) {
    use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Setting").fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
        ]);

    table.add_row(vec!["API base URL", &settings.base_url]);
    table.add_row(vec![
        "API key",
        if settings.api_key.is_some() {
            "configured"
        } else if std::env::var_os(cmd::API_KEY_ENV).is_some() {
            "from LEMLIST_API_KEY"
        } else {
            "not set (will prompt)"
        },
    ]);
    table.add_row(vec![
        "Request timeout",
        &format!("{}s", settings.timeout.as_secs()),
    ]);
    table.add_row(vec![
        "Rate limit",
        &format!(
            "{} requests / {:.1}s",
            settings.rate.capacity,
            settings.rate.window.as_secs_f64()
        ),
    ]);
    table.add_row(vec!["Max attempts", &settings.max_retries.to_string()]);
    table.add_row(vec!["Workers", &settings.workers.to_string()]);
    table.add_row(vec![
        "Output directory",
        &settings.output_dir.display().to_string(),
    ]);

    eprintln!("\n{table}");
}
