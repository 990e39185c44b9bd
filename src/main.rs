use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;

use shelv::config;
use shelv::controller::NO_FILES_MSG;
use shelv::nav;
use shelv::service::{FileService, HttpService};
use shelv::{card, viewer};

#[derive(Parser)]
#[command(name = "shelv", about = "Terminal gallery for paginated file libraries")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Library URL, e.g. https://files.example.com/?page=2
    /// (falls back to base_url in the config file)
    #[arg(global = true)]
    url: Option<String>,

    /// Start page (overrides the URL's page parameter)
    #[arg(long, global = true)]
    page: Option<u32>,

    /// Placeholder image substituted when a thumbnail fails to load
    #[arg(long, global = true)]
    placeholder_url: Option<String>,

    /// Log output file path (enables logging when specified)
    #[arg(long, global = true)]
    log: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch one page of records and print them (no terminal UI)
    Fetch {
        /// Print the raw page as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Some(log_path) = &cli.log {
        let file = std::fs::File::create(log_path).expect("failed to open log file");
        env_logger::Builder::from_default_env()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();
    } else if cli.command.is_some() {
        env_logger::init();
    }
    // viewer mode + no --log → logger not initialized (no log output)

    info!(
        "shelv {} ({} {})",
        env!("CARGO_PKG_VERSION"),
        env!("SHELV_BUILD_GIT_HASH"),
        env!("SHELV_BUILD_PROFILE"),
    );

    // Load config file and merge CLI overrides
    let mut cfg = match config::load_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    };
    cfg.merge_cli(cli.url, cli.placeholder_url);
    let config = cfg.resolve();

    let Some(base_url) = config.base_url.clone() else {
        eprintln!("Error: no library URL given (pass one, or set base_url in the config file)");
        std::process::exit(1);
    };
    let start_url = match cli.page {
        Some(p) => nav::with_page(&base_url, p.max(1)),
        None => base_url,
    };

    let result = match cli.command {
        Some(Command::Fetch { json }) => cmd_fetch(&start_url, &config, json),
        None => viewer::run(&config, &start_url),
    };

    if let Err(e) = result {
        let msg = format!("{e:#}");
        if msg.contains("[BUG]") {
            eprintln!("\x1b[1;31m{msg}\x1b[0m");
        } else {
            eprintln!("Error: {msg}");
        }
        std::process::exit(1);
    }
}

fn cmd_fetch(url: &str, config: &config::Config, json: bool) -> Result<()> {
    let start = Instant::now();
    let service = HttpService::new(&nav::service_base(url), config.request_timeout);
    let page = nav::page_from_url(url);
    let file_page = service.fetch_page(page)?;
    info!(
        "cmd_fetch: page {page} completed in {:.1}ms",
        start.elapsed().as_secs_f64() * 1000.0
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&file_page)?);
        return Ok(());
    }

    if file_page.data.is_empty() {
        println!("{NO_FILES_MSG}");
        return Ok(());
    }

    println!(
        "page {page}/{} — {} record(s)",
        file_page.total_pages,
        file_page.data.len()
    );
    for (i, record) in file_page.data.iter().enumerate() {
        let name = record.file_name.as_deref().unwrap_or(card::UNNAMED_FILE);
        let size = record.file_size.as_deref().unwrap_or(card::UNKNOWN_SIZE);
        println!("{:>3}  {name:<48}  {size:>14}  {}", i + 1, record.share_link);
    }
    Ok(())
}
