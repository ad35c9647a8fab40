//! Veneer CLI
//!
//! CLI tool for trying URL filter files against the request pipeline and
//! managing persisted settings.

mod settings;
mod transport;

use std::fs;
use std::rc::Rc;
use std::time::Instant;

use clap::{Parser, Subcommand};
use log::LevelFilter;

use vn_core::config::JsonFileStore;
use vn_core::logger::PrefixLogger;
use vn_core::{HookRegistry, Object};
use vn_net::{NetworkHost, NetworkInterceptor, Request, UrlFilter};

use crate::transport::ReqwestTransport;

#[derive(Parser)]
#[command(name = "vn-cli")]
#[command(about = "Veneer interception pipeline tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run URLs through the request pass without touching the network
    Check {
        /// URL filter file (JSON)
        #[arg(short, long)]
        filters: String,

        /// URLs to check
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Fetch a URL through the full pipeline
    Fetch {
        /// URL filter file (JSON)
        #[arg(short, long)]
        filters: Option<String>,

        /// Settings file providing log levels
        #[arg(short, long)]
        config: Option<String>,

        /// URL to fetch
        url: String,
    },

    /// Edit a settings file
    Config {
        /// Settings file (JSON object, created if missing)
        #[arg(short, long)]
        file: String,

        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Set the log level for a target prefix
    LogLevel { prefix: String, level: String },

    /// Enable or disable one feature of a group
    Feature { group: String, bit: u32, state: String },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Check { filters, urls } => cmd_check(&filters, &urls),
        Commands::Fetch { filters, config, url } => cmd_fetch(filters.as_deref(), config.as_deref(), &url),
        Commands::Config { file, action } => cmd_config(&file, action),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn load_filters(path: &str) -> Result<UrlFilter, String> {
    let json = fs::read_to_string(path).map_err(|e| format!("Failed to read '{}': {}", path, e))?;
    UrlFilter::from_json(&json).map_err(|e| format!("'{}': {}", path, e))
}

fn runtime() -> Result<tokio::runtime::Runtime, String> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("Failed to start runtime: {}", e))
}

fn pipeline(filters: Option<UrlFilter>) -> Result<NetworkInterceptor, String> {
    let global = Object::new();
    let host = NetworkHost::install(&global, Rc::new(ReqwestTransport::new()?), None);
    let net = NetworkInterceptor::new(host, HookRegistry::new());
    if let Some(filters) = filters {
        net.add_callback(filters).map_err(|e| e.to_string())?;
    }
    Ok(net)
}

fn cmd_check(filters: &str, urls: &[String]) -> Result<(), String> {
    let filter = load_filters(filters)?;
    println!("Loaded {} rules from '{}'", filter.len(), filters);
    let net = pipeline(Some(filter))?;

    runtime()?.block_on(async {
        for url in urls {
            let request = Request::get(url).map_err(|e| e.to_string())?;
            let ctx = net.on_request(request).await.map_err(|e| e.to_string())?;
            println!("  {:<8} {}", ctx.state().name(), ctx.url);
        }
        Ok::<(), String>(())
    })
}

fn cmd_fetch(filters: Option<&str>, config: Option<&str>, url: &str) -> Result<(), String> {
    let logger = match config {
        Some(path) => {
            let store = JsonFileStore::open(path).map_err(|e| e.to_string())?;
            PrefixLogger::from_store(&store, LevelFilter::Warn)
        }
        None => PrefixLogger::new(LevelFilter::Warn),
    };
    logger.install().map_err(|e| e.to_string())?;

    let filter = filters.map(load_filters).transpose()?;
    let net = pipeline(filter)?;

    let start = Instant::now();
    runtime()?.block_on(async {
        let response = net
            .host()
            .fetch(url, None)
            .map_err(|e| e.to_string())?
            .resolve()
            .await
            .map_err(|e| e.to_string())?;
        let status = response.get("status").map_err(|e| e.to_string())?;
        let text = response
            .call_method("text", &[])
            .map_err(|e| e.to_string())?
            .resolve()
            .await
            .map_err(|e| e.to_string())?;

        println!("Fetched '{}'", url);
        println!("  Status:   {}", status.describe());
        println!("  Body:     {} bytes", text.as_str().map_or(0, str::len));
        println!("  Time:     {:.1}ms", start.elapsed().as_secs_f64() * 1000.0);
        Ok::<(), String>(())
    })
}

fn cmd_config(file: &str, action: ConfigAction) -> Result<(), String> {
    let store = JsonFileStore::open(file).map_err(|e| e.to_string())?;
    match action {
        ConfigAction::LogLevel { prefix, level } => {
            settings::set_log_level(&store, &prefix, &level)?;
            println!("Set log level of '{}' to {} in '{}'", prefix, level, file);
        }
        ConfigAction::Feature { group, bit, state } => {
            let enabled = settings::parse_switch(&state)?;
            let mask = settings::set_feature(&store, &group, bit, enabled)?;
            println!("Feature group '{}' disable mask is now {:#034b}", group, mask);
        }
    }
    Ok(())
}
