use anyhow::Context;
use clap::Parser;
use colored::*;
use log::{info, warn};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::process;

use sqlmapd_core::{resolve_scanner_path, serve, ServiceConfig};

#[derive(Parser, Debug)]
#[command(
    name = "sqlmapd",
    author = "RealOzk",
    version,
    about = "HTTP service that runs sqlmap scans as background jobs",
    after_help = "\x1b[1;36mEXAMPLES:\x1b[0m
  Defaults (port 18080):          sqlmapd
  Custom port:                    sqlmapd --port 9000
  From a config file:             sqlmapd --config sqlmapd.json
  Show effective config:          sqlmapd --config sqlmapd.json --print-config
  Explicit scanner:               sqlmapd --sqlmap-path /opt/sqlmap/sqlmap.py

\x1b[1;36mENVIRONMENT:\x1b[0m
  PORT, SCAN_TIMEOUT, MAX_CONCURRENT_SCANS, ALLOWED_DOMAINS, ALLOWED_IPS,
  REQUIRE_AUTH, SQLMAP_API_KEY, SCAN_DIRECTORY, SQLMAP_PATH, LOG_LEVEL,
  SAVE_LOGS, LOG_DIRECTORY"
)]
pub struct Args {
    #[arg(short = 'c', long, help = "JSON configuration file")]
    pub config: Option<PathBuf>,

    #[arg(short = 'p', long, help = "Port to listen on (overrides config and PORT)")]
    pub port: Option<u16>,

    #[arg(long, help = "Directory holding one sub-directory per scan")]
    pub scan_dir: Option<PathBuf>,

    #[arg(long, help = "sqlmap executable (name on PATH or full path)")]
    pub sqlmap_path: Option<String>,

    #[arg(long, help = "Print the effective configuration as JSON and exit")]
    pub print_config: bool,
}

impl Args {
    fn apply(&self, config: &mut ServiceConfig) {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(ref dir) = self.scan_dir {
            config.paths.scan_directory = dir.clone();
        }
        if let Some(ref path) = self.sqlmap_path {
            config.paths.sqlmap_path = path.clone();
        }
    }
}

#[tokio::main]
async fn main() {
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    let args = Args::parse();

    if let Err(e) = run(args).await {
        eprint!("{}\r\n", format!("[!] {:#}", e).red());
        process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = ServiceConfig::load(args.config.as_deref())?;
    args.apply(&mut config);

    if args.print_config {
        println!("{}", serde_json::to_string_pretty(&config.redacted())?);
        return Ok(());
    }

    config.security.check()?;

    print_banner();
    init_logging(&config)?;
    print_startup(&config);

    match resolve_scanner_path(&config.paths.sqlmap_path) {
        Some(path) => info!("Using sqlmap at {}", path.display()),
        None => warn!(
            "sqlmap not found at '{}'. Scans will fail until it is installed or SQLMAP_PATH is set.",
            config.paths.sqlmap_path
        ),
    }

    fs::create_dir_all(&config.paths.scan_directory).with_context(|| {
        format!("failed to create scan directory {}", config.paths.scan_directory.display())
    })?;

    serve(config).await
}

/// Sends log output to stderr, or to `<log_directory>/sqlmapd.log` when
/// file logging is enabled.
fn init_logging(config: &ServiceConfig) -> anyhow::Result<()> {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(config.logging.level_filter());

    if config.logging.save_to_file {
        let dir = &config.logging.log_directory;
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create log directory {}", dir.display()))?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("sqlmapd.log"))
            .with_context(|| format!("failed to open log file in {}", dir.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.init();
    Ok(())
}

fn print_banner() {
    let banner = r#"
                  __                      __
       _________ _/ /___ ___  ____ _____  ____/ /
      / ___/ __ `/ / __ `__ \/ __ `/ __ \/ __  /
     (__  ) /_/ / / / / / / / /_/ / /_/ / /_/ /
    /____/\__, /_/_/ /_/ /_/\__,_/ .___/\__,_/
            /_/                 /_/
    "#;
    print!("{}\r\n", banner.bright_cyan().bold());
    print!("{}\r\n", "──────────────────────────────────────────────────".dimmed());
    std::io::stdout().flush().ok();
}

fn print_startup(config: &ServiceConfig) {
    let limit = match config.max_concurrent_scans {
        0 => "unlimited".to_string(),
        n => n.to_string(),
    };
    let auth_label = if config.security.require_auth { "ON" } else { "OFF" };

    print!("{}\r\n", format!("[+] Port:        {}", config.port).green().bold());
    print!("{}\r\n", format!("[+] Scanner:     {}", config.paths.sqlmap_path).blue());
    print!("{}\r\n", format!("[+] Scan dir:    {}", config.paths.scan_directory.display()).blue());
    print!("{}\r\n", format!("[+] Timeout:     {}s", config.scan_timeout_secs).blue());
    print!("{}\r\n", format!("[+] Max running: {}", limit).blue());
    print!("{}\r\n", format!("[+] API key:     {}", auth_label).magenta());
    if !config.security.allowed_domains.is_empty() {
        print!(
            "{}\r\n",
            format!("[+] Domains:     {}", config.security.allowed_domains.join(", ")).yellow()
        );
    }
    if !config.security.allowed_ips.is_empty() {
        let ips: Vec<String> = config.security.allowed_ips.iter().map(|ip| ip.to_string()).collect();
        print!("{}\r\n", format!("[+] IPs:         {}", ips.join(", ")).yellow());
    }
    if config.logging.save_to_file {
        print!(
            "{}\r\n",
            format!("[+] Log file:    {}", config.logging.log_directory.join("sqlmapd.log").display()).yellow()
        );
    }
    print!("{}\r\n", "──────────────────────────────────────────────────".dimmed());
    std::io::stdout().flush().ok();
}
