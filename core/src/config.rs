use std::fmt;
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Named preset of sqlmap aggressiveness and performance settings.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanProfile {
    Quick,
    #[default]
    Full,
    Advanced,
}

impl ScanProfile {
    pub const ALL: [ScanProfile; 3] = [ScanProfile::Quick, ScanProfile::Full, ScanProfile::Advanced];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScanProfile::Quick => "quick",
            ScanProfile::Full => "full",
            ScanProfile::Advanced => "advanced",
        }
    }
}

impl fmt::Display for ScanProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanProfile {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ScanProfile::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or(())
    }
}

/// Fixed sqlmap arguments for each profile, in the order they are emitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilePresets {
    pub quick: Map<String, Value>,
    pub full: Map<String, Value>,
    pub advanced: Map<String, Value>,
}

impl ProfilePresets {
    pub fn get(&self, profile: ScanProfile) -> &Map<String, Value> {
        match profile {
            ScanProfile::Quick => &self.quick,
            ScanProfile::Full => &self.full,
            ScanProfile::Advanced => &self.advanced,
        }
    }
}

fn preset(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

impl Default for ProfilePresets {
    fn default() -> Self {
        Self {
            quick: preset(json!({ "level": 1, "risk": 1, "threads": 10 })),
            full: preset(json!({ "level": 5, "risk": 3, "forms": true, "crawl": 3, "threads": 4 })),
            advanced: preset(json!({
                "level": 5,
                "risk": 3,
                "forms": true,
                "crawl": 5,
                "threads": 8,
                "tamper": "space2comment,between,randomcase"
            })),
        }
    }
}

/// Placeholder key shipped in the defaults. Never accepted for real auth.
pub const DEFAULT_API_KEY: &str = "change-me-in-production";

const REDACTED: &str = "********";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Empty means any domain may be targeted.
    pub allowed_domains: Vec<String>,
    /// Empty means IP targets fall back to the domain rule.
    pub allowed_ips: Vec<IpAddr>,
    pub require_auth: bool,
    pub api_key: String,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allowed_domains: Vec::new(),
            allowed_ips: Vec::new(),
            require_auth: false,
            api_key: DEFAULT_API_KEY.to_string(),
        }
    }
}

impl SecurityConfig {
    /// Fails when authentication is on but the key is empty or still the
    /// shipped placeholder.
    pub fn check(&self) -> anyhow::Result<()> {
        let key = self.api_key.trim();
        if self.require_auth && (key.is_empty() || key == DEFAULT_API_KEY) {
            anyhow::bail!(
                "REQUIRE_AUTH is enabled but no API key is set; set SQLMAP_API_KEY or security.api_key"
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub scan_directory: PathBuf,
    pub sqlmap_path: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            scan_directory: PathBuf::from("./scans"),
            sqlmap_path: "sqlmap".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// One of `error`, `warn`, `info`, `verbose`, `debug`.
    pub level: String,
    pub save_to_file: bool,
    pub log_directory: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            save_to_file: false,
            log_directory: PathBuf::from("./logs"),
        }
    }
}

impl LoggingConfig {
    /// Maps the configured level onto the `log` crate's filter.
    /// `verbose` sits between info and debug, so it maps to debug and
    /// `debug` maps to trace.
    pub fn level_filter(&self) -> log::LevelFilter {
        match self.level.to_ascii_lowercase().as_str() {
            "error" => log::LevelFilter::Error,
            "warn" => log::LevelFilter::Warn,
            "verbose" => log::LevelFilter::Debug,
            "debug" => log::LevelFilter::Trace,
            _ => log::LevelFilter::Info,
        }
    }
}

/// Process-wide service configuration, read-only once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub port: u16,
    pub scan_timeout_secs: u64,
    /// 0 disables the ceiling.
    pub max_concurrent_scans: usize,
    pub profiles: ProfilePresets,
    pub security: SecurityConfig,
    pub paths: PathsConfig,
    pub logging: LoggingConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: 18080,
            scan_timeout_secs: 3600,
            max_concurrent_scans: 5,
            profiles: ProfilePresets::default(),
            security: SecurityConfig::default(),
            paths: PathsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Builds the effective configuration: defaults, then the JSON file at
    /// `path` if given, then process environment overrides.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_json::from_str(&data)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// Applies overrides from an environment lookup such as `std::env::var`.
    pub fn apply_env<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("PORT") {
            self.port = parse_env("PORT", &v)?;
        }
        if let Some(v) = lookup("SCAN_TIMEOUT") {
            self.scan_timeout_secs = parse_env("SCAN_TIMEOUT", &v)?;
        }
        if let Some(v) = lookup("MAX_CONCURRENT_SCANS") {
            self.max_concurrent_scans = parse_env("MAX_CONCURRENT_SCANS", &v)?;
        }
        if let Some(v) = lookup("ALLOWED_DOMAINS") {
            self.security.allowed_domains = split_list(&v);
        }
        if let Some(v) = lookup("ALLOWED_IPS") {
            self.security.allowed_ips = split_list(&v)
                .iter()
                .map(|ip| parse_env("ALLOWED_IPS", ip))
                .collect::<anyhow::Result<_>>()?;
        }
        if let Some(v) = lookup("REQUIRE_AUTH") {
            self.security.require_auth = parse_bool("REQUIRE_AUTH", &v)?;
        }
        if let Some(v) = lookup("SQLMAP_API_KEY") {
            self.security.api_key = v;
        }
        if let Some(v) = lookup("SCAN_DIRECTORY") {
            self.paths.scan_directory = PathBuf::from(v);
        }
        if let Some(v) = lookup("SQLMAP_PATH") {
            self.paths.sqlmap_path = v;
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = lookup("SAVE_LOGS") {
            self.logging.save_to_file = parse_bool("SAVE_LOGS", &v)?;
        }
        if let Some(v) = lookup("LOG_DIRECTORY") {
            self.logging.log_directory = PathBuf::from(v);
        }
        Ok(())
    }

    /// Copy safe to print: the API key is masked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.security.api_key.is_empty() {
            copy.security.api_key = REDACTED.to_string();
        }
        copy
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }
}

fn parse_env<T>(name: &str, raw: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| anyhow!("invalid value for {}: '{}' ({})", name, raw, e))
}

fn parse_bool(name: &str, raw: &str) -> anyhow::Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(anyhow!("invalid value for {}: '{}' (expected true/false)", name, raw)),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
