//! Typed settings for every subcommand. Later layers win: bundled defaults,
//! `mensa.*`, `--config-file`, `MENSA__*` variables, legacy variables, flags.

use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use chrono_tz::Tz;
use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::application::source::SourceKind;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "mensa";
const ENV_PREFIX: &str = "MENSA";
const LEGACY_CACHE_DIRECTORY_VAR: &str = "MENSA_CACHE_DIRECTORY";
const LEGACY_CORS_ALLOW_ORIGIN_VAR: &str = "MENSA_CORS_ALLOWORIGIN";
const DEFAULT_HOST: &str = "::";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_BASE: &str = "/";
const DEFAULT_CACHE_DIR: &str = "cache";
const DEFAULT_FETCH_INTERVAL_SECS: u64 = 6 * 60 * 60;
const DEFAULT_FETCH_TIMEZONE: &str = "Europe/Berlin";
const DEFAULT_FETCH_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SIMPLESITE_FUTURE_DAYS: u32 = 14;

/// Command-line arguments for the mensa binary.
#[derive(Debug, Parser)]
#[command(name = "mensa", version, about = "Canteen meal plan API server")]
pub struct CliArgs {
    /// Extra configuration file layered above the defaults.
    #[arg(long = "config-file", env = "MENSA_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Serve the HTTP API and keep the plan cache refreshed.
    Serve(Box<ServeArgs>),
    /// Fill in missing canteen and line ids in cached plans, then exit.
    Fixup(FixupArgs),
    /// Fetch plans from the configured source once, then exit.
    Fetch(FetchArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct CacheOverride {
    /// Override the plan cache directory.
    #[arg(long = "cache-directory", value_name = "PATH")]
    pub cache_directory: Option<PathBuf>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub cache: CacheOverride,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the base path all routes are mounted under.
    #[arg(long = "server-base", value_name = "PATH")]
    pub server_base: Option<String>,

    /// Log level filter applied when `RUST_LOG` is unset.
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Emit logs as JSON lines instead of compact text.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct FixupArgs {
    #[command(flatten)]
    pub cache: CacheOverride,

    /// Report what would change without writing anything.
    #[arg(long = "dry-run", action = clap::ArgAction::SetTrue)]
    pub dry_run: bool,
}

#[derive(Debug, Args, Default, Clone)]
pub struct FetchArgs {
    #[command(flatten)]
    pub cache: CacheOverride,
}

/// Settings with every layer merged and every value checked.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
    pub catalog: CatalogSettings,
    pub fetch: FetchSettings,
    pub fixup: FixupSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    /// Path prefix for every route; `/` or a path without trailing slash.
    pub base: String,
    pub cors_allow_origin: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub directory: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct CatalogSettings {
    pub canteens_file: Option<PathBuf>,
    pub legend_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub enabled: bool,
    pub source: SourceKind,
    pub interval: Duration,
    pub timezone: Tz,
    pub request_timeout: Duration,
    pub simplesite: SimpleSiteSettings,
    pub jsonapi: JsonApiSettings,
}

#[derive(Debug, Clone)]
pub struct SimpleSiteSettings {
    pub base_url: Option<Url>,
    pub future_days: u32,
}

#[derive(Debug, Clone)]
pub struct JsonApiSettings {
    pub base_url: Option<Url>,
    pub user: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct FixupSettings {
    pub on_startup: bool,
    pub dry_run: bool,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Merge all configuration layers for the given command line.
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_legacy_env(|key| std::env::var(key).ok());

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Fixup(args)) => raw.apply_fixup_overrides(args),
        Some(Command::Fetch(args)) => raw.apply_cache_override(&args.cache),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
    catalog: RawCatalogSettings,
    fetch: RawFetchSettings,
    fixup: RawFixupSettings,
}

impl RawSettings {
    /// Honour the environment variables older deployments were configured with.
    fn apply_legacy_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.is_empty());
        if let Some(directory) = non_empty(LEGACY_CACHE_DIRECTORY_VAR) {
            self.cache.directory = Some(PathBuf::from(directory));
        }
        if let Some(origin) = non_empty(LEGACY_CORS_ALLOW_ORIGIN_VAR) {
            self.server.cors_allow_origin = Some(origin);
        }
    }

    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(base) = overrides.server_base.as_ref() {
            self.server.base = Some(base.clone());
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }

        self.apply_cache_override(&overrides.cache);
    }

    fn apply_fixup_overrides(&mut self, args: &FixupArgs) {
        if args.dry_run {
            self.fixup.dry_run = Some(true);
        }
        self.apply_cache_override(&args.cache);
    }

    fn apply_cache_override(&mut self, overrides: &CacheOverride) {
        if let Some(directory) = overrides.cache_directory.as_ref() {
            self.cache.directory = Some(directory.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            cache,
            catalog,
            fetch,
            fixup,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let cache = build_cache_settings(cache)?;
        let catalog = build_catalog_settings(catalog);
        let fetch = build_fetch_settings(fetch)?;
        let fixup = build_fixup_settings(fixup);

        Ok(Self {
            server,
            logging,
            cache,
            catalog,
            fetch,
            fixup,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }
    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.host", reason))?;

    let base = normalize_base(server.base.as_deref().unwrap_or(DEFAULT_BASE))
        .map_err(|reason| LoadError::invalid("server.base", reason))?;

    let cors_allow_origin = server.cors_allow_origin.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    Ok(ServerSettings {
        addr,
        base,
        cors_allow_origin,
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let directory = cache
        .directory
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR));
    if directory.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "cache.directory",
            "path must not be empty",
        ));
    }
    Ok(CacheSettings { directory })
}

fn build_catalog_settings(catalog: RawCatalogSettings) -> CatalogSettings {
    let non_empty = |path: Option<PathBuf>| path.filter(|path| !path.as_os_str().is_empty());
    CatalogSettings {
        canteens_file: non_empty(catalog.canteens_file),
        legend_file: non_empty(catalog.legend_file),
    }
}

fn build_fetch_settings(fetch: RawFetchSettings) -> Result<FetchSettings, LoadError> {
    let source = match fetch.source.as_deref() {
        Some(value) => SourceKind::from_str(value.trim())
            .map_err(|reason| LoadError::invalid("fetch.source", reason))?,
        None => SourceKind::default(),
    };

    let interval_seconds = fetch
        .interval_seconds
        .unwrap_or(DEFAULT_FETCH_INTERVAL_SECS);
    if interval_seconds == 0 {
        return Err(LoadError::invalid(
            "fetch.interval_seconds",
            "must be greater than zero",
        ));
    }

    let timeout_seconds = fetch
        .request_timeout_seconds
        .unwrap_or(DEFAULT_FETCH_REQUEST_TIMEOUT_SECS);
    if timeout_seconds == 0 {
        return Err(LoadError::invalid(
            "fetch.request_timeout_seconds",
            "must be greater than zero",
        ));
    }

    let timezone_name = fetch
        .timezone
        .unwrap_or_else(|| DEFAULT_FETCH_TIMEZONE.to_string());
    let timezone = Tz::from_str(timezone_name.trim()).map_err(|err| {
        LoadError::invalid("fetch.timezone", format!("unknown timezone: {err}"))
    })?;

    let simplesite = SimpleSiteSettings {
        base_url: parse_optional_url(fetch.simplesite.base_url, "fetch.simplesite.base_url")?,
        future_days: fetch
            .simplesite
            .future_days
            .unwrap_or(DEFAULT_SIMPLESITE_FUTURE_DAYS),
    };

    let jsonapi = JsonApiSettings {
        base_url: parse_optional_url(fetch.jsonapi.base_url, "fetch.jsonapi.base_url")?,
        user: fetch.jsonapi.user.filter(|value| !value.is_empty()),
        password: fetch.jsonapi.password.filter(|value| !value.is_empty()),
    };
    if source == SourceKind::JsonApi && jsonapi.base_url.is_some() {
        if jsonapi.user.is_none() {
            return Err(LoadError::invalid(
                "fetch.jsonapi.user",
                "required for the jsonapi source",
            ));
        }
        if jsonapi.password.is_none() {
            return Err(LoadError::invalid(
                "fetch.jsonapi.password",
                "required for the jsonapi source",
            ));
        }
    }

    Ok(FetchSettings {
        enabled: fetch.enabled.unwrap_or(true),
        source,
        interval: Duration::from_secs(interval_seconds),
        timezone,
        request_timeout: Duration::from_secs(timeout_seconds),
        simplesite,
        jsonapi,
    })
}

fn build_fixup_settings(fixup: RawFixupSettings) -> FixupSettings {
    FixupSettings {
        on_startup: fixup.on_startup.unwrap_or(true),
        dry_run: fixup.dry_run.unwrap_or(false),
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    base: Option<String>,
    cors_allow_origin: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCatalogSettings {
    canteens_file: Option<PathBuf>,
    legend_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawFetchSettings {
    enabled: Option<bool>,
    source: Option<String>,
    interval_seconds: Option<u64>,
    timezone: Option<String>,
    request_timeout_seconds: Option<u64>,
    simplesite: RawSimpleSiteSettings,
    jsonapi: RawJsonApiSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSimpleSiteSettings {
    base_url: Option<String>,
    future_days: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawJsonApiSettings {
    base_url: Option<String>,
    user: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawFixupSettings {
    on_startup: Option<bool>,
    dry_run: Option<bool>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let ip = IpAddr::from_str(host.trim())
        .map_err(|err| format!("invalid listener address `{host}`: {err}"))?;
    Ok(SocketAddr::new(ip, port))
}

fn normalize_base(base: &str) -> Result<String, String> {
    let trimmed = base.trim();
    if !trimmed.starts_with('/') {
        return Err(format!("`{trimmed}` must start with `/`"));
    }
    let without_trailing = trimmed.trim_end_matches('/');
    if without_trailing.is_empty() {
        Ok(DEFAULT_BASE.to_string())
    } else {
        Ok(without_trailing.to_string())
    }
}

fn parse_optional_url(value: Option<String>, key: &'static str) -> Result<Option<Url>, LoadError> {
    let Some(value) = value else {
        return Ok(None);
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let url = Url::parse(trimmed)
        .map_err(|err| LoadError::invalid(key, format!("invalid url `{trimmed}`: {err}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(LoadError::invalid(key, "url must use http or https"));
    }
    Ok(Some(url))
}

/// Parse the process arguments and load settings for them.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
