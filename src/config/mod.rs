//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroU64, NonZeroUsize},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "quaderno";
const ENV_PREFIX: &str = "QUADERNO";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_ACCESS_TOKEN_TTL_SECS: u64 = 15 * 60;
const DEFAULT_REFRESH_TOKEN_TTL_DAYS: u64 = 30;
const DEFAULT_POST_CACHE_TTL_SECS: u64 = 360;
const DEFAULT_POST_CACHE_LIMIT: usize = 1000;
const DEFAULT_UPLOAD_DIR: &str = "saved_files";
const DEFAULT_UPLOAD_REQUEST_LIMIT_BYTES: u64 = 10 * 1024 * 1024;
const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Command-line arguments for the quaderno binary.
#[derive(Debug, Parser)]
#[command(name = "quaderno", version, about = "Quaderno notes and blog API")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "QUADERNO_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP API.
    Serve(Box<ServeArgs>),
    /// Apply pending database migrations and exit.
    Migrate(MigrateArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct MigrateArgs {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Toggle the post cache.
    #[arg(
        long = "cache-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_enabled: Option<bool>,

    /// Override the post cache entry lifetime.
    #[arg(long = "cache-post-ttl-seconds", value_name = "SECONDS")]
    pub cache_post_ttl_seconds: Option<u64>,

    /// Override the uploads directory.
    #[arg(long = "uploads-directory", value_name = "PATH")]
    pub uploads_directory: Option<PathBuf>,

    /// Override the maximum request size for uploads in bytes.
    #[arg(long = "uploads-max-request-bytes", value_name = "BYTES")]
    pub uploads_max_request_bytes: Option<u64>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub auth: AuthSettings,
    pub cache: CacheSettings,
    pub uploads: UploadSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
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
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

/// Password digest scheme used by the credential verifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordScheme {
    Argon2,
    HmacSha256,
}

impl FromStr for PasswordScheme {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "argon2" | "argon2id" => Ok(Self::Argon2),
            "hmac-sha256" | "hmac_sha256" => Ok(Self::HmacSha256),
            other => Err(format!(
                "unknown scheme `{other}` (expected `argon2` or `hmac-sha256`)"
            )),
        }
    }
}

#[derive(Clone)]
pub struct AuthSettings {
    pub jwt_secret: String,
    pub password_secret: String,
    pub password_scheme: PasswordScheme,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
}

impl std::fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSettings")
            .field("jwt_secret", &"<redacted>")
            .field("password_secret", &"<redacted>")
            .field("password_scheme", &self.password_scheme)
            .field("access_token_ttl", &self.access_token_ttl)
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub post_ttl: Duration,
    pub post_limit: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub directory: PathBuf,
    pub max_request_bytes: NonZeroU64,
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

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Migrate(args)) => raw.apply_migrate_overrides(args),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    auth: RawAuthSettings,
    cache: RawCacheSettings,
    uploads: RawUploadSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(enabled) = overrides.cache_enabled {
            self.cache.enabled = Some(enabled);
        }
        if let Some(ttl) = overrides.cache_post_ttl_seconds {
            self.cache.post_ttl_seconds = Some(ttl);
        }
        if let Some(directory) = overrides.uploads_directory.as_ref() {
            self.uploads.directory = Some(directory.clone());
        }
        if let Some(limit) = overrides.uploads_max_request_bytes {
            self.uploads.max_request_bytes = Some(limit);
        }
    }

    fn apply_migrate_overrides(&mut self, args: &MigrateArgs) {
        if let Some(url) = args.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            auth,
            cache,
            uploads,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            auth: build_auth_settings(auth)?,
            cache: build_cache_settings(cache)?,
            uploads: build_upload_settings(uploads)?,
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
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
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

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_auth_settings(auth: RawAuthSettings) -> Result<AuthSettings, LoadError> {
    let jwt_secret = required_secret(auth.jwt_secret, "auth.jwt_secret")?;
    let password_secret = required_secret(auth.password_secret, "auth.password_secret")?;

    let password_scheme = match auth.password_scheme {
        Some(value) => PasswordScheme::from_str(&value)
            .map_err(|reason| LoadError::invalid("auth.password_scheme", reason))?,
        None => PasswordScheme::Argon2,
    };

    let access_secs = auth
        .access_token_ttl_seconds
        .unwrap_or(DEFAULT_ACCESS_TOKEN_TTL_SECS);
    if access_secs == 0 {
        return Err(LoadError::invalid(
            "auth.access_token_ttl_seconds",
            "must be greater than zero",
        ));
    }

    let refresh_days = auth
        .refresh_token_ttl_days
        .unwrap_or(DEFAULT_REFRESH_TOKEN_TTL_DAYS);
    if refresh_days == 0 {
        return Err(LoadError::invalid(
            "auth.refresh_token_ttl_days",
            "must be greater than zero",
        ));
    }
    let refresh_secs = refresh_days.checked_mul(SECONDS_PER_DAY).ok_or_else(|| {
        LoadError::invalid("auth.refresh_token_ttl_days", "value is too large")
    })?;

    Ok(AuthSettings {
        jwt_secret,
        password_secret,
        password_scheme,
        access_token_ttl: Duration::from_secs(access_secs),
        refresh_token_ttl: Duration::from_secs(refresh_secs),
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let ttl_secs = cache
        .post_ttl_seconds
        .unwrap_or(DEFAULT_POST_CACHE_TTL_SECS);
    if ttl_secs == 0 {
        return Err(LoadError::invalid(
            "cache.post_ttl_seconds",
            "must be greater than zero",
        ));
    }

    let post_limit = NonZeroUsize::new(cache.post_limit.unwrap_or(DEFAULT_POST_CACHE_LIMIT))
        .ok_or_else(|| LoadError::invalid("cache.post_limit", "must be greater than zero"))?;

    Ok(CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        post_ttl: Duration::from_secs(ttl_secs),
        post_limit,
    })
}

fn build_upload_settings(uploads: RawUploadSettings) -> Result<UploadSettings, LoadError> {
    let directory = uploads
        .directory
        .unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOAD_DIR));
    if directory.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "uploads.directory",
            "path must not be empty",
        ));
    }

    let max_request_bytes_value = uploads
        .max_request_bytes
        .unwrap_or(DEFAULT_UPLOAD_REQUEST_LIMIT_BYTES);
    let max_request_bytes = NonZeroU64::new(max_request_bytes_value).ok_or_else(|| {
        LoadError::invalid("uploads.max_request_bytes", "must be greater than zero")
    })?;
    usize::try_from(max_request_bytes_value).map_err(|_| {
        LoadError::invalid(
            "uploads.max_request_bytes",
            "value exceeds supported range for usize",
        )
    })?;

    Ok(UploadSettings {
        directory,
        max_request_bytes,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Clone, Deserialize, Default)]
#[serde(default)]
struct RawAuthSettings {
    jwt_secret: Option<String>,
    password_secret: Option<String>,
    password_scheme: Option<String>,
    access_token_ttl_seconds: Option<u64>,
    refresh_token_ttl_days: Option<u64>,
}

impl std::fmt::Debug for RawAuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawAuthSettings")
            .field("jwt_secret", &self.jwt_secret.as_ref().map(|_| "<redacted>"))
            .field(
                "password_secret",
                &self.password_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("password_scheme", &self.password_scheme)
            .field("access_token_ttl_seconds", &self.access_token_ttl_seconds)
            .field("refresh_token_ttl_days", &self.refresh_token_ttl_days)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    post_ttl_seconds: Option<u64>,
    post_limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawUploadSettings {
    directory: Option<PathBuf>,
    max_request_bytes: Option<u64>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn required_secret(value: Option<String>, key: &'static str) -> Result<String, LoadError> {
    match value {
        Some(secret) if !secret.trim().is_empty() => Ok(secret),
        Some(_) => Err(LoadError::invalid(key, "secret must not be blank")),
        None => Err(LoadError::invalid(key, "secret is required")),
    }
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_with_secrets() -> RawSettings {
        let mut raw = RawSettings::default();
        raw.auth.jwt_secret = Some("jwt-secret".to_string());
        raw.auth.password_secret = Some("pepper".to_string());
        raw
    }

    #[test]
    fn defaults_follow_documented_values() {
        let settings = Settings::from_raw(raw_with_secrets()).expect("valid settings");

        assert_eq!(settings.server.addr.port(), DEFAULT_PORT);
        assert_eq!(settings.auth.access_token_ttl, Duration::from_secs(900));
        assert_eq!(
            settings.auth.refresh_token_ttl,
            Duration::from_secs(30 * SECONDS_PER_DAY)
        );
        assert_eq!(settings.auth.password_scheme, PasswordScheme::Argon2);
        assert!(settings.cache.enabled);
        assert_eq!(settings.cache.post_ttl, Duration::from_secs(360));
        assert_eq!(
            settings.uploads.max_request_bytes.get(),
            DEFAULT_UPLOAD_REQUEST_LIMIT_BYTES
        );
        assert!(settings.database.url.is_none());
    }

    #[test]
    fn missing_jwt_secret_is_rejected() {
        let mut raw = raw_with_secrets();
        raw.auth.jwt_secret = None;

        let err = Settings::from_raw(raw).expect_err("secret required");
        assert!(matches!(
            err,
            LoadError::Invalid {
                key: "auth.jwt_secret",
                ..
            }
        ));
    }

    #[test]
    fn blank_password_secret_is_rejected() {
        let mut raw = raw_with_secrets();
        raw.auth.password_secret = Some("   ".to_string());

        let err = Settings::from_raw(raw).expect_err("blank secret");
        assert!(matches!(
            err,
            LoadError::Invalid {
                key: "auth.password_secret",
                ..
            }
        ));
    }

    #[test]
    fn password_scheme_accepts_hmac() {
        let mut raw = raw_with_secrets();
        raw.auth.password_scheme = Some("HMAC-SHA256".to_string());

        let settings = Settings::from_raw(raw).expect("valid settings");
        assert_eq!(settings.auth.password_scheme, PasswordScheme::HmacSha256);
    }

    #[test]
    fn unknown_password_scheme_is_rejected() {
        let mut raw = raw_with_secrets();
        raw.auth.password_scheme = Some("md5".to_string());

        assert!(Settings::from_raw(raw).is_err());
    }

    #[test]
    fn zero_cache_ttl_is_rejected() {
        let mut raw = raw_with_secrets();
        raw.cache.post_ttl_seconds = Some(0);

        let err = Settings::from_raw(raw).expect_err("zero ttl");
        assert!(matches!(
            err,
            LoadError::Invalid {
                key: "cache.post_ttl_seconds",
                ..
            }
        ));
    }

    #[test]
    fn cli_overrides_take_highest_precedence() {
        let mut raw = raw_with_secrets();
        raw.server.port = Some(4000);
        raw.logging.level = Some("info".to_string());

        let overrides = ServeOverrides {
            server_port: Some(4321),
            log_level: Some("debug".to_string()),
            cache_enabled: Some(false),
            ..Default::default()
        };

        raw.apply_serve_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert_eq!(settings.server.addr.port(), 4321);
        assert_eq!(settings.logging.level, LevelFilter::DEBUG);
        assert!(!settings.cache.enabled);
    }

    #[test]
    fn cli_json_logging_enforces_format() {
        let mut raw = raw_with_secrets();
        let overrides = ServeOverrides {
            log_json: Some(true),
            ..Default::default()
        };

        raw.apply_serve_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert!(matches!(settings.logging.format, LogFormat::Json));
    }

    #[test]
    fn secrets_are_redacted_in_debug_output() {
        let settings = Settings::from_raw(raw_with_secrets()).expect("valid settings");
        let rendered = format!("{:?}", settings.auth);

        assert!(!rendered.contains("jwt-secret"));
        assert!(!rendered.contains("pepper"));
    }

    #[test]
    fn default_to_serve_command() {
        let args = CliArgs::parse_from(["quaderno"]);
        let command = args
            .command
            .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
        assert!(matches!(command, Command::Serve(_)));
    }

    #[test]
    fn parse_migrate_arguments() {
        let args = CliArgs::parse_from([
            "quaderno",
            "migrate",
            "--database-url",
            "postgres://example",
        ]);

        match args.command.expect("migrate command") {
            Command::Migrate(migrate) => {
                assert_eq!(migrate.database_url.as_deref(), Some("postgres://example"));
            }
            _ => panic!("wrong command parsed"),
        }
    }

    #[test]
    fn parse_serve_overrides() {
        let args = CliArgs::parse_from([
            "quaderno",
            "serve",
            "--server-host",
            "0.0.0.0",
            "--database-url",
            "postgres://override",
        ]);

        match args.command.expect("serve command") {
            Command::Serve(serve) => {
                assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
                assert_eq!(
                    serve.overrides.database_url.as_deref(),
                    Some("postgres://override")
                );
            }
            _ => panic!("wrong command parsed"),
        }
    }
}
