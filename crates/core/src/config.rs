use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cooldown::CooldownPolicy;
use crate::monitor::PollerSettings;

pub const DEFAULT_ACTOR_ID: &str = "muhammetakkurtt/truth-social-scraper";
pub const DEFAULT_SCRAPER_BASE_URL: &str = "https://api.apify.com/v2/";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub discord: DiscordConfig,
    pub scraper: ScraperConfig,
    pub monitor: MonitorConfig,
    pub search: SearchConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct DiscordConfig {
    pub bot_token: SecretString,
    pub command_prefix: String,
    /// Channels that receive monitoring alerts in addition to the channel
    /// where monitoring was started.
    pub alert_channel_ids: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct ScraperConfig {
    pub api_token: SecretString,
    pub actor_id: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_posts: usize,
}

#[derive(Clone, Debug)]
pub struct MonitorConfig {
    pub poll_interval_secs: u64,
    pub fetch_limit: usize,
}

#[derive(Clone, Debug)]
pub struct SearchConfig {
    pub max_results: usize,
    pub cooldown_secs: u64,
    pub max_requests_per_hour: usize,
    pub default_days: u32,
    pub max_days: u32,
    pub recent_posts: usize,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub discord_bot_token: Option<String>,
    pub command_prefix: Option<String>,
    pub scraper_api_token: Option<String>,
    pub scraper_actor_id: Option<String>,
    pub poll_interval_secs: Option<u64>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://truthwatch.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            discord: DiscordConfig {
                bot_token: String::new().into(),
                command_prefix: "!".to_string(),
                alert_channel_ids: Vec::new(),
            },
            scraper: ScraperConfig {
                api_token: String::new().into(),
                actor_id: DEFAULT_ACTOR_ID.to_string(),
                base_url: DEFAULT_SCRAPER_BASE_URL.to_string(),
                timeout_secs: 30,
                max_posts: 20,
            },
            monitor: MonitorConfig { poll_interval_secs: 300, fetch_limit: 20 },
            search: SearchConfig {
                max_results: 5,
                cooldown_secs: 30,
                max_requests_per_hour: 20,
                default_days: 7,
                max_days: 30,
                recent_posts: 5,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                health_check_port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl SearchConfig {
    pub fn cooldown_policy(&self) -> CooldownPolicy {
        CooldownPolicy {
            cooldown: std::time::Duration::from_secs(self.cooldown_secs),
            max_requests_per_hour: self.max_requests_per_hour,
        }
    }
}

impl MonitorConfig {
    pub fn poller_settings(&self) -> PollerSettings {
        PollerSettings {
            interval: std::time::Duration::from_secs(self.poll_interval_secs),
            fetch_limit: self.fetch_limit,
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from("truthwatch.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(discord) = patch.discord {
            if let Some(bot_token) = discord.bot_token {
                self.discord.bot_token = secret_value(bot_token);
            }
            if let Some(command_prefix) = discord.command_prefix {
                self.discord.command_prefix = command_prefix;
            }
            if let Some(alert_channel_ids) = discord.alert_channel_ids {
                self.discord.alert_channel_ids = alert_channel_ids;
            }
        }

        if let Some(scraper) = patch.scraper {
            if let Some(api_token) = scraper.api_token {
                self.scraper.api_token = secret_value(api_token);
            }
            if let Some(actor_id) = scraper.actor_id {
                self.scraper.actor_id = actor_id;
            }
            if let Some(base_url) = scraper.base_url {
                self.scraper.base_url = base_url;
            }
            if let Some(timeout_secs) = scraper.timeout_secs {
                self.scraper.timeout_secs = timeout_secs;
            }
            if let Some(max_posts) = scraper.max_posts {
                self.scraper.max_posts = max_posts;
            }
        }

        if let Some(monitor) = patch.monitor {
            if let Some(poll_interval_secs) = monitor.poll_interval_secs {
                self.monitor.poll_interval_secs = poll_interval_secs;
            }
            if let Some(fetch_limit) = monitor.fetch_limit {
                self.monitor.fetch_limit = fetch_limit;
            }
        }

        if let Some(search) = patch.search {
            if let Some(max_results) = search.max_results {
                self.search.max_results = max_results;
            }
            if let Some(cooldown_secs) = search.cooldown_secs {
                self.search.cooldown_secs = cooldown_secs;
            }
            if let Some(max_requests_per_hour) = search.max_requests_per_hour {
                self.search.max_requests_per_hour = max_requests_per_hour;
            }
            if let Some(default_days) = search.default_days {
                self.search.default_days = default_days;
            }
            if let Some(max_days) = search.max_days {
                self.search.max_days = max_days;
            }
            if let Some(recent_posts) = search.recent_posts {
                self.search.recent_posts = recent_posts;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("TRUTHWATCH_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("TRUTHWATCH_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("TRUTHWATCH_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("TRUTHWATCH_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("TRUTHWATCH_DATABASE_TIMEOUT_SECS", &value)?;
        }

        let bot_token =
            read_env("TRUTHWATCH_DISCORD_BOT_TOKEN").or_else(|| read_env("DISCORD_TOKEN"));
        if let Some(value) = bot_token {
            self.discord.bot_token = secret_value(value);
        }
        let prefix = read_env("TRUTHWATCH_DISCORD_COMMAND_PREFIX").or_else(|| read_env("BOT_PREFIX"));
        if let Some(value) = prefix {
            self.discord.command_prefix = value;
        }
        if let Some(value) = read_env("TRUTHWATCH_DISCORD_ALERT_CHANNEL_IDS") {
            self.discord.alert_channel_ids = split_list(&value);
        }

        let api_token =
            read_env("TRUTHWATCH_SCRAPER_API_TOKEN").or_else(|| read_env("APIFY_API_TOKEN"));
        if let Some(value) = api_token {
            self.scraper.api_token = secret_value(value);
        }
        let actor_id =
            read_env("TRUTHWATCH_SCRAPER_ACTOR_ID").or_else(|| read_env("APIFY_ACTOR_ID"));
        if let Some(value) = actor_id {
            self.scraper.actor_id = value;
        }
        if let Some(value) = read_env("TRUTHWATCH_SCRAPER_BASE_URL") {
            self.scraper.base_url = value;
        }
        if let Some(value) = read_env("TRUTHWATCH_SCRAPER_TIMEOUT_SECS") {
            self.scraper.timeout_secs = parse_u64("TRUTHWATCH_SCRAPER_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("TRUTHWATCH_SCRAPER_MAX_POSTS") {
            self.scraper.max_posts = parse_usize("TRUTHWATCH_SCRAPER_MAX_POSTS", &value)?;
        }

        if let Some(value) = read_env("TRUTHWATCH_MONITOR_POLL_INTERVAL_SECS") {
            self.monitor.poll_interval_secs =
                parse_u64("TRUTHWATCH_MONITOR_POLL_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = read_env("TRUTHWATCH_MONITOR_FETCH_LIMIT") {
            self.monitor.fetch_limit = parse_usize("TRUTHWATCH_MONITOR_FETCH_LIMIT", &value)?;
        }

        if let Some(value) = read_env("TRUTHWATCH_SEARCH_COOLDOWN_SECS") {
            self.search.cooldown_secs = parse_u64("TRUTHWATCH_SEARCH_COOLDOWN_SECS", &value)?;
        }
        if let Some(value) = read_env("TRUTHWATCH_SEARCH_MAX_REQUESTS_PER_HOUR") {
            self.search.max_requests_per_hour =
                parse_usize("TRUTHWATCH_SEARCH_MAX_REQUESTS_PER_HOUR", &value)?;
        }

        if let Some(value) = read_env("TRUTHWATCH_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("TRUTHWATCH_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("TRUTHWATCH_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("TRUTHWATCH_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("TRUTHWATCH_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level = read_env("TRUTHWATCH_LOGGING_LEVEL")
            .or_else(|| read_env("TRUTHWATCH_LOG_LEVEL"))
            .or_else(|| read_env("LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value.to_ascii_lowercase();
        }
        let log_format =
            read_env("TRUTHWATCH_LOGGING_FORMAT").or_else(|| read_env("TRUTHWATCH_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(bot_token) = overrides.discord_bot_token {
            self.discord.bot_token = secret_value(bot_token);
        }
        if let Some(command_prefix) = overrides.command_prefix {
            self.discord.command_prefix = command_prefix;
        }
        if let Some(api_token) = overrides.scraper_api_token {
            self.scraper.api_token = secret_value(api_token);
        }
        if let Some(actor_id) = overrides.scraper_actor_id {
            self.scraper.actor_id = actor_id;
        }
        if let Some(poll_interval_secs) = overrides.poll_interval_secs {
            self.monitor.poll_interval_secs = poll_interval_secs;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_discord(&self.discord)?;
        validate_scraper(&self.scraper)?;
        validate_monitor(&self.monitor)?;
        validate_search(&self.search)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("truthwatch.toml"), PathBuf::from("config/truthwatch.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_discord(discord: &DiscordConfig) -> Result<(), ConfigError> {
    let bot_token = discord.bot_token.expose_secret();
    if bot_token.trim().is_empty() {
        return Err(ConfigError::Validation(
            "discord.bot_token is required (env `DISCORD_TOKEN`). Get it from https://discord.com/developers/applications > Your App > Bot".to_string(),
        ));
    }
    if bot_token.starts_with("Bot ") {
        return Err(ConfigError::Validation(
            "discord.bot_token must be the raw token without the `Bot ` prefix".to_string(),
        ));
    }

    let prefix = discord.command_prefix.trim();
    if prefix.is_empty() || prefix.chars().any(char::is_whitespace) {
        return Err(ConfigError::Validation(
            "discord.command_prefix must be non-empty and contain no whitespace".to_string(),
        ));
    }

    if let Some(bad) = discord
        .alert_channel_ids
        .iter()
        .find(|id| id.is_empty() || !id.chars().all(|ch| ch.is_ascii_digit()))
    {
        return Err(ConfigError::Validation(format!(
            "discord.alert_channel_ids contains `{bad}`; channel ids are numeric snowflakes"
        )));
    }

    Ok(())
}

fn validate_scraper(scraper: &ScraperConfig) -> Result<(), ConfigError> {
    if scraper.api_token.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "scraper.api_token is required (env `APIFY_API_TOKEN`). Get it from https://console.apify.com/account/integrations".to_string(),
        ));
    }

    if scraper.actor_id.trim().is_empty() {
        return Err(ConfigError::Validation("scraper.actor_id must not be empty".to_string()));
    }

    if !scraper.base_url.starts_with("http://") && !scraper.base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "scraper.base_url must start with http:// or https://".to_string(),
        ));
    }

    if scraper.timeout_secs == 0 || scraper.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "scraper.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if scraper.max_posts < 5 {
        return Err(ConfigError::Validation(
            "scraper.max_posts must be at least 5".to_string(),
        ));
    }

    Ok(())
}

fn validate_monitor(monitor: &MonitorConfig) -> Result<(), ConfigError> {
    if monitor.poll_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "monitor.poll_interval_secs must be greater than zero".to_string(),
        ));
    }

    if monitor.fetch_limit == 0 {
        return Err(ConfigError::Validation(
            "monitor.fetch_limit must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_search(search: &SearchConfig) -> Result<(), ConfigError> {
    if search.max_results == 0 || search.recent_posts == 0 {
        return Err(ConfigError::Validation(
            "search.max_results and search.recent_posts must be greater than zero".to_string(),
        ));
    }

    if search.max_requests_per_hour == 0 {
        return Err(ConfigError::Validation(
            "search.max_requests_per_hour must be greater than zero".to_string(),
        ));
    }

    if search.default_days == 0 || search.default_days > search.max_days {
        return Err(ConfigError::Validation(format!(
            "search.default_days must be in range 1..={}",
            search.max_days
        )));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn split_list(value: &str) -> Vec<String> {
    value.split(',').map(str::trim).filter(|item| !item.is_empty()).map(str::to_string).collect()
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    discord: Option<DiscordPatch>,
    scraper: Option<ScraperPatch>,
    monitor: Option<MonitorPatch>,
    search: Option<SearchPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct DiscordPatch {
    bot_token: Option<String>,
    command_prefix: Option<String>,
    alert_channel_ids: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct ScraperPatch {
    api_token: Option<String>,
    actor_id: Option<String>,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
    max_posts: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct MonitorPatch {
    poll_interval_secs: Option<u64>,
    fetch_limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchPatch {
    max_results: Option<usize>,
    cooldown_secs: Option<u64>,
    max_requests_per_hour: Option<usize>,
    default_days: Option<u32>,
    max_days: Option<u32>,
    recent_posts: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
