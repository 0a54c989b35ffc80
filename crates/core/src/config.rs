use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub helpdesk: HelpdeskConfig,
    pub llm: LlmConfig,
    pub server: ServerConfig,
    pub poller: PollerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct HelpdeskConfig {
    /// Workspace host of the remote helpdesk, e.g. `acme.example-desk.com`.
    pub workspace_host: String,
    pub api_key: SecretString,
    pub api_version: String,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub api_key: SecretString,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct PollerConfig {
    pub lookback_hours: u32,
    pub list_page_size: u32,
    pub message_fetch_limit: u32,
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
    pub helpdesk_workspace_host: Option<String>,
    pub helpdesk_api_key: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_model: Option<String>,
    pub log_level: Option<String>,
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
                url: "sqlite://replyq.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            helpdesk: HelpdeskConfig {
                workspace_host: String::new(),
                api_key: String::new().into(),
                api_version: "2024-03-05".to_string(),
            },
            llm: LlmConfig {
                api_key: String::new().into(),
                base_url: "https://api.anthropic.com".to_string(),
                model: "claude-sonnet-4-20250514".to_string(),
                max_tokens: 1024,
                timeout_secs: 60,
            },
            server: ServerConfig { bind_address: "127.0.0.1".to_string(), port: 8000 },
            poller: PollerConfig {
                lookback_hours: 24,
                list_page_size: 100,
                message_fetch_limit: 50,
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

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("replyq.toml"));
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

        if let Some(helpdesk) = patch.helpdesk {
            if let Some(workspace_host) = helpdesk.workspace_host {
                self.helpdesk.workspace_host = workspace_host;
            }
            if let Some(api_key_value) = helpdesk.api_key {
                self.helpdesk.api_key = secret_value(api_key_value);
            }
            if let Some(api_version) = helpdesk.api_version {
                self.helpdesk.api_version = api_version;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(api_key_value) = llm.api_key {
                self.llm.api_key = secret_value(api_key_value);
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = base_url;
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(max_tokens) = llm.max_tokens {
                self.llm.max_tokens = max_tokens;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
        }

        if let Some(poller) = patch.poller {
            if let Some(lookback_hours) = poller.lookback_hours {
                self.poller.lookback_hours = lookback_hours;
            }
            if let Some(list_page_size) = poller.list_page_size {
                self.poller.list_page_size = list_page_size;
            }
            if let Some(message_fetch_limit) = poller.message_fetch_limit {
                self.poller.message_fetch_limit = message_fetch_limit;
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
        if let Some(value) = read_env("REPLYQ_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("REPLYQ_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("REPLYQ_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("REPLYQ_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("REPLYQ_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("REPLYQ_HELPDESK_WORKSPACE_HOST") {
            self.helpdesk.workspace_host = value;
        }
        if let Some(value) = read_env("REPLYQ_HELPDESK_API_KEY") {
            self.helpdesk.api_key = secret_value(value);
        }
        if let Some(value) = read_env("REPLYQ_HELPDESK_API_VERSION") {
            self.helpdesk.api_version = value;
        }

        if let Some(value) = read_env("REPLYQ_LLM_API_KEY") {
            self.llm.api_key = secret_value(value);
        }
        if let Some(value) = read_env("REPLYQ_LLM_BASE_URL") {
            self.llm.base_url = value;
        }
        if let Some(value) = read_env("REPLYQ_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("REPLYQ_LLM_MAX_TOKENS") {
            self.llm.max_tokens = parse_u32("REPLYQ_LLM_MAX_TOKENS", &value)?;
        }
        if let Some(value) = read_env("REPLYQ_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("REPLYQ_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("REPLYQ_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("REPLYQ_SERVER_PORT").or_else(|| read_env("PORT")) {
            self.server.port = parse_u16("REPLYQ_SERVER_PORT", &value)?;
        }

        if let Some(value) = read_env("REPLYQ_POLLER_LOOKBACK_HOURS") {
            self.poller.lookback_hours = parse_u32("REPLYQ_POLLER_LOOKBACK_HOURS", &value)?;
        }
        if let Some(value) = read_env("REPLYQ_POLLER_LIST_PAGE_SIZE") {
            self.poller.list_page_size = parse_u32("REPLYQ_POLLER_LIST_PAGE_SIZE", &value)?;
        }
        if let Some(value) = read_env("REPLYQ_POLLER_MESSAGE_FETCH_LIMIT") {
            self.poller.message_fetch_limit =
                parse_u32("REPLYQ_POLLER_MESSAGE_FETCH_LIMIT", &value)?;
        }

        let log_level = read_env("REPLYQ_LOGGING_LEVEL").or_else(|| read_env("REPLYQ_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("REPLYQ_LOGGING_FORMAT").or_else(|| read_env("REPLYQ_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(workspace_host) = overrides.helpdesk_workspace_host {
            self.helpdesk.workspace_host = workspace_host;
        }
        if let Some(api_key) = overrides.helpdesk_api_key {
            self.helpdesk.api_key = secret_value(api_key);
        }
        if let Some(api_key) = overrides.llm_api_key {
            self.llm.api_key = secret_value(api_key);
        }
        if let Some(model) = overrides.llm_model {
            self.llm.model = model;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_helpdesk(&self.helpdesk)?;
        validate_llm(&self.llm)?;
        validate_server(&self.server)?;
        validate_poller(&self.poller)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("replyq.toml"), PathBuf::from("config/replyq.toml")]
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

fn validate_helpdesk(helpdesk: &HelpdeskConfig) -> Result<(), ConfigError> {
    if helpdesk.workspace_host.trim().is_empty() {
        return Err(ConfigError::Validation(
            "helpdesk.workspace_host is required (e.g. `yourworkspace.example-desk.com`)"
                .to_string(),
        ));
    }
    if helpdesk.workspace_host.contains("://") || helpdesk.workspace_host.contains('/') {
        return Err(ConfigError::Validation(
            "helpdesk.workspace_host must be a bare host name, not a URL".to_string(),
        ));
    }
    if helpdesk.api_key.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "helpdesk.api_key is required. Generate one under Settings > API in your workspace"
                .to_string(),
        ));
    }
    if helpdesk.api_version.trim().is_empty() {
        return Err(ConfigError::Validation("helpdesk.api_version must not be empty".to_string()));
    }
    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.api_key.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation("llm.api_key is required".to_string()));
    }
    if !llm.base_url.starts_with("http://") && !llm.base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "llm.base_url must start with http:// or https://".to_string(),
        ));
    }
    if llm.max_tokens == 0 {
        return Err(ConfigError::Validation(
            "llm.max_tokens must be greater than zero".to_string(),
        ));
    }
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }
    Ok(())
}

fn validate_poller(poller: &PollerConfig) -> Result<(), ConfigError> {
    if poller.lookback_hours == 0 {
        return Err(ConfigError::Validation(
            "poller.lookback_hours must be greater than zero".to_string(),
        ));
    }
    if poller.list_page_size == 0 || poller.list_page_size > 100 {
        return Err(ConfigError::Validation(
            "poller.list_page_size must be in range 1..=100 (remote API page cap)".to_string(),
        ));
    }
    if poller.message_fetch_limit == 0 {
        return Err(ConfigError::Validation(
            "poller.message_fetch_limit must be greater than zero".to_string(),
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

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    helpdesk: Option<HelpdeskPatch>,
    llm: Option<LlmPatch>,
    server: Option<ServerPatch>,
    poller: Option<PollerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct HelpdeskPatch {
    workspace_host: Option<String>,
    api_key: Option<String>,
    api_version: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    max_tokens: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct PollerPatch {
    lookback_hours: Option<u32>,
    list_page_size: Option<u32>,
    message_fetch_limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
