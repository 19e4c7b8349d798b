use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub provider: ProviderConfig,
    pub query: QueryConfig,
    pub agent: AgentConfig,
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
pub struct ProviderConfig {
    /// Rotation order of the credential pool.
    pub api_keys: Vec<SecretString>,
    pub model: String,
    pub temperature: f32,
    /// `-1` lets the model pick its own reasoning budget.
    pub thinking_budget: i32,
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct QueryConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<SecretString>,
    pub data_source: String,
    pub database: String,
    pub collection: String,
    pub timeout_secs: u64,
    pub max_documents: u32,
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub history_budget: usize,
    pub max_tool_iterations: usize,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub default_timezone: String,
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
    pub provider_api_keys: Option<Vec<String>>,
    pub provider_model: Option<String>,
    pub query_endpoint: Option<String>,
    pub server_port: Option<u16>,
    pub default_timezone: Option<String>,
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
                url: "sqlite://querent.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            provider: ProviderConfig {
                api_keys: Vec::new(),
                model: "gemini-2.5-flash".to_string(),
                temperature: 0.2,
                thinking_budget: -1,
                base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
                timeout_secs: 120,
            },
            query: QueryConfig {
                endpoint: None,
                api_key: None,
                data_source: "Cluster0".to_string(),
                database: "querent".to_string(),
                collection: "entities_data".to_string(),
                timeout_secs: 30,
                max_documents: 50,
            },
            agent: AgentConfig { history_budget: 25, max_tool_iterations: 25 },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8000,
                default_timezone: "Asia/Calcutta".to_string(),
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

fn secret_list(values: Vec<String>) -> Vec<SecretString> {
    values.into_iter().map(secret_value).collect()
}

fn split_list(value: &str) -> Vec<String> {
    value.split(',').map(str::trim).filter(|item| !item.is_empty()).map(str::to_string).collect()
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("querent.toml"));
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

        if let Some(provider) = patch.provider {
            if let Some(provider_api_keys_value) = provider.api_keys {
                self.provider.api_keys = secret_list(provider_api_keys_value);
            }
            if let Some(model) = provider.model {
                self.provider.model = model;
            }
            if let Some(temperature) = provider.temperature {
                self.provider.temperature = temperature;
            }
            if let Some(thinking_budget) = provider.thinking_budget {
                self.provider.thinking_budget = thinking_budget;
            }
            if let Some(base_url) = provider.base_url {
                self.provider.base_url = base_url;
            }
            if let Some(timeout_secs) = provider.timeout_secs {
                self.provider.timeout_secs = timeout_secs;
            }
        }

        if let Some(query) = patch.query {
            if let Some(endpoint) = query.endpoint {
                self.query.endpoint = Some(endpoint);
            }
            if let Some(query_api_key_value) = query.api_key {
                self.query.api_key = Some(secret_value(query_api_key_value));
            }
            if let Some(data_source) = query.data_source {
                self.query.data_source = data_source;
            }
            if let Some(database) = query.database {
                self.query.database = database;
            }
            if let Some(collection) = query.collection {
                self.query.collection = collection;
            }
            if let Some(timeout_secs) = query.timeout_secs {
                self.query.timeout_secs = timeout_secs;
            }
            if let Some(max_documents) = query.max_documents {
                self.query.max_documents = max_documents;
            }
        }

        if let Some(agent) = patch.agent {
            if let Some(history_budget) = agent.history_budget {
                self.agent.history_budget = history_budget;
            }
            if let Some(max_tool_iterations) = agent.max_tool_iterations {
                self.agent.max_tool_iterations = max_tool_iterations;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(default_timezone) = server.default_timezone {
                self.server.default_timezone = default_timezone;
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
        if let Some(value) = read_env("QUERENT_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("QUERENT_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_value("QUERENT_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("QUERENT_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_value("QUERENT_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("QUERENT_PROVIDER_API_KEYS") {
            self.provider.api_keys = secret_list(split_list(&value));
        }
        if let Some(value) = read_env("QUERENT_PROVIDER_MODEL") {
            self.provider.model = value;
        }
        if let Some(value) = read_env("QUERENT_PROVIDER_TEMPERATURE") {
            self.provider.temperature = parse_value("QUERENT_PROVIDER_TEMPERATURE", &value)?;
        }
        if let Some(value) = read_env("QUERENT_PROVIDER_THINKING_BUDGET") {
            self.provider.thinking_budget =
                parse_value("QUERENT_PROVIDER_THINKING_BUDGET", &value)?;
        }
        if let Some(value) = read_env("QUERENT_PROVIDER_BASE_URL") {
            self.provider.base_url = value;
        }
        if let Some(value) = read_env("QUERENT_PROVIDER_TIMEOUT_SECS") {
            self.provider.timeout_secs = parse_value("QUERENT_PROVIDER_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("QUERENT_QUERY_ENDPOINT") {
            self.query.endpoint = Some(value);
        }
        if let Some(value) = read_env("QUERENT_QUERY_API_KEY") {
            self.query.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("QUERENT_QUERY_DATA_SOURCE") {
            self.query.data_source = value;
        }
        if let Some(value) = read_env("QUERENT_QUERY_DATABASE") {
            self.query.database = value;
        }
        if let Some(value) = read_env("QUERENT_QUERY_COLLECTION") {
            self.query.collection = value;
        }
        if let Some(value) = read_env("QUERENT_QUERY_TIMEOUT_SECS") {
            self.query.timeout_secs = parse_value("QUERENT_QUERY_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("QUERENT_QUERY_MAX_DOCUMENTS") {
            self.query.max_documents = parse_value("QUERENT_QUERY_MAX_DOCUMENTS", &value)?;
        }

        if let Some(value) = read_env("QUERENT_AGENT_HISTORY_BUDGET") {
            self.agent.history_budget = parse_value("QUERENT_AGENT_HISTORY_BUDGET", &value)?;
        }
        if let Some(value) = read_env("QUERENT_AGENT_MAX_TOOL_ITERATIONS") {
            self.agent.max_tool_iterations =
                parse_value("QUERENT_AGENT_MAX_TOOL_ITERATIONS", &value)?;
        }

        if let Some(value) = read_env("QUERENT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("QUERENT_SERVER_PORT") {
            self.server.port = parse_value("QUERENT_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("QUERENT_SERVER_DEFAULT_TIMEZONE") {
            self.server.default_timezone = value;
        }
        if let Some(value) = read_env("QUERENT_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_value("QUERENT_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("QUERENT_LOGGING_LEVEL").or_else(|| read_env("QUERENT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("QUERENT_LOGGING_FORMAT").or_else(|| read_env("QUERENT_LOG_FORMAT"));
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
        if let Some(provider_api_keys) = overrides.provider_api_keys {
            self.provider.api_keys = secret_list(provider_api_keys);
        }
        if let Some(provider_model) = overrides.provider_model {
            self.provider.model = provider_model;
        }
        if let Some(query_endpoint) = overrides.query_endpoint {
            self.query.endpoint = Some(query_endpoint);
        }
        if let Some(server_port) = overrides.server_port {
            self.server.port = server_port;
        }
        if let Some(default_timezone) = overrides.default_timezone {
            self.server.default_timezone = default_timezone;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_provider(&self.provider)?;
        validate_query(&self.query)?;
        validate_agent(&self.agent)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("querent.toml"), PathBuf::from("config/querent.toml")]
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

fn validate_provider(provider: &ProviderConfig) -> Result<(), ConfigError> {
    if provider.api_keys.is_empty() {
        return Err(ConfigError::Validation(
            "provider.api_keys must list at least one key (QUERENT_PROVIDER_API_KEYS accepts a comma separated list)"
                .to_string(),
        ));
    }
    if provider.api_keys.iter().any(|key| key.expose_secret().trim().is_empty()) {
        return Err(ConfigError::Validation(
            "provider.api_keys must not contain blank entries".to_string(),
        ));
    }

    if provider.model.trim().is_empty() {
        return Err(ConfigError::Validation("provider.model must not be empty".to_string()));
    }

    if !(0.0..=2.0).contains(&provider.temperature) {
        return Err(ConfigError::Validation(
            "provider.temperature must be in range 0.0..=2.0".to_string(),
        ));
    }

    if !is_http_url(&provider.base_url) {
        return Err(ConfigError::Validation(
            "provider.base_url must start with http:// or https://".to_string(),
        ));
    }

    if provider.timeout_secs == 0 || provider.timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "provider.timeout_secs must be in range 1..=600".to_string(),
        ));
    }

    Ok(())
}

fn validate_query(query: &QueryConfig) -> Result<(), ConfigError> {
    if let Some(endpoint) = &query.endpoint {
        if !is_http_url(endpoint) {
            return Err(ConfigError::Validation(
                "query.endpoint must start with http:// or https://".to_string(),
            ));
        }
    }

    if query.collection.trim().is_empty() || query.database.trim().is_empty() {
        return Err(ConfigError::Validation(
            "query.database and query.collection must not be empty".to_string(),
        ));
    }

    if query.timeout_secs == 0 || query.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "query.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if query.max_documents == 0 {
        return Err(ConfigError::Validation(
            "query.max_documents must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_agent(agent: &AgentConfig) -> Result<(), ConfigError> {
    if agent.history_budget == 0 {
        return Err(ConfigError::Validation(
            "agent.history_budget must be greater than zero".to_string(),
        ));
    }

    if agent.max_tool_iterations == 0 {
        return Err(ConfigError::Validation(
            "agent.max_tool_iterations must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.default_timezone.parse::<Tz>().is_err() {
        return Err(ConfigError::Validation(format!(
            "server.default_timezone `{}` is not a valid IANA timezone name",
            server.default_timezone
        )));
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

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    provider: Option<ProviderPatch>,
    query: Option<QueryPatch>,
    agent: Option<AgentPatch>,
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
struct ProviderPatch {
    api_keys: Option<Vec<String>>,
    model: Option<String>,
    temperature: Option<f32>,
    thinking_budget: Option<i32>,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct QueryPatch {
    endpoint: Option<String>,
    api_key: Option<String>,
    data_source: Option<String>,
    database: Option<String>,
    collection: Option<String>,
    timeout_secs: Option<u64>,
    max_documents: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPatch {
    history_budget: Option<usize>,
    max_tool_iterations: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    default_timezone: Option<String>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_PROVIDER_KEY_A", "key-a-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("querent.toml");
            fs::write(
                &path,
                r#"
[provider]
api_keys = ["${TEST_PROVIDER_KEY_A}", "key-b-inline"]
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.provider.api_keys.len() == 2, "both api keys should be loaded")?;
            ensure(
                config.provider.api_keys[0].expose_secret() == "key-a-from-env",
                "first api key should be interpolated from environment",
            )?;
            ensure(
                config.provider.api_keys[1].expose_secret() == "key-b-inline",
                "second api key should keep file order",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_PROVIDER_KEY_A"]);
        result
    }

    #[test]
    fn comma_separated_api_keys_keep_rotation_order() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("QUERENT_PROVIDER_API_KEYS", "alpha, beta,,gamma ");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let keys: Vec<&str> =
                config.provider.api_keys.iter().map(|key| key.expose_secret()).collect();

            ensure(keys == ["alpha", "beta", "gamma"], "keys should be split and trimmed in order")
        })();

        clear_vars(&["QUERENT_PROVIDER_API_KEYS"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("QUERENT_PROVIDER_API_KEYS", "key-test");
        env::set_var("QUERENT_LOG_LEVEL", "warn");
        env::set_var("QUERENT_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["QUERENT_PROVIDER_API_KEYS", "QUERENT_LOG_LEVEL", "QUERENT_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("QUERENT_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("QUERENT_PROVIDER_MODEL", "model-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("querent.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[provider]
api_keys = ["key-from-file"]
model = "model-from-file"

[server]
default_timezone = "America/New_York"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.provider.model == "model-from-env",
                "env model should win over file and defaults",
            )?;
            ensure(
                config.server.default_timezone == "America/New_York",
                "file timezone should win over defaults",
            )?;
            Ok(())
        })();

        clear_vars(&["QUERENT_DATABASE_URL", "QUERENT_PROVIDER_MODEL"]);
        result
    }

    #[test]
    fn empty_credential_list_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(&["QUERENT_PROVIDER_API_KEYS"]);

        let error = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => return Err("expected validation failure but config load succeeded".to_string()),
            Err(error) => error,
        };
        let has_message = matches!(
            error,
            ConfigError::Validation(ref message) if message.contains("provider.api_keys")
        );
        ensure(has_message, "validation failure should mention provider.api_keys")
    }

    #[test]
    fn invalid_default_timezone_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let result = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                provider_api_keys: Some(vec!["key".to_string()]),
                default_timezone: Some("Mars/Olympus_Mons".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });

        let rejected = matches!(
            result,
            Err(ConfigError::Validation(ref message)) if message.contains("server.default_timezone")
        );
        ensure(rejected, "unknown timezone should fail validation")
    }

    #[test]
    fn invalid_numeric_env_override_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("QUERENT_PROVIDER_API_KEYS", "key-test");
        env::set_var("QUERENT_SERVER_PORT", "eighty");

        let result = AppConfig::load(LoadOptions::default());
        clear_vars(&["QUERENT_PROVIDER_API_KEYS", "QUERENT_SERVER_PORT"]);

        let reported = matches!(
            result,
            Err(ConfigError::InvalidEnvOverride { ref key, .. }) if key == "QUERENT_SERVER_PORT"
        );
        ensure(reported, "bad port should surface as invalid env override")
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("QUERENT_PROVIDER_API_KEYS", "provider-secret-value");
        env::set_var("QUERENT_QUERY_API_KEY", "query-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("provider-secret-value"),
                "debug output should not contain provider key",
            )?;
            ensure(
                !debug.contains("query-secret-value"),
                "debug output should not contain query api key",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&["QUERENT_PROVIDER_API_KEYS", "QUERENT_QUERY_API_KEY"]);
        result
    }
}
