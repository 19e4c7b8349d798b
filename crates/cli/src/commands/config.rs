use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use querent_core::config::{AppConfig, LoadOptions};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, env_key, value) in entries(&config) {
        let source = field_source(key, env_key, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(key, &value, source));
    }

    lines.join("\n")
}

/// `(key path, primary env var, rendered value)` for every setting.
fn entries(config: &AppConfig) -> Vec<(&'static str, &'static str, String)> {
    vec![
        ("database.url", "QUERENT_DATABASE_URL", config.database.url.clone()),
        (
            "database.max_connections",
            "QUERENT_DATABASE_MAX_CONNECTIONS",
            config.database.max_connections.to_string(),
        ),
        ("database.timeout_secs", "QUERENT_DATABASE_TIMEOUT_SECS", config.database.timeout_secs.to_string()),
        ("provider.api_keys", "QUERENT_PROVIDER_API_KEYS", redact_keys(&config.provider.api_keys)),
        ("provider.model", "QUERENT_PROVIDER_MODEL", config.provider.model.clone()),
        ("provider.temperature", "QUERENT_PROVIDER_TEMPERATURE", config.provider.temperature.to_string()),
        (
            "provider.thinking_budget",
            "QUERENT_PROVIDER_THINKING_BUDGET",
            config.provider.thinking_budget.to_string(),
        ),
        ("provider.base_url", "QUERENT_PROVIDER_BASE_URL", config.provider.base_url.clone()),
        ("provider.timeout_secs", "QUERENT_PROVIDER_TIMEOUT_SECS", config.provider.timeout_secs.to_string()),
        (
            "query.endpoint",
            "QUERENT_QUERY_ENDPOINT",
            config.query.endpoint.clone().unwrap_or_else(|| "<unset>".to_string()),
        ),
        (
            "query.api_key",
            "QUERENT_QUERY_API_KEY",
            config.query.api_key.as_ref().map(redact_token).unwrap_or_else(|| "<unset>".to_string()),
        ),
        ("query.data_source", "QUERENT_QUERY_DATA_SOURCE", config.query.data_source.clone()),
        ("query.database", "QUERENT_QUERY_DATABASE", config.query.database.clone()),
        ("query.collection", "QUERENT_QUERY_COLLECTION", config.query.collection.clone()),
        ("query.timeout_secs", "QUERENT_QUERY_TIMEOUT_SECS", config.query.timeout_secs.to_string()),
        ("query.max_documents", "QUERENT_QUERY_MAX_DOCUMENTS", config.query.max_documents.to_string()),
        ("agent.history_budget", "QUERENT_AGENT_HISTORY_BUDGET", config.agent.history_budget.to_string()),
        (
            "agent.max_tool_iterations",
            "QUERENT_AGENT_MAX_TOOL_ITERATIONS",
            config.agent.max_tool_iterations.to_string(),
        ),
        ("server.bind_address", "QUERENT_SERVER_BIND_ADDRESS", config.server.bind_address.clone()),
        ("server.port", "QUERENT_SERVER_PORT", config.server.port.to_string()),
        (
            "server.default_timezone",
            "QUERENT_SERVER_DEFAULT_TIMEZONE",
            config.server.default_timezone.clone(),
        ),
        (
            "server.graceful_shutdown_secs",
            "QUERENT_SERVER_GRACEFUL_SHUTDOWN_SECS",
            config.server.graceful_shutdown_secs.to_string(),
        ),
        ("logging.level", "QUERENT_LOGGING_LEVEL", config.logging.level.clone()),
        ("logging.format", "QUERENT_LOGGING_FORMAT", format!("{:?}", config.logging.format)),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("querent.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/querent.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps the rotation order visible without printing more than a suffix.
fn redact_keys(keys: &[SecretString]) -> String {
    let rendered: Vec<String> = keys.iter().map(redact_token).collect();
    format!("[{}]", rendered.join(", "))
}

fn redact_token(token: &SecretString) -> String {
    let trimmed = token.expose_secret().trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    let chars: Vec<char> = trimmed.chars().collect();
    if chars.len() <= 8 {
        return "<redacted>".to_string();
    }
    let suffix: String = chars[chars.len() - 4..].iter().collect();
    format!("***{suffix}")
}
