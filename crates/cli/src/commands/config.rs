use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use demande_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

struct ConfigSource {
    document: Option<Value>,
    path: Option<PathBuf>,
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let path = detect_config_path();
    let source = ConfigSource { document: load_config_file_doc(path.as_deref()), path };

    let relay_token = config
        .notifications
        .relay_token
        .as_ref()
        .map(|token| redact_secret(token.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());

    let entries: Vec<(&str, &str, String)> = vec![
        ("database.url", "DEMANDE_DATABASE_URL", config.database.url.clone()),
        (
            "database.max_connections",
            "DEMANDE_DATABASE_MAX_CONNECTIONS",
            config.database.max_connections.to_string(),
        ),
        (
            "database.timeout_secs",
            "DEMANDE_DATABASE_TIMEOUT_SECS",
            config.database.timeout_secs.to_string(),
        ),
        ("server.bind_address", "DEMANDE_SERVER_BIND_ADDRESS", config.server.bind_address.clone()),
        ("server.port", "DEMANDE_SERVER_PORT", config.server.port.to_string()),
        (
            "server.graceful_shutdown_secs",
            "DEMANDE_SERVER_GRACEFUL_SHUTDOWN_SECS",
            config.server.graceful_shutdown_secs.to_string(),
        ),
        (
            "notifications.admin_email",
            "DEMANDE_NOTIFICATIONS_ADMIN_EMAIL",
            config.notifications.admin_email.clone(),
        ),
        (
            "notifications.from_address",
            "DEMANDE_NOTIFICATIONS_FROM_ADDRESS",
            config.notifications.from_address.clone(),
        ),
        (
            "notifications.sender",
            "DEMANDE_NOTIFICATIONS_SENDER",
            format!("{:?}", config.notifications.sender),
        ),
        (
            "notifications.relay_url",
            "DEMANDE_NOTIFICATIONS_RELAY_URL",
            config.notifications.relay_url.clone().unwrap_or_else(|| "<unset>".to_string()),
        ),
        ("notifications.relay_token", "DEMANDE_NOTIFICATIONS_RELAY_TOKEN", relay_token),
        (
            "enrollment.grant_on_approval",
            "DEMANDE_ENROLLMENT_GRANT_ON_APPROVAL",
            config.enrollment.grant_on_approval.to_string(),
        ),
        (
            "enrollment.pending_list_limit",
            "DEMANDE_ENROLLMENT_PENDING_LIST_LIMIT",
            config.enrollment.pending_list_limit.to_string(),
        ),
        ("logging.level", "DEMANDE_LOGGING_LEVEL", config.logging.level.clone()),
        ("logging.format", "DEMANDE_LOGGING_FORMAT", format!("{:?}", config.logging.format)),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(entries.into_iter().map(|(key, env_key, value)| {
        render_line(key, &value, field_source(key, env_key, &source))
    }));
    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    ["demande.toml", "config/demande.toml"]
        .into_iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(key_path: &str, env_key: &str, source: &ConfigSource) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = &source.document {
        if contains_path(doc, key_path) {
            let file_path = source
                .path
                .as_ref()
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

/// Keeps the first four characters of long secrets so operators can tell tokens apart.
fn redact_secret(secret: &str) -> String {
    let trimmed = secret.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }
    if trimmed.chars().count() < 12 {
        return "<redacted>".to_string();
    }

    let prefix: String = trimmed.chars().take(4).collect();
    format!("{prefix}***")
}

#[cfg(test)]
mod tests {
    use super::{contains_path, redact_secret};

    #[test]
    fn redaction_never_reveals_short_secrets() {
        assert_eq!(redact_secret("   "), "<empty>");
        assert_eq!(redact_secret("tiny-token"), "<redacted>");
        assert_eq!(redact_secret("relay-secret-value"), "rela***");
    }

    #[test]
    fn nested_keys_are_found_in_the_file_document() {
        let doc: toml::Value = "[enrollment]\ngrant_on_approval = true\n".parse().expect("toml");
        assert!(contains_path(&doc, "enrollment.grant_on_approval"));
        assert!(!contains_path(&doc, "enrollment.pending_list_limit"));
        assert!(!contains_path(&doc, "server.port"));
    }
}
