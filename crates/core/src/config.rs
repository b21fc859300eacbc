use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::workflow::WorkflowSettings;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub notifications: NotificationsConfig,
    pub enrollment: EnrollmentConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct NotificationsConfig {
    pub admin_email: String,
    pub from_address: String,
    pub sender: SenderKind,
    pub relay_url: Option<String>,
    pub relay_token: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct EnrollmentConfig {
    /// Grant the requested grades to the student when a request is approved.
    pub grant_on_approval: bool,
    pub pending_list_limit: u32,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderKind {
    Log,
    Http,
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
    pub server_port: Option<u16>,
    pub notification_sender: Option<SenderKind>,
    pub grant_on_approval: Option<bool>,
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
                url: "sqlite://demande.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            notifications: NotificationsConfig {
                admin_email: "admin@localhost".to_string(),
                from_address: "no-reply@localhost".to_string(),
                sender: SenderKind::Log,
                relay_url: None,
                relay_token: None,
            },
            enrollment: EnrollmentConfig { grant_on_approval: false, pending_list_limit: 50 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for SenderKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "log" => Ok(Self::Log),
            "http" => Ok(Self::Http),
            other => Err(ConfigError::Validation(format!(
                "unsupported notification sender `{other}` (expected log|http)"
            ))),
        }
    }
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("demande.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn workflow_settings(&self) -> WorkflowSettings {
        WorkflowSettings {
            admin_email: self.notifications.admin_email.clone(),
            grant_on_approval: self.enrollment.grant_on_approval,
            pending_list_limit: self.enrollment.pending_list_limit,
        }
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

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(notifications) = patch.notifications {
            if let Some(admin_email) = notifications.admin_email {
                self.notifications.admin_email = admin_email;
            }
            if let Some(from_address) = notifications.from_address {
                self.notifications.from_address = from_address;
            }
            if let Some(sender) = notifications.sender {
                self.notifications.sender = sender;
            }
            if let Some(relay_url) = notifications.relay_url {
                self.notifications.relay_url = Some(relay_url);
            }
            if let Some(relay_token) = notifications.relay_token {
                self.notifications.relay_token = Some(relay_token.into());
            }
        }

        if let Some(enrollment) = patch.enrollment {
            if let Some(grant_on_approval) = enrollment.grant_on_approval {
                self.enrollment.grant_on_approval = grant_on_approval;
            }
            if let Some(pending_list_limit) = enrollment.pending_list_limit {
                self.enrollment.pending_list_limit = pending_list_limit;
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
        if let Some(value) = read_env("DEMANDE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("DEMANDE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("DEMANDE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("DEMANDE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("DEMANDE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("DEMANDE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("DEMANDE_SERVER_PORT") {
            self.server.port = parse_u16("DEMANDE_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("DEMANDE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("DEMANDE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("DEMANDE_NOTIFICATIONS_ADMIN_EMAIL") {
            self.notifications.admin_email = value;
        }
        if let Some(value) = read_env("DEMANDE_NOTIFICATIONS_FROM_ADDRESS") {
            self.notifications.from_address = value;
        }
        if let Some(value) = read_env("DEMANDE_NOTIFICATIONS_SENDER") {
            self.notifications.sender = value.parse()?;
        }
        if let Some(value) = read_env("DEMANDE_NOTIFICATIONS_RELAY_URL") {
            self.notifications.relay_url = Some(value);
        }
        if let Some(value) = read_env("DEMANDE_NOTIFICATIONS_RELAY_TOKEN") {
            self.notifications.relay_token = Some(value.into());
        }

        if let Some(value) = read_env("DEMANDE_ENROLLMENT_GRANT_ON_APPROVAL") {
            self.enrollment.grant_on_approval =
                parse_bool("DEMANDE_ENROLLMENT_GRANT_ON_APPROVAL", &value)?;
        }
        if let Some(value) = read_env("DEMANDE_ENROLLMENT_PENDING_LIST_LIMIT") {
            self.enrollment.pending_list_limit =
                parse_u32("DEMANDE_ENROLLMENT_PENDING_LIST_LIMIT", &value)?;
        }

        let log_level =
            read_env("DEMANDE_LOGGING_LEVEL").or_else(|| read_env("DEMANDE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("DEMANDE_LOGGING_FORMAT").or_else(|| read_env("DEMANDE_LOG_FORMAT"));
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
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(sender) = overrides.notification_sender {
            self.notifications.sender = sender;
        }
        if let Some(grant_on_approval) = overrides.grant_on_approval {
            self.enrollment.grant_on_approval = grant_on_approval;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_notifications(&self.notifications)?;
        validate_enrollment(&self.enrollment)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("demande.toml"), PathBuf::from("config/demande.toml")]
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

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_notifications(notifications: &NotificationsConfig) -> Result<(), ConfigError> {
    if !looks_like_email(&notifications.admin_email) {
        return Err(ConfigError::Validation(
            "notifications.admin_email must be an email address".to_string(),
        ));
    }
    if !looks_like_email(&notifications.from_address) {
        return Err(ConfigError::Validation(
            "notifications.from_address must be an email address".to_string(),
        ));
    }

    if notifications.sender == SenderKind::Http {
        let Some(relay_url) = notifications.relay_url.as_deref() else {
            return Err(ConfigError::Validation(
                "notifications.relay_url is required when notifications.sender = \"http\""
                    .to_string(),
            ));
        };
        if !relay_url.starts_with("http://") && !relay_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "notifications.relay_url must start with http:// or https://".to_string(),
            ));
        }
        let blank_token = notifications
            .relay_token
            .as_ref()
            .map(|token| token.expose_secret().trim().is_empty())
            .unwrap_or(false);
        if blank_token {
            return Err(ConfigError::Validation(
                "notifications.relay_token must not be blank when set".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_enrollment(enrollment: &EnrollmentConfig) -> Result<(), ConfigError> {
    if enrollment.pending_list_limit == 0 || enrollment.pending_list_limit > 500 {
        return Err(ConfigError::Validation(
            "enrollment.pending_list_limit must be in range 1..=500".to_string(),
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

fn looks_like_email(value: &str) -> bool {
    let value = value.trim();
    match value.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty(),
        None => false,
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

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.trim().to_ascii_lowercase().parse::<bool>().map_err(|_| {
        ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    notifications: Option<NotificationsPatch>,
    enrollment: Option<EnrollmentPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct NotificationsPatch {
    admin_email: Option<String>,
    from_address: Option<String>,
    sender: Option<SenderKind>,
    relay_url: Option<String>,
    relay_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct EnrollmentPatch {
    grant_on_approval: Option<bool>,
    pending_list_limit: Option<u32>,
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

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat, SenderKind};

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
    fn defaults_are_valid_and_keep_granting_off() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(!config.enrollment.grant_on_approval, "grant_on_approval should default to false")?;
        ensure(config.notifications.sender == SenderKind::Log, "log sender should be default")?;
        ensure(
            matches!(config.logging.format, LogFormat::Compact),
            "default logging format should be compact",
        )?;

        let settings = config.workflow_settings();
        ensure(settings.pending_list_limit == 50, "pending list limit should flow into settings")
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_DEMANDE_RELAY_TOKEN", "relay-token-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("demande.toml");
            fs::write(
                &path,
                r#"
[notifications]
sender = "http"
relay_url = "https://relay.example.test/send"
relay_token = "${TEST_DEMANDE_RELAY_TOKEN}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            let token = config
                .notifications
                .relay_token
                .as_ref()
                .map(|token| token.expose_secret().to_string())
                .unwrap_or_default();
            ensure(token == "relay-token-from-env", "relay token should come from environment")?;
            ensure(config.notifications.sender == SenderKind::Http, "sender should be http")
        })();

        clear_vars(&["TEST_DEMANDE_RELAY_TOKEN"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("DEMANDE_LOG_LEVEL", "warn");
        env::set_var("DEMANDE_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )
        })();

        clear_vars(&["DEMANDE_LOG_LEVEL", "DEMANDE_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("DEMANDE_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("DEMANDE_ENROLLMENT_GRANT_ON_APPROVAL", "true");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("demande.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[enrollment]
grant_on_approval = false
pending_list_limit = 20

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
            ensure(config.enrollment.grant_on_approval, "env should win over the file")?;
            ensure(config.enrollment.pending_list_limit == 20, "file value should beat default")
        })();

        clear_vars(&["DEMANDE_DATABASE_URL", "DEMANDE_ENROLLMENT_GRANT_ON_APPROVAL"]);
        result
    }

    #[test]
    fn http_sender_without_relay_url_fails_validation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("DEMANDE_NOTIFICATIONS_SENDER", "http");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("relay_url")
            );
            ensure(has_message, "validation failure should mention relay_url")
        })();

        clear_vars(&["DEMANDE_NOTIFICATIONS_SENDER"]);
        result
    }

    #[test]
    fn malformed_numeric_env_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("DEMANDE_SERVER_PORT", "eighty");

        let result = match AppConfig::load(LoadOptions::default()) {
            Err(ConfigError::InvalidEnvOverride { key, .. }) => {
                ensure(key == "DEMANDE_SERVER_PORT", "error should name the offending variable")
            }
            Err(other) => Err(format!("unexpected error: {other}")),
            Ok(_) => Err("expected invalid env override".to_string()),
        };

        clear_vars(&["DEMANDE_SERVER_PORT"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("DEMANDE_NOTIFICATIONS_RELAY_TOKEN", "relay-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("relay-secret-value"),
                "debug output should not contain the relay token",
            )
        })();

        clear_vars(&["DEMANDE_NOTIFICATIONS_RELAY_TOKEN"]);
        result
    }
}
