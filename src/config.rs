use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Environment variable that overrides `notifications.api_key`.
pub const EMAIL_API_KEY_ENV: &str = "STAFFDESK_EMAIL_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub security: SecurityConfig,

    pub observability: ObservabilityConfig,

    pub notifications: NotificationConfig,

    pub housekeeping: HousekeepingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Argon2 memory cost in KiB (default: 8192 = 8MB)
    pub argon2_memory_cost_kib: u32,

    /// Argon2 time cost (iterations)
    pub argon2_time_cost: u32,

    pub argon2_parallelism: u32,

    /// Lifetime of a bearer session issued by the identity provider.
    pub session_ttl_minutes: i64,

    /// Minimum accepted password length for sign-up and password changes.
    pub min_password_length: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            argon2_memory_cost_kib: 8192,
            argon2_time_cost: 3,
            argon2_parallelism: 1,
            session_ttl_minutes: 60 * 12,
            min_password_length: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,

    pub loki_enabled: bool,

    pub loki_url: String,

    pub loki_labels: std::collections::HashMap<String, String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        let mut labels = std::collections::HashMap::new();
        labels.insert("app".to_string(), "staffdesk".to_string());

        Self {
            metrics_enabled: true,
            loki_enabled: false,
            loki_url: "http://localhost:3100".to_string(),
            loki_labels: labels,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,

    pub cors_allowed_origins: Vec<String>,

    /// Whether to set the Secure flag on session cookies.
    /// Set to false for local development without HTTPS.
    pub secure_cookies: bool,

    /// Inactivity timeout of the browser session cookie.
    pub session_inactivity_minutes: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8787,
            cors_allowed_origins: vec![
                "http://localhost:5173".to_string(),
                "http://127.0.0.1:5173".to_string(),
            ],
            secure_cookies: true,
            session_inactivity_minutes: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_path: String,

    pub log_level: String,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,

    pub max_db_connections: u32,

    pub min_db_connections: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: "sqlite:data/staffdesk.db".to_string(),
            log_level: "info".to_string(),
            worker_threads: 2,
            max_db_connections: 5,
            min_db_connections: 1,
        }
    }
}

/// Outgoing email relay used by the contact form and approval notices.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,

    /// Provider endpoint accepting `{from, to, subject, html}` JSON.
    pub api_url: String,

    #[serde(skip_serializing)]
    pub api_key: String,

    pub from_address: String,

    pub contact_recipients: Vec<String>,

    /// Who hears about new accounts waiting for approval.
    pub approval_recipients: Vec<String>,

    pub request_timeout_seconds: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: "https://api.resend.com/emails".to_string(),
            api_key: String::new(),
            from_address: "Hôpital <noreply@example.org>".to_string(),
            contact_recipients: vec![],
            approval_recipients: vec![],
            request_timeout_seconds: 15,
        }
    }
}

/// Periodic cleanup of expired bearer sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HousekeepingConfig {
    pub enabled: bool,

    pub session_prune_interval_minutes: u32,

    /// Six-field cron expression; takes precedence over the interval.
    pub cron_expression: Option<String>,
}

impl Default for HousekeepingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            session_prune_interval_minutes: 30,
            cron_expression: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            server: ServerConfig::default(),
            security: SecurityConfig::default(),
            observability: ObservabilityConfig::default(),
            notifications: NotificationConfig::default(),
            housekeeping: HousekeepingConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let paths = Self::config_paths();

        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                let mut config = Self::load_from_path(path)?;
                config.apply_env();
                return Ok(config);
            }
        }

        info!("No config file found, using defaults");
        let mut config = Self::default();
        config.apply_env();
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Secrets live in the environment (or `.env`), not in `config.toml`.
    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var(EMAIL_API_KEY_ENV)
            && !key.trim().is_empty()
        {
            self.notifications.api_key = key.trim().to_string();
        }
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![];

        paths.push(PathBuf::from("config.toml"));

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("staffdesk").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".staffdesk").join("config.toml"));
        }

        paths
    }

    fn default_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    pub fn create_default_if_missing() -> Result<bool> {
        let path = Self::default_config_path();
        if path.exists() {
            Ok(false)
        } else {
            let config = Self::default();
            config.save_to_path(&path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.security.session_ttl_minutes <= 0 {
            anyhow::bail!("security.session_ttl_minutes must be > 0");
        }

        if self.security.min_password_length < 6 {
            anyhow::bail!("security.min_password_length must be at least 6");
        }

        if self.housekeeping.enabled
            && self.housekeeping.session_prune_interval_minutes == 0
            && self.housekeeping.cron_expression.is_none()
        {
            anyhow::bail!(
                "housekeeping.session_prune_interval_minutes must be > 0 or cron_expression must be set"
            );
        }

        if self.notifications.enabled {
            if self.notifications.api_url.is_empty() {
                anyhow::bail!("notifications.api_url cannot be empty when enabled");
            }
            if self.notifications.api_key.is_empty() {
                anyhow::bail!(
                    "notifications.api_key (or {EMAIL_API_KEY_ENV}) must be set when enabled"
                );
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 8787);
        assert_eq!(config.security.min_password_length, 8);
        assert!(!config.notifications.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization_hides_api_key() {
        let mut config = Config::default();
        config.notifications.api_key = "re_secret".to_string();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[notifications]"));
        assert!(!toml_str.contains("re_secret"));
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [general]
            log_level = "debug"

            [notifications]
            contact_recipients = ["accueil@example.org"]
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.notifications.contact_recipients.len(), 1);
        assert_eq!(config.server.port, 8787);
    }

    #[test]
    fn test_housekeeping_needs_a_schedule() {
        let mut config = Config::default();
        config.housekeeping.session_prune_interval_minutes = 0;
        assert!(config.validate().is_err());

        config.housekeeping.cron_expression = Some("0 */10 * * * *".to_string());
        assert!(config.validate().is_ok());

        config.housekeeping.cron_expression = None;
        config.housekeeping.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_enabled_relay_requires_key() {
        let mut config = Config::default();
        config.notifications.enabled = true;
        assert!(config.validate().is_err());

        config.notifications.api_key = "key".to_string();
        assert!(config.validate().is_ok());
    }
}
