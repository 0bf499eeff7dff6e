use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::ConfigError;

/// OAuth client settings for the Microsoft identity platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    /// Application (client) ID registered with the authority
    #[serde(default)]
    pub client_id: Option<String>,

    /// Client secret for the confidential client
    #[serde(default)]
    pub client_secret: Option<String>,

    /// Tenant selector ("common" supports personal and work accounts)
    #[serde(default = "default_tenant")]
    pub tenant: String,

    /// Redirect URI registered for the authorization-code flow
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,

    /// Authority base URL (overridable so tests can point at a mock server)
    #[serde(default = "default_authority_base_url")]
    pub authority_base_url: String,

    /// Microsoft Graph base URL (overridable for tests)
    #[serde(default = "default_graph_base_url")]
    pub graph_base_url: String,

    /// Scopes requested on every grant
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
}

fn default_tenant() -> String {
    "common".to_string()
}

fn default_redirect_uri() -> String {
    "http://localhost:5000/oauth/callback".to_string()
}

fn default_authority_base_url() -> String {
    "https://login.microsoftonline.com".to_string()
}

fn default_graph_base_url() -> String {
    "https://graph.microsoft.com/v1.0".to_string()
}

fn default_scopes() -> Vec<String> {
    vec![
        "Calendars.Read".to_string(),
        "User.Read".to_string(),
        "offline_access".to_string(),
    ]
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            tenant: default_tenant(),
            redirect_uri: default_redirect_uri(),
            authority_base_url: default_authority_base_url(),
            graph_base_url: default_graph_base_url(),
            scopes: default_scopes(),
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Port the JSON API listens on
    #[serde(default = "default_api_port")]
    pub port: u16,

    /// Frontend URL the OAuth callback page redirects to after sign-in
    #[serde(default = "default_frontend_url")]
    pub frontend_url: String,
}

fn default_api_port() -> u16 {
    5000
}

fn default_frontend_url() -> String {
    "http://localhost:5173/calendar".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_api_port(),
            frontend_url: default_frontend_url(),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (default: info)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (default: logs/calendar-bridge.log under the data dir)
    #[serde(default)]
    pub file_path: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_path: None,
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// OAuth client settings
    #[serde(default)]
    pub oauth: OAuthConfig,

    /// HTTP server settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    pub fn log_level(&self) -> &str {
        &self.logging.level
    }

    pub fn log_file_path(&self) -> &Option<String> {
        &self.logging.file_path
    }

    /// Apply environment overrides for the deployment secrets. Values win
    /// over anything read from the config file.
    pub fn apply_env_overrides(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(client_id) = get("CLIENT_ID") {
            self.oauth.client_id = Some(client_id);
        }
        if let Some(client_secret) = get("CLIENT_SECRET") {
            self.oauth.client_secret = Some(client_secret);
        }
        if let Some(tenant) = get("TENANT_ID") {
            self.oauth.tenant = tenant;
        }
        if let Some(redirect_uri) = get("REDIRECT_URI") {
            self.oauth.redirect_uri = redirect_uri;
        }
    }
}

/// Default config file location
fn config_file_path() -> PathBuf {
    let mut path = dirs::config_dir()
        .unwrap_or_else(|| std::env::current_dir().expect("Current directory not accessible"));
    path.push("calendar-bridge");
    path.push("config.toml");
    path
}

/// Load configuration from an explicit path, or from the default location.
/// A missing file yields defaults; env vars override either way.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let config_path = path.map(Path::to_path_buf).unwrap_or_else(config_file_path);

    let mut config = if config_path.exists() {
        let contents = fs::read_to_string(config_path)?;
        toml::from_str(&contents)?
    } else {
        Config::default()
    };

    config.apply_env_overrides(|key| std::env::var(key).ok());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.oauth.tenant, "common");
        assert_eq!(config.oauth.client_id, None);
        assert_eq!(config.oauth.client_secret, None);
        assert_eq!(
            config.oauth.authority_base_url,
            "https://login.microsoftonline.com"
        );
        assert_eq!(config.oauth.graph_base_url, "https://graph.microsoft.com/v1.0");
        assert_eq!(
            config.oauth.scopes,
            vec!["Calendars.Read", "User.Read", "offline_access"]
        );
        assert_eq!(config.api.port, 5000);
        assert_eq!(config.log_level(), "info");
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let toml_str = r#"
            [oauth]
            client_id = "app-123"
            tenant = "contoso"
            [api]
            port = 8081
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.oauth.client_id, Some("app-123".to_string()));
        assert_eq!(config.oauth.tenant, "contoso");
        assert_eq!(config.oauth.redirect_uri, "http://localhost:5000/oauth/callback");
        assert_eq!(config.api.port, 8081);
        assert_eq!(config.api.frontend_url, "http://localhost:5173/calendar");
    }

    #[test]
    fn test_env_overrides_win_over_file_values() {
        let toml_str = r#"
            [oauth]
            client_id = "from-file"
            tenant = "from-file"
        "#;
        let mut config: Config = toml::from_str(toml_str).unwrap();
        config.apply_env_overrides(|key| match key {
            "CLIENT_ID" => Some("from-env".to_string()),
            "CLIENT_SECRET" => Some("secret-from-env".to_string()),
            _ => None,
        });

        assert_eq!(config.oauth.client_id, Some("from-env".to_string()));
        assert_eq!(config.oauth.client_secret, Some("secret-from-env".to_string()));
        // TENANT_ID not set in the environment, file value stays
        assert_eq!(config.oauth.tenant, "from-file");
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [oauth]
            client_id = "file-client"
            [logging]
            level = "debug"
            "#
        )
        .unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.log_level(), "debug");
        // client_id comes from the file unless CLIENT_ID is set in the env
        if std::env::var("CLIENT_ID").is_err() {
            assert_eq!(config.oauth.client_id, Some("file-client".to_string()));
        }
    }

    #[test]
    fn test_load_config_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(Some(&dir.path().join("nope.toml"))).unwrap();
        assert_eq!(config.api.port, 5000);
    }

    #[test]
    fn test_load_config_rejects_bad_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "this is not toml [[").unwrap();

        let result = load_config(Some(file.path()));
        assert!(matches!(result, Err(ConfigError::ParseError { .. })));
    }
}
