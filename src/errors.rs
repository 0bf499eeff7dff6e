use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Authentication-layer errors
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Calendar fetch errors
    #[error("Calendar error: {0}")]
    Calendar(#[from] CalendarError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Generic errors
    #[error("{message}")]
    Generic { message: String },
}

/// Authentication-layer errors
#[derive(Error, Debug)]
pub enum AuthError {
    /// Required OAuth client settings are absent from the deployment config
    #[error("Missing configuration: {reason}")]
    MissingConfiguration { reason: String },

    /// The authority rejected the authorization-code exchange
    #[error("Authorization code exchange failed: {message}")]
    ExchangeFailed { message: String },

    /// No token state exists; the user has never signed in (or was signed out)
    #[error("User not authenticated. Please sign in first.")]
    NotAuthenticated,

    /// Token state exists but carries no refresh token; only a full
    /// interactive sign-in can recover
    #[error("No refresh token available. User needs to sign in again.")]
    NoRefreshToken,

    /// The authority rejected the refresh grant; token state has been cleared
    #[error("Token refresh failed: {message}")]
    RefreshFailed { message: String },

    /// HTTP transport error
    #[error("Request error: {source}")]
    RequestError {
        #[source]
        source: reqwest::Error,
    },

    /// JSON parse error
    #[error("JSON parsing error: {source}")]
    JsonError {
        #[source]
        source: serde_json::Error,
    },
}

/// Calendar fetch errors
#[derive(Error, Debug)]
pub enum CalendarError {
    /// Authentication-layer failure while obtaining a token
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// The upstream rejected our token even after one refresh-and-retry
    #[error("Authentication expired. Please sign in again.")]
    AuthenticationExpired,

    /// The requested window has start after end
    #[error("Invalid window: start {start} is after end {end}")]
    InvalidWindow {
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
    },

    /// The requested horizon cannot be represented as a date range
    #[error("Invalid horizon: {days} days")]
    InvalidHorizon { days: i64 },

    /// Upstream calendar API failure unrelated to authentication
    #[error("Upstream calendar API error: {status} {message}")]
    Upstream { status: u16, message: String },

    /// HTTP transport error
    #[error("Request error: {source}")]
    RequestError {
        #[source]
        source: reqwest::Error,
    },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file read error
    #[error("Failed to load config file: {source}")]
    LoadError {
        #[source]
        source: std::io::Error,
    },

    /// Config file parse error
    #[error("Failed to parse config file: {source}")]
    ParseError {
        #[source]
        source: toml::de::Error,
    },

    /// Generic configuration error
    #[error("{message}")]
    Generic { message: String },
}

impl From<reqwest::Error> for AuthError {
    fn from(error: reqwest::Error) -> Self {
        AuthError::RequestError { source: error }
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(error: serde_json::Error) -> Self {
        AuthError::JsonError { source: error }
    }
}

impl From<reqwest::Error> for CalendarError {
    fn from(error: reqwest::Error) -> Self {
        CalendarError::RequestError { source: error }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(error: std::io::Error) -> Self {
        ConfigError::LoadError { source: error }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(error: toml::de::Error) -> Self {
        ConfigError::ParseError { source: error }
    }
}
