pub mod api;
pub mod auth_manager;
pub mod cli;
pub mod config;
pub mod errors;
pub mod graph_client;
pub mod models;

pub use api::{ApiServer, configure_routes};
pub use auth_manager::AuthManager;
pub use config::{Config, load_config};
pub use errors::{AppError, AuthError, CalendarError, ConfigError};
pub use graph_client::CalendarClient;
pub use models::{Account, CalendarEvent, TokenState};
