use calendar_bridge::api::ApiServer;
use calendar_bridge::cli::Cli;
use calendar_bridge::config::load_config;
use calendar_bridge::{AuthManager, CalendarClient};
use clap::Parser;
use tracing_appender::non_blocking::NonBlocking;
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let cli = Cli::parse();

    // Load config first to get log level
    let mut config = load_config(cli.config.as_deref()).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {}", e);
        std::process::exit(1);
    });
    if let Some(port) = cli.port {
        config.api.port = port;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

    // Set up file logging first so we can log the setup process
    let (file_writer, guard) = create_file_logger(config.log_file_path());

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(file_writer)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set global tracing subscriber");

    // Keep the guard alive to ensure log messages are flushed
    let _guard = guard;

    tracing::info!("Calendar bridge starting...");

    let auth_manager = AuthManager::new(config.oauth.clone()).unwrap_or_else(|e| {
        tracing::error!("Failed to initialize auth manager: {}", e);
        eprintln!("Failed to initialize auth manager: {}", e);
        std::process::exit(1);
    });
    let calendar_client = CalendarClient::new(auth_manager).unwrap_or_else(|e| {
        tracing::error!("Failed to initialize calendar client: {}", e);
        eprintln!("Failed to initialize calendar client: {}", e);
        std::process::exit(1);
    });

    if config.oauth.client_id.is_none() || config.oauth.client_secret.is_none() {
        tracing::warn!(
            "CLIENT_ID/CLIENT_SECRET not configured; sign-in will fail until they are set"
        );
    }

    ApiServer::new(calendar_client, config.api.clone()).start().await
}

// Create file logger
fn create_file_logger(
    log_file_path: &Option<String>,
) -> (NonBlocking, tracing_appender::non_blocking::WorkerGuard) {
    if let Some(path) = log_file_path {
        let log_path = std::path::PathBuf::from(path);
        let log_dir = log_path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(default_log_dir);

        std::fs::create_dir_all(&log_dir).expect("Failed to create log directory");

        let log_file_name = log_path
            .file_name()
            .unwrap_or(std::ffi::OsStr::new("calendar-bridge.log"));

        // Custom paths get a simple non-rotating appender
        let file_appender = tracing_appender::rolling::never(&log_dir, log_file_name);
        tracing_appender::non_blocking(file_appender)
    } else {
        let log_dir = default_log_dir();
        std::fs::create_dir_all(&log_dir).expect("Failed to create log directory");

        let file_appender = RollingFileAppender::new(
            tracing_appender::rolling::Rotation::DAILY,
            log_dir,
            "calendar-bridge.log",
        );

        tracing_appender::non_blocking(file_appender)
    }
}

fn default_log_dir() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::env::current_dir().expect("Current directory not accessible"))
        .join("calendar-bridge")
        .join("logs")
}
