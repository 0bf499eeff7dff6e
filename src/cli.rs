use clap::Parser;
use std::path::PathBuf;

/// Calendar bridge - OAuth session manager and calendar proxy for the study
/// dashboard
#[derive(Parser)]
#[command(name = "calendar-bridge")]
#[command(about = "Serves Microsoft 365 calendar events to the study dashboard", long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Port to listen on (overrides the config file)
    #[arg(short, long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Logging level (overrides the config file)
    #[arg(short, long, value_name = "LEVEL")]
    pub log_level: Option<String>,
}
