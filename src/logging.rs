use thiserror::Error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("Failed to install subscriber: {0}")]
    Install(String),
}

/// Installs a global fmt subscriber filtered at `level` (e.g. `"info"`,
/// `"scruper=debug"`). Noisy dependencies are held at `warn`.
///
/// Returns an error instead of panicking if a subscriber is already set.
pub fn init_logging(level: &str) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_new(format!("{level},sqlx=warn,reqwest=warn,hyper=warn"))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .try_init()
        .map_err(|e| LoggingError::Install(e.to_string()))
}
