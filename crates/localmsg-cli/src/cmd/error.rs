use localmsg_core::app::BuildError;
use localmsg_core::config::ConfigError;
use localmsg_core::domain::OutboxError;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("cannot read config {path}: {source}")]
    ReadConfig {
        path: String,
        source: std::io::Error,
    },

    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Build(#[from] BuildError),

    #[error("{0}")]
    Outbox(#[from] OutboxError),

    #[error("{0} message(s) still pending after {1:?}")]
    NotDrained(usize, std::time::Duration),
}
