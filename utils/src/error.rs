use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Logger setup failed: {0}")]
    SetLogger(#[from] log::SetLoggerError),

    #[error("Configuration lock poisoned: {0}")]
    Poison(String),

    #[error("{0}")]
    Command(String),

    /// The command failed and its cause has already been logged.
    #[error("{0} failed")]
    Failed(&'static str),
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Error::Poison(err.to_string())
    }
}
