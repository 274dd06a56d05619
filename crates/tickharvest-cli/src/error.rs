use thiserror::Error;

use tickharvest_core::CoreError;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] tickharvest_core::ValidationError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("command error: {0}")]
    Command(String),

    #[error("logging setup failed: {0}")]
    Logging(String),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) | Self::Command(_) | Self::Logging(_) => 2,
            Self::Core(error) => match error {
                CoreError::Serialization(_) => 4,
                CoreError::Io(_) => 10,
                CoreError::Validation(_)
                | CoreError::NoSources
                | CoreError::NoSymbols
                | CoreError::InvalidConfig(_) => 2,
            },
            Self::Serialization(_) => 4,
            Self::Io(_) => 10,
        }
    }
}
