use thiserror::Error;

use crate::{config::LoadError, infra::error::InfraError};

/// Fatal errors surfaced by the binary. Request handling never produces one.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("failed to load configuration: {0}")]
    Config(#[from] LoadError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infra_errors_are_transparent() {
        let err = AppError::from(InfraError::configuration("bad upstream"));
        assert_eq!(err.to_string(), "configuration error: bad upstream");
    }

    #[test]
    fn io_errors_convert_through_infra() {
        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "port taken");
        let err = AppError::from(InfraError::from(io));
        assert!(matches!(err, AppError::Infra(InfraError::Io(_))));
    }
}
