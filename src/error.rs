use thiserror::Error;

/// Top-level error for the bridge binary. Every variant wraps a failure
/// `main` can actually surface; domain errors stay in `tuya::TuyaError`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Tuya(#[from] tuya::TuyaError),

    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    SetLogger(#[from] log::SetLoggerError),
}

pub type ApiResult<T> = Result<T, ApiError>;
