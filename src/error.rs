use thiserror::Error;

use crate::network::types::{Band, SecurityType};

/// Unified error type for nexus-wpas
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WpasError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unsupported security type: {0}")]
    UnsupportedSecurity(SecurityType),

    #[error("Unsupported or invalid band: {0}")]
    UnsupportedBand(Band),

    #[error("Invalid channel: {0}")]
    InvalidChannel(u8),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Interface is down: {0}")]
    InterfaceDown(String),

    #[error("Device busy: {0}")]
    Busy(String),

    #[error("Engine command failed: {0}")]
    EngineCommandFailed(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Not supported: {0}")]
    NotSupported(String),
}

pub type WpasResult<T> = Result<T, WpasError>;
