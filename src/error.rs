//! Error types for cellbot-io

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// cellbot-io error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Serial port error
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// No paired device matched the requested identity
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Malformed hardware address
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Socket could not be opened
    #[error("Connection failed: {0}")]
    ConnectFailed(String),

    /// Operation requires an open link
    #[error("Not connected")]
    NotConnected,

    /// Registry has no backend for this label
    #[error("Unknown controller: {0}")]
    UnknownController(String),

    /// Operation not supported by this adapter or backend
    #[error("Operation not supported: {0}")]
    NotSupported(String),

    /// Mutex poisoned
    #[error("Mutex poisoned")]
    MutexPoisoned,

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
