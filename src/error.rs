//! Error types for the base driver

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Base driver error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Serial port error
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Could not open the device after the configured retry budget
    #[error("Connection failed after {attempts} attempts: {last_error}")]
    ConnectFailed {
        /// Number of open attempts made
        attempts: u32,
        /// Error from the final attempt
        last_error: String,
    },

    /// No valid packet arrived within the handshake window
    #[error("Handshake timeout: no valid packet within {0:?}")]
    HandshakeTimeout(std::time::Duration),

    /// Frame failed XOR validation
    #[error("Checksum mismatch: running XOR {residue:#04x} (expected 0)")]
    ChecksumMismatch {
        /// Residue of the XOR over the covered span (zero for a valid frame)
        residue: u8,
    },

    /// Frame carried a type tag outside the known set
    #[error("Unknown packet type: {0:#04x}")]
    UnknownPacketType(u8),

    /// Payload shorter than the fixed layout for its type
    #[error("Truncated payload for type {tag:#04x}: got {got} bytes, need {need}")]
    TruncatedPayload {
        /// Type tag of the offending frame
        tag: u8,
        /// Bytes present
        got: usize,
        /// Bytes required by the layout
        need: usize,
    },

    /// Command issued in a state that does not accept it
    #[error("Command rejected: {0}")]
    CommandRejected(&'static str),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// A driver thread panicked
    #[error("Driver thread panicked")]
    ThreadPanic,

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Other(format!("TOML parse error: {e}"))
    }
}

impl From<toml::ser::Error> for Error {
    fn from(e: toml::ser::Error) -> Self {
        Error::Other(format!("TOML serialize error: {e}"))
    }
}
