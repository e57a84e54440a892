use thiserror::Error;

use crate::modbus::protocol::exception_name;

#[derive(Error, Debug)]
pub enum ModbusError {
    #[error("No response from device")]
    NoResponse,

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Modbus exception 0x{code:02X} ({})", exception_name(*.code))]
    ProtocolException { code: u8 },

    #[error("Invalid register count: expected at least {expected}, got {actual}")]
    InvalidRegisterCount { expected: usize, actual: usize },

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Communication error: {0}")]
    CommunicationError(String),

    #[error("Timeout occurred")]
    Timeout,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl ModbusError {
    /// True for failures raised while moving bytes, as opposed to failures
    /// in the content of a frame that did arrive.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ModbusError::ConnectionError(_)
                | ModbusError::CommunicationError(_)
                | ModbusError::Timeout
        )
    }

    /// Short stable label used for per-kind statistics.
    pub fn kind(&self) -> &'static str {
        match self {
            ModbusError::NoResponse => "no_response",
            ModbusError::MalformedResponse(_) => "malformed_response",
            ModbusError::ProtocolException { .. } => "protocol_exception",
            ModbusError::InvalidRegisterCount { .. } => "invalid_register_count",
            ModbusError::ConnectionError(_) => "connection",
            ModbusError::CommunicationError(_) => "communication",
            ModbusError::Timeout => "timeout",
            ModbusError::ConfigError(_) => "config",
            ModbusError::SerializationError(_) => "serialization",
        }
    }
}

impl From<serde_json::Error> for ModbusError {
    fn from(err: serde_json::Error) -> Self {
        ModbusError::SerializationError(format!("JSON error: {}", err))
    }
}

impl From<std::io::Error> for ModbusError {
    fn from(err: std::io::Error) -> Self {
        ModbusError::CommunicationError(format!("IO error: {}", err))
    }
}

impl From<tokio::time::error::Elapsed> for ModbusError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        ModbusError::Timeout
    }
}

impl From<toml::de::Error> for ModbusError {
    fn from(err: toml::de::Error) -> Self {
        ModbusError::ConfigError(format!("TOML parse error: {}", err))
    }
}

impl From<toml::ser::Error> for ModbusError {
    fn from(err: toml::ser::Error) -> Self {
        ModbusError::ConfigError(format!("TOML write error: {}", err))
    }
}
