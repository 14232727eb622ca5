//! Error handling for the ferrosnmp engine

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("BER decoding error: {0}")]
    Decode(String),

    #[error("BER encoding error: {0}")]
    Encode(String),

    #[error("Message processing error: {0}")]
    MessageProcessing(String),

    #[error("Security error: {0}")]
    Security(String),

    #[error("Access control error: {0}")]
    AccessControl(String),

    #[error("Dispatcher error: {0}")]
    Dispatch(String),

    #[error("MIB error: {0}")]
    Mib(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        Self::Transport(msg.into())
    }

    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::Decode(msg.into())
    }

    pub fn encode<S: Into<String>>(msg: S) -> Self {
        Self::Encode(msg.into())
    }

    pub fn message_processing<S: Into<String>>(msg: S) -> Self {
        Self::MessageProcessing(msg.into())
    }

    pub fn security<S: Into<String>>(msg: S) -> Self {
        Self::Security(msg.into())
    }

    pub fn access_control<S: Into<String>>(msg: S) -> Self {
        Self::AccessControl(msg.into())
    }

    pub fn dispatch<S: Into<String>>(msg: S) -> Self {
        Self::Dispatch(msg.into())
    }

    pub fn mib<S: Into<String>>(msg: S) -> Self {
        Self::Mib(msg.into())
    }

    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn invalid_state<S: Into<String>>(msg: S) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn not_supported<S: Into<String>>(msg: S) -> Self {
        Self::NotSupported(msg.into())
    }

    pub fn parse<S: Into<String>>(msg: S) -> Self {
        Self::Parse(msg.into())
    }

    pub fn protocol<S: Into<String>>(msg: S) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }
}

/// Out-of-band error indications delivered to application callbacks and
/// carried in status information (RFC 3412 terminology).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorIndication {
    RequestTimedOut,
    EngineShutdown,
    TransportError,
    TooBig,
    UnsupportedMsgProcessingModel,
    UnknownSecurityModel,
    UnsupportedSecurityLevel,
    NotInTimeWindow,
    UnknownUserName,
    UnknownEngineId,
    WrongDigest,
    DecryptionError,
    UnknownCommunityName,
    UnknownPduHandler,
    UnknownContext,
    ReportPduReceived,
}

impl std::fmt::Display for ErrorIndication {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::RequestTimedOut => "requestTimedOut",
            Self::EngineShutdown => "engineShutdown",
            Self::TransportError => "transportError",
            Self::TooBig => "tooBig",
            Self::UnsupportedMsgProcessingModel => "unsupportedMsgProcessingModel",
            Self::UnknownSecurityModel => "unknownSecurityModel",
            Self::UnsupportedSecurityLevel => "unsupportedSecurityLevel",
            Self::NotInTimeWindow => "notInTimeWindow",
            Self::UnknownUserName => "unknownUserName",
            Self::UnknownEngineId => "unknownEngineID",
            Self::WrongDigest => "wrongDigest",
            Self::DecryptionError => "decryptionError",
            Self::UnknownCommunityName => "unknownCommunityName",
            Self::UnknownPduHandler => "unknownPduHandler",
            Self::UnknownContext => "unknownContext",
            Self::ReportPduReceived => "reportPduReceived",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_constructors() {
        let err = Error::security("bad digest");
        assert!(matches!(err, Error::Security(_)));
        assert_eq!(err.to_string(), "Security error: bad digest");
    }

    #[test]
    fn test_error_indication_names() {
        assert_eq!(ErrorIndication::RequestTimedOut.to_string(), "requestTimedOut");
        assert_eq!(ErrorIndication::UnknownEngineId.to_string(), "unknownEngineID");
    }
}
