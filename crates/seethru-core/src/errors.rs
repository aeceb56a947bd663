use thiserror::Error;

#[derive(Error, Debug)]
pub enum SeethruError {
    #[error("Configuration invalid: {reason}")]
    ConfigurationInvalid { reason: String },

    #[error("Session already running")]
    AlreadyRunning,

    #[error("No free session port found after {attempts} attempts")]
    NoFreePort { attempts: u32 },

    #[error("Stream source failed: {reason}")]
    StreamSource { reason: String },

    #[error("Message error: {0}")]
    Message(#[from] MessageError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum MessageError {
    #[error("Failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to decode message: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Datagram too large: {len} bytes (max {max})")]
    Oversize { len: usize, max: usize },

    #[error("Invalid sender address: {value:?}")]
    InvalidSender { value: String },
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Send to {dest} failed: {reason}")]
    SendFailed { dest: String, reason: String },

    #[error("Receive failed: {reason}")]
    ReceiveFailed { reason: String },

    #[error("Malformed datagram from {from}: {source}")]
    Malformed {
        from: String,
        #[source]
        source: MessageError,
    },

    #[error("Transport closed")]
    Closed,
}
