use thiserror::Error;
use voicechat_protocol::ProtocolError;

/// Errors surfaced by the voice chat client.
#[derive(Error, Debug)]
pub enum SdkError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("not connected to a voice server")]
    NotConnected,

    #[error("an audio stream is already active")]
    StreamAlreadyActive,

    #[error("no group named {0:?}")]
    GroupNotFound(String),

    #[error("encoder error: {0}")]
    Encoder(String),

    #[error("transcode error: {0}")]
    Transcode(String),

    #[error("host channel error: {0}")]
    Channel(String),

    #[error("session task has stopped")]
    Disconnected,

    #[error("lock poisoned")]
    LockError,
}
