use thiserror::Error;

/// Errors produced by the plume routing and transport core.
#[derive(Debug, Error)]
pub enum PlumeError {
    #[error("client already connected")]
    AlreadyConnected,

    #[error("client not connected")]
    NotConnected,

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("remote side closed the channel")]
    RemoteClosed,

    #[error("body decode error: {0}")]
    Decode(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("token error: {0}")]
    Token(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("dispatch failed: {0}")]
    Dispatch(String),

    #[error("timeout")]
    Timeout,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ciborium::de::Error<std::io::Error>> for PlumeError {
    fn from(e: ciborium::de::Error<std::io::Error>) -> Self {
        PlumeError::Codec(e.to_string())
    }
}

impl From<ciborium::ser::Error<std::io::Error>> for PlumeError {
    fn from(e: ciborium::ser::Error<std::io::Error>) -> Self {
        PlumeError::Codec(e.to_string())
    }
}

pub type PlumeResult<T> = Result<T, PlumeError>;
