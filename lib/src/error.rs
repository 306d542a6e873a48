use crate::crypto::CryptoError;

/// Failures of the JSON envelope codec and of the tunnel plaintext it carries.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ProtoError {
    #[error("unknown event {0:?}")]
    UnknownEvent(String),
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),
    #[error("malformed tunnel payload: {0}")]
    MalformedPayload(String),
    #[error("could not encode: {0}")]
    EncodeFailed(String),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Protocol error: {0}")]
    Proto(#[from] ProtoError),
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),
}
