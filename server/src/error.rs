use stagelink::{
    api::ErrorReason,
    crypto::CryptoError,
    error::ProtoError,
    identifiers::MemberId,
};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("ProtoError: {0}")]
    Proto(#[from] ProtoError),
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(CryptoError),
    #[error("Member {0:?} already joined with an open connection")]
    AlreadyJoinedWithOpenConnection(MemberId),
    #[error("Could not decrypt tunnel")]
    DecryptFailed,
    #[error("Member has no connection")]
    NoConnection,
    #[error("Connection is closed")]
    ConnectionClosed,
    #[error("Could not encode frame for recipient: {0}")]
    EncodeFailed(String),
    #[error("Could not create server identity: {0}")]
    IdentityGenerationFailed(std::io::Error),
    #[error("Server is shutting down")]
    ShuttingDown,
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<stagelink::error::Error> for Error {
    fn from(value: stagelink::error::Error) -> Self {
        match value {
            stagelink::error::Error::Proto(err) => Self::Proto(err),
            stagelink::error::Error::Crypto(CryptoError::DecryptFailed) => Self::DecryptFailed,
            stagelink::error::Error::Crypto(err @ CryptoError::InvalidPublicKey(_)) => {
                Self::InvalidPublicKey(err)
            }
            stagelink::error::Error::Crypto(
                err @ (CryptoError::EncryptFailed | CryptoError::InvalidSecretKey),
            ) => Self::EncodeFailed(err.to_string()),
        }
    }
}

impl Error {
    /// The code reported back to the connection whose frame caused this
    /// error. `None` for failures that are not the sender's fault.
    pub fn reason(&self) -> Option<ErrorReason> {
        match self {
            Error::Proto(ProtoError::MalformedEnvelope(_)) => Some(ErrorReason::MalformedEnvelope),
            Error::Proto(ProtoError::UnknownEvent(_)) => Some(ErrorReason::UnknownEvent),
            Error::Proto(ProtoError::MalformedPayload(_)) => Some(ErrorReason::MalformedPayload),
            Error::InvalidPublicKey(_) => Some(ErrorReason::InvalidPublicKey),
            Error::AlreadyJoinedWithOpenConnection(_) => Some(ErrorReason::AlreadyJoined),
            Error::DecryptFailed => Some(ErrorReason::DecryptFailed),
            Error::ShuttingDown => Some(ErrorReason::ShuttingDown),
            Error::Proto(ProtoError::EncodeFailed(_))
            | Error::NoConnection
            | Error::ConnectionClosed
            | Error::EncodeFailed(_)
            | Error::IdentityGenerationFailed(_)
            | Error::Config(_)
            | Error::Io(_) => None,
        }
    }
}
