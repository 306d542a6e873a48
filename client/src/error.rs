use stagelink::{api::ErrorReport, crypto::CryptoError, error::ProtoError};
use tokio_tungstenite::tungstenite;

#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("Websocket error: {0}")]
    Websocket(#[from] tungstenite::Error),
    #[error("StagelinkError: {0}")]
    Stagelink(#[from] stagelink::error::Error),
    #[error("The server sent an invalid key: {0}")]
    InvalidServerKey(CryptoError),
    #[error("The server rejected our frame: {0:?}")]
    Rejected(ErrorReport),
    #[error("The connection is closed")]
    Closed,
    #[error("The server did not answer in time")]
    Timeout,
}

impl From<ProtoError> for ClientError {
    fn from(value: ProtoError) -> Self {
        Self::Stagelink(value.into())
    }
}
