use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use stagelink::{
    api::{Envelope, ErrorReport, Event, Lock, LockTarget, TunnelMessage},
    crypto::{KeyPair, PublicKey},
    identifiers::MemberId,
};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, Message as TungsteniteMessage},
    MaybeTlsStream, WebSocketStream,
};

use crate::error::ClientError;

/// How long [`Participant::connect`] waits for the server key.
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Something the relay told us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Sent whenever someone joins.
    ServerKey(PublicKey),
    /// A lock change relayed from another member, already opened.
    Lock(TunnelMessage),
    /// One of our frames was rejected.
    Rejected(ErrorReport),
}

/// A joined member of the session.
///
/// Owns its own key pair: lock events are sealed to the server key, and
/// the relayed ones we receive are sealed to ours.
pub struct Participant {
    name: MemberId,
    keys: KeyPair,
    server_key: PublicKey,
    socket: Socket,
}

impl Participant {
    /// Connects to `request` (usually a `ws://` url), joins as `name` and
    /// waits for the server to announce its key.
    pub async fn connect(
        request: impl IntoClientRequest + Unpin,
        name: impl Into<MemberId>,
    ) -> Result<Self, ClientError> {
        let (mut socket, _) = connect_async(request).await?;
        let name = name.into();
        let keys = KeyPair::generate();

        let join = Envelope::join(name.clone(), keys.public()).encode()?;
        socket.send(TungsteniteMessage::Text(join.into())).await?;

        let server_key = tokio::time::timeout(JOIN_TIMEOUT, await_server_key(&mut socket))
            .await
            .map_err(|_| ClientError::Timeout)??;

        log::info!("Joined as {name}");

        Ok(Self {
            name,
            keys,
            server_key,
            socket,
        })
    }

    pub fn name(&self) -> &MemberId {
        &self.name
    }

    pub fn public_key(&self) -> &PublicKey {
        self.keys.public()
    }

    pub fn server_key(&self) -> &PublicKey {
        &self.server_key
    }

    pub async fn lock_actor(
        &mut self,
        name: impl Into<String>,
        lock: bool,
    ) -> Result<(), ClientError> {
        self.send_lock(LockTarget::Actor(Lock {
            name: name.into(),
            lock,
        }))
        .await
    }

    pub async fn lock_theme(
        &mut self,
        name: impl Into<String>,
        lock: bool,
    ) -> Result<(), ClientError> {
        self.send_lock(LockTarget::Theme(Lock {
            name: name.into(),
            lock,
        }))
        .await
    }

    pub async fn send_lock(&mut self, target: LockTarget) -> Result<(), ClientError> {
        let message = TunnelMessage::from_member(self.name.clone(), target);
        let envelope = Envelope::tunneled(self.name.clone(), &message, &self.server_key)?;

        self.send_raw(envelope.encode()?).await
    }

    /// Sends a text frame as is.
    pub async fn send_raw(&mut self, frame: impl Into<String>) -> Result<(), ClientError> {
        self.socket
            .send(TungsteniteMessage::Text(frame.into().into()))
            .await?;

        Ok(())
    }

    /// Waits for the next thing the relay sends us. Cancel safe.
    pub async fn next_notice(&mut self) -> Result<Notice, ClientError> {
        loop {
            let envelope = next_envelope(&mut self.socket).await?;

            match &envelope.event {
                Event::KeyBroadcast(broadcast) => {
                    let key: PublicKey = broadcast
                        .key
                        .parse()
                        .map_err(ClientError::InvalidServerKey)?;

                    if key != self.server_key {
                        log::warn!("The server key changed");
                        self.server_key = key;
                    }

                    return Ok(Notice::ServerKey(key));
                }
                Event::ThemeLock(_) | Event::ActorLock(_) => {
                    if let Some(message) = envelope.open_tunnel(self.keys.secret()) {
                        return Ok(Notice::Lock(message?));
                    }
                }
                Event::Error(Some(report)) => return Ok(Notice::Rejected(report.clone())),
                Event::Error(None) | Event::Join(_) => {
                    log::debug!("Ignoring {}", envelope.tag());
                }
            }
        }
    }

    pub async fn close(mut self) -> Result<(), ClientError> {
        self.socket.close(None).await?;

        Ok(())
    }
}

/// Reads until the server announces its key after our join.
async fn await_server_key(socket: &mut Socket) -> Result<PublicKey, ClientError> {
    loop {
        match next_envelope(socket).await?.event {
            Event::KeyBroadcast(broadcast) => {
                return broadcast
                    .key
                    .parse()
                    .map_err(ClientError::InvalidServerKey);
            }
            Event::Error(Some(report)) => return Err(ClientError::Rejected(report)),
            event => log::debug!("Ignoring {} while joining", event.tag()),
        }
    }
}

/// Reads until a text frame arrives and decodes it.
async fn next_envelope(socket: &mut Socket) -> Result<Envelope, ClientError> {
    loop {
        match socket.next().await {
            Some(Ok(TungsteniteMessage::Text(text))) => {
                return Ok(Envelope::decode(text.as_str())?)
            }
            Some(Ok(TungsteniteMessage::Close(_))) | None => return Err(ClientError::Closed),
            Some(Ok(_)) => {}
            Some(Err(err)) => return Err(err.into()),
        }
    }
}
