use serde::{Deserialize, Serialize};

use super::{EventTag, LockTarget, TunnelMessage};
use crate::{
    crypto::{PublicKey, SealedTunnel, SecretKey},
    error::{Error, ProtoError},
    identifiers::MemberId,
};

/// Payload of `eventJoin`: the key the new member wants to be addressed with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Join {
    pub key: String,
}

/// Payload of `eventKeyBroadcast`: the server's current public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyBroadcast {
    pub key: String,
}

/// Stable machine readable codes carried by `eventError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorReason {
    MalformedEnvelope,
    UnknownEvent,
    InvalidPublicKey,
    AlreadyJoined,
    DecryptFailed,
    MalformedPayload,
    ShuttingDown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub reason: ErrorReason,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Sent by the server to the connection whose frame was rejected.
    /// Older peers send it without a payload.
    Error(Option<ErrorReport>),
    Join(Join),
    KeyBroadcast(KeyBroadcast),
    ThemeLock(SealedTunnel),
    ActorLock(SealedTunnel),
}

impl Event {
    pub const fn tag(&self) -> EventTag {
        match self {
            Event::Error(_) => EventTag::Error,
            Event::Join(_) => EventTag::Join,
            Event::KeyBroadcast(_) => EventTag::KeyBroadcast,
            Event::ThemeLock(_) => EventTag::ThemeLock,
            Event::ActorLock(_) => EventTag::ActorLock,
        }
    }

    pub fn tunnel(&self) -> Option<&SealedTunnel> {
        match self {
            Event::ThemeLock(tunnel) | Event::ActorLock(tunnel) => Some(tunnel),
            Event::Error(_) | Event::Join(_) | Event::KeyBroadcast(_) => None,
        }
    }
}

/// One frame of the live protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub member: MemberId,
    pub event: Event,
}

#[derive(Serialize, Deserialize)]
struct WireEnvelope {
    #[serde(default)]
    member: MemberId,
    #[serde(default)]
    event: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<WirePayload>,
}

#[derive(Default, Serialize, Deserialize)]
struct WirePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    join: Option<Join>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    key_broadcast: Option<KeyBroadcast>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tunnel: Option<SealedTunnel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<ErrorReport>,
}

impl Envelope {
    pub fn new(member: MemberId, event: Event) -> Self {
        Self { member, event }
    }

    pub fn join(member: MemberId, key: &PublicKey) -> Self {
        Self::new(
            member,
            Event::Join(Join {
                key: key.to_string(),
            }),
        )
    }

    pub fn key_broadcast(key: &PublicKey) -> Self {
        Self::new(
            MemberId::host(),
            Event::KeyBroadcast(KeyBroadcast {
                key: key.to_string(),
            }),
        )
    }

    pub fn error(reason: ErrorReason, message: impl Into<String>) -> Self {
        Self::new(
            MemberId::host(),
            Event::Error(Some(ErrorReport {
                reason,
                message: message.into(),
            })),
        )
    }

    /// Seals `message` to `recipient` and wraps it in the lock event that
    /// matches its target.
    pub fn tunneled(
        member: MemberId,
        message: &TunnelMessage,
        recipient: &PublicKey,
    ) -> Result<Self, Error> {
        let sealed = message.seal(recipient)?;
        let event = match message.target {
            LockTarget::Theme(_) => Event::ThemeLock(sealed),
            LockTarget::Actor(_) => Event::ActorLock(sealed),
        };

        Ok(Self::new(member, event))
    }

    pub const fn tag(&self) -> EventTag {
        self.event.tag()
    }

    /// Opens the tunnel of a lock event. Returns `None` for events that
    /// don't carry one.
    ///
    /// The inner event has to agree with the outer tag, a theme lock can't
    /// smuggle an actor lock.
    pub fn open_tunnel(&self, secret: &SecretKey) -> Option<Result<TunnelMessage, Error>> {
        let sealed = self.event.tunnel()?;

        Some(TunnelMessage::open(sealed, secret).and_then(|message| {
            if message.tag() == self.tag() {
                Ok(message)
            } else {
                Err(ProtoError::MalformedPayload(format!(
                    "{} envelope carries {}",
                    self.tag(),
                    message.tag()
                ))
                .into())
            }
        }))
    }

    pub fn encode(&self) -> Result<String, ProtoError> {
        let payload = match &self.event {
            Event::Error(None) => None,
            Event::Error(Some(report)) => Some(WirePayload {
                error: Some(report.clone()),
                ..WirePayload::default()
            }),
            Event::Join(join) => Some(WirePayload {
                join: Some(join.clone()),
                ..WirePayload::default()
            }),
            Event::KeyBroadcast(key_broadcast) => Some(WirePayload {
                key_broadcast: Some(key_broadcast.clone()),
                ..WirePayload::default()
            }),
            Event::ThemeLock(tunnel) | Event::ActorLock(tunnel) => Some(WirePayload {
                tunnel: Some(tunnel.clone()),
                ..WirePayload::default()
            }),
        };

        serde_json::to_string(&WireEnvelope {
            member: self.member.clone(),
            event: Some(self.tag().as_str().to_string()),
            payload,
        })
        .map_err(|err| ProtoError::EncodeFailed(err.to_string()))
    }

    pub fn decode(bytes: impl AsRef<[u8]>) -> Result<Self, ProtoError> {
        let wire: WireEnvelope = serde_json::from_slice(bytes.as_ref())
            .map_err(|err| ProtoError::MalformedEnvelope(err.to_string()))?;

        let tag: EventTag = wire
            .event
            .ok_or_else(|| ProtoError::MalformedEnvelope("missing event".to_string()))?
            .parse()?;

        let payload = wire.payload.unwrap_or_default();
        let missing =
            |field: &str| ProtoError::MalformedEnvelope(format!("{tag} without payload.{field}"));

        let event = match tag {
            EventTag::Error => Event::Error(payload.error),
            EventTag::Join => Event::Join(payload.join.ok_or_else(|| missing("join"))?),
            EventTag::KeyBroadcast => Event::KeyBroadcast(
                payload
                    .key_broadcast
                    .ok_or_else(|| missing("key_broadcast"))?,
            ),
            EventTag::ThemeLock => {
                Event::ThemeLock(payload.tunnel.ok_or_else(|| missing("tunnel"))?)
            }
            EventTag::ActorLock => {
                Event::ActorLock(payload.tunnel.ok_or_else(|| missing("tunnel"))?)
            }
        };

        Ok(Self {
            member: wire.member,
            event,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::Lock,
        crypto::{CryptoError, KeyPair},
    };

    #[test]
    fn decodes_bare_error_event() {
        let envelope =
            Envelope::decode(r#"{"member": "marcus", "event": "eventError"}"#).expect("valid");

        assert_eq!(envelope.member, MemberId::from("marcus"));
        assert_eq!(envelope.event, Event::Error(None));
    }

    #[test]
    fn decodes_join_with_foreign_key_format() {
        // Key validation happens when the join is handled, not while decoding.
        let envelope = Envelope::decode(
            r#"{"member":"Bertrand","event":"eventJoin","payload":{"join":{"key":"age1m6nhvlatjjhwr65te8nruz708ymlx8ww77gtresf0qd9vdz3danqu452cg"}}}"#,
        )
        .expect("valid");

        assert_eq!(envelope.tag(), EventTag::Join);
        let Event::Join(join) = envelope.event else {
            panic!("expected a join event");
        };
        assert!(join.key.starts_with("age1"));
    }

    #[test]
    fn canonical_envelopes_survive_a_roundtrip() {
        let key = KeyPair::generate();
        let tunnel = SealedTunnel::seal(b"anything", key.public()).expect("seals");

        let frames = [
            r#"{"member":"marcus","event":"eventError"}"#.to_string(),
            r#"{"member":"","event":"eventError","payload":{"error":{"reason":"already_joined","message":"member \"alice\" already joined"}}}"#.to_string(),
            format!(r#"{{"member":"alice","event":"eventJoin","payload":{{"join":{{"key":"{}"}}}}}}"#, key.public()),
            format!(r#"{{"member":"","event":"eventKeyBroadcast","payload":{{"key_broadcast":{{"key":"{}"}}}}}}"#, key.public()),
            format!(r#"{{"member":"alice","event":"eventThemeLock","payload":{{"tunnel":"{}"}}}}"#, tunnel.as_str()),
            format!(r#"{{"member":"","event":"eventActorLock","payload":{{"tunnel":"{}"}}}}"#, tunnel.as_str()),
        ];

        for frame in frames {
            let decoded = Envelope::decode(&frame).expect("well-formed frame");
            assert_eq!(decoded.encode().expect("encodes"), frame);
        }
    }

    #[test]
    fn tolerates_null_payload_fields() {
        let envelope = Envelope::decode(
            r#"{"member":"bob","event":"eventThemeLock","payload":{"tunnel":"abc","join":null,"key_broadcast":null}}"#,
        )
        .expect("valid");

        assert_eq!(
            envelope.event,
            Event::ThemeLock(SealedTunnel::from_encoded("abc"))
        );
    }

    #[test]
    fn unknown_events_are_reported_as_such() {
        assert_eq!(
            Envelope::decode(r#"{"member":"bob","event":"eventBogus"}"#),
            Err(ProtoError::UnknownEvent("eventBogus".to_string()))
        );
    }

    #[test]
    fn malformed_envelopes() {
        for frame in [
            "",
            "{",
            "[]",
            r#"{"member":"bob"}"#,
            r#"{"member":"bob","event":null}"#,
            r#"{"member":"bob","event":4}"#,
            r#"{"member":"bob","event":"eventJoin"}"#,
            r#"{"member":"bob","event":"eventJoin","payload":{"tunnel":"abc"}}"#,
            r#"{"member":"bob","event":"eventActorLock","payload":{}}"#,
            r#"{"member":"bob","event":"eventKeyBroadcast","payload":{"join":{"key":"k"}}}"#,
            r#"{"member":"","event":"eventError","payload":{"error":{"reason":"nope","message":""}}}"#,
        ] {
            assert!(
                matches!(
                    Envelope::decode(frame),
                    Err(ProtoError::MalformedEnvelope(_))
                ),
                "{frame:?} should be malformed"
            );
        }
    }

    #[test]
    fn tunneled_envelope_opens_for_recipient_only() {
        let bob = KeyPair::generate();
        let mallory = KeyPair::generate();
        let message = TunnelMessage::from_member(
            "alice".into(),
            LockTarget::Actor(Lock {
                name: "hamlet".to_string(),
                lock: true,
            }),
        )
        .relayed("alice".into());

        let envelope =
            Envelope::tunneled(MemberId::host(), &message, bob.public()).expect("seals");

        assert_eq!(envelope.tag(), EventTag::ActorLock);
        assert_eq!(
            envelope.open_tunnel(bob.secret()),
            Some(Ok(message.clone()))
        );
        assert_eq!(
            envelope.open_tunnel(mallory.secret()),
            Some(Err(Error::Crypto(CryptoError::DecryptFailed)))
        );
    }

    #[test]
    fn mismatched_inner_event_is_rejected() {
        let server = KeyPair::generate();
        let message = TunnelMessage::from_member(
            "alice".into(),
            LockTarget::Theme(Lock {
                name: "storm".to_string(),
                lock: true,
            }),
        );
        let sealed = message.seal(server.public()).expect("seals");
        let envelope = Envelope::new("alice".into(), Event::ActorLock(sealed));

        assert!(matches!(
            envelope.open_tunnel(server.secret()),
            Some(Err(Error::Proto(ProtoError::MalformedPayload(_))))
        ));
    }

    #[test]
    fn plaintext_events_have_no_tunnel() {
        let key = KeyPair::generate();

        assert!(Envelope::key_broadcast(key.public())
            .open_tunnel(key.secret())
            .is_none());
        assert!(Envelope::join("alice".into(), key.public())
            .open_tunnel(key.secret())
            .is_none());
    }
}
