use serde::{Deserialize, Serialize};

use super::EventTag;
use crate::{
    crypto::{PublicKey, SealedTunnel, SecretKey},
    error::{Error, ProtoError},
    identifiers::MemberId,
};

/// A theme or actor name together with its new lock state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
    pub name: String,
    pub lock: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockTarget {
    Theme(Lock),
    Actor(Lock),
}

impl LockTarget {
    pub const fn tag(&self) -> EventTag {
        match self {
            LockTarget::Theme(_) => EventTag::ThemeLock,
            LockTarget::Actor(_) => EventTag::ActorLock,
        }
    }

    pub fn lock(&self) -> &Lock {
        match self {
            LockTarget::Theme(lock) | LockTarget::Actor(lock) => lock,
        }
    }
}

/// Plaintext of a sealed tunnel.
///
/// Participants send these with `is_host = false` sealed to the server key.
/// The server forwards its own copy with `is_host = true`, sealed once per
/// recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelMessage {
    pub is_host: bool,
    pub from: MemberId,
    pub target: LockTarget,
}

#[derive(Serialize, Deserialize)]
struct WireTunnel {
    #[serde(default)]
    is_host: bool,
    #[serde(default)]
    from: MemberId,
    #[serde(default)]
    event: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    theme_lock: Option<Lock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    actor_lock: Option<Lock>,
}

impl TunnelMessage {
    pub fn from_member(from: MemberId, target: LockTarget) -> Self {
        Self {
            is_host: false,
            from,
            target,
        }
    }

    /// The copy the server relays on behalf of `from`.
    pub fn relayed(&self, from: MemberId) -> Self {
        Self {
            is_host: true,
            from,
            target: self.target.clone(),
        }
    }

    pub const fn tag(&self) -> EventTag {
        self.target.tag()
    }

    pub fn to_json(&self) -> Result<Vec<u8>, ProtoError> {
        let (theme_lock, actor_lock) = match &self.target {
            LockTarget::Theme(lock) => (Some(lock.clone()), None),
            LockTarget::Actor(lock) => (None, Some(lock.clone())),
        };

        serde_json::to_vec(&WireTunnel {
            is_host: self.is_host,
            from: self.from.clone(),
            event: Some(self.tag().as_str().to_string()),
            theme_lock,
            actor_lock,
        })
        .map_err(|err| ProtoError::EncodeFailed(err.to_string()))
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, ProtoError> {
        let wire: WireTunnel = serde_json::from_slice(bytes)
            .map_err(|err| ProtoError::MalformedPayload(err.to_string()))?;

        let name = wire
            .event
            .ok_or_else(|| ProtoError::MalformedPayload("missing event".to_string()))?;

        let tag: EventTag = name
            .parse()
            .map_err(|_| ProtoError::MalformedPayload(format!("unknown inner event {name:?}")))?;

        let target = match tag {
            EventTag::ThemeLock => LockTarget::Theme(wire.theme_lock.ok_or_else(|| {
                ProtoError::MalformedPayload("missing theme_lock".to_string())
            })?),
            EventTag::ActorLock => LockTarget::Actor(wire.actor_lock.ok_or_else(|| {
                ProtoError::MalformedPayload("missing actor_lock".to_string())
            })?),
            EventTag::Error | EventTag::Join | EventTag::KeyBroadcast => {
                return Err(ProtoError::MalformedPayload(format!(
                    "{tag} cannot be tunneled"
                )))
            }
        };

        Ok(Self {
            is_host: wire.is_host,
            from: wire.from,
            target,
        })
    }

    pub fn seal(&self, recipient: &PublicKey) -> Result<SealedTunnel, Error> {
        Ok(SealedTunnel::seal(&self.to_json()?, recipient)?)
    }

    pub fn open(sealed: &SealedTunnel, secret: &SecretKey) -> Result<Self, Error> {
        let plaintext = sealed.open(secret)?;
        Ok(Self::from_json(&plaintext)?)
    }
}
