use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ProtoError;

/// The closed set of events a frame can carry.
///
/// Tags travel as their canonical names (`"eventJoin"`, ...), never as
/// numbers, so both ends only have to agree on spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTag {
    Error,
    Join,
    KeyBroadcast,
    ThemeLock,
    ActorLock,
}

impl EventTag {
    pub const ALL: [EventTag; 5] = [
        EventTag::Error,
        EventTag::Join,
        EventTag::KeyBroadcast,
        EventTag::ThemeLock,
        EventTag::ActorLock,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            EventTag::Error => "eventError",
            EventTag::Join => "eventJoin",
            EventTag::KeyBroadcast => "eventKeyBroadcast",
            EventTag::ThemeLock => "eventThemeLock",
            EventTag::ActorLock => "eventActorLock",
        }
    }

    /// Whether the payload of this event is a sealed tunnel.
    pub const fn is_tunneled(self) -> bool {
        matches!(self, EventTag::ThemeLock | EventTag::ActorLock)
    }
}

impl Display for EventTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventTag {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventTag::ALL
            .into_iter()
            .find(|tag| tag.as_str() == s)
            .ok_or_else(|| ProtoError::UnknownEvent(s.to_string()))
    }
}

impl Serialize for EventTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventTag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}
