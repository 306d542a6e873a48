//! The live-session wire protocol.
//!
//! Every frame is one JSON [`Envelope`]. Join, key broadcast and error
//! envelopes are plaintext; lock events carry a [`SealedTunnel`] whose
//! plaintext is a [`TunnelMessage`].
//!
//! [`SealedTunnel`]: crate::crypto::SealedTunnel
pub mod envelope;
pub mod event;
pub mod server;
pub mod tunnel;

pub use envelope::{Envelope, ErrorReason, ErrorReport, Event, Join, KeyBroadcast};
pub use event::EventTag;
pub use tunnel::{Lock, LockTarget, TunnelMessage};
