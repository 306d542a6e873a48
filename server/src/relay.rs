//! Turns decoded frames into registry changes and fan-out.
//!
//! Everything here is synchronous: a frame is fully handled, and every
//! resulting frame queued on the recipients' connections, before the
//! supervisor reads the next one.

use std::sync::Arc;

use stagelink::{
    api::{Envelope, Event, TunnelMessage},
    crypto::PublicKey,
    error::ProtoError,
    identifiers::MemberId,
};
use tracing::{debug, info, warn};

use crate::{
    connection::{ConnectionHandle, OutgoingFrame},
    error::Error,
    identity::ServerIdentity,
    registry::{JoinOutcome, Recipient, Registry},
};

/// Something the server sends to members.
#[derive(Debug, Clone)]
pub enum Outgoing {
    /// Sent as is to everyone.
    Plain(Envelope),
    /// Sealed separately to each recipient's key.
    Tunnel(TunnelMessage),
}

impl Outgoing {
    fn render(&self, recipient: &PublicKey) -> Result<OutgoingFrame, Error> {
        let envelope = match self {
            Outgoing::Plain(envelope) => envelope.clone(),
            Outgoing::Tunnel(message) => Envelope::tunneled(MemberId::host(), message, recipient)?,
        };

        Ok(envelope.encode()?)
    }
}

#[derive(Debug)]
pub struct Relay {
    identity: Arc<ServerIdentity>,
    registry: Registry,
    report_errors: bool,
}

impl Relay {
    pub fn new(identity: Arc<ServerIdentity>, report_errors: bool) -> Self {
        Self {
            identity,
            registry: Registry::new(),
            report_errors,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn identity(&self) -> &ServerIdentity {
        &self.identity
    }

    /// Decodes and handles one text frame. Failures are logged and, if
    /// enabled, reported to `from`. They never close the connection.
    pub fn handle_frame(&self, frame: &str, from: &ConnectionHandle) {
        let result = Envelope::decode(frame)
            .map_err(Error::from)
            .and_then(|envelope| self.handle(envelope, from));

        if let Err(err) = result {
            warn!(connection = %from.id(), "Dropping frame: {err}");
            self.report(from, &err);
        }
    }

    pub fn handle(&self, envelope: Envelope, from: &ConnectionHandle) -> Result<(), Error> {
        match &envelope.event {
            Event::Join(join) => {
                if envelope.member.is_host() {
                    return Err(ProtoError::MalformedEnvelope(
                        "join without a member name".to_string(),
                    )
                    .into());
                }

                let key: PublicKey = join.key.parse().map_err(Error::InvalidPublicKey)?;

                match self.registry.join(envelope.member.clone(), key, from.id()) {
                    Ok(JoinOutcome::Joined) => info!(member = %envelope.member, "Member joined"),
                    Ok(JoinOutcome::Rejoined) => {
                        info!(member = %envelope.member, "Member rejoined");
                    }
                    Err(err) => {
                        debug!(member = %envelope.member, "Join rejected: {err}");
                        return Err(err);
                    }
                }

                self.broadcast(
                    &Outgoing::Plain(Envelope::key_broadcast(self.identity.public_key())),
                    &[],
                );

                Ok(())
            }
            Event::ThemeLock(_) | Event::ActorLock(_) => {
                match envelope.open_tunnel(self.identity.secret()) {
                    Some(message) => self.relay_lock(&message?, from),
                    None => Ok(()),
                }
            }
            Event::KeyBroadcast(_) | Event::Error(_) => {
                debug!(
                    connection = %from.id(),
                    event = %envelope.tag(),
                    "Ignoring server-only event"
                );
                Ok(())
            }
        }
    }

    fn relay_lock(&self, message: &TunnelMessage, from: &ConnectionHandle) -> Result<(), Error> {
        let sender = match self.registry.member_of(from.id()) {
            Some(bound) => {
                if bound != message.from {
                    warn!(
                        member = %bound,
                        claimed = %message.from,
                        "Tunnel claims another sender"
                    );
                }
                bound
            }
            None => message.from.clone(),
        };

        let lock = message.target.lock();
        debug!(
            member = %sender,
            event = %message.tag(),
            name = %lock.name,
            lock = lock.lock,
            "Relaying lock"
        );

        let relayed = message.relayed(sender.clone());
        self.broadcast(&Outgoing::Tunnel(relayed), &[sender]);

        Ok(())
    }

    /// Sends `outgoing` to every member not in `skip`. Members that can't be
    /// reached are removed. Returns how many members it was queued for.
    pub fn broadcast(&self, outgoing: &Outgoing, skip: &[MemberId]) -> usize {
        let mut delivered = 0;

        for recipient in self.registry.recipients() {
            if skip.contains(&recipient.member) {
                debug!(member = %recipient.member, "Broadcast skip");
                continue;
            }

            match self.send(&recipient, outgoing) {
                Ok(()) => delivered += 1,
                Err(err) => {
                    warn!(member = %recipient.member, "Pruning member: {err}");
                    self.registry
                        .remove_if_bound(recipient.member.as_str(), recipient.connection_id());
                }
            }
        }

        delivered
    }

    pub fn send(&self, recipient: &Recipient, outgoing: &Outgoing) -> Result<(), Error> {
        let connection = recipient.connection.as_ref().ok_or(Error::NoConnection)?;

        if !connection.is_open() {
            return Err(Error::ConnectionClosed);
        }

        connection.send_frame(outgoing.render(&recipient.key)?)
    }

    fn report(&self, to: &ConnectionHandle, err: &Error) {
        if !self.report_errors {
            return;
        }

        let Some(reason) = err.reason() else {
            return;
        };

        match Envelope::error(reason, err.to_string()).encode() {
            Ok(frame) => {
                if to.send_frame(frame).is_err() {
                    debug!(connection = %to.id(), "Could not report error, connection closed");
                }
            }
            Err(err) => warn!("Could not encode error report: {err}"),
        }
    }
}
