//! Who is in the session and where to reach them.
//!
//! Both indices (member name to [`Member`], connection id to connection)
//! live behind one lock so a join can check the old binding and rebind
//! atomically.

use std::collections::HashMap;

use parking_lot::RwLock;
use stagelink::{crypto::PublicKey, identifiers::MemberId};
use tracing::debug;

use crate::{
    connection::{ConnectionHandle, ConnectionId},
    error::Error,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub id: MemberId,
    pub key: PublicKey,
    /// Checked against the connection index before use, the connection may
    /// be long gone.
    pub connection: Option<ConnectionId>,
}

/// A member together with the handle of its connection, as seen at the
/// time [`Registry::recipients`] was called.
#[derive(Debug, Clone)]
pub struct Recipient {
    pub member: MemberId,
    pub key: PublicKey,
    pub connection: Option<ConnectionHandle>,
}

impl Recipient {
    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.connection.as_ref().map(ConnectionHandle::id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    Rejoined,
}

#[derive(Debug)]
struct LiveConnection {
    handle: ConnectionHandle,
    member: Option<MemberId>,
}

#[derive(Debug, Default)]
struct Inner {
    members: HashMap<MemberId, Member>,
    connections: HashMap<ConnectionId, LiveConnection>,
    closed: bool,
}

impl Inner {
    fn is_connection_open(&self, id: ConnectionId) -> bool {
        self.connections
            .get(&id)
            .is_some_and(|connection| connection.handle.is_open())
    }

    fn unbind_connection(&mut self, id: ConnectionId) {
        if let Some(connection) = self.connections.get_mut(&id) {
            connection.member = None;
        }
    }
}

#[derive(Debug, Default)]
pub struct Registry {
    inner: RwLock<Inner>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes a freshly accepted connection.
    pub fn attach(&self, handle: ConnectionHandle) -> Result<(), Error> {
        let mut inner = self.inner.write();

        if inner.closed {
            return Err(Error::ShuttingDown);
        }

        inner.connections.insert(
            handle.id(),
            LiveConnection {
                handle,
                member: None,
            },
        );

        Ok(())
    }

    /// Forgets a connection that closed. Returns the member that was bound
    /// to it, which is removed too.
    pub fn detach(&self, connection: ConnectionId) -> Option<MemberId> {
        let mut inner = self.inner.write();

        let member = inner.connections.remove(&connection)?.member?;

        // the member might have rejoined elsewhere in the meantime
        if inner
            .members
            .get(&member)
            .is_some_and(|m| m.connection == Some(connection))
        {
            inner.members.remove(&member);
            Some(member)
        } else {
            None
        }
    }

    /// Binds `id` to `connection` under `key`.
    ///
    /// A name whose connection is still open can't be taken over. A name
    /// whose connection closed is rebound. A connection that already
    /// joined under another name gives that name up.
    pub fn join(
        &self,
        id: MemberId,
        key: PublicKey,
        connection: ConnectionId,
    ) -> Result<JoinOutcome, Error> {
        let mut inner = self.inner.write();

        if inner.closed {
            return Err(Error::ShuttingDown);
        }

        if !inner.is_connection_open(connection) {
            return Err(Error::ConnectionClosed);
        }

        let outcome = match inner.members.get(&id).and_then(|m| m.connection) {
            Some(bound) if inner.is_connection_open(bound) => {
                return Err(Error::AlreadyJoinedWithOpenConnection(id));
            }
            Some(stale) => {
                inner.unbind_connection(stale);
                JoinOutcome::Rejoined
            }
            None if inner.members.contains_key(&id) => JoinOutcome::Rejoined,
            None => JoinOutcome::Joined,
        };

        let previous = inner
            .connections
            .get_mut(&connection)
            .and_then(|live| live.member.replace(id.clone()));

        if let Some(previous) = previous.filter(|previous| *previous != id) {
            debug!(member = %previous, "Connection joined under a new name");
            inner.members.remove(&previous);
        }

        inner.members.insert(
            id.clone(),
            Member {
                id,
                key,
                connection: Some(connection),
            },
        );

        Ok(outcome)
    }

    pub fn lookup(&self, id: &str) -> Option<Member> {
        self.inner.read().members.get(id).cloned()
    }

    /// The member a connection joined as, if any.
    pub fn member_of(&self, connection: ConnectionId) -> Option<MemberId> {
        self.inner
            .read()
            .connections
            .get(&connection)
            .and_then(|live| live.member.clone())
    }

    /// Deletes a member and deregisters its connection.
    pub fn remove(&self, id: &str) -> Option<Member> {
        let mut inner = self.inner.write();

        let member = inner.members.remove(id)?;
        if let Some(connection) = member.connection {
            inner.connections.remove(&connection);
        }

        Some(member)
    }

    /// Like [`Registry::remove`], but only while the member is still bound
    /// to `connection`. Used to prune after a failed send without racing a
    /// rejoin that happened since the snapshot was taken.
    pub fn remove_if_bound(&self, id: &str, connection: Option<ConnectionId>) -> Option<Member> {
        let mut inner = self.inner.write();

        if inner.members.get(id)?.connection != connection {
            return None;
        }

        let member = inner.members.remove(id)?;
        if let Some(connection) = member.connection {
            inner.connections.remove(&connection);
        }

        Some(member)
    }

    pub fn all(&self) -> Vec<Member> {
        self.inner.read().members.values().cloned().collect()
    }

    /// Snapshot of every member with the connection handle to write to.
    pub fn recipients(&self) -> Vec<Recipient> {
        let inner = self.inner.read();

        inner
            .members
            .values()
            .map(|member| Recipient {
                member: member.id.clone(),
                key: member.key,
                connection: member
                    .connection
                    .and_then(|id| inner.connections.get(&id))
                    .map(|live| live.handle.clone()),
            })
            .collect()
    }

    pub fn member_count(&self) -> usize {
        self.inner.read().members.len()
    }

    pub fn connection_count(&self) -> usize {
        self.inner.read().connections.len()
    }

    /// Refuses new connections and joins from now on.
    pub fn close(&self) {
        self.inner.write().closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.inner.read().closed
    }
}

#[cfg(test)]
mod tests {
    use stagelink::crypto::KeyPair;

    use super::*;
    use crate::connection::OutgoingQueue;

    fn connect(registry: &Registry) -> (ConnectionHandle, OutgoingQueue) {
        let (handle, rx) = ConnectionHandle::open();
        registry.attach(handle.clone()).expect("registry is open");

        (handle, rx)
    }

    #[test]
    fn join_then_lookup() {
        let registry = Registry::new();
        let (conn, _rx) = connect(&registry);
        let key = *KeyPair::generate().public();

        assert_eq!(
            registry.join("alice".into(), key, conn.id()).expect("joins"),
            JoinOutcome::Joined
        );

        let alice = registry.lookup("alice").expect("alice is registered");
        assert_eq!(alice.key, key);
        assert_eq!(alice.connection, Some(conn.id()));
        assert_eq!(registry.member_of(conn.id()), Some("alice".into()));
        assert!(registry.lookup("Alice").is_none(), "names are case sensitive");
    }

    #[test]
    fn second_join_while_open_is_rejected() {
        let registry = Registry::new();
        let (first, _rx_first) = connect(&registry);
        let (second, _rx_second) = connect(&registry);
        let first_key = *KeyPair::generate().public();

        registry
            .join("alice".into(), first_key, first.id())
            .expect("joins");

        assert!(matches!(
            registry.join("alice".into(), *KeyPair::generate().public(), second.id()),
            Err(Error::AlreadyJoinedWithOpenConnection(id)) if id.as_str() == "alice"
        ));
        assert!(
            matches!(
                registry.join("alice".into(), first_key, first.id()),
                Err(Error::AlreadyJoinedWithOpenConnection(_))
            ),
            "joining twice on the same connection is also rejected"
        );

        let alice = registry.lookup("alice").expect("still there");
        assert_eq!(alice.key, first_key);
        assert_eq!(alice.connection, Some(first.id()));
    }

    #[test]
    fn rejoin_after_close() {
        let registry = Registry::new();
        let (first, rx_first) = connect(&registry);
        let (second, _rx_second) = connect(&registry);

        registry
            .join("alice".into(), *KeyPair::generate().public(), first.id())
            .expect("joins");

        // the supervisor of the first connection stopped reading
        drop(rx_first);

        let new_key = *KeyPair::generate().public();
        assert_eq!(
            registry.join("alice".into(), new_key, second.id()).expect("rejoins"),
            JoinOutcome::Rejoined
        );

        let alice = registry.lookup("alice").expect("rebound");
        assert_eq!(alice.key, new_key);
        assert_eq!(alice.connection, Some(second.id()));

        // the late teardown of the first connection leaves the new binding alone
        assert_eq!(registry.detach(first.id()), None);
        assert!(registry.lookup("alice").is_some());
    }

    #[test]
    fn detach_removes_bound_member() {
        let registry = Registry::new();
        let (conn, _rx) = connect(&registry);
        let (lurker, _rx_lurker) = connect(&registry);

        registry
            .join("bob".into(), *KeyPair::generate().public(), conn.id())
            .expect("joins");

        assert_eq!(registry.detach(conn.id()), Some("bob".into()));
        assert_eq!(registry.detach(lurker.id()), None);
        assert!(registry.lookup("bob").is_none());
        assert_eq!(registry.connection_count(), 0);
    }

    #[test]
    fn remove_deregisters_connection() {
        let registry = Registry::new();
        let (conn, _rx) = connect(&registry);

        registry
            .join("bob".into(), *KeyPair::generate().public(), conn.id())
            .expect("joins");

        assert!(registry.remove("bob").is_some());
        assert!(registry.remove("bob").is_none());
        assert_eq!(registry.member_count(), 0);
        assert_eq!(registry.connection_count(), 0);
    }

    #[test]
    fn remove_if_bound_respects_rebinding() {
        let registry = Registry::new();
        let (first, rx_first) = connect(&registry);
        let (second, _rx_second) = connect(&registry);

        registry
            .join("alice".into(), *KeyPair::generate().public(), first.id())
            .expect("joins");
        drop(rx_first);
        registry
            .join("alice".into(), *KeyPair::generate().public(), second.id())
            .expect("rejoins");

        assert!(registry.remove_if_bound("alice", Some(first.id())).is_none());
        assert!(registry.remove_if_bound("alice", Some(second.id())).is_some());
    }

    #[test]
    fn renaming_a_connection_drops_the_old_name() {
        let registry = Registry::new();
        let (conn, _rx) = connect(&registry);

        registry
            .join("alice".into(), *KeyPair::generate().public(), conn.id())
            .expect("joins");
        registry
            .join("ophelia".into(), *KeyPair::generate().public(), conn.id())
            .expect("joins under a new name");

        assert!(registry.lookup("alice").is_none());
        assert_eq!(registry.member_of(conn.id()), Some("ophelia".into()));
    }

    #[test]
    fn recipients_carry_handles() {
        let registry = Registry::new();
        let (conn, _rx) = connect(&registry);

        registry
            .join("alice".into(), *KeyPair::generate().public(), conn.id())
            .expect("joins");

        let recipients = registry.recipients();
        assert_eq!(recipients.len(), 1);
        assert_eq!(recipients[0].connection_id(), Some(conn.id()));
        assert_eq!(registry.all().len(), 1);
    }

    #[test]
    fn closed_registry_refuses_everything() {
        let registry = Registry::new();
        let (conn, _rx) = connect(&registry);

        registry.close();

        assert!(registry.is_closed());
        assert!(matches!(
            registry.join("alice".into(), *KeyPair::generate().public(), conn.id()),
            Err(Error::ShuttingDown)
        ));
        assert!(matches!(
            registry.attach(ConnectionHandle::open().0),
            Err(Error::ShuttingDown)
        ));
    }
}
