//! Real-time connection registry and room fan-out.
//!
//! Each connection owns an unbounded outbound queue drained by its socket
//! writer. Rooms map a [`RoomKey`] to the connections currently subscribed;
//! emission is fire-and-forget with no replay for late joiners.

pub mod auth;
pub mod rooms;

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::events::ServerEvent;
use crate::models::identity::{ConnectionId, Identity};
use crate::router::auth::{AuthError, Authenticator};
use crate::router::rooms::RoomKey;

pub type DisconnectHandler = Box<dyn FnOnce(ConnectionId, Identity) + Send + Sync>;

struct Connection {
    identity: Identity,
    tx: mpsc::UnboundedSender<ServerEvent>,
    rooms: HashSet<RoomKey>,
    on_disconnect: Vec<DisconnectHandler>,
}

pub struct ConnectionRouter {
    authenticator: Arc<dyn Authenticator>,
    connections: DashMap<ConnectionId, Connection>,
    rooms: DashMap<RoomKey, HashSet<ConnectionId>>,
}

impl ConnectionRouter {
    pub fn new(authenticator: Arc<dyn Authenticator>) -> Self {
        Self {
            authenticator,
            connections: DashMap::new(),
            rooms: DashMap::new(),
        }
    }

    pub fn authenticate(&self, credential: Option<&str>) -> Result<Identity, AuthError> {
        let credential = credential.ok_or(AuthError::MissingCredential)?;
        self.authenticator.authenticate(credential)
    }

    /// Registers an authenticated connection and subscribes it to its
    /// identity's home room. Dropping the returned guard disconnects it.
    pub fn register(
        self: &Arc<Self>,
        identity: Identity,
    ) -> (ConnectionGuard, mpsc::UnboundedReceiver<ServerEvent>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        self.connections.insert(
            id,
            Connection {
                identity,
                tx,
                rooms: HashSet::new(),
                on_disconnect: Vec::new(),
            },
        );
        self.join_room(id, identity.home_room());

        info!(connection_id = %id, identity = %identity, "connection registered");

        let guard = ConnectionGuard {
            router: Arc::clone(self),
            id,
        };
        (guard, rx)
    }

    /// Returns `false` when the connection is gone.
    pub fn join_room(&self, connection_id: ConnectionId, room: RoomKey) -> bool {
        let Some(mut connection) = self.connections.get_mut(&connection_id) else {
            return false;
        };

        connection.rooms.insert(room);
        self.rooms.entry(room).or_default().insert(connection_id);
        debug!(connection_id = %connection_id, room = %room, "joined room");
        true
    }

    pub fn leave_room(&self, connection_id: ConnectionId, room: RoomKey) {
        if let Some(mut connection) = self.connections.get_mut(&connection_id) {
            connection.rooms.remove(&room);
        }
        self.remove_member(room, connection_id);
        debug!(connection_id = %connection_id, room = %room, "left room");
    }

    /// Subscribes every connection in `source` to `target`.
    pub fn join_members_of(&self, source: RoomKey, target: RoomKey) -> usize {
        self.members(&[source])
            .into_iter()
            .filter(|id| self.join_room(*id, target))
            .count()
    }

    /// Hands `event` to every current member and returns how many accepted it.
    pub fn emit_to_room(&self, room: RoomKey, event: ServerEvent) -> usize {
        self.emit_to_rooms(&[room], event)
    }

    /// Like [`emit_to_room`](Self::emit_to_room) across several rooms; a
    /// connection in more than one of them receives the event once.
    pub fn emit_to_rooms(&self, rooms: &[RoomKey], event: ServerEvent) -> usize {
        let delivered = self
            .members(rooms)
            .into_iter()
            .filter(|id| self.emit_to_connection(*id, event.clone()))
            .count();

        debug!(event = event.name(), delivered, "emitted");
        delivered
    }

    pub fn emit_to_connection(&self, connection_id: ConnectionId, event: ServerEvent) -> bool {
        self.connections
            .get(&connection_id)
            .is_some_and(|connection| connection.tx.send(event).is_ok())
    }

    pub fn room_size(&self, room: RoomKey) -> usize {
        self.rooms.get(&room).map_or(0, |members| members.len())
    }

    pub fn is_reachable(&self, room: RoomKey) -> bool {
        self.members(&[room])
            .into_iter()
            .any(|id| self.connections.get(&id).is_some_and(|c| !c.tx.is_closed()))
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Runs `handler` exactly once when the connection goes away. Returns
    /// `false`, dropping the handler, if the connection is already closed.
    pub fn on_disconnect(&self, connection_id: ConnectionId, handler: DisconnectHandler) -> bool {
        match self.connections.get_mut(&connection_id) {
            Some(mut connection) => {
                connection.on_disconnect.push(handler);
                true
            }
            None => false,
        }
    }

    /// Removes the connection from every room and fires its handlers. Only the
    /// first call for a connection has any effect.
    pub fn disconnect(&self, connection_id: ConnectionId) -> bool {
        let Some((_, connection)) = self.connections.remove(&connection_id) else {
            return false;
        };

        for room in &connection.rooms {
            self.remove_member(*room, connection_id);
        }

        info!(
            connection_id = %connection_id,
            identity = %connection.identity,
            "connection closed"
        );

        for handler in connection.on_disconnect {
            handler(connection_id, connection.identity);
        }
        true
    }

    fn members(&self, rooms: &[RoomKey]) -> Vec<ConnectionId> {
        let mut seen = HashSet::new();
        for room in rooms {
            if let Some(members) = self.rooms.get(room) {
                seen.extend(members.iter().copied());
            }
        }
        seen.into_iter().collect()
    }

    fn remove_member(&self, room: RoomKey, connection_id: ConnectionId) {
        if let Some(mut members) = self.rooms.get_mut(&room) {
            members.remove(&connection_id);
        }
        self.rooms.remove_if(&room, |_, members| members.is_empty());
    }
}

/// Disconnects its connection when dropped, including on panic or abnormal
/// socket termination.
pub struct ConnectionGuard {
    router: Arc<ConnectionRouter>,
    id: ConnectionId,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.router.disconnect(self.id);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::ConnectionRouter;
    use crate::models::events::ServerEvent;
    use crate::models::identity::Identity;
    use crate::router::auth::{AuthError, StaticTokenAuthenticator, parse_token_table};
    use crate::router::rooms::RoomKey;

    fn router() -> Arc<ConnectionRouter> {
        let tokens = parse_token_table("d7=driver:7;r3=rider:3").unwrap();
        Arc::new(ConnectionRouter::new(Arc::new(StaticTokenAuthenticator::new(tokens))))
    }

    #[test]
    fn authentication_resolves_identities() {
        let router = router();
        assert_eq!(router.authenticate(Some("d7")), Ok(Identity::driver(7)));
        assert_eq!(router.authenticate(None), Err(AuthError::MissingCredential));
        assert_eq!(router.authenticate(Some("x")), Err(AuthError::InvalidCredential));
    }

    #[test]
    fn registration_joins_the_home_room() {
        let router = router();
        let (guard, mut rx) = router.register(Identity::driver(7));

        assert_eq!(router.room_size(RoomKey::Driver(7)), 1);
        assert!(router.is_reachable(RoomKey::Driver(7)));
        assert_eq!(router.emit_to_room(RoomKey::Driver(7), ServerEvent::void(1, "test")), 1);
        assert_eq!(rx.try_recv().unwrap().name(), "order:void");

        drop(guard);
        assert_eq!(router.room_size(RoomKey::Driver(7)), 0);
        assert_eq!(router.emit_to_room(RoomKey::Driver(7), ServerEvent::void(1, "test")), 0);
    }

    #[test]
    fn late_joiners_see_nothing_emitted_before_they_joined() {
        let router = router();
        let (first, mut first_rx) = router.register(Identity::rider(3));
        router.join_room(first.id(), RoomKey::Order(5));
        router.emit_to_room(RoomKey::Order(5), ServerEvent::void(5, "early"));

        let (second, mut second_rx) = router.register(Identity::admin(1));
        router.join_room(second.id(), RoomKey::Order(5));

        assert!(first_rx.try_recv().is_ok());
        assert!(second_rx.try_recv().is_err());
    }

    #[test]
    fn overlapping_rooms_deliver_once() {
        let router = router();
        let (admin, mut rx) = router.register(Identity::admin(1));
        router.join_room(admin.id(), RoomKey::Order(9));

        let delivered =
            router.emit_to_rooms(&[RoomKey::Order(9), RoomKey::Dashboard], ServerEvent::void(9, "x"));
        assert_eq!(delivered, 1);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn leave_room_stops_delivery() {
        let router = router();
        let (rider, mut rx) = router.register(Identity::rider(3));
        router.join_room(rider.id(), RoomKey::Order(2));
        router.leave_room(rider.id(), RoomKey::Order(2));

        assert_eq!(router.emit_to_room(RoomKey::Order(2), ServerEvent::void(2, "x")), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn disconnect_handlers_fire_exactly_once() {
        let router = router();
        let fired = Arc::new(AtomicUsize::new(0));
        let (guard, _rx) = router.register(Identity::driver(7));
        let id = guard.id();

        let counter = Arc::clone(&fired);
        assert!(router.on_disconnect(
            id,
            Box::new(move |_, identity| {
                assert_eq!(identity, Identity::driver(7));
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        ));

        assert!(router.disconnect(id));
        assert!(!router.disconnect(id));
        drop(guard);

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!router.on_disconnect(id, Box::new(|_, _| {})));
        assert_eq!(router.connection_count(), 0);
    }

    #[test]
    fn join_members_of_copies_subscriptions() {
        let router = router();
        let (_a, mut a_rx) = router.register(Identity::driver(7));
        let (_b, mut b_rx) = router.register(Identity::driver(7));

        assert_eq!(router.join_members_of(RoomKey::Driver(7), RoomKey::Order(1)), 2);
        assert_eq!(router.emit_to_room(RoomKey::Order(1), ServerEvent::void(1, "x")), 2);
        assert!(a_rx.try_recv().is_ok());
        assert!(b_rx.try_recv().is_ok());
    }

    #[test]
    fn dropped_receivers_are_unreachable() {
        let router = router();
        let (_guard, rx) = router.register(Identity::driver(7));
        drop(rx);

        assert!(!router.is_reachable(RoomKey::Driver(7)));
        assert_eq!(router.emit_to_room(RoomKey::Driver(7), ServerEvent::void(1, "x")), 0);
    }
}
