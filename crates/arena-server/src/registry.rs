//! Process-wide index of sessions and rooms.
//!
//! The registry maintains three structures: the set of connected but
//! unjoined sessions, the live rooms by name, and the session -> room
//! correlation map. At every quiescent point the correlation map's domain is
//! exactly the unidentified set plus the members of all rooms, and a session
//! correlated with a room name really is a member of that room.
//!
//! Rooms are created lazily on the first join naming them and collected as
//! soon as their last member leaves, whether through a `leave` frame or a
//! disconnect.

use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use arena_proto::Snapshot;

use crate::{
    dispatcher::Handler,
    room::{Room, TeamHint},
    session::{SessionHandle, SessionId},
    sync,
};

/// Registry of sessions and rooms.
#[derive(Debug, Default)]
pub struct Registry {
    /// Connected sessions that have not joined a room.
    unidentified: Mutex<HashMap<SessionId, SessionHandle>>,
    /// Live rooms by name.
    rooms: Mutex<HashMap<String, Arc<Room>>>,
    /// session -> room name; `None` while unjoined.
    session_room: Mutex<HashMap<SessionId, Option<String>>>,
    /// Once set, per-session unregistration short-circuits.
    shutting_down: AtomicBool,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a fresh session into the unidentified set.
    ///
    /// Re-registering a known session is a warn-level no-op. Returns the
    /// handler new frames are routed to.
    pub fn register(&self, session: SessionHandle) -> Handler {
        let id = session.id();
        let mut correlation = sync::lock(&self.session_room);
        if correlation.contains_key(&id) {
            tracing::warn!(session = id, "session already registered");
            return Handler::Unjoined;
        }
        correlation.insert(id, None);
        drop(correlation);

        sync::lock(&self.unidentified).insert(id, session);
        Handler::Unjoined
    }

    /// Forget a session entirely.
    ///
    /// Leaves its room if it had one and collects the room when it empties.
    /// Idempotent; concurrent unregistrations converge to one effective
    /// removal. A no-op once shutdown has begun.
    pub fn unregister(&self, session_id: SessionId) {
        if self.shutting_down.load(Ordering::Relaxed) {
            return;
        }

        let room_name = match sync::lock(&self.session_room).remove(&session_id) {
            Some(name) => name,
            // Already unregistered.
            None => return,
        };

        match room_name {
            Some(name) => {
                self.leave_room(&name, session_id);
            }
            None => {
                sync::lock(&self.unidentified).remove(&session_id);
            }
        }
    }

    /// Move `session` from unidentified into the room called `name`,
    /// creating the room on its first join.
    ///
    /// Returns the post-join snapshot and player id. Failure (room full)
    /// leaves all state unchanged, including not retaining a room created
    /// for this call.
    pub fn attach_to_room(
        &self,
        session: &SessionHandle,
        name: &str,
        nick: &str,
    ) -> Option<(Snapshot, u64)> {
        let joined = {
            let mut rooms = sync::lock(&self.rooms);
            let (room, created) = match rooms.get(name) {
                Some(room) => (Arc::clone(room), false),
                None => {
                    let room = Arc::new(Room::new());
                    rooms.insert(name.to_owned(), Arc::clone(&room));
                    (room, true)
                }
            };

            let joined = room.join(session.clone(), nick, TeamHint::Random);
            if joined.is_none() && created {
                rooms.remove(name);
            }
            joined
        };

        let (snapshot, player_id) = joined?;
        sync::lock(&self.session_room).insert(session.id(), Some(name.to_owned()));
        sync::lock(&self.unidentified).remove(&session.id());
        Some((snapshot, player_id))
    }

    /// Handle a processed `leave`: remove the session from its room and put
    /// it back into the unidentified set.
    ///
    /// Returns the surviving room together with its post-leave snapshot so
    /// the caller can broadcast the new state; `None` when the room emptied
    /// and was collected.
    pub fn detach_to_unjoined(
        &self,
        session: &SessionHandle,
        name: &str,
    ) -> Option<(Arc<Room>, Snapshot)> {
        let survivor = self.leave_room(name, session.id());
        sync::lock(&self.session_room).insert(session.id(), None);
        sync::lock(&self.unidentified).insert(session.id(), session.clone());
        survivor
    }

    fn leave_room(&self, name: &str, session_id: SessionId) -> Option<(Arc<Room>, Snapshot)> {
        let mut rooms = sync::lock(&self.rooms);
        let room = Arc::clone(rooms.get(name)?);
        room.leave(session_id);
        if room.size() == 0 {
            tracing::debug!(room = name, "room is empty, dropping it");
            rooms.remove(name);
            return None;
        }
        let snapshot = room.snapshot();
        Some((room, snapshot))
    }

    /// Look up a live room.
    pub fn room(&self, name: &str) -> Option<Arc<Room>> {
        sync::lock(&self.rooms).get(name).cloned()
    }

    /// Whether a room with this name is live.
    pub fn has_room(&self, name: &str) -> bool {
        sync::lock(&self.rooms).contains_key(name)
    }

    /// Begin teardown: suppress per-session unregistration.
    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::Relaxed);
        tracing::info!("registry shutdown, sessions are torn down with the runtime");
    }

    /// Number of live rooms.
    pub fn room_count(&self) -> usize {
        sync::lock(&self.rooms).len()
    }

    /// Names of the live rooms.
    pub fn room_names(&self) -> Vec<String> {
        sync::lock(&self.rooms).keys().cloned().collect()
    }

    /// Number of connected-but-unjoined sessions.
    pub fn unidentified_count(&self) -> usize {
        sync::lock(&self.unidentified).len()
    }

    /// Number of known sessions, joined or not.
    pub fn session_count(&self) -> usize {
        sync::lock(&self.session_room).len()
    }

    /// Ids of the unidentified sessions.
    pub fn unidentified_sessions(&self) -> Vec<SessionId> {
        sync::lock(&self.unidentified).keys().copied().collect()
    }

    /// The room name a session is correlated with, if the session is known.
    pub fn room_of(&self, session_id: SessionId) -> Option<Option<String>> {
        sync::lock(&self.session_room).get(&session_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::MAX_PLAYERS_PER_TEAM;

    fn handle(id: SessionId) -> SessionHandle {
        SessionHandle::new(id, "127.0.0.1:0")
    }

    /// dom(session_room) must equal unidentified + room members, and every
    /// correlated session must be a member of its room.
    fn assert_cross_invariant(registry: &Registry) {
        let mut expected: Vec<SessionId> = registry.unidentified_sessions();
        let room_names: Vec<String> = sync::lock(&registry.rooms).keys().cloned().collect();
        for name in room_names {
            let room = registry.room(&name).unwrap();
            expected.extend(room.member_sessions());
        }
        expected.sort_unstable();

        let mut domain: Vec<SessionId> =
            sync::lock(&registry.session_room).keys().copied().collect();
        domain.sort_unstable();
        assert_eq!(domain, expected);

        for (session, correlated) in sync::lock(&registry.session_room).iter() {
            match correlated {
                Some(name) => {
                    let room = registry.room(name).expect("correlated room must be live");
                    assert!(room.member_sessions().contains(session));
                }
                None => {
                    assert!(registry.unidentified_sessions().contains(session));
                }
            }
        }
    }

    #[test]
    fn register_unregister_restores_prior_state() {
        let registry = Registry::new();

        registry.register(handle(1));
        assert_eq!(registry.session_count(), 1);
        assert_eq!(registry.unidentified_count(), 1);
        assert_cross_invariant(&registry);

        registry.unregister(1);
        assert_eq!(registry.session_count(), 0);
        assert_eq!(registry.unidentified_count(), 0);
        assert_cross_invariant(&registry);
    }

    #[test]
    fn reregister_is_a_noop() {
        let registry = Registry::new();
        registry.register(handle(1));
        registry.register(handle(1));

        assert_eq!(registry.session_count(), 1);
        assert_eq!(registry.unidentified_count(), 1);
    }

    #[test]
    fn unregister_is_idempotent() {
        let registry = Registry::new();
        registry.register(handle(1));

        registry.unregister(1);
        registry.unregister(1);

        assert_eq!(registry.session_count(), 0);
    }

    #[test]
    fn attach_creates_room_and_moves_session() {
        let registry = Registry::new();
        let session = handle(1);
        registry.register(session.clone());

        let (snapshot, player_id) = registry.attach_to_room(&session, "room1", "ana").unwrap();

        assert_eq!(player_id, 0);
        assert_eq!(snapshot.players.len(), 1);
        assert!(registry.has_room("room1"));
        assert_eq!(registry.unidentified_count(), 0);
        assert_eq!(registry.room_of(1), Some(Some("room1".to_owned())));
        assert_cross_invariant(&registry);
    }

    #[test]
    fn failed_attach_leaves_state_unchanged() {
        let registry = Registry::new();
        for id in 0..(2 * MAX_PLAYERS_PER_TEAM) as SessionId {
            let session = handle(id);
            registry.register(session.clone());
            registry.attach_to_room(&session, "big", "p").unwrap();
        }

        let late = handle(99);
        registry.register(late.clone());
        assert!(registry.attach_to_room(&late, "big", "late").is_none());

        assert_eq!(registry.room("big").unwrap().size(), 2 * MAX_PLAYERS_PER_TEAM);
        assert_eq!(registry.room_of(99), Some(None));
        assert_eq!(registry.unidentified_count(), 1);
        assert_cross_invariant(&registry);
    }

    #[test]
    fn detach_returns_session_to_unidentified() {
        let registry = Registry::new();
        let first = handle(1);
        let second = handle(2);
        registry.register(first.clone());
        registry.register(second.clone());
        registry.attach_to_room(&first, "room1", "ana").unwrap();
        registry.attach_to_room(&second, "room1", "bo").unwrap();

        let (room, snapshot) = registry.detach_to_unjoined(&first, "room1").unwrap();

        assert_eq!(room.size(), 1);
        assert_eq!(snapshot.players.len(), 1);
        assert_eq!(registry.room_of(1), Some(None));
        assert_eq!(registry.unidentified_count(), 1);
        assert_cross_invariant(&registry);
    }

    #[test]
    fn detach_of_last_member_collects_the_room() {
        let registry = Registry::new();
        let session = handle(1);
        registry.register(session.clone());
        registry.attach_to_room(&session, "solo", "ana").unwrap();

        assert!(registry.detach_to_unjoined(&session, "solo").is_none());

        assert!(!registry.has_room("solo"));
        assert_eq!(registry.room_count(), 0);
        assert_cross_invariant(&registry);
    }

    #[test]
    fn unregister_of_last_member_collects_the_room() {
        let registry = Registry::new();
        let session = handle(1);
        registry.register(session.clone());
        registry.attach_to_room(&session, "solo", "ana").unwrap();

        registry.unregister(1);

        assert!(!registry.has_room("solo"));
        assert_eq!(registry.session_count(), 0);
        assert_cross_invariant(&registry);
    }

    #[test]
    fn unregister_keeps_room_with_remaining_members() {
        let registry = Registry::new();
        let first = handle(1);
        let second = handle(2);
        registry.register(first.clone());
        registry.register(second.clone());
        registry.attach_to_room(&first, "room1", "ana").unwrap();
        registry.attach_to_room(&second, "room1", "bo").unwrap();

        registry.unregister(1);

        assert!(registry.has_room("room1"));
        assert_eq!(registry.room("room1").unwrap().size(), 1);
        assert_cross_invariant(&registry);
    }

    #[test]
    fn rejoin_after_leave_gets_a_greater_player_id() {
        let registry = Registry::new();
        let first = handle(1);
        let anchor = handle(2);
        registry.register(first.clone());
        registry.register(anchor.clone());
        registry.attach_to_room(&anchor, "room1", "anchor").unwrap();
        let (_, before) = registry.attach_to_room(&first, "room1", "ana").unwrap();

        registry.detach_to_unjoined(&first, "room1");
        let (_, after) = registry.attach_to_room(&first, "room1", "ana").unwrap();

        assert!(after > before);
        assert_cross_invariant(&registry);
    }

    #[test]
    fn shutdown_suppresses_unregistration() {
        let registry = Registry::new();
        let session = handle(1);
        registry.register(session.clone());
        registry.attach_to_room(&session, "room1", "ana").unwrap();

        registry.shutdown();
        registry.unregister(1);

        // Teardown owns the state now; nothing was touched.
        assert_eq!(registry.session_count(), 1);
        assert!(registry.has_room("room1"));
    }
}
