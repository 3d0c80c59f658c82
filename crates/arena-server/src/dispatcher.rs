//! Phase-selected handlers for validated client frames.
//!
//! Each session carries a [`Handler`] that its read task owns. Frames are
//! routed to the unjoined handler (accepting only `join`) or the room
//! handler (accepting `update` and `leave` for the session's current room).
//! Frames that do not fit the current phase get the warning frame and leave
//! the session where it is.

use arena_proto::{join_full, join_success, update_broadcast, warning_unidentified, ClientMessage};

use crate::{registry::Registry, session::SessionHandle};

/// Which handler a session's frames are routed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handler {
    /// The session has not joined a room.
    Unjoined,
    /// The session is a member of the named room.
    InRoom {
        /// Room name.
        room: String,
    },
}

/// Route one validated frame to the handler selected by the session's
/// current phase, updating the phase on join and leave.
pub fn dispatch(
    registry: &Registry,
    session: &SessionHandle,
    handler: &mut Handler,
    message: ClientMessage,
) {
    match handler.clone() {
        Handler::Unjoined => dispatch_unjoined(registry, session, handler, message),
        Handler::InRoom { room } => dispatch_in_room(registry, session, handler, &room, message),
    }
}

fn dispatch_unjoined(
    registry: &Registry,
    session: &SessionHandle,
    handler: &mut Handler,
    message: ClientMessage,
) {
    match message {
        ClientMessage::Join { id, nick, game } => {
            match registry.attach_to_room(session, &game, &nick) {
                Some((snapshot, player_id)) => {
                    tracing::info!(
                        session = session.id(),
                        room = %game,
                        player_id,
                        nick = %nick,
                        "session joined"
                    );
                    session.write(join_success(id, player_id, &snapshot));
                    *handler = Handler::InRoom { room: game };
                }
                None => {
                    tracing::debug!(session = session.id(), room = %game, "join rejected, room full");
                    session.write(join_full(id));
                }
            }
        }
        _ => session.write(warning_unidentified()),
    }
}

fn dispatch_in_room(
    registry: &Registry,
    session: &SessionHandle,
    handler: &mut Handler,
    room_name: &str,
    message: ClientMessage,
) {
    match message {
        ClientMessage::Update { position, angle, .. } => {
            if let Some(room) = registry.room(room_name) {
                room.apply_update(session.id(), position, angle);
                room.broadcast(&update_broadcast(&room.snapshot()));
            }
        }
        ClientMessage::Leave => {
            tracing::info!(session = session.id(), room = room_name, "session left");
            if let Some((room, snapshot)) = registry.detach_to_unjoined(session, room_name) {
                room.broadcast(&update_broadcast(&snapshot));
            }
            *handler = Handler::Unjoined;
        }
        ClientMessage::Join { .. } => session.write(warning_unidentified()),
    }
}
