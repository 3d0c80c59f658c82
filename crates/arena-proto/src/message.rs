//! Client message types, strict validation and server frame builders.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::{errors::VerifyError, player::Snapshot};

/// A validated frame received from a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Request to join a room (`game` on the wire).
    Join {
        /// Client-chosen correlation id, echoed in the response.
        id: u64,
        /// Display name.
        nick: String,
        /// Room name.
        game: String,
    },

    /// State update for the sender's player.
    Update {
        /// Team the client believes it is on.
        team_id: u64,
        /// New position.
        position: [f64; 2],
        /// New angle.
        angle: f64,
    },

    /// Leave the current room.
    Leave,
}

/// Strictly validate one websocket text frame.
///
/// The schemas are closed: a frame must carry exactly the fields of its type,
/// with the exact JSON kinds (`id` and `team_id` unsigned, `position` a
/// two-element array of floats, `angle` a float). Nothing is defaulted; any
/// violation is reported as the matching [`VerifyError`].
pub fn verify(raw: &str) -> Result<ClientMessage, VerifyError> {
    let value: Value = serde_json::from_str(raw).map_err(|_| VerifyError::InvalidJson)?;
    let object = value.as_object().ok_or(VerifyError::TypeNotFound)?;
    let kind = object
        .get("type")
        .and_then(Value::as_str)
        .ok_or(VerifyError::TypeNotFound)?;

    match kind {
        "join" => verify_join(object),
        "update" => verify_update(object),
        "leave" => verify_leave(object),
        _ => Err(VerifyError::UnknownType),
    }
}

fn verify_join(object: &Map<String, Value>) -> Result<ClientMessage, VerifyError> {
    // "type" plus exactly three payload fields.
    if object.len() != 4 {
        return Err(VerifyError::MalformedJoin);
    }

    let id = object
        .get("id")
        .and_then(Value::as_u64)
        .ok_or(VerifyError::MalformedJoin)?;
    let nick = object
        .get("nick")
        .and_then(Value::as_str)
        .ok_or(VerifyError::MalformedJoin)?;
    let game = object
        .get("game")
        .and_then(Value::as_str)
        .ok_or(VerifyError::MalformedJoin)?;

    Ok(ClientMessage::Join { id, nick: nick.to_owned(), game: game.to_owned() })
}

fn verify_update(object: &Map<String, Value>) -> Result<ClientMessage, VerifyError> {
    if object.len() != 4 {
        return Err(VerifyError::MalformedUpdate);
    }

    let team_id = object
        .get("team_id")
        .and_then(Value::as_u64)
        .ok_or(VerifyError::MalformedUpdate)?;
    let position = object
        .get("position")
        .and_then(Value::as_array)
        .ok_or(VerifyError::MalformedUpdate)?;
    if position.len() != 2 {
        return Err(VerifyError::MalformedUpdate);
    }
    let x = as_float(&position[0]).ok_or(VerifyError::MalformedUpdate)?;
    let y = as_float(&position[1]).ok_or(VerifyError::MalformedUpdate)?;
    let angle = object
        .get("angle")
        .and_then(as_float)
        .ok_or(VerifyError::MalformedUpdate)?;

    Ok(ClientMessage::Update { team_id, position: [x, y], angle })
}

fn verify_leave(object: &Map<String, Value>) -> Result<ClientMessage, VerifyError> {
    if object.len() != 1 {
        return Err(VerifyError::MalformedLeave);
    }
    Ok(ClientMessage::Leave)
}

// JSON integers are not accepted where a float is required.
fn as_float(value: &Value) -> Option<f64> {
    if value.is_f64() { value.as_f64() } else { None }
}

/// `{"id":…,"result":"joined","my_id":…,"players":[…],"rays":[]}`
pub fn join_success(id: u64, my_id: u64, snapshot: &Snapshot) -> String {
    json!({
        "id": id,
        "result": "joined",
        "my_id": my_id,
        "players": snapshot.players,
        "rays": snapshot.rays,
    })
    .to_string()
}

/// `{"id":…,"result":"full"}`
pub fn join_full(id: u64) -> String {
    json!({ "id": id, "result": "full" }).to_string()
}

/// `{"type":"update","players":[…],"rays":[]}`
pub fn update_broadcast(snapshot: &Snapshot) -> String {
    json!({
        "type": "update",
        "players": snapshot.players,
        "rays": snapshot.rays,
    })
    .to_string()
}

/// The warning sent for a frame that does not fit the session's phase.
pub fn warning_unidentified() -> String {
    json!({
        "type": "warning",
        "message": "Received an unidentified package.",
        "closed": false,
    })
    .to_string()
}
