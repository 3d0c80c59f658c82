//! Player and room-state wire objects.

use serde::{Deserialize, Serialize};

/// Health assigned to a freshly joined player.
pub const DEFAULT_HEALTH: i32 = 100;

/// One participant as it appears in `players` arrays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    /// Unique id within the room.
    pub player_id: u64,
    /// 0 for team A, 1 for team B.
    pub team_id: u64,
    /// Display name from the join request.
    pub nick: String,
    /// RGB color.
    pub color: [u8; 3],
    /// Health points.
    pub health: i32,
    /// Position on the map.
    pub position: [i64; 2],
    /// Angle relative to the y axis.
    pub angle: f64,
}

impl Player {
    /// A new player with the default health, color, position and angle.
    pub fn new(player_id: u64, team_id: u64, nick: impl Into<String>) -> Self {
        Self {
            player_id,
            team_id,
            nick: nick.into(),
            color: [0, 0, 0],
            health: DEFAULT_HEALTH,
            position: [0, 0],
            angle: 0.0,
        }
    }
}

/// Current state of a room: member players plus the reserved `rays` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Players of team A followed by players of team B, in join order.
    pub players: Vec<Player>,
    /// Reserved. Always serialized as an empty array.
    pub rays: Vec<serde_json::Value>,
}

impl Snapshot {
    /// A snapshot over the given players.
    pub fn new(players: Vec<Player>) -> Self {
        Self { players, rays: Vec::new() }
    }
}
