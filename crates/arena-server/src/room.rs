//! Rooms: two-team membership, state snapshots, and fan-out.
//!
//! A room holds up to [`MAX_PLAYERS_PER_TEAM`] sessions per team. Team
//! vectors keep join order (snapshots list team A then team B in that
//! order); the auxiliary membership map gives O(1) team lookup for leave and
//! update. Writers (join/leave) take the team locks exclusively in a fixed
//! A-before-B order; readers (broadcast/size) take them shared.

use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    RwLock,
};

use arena_proto::{Player, Snapshot};

use crate::session::{SessionHandle, SessionId};

/// Maximum players on one team.
pub const MAX_PLAYERS_PER_TEAM: usize = 5;

/// One of the two team slots in a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Team {
    /// First team; wire id 0.
    A,
    /// Second team; wire id 1.
    B,
}

impl Team {
    /// Wire identifier.
    pub fn team_id(self) -> u64 {
        match self {
            Self::A => 0,
            Self::B => 1,
        }
    }
}

/// Team selection for a join request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TeamHint {
    /// Force team A.
    A,
    /// Force team B.
    B,
    /// Pick the smaller team; ties go to team B.
    #[default]
    Random,
}

/// A member session together with its player state.
#[derive(Debug, Clone)]
struct Member {
    session: SessionHandle,
    player: Player,
}

/// One named multicast group with two capped teams.
#[derive(Debug, Default)]
pub struct Room {
    team_a: RwLock<Vec<Member>>,
    team_b: RwLock<Vec<Member>>,
    /// session -> team, kept consistent with the team vectors.
    membership: RwLock<HashMap<SessionId, Team>>,
    next_player_id: AtomicU64,
}

impl Room {
    /// An empty room.
    pub fn new() -> Self {
        Self::default()
    }

    /// Place `session` on a team and create its player.
    ///
    /// Returns the post-join snapshot and the new player id. Fails iff the
    /// chosen team is full; joining an already-joined session fails and
    /// leaves the room unchanged.
    pub fn join(
        &self,
        session: SessionHandle,
        nick: &str,
        hint: TeamHint,
    ) -> Option<(Snapshot, u64)> {
        // Both team locks in fixed order, also for explicit team picks.
        let mut team_a = crate::sync::write(&self.team_a);
        let mut team_b = crate::sync::write(&self.team_b);
        let mut membership = crate::sync::write(&self.membership);

        let session_id = session.id();
        if membership.contains_key(&session_id) {
            return None;
        }

        let team = match hint {
            TeamHint::A => Team::A,
            TeamHint::B => Team::B,
            TeamHint::Random => {
                if team_a.len() < team_b.len() {
                    Team::A
                } else {
                    Team::B
                }
            }
        };
        let roster = match team {
            Team::A => &mut *team_a,
            Team::B => &mut *team_b,
        };
        if roster.len() >= MAX_PLAYERS_PER_TEAM {
            return None;
        }

        let player_id = self.next_player_id.fetch_add(1, Ordering::Relaxed);
        roster.push(Member {
            session,
            player: Player::new(player_id, team.team_id(), nick),
        });
        membership.insert(session_id, team);

        Some((snapshot_of(&team_a, &team_b), player_id))
    }

    /// Remove `session_id` from whichever team holds it.
    pub fn leave(&self, session_id: SessionId) -> bool {
        let mut team_a = crate::sync::write(&self.team_a);
        let mut team_b = crate::sync::write(&self.team_b);
        let mut membership = crate::sync::write(&self.membership);

        let Some(team) = membership.remove(&session_id) else {
            return false;
        };
        let roster = match team {
            Team::A => &mut *team_a,
            Team::B => &mut *team_b,
        };
        roster.retain(|member| member.session.id() != session_id);
        true
    }

    /// Enqueue `frame` on every member session.
    ///
    /// Delivery is serialized per session by its outbound queue; no ordering
    /// is guaranteed across sessions.
    pub fn broadcast(&self, frame: &str) {
        for member in crate::sync::read(&self.team_a).iter() {
            member.session.write(frame.to_owned());
        }
        for member in crate::sync::read(&self.team_b).iter() {
            member.session.write(frame.to_owned());
        }
    }

    /// Mutate the player owned by `session_id`. Returns `false` when the
    /// session is not a member.
    pub fn apply_update(&self, session_id: SessionId, position: [f64; 2], angle: f64) -> bool {
        let team = { crate::sync::read(&self.membership).get(&session_id).copied() };
        let Some(team) = team else {
            return false;
        };

        let mut roster = match team {
            Team::A => crate::sync::write(&self.team_a),
            Team::B => crate::sync::write(&self.team_b),
        };
        match roster.iter_mut().find(|member| member.session.id() == session_id) {
            Some(member) => {
                member.player.position = [position[0] as i64, position[1] as i64];
                member.player.angle = angle;
                true
            }
            None => false,
        }
    }

    /// Current room state.
    pub fn snapshot(&self) -> Snapshot {
        let team_a = crate::sync::read(&self.team_a);
        let team_b = crate::sync::read(&self.team_b);
        snapshot_of(&team_a, &team_b)
    }

    /// Number of member sessions.
    pub fn size(&self) -> usize {
        crate::sync::read(&self.team_a).len() + crate::sync::read(&self.team_b).len()
    }

    /// Session ids of all members, team A first.
    pub fn member_sessions(&self) -> Vec<SessionId> {
        let team_a = crate::sync::read(&self.team_a);
        let team_b = crate::sync::read(&self.team_b);
        team_a
            .iter()
            .chain(team_b.iter())
            .map(|member| member.session.id())
            .collect()
    }
}

// Composes from already-held guards; never re-acquires a team lock.
fn snapshot_of(team_a: &[Member], team_b: &[Member]) -> Snapshot {
    let players = team_a
        .iter()
        .chain(team_b.iter())
        .map(|member| member.player.clone())
        .collect();
    Snapshot::new(players)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_proto::DEFAULT_HEALTH;

    fn handle(id: SessionId) -> SessionHandle {
        SessionHandle::new(id, "127.0.0.1:0")
    }

    #[test]
    fn first_random_joiner_goes_to_team_b() {
        let room = Room::new();

        let (snapshot, player_id) = room.join(handle(1), "ana", TeamHint::Random).unwrap();

        assert_eq!(player_id, 0);
        assert_eq!(snapshot.players.len(), 1);
        assert_eq!(snapshot.players[0].team_id, Team::B.team_id());
    }

    #[test]
    fn second_random_joiner_goes_to_the_other_team() {
        let room = Room::new();
        room.join(handle(1), "ana", TeamHint::Random).unwrap();

        let (snapshot, _) = room.join(handle(2), "bo", TeamHint::Random).unwrap();

        let teams: Vec<u64> = snapshot.players.iter().map(|p| p.team_id).collect();
        assert!(teams.contains(&0));
        assert!(teams.contains(&1));
    }

    #[test]
    fn join_creates_player_with_defaults() {
        let room = Room::new();

        let (snapshot, _) = room.join(handle(1), "ana", TeamHint::A).unwrap();

        let player = &snapshot.players[0];
        assert_eq!(player.nick, "ana");
        assert_eq!(player.health, DEFAULT_HEALTH);
        assert_eq!(player.position, [0, 0]);
        assert_eq!(player.angle, 0.0);
    }

    #[test]
    fn join_fails_when_team_is_full() {
        let room = Room::new();
        for id in 0..MAX_PLAYERS_PER_TEAM as u64 {
            room.join(handle(id), "p", TeamHint::A).unwrap();
        }

        assert!(room.join(handle(99), "late", TeamHint::A).is_none());
        assert_eq!(room.size(), MAX_PLAYERS_PER_TEAM);
    }

    #[test]
    fn eleventh_random_joiner_is_rejected() {
        let room = Room::new();
        for id in 0..(2 * MAX_PLAYERS_PER_TEAM) as u64 {
            assert!(room.join(handle(id), "p", TeamHint::Random).is_some());
        }

        assert!(room.join(handle(99), "late", TeamHint::Random).is_none());
        assert_eq!(room.size(), 2 * MAX_PLAYERS_PER_TEAM);
    }

    #[test]
    fn rejoin_of_member_fails_and_leaves_room_unchanged() {
        let room = Room::new();
        room.join(handle(1), "ana", TeamHint::Random).unwrap();

        assert!(room.join(handle(1), "ana", TeamHint::Random).is_none());
        assert_eq!(room.size(), 1);
    }

    #[test]
    fn leave_removes_the_member() {
        let room = Room::new();
        room.join(handle(1), "ana", TeamHint::Random).unwrap();
        room.join(handle(2), "bo", TeamHint::Random).unwrap();

        assert!(room.leave(1));
        assert_eq!(room.size(), 1);
        assert_eq!(room.member_sessions(), vec![2]);
    }

    #[test]
    fn leave_of_stranger_returns_false() {
        let room = Room::new();
        room.join(handle(1), "ana", TeamHint::Random).unwrap();

        assert!(!room.leave(42));
        assert_eq!(room.size(), 1);
    }

    #[test]
    fn player_ids_strictly_increase_across_rejoin() {
        let room = Room::new();
        let (_, first) = room.join(handle(1), "ana", TeamHint::Random).unwrap();
        room.leave(1);

        let (_, second) = room.join(handle(1), "ana", TeamHint::Random).unwrap();

        assert!(second > first);
    }

    #[test]
    fn snapshot_lists_team_a_before_team_b_in_join_order() {
        let room = Room::new();
        room.join(handle(1), "b1", TeamHint::B).unwrap();
        room.join(handle(2), "a1", TeamHint::A).unwrap();
        room.join(handle(3), "a2", TeamHint::A).unwrap();

        let snapshot = room.snapshot();
        let nicks: Vec<&str> = snapshot.players.iter().map(|p| p.nick.as_str()).collect();
        assert_eq!(nicks, vec!["a1", "a2", "b1"]);
    }

    #[test]
    fn apply_update_mutates_own_player_only() {
        let room = Room::new();
        room.join(handle(1), "ana", TeamHint::A).unwrap();
        room.join(handle(2), "bo", TeamHint::B).unwrap();

        assert!(room.apply_update(2, [10.5, -3.25], 1.5));

        let snapshot = room.snapshot();
        let bo = snapshot.players.iter().find(|p| p.nick == "bo").unwrap();
        assert_eq!(bo.position, [10, -3]);
        assert_eq!(bo.angle, 1.5);

        let ana = snapshot.players.iter().find(|p| p.nick == "ana").unwrap();
        assert_eq!(ana.position, [0, 0]);
    }

    #[test]
    fn apply_update_for_stranger_returns_false() {
        let room = Room::new();
        assert!(!room.apply_update(7, [1.0, 1.0], 0.0));
    }

    #[test]
    fn broadcast_reaches_every_member() {
        let room = Room::new();
        let first = handle(1);
        let second = handle(2);
        room.join(first.clone(), "ana", TeamHint::A).unwrap();
        room.join(second.clone(), "bo", TeamHint::B).unwrap();

        room.broadcast("state");

        assert_eq!(first.pending_frames(), vec!["state".to_owned()]);
        assert_eq!(second.pending_frames(), vec!["state".to_owned()]);
    }

    #[test]
    fn broadcast_skips_departed_members() {
        let room = Room::new();
        let first = handle(1);
        let second = handle(2);
        room.join(first.clone(), "ana", TeamHint::A).unwrap();
        room.join(second.clone(), "bo", TeamHint::B).unwrap();
        room.leave(2);

        room.broadcast("state");

        assert_eq!(first.pending_frames().len(), 1);
        assert!(second.pending_frames().is_empty());
    }
}
