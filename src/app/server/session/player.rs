use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use crate::app::{server::session::ConnectionId, types::UNNAMED_CUBER};

/// Mirrors the phase of the room the player last observed
#[derive(serde::Serialize, serde::Deserialize, Copy, Clone, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlayerStatus {
    #[default]
    NotStarted,
    InProgress,
    Finished,
}

#[derive(Clone, Debug)]
pub struct Player {
    pub id: ConnectionId,
    pub username: String,
    pub status: PlayerStatus,
    /// Zero until a solve completes
    pub solve_time: Duration,
    pub is_dnf: bool,
    /// Cleared once the transport reports the connection gone. A room keeps the player for its
    /// final tally even after that.
    pub connected: bool,
}

/// Players are shared between the registry and the room currently seating them
pub type SharedPlayer = Arc<Mutex<Player>>;

impl Player {
    pub fn new(id: ConnectionId, username: &str) -> Self {
        let username = username.trim();
        let username = if username.is_empty() {
            UNNAMED_CUBER.to_string()
        } else {
            username.to_string()
        };

        Self {
            id,
            username,
            status: PlayerStatus::NotStarted,
            solve_time: Duration::ZERO,
            is_dnf: false,
            connected: true,
        }
    }

    pub fn into_shared(self) -> SharedPlayer {
        Arc::new(Mutex::new(self))
    }

    /// Forget everything about the previous race
    pub fn reset(&mut self) {
        self.status = PlayerStatus::NotStarted;
        self.solve_time = Duration::ZERO;
        self.is_dnf = false;
    }

    pub fn has_result(&self) -> bool {
        self.status == PlayerStatus::Finished
    }

    pub fn record_solve(&mut self, solve_time: Duration) {
        self.solve_time = solve_time;
        self.is_dnf = false;
        self.status = PlayerStatus::Finished;
    }

    pub fn record_dnf(&mut self) {
        self.solve_time = Duration::ZERO;
        self.is_dnf = true;
        self.status = PlayerStatus::Finished;
    }
}

/// Lock a shared player. Player updates never panic halfway, so a poisoned lock still holds
/// consistent data.
pub fn lock(player: &SharedPlayer) -> MutexGuard<'_, Player> {
    player.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_username_uses_fallback() {
        let player = Player::new(ConnectionId::from("c1"), "");
        assert_eq!(player.username, UNNAMED_CUBER);

        let player = Player::new(ConnectionId::from("c2"), "   ");
        assert_eq!(player.username, UNNAMED_CUBER);

        let player = Player::new(ConnectionId::from("c3"), "Feliks");
        assert_eq!(player.username, "Feliks");
    }

    #[test]
    fn reset_clears_race_state() {
        let mut player = Player::new(ConnectionId::from("c1"), "Max");
        player.status = PlayerStatus::InProgress;
        player.record_dnf();
        assert!(player.has_result());

        player.reset();

        assert_eq!(player.status, PlayerStatus::NotStarted);
        assert_eq!(player.solve_time, Duration::ZERO);
        assert!(!player.is_dnf);
        assert!(!player.has_result());
    }

    #[test]
    fn solve_clears_dnf() {
        let mut player = Player::new(ConnectionId::from("c1"), "Yusheng");
        player.record_dnf();
        player.record_solve(Duration::from_millis(4_220));

        assert!(!player.is_dnf);
        assert_eq!(player.solve_time, Duration::from_millis(4_220));
        assert_eq!(player.status, PlayerStatus::Finished);
    }
}
