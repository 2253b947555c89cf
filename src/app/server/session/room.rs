use std::{collections::HashSet, time::Instant};

use rand::Rng;

use crate::app::{
    errors::ApiError,
    server::session::{
        events::{PlayerSummary, ServerEvent},
        player::{self, PlayerStatus, SharedPlayer},
        ConnectionId, RoomId,
    },
    utils,
};

#[derive(serde::Serialize, serde::Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomStatus {
    GameNotStarted,
    GameInProgress,
    GameFinished,
}

/// A group of players racing the same scramble.
///
/// The lifecycle only moves forward: `GameNotStarted -> GameInProgress -> GameFinished`. A new
/// game, including a rematch, is always a new room.
#[derive(Debug)]
pub struct Room {
    pub room_id: RoomId,
    pub max_player_count: usize,
    status: RoomStatus,
    /// Join order
    players: Vec<SharedPlayer>,
    rematch_votes: HashSet<ConnectionId>,
    scramble: Option<String>,
    started_at: Option<Instant>,
    finished_at: Option<Instant>,
}

impl Room {
    pub fn new(room_id: RoomId, max_player_count: usize) -> Self {
        Self {
            room_id,
            max_player_count: max_player_count.max(1),
            status: RoomStatus::GameNotStarted,
            players: vec![],
            rematch_votes: HashSet::new(),
            scramble: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn status(&self) -> RoomStatus {
        self.status
    }

    pub fn occupancy(&self) -> usize {
        self.players.len()
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= self.max_player_count
    }

    /// Open for matchmaking
    pub fn is_joinable(&self) -> bool {
        self.status == RoomStatus::GameNotStarted && !self.is_full()
    }

    pub fn scramble(&self) -> Option<&str> {
        self.scramble.as_deref()
    }

    pub fn finished_at(&self) -> Option<Instant> {
        self.finished_at
    }

    pub fn contains(&self, connection_id: &ConnectionId) -> bool {
        self.position(connection_id).is_some()
    }

    pub fn player(&self, connection_id: &ConnectionId) -> Option<SharedPlayer> {
        self.position(connection_id)
            .map(|index| SharedPlayer::clone(&self.players[index]))
    }

    pub fn occupant_ids(&self) -> Vec<ConnectionId> {
        self.players
            .iter()
            .map(|player| player::lock(player).id.clone())
            .collect()
    }

    pub fn summaries(&self) -> Vec<PlayerSummary> {
        self.players
            .iter()
            .map(|player| PlayerSummary::from(&*player::lock(player)))
            .collect()
    }

    fn position(&self, connection_id: &ConnectionId) -> Option<usize> {
        self.players
            .iter()
            .position(|player| &player::lock(player).id == connection_id)
    }

    /// Seat a player. Seating someone who is already here changes nothing.
    ///
    /// Returns the occupancy after the join.
    pub fn add_player(&mut self, player: SharedPlayer) -> Result<usize, ApiError> {
        let connection_id = player::lock(&player).id.clone();
        if self.contains(&connection_id) {
            return Ok(self.players.len());
        }

        if self.status != RoomStatus::GameNotStarted {
            return Err(ApiError::RoomNotJoinable {
                room_id: self.room_id.clone(),
            });
        }

        if self.is_full() {
            return Err(ApiError::CapacityExceeded {
                room_id: self.room_id.clone(),
            });
        }

        self.players.push(player);
        Ok(self.players.len())
    }

    /// Unseat a player, dropping any rematch vote they cast
    pub fn remove_player(&mut self, connection_id: &ConnectionId) -> Option<SharedPlayer> {
        let index = self.position(connection_id)?;
        self.rematch_votes.remove(connection_id);
        Some(self.players.remove(index))
    }

    /// Start the race once the room is full. Below capacity, or once started, this does nothing.
    ///
    /// Returns the `game_started` broadcast when the room transitions.
    pub fn start_game<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        scramble_length: usize,
        now: Instant,
    ) -> Option<ServerEvent> {
        if self.status != RoomStatus::GameNotStarted || self.players.len() != self.max_player_count
        {
            return None;
        }

        let scramble = utils::generate_scramble(rng, scramble_length);
        self.status = RoomStatus::GameInProgress;
        self.started_at = Some(now);
        self.scramble = Some(scramble.clone());

        for player in &self.players {
            let mut player = player::lock(player);
            player.reset();
            player.status = PlayerStatus::InProgress;
        }

        tracing::info!(room_id = %self.room_id, %scramble, "Game started");

        Some(ServerEvent::GameStarted {
            room_id: self.room_id.clone(),
            scramble,
            players: self.summaries(),
        })
    }

    /// Keystroke to relay to the room, tagged with its origin
    pub fn handle_input(&self, connection_id: &ConnectionId, key: String) -> Option<ServerEvent> {
        if !self.contains(connection_id) {
            return None;
        }

        Some(ServerEvent::Input {
            origin_id: connection_id.clone(),
            key,
        })
    }

    /// Record a finished solve, timed from the start of the race.
    ///
    /// Only honored while the race is running and the player has no result yet. The returned
    /// events go to the room channel; the last one is `game_finished` when this completes the
    /// tally.
    pub fn player_solve_complete(
        &mut self,
        connection_id: &ConnectionId,
        now: Instant,
    ) -> Vec<ServerEvent> {
        let (Some(started_at), Some(player)) = (self.started_at, self.player(connection_id)) else {
            return vec![];
        };
        if self.status != RoomStatus::GameInProgress {
            return vec![];
        }

        let solve_time = now.saturating_duration_since(started_at);
        {
            let mut player = player::lock(&player);
            if player.has_result() {
                return vec![];
            }
            player.record_solve(solve_time);
        }

        let mut events = vec![ServerEvent::SolveCompleted {
            connection_id: connection_id.clone(),
            solve_time_ms: u64::try_from(solve_time.as_millis()).unwrap_or(u64::MAX),
        }];
        events.extend(self.finish_if_complete(now));
        events
    }

    /// Mark a player as not finishing. They stay seated so the tally still shows them.
    pub fn player_dnf(&mut self, connection_id: &ConnectionId, now: Instant) -> Vec<ServerEvent> {
        let Some(player) = self.player(connection_id) else {
            return vec![];
        };
        if self.status != RoomStatus::GameInProgress {
            return vec![];
        }

        {
            let mut player = player::lock(&player);
            if player.has_result() {
                return vec![];
            }
            player.record_dnf();
        }

        let mut events = vec![ServerEvent::PlayerDnf {
            connection_id: connection_id.clone(),
        }];
        events.extend(self.finish_if_complete(now));
        events
    }

    /// Close the race when nobody seated is still solving
    pub fn finish_if_complete(&mut self, now: Instant) -> Option<ServerEvent> {
        if self.status != RoomStatus::GameInProgress {
            return None;
        }

        let everyone_done = self
            .players
            .iter()
            .all(|player| player::lock(player).has_result());
        if !everyone_done {
            return None;
        }

        self.status = RoomStatus::GameFinished;
        self.finished_at = Some(now);
        tracing::info!(room_id = %self.room_id, "Game finished");

        Some(ServerEvent::GameFinished {
            room_id: self.room_id.clone(),
            results: self.summaries(),
        })
    }

    /// Register a rematch vote. Votes only count once the game is finished.
    ///
    /// Returns true when every occupant still connected has voted. Occupants who left the room
    /// are not waited for, nor are those whose connection dropped.
    pub fn process_rematch_request(&mut self, connection_id: &ConnectionId) -> bool {
        if self.status != RoomStatus::GameFinished || !self.contains(connection_id) {
            return false;
        }
        self.rematch_votes.insert(connection_id.clone());

        let (accepted, required) = self.rematch_progress();
        accepted == required
    }

    /// Votes cast by connected occupants against how many are needed
    pub fn rematch_progress(&self) -> (usize, usize) {
        let connected = self
            .players
            .iter()
            .map(|player| player::lock(player))
            .filter(|player| player.connected)
            .map(|player| player.id.clone())
            .collect::<Vec<_>>();

        let accepted = connected
            .iter()
            .filter(|connection_id| self.rematch_votes.contains(*connection_id))
            .count();

        (accepted, connected.len())
    }

    pub fn clear_rematch_votes(&mut self) {
        self.rematch_votes.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::app::server::session::player::Player;

    fn seat(room: &mut Room, id: &str) -> SharedPlayer {
        let player = Player::new(ConnectionId::from(id), id).into_shared();
        room.add_player(SharedPlayer::clone(&player)).unwrap();
        player
    }

    fn started_room(ids: &[&str], now: Instant) -> Room {
        let mut room = Room::new(RoomId::from("ROOM1"), ids.len());
        for id in ids {
            seat(&mut room, id);
        }
        let mut rng = StdRng::seed_from_u64(1);
        room.start_game(&mut rng, 10, now).unwrap();
        room
    }

    fn finished_room(ids: &[&str], now: Instant) -> Room {
        let mut room = started_room(ids, now);
        for id in ids {
            room.player_solve_complete(&ConnectionId::from(*id), now);
        }
        assert_eq!(room.status(), RoomStatus::GameFinished);
        room
    }

    #[test]
    fn start_is_gated_on_capacity() {
        let mut rng = StdRng::seed_from_u64(1);
        let now = Instant::now();
        let mut room = Room::new(RoomId::from("ROOM1"), 2);

        seat(&mut room, "a");
        assert!(room.start_game(&mut rng, 10, now).is_none());
        assert!(room.start_game(&mut rng, 10, now).is_none());
        assert_eq!(room.status(), RoomStatus::GameNotStarted);

        let b = seat(&mut room, "b");
        let started = room.start_game(&mut rng, 10, now);
        assert!(matches!(started, Some(ServerEvent::GameStarted { .. })));
        assert_eq!(room.status(), RoomStatus::GameInProgress);
        assert_eq!(player::lock(&b).status, PlayerStatus::InProgress);
        assert_eq!(room.scramble().map(|s| s.split(' ').count()), Some(10));

        // Already running
        assert!(room.start_game(&mut rng, 10, now).is_none());
    }

    #[test]
    fn add_player_enforces_capacity_and_status() {
        let mut room = Room::new(RoomId::from("ROOM1"), 1);
        seat(&mut room, "a");

        let extra = Player::new(ConnectionId::from("b"), "b").into_shared();
        assert_eq!(
            room.add_player(SharedPlayer::clone(&extra)),
            Err(ApiError::CapacityExceeded {
                room_id: RoomId::from("ROOM1")
            })
        );

        let mut rng = StdRng::seed_from_u64(1);
        room.start_game(&mut rng, 5, Instant::now());
        room.remove_player(&ConnectionId::from("a"));
        assert_eq!(
            room.add_player(extra),
            Err(ApiError::RoomNotJoinable {
                room_id: RoomId::from("ROOM1")
            })
        );
    }

    #[test]
    fn seating_twice_is_a_no_op() {
        let mut room = Room::new(RoomId::from("ROOM1"), 3);
        let a = seat(&mut room, "a");

        assert_eq!(room.add_player(a), Ok(1));
        assert_eq!(room.occupant_ids(), vec![ConnectionId::from("a")]);
    }

    #[test]
    fn game_finishes_once_everyone_has_a_result() {
        let start = Instant::now();
        let mut room = started_room(&["a", "b"], start);

        let events =
            room.player_solve_complete(&ConnectionId::from("a"), start + Duration::from_secs(9));
        assert_eq!(
            events,
            vec![ServerEvent::SolveCompleted {
                connection_id: ConnectionId::from("a"),
                solve_time_ms: 9_000,
            }]
        );
        assert_eq!(room.status(), RoomStatus::GameInProgress);

        // A second completion for the same player is ignored
        assert!(room
            .player_solve_complete(&ConnectionId::from("a"), start + Duration::from_secs(12))
            .is_empty());

        let events = room.player_dnf(&ConnectionId::from("b"), start + Duration::from_secs(15));
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], ServerEvent::GameFinished { .. }));
        assert_eq!(room.status(), RoomStatus::GameFinished);
        assert_eq!(room.finished_at(), Some(start + Duration::from_secs(15)));

        let b = room.player(&ConnectionId::from("b")).unwrap();
        assert!(player::lock(&b).is_dnf);
        let a = room.player(&ConnectionId::from("a")).unwrap();
        assert_eq!(player::lock(&a).solve_time, Duration::from_secs(9));
    }

    #[test]
    fn results_are_ignored_before_the_race_starts() {
        let mut room = Room::new(RoomId::from("ROOM1"), 2);
        seat(&mut room, "a");

        assert!(room
            .player_solve_complete(&ConnectionId::from("a"), Instant::now())
            .is_empty());
        assert!(room
            .player_dnf(&ConnectionId::from("a"), Instant::now())
            .is_empty());
    }

    #[test]
    fn input_is_relayed_only_for_occupants() {
        let room = started_room(&["a", "b"], Instant::now());

        assert_eq!(
            room.handle_input(&ConnectionId::from("a"), "R".to_string()),
            Some(ServerEvent::Input {
                origin_id: ConnectionId::from("a"),
                key: "R".to_string()
            })
        );
        assert!(room
            .handle_input(&ConnectionId::from("z"), "R".to_string())
            .is_none());
    }

    #[test]
    fn rematch_consensus_regardless_of_vote_order() {
        for order in [["a", "b", "c"], ["c", "a", "b"], ["b", "c", "a"]] {
            let mut room = finished_room(&["a", "b", "c"], Instant::now());

            assert!(!room.process_rematch_request(&ConnectionId::from(order[0])));
            // Voting twice does not count twice
            assert!(!room.process_rematch_request(&ConnectionId::from(order[0])));
            assert!(!room.process_rematch_request(&ConnectionId::from(order[1])));
            assert!(room.process_rematch_request(&ConnectionId::from(order[2])));
        }
    }

    #[test]
    fn rematch_consensus_follows_the_live_occupants() {
        let mut room = finished_room(&["a", "b", "c"], Instant::now());

        assert!(!room.process_rematch_request(&ConnectionId::from("a")));
        room.remove_player(&ConnectionId::from("c"));
        assert_eq!(room.rematch_progress(), (1, 2));
        assert!(room.process_rematch_request(&ConnectionId::from("b")));
    }

    #[test]
    fn rematch_does_not_wait_for_dropped_connections() {
        let mut room = finished_room(&["a", "b"], Instant::now());
        let b = room.player(&ConnectionId::from("b")).unwrap();
        player::lock(&b).connected = false;

        assert!(room.process_rematch_request(&ConnectionId::from("a")));
    }

    #[test]
    fn strangers_cannot_vote() {
        let mut room = finished_room(&["a"], Instant::now());

        assert!(!room.process_rematch_request(&ConnectionId::from("z")));
        assert_eq!(room.rematch_progress(), (0, 1));
    }

    #[test]
    fn votes_before_the_finish_are_ignored() {
        let mut room = Room::new(RoomId::from("ROOM1"), 2);
        seat(&mut room, "a");
        assert!(!room.process_rematch_request(&ConnectionId::from("a")));
        assert_eq!(room.rematch_progress(), (0, 1));

        let mut running = started_room(&["a"], Instant::now());
        assert!(!running.process_rematch_request(&ConnectionId::from("a")));
        assert_eq!(running.rematch_progress(), (0, 1));
    }
}
