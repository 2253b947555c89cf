use std::time::Instant;

use rand::{rngs::StdRng, SeedableRng};

use crate::app::{
    errors::{ApiError, ResultExtApp},
    server::session::{
        directory::RoomDirectory,
        events::{ClientEvent, ServerEvent},
        hub::{ConnectionHub, SessionChannel},
        player,
        registry::PlayerRegistry,
        room::RoomStatus,
        ConnectionId, RoomId,
    },
    types::GameSettings,
};

/// Validates inbound events against the registry and the directory, applies them, and fans the
/// outcome out through the hub.
///
/// Handlers expect to be called one at a time; see [`super::dispatcher`].
pub struct SessionCoordinator {
    registry: PlayerRegistry,
    directory: RoomDirectory,
    hub: ConnectionHub,
    settings: GameSettings,
    rng: StdRng,
}

impl SessionCoordinator {
    pub fn new(
        registry: PlayerRegistry,
        directory: RoomDirectory,
        hub: ConnectionHub,
        settings: GameSettings,
    ) -> Self {
        Self {
            registry,
            directory,
            hub,
            settings,
            rng: StdRng::from_entropy(),
        }
    }

    /// Empty registry, directory and hub sized by the settings
    pub fn from_settings(settings: GameSettings) -> Self {
        let directory = RoomDirectory::new(settings.max_player_count, settings.room_code_length);
        Self::new(PlayerRegistry::new(), directory, ConnectionHub::new(), settings)
    }

    /// Replace the source of room codes and scrambles
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn registry(&self) -> &PlayerRegistry {
        &self.registry
    }

    pub fn directory(&self) -> &RoomDirectory {
        &self.directory
    }

    pub fn hub(&self) -> &ConnectionHub {
        &self.hub
    }

    pub fn settings(&self) -> &GameSettings {
        &self.settings
    }

    /// A transport opened a connection
    pub fn connect(&mut self, connection_id: ConnectionId, channel: SessionChannel) {
        tracing::info!(%connection_id, "Connection opened");
        self.hub.connect(connection_id, channel);
    }

    /// Apply one inbound event. A rejected event is answered with `invalid` to the connection
    /// that delivered it and has no other effect.
    pub fn handle(&mut self, connection_id: &ConnectionId, event: ClientEvent) {
        let event_name = event.name();
        tracing::debug!(%connection_id, event = event_name, "Handling event");

        let result = match event {
            ClientEvent::Initialize { username } => self.initialize(connection_id, &username),
            ClientEvent::JoinRandom => self.join_random(connection_id).map(drop),
            ClientEvent::JoinRematch => self.join_rematch(connection_id).map(drop),
            ClientEvent::Joined { room_id } => self.confirm_join(connection_id, &room_id),
            ClientEvent::Input { origin_id, key } => {
                self.keyboard_input(connection_id, &origin_id, key)
            }
            ClientEvent::CompletedSolve { claimed_id } => {
                self.solve_complete(connection_id, &claimed_id)
            }
            ClientEvent::Disconnect => {
                self.disconnect(connection_id);
                Ok(())
            }
        };

        if let Err(error) = result {
            self.reject(connection_id, event_name, &error);
        }
    }

    pub fn reject(&self, connection_id: &ConnectionId, event_name: &str, error: &ApiError) {
        tracing::warn!(%connection_id, event = event_name, %error, "Rejected event");
        self.hub.send(
            connection_id,
            ServerEvent::Invalid {
                reason: error.reason().to_string(),
            },
        );
    }

    pub fn initialize(
        &mut self,
        connection_id: &ConnectionId,
        username: &str,
    ) -> Result<(), ApiError> {
        let player = self.registry.register(connection_id, username)?;
        tracing::info!(
            %connection_id,
            username = %player::lock(&player).username,
            "Player initialized"
        );

        self.hub.send(
            connection_id,
            ServerEvent::Initialized {
                connection_id: connection_id.clone(),
            },
        );
        Ok(())
    }

    /// Point the player at a room with a free seat. This does not seat them; `joined` does.
    pub fn join_random(&mut self, connection_id: &ConnectionId) -> Result<RoomId, ApiError> {
        self.registry.find(connection_id)?;

        let room_id = self.directory.ensure_joinable_room(&mut self.rng)?;
        tracing::info!(%connection_id, %room_id, "Found a room");

        self.hub.send(
            connection_id,
            ServerEvent::RoomFound {
                room_id: room_id.clone(),
            },
        );
        Ok(room_id)
    }

    /// Vote for a rematch of a finished game. Once every connected occupant has voted, the whole
    /// room is pointed at the next room through its channel. Returns that room's id when this
    /// vote completed the consensus.
    pub fn join_rematch(
        &mut self,
        connection_id: &ConnectionId,
    ) -> Result<Option<RoomId>, ApiError> {
        self.registry.find(connection_id)?;
        let room_id = self.seated_room(connection_id)?;

        let room = self.directory.find_by_id_mut(&room_id)?;
        if room.status() != RoomStatus::GameFinished {
            return Err(ApiError::GameNotFinished { room_id });
        }
        if room.process_rematch_request(connection_id) {
            return self.resolve_rematch(&room_id).map(Some);
        }

        let (accepted, required) = room.rematch_progress();
        tracing::info!(%room_id, accepted, required, "Rematch vote recorded");
        self.hub.broadcast(
            &room_id,
            ServerEvent::RematchPending {
                room_id: room_id.clone(),
                accepted,
                required,
            },
        );
        Ok(None)
    }

    /// Seat the player in the room, leaving whatever room they were in before. Starts the race
    /// when this join fills the room.
    pub fn confirm_join(
        &mut self,
        connection_id: &ConnectionId,
        room_id: &RoomId,
    ) -> Result<(), ApiError> {
        let player = self.registry.find(connection_id)?;
        let target = self.directory.find_by_id(room_id)?;

        if target.contains(connection_id) {
            tracing::debug!(%connection_id, %room_id, "Player already seated in this room");
            return Ok(());
        }
        if target.status() != RoomStatus::GameNotStarted {
            return Err(ApiError::RoomNotJoinable {
                room_id: room_id.clone(),
            });
        }
        if target.is_full() {
            return Err(ApiError::CapacityExceeded {
                room_id: room_id.clone(),
            });
        }

        let now = Instant::now();
        if let Some(previous_room_id) = self.directory.find_containing(connection_id) {
            self.leave_room(connection_id, &previous_room_id, now);
        }
        player::lock(&player).reset();

        let room = self.directory.find_by_id_mut(room_id)?;
        let occupancy = room.add_player(player)?;
        self.hub.join_channel(room_id, connection_id);
        tracing::info!(
            %connection_id,
            %room_id,
            occupancy,
            capacity = room.max_player_count,
            "Player joined room"
        );

        self.hub.broadcast(
            room_id,
            ServerEvent::PlayerJoined {
                room_id: room_id.clone(),
                players: room.summaries(),
            },
        );

        if let Some(started) = room.start_game(&mut self.rng, self.settings.scramble_length, now) {
            self.hub.broadcast(room_id, started);
        }
        Ok(())
    }

    /// Relay a keystroke to the sender's room. The claimed origin has to be the sender.
    pub fn keyboard_input(
        &mut self,
        connection_id: &ConnectionId,
        origin_id: &str,
        key: String,
    ) -> Result<(), ApiError> {
        if origin_id != connection_id.as_str() {
            return Err(ApiError::OriginMismatch {
                connection_id: connection_id.clone(),
                claimed_id: origin_id.to_string(),
            });
        }

        let room_id = self.seated_room(connection_id)?;
        let room = self.directory.find_by_id(&room_id)?;
        if let Some(input) = room.handle_input(connection_id, key) {
            self.hub.broadcast(&room_id, input);
        }
        Ok(())
    }

    /// Record the sender's finished solve. A claim on behalf of another connection is dropped
    /// without a reply.
    pub fn solve_complete(
        &mut self,
        connection_id: &ConnectionId,
        claimed_id: &str,
    ) -> Result<(), ApiError> {
        let room_id = self.seated_room(connection_id)?;

        if claimed_id != connection_id.as_str() {
            tracing::warn!(
                %connection_id,
                claimed_id,
                "Ignoring a solve claimed for another connection"
            );
            return Ok(());
        }

        let room = self.directory.find_by_id_mut(&room_id)?;
        for event in room.player_solve_complete(connection_id, Instant::now()) {
            self.hub.broadcast(&room_id, event);
        }
        Ok(())
    }

    /// The connection is gone. The player always leaves the registry; if they were racing they
    /// stay in the room as a DNF.
    pub fn disconnect(&mut self, connection_id: &ConnectionId) {
        self.hub.disconnect(connection_id);

        match self.registry.remove(connection_id) {
            Some(player) => {
                player::lock(&player).connected = false;
            }
            None => {
                tracing::warn!(
                    %connection_id,
                    "Disconnect from a connection that never initialized"
                );
            }
        }

        let Some(room_id) = self.directory.find_containing(connection_id) else {
            tracing::info!(%connection_id, "Connection closed");
            return;
        };
        let Ok(room) = self.directory.find_by_id_mut(&room_id) else {
            return;
        };

        let now = Instant::now();
        match room.status() {
            RoomStatus::GameNotStarted => {
                self.leave_room(connection_id, &room_id, now);
            }
            RoomStatus::GameInProgress => {
                for event in room.player_dnf(connection_id, now) {
                    self.hub.broadcast(&room_id, event);
                }
            }
            RoomStatus::GameFinished => {
                let (accepted, required) = room.rematch_progress();
                if accepted > 0 && accepted == required {
                    self.settle_rematch(&room_id);
                }
            }
        }
        tracing::info!(%connection_id, %room_id, "Connection closed");
    }

    /// Drop finished rooms nobody needs anymore, along with their channels
    pub fn reap_stale_rooms(&mut self, now: Instant) -> Vec<RoomId> {
        let reaped = self
            .directory
            .reap_finished(now, self.settings.finished_room_ttl());

        for room_id in &reaped {
            self.hub.close_channel(room_id);
        }
        if !reaped.is_empty() {
            tracing::info!(count = reaped.len(), rooms = ?reaped, "Reaped finished rooms");
        }

        reaped
    }

    fn seated_room(&self, connection_id: &ConnectionId) -> Result<RoomId, ApiError> {
        self.directory
            .find_containing(connection_id)
            .to_not_found(ApiError::NotInRoom {
                connection_id: connection_id.clone(),
            })
    }

    fn leave_room(&mut self, connection_id: &ConnectionId, room_id: &RoomId, now: Instant) {
        self.hub.leave_channel(room_id, connection_id);

        let Ok(room) = self.directory.find_by_id_mut(room_id) else {
            return;
        };
        room.remove_player(connection_id);
        let finished = room.finish_if_complete(now);
        let (accepted, required) = room.rematch_progress();
        tracing::info!(%connection_id, %room_id, "Player left room");

        self.hub.broadcast(
            room_id,
            ServerEvent::PlayerLeft {
                room_id: room_id.clone(),
                connection_id: connection_id.clone(),
            },
        );
        if let Some(finished) = finished {
            self.hub.broadcast(room_id, finished);
        }
        if accepted > 0 && accepted == required {
            self.settle_rematch(room_id);
        }
    }

    fn resolve_rematch(&mut self, room_id: &RoomId) -> Result<RoomId, ApiError> {
        let next_room_id = self.directory.ensure_joinable_room(&mut self.rng)?;
        if let Ok(room) = self.directory.find_by_id_mut(room_id) {
            room.clear_rematch_votes();
        }
        tracing::info!(%room_id, %next_room_id, "Rematch agreed");

        self.hub.broadcast(
            room_id,
            ServerEvent::RoomFound {
                room_id: next_room_id.clone(),
            },
        );
        Ok(next_room_id)
    }

    /// Resolve a consensus reached without a vote, when a holdout left or dropped
    fn settle_rematch(&mut self, room_id: &RoomId) {
        if let Err(error) = self.resolve_rematch(room_id) {
            tracing::error!(%room_id, %error, "Could not move the room to a rematch");
            self.hub.broadcast(
                room_id,
                ServerEvent::Invalid {
                    reason: error.reason().to_string(),
                },
            );
        }
    }
}
