use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use rand::Rng;

use crate::app::{
    errors::{ApiError, ResultExtApp},
    server::session::{room::Room, room::RoomStatus, ConnectionId, RoomId},
    utils,
};

/// Draws of a room code before giving up on finding a free one
pub const MAX_ROOM_CODE_ATTEMPTS: usize = 256;

/// All rooms known to this process, keyed by id and kept in creation order
pub struct RoomDirectory {
    rooms: HashMap<RoomId, Room>,
    order: Vec<RoomId>,
    max_player_count: usize,
    room_code_length: usize,
}

impl RoomDirectory {
    pub fn new(max_player_count: usize, room_code_length: usize) -> Self {
        Self {
            rooms: HashMap::new(),
            order: vec![],
            max_player_count,
            room_code_length: room_code_length.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn room_ids(&self) -> &[RoomId] {
        &self.order
    }

    /// First room, in creation order, that is waiting for players and has a free seat
    pub fn find_joinable(&self) -> Option<&Room> {
        self.order
            .iter()
            .filter_map(|room_id| self.rooms.get(room_id))
            .find(|room| room.is_joinable())
    }

    pub fn find_by_id(&self, room_id: &RoomId) -> Result<&Room, ApiError> {
        self.rooms
            .get(room_id)
            .to_not_found(ApiError::RoomNotFound {
                room_id: room_id.clone(),
            })
    }

    pub fn find_by_id_mut(&mut self, room_id: &RoomId) -> Result<&mut Room, ApiError> {
        self.rooms
            .get_mut(room_id)
            .to_not_found(ApiError::RoomNotFound {
                room_id: room_id.clone(),
            })
    }

    /// Id of the room seating this connection, if any
    pub fn find_containing(&self, connection_id: &ConnectionId) -> Option<RoomId> {
        let mut seated_in = self
            .order
            .iter()
            .filter(|room_id| {
                self.rooms
                    .get(*room_id)
                    .is_some_and(|room| room.contains(connection_id))
            });

        let room_id = seated_in.next().cloned();
        let other_room_id = seated_in.next();
        if let Some(other_room_id) = other_room_id {
            tracing::error!(
                %connection_id,
                ?room_id,
                %other_room_id,
                "Player is seated in more than one room"
            );
        }
        debug_assert!(
            other_room_id.is_none(),
            "player {connection_id} is seated in more than one room"
        );

        room_id
    }

    /// Add a room. A room whose id is already present is not added again.
    pub fn insert(&mut self, room: Room) -> &mut Room {
        let room_id = room.room_id.clone();
        if !self.rooms.contains_key(&room_id) {
            self.order.push(room_id.clone());
        }

        self.rooms.entry(room_id).or_insert(room)
    }

    /// Create and register an empty room under a fresh code. Codes are redrawn while they are
    /// already in use, at most [`MAX_ROOM_CODE_ATTEMPTS`] times.
    pub fn create_room<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<&mut Room, ApiError> {
        let room_id = (0..MAX_ROOM_CODE_ATTEMPTS)
            .map(|_| RoomId::from(utils::generate_room_code(rng, self.room_code_length)))
            .find(|candidate| {
                let taken = self.rooms.contains_key(candidate);
                if taken {
                    tracing::debug!(%candidate, "Room code already taken, drawing another");
                }
                !taken
            })
            .ok_or_else(|| {
                tracing::error!(
                    rooms = self.rooms.len(),
                    room_code_length = self.room_code_length,
                    "Could not draw a free room code"
                );
                ApiError::RoomCodesExhausted {
                    attempts: MAX_ROOM_CODE_ATTEMPTS,
                }
            })?;

        tracing::info!(%room_id, "Created a room");
        Ok(self.insert(Room::new(room_id, self.max_player_count)))
    }

    /// The first joinable room, or a new one when none is open. Calling this repeatedly with no
    /// joins in between keeps returning the same room.
    pub fn ensure_joinable_room<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
    ) -> Result<RoomId, ApiError> {
        if let Some(room) = self.find_joinable() {
            return Ok(room.room_id.clone());
        }
        Ok(self.create_room(rng)?.room_id.clone())
    }

    /// Drop rooms that finished more than `ttl` ago. Returns the ids removed.
    pub fn reap_finished(&mut self, now: Instant, ttl: Duration) -> Vec<RoomId> {
        let expired = self
            .order
            .iter()
            .filter(|room_id| {
                self.rooms.get(*room_id).is_some_and(|room| {
                    room.status() == RoomStatus::GameFinished
                        && room.finished_at().is_some_and(|finished_at| {
                            now.saturating_duration_since(finished_at) > ttl
                        })
                })
            })
            .cloned()
            .collect::<Vec<_>>();

        for room_id in &expired {
            self.rooms.remove(room_id);
        }
        self.order.retain(|room_id| self.rooms.contains_key(room_id));

        expired
    }
}
