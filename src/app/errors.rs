use thiserror::Error;

use crate::app::server::session::{ConnectionId, RoomId};

/// Reasons an inbound event is rejected. None of these are fatal; the offending connection is
/// sent an `invalid` notification and the event is dropped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("No player is registered for connection {connection_id}")]
    PlayerNotFound { connection_id: ConnectionId },
    #[error("Room {room_id} does not exist")]
    RoomNotFound { room_id: RoomId },
    #[error("Connection {connection_id} is not seated in any room")]
    NotInRoom { connection_id: ConnectionId },
    #[error("Connection {connection_id} has already been initialized")]
    DuplicateInitialize { connection_id: ConnectionId },
    #[error("Room {room_id} is full")]
    CapacityExceeded { room_id: RoomId },
    #[error("Room {room_id} is no longer accepting players")]
    RoomNotJoinable { room_id: RoomId },
    #[error("Room {room_id} has not finished its game")]
    GameNotFinished { room_id: RoomId },
    #[error("No free room code left after {attempts} attempts")]
    RoomCodesExhausted { attempts: usize },
    #[error("Event claims origin {claimed_id} but was delivered by {connection_id}")]
    OriginMismatch {
        connection_id: ConnectionId,
        claimed_id: String,
    },
    #[error("Could not understand the event: {message}")]
    MalformedEvent { message: String },
}

impl ApiError {
    /// Reason code carried by the `invalid` notification
    pub fn reason(&self) -> &'static str {
        match self {
            Self::PlayerNotFound { .. } => "player_not_found",
            Self::RoomNotFound { .. } | Self::NotInRoom { .. } => "room_not_found",
            Self::DuplicateInitialize { .. } => "duplicate_initialize",
            Self::CapacityExceeded { .. } => "capacity_exceeded",
            Self::RoomNotJoinable { .. } => "room_not_joinable",
            Self::GameNotFinished { .. } => "game_not_finished",
            Self::RoomCodesExhausted { .. } => "room_codes_exhausted",
            Self::OriginMismatch { .. } => "origin_mismatch",
            Self::MalformedEvent { .. } => "malformed_event",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::PlayerNotFound { .. } | Self::RoomNotFound { .. } | Self::NotInRoom { .. }
        )
    }
}

/// The dispatcher task is no longer running, so events cannot be delivered to the session core
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("The session dispatcher has stopped")]
pub struct DispatcherClosed;

pub trait ResultExtApp<T> {
    /// Turn a missing lookup into the given error
    fn to_not_found(self, error: ApiError) -> Result<T, ApiError>;
}

impl<T> ResultExtApp<T> for Option<T> {
    fn to_not_found(self, error: ApiError) -> Result<T, ApiError> {
        self.ok_or(error)
    }
}
