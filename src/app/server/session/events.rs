use crate::app::server::session::{
    player::{Player, PlayerStatus},
    ConnectionId, RoomId,
};

/// Events a client can send. The tag names are the wire event names.
#[derive(serde::Deserialize, serde::Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientEvent {
    Initialize {
        #[serde(default)]
        username: String,
    },
    JoinRandom,
    JoinRematch,
    /// Confirms membership of a room previously discovered through `room_found`
    Joined { room_id: RoomId },
    Input { origin_id: String, key: String },
    CompletedSolve { claimed_id: String },
    Disconnect,
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Initialize { .. } => "initialize",
            Self::JoinRandom => "join_random",
            Self::JoinRematch => "join_rematch",
            Self::Joined { .. } => "joined",
            Self::Input { .. } => "input",
            Self::CompletedSolve { .. } => "completed_solve",
            Self::Disconnect => "disconnect",
        }
    }
}

/// What the rest of the room sees of a player
#[derive(serde::Deserialize, serde::Serialize, Clone, Debug, PartialEq, Eq)]
pub struct PlayerSummary {
    pub connection_id: ConnectionId,
    pub username: String,
    pub status: PlayerStatus,
    pub solve_time_ms: u64,
    pub is_dnf: bool,
}

impl From<&Player> for PlayerSummary {
    fn from(player: &Player) -> Self {
        Self {
            connection_id: player.id.clone(),
            username: player.username.clone(),
            status: player.status,
            solve_time_ms: u64::try_from(player.solve_time.as_millis()).unwrap_or(u64::MAX),
            is_dnf: player.is_dnf,
        }
    }
}

/// Events the server sends, either to one connection or to a whole room channel
#[derive(serde::Deserialize, serde::Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerEvent {
    Initialized {
        connection_id: ConnectionId,
    },
    Invalid {
        reason: String,
    },
    RoomFound {
        room_id: RoomId,
    },
    PlayerJoined {
        room_id: RoomId,
        players: Vec<PlayerSummary>,
    },
    PlayerLeft {
        room_id: RoomId,
        connection_id: ConnectionId,
    },
    GameStarted {
        room_id: RoomId,
        scramble: String,
        players: Vec<PlayerSummary>,
    },
    Input {
        origin_id: ConnectionId,
        key: String,
    },
    SolveCompleted {
        connection_id: ConnectionId,
        solve_time_ms: u64,
    },
    PlayerDnf {
        connection_id: ConnectionId,
    },
    GameFinished {
        room_id: RoomId,
        results: Vec<PlayerSummary>,
    },
    RematchPending {
        room_id: RoomId,
        accepted: usize,
        required: usize,
    },
}
