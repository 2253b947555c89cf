use std::time::Duration;

/// Shown in place of a username when a player initializes without one
pub const UNNAMED_CUBER: &str = "an unnamed cuber";

/// Characters a room code is drawn from. Look-alikes (`I`, `O`, `0`, `1`) are left out so codes
/// can be read aloud and typed back.
pub const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

#[derive(serde::Deserialize, Debug, Default)]
pub struct ServerConfig {
    pub server: Option<Server>,
    pub game: Option<GameSettings>,
}

#[derive(serde::Deserialize, Debug, Clone)]
pub struct Server {
    pub host: String,
    pub port: String,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: "6969".to_string(),
        }
    }
}

/// Tunables for matchmaking and the race itself
#[derive(serde::Deserialize, Debug, Clone)]
#[serde(default)]
pub struct GameSettings {
    pub max_player_count: usize,
    pub room_code_length: usize,
    pub scramble_length: usize,
    /// How long a finished room stays around for rematch voting
    pub finished_room_ttl_secs: u64,
    pub reap_interval_secs: u64,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            max_player_count: 2,
            room_code_length: 5,
            scramble_length: 20,
            finished_room_ttl_secs: 120,
            reap_interval_secs: 30,
        }
    }
}

impl GameSettings {
    pub fn finished_room_ttl(&self) -> Duration {
        Duration::from_secs(self.finished_room_ttl_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs.max(1))
    }
}
