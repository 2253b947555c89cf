use std::collections::HashMap;

use crate::app::{
    errors::{ApiError, ResultExtApp},
    server::session::{
        player::{Player, SharedPlayer},
        ConnectionId,
    },
};

/// Every initialized connection and its player. Lives as long as the process.
#[derive(Default)]
pub struct PlayerRegistry {
    players: HashMap<ConnectionId, SharedPlayer>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails if the connection already has a player; the existing player is left untouched
    pub fn register(
        &mut self,
        connection_id: &ConnectionId,
        username: &str,
    ) -> Result<SharedPlayer, ApiError> {
        if self.players.contains_key(connection_id) {
            return Err(ApiError::DuplicateInitialize {
                connection_id: connection_id.clone(),
            });
        }

        let player = Player::new(connection_id.clone(), username).into_shared();
        self.players
            .insert(connection_id.clone(), SharedPlayer::clone(&player));

        Ok(player)
    }

    pub fn find(&self, connection_id: &ConnectionId) -> Result<SharedPlayer, ApiError> {
        self.players
            .get(connection_id)
            .cloned()
            .to_not_found(ApiError::PlayerNotFound {
                connection_id: connection_id.clone(),
            })
    }

    pub fn remove(&mut self, connection_id: &ConnectionId) -> Option<SharedPlayer> {
        self.players.remove(connection_id)
    }

    pub fn contains(&self, connection_id: &ConnectionId) -> bool {
        self.players.contains_key(connection_id)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{server::session::player, types::UNNAMED_CUBER};

    #[test]
    fn register_then_find() {
        let mut registry = PlayerRegistry::new();
        let id = ConnectionId::from("c1");

        registry.register(&id, "").unwrap();
        let player = registry.find(&id).unwrap();

        assert_eq!(player::lock(&player).username, UNNAMED_CUBER);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn second_register_is_rejected_and_keeps_the_original() {
        let mut registry = PlayerRegistry::new();
        let id = ConnectionId::from("c1");

        registry.register(&id, "first").unwrap();
        let error = registry.register(&id, "second").unwrap_err();

        assert_eq!(error.reason(), "duplicate_initialize");
        let player = registry.find(&id).unwrap();
        assert_eq!(player::lock(&player).username, "first");
    }

    #[test]
    fn remove_forgets_the_player() {
        let mut registry = PlayerRegistry::new();
        let id = ConnectionId::from("c1");
        registry.register(&id, "gone soon").unwrap();

        assert!(registry.remove(&id).is_some());
        assert!(registry.remove(&id).is_none());
        assert!(registry.find(&id).unwrap_err().is_not_found());
        assert!(registry.is_empty());
    }
}
