use std::collections::HashMap;

use tokio::sync::mpsc;

use crate::app::server::session::{events::ServerEvent, ConnectionId, RoomId};

pub type SessionChannel = mpsc::UnboundedSender<ServerEvent>;

/// Outbound channels of the connected clients, and which room channels they listen on.
///
/// Sending never waits. A client whose receiver is gone simply misses the event.
#[derive(Default)]
pub struct ConnectionHub {
    connections: HashMap<ConnectionId, SessionChannel>,
    room_channels: HashMap<RoomId, Vec<ConnectionId>>,
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&mut self, connection_id: ConnectionId, channel: SessionChannel) {
        if self.connections.insert(connection_id.clone(), channel).is_some() {
            tracing::warn!(%connection_id, "Replaced the channel of an open connection");
        }
    }

    /// Drop the connection's channel and take it off every room channel
    pub fn disconnect(&mut self, connection_id: &ConnectionId) {
        self.connections.remove(connection_id);
        for listeners in self.room_channels.values_mut() {
            listeners.retain(|listener| listener != connection_id);
        }
        self.room_channels.retain(|_, listeners| !listeners.is_empty());
    }

    pub fn is_connected(&self, connection_id: &ConnectionId) -> bool {
        self.connections.contains_key(connection_id)
    }

    pub fn join_channel(&mut self, room_id: &RoomId, connection_id: &ConnectionId) {
        let listeners = self.room_channels.entry(room_id.clone()).or_default();
        if !listeners.contains(connection_id) {
            listeners.push(connection_id.clone());
        }
    }

    pub fn leave_channel(&mut self, room_id: &RoomId, connection_id: &ConnectionId) {
        if let Some(listeners) = self.room_channels.get_mut(room_id) {
            listeners.retain(|listener| listener != connection_id);
            if listeners.is_empty() {
                self.room_channels.remove(room_id);
            }
        }
    }

    pub fn close_channel(&mut self, room_id: &RoomId) {
        self.room_channels.remove(room_id);
    }

    pub fn listeners(&self, room_id: &RoomId) -> &[ConnectionId] {
        self.room_channels
            .get(room_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn send(&self, connection_id: &ConnectionId, event: ServerEvent) {
        let Some(channel) = self.connections.get(connection_id) else {
            tracing::debug!(%connection_id, ?event, "No open channel for connection");
            return;
        };

        if channel.send(event).is_err() {
            tracing::debug!(%connection_id, "Connection stopped listening");
        }
    }

    pub fn broadcast(&self, room_id: &RoomId, event: ServerEvent) {
        for connection_id in self.listeners(room_id) {
            self.send(connection_id, event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room_found(code: &str) -> ServerEvent {
        ServerEvent::RoomFound {
            room_id: RoomId::from(code),
        }
    }

    #[test]
    fn broadcast_reaches_only_the_room_channel() {
        let mut hub = ConnectionHub::new();
        let (a_tx, mut a_rx) = mpsc::unbounded_channel();
        let (b_tx, mut b_rx) = mpsc::unbounded_channel();
        let a = ConnectionId::from("a");
        let b = ConnectionId::from("b");
        let room_id = RoomId::from("ROOM1");
        hub.connect(a.clone(), a_tx);
        hub.connect(b.clone(), b_tx);

        hub.join_channel(&room_id, &a);
        hub.join_channel(&room_id, &a);
        hub.broadcast(&room_id, room_found("NEXT1"));

        assert_eq!(a_rx.try_recv().unwrap(), room_found("NEXT1"));
        assert!(a_rx.try_recv().is_err());
        assert!(b_rx.try_recv().is_err());
    }

    #[test]
    fn closed_receivers_do_not_block_others() {
        let mut hub = ConnectionHub::new();
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, mut b_rx) = mpsc::unbounded_channel();
        let room_id = RoomId::from("ROOM1");
        hub.connect(ConnectionId::from("a"), a_tx);
        hub.connect(ConnectionId::from("b"), b_tx);
        hub.join_channel(&room_id, &ConnectionId::from("a"));
        hub.join_channel(&room_id, &ConnectionId::from("b"));
        drop(a_rx);

        hub.broadcast(&room_id, room_found("NEXT1"));

        assert_eq!(b_rx.try_recv().unwrap(), room_found("NEXT1"));
    }

    #[test]
    fn disconnect_leaves_every_channel() {
        let mut hub = ConnectionHub::new();
        let (a_tx, _a_rx) = mpsc::unbounded_channel();
        let a = ConnectionId::from("a");
        hub.connect(a.clone(), a_tx);
        hub.join_channel(&RoomId::from("ROOM1"), &a);
        hub.join_channel(&RoomId::from("ROOM2"), &a);

        hub.disconnect(&a);

        assert!(!hub.is_connected(&a));
        assert!(hub.listeners(&RoomId::from("ROOM1")).is_empty());
        assert!(hub.listeners(&RoomId::from("ROOM2")).is_empty());
    }

    #[test]
    fn leave_channel_stops_broadcasts() {
        let mut hub = ConnectionHub::new();
        let (a_tx, mut a_rx) = mpsc::unbounded_channel();
        let a = ConnectionId::from("a");
        let room_id = RoomId::from("ROOM1");
        hub.connect(a.clone(), a_tx);
        hub.join_channel(&room_id, &a);
        hub.leave_channel(&room_id, &a);

        hub.broadcast(&room_id, room_found("NEXT1"));

        assert!(a_rx.try_recv().is_err());
    }
}
