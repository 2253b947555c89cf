use std::time::{Duration, Instant};

use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};

use crate::app::{
    errors::{ApiError, DispatcherClosed},
    server::session::{
        coordinator::SessionCoordinator,
        events::{ClientEvent, ServerEvent},
        hub::SessionChannel,
        ConnectionId,
    },
};

pub enum Command {
    Connect {
        connection_id: ConnectionId,
        channel: SessionChannel,
    },
    Event {
        connection_id: ConnectionId,
        event: ClientEvent,
    },
    /// The transport could not make sense of something the connection sent
    Reject {
        connection_id: ConnectionId,
        /// Name the event claimed to be, or `malformed` when not even that could be read
        event_name: String,
        error: ApiError,
    },
}

/// Cheap to clone; every transport connection holds one
#[derive(Clone)]
pub struct DispatcherHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl DispatcherHandle {
    /// Mint an id for a new connection and register its outbound channel
    pub fn open_connection(
        &self,
    ) -> Result<(ConnectionId, mpsc::UnboundedReceiver<ServerEvent>), DispatcherClosed> {
        let connection_id = ConnectionId::generate();
        let (channel, receiver) = mpsc::unbounded_channel();

        self.send(Command::Connect {
            connection_id: connection_id.clone(),
            channel,
        })?;
        Ok((connection_id, receiver))
    }

    pub fn dispatch(
        &self,
        connection_id: &ConnectionId,
        event: ClientEvent,
    ) -> Result<(), DispatcherClosed> {
        self.send(Command::Event {
            connection_id: connection_id.clone(),
            event,
        })
    }

    pub fn reject(
        &self,
        connection_id: &ConnectionId,
        event_name: impl Into<String>,
        error: ApiError,
    ) -> Result<(), DispatcherClosed> {
        self.send(Command::Reject {
            connection_id: connection_id.clone(),
            event_name: event_name.into(),
            error,
        })
    }

    fn send(&self, command: Command) -> Result<(), DispatcherClosed> {
        self.commands.send(command).map_err(|_| DispatcherClosed)
    }
}

/// Move the coordinator into its own task. Commands are applied strictly one after another, so
/// the session state needs no locking. The task ends, handing the coordinator back, once every
/// handle has been dropped.
pub fn spawn(
    coordinator: SessionCoordinator,
    reap_interval: Duration,
) -> (DispatcherHandle, JoinHandle<SessionCoordinator>) {
    let (commands, receiver) = mpsc::unbounded_channel();
    let task = tokio::spawn(run(coordinator, receiver, reap_interval));

    (DispatcherHandle { commands }, task)
}

async fn run(
    mut coordinator: SessionCoordinator,
    mut commands: mpsc::UnboundedReceiver<Command>,
    reap_interval: Duration,
) -> SessionCoordinator {
    let reap_interval = reap_interval.max(Duration::from_millis(1));
    let mut reaper = time::interval_at(time::Instant::now() + reap_interval, reap_interval);
    reaper.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(command) => apply(&mut coordinator, command),
                None => break,
            },
            _ = reaper.tick() => {
                coordinator.reap_stale_rooms(Instant::now());
            }
        }
    }

    tracing::info!("All dispatcher handles dropped, stopping");
    coordinator
}

fn apply(coordinator: &mut SessionCoordinator, command: Command) {
    match command {
        Command::Connect {
            connection_id,
            channel,
        } => coordinator.connect(connection_id, channel),
        Command::Event {
            connection_id,
            event,
        } => coordinator.handle(&connection_id, event),
        Command::Reject {
            connection_id,
            event_name,
            error,
        } => coordinator.reject(&connection_id, &event_name, &error),
    }
}
