use tokio_stream::{wrappers::UnboundedReceiverStream, StreamExt};

pub use race_grpc::{race_client, race_server, EventFrame, FILE_DESCRIPTOR_SET};

use crate::app::{
    errors::{ApiError, DispatcherClosed},
    server::session::{
        dispatcher::DispatcherHandle,
        events::{ClientEvent, ServerEvent},
    },
};

mod race_grpc {
    // The string specified here must match the proto package name
    tonic::include_proto!("cuberace");

    pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("race");
}

type RaceSessionStream = std::pin::Pin<
    Box<dyn tokio_stream::Stream<Item = Result<EventFrame, tonic::Status>> + Send>,
>;

impl From<DispatcherClosed> for tonic::Status {
    fn from(value: DispatcherClosed) -> Self {
        tracing::error!(error = %value);
        Self::new(tonic::Code::Unavailable, "The server is shutting down")
    }
}

pub fn decode_event(frame: &EventFrame) -> Result<ClientEvent, ApiError> {
    serde_json::from_str(&frame.payload).map_err(|error| ApiError::MalformedEvent {
        message: error.to_string(),
    })
}

/// The `event` tag of a frame that did not decode, for logging the rejection
pub fn frame_event_name(frame: &EventFrame) -> String {
    serde_json::from_str::<serde_json::Value>(&frame.payload)
        .ok()
        .and_then(|value| value.get("event")?.as_str().map(str::to_string))
        .unwrap_or_else(|| "malformed".to_string())
}

pub fn encode_event(event: &ServerEvent) -> Result<EventFrame, tonic::Status> {
    serde_json::to_string(event)
        .map(|payload| EventFrame { payload })
        .map_err(|error| {
            tracing::error!(?error, "Could not serialize event");
            tonic::Status::internal("Could not serialize event")
        })
}

/// Bridges gRPC streams to the session dispatcher. Every `Session` call is one connection.
pub struct RaceGrpc {
    dispatcher: DispatcherHandle,
}

impl RaceGrpc {
    pub fn new(dispatcher: DispatcherHandle) -> Self {
        Self { dispatcher }
    }
}

#[tonic::async_trait]
impl race_server::Race for RaceGrpc {
    type SessionStream = RaceSessionStream;

    async fn session(
        &self,
        request: tonic::Request<tonic::Streaming<EventFrame>>,
    ) -> Result<tonic::Response<Self::SessionStream>, tonic::Status> {
        let mut inbound = request.into_inner();
        let (connection_id, outbound) = self.dispatcher.open_connection()?;
        let dispatcher = self.dispatcher.clone();
        let reader_connection_id = connection_id.clone();

        // Reads client frames until the stream ends, then reports the disconnect exactly once
        tokio::spawn(async move {
            let connection_id = reader_connection_id;
            let mut disconnected = false;

            loop {
                let frame = match inbound.message().await {
                    Ok(Some(frame)) => frame,
                    Ok(None) => break,
                    Err(status) => {
                        tracing::info!(%connection_id, ?status, "Client stream failed");
                        break;
                    }
                };

                let delivered = match decode_event(&frame) {
                    Ok(event) => {
                        disconnected = event == ClientEvent::Disconnect;
                        dispatcher.dispatch(&connection_id, event)
                    }
                    Err(error) => {
                        dispatcher.reject(&connection_id, frame_event_name(&frame), error)
                    }
                };

                if delivered.is_err() || disconnected {
                    break;
                }
            }

            if !disconnected {
                if let Err(error) = dispatcher.dispatch(&connection_id, ClientEvent::Disconnect) {
                    tracing::debug!(%connection_id, %error, "Disconnect was not delivered");
                }
            }
        });

        tracing::info!(%connection_id, "Session stream opened");
        let output_stream =
            UnboundedReceiverStream::new(outbound).map(|event| encode_event(&event));

        Ok(tonic::Response::new(
            Box::pin(output_stream) as Self::SessionStream
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::server::session::RoomId;

    #[test]
    fn frames_decode_to_client_events() {
        let frame = EventFrame {
            payload: r#"{"event":"joined","room_id":"K7QXP"}"#.to_string(),
        };

        assert_eq!(
            decode_event(&frame).unwrap(),
            ClientEvent::Joined {
                room_id: RoomId::from("K7QXP")
            }
        );
    }

    #[test]
    fn garbage_is_a_malformed_event() {
        let frame = EventFrame {
            payload: "not json".to_string(),
        };

        assert_eq!(decode_event(&frame).unwrap_err().reason(), "malformed_event");
        assert_eq!(frame_event_name(&frame), "malformed");
    }

    #[test]
    fn rejected_frames_keep_their_event_name() {
        let frame = EventFrame {
            payload: r#"{"event":"joined","room":"K7QXP"}"#.to_string(),
        };

        assert!(decode_event(&frame).is_err());
        assert_eq!(frame_event_name(&frame), "joined");
    }

    #[test]
    fn server_events_encode_as_json() {
        let frame = encode_event(&ServerEvent::RoomFound {
            room_id: RoomId::from("K7QXP"),
        })
        .unwrap();

        assert_eq!(frame.payload, r#"{"event":"room_found","room_id":"K7QXP"}"#);
    }
}
