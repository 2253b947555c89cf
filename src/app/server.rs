pub mod session;

#[cfg(feature = "grpc")]
pub mod grpc;

#[cfg(feature = "grpc")]
pub async fn start_server(
    config: crate::app::types::ServerConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    use grpc::server::{race_server, RaceGrpc, FILE_DESCRIPTOR_SET};
    use session::{coordinator::SessionCoordinator, dispatcher};

    let server_config = config.server.unwrap_or_default();
    let game_settings = config.game.unwrap_or_default();

    let addr: std::net::SocketAddr =
        format!("{}:{}", server_config.host, server_config.port).parse()?;
    tracing::info!("Attempting to run server on {:?}", addr);

    let coordinator = SessionCoordinator::from_settings(game_settings.clone());
    let (dispatcher, _dispatcher_task) =
        dispatcher::spawn(coordinator, game_settings.reap_interval());
    tracing::info!(?game_settings, "Session dispatcher running");

    let reflection_service = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build()?;

    tracing::info!("Server successfully running on {:?}", addr);
    tonic::transport::Server::builder()
        .trace_fn(|request| tracing::info_span!("grpc", uri = %request.uri()))
        .add_service(reflection_service)
        .add_service(race_server::RaceServer::new(RaceGrpc::new(dispatcher)))
        .serve(addr)
        .await?;

    Ok(())
}
