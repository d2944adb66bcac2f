//! Application orchestrator: wires the Hub and the acceptor together.

use std::sync::Arc;

use quiver_chat_server::{ChatServer, Hub};
use quiver_protocol::SystemClock;
use tokio_util::sync::CancellationToken;

use crate::config::Config;

/// Runs the relay until Ctrl-C or a fatal server error.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();

    // -- Hub --
    let (hub, hub_task) = Hub::spawn(SystemClock, cancel.clone());

    // -- WS server --
    let server = ChatServer::new(config.server_config(), hub, cancel.clone());
    let server_run = Arc::clone(&server);
    let mut server_task = tokio::spawn(async move { server_run.run().await });

    tracing::info!("relay ready");

    // -- Main loop: wait for shutdown --
    tokio::select! {
        result = &mut server_task => {
            // The accept loop only ends on its own when binding fails.
            cancel.cancel();
            let _ = hub_task.await;
            result??;
            return Ok(());
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("SIGINT received, shutting down");
        }
    }

    // -- Graceful shutdown --
    server.shutdown();
    server_task.await??;
    hub_task.await?;

    Ok(())
}
