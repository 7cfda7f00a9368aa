//! HTTP front end: one listener, one task per connection.

pub mod routes;
pub mod view;

use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use hyper::{server::conn::http1, service::service_fn};
use hyper_util::rt::TokioIo;
use log::{error, info};
use tokio::net::TcpListener;

use crate::engine::DecisionEngine;

pub struct AppState {
    pub engine: DecisionEngine,
}

/// Accept loop. Never returns under normal operation; the caller races it
/// against shutdown.
pub async fn run(state: Arc<AppState>, listen: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("failed to bind {listen}"))?;

    info!("Listening on http://{listen}");

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);
                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { routes::handle(state, req).await }
                    });

                    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                        error!("Error serving connection from {addr}: {err:?}");
                    }
                });
            }
            Err(err) => {
                error!("Error accepting connection: {err:?}");
            }
        }
    }
}
