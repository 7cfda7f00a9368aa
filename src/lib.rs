pub mod config;
pub mod engine;
pub mod presence;
pub mod server;
pub mod store;

use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};
use tokio_util::sync::CancellationToken;

use config::Args;
use engine::DecisionEngine;
use presence::PresenceTracker;
use server::AppState;
use store::Store;

/// Wire everything up and serve until ctrl-c.
pub async fn run(args: Args) -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("hearth starting up");

    let store = Store::open(args.db_path.clone())?;

    let presence = PresenceTracker::new();
    let tracked = presence
        .load_roster(&store)
        .await
        .context("presence roster unavailable")?;
    if tracked == 0 {
        warn!("Roster is empty; the house will always read as unoccupied");
    }

    let cancel = CancellationToken::new();
    let follow_task = tokio::spawn(
        presence
            .clone()
            .follow(args.syslog_path.clone(), cancel.clone()),
    );

    let engine = DecisionEngine::new(store, presence);
    let state = Arc::new(AppState { engine });

    let outcome = tokio::select! {
        result = server::run(Arc::clone(&state), args.listen) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
            Ok(())
        }
    };

    cancel.cancel();
    if let Err(err) = follow_task.await {
        warn!("Presence follow task did not shut down cleanly: {err}");
    }

    outcome
}
