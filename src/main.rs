// Draft room entry point.
//
// Startup sequence:
// 1. Initialize tracing
// 2. Load config
// 3. Open database
// 4. Load the player pool and register league teams
// 5. Build the broadcaster and coordinator registry
// 6. Restore stored drafts (or create the league's draft)
// 7. Serve WebSocket clients until shutdown

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{error, info};

use draft_room::broadcast::Broadcaster;
use draft_room::config;
use draft_room::coordinator::Registry;
use draft_room::db::Database;
use draft_room::league::{self, InMemoryLeague};
use draft_room::ws_server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    init_tracing()?;
    info!("Draft room starting up");

    // 2. Load config
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "draftroom.toml".to_string());
    let config = config::load_config(Path::new(&config_path))
        .with_context(|| format!("failed to load configuration from {config_path}"))?;
    info!(
        "Config loaded: league={}, {} teams, {} roster slots",
        config.league.name,
        config.league.teams.len(),
        config.slot_layout.slot_count()
    );

    // 3. Open database
    if let Some(parent) = Path::new(&config.database.path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).context("failed to create database directory")?;
        }
    }
    let db = Arc::new(Database::open(&config.database.path).context("failed to open database")?);
    info!("Database opened at {}", config.database.path);

    // 4. Load the player pool and register league teams
    let players = league::load_players_csv(Path::new(&config.data.players_csv))
        .context("failed to load player pool")?;
    info!("Loaded {} players from {}", players.len(), config.data.players_csv);

    let store = Arc::new(InMemoryLeague::new());
    store.register_players(players).await;
    for team in &config.league.teams {
        store
            .register_team(&team.id, &config.league.id, &team.name, config.slot_layout.slot_count())
            .await;
    }

    // 5. Build the broadcaster and coordinator registry
    let broadcaster = Arc::new(Broadcaster::new());
    let registry = Arc::new(Registry::new(
        Duration::from_secs(config.draft.countdown_secs as u64),
        config.slot_layout.clone(),
        Arc::clone(&db),
        store.clone(),
        store.clone(),
        Arc::clone(&broadcaster),
    ));

    // 6. Restore stored drafts; first run creates the league's draft
    let restored = registry.restore_from_db().context("failed to restore drafts")?;
    if restored > 0 {
        info!("Restored {restored} draft(s) from database");
    } else {
        let draft_id = format!("draft-{}", config.league.id);
        let team_ids = config.league.teams.iter().map(|t| t.id.clone()).collect();
        registry
            .create_draft(
                &draft_id,
                &config.league.id,
                team_ids,
                config.draft.shuffle_order,
                config.draft.time_per_pick_secs,
            )
            .context("failed to create draft")?;
        info!("Created draft {draft_id} for league {}", config.league.id);
    }

    // 7. Serve WebSocket clients until shutdown
    let listener = TcpListener::bind(("127.0.0.1", config.websocket.port))
        .await
        .with_context(|| format!("failed to bind port {}", config.websocket.port))?;

    tokio::select! {
        result = ws_server::run(listener, registry, broadcaster) => {
            if let Err(e) = result {
                error!("WebSocket server error: {e:#}");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    info!("Draft room shut down cleanly");
    Ok(())
}

/// Initialize tracing to stdout, honoring `RUST_LOG` when set.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("draft_room=info,warn")),
        )
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
