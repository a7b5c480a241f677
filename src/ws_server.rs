// WebSocket transport: draft-room subscriptions and client commands.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::broadcast::Broadcaster;
use crate::coordinator::Registry;
use crate::protocol::{ClientRequest, ServerReply};

/// Run the WebSocket server on `listener`, serving clients until the task
/// is cancelled or the process exits. Each connection gets its own task;
/// all draft mutations still funnel through the per-draft coordinators.
pub async fn run(
    listener: TcpListener,
    registry: Arc<Registry>,
    broadcaster: Arc<Broadcaster>,
) -> anyhow::Result<()> {
    let local_addr = listener.local_addr()?;
    info!("WebSocket server listening on {local_addr}");

    loop {
        let (stream, addr) = listener.accept().await?;
        debug!("accepted TCP connection from {addr}");
        let registry = Arc::clone(&registry);
        let broadcaster = Arc::clone(&broadcaster);
        tokio::spawn(async move {
            handle_connection(stream, addr.to_string(), registry, broadcaster).await;
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: String,
    registry: Arc<Registry>,
    broadcaster: Arc<Broadcaster>,
) {
    let ws_stream = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake failed for {addr}: {e}");
            return;
        }
    };
    info!("client connected from {addr}");

    let (mut write, mut read) = ws_stream.split();

    // Replies and subscribed events share one outbound channel so a single
    // writer task owns the sink; per-subscriber ordering is preserved.
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if write.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg_result) = read.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                let reply = match serde_json::from_str::<ClientRequest>(&text) {
                    Ok(request) => handle_request(request, &registry, &broadcaster, &out_tx).await,
                    Err(e) => ServerReply::Rejected {
                        code: "bad_request".to_string(),
                        message: format!("unparseable request: {e}"),
                    },
                };
                match serde_json::to_string(&reply) {
                    Ok(json) => {
                        if out_tx.send(json).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("failed to serialize reply for {addr}: {e}"),
                }
            }
            Ok(Message::Close(_)) => {
                info!("client {addr} sent close frame");
                break;
            }
            Err(e) => {
                warn!("WebSocket error from {addr}: {e}");
                break;
            }
            _ => {
                // Ignore Binary, Ping, Pong, Frame variants.
            }
        }
    }

    writer.abort();
    info!("client {addr} disconnected");
}

/// Process one client request against the registry. Subscriptions spawn a
/// forwarding task that serializes room events into `out` until the
/// connection goes away.
///
/// This is the pure-logic entry point: it needs no socket, which is what
/// the unit tests exercise.
pub async fn handle_request(
    request: ClientRequest,
    registry: &Registry,
    broadcaster: &Broadcaster,
    out: &mpsc::UnboundedSender<String>,
) -> ServerReply {
    match request {
        ClientRequest::Subscribe { draft_id } => {
            let mut events = broadcaster.subscribe(&draft_id);
            let forward = out.clone();
            let room = draft_id.clone();
            tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    let json = match serde_json::to_string(&event) {
                        Ok(json) => json,
                        Err(e) => {
                            warn!("failed to serialize event for room {room}: {e}");
                            continue;
                        }
                    };
                    if forward.send(json).is_err() {
                        break;
                    }
                }
            });
            ServerReply::Subscribed { draft_id }
        }
        ClientRequest::GetDraft { draft_id } => match lookup(registry, &draft_id) {
            Ok(handle) => match handle.snapshot().await {
                Some(draft) => ServerReply::Snapshot { draft },
                None => unknown_draft(&draft_id),
            },
            Err(reply) => reply,
        },
        ClientRequest::RequestPick {
            draft_id,
            team_id,
            player_id,
        } => match lookup(registry, &draft_id) {
            Ok(handle) => match handle.request_pick(team_id, player_id).await {
                Ok(outcome) => ServerReply::PickAccepted {
                    draft_id,
                    round: outcome.record.round,
                    pick: outcome.record.pick,
                    team_id: outcome.record.team_id,
                    player_id: outcome.record.player_id.unwrap_or_default(),
                    slot: outcome.slot,
                },
                Err(e) => ServerReply::rejected(&e),
            },
            Err(reply) => reply,
        },
        ClientRequest::ArmDraft { draft_id } => match lookup(registry, &draft_id) {
            Ok(handle) => match handle.arm().await {
                Ok(draft) => ServerReply::Armed { draft },
                Err(e) => ServerReply::rejected(&e),
            },
            Err(reply) => reply,
        },
        ClientRequest::SkipTurn { draft_id } => match lookup(registry, &draft_id) {
            Ok(handle) => match handle.skip_turn().await {
                Ok(_) => ServerReply::Skipped { draft_id },
                Err(e) => ServerReply::rejected(&e),
            },
            Err(reply) => reply,
        },
    }
}

fn lookup(
    registry: &Registry,
    draft_id: &str,
) -> Result<crate::coordinator::CoordinatorHandle, ServerReply> {
    registry.get(draft_id).ok_or_else(|| unknown_draft(draft_id))
}

fn unknown_draft(draft_id: &str) -> ServerReply {
    ServerReply::Rejected {
        code: "unknown_draft".to_string(),
        message: format!("no draft with id {draft_id}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::draft::slots::{Position, SlotLayout};
    use crate::draft::state::DraftStatus;
    use crate::league::{InMemoryLeague, NflPlayer};
    use crate::protocol::DraftEvent;
    use std::collections::HashMap;
    use std::time::Duration;

    async fn test_setup() -> (Arc<Registry>, Arc<Broadcaster>) {
        let mut counts = HashMap::new();
        counts.insert("QB".to_string(), 1);
        counts.insert("BN".to_string(), 1);
        let layout = SlotLayout::from_counts(&counts).unwrap();

        let league = Arc::new(InMemoryLeague::new());
        for i in 1..=2 {
            league
                .register_team(&format!("T{i}"), "l1", &format!("Team {i}"), 2)
                .await;
        }
        league
            .register_player(NflPlayer {
                id: "p1".into(),
                name: "Patrick Mahomes".into(),
                position: Position::Quarterback,
                nfl_team: "KC".into(),
            })
            .await;

        let broadcaster = Arc::new(Broadcaster::new());
        let registry = Arc::new(Registry::new(
            Duration::from_secs(1),
            layout,
            Arc::new(Database::open(":memory:").unwrap()),
            league.clone(),
            league,
            broadcaster.clone(),
        ));
        registry
            .create_draft("d1", "l1", vec!["T1".into(), "T2".into()], false, 60)
            .unwrap();
        (registry, broadcaster)
    }

    #[tokio::test(start_paused = true)]
    async fn get_draft_returns_snapshot() {
        let (registry, broadcaster) = test_setup().await;
        let (out_tx, _out_rx) = mpsc::unbounded_channel();

        let reply = handle_request(
            ClientRequest::GetDraft {
                draft_id: "d1".into(),
            },
            &registry,
            &broadcaster,
            &out_tx,
        )
        .await;
        match reply {
            ServerReply::Snapshot { draft } => {
                assert_eq!(draft.id, "d1");
                assert_eq!(draft.status, DraftStatus::Scheduled);
            }
            other => panic!("expected snapshot, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_draft_is_rejected() {
        let (registry, broadcaster) = test_setup().await;
        let (out_tx, _out_rx) = mpsc::unbounded_channel();

        let reply = handle_request(
            ClientRequest::GetDraft {
                draft_id: "ghost".into(),
            },
            &registry,
            &broadcaster,
            &out_tx,
        )
        .await;
        assert!(
            matches!(reply, ServerReply::Rejected { ref code, .. } if code == "unknown_draft")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn subscribe_forwards_room_events_as_json() {
        let (registry, broadcaster) = test_setup().await;
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();

        let reply = handle_request(
            ClientRequest::Subscribe {
                draft_id: "d1".into(),
            },
            &registry,
            &broadcaster,
            &out_tx,
        )
        .await;
        assert_eq!(
            reply,
            ServerReply::Subscribed {
                draft_id: "d1".into()
            }
        );

        // Arming publishes draft_waiting into the room; the forwarding task
        // turns it into a JSON frame on the outbound channel.
        let reply = handle_request(
            ClientRequest::ArmDraft {
                draft_id: "d1".into(),
            },
            &registry,
            &broadcaster,
            &out_tx,
        )
        .await;
        assert!(matches!(reply, ServerReply::Armed { .. }));

        let frame = out_rx.recv().await.unwrap();
        let event: DraftEvent = serde_json::from_str(&frame).unwrap();
        assert!(matches!(event, DraftEvent::DraftWaiting { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn pick_rejection_carries_code() {
        let (registry, broadcaster) = test_setup().await;
        let (out_tx, _out_rx) = mpsc::unbounded_channel();

        // Draft hasn't started yet.
        let reply = handle_request(
            ClientRequest::RequestPick {
                draft_id: "d1".into(),
                team_id: "T1".into(),
                player_id: "p1".into(),
            },
            &registry,
            &broadcaster,
            &out_tx,
        )
        .await;
        assert!(
            matches!(reply, ServerReply::Rejected { ref code, .. } if code == "draft_not_started")
        );
    }
}
