// Draft coordination: one single-writer task per draft, plus the registry
// that owns them.
//
// Every mutation of a draft -- human picks, commissioner actions, and
// clock expiries alike -- funnels through that draft's command channel and
// is processed one at a time by its coordinator task. Two concurrent pick
// requests for the same turn are just two queued commands; the second one
// sees the advanced state and is rejected. That serialization is the whole
// concurrency story: there is no shared-memory mutation anywhere.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use rand::seq::SliceRandom;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::broadcast::Broadcaster;
use crate::clock::{ClockToken, PickClock};
use crate::db::Database;
use crate::draft::slots::SlotLayout;
use crate::draft::state::{Draft, DraftError, DraftStatus, PickRecord};
use crate::draft::{PlayerId, TeamId};
use crate::league::{LeagueError, LeagueService, PlayerService};
use crate::protocol::DraftEvent;

/// Network grace added on top of the per-pick window before the clock
/// forces a skip.
pub const PICK_DEADLINE_GRACE: Duration = Duration::from_secs(2);

/// Command queue depth per draft. Drafts see one human action per turn;
/// this only needs to absorb short bursts of concurrent requests.
const COMMAND_QUEUE_DEPTH: usize = 64;

/// What a successful pick request resolved to.
#[derive(Debug, Clone, PartialEq)]
pub struct PickOutcome {
    pub record: PickRecord,
    /// Roster slot index the player was placed into.
    pub slot: usize,
}

enum Command {
    RequestPick {
        team_id: TeamId,
        player_id: PlayerId,
        reply: oneshot::Sender<Result<PickOutcome, DraftError>>,
    },
    ArmDraft {
        reply: oneshot::Sender<Result<Draft, DraftError>>,
    },
    Reschedule {
        start_time: DateTime<Utc>,
        reply: oneshot::Sender<Result<Draft, DraftError>>,
    },
    SkipTurn {
        reply: oneshot::Sender<Result<PickRecord, DraftError>>,
    },
    Snapshot {
        reply: oneshot::Sender<Draft>,
    },
}

/// Cheaply cloneable handle to one draft's coordinator task. All methods
/// resolve synchronously with respect to the caller: the reply arrives
/// once the command has been fully accepted or rejected.
#[derive(Clone)]
pub struct CoordinatorHandle {
    draft_id: String,
    tx: mpsc::Sender<Command>,
}

impl CoordinatorHandle {
    pub fn draft_id(&self) -> &str {
        &self.draft_id
    }

    async fn send_command<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Option<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx.send(build(reply_tx)).await.ok()?;
        reply_rx.await.ok()
    }

    /// Attempt to draft `player_id` for `team_id` on the current turn.
    pub async fn request_pick(
        &self,
        team_id: impl Into<TeamId>,
        player_id: impl Into<PlayerId>,
    ) -> Result<PickOutcome, DraftError> {
        let team_id = team_id.into();
        let player_id = player_id.into();
        self.send_command(|reply| Command::RequestPick {
            team_id,
            player_id,
            reply,
        })
        .await
        // A gone coordinator means the draft is no longer live.
        .unwrap_or(Err(DraftError::DraftCompleted))
    }

    /// Commissioner: arm the start countdown (scheduled → waiting).
    pub async fn arm(&self) -> Result<Draft, DraftError> {
        self.send_command(|reply| Command::ArmDraft { reply })
            .await
            .unwrap_or(Err(DraftError::DraftCompleted))
    }

    /// Commissioner: move the scheduled start time.
    pub async fn reschedule(&self, start_time: DateTime<Utc>) -> Result<Draft, DraftError> {
        self.send_command(|reply| Command::Reschedule { start_time, reply })
            .await
            .unwrap_or(Err(DraftError::DraftCompleted))
    }

    /// Commissioner: skip the current turn without waiting for the clock.
    pub async fn skip_turn(&self) -> Result<PickRecord, DraftError> {
        self.send_command(|reply| Command::SkipTurn { reply })
            .await
            .unwrap_or(Err(DraftError::DraftCompleted))
    }

    /// Fetch a full snapshot of the draft. `None` only if the coordinator
    /// task is gone.
    pub async fn snapshot(&self) -> Option<Draft> {
        self.send_command(|reply| Command::Snapshot { reply }).await
    }
}

/// The single writer for one draft.
struct Coordinator {
    draft: Draft,
    clock: PickClock,
    countdown: Duration,
    layout: SlotLayout,
    db: Arc<Database>,
    league: Arc<dyn LeagueService>,
    players: Arc<dyn PlayerService>,
    broadcaster: Arc<Broadcaster>,
}

impl Coordinator {
    /// Re-arm the clock from persisted deadlines so a process restart
    /// resumes a live draft instead of silently freezing it. A deadline
    /// already in the past fires on the first loop iteration.
    fn resume_clock(&mut self) {
        match self.draft.status {
            DraftStatus::Waiting => {
                if let Some(start) = self.draft.start_time {
                    self.clock.arm(instant_for(start));
                    info!("draft {}: resumed start countdown", self.draft.id);
                }
            }
            DraftStatus::Started => {
                if let Some(deadline) = self.draft.next_pick_time {
                    self.clock.arm(instant_for(deadline));
                    info!(
                        "draft {}: resumed pick clock at round {} pick {}",
                        self.draft.id, self.draft.current_round, self.draft.current_pick
                    );
                }
            }
            DraftStatus::Scheduled | DraftStatus::Completed => {}
        }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        self.resume_clock();
        loop {
            let deadline = self.clock.deadline().unwrap_or_else(Instant::now);
            tokio::select! {
                cmd = rx.recv() => {
                    match cmd {
                        Some(cmd) => self.handle_command(cmd).await,
                        None => break,
                    }
                }
                _ = tokio::time::sleep_until(deadline), if self.clock.is_armed() => {
                    if let Some(token) = self.clock.current_token() {
                        self.handle_clock_fired(token).await;
                    }
                }
            }
        }
        debug!("coordinator for draft {} exiting", self.draft.id);
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::RequestPick {
                team_id,
                player_id,
                reply,
            } => {
                let result = self.handle_request_pick(team_id, player_id).await;
                let _ = reply.send(result);
            }
            Command::ArmDraft { reply } => {
                let result = self.handle_arm();
                let _ = reply.send(result);
            }
            Command::Reschedule { start_time, reply } => {
                let result = self.handle_reschedule(start_time);
                let _ = reply.send(result);
            }
            Command::SkipTurn { reply } => {
                let result = self.resolve_skip();
                let _ = reply.send(result);
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.draft.clone());
            }
        }
    }

    /// A clock expiry reached the command path. Stale tokens (the turn
    /// already resolved and the clock was rearmed) are dropped here, which
    /// is what makes duplicate auto-skips impossible.
    async fn handle_clock_fired(&mut self, token: ClockToken) {
        if !self.clock.accepts(token) {
            debug!("draft {}: ignoring stale clock token", self.draft.id);
            return;
        }
        match self.draft.status {
            DraftStatus::Waiting => self.open_draft(),
            DraftStatus::Started => {
                info!(
                    "draft {}: pick clock expired at round {} pick {}",
                    self.draft.id, self.draft.current_round, self.draft.current_pick
                );
                if let Err(e) = self.resolve_skip() {
                    warn!("draft {}: expiry skip rejected: {e}", self.draft.id);
                }
            }
            DraftStatus::Scheduled | DraftStatus::Completed => {
                self.clock.disarm();
            }
        }
    }

    /// Commissioner armed the countdown: scheduled → waiting.
    fn handle_arm(&mut self) -> Result<Draft, DraftError> {
        let start_time = Utc::now() + chrono_delta(self.countdown);
        self.draft.begin_countdown(start_time)?;
        // Provisional first-pick deadline, stored so clients (and a restart)
        // can see when pick 1 will be due.
        let first_deadline = start_time + chrono_delta(self.pick_window());
        self.draft.next_pick_time = Some(first_deadline);
        self.clock.arm(Instant::now() + self.countdown);
        self.persist();
        info!("draft {}: countdown armed, starts at {start_time}", self.draft.id);
        self.broadcaster.publish(
            &self.draft.id,
            &DraftEvent::DraftWaiting {
                start_time,
                next_pick_time: first_deadline,
            },
        );
        Ok(self.draft.clone())
    }

    fn handle_reschedule(&mut self, start_time: DateTime<Utc>) -> Result<Draft, DraftError> {
        self.draft.reschedule(start_time)?;
        if self.draft.status == DraftStatus::Waiting {
            let first_deadline = start_time + chrono_delta(self.pick_window());
            self.draft.next_pick_time = Some(first_deadline);
            self.clock.arm(instant_for(start_time));
            self.broadcaster.publish(
                &self.draft.id,
                &DraftEvent::DraftWaiting {
                    start_time,
                    next_pick_time: first_deadline,
                },
            );
        }
        self.persist();
        info!("draft {}: rescheduled to {start_time}", self.draft.id);
        Ok(self.draft.clone())
    }

    /// Start countdown expired: waiting → started, clock armed for pick 1.
    fn open_draft(&mut self) {
        let (deadline_wall, deadline_mono) = self.next_deadline();
        if let Err(e) = self.draft.begin(deadline_wall) {
            warn!("draft {}: failed to start: {e}", self.draft.id);
            self.clock.disarm();
            return;
        }
        self.clock.arm(deadline_mono);
        self.persist();
        let next_drafter = self
            .draft
            .turn_owner()
            .cloned()
            .unwrap_or_default();
        info!(
            "draft {}: started, {next_drafter} is on the clock",
            self.draft.id
        );
        self.broadcaster.publish(
            &self.draft.id,
            &DraftEvent::DraftStarted {
                next_drafter,
                next_pick_time: deadline_wall,
            },
        );
    }

    async fn handle_request_pick(
        &mut self,
        team_id: TeamId,
        player_id: PlayerId,
    ) -> Result<PickOutcome, DraftError> {
        // (a) status, (b) turn owner, (c) player not in the pick list.
        self.draft.validate_pick(&team_id, &player_id)?;

        // (c') the league may know the player from outside this draft
        // (waiver pickups share the roster namespace).
        let rostered = self
            .league
            .is_player_rostered(&self.draft.league_id, &player_id)
            .await
            .map_err(league_unavailable)?;
        if rostered {
            return Err(DraftError::PlayerUnavailable { player_id });
        }

        // (d) a legal roster slot must exist for the player's position.
        let player = match self.players.player(&player_id).await {
            Ok(player) => player,
            Err(LeagueError::PlayerNotFound(_)) => {
                return Err(DraftError::PlayerUnavailable { player_id })
            }
            Err(e) => return Err(league_unavailable(e)),
        };
        let team = self
            .league
            .team(&team_id)
            .await
            .map_err(league_unavailable)?;
        let Some(slot) = self.layout.find_slot(player.position, &team.roster) else {
            return Err(DraftError::RosterFull {
                team_id,
                position: player.position,
            });
        };

        // All checks passed: mutate the roster, then commit and advance.
        self.league
            .set_roster_slot(&team_id, slot, Some(player_id.clone()))
            .await
            .map_err(league_unavailable)?;

        let (deadline_wall, deadline_mono) = self.next_deadline();
        let record = self
            .draft
            .commit_pick(team_id, player_id.clone(), Some(deadline_wall))?;
        info!(
            "draft {}: pick {} -- {} takes {} (slot {slot})",
            self.draft.id, record.overall, record.team_id, player_id
        );
        self.finish_turn(&record, deadline_mono);
        Ok(PickOutcome { record, slot })
    }

    /// Resolve the current turn as a skip. Shared by clock expiry and the
    /// commissioner's explicit skip, so both take exactly the same path.
    fn resolve_skip(&mut self) -> Result<PickRecord, DraftError> {
        let (deadline_wall, deadline_mono) = self.next_deadline();
        let record = self.draft.commit_skip(Some(deadline_wall))?;
        info!(
            "draft {}: turn skipped at round {} pick {}",
            self.draft.id, record.round, record.pick
        );
        self.finish_turn(&record, deadline_mono);
        Ok(record)
    }

    /// Post-commit bookkeeping shared by picks and skips: rearm or disarm
    /// the clock, persist, and broadcast in commit order.
    fn finish_turn(&mut self, record: &PickRecord, next_deadline: Instant) {
        let completed = self.draft.status == DraftStatus::Completed;
        if completed {
            self.clock.disarm();
        } else {
            self.clock.arm(next_deadline);
        }

        self.persist();
        self.persist_pick(record);

        let next_drafter = self.draft.turn_owner().cloned();
        let next_pick_time = self.draft.next_pick_time;
        let event = match &record.player_id {
            Some(player_id) => DraftEvent::PlayerDrafted {
                round: record.round,
                pick: record.pick,
                team_id: record.team_id.clone(),
                player_id: player_id.clone(),
                next_drafter,
                next_pick_time,
            },
            None => DraftEvent::TurnSkipped {
                round: record.round,
                pick: record.pick,
                team_id: record.team_id.clone(),
                next_drafter,
                next_pick_time,
            },
        };
        self.broadcaster.publish(&self.draft.id, &event);

        if completed {
            info!("draft {}: complete after {} picks", self.draft.id, self.draft.pick_list.len());
            self.broadcaster.publish(&self.draft.id, &DraftEvent::DraftEnded);
        }
    }

    fn pick_window(&self) -> Duration {
        Duration::from_secs(self.draft.time_per_pick_secs as u64) + PICK_DEADLINE_GRACE
    }

    /// The deadline the *next* turn would get, as both wall-clock time (for
    /// clients and persistence) and monotonic time (for the timer).
    fn next_deadline(&self) -> (DateTime<Utc>, Instant) {
        let window = self.pick_window();
        (Utc::now() + chrono_delta(window), Instant::now() + window)
    }

    /// Persistence failures are logged, not fatal: the draft stays live and
    /// the row is rewritten on the next transition.
    fn persist(&self) {
        if let Err(e) = self.db.upsert_draft(&self.draft) {
            warn!("draft {}: failed to persist state: {e:#}", self.draft.id);
        }
    }

    fn persist_pick(&self, record: &PickRecord) {
        if let Err(e) = self.db.record_pick(&self.draft.id, record) {
            warn!(
                "draft {}: failed to persist pick {}: {e:#}",
                self.draft.id, record.overall
            );
        }
    }
}

fn league_unavailable(e: LeagueError) -> DraftError {
    DraftError::LeagueUnavailable(e.to_string())
}

fn chrono_delta(d: Duration) -> TimeDelta {
    TimeDelta::from_std(d).unwrap_or_else(|_| TimeDelta::seconds(i64::MAX / 2))
}

/// Convert a persisted wall-clock deadline into a timer instant. Deadlines
/// already in the past collapse to "now" and fire immediately.
fn instant_for(wall: DateTime<Utc>) -> Instant {
    let remaining = (wall - Utc::now()).to_std().unwrap_or(Duration::ZERO);
    Instant::now() + remaining
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Owns the coordinator for every active draft. Different drafts run fully
/// independently; the registry only maps ids to handles.
pub struct Registry {
    handles: Mutex<HashMap<String, CoordinatorHandle>>,
    countdown: Duration,
    layout: SlotLayout,
    db: Arc<Database>,
    league: Arc<dyn LeagueService>,
    players: Arc<dyn PlayerService>,
    broadcaster: Arc<Broadcaster>,
}

impl Registry {
    pub fn new(
        countdown: Duration,
        layout: SlotLayout,
        db: Arc<Database>,
        league: Arc<dyn LeagueService>,
        players: Arc<dyn PlayerService>,
        broadcaster: Arc<Broadcaster>,
    ) -> Self {
        Registry {
            handles: Mutex::new(HashMap::new()),
            countdown,
            layout,
            db,
            league,
            players,
            broadcaster,
        }
    }

    fn spawn(&self, draft: Draft) -> CoordinatorHandle {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let handle = CoordinatorHandle {
            draft_id: draft.id.clone(),
            tx,
        };
        let coordinator = Coordinator {
            draft,
            clock: PickClock::new(),
            countdown: self.countdown,
            layout: self.layout.clone(),
            db: Arc::clone(&self.db),
            league: Arc::clone(&self.league),
            players: Arc::clone(&self.players),
            broadcaster: Arc::clone(&self.broadcaster),
        };
        tokio::spawn(coordinator.run(rx));
        self.handles
            .lock()
            .expect("registry lock poisoned")
            .insert(handle.draft_id.clone(), handle.clone());
        handle
    }

    /// Create a new draft for a league and spawn its coordinator. The
    /// number of rounds equals the number of draftable roster slots. With
    /// `shuffle` set, the team list is shuffled once here; the resulting
    /// order is immutable for the life of the draft.
    pub fn create_draft(
        &self,
        draft_id: &str,
        league_id: &str,
        mut team_ids: Vec<TeamId>,
        shuffle: bool,
        time_per_pick_secs: u32,
    ) -> Result<CoordinatorHandle, DraftError> {
        if shuffle {
            team_ids.shuffle(&mut rand::rng());
        }
        let draft = Draft::new(
            draft_id,
            league_id,
            team_ids,
            self.layout.slot_count() as u32,
            time_per_pick_secs,
        )?;
        if let Err(e) = self.db.upsert_draft(&draft) {
            warn!("draft {draft_id}: failed to persist at creation: {e:#}");
        }
        info!("draft {draft_id}: created for league {league_id}");
        Ok(self.spawn(draft))
    }

    /// Spawn coordinators for every draft stored in the database. Live
    /// drafts re-arm their clocks from the persisted deadlines.
    pub fn restore_from_db(&self) -> anyhow::Result<usize> {
        let drafts = self.db.load_all_drafts()?;
        let count = drafts.len();
        for draft in drafts {
            info!(
                "draft {}: restored from database ({})",
                draft.id, draft.status
            );
            self.spawn(draft);
        }
        Ok(count)
    }

    pub fn get(&self, draft_id: &str) -> Option<CoordinatorHandle> {
        self.handles
            .lock()
            .expect("registry lock poisoned")
            .get(draft_id)
            .cloned()
    }

    pub fn draft_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .handles
            .lock()
            .expect("registry lock poisoned")
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::league::{InMemoryLeague, NflPlayer};
    use crate::draft::slots::Position;

    /// Registry over an in-memory league of `teams` teams with a tiny
    /// roster (1 QB + 1 BN → 2 rounds) and a 5-second pick window.
    async fn test_registry(teams: usize) -> (Arc<Registry>, Arc<InMemoryLeague>, Arc<Broadcaster>) {
        let mut counts = HashMap::new();
        counts.insert("QB".to_string(), 1);
        counts.insert("BN".to_string(), 1);
        let layout = SlotLayout::from_counts(&counts).unwrap();

        let league = Arc::new(InMemoryLeague::new());
        for i in 1..=teams {
            league
                .register_team(&format!("T{i}"), "l1", &format!("Team {i}"), layout.slot_count())
                .await;
        }
        for i in 1..=(teams * 4) {
            league
                .register_player(NflPlayer {
                    id: format!("p{i}"),
                    name: format!("Player {i}"),
                    position: Position::Quarterback,
                    nfl_team: "KC".into(),
                })
                .await;
        }

        let broadcaster = Arc::new(Broadcaster::new());
        let registry = Registry::new(
            Duration::from_secs(1),
            layout,
            Arc::new(Database::open(":memory:").unwrap()),
            league.clone(),
            league.clone(),
            broadcaster.clone(),
        );
        (Arc::new(registry), league, broadcaster)
    }

    /// Drive a freshly created draft through arm + countdown into Started.
    async fn armed_and_started(handle: &CoordinatorHandle) {
        handle.arm().await.unwrap();
        // Paused-time tests auto-advance through the countdown sleep.
        loop {
            let snapshot = handle.snapshot().await.unwrap();
            if snapshot.status == DraftStatus::Started {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn arm_then_countdown_starts_draft() {
        let (registry, _league, broadcaster) = test_registry(2).await;
        let handle = registry
            .create_draft("d1", "l1", vec!["T1".into(), "T2".into()], false, 60)
            .unwrap();
        let mut room = broadcaster.subscribe("d1");

        let draft = handle.arm().await.unwrap();
        assert_eq!(draft.status, DraftStatus::Waiting);
        assert!(draft.start_time.is_some());
        assert!(matches!(
            room.recv().await.unwrap(),
            DraftEvent::DraftWaiting { .. }
        ));

        armed_and_started(&handle).await;
        match room.recv().await.unwrap() {
            DraftEvent::DraftStarted { next_drafter, .. } => assert_eq!(next_drafter, "T1"),
            other => panic!("expected draft_started, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn arm_twice_rejected() {
        let (registry, _league, _broadcaster) = test_registry(2).await;
        let handle = registry
            .create_draft("d1", "l1", vec!["T1".into(), "T2".into()], false, 60)
            .unwrap();
        handle.arm().await.unwrap();
        assert!(matches!(
            handle.arm().await,
            Err(DraftError::InvalidTransition { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn pick_flow_places_player_and_advances() {
        let (registry, league, _broadcaster) = test_registry(2).await;
        let handle = registry
            .create_draft("d1", "l1", vec!["T1".into(), "T2".into()], false, 60)
            .unwrap();
        armed_and_started(&handle).await;

        let outcome = handle.request_pick("T1", "p1").await.unwrap();
        assert_eq!(outcome.record.round, 1);
        assert_eq!(outcome.record.pick, 1);
        assert_eq!(outcome.slot, 0); // the QB slot

        let team = league.team("T1").await.unwrap();
        assert_eq!(team.roster[0], Some("p1".to_string()));

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!((snapshot.current_round, snapshot.current_pick), (1, 2));
        assert_eq!(snapshot.turn_owner(), Some(&"T2".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn pick_before_start_rejected() {
        let (registry, _league, _broadcaster) = test_registry(2).await;
        let handle = registry
            .create_draft("d1", "l1", vec!["T1".into(), "T2".into()], false, 60)
            .unwrap();
        assert_eq!(
            handle.request_pick("T1", "p1").await,
            Err(DraftError::DraftNotStarted)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_picks_exactly_one_wins() {
        let (registry, _league, _broadcaster) = test_registry(2).await;
        let handle = registry
            .create_draft("d1", "l1", vec!["T1".into(), "T2".into()], false, 60)
            .unwrap();
        armed_and_started(&handle).await;

        // Both teams race for the same turn. The coordinator serializes the
        // two commands; exactly one succeeds.
        let (a, b) = tokio::join!(
            handle.request_pick("T1", "p1"),
            handle.request_pick("T2", "p2"),
        );
        assert!(a.is_ok() != b.is_ok(), "exactly one pick must win: {a:?} vs {b:?}");
        assert_eq!(
            b.unwrap_err(),
            DraftError::NotYourTurn {
                team_id: "T2".into()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_same_player_race_loses_on_availability() {
        let (registry, _league, _broadcaster) = test_registry(2).await;
        let handle = registry
            .create_draft("d1", "l1", vec!["T1".into(), "T2".into()], false, 60)
            .unwrap();
        armed_and_started(&handle).await;

        handle.request_pick("T1", "p1").await.unwrap();
        // T2 tries to take the same player on its own turn.
        assert_eq!(
            handle.request_pick("T2", "p1").await,
            Err(DraftError::PlayerUnavailable {
                player_id: "p1".into()
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn expired_clock_skips_turn_and_rearms() {
        let (registry, _league, broadcaster) = test_registry(2).await;
        let handle = registry
            .create_draft("d1", "l1", vec!["T1".into(), "T2".into()], false, 5)
            .unwrap();
        let mut room = broadcaster.subscribe("d1");
        armed_and_started(&handle).await;
        let _ = room.recv().await; // draft_waiting
        let _ = room.recv().await; // draft_started

        // Nobody picks; the clock expires and T1's turn is skipped.
        match room.recv().await.unwrap() {
            DraftEvent::TurnSkipped {
                round,
                pick,
                team_id,
                next_drafter,
                ..
            } => {
                assert_eq!((round, pick), (1, 1));
                assert_eq!(team_id, "T1");
                assert_eq!(next_drafter, Some("T2".to_string()));
            }
            other => panic!("expected turn_skipped, got {other:?}"),
        }

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.pick_list.len(), 1);
        assert!(snapshot.pick_list[0].is_skip());
        assert_eq!((snapshot.current_round, snapshot.current_pick), (1, 2));
    }

    #[tokio::test(start_paused = true)]
    async fn unattended_draft_runs_to_completion() {
        // Liveness: with nobody picking, the clock alone drives the draft
        // through every round to completion.
        let (registry, _league, broadcaster) = test_registry(2).await;
        let handle = registry
            .create_draft("d1", "l1", vec!["T1".into(), "T2".into()], false, 5)
            .unwrap();
        let mut room = broadcaster.subscribe("d1");
        armed_and_started(&handle).await;

        loop {
            match room.recv().await.unwrap() {
                DraftEvent::DraftEnded => break,
                _ => continue,
            }
        }
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.status, DraftStatus::Completed);
        assert_eq!(snapshot.pick_list.len(), 4); // 2 teams x 2 rounds
        assert!(snapshot.pick_list.iter().all(PickRecord::is_skip));
        assert_eq!(
            handle.request_pick("T1", "p1").await,
            Err(DraftError::DraftCompleted)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn commissioner_skip_shares_the_clock_path() {
        let (registry, _league, broadcaster) = test_registry(2).await;
        let handle = registry
            .create_draft("d1", "l1", vec!["T1".into(), "T2".into()], false, 60)
            .unwrap();
        let mut room = broadcaster.subscribe("d1");
        armed_and_started(&handle).await;
        let _ = room.recv().await;
        let _ = room.recv().await;

        let record = handle.skip_turn().await.unwrap();
        assert!(record.is_skip());
        assert_eq!((record.round, record.pick), (1, 1));
        assert!(matches!(
            room.recv().await.unwrap(),
            DraftEvent::TurnSkipped { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_clock_token_is_noop() {
        // Direct exercise of the token guard: an expiry for a turn that
        // already resolved must not append a second skip.
        let (registry, league, broadcaster) = test_registry(2).await;
        let db = Arc::new(Database::open(":memory:").unwrap());
        let mut draft =
            Draft::new("d9", "l1", vec!["T1".into(), "T2".into()], 2, 60).unwrap();
        let now = Utc::now();
        draft.begin_countdown(now).unwrap();
        draft.begin(now + TimeDelta::seconds(62)).unwrap();

        let mut coordinator = Coordinator {
            draft,
            clock: PickClock::new(),
            countdown: Duration::from_secs(1),
            layout: registry.layout.clone(),
            db,
            league: league.clone(),
            players: league.clone(),
            broadcaster: broadcaster.clone(),
        };

        let stale = coordinator.clock.arm(Instant::now() + Duration::from_secs(62));
        coordinator.handle_clock_fired(stale).await;
        assert_eq!(coordinator.draft.pick_list.len(), 1);
        assert!(coordinator.draft.pick_list[0].is_skip());
        assert_eq!(coordinator.draft.current_pick, 2);

        // The same token fires again (late timer): rejected, nothing changes.
        coordinator.handle_clock_fired(stale).await;
        assert_eq!(coordinator.draft.pick_list.len(), 1);
        assert_eq!(coordinator.draft.current_pick, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn reschedule_moves_the_start() {
        let (registry, _league, _broadcaster) = test_registry(2).await;
        let handle = registry
            .create_draft("d1", "l1", vec!["T1".into(), "T2".into()], false, 60)
            .unwrap();
        handle.arm().await.unwrap();

        let later = Utc::now() + TimeDelta::hours(1);
        let draft = handle.reschedule(later).await.unwrap();
        assert_eq!(draft.start_time, Some(later));
        assert_eq!(draft.status, DraftStatus::Waiting);
    }

    #[tokio::test(start_paused = true)]
    async fn create_draft_shuffle_keeps_same_teams() {
        let (registry, _league, _broadcaster) = test_registry(4).await;
        let teams: Vec<TeamId> = (1..=4).map(|i| format!("T{i}")).collect();
        let handle = registry
            .create_draft("d1", "l1", teams.clone(), true, 60)
            .unwrap();
        let snapshot = handle.snapshot().await.unwrap();
        let mut order = snapshot.draft_order.clone();
        order.sort();
        assert_eq!(order, teams);
    }

    #[tokio::test(start_paused = true)]
    async fn registry_lookup() {
        let (registry, _league, _broadcaster) = test_registry(2).await;
        registry
            .create_draft("d1", "l1", vec!["T1".into(), "T2".into()], false, 60)
            .unwrap();
        assert!(registry.get("d1").is_some());
        assert!(registry.get("d2").is_none());
        assert_eq!(registry.draft_ids(), vec!["d1".to_string()]);
    }
}
