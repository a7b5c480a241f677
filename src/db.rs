// SQLite persistence for draft state: one row per draft plus an
// append-only pick log.

use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::draft::state::{Draft, DraftStatus, PickRecord};

/// SQLite-backed storage. The pick log is append-only; the draft row is
/// upserted after every committed transition so a restarted process can
/// resume mid-draft (the pick clock is re-armed from the stored
/// `next_pick_time`).
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the database at `path` and ensure the schema
    /// exists. Pass `":memory:"` for an ephemeral database in tests.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS drafts (
                id                 TEXT PRIMARY KEY,
                league_id          TEXT NOT NULL,
                draft_order        TEXT NOT NULL,
                total_rounds       INTEGER NOT NULL,
                status             TEXT NOT NULL,
                current_round      INTEGER NOT NULL,
                current_pick       INTEGER NOT NULL,
                start_time         TEXT,
                next_pick_time     TEXT,
                time_per_pick_secs INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS draft_picks (
                draft_id  TEXT NOT NULL REFERENCES drafts(id),
                overall   INTEGER NOT NULL,
                round     INTEGER NOT NULL,
                pick      INTEGER NOT NULL,
                team_id   TEXT NOT NULL,
                player_id TEXT,
                timestamp TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                PRIMARY KEY (draft_id, overall)
            );
            ",
        )
        .context("failed to create database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the database connection. Panics if the mutex is poisoned
    /// (another thread panicked mid-operation).
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    /// Insert or update the draft row. Pick records are written separately
    /// through [`Database::record_pick`].
    pub fn upsert_draft(&self, draft: &Draft) -> Result<()> {
        let order_json =
            serde_json::to_string(&draft.draft_order).context("failed to serialize draft order")?;
        self.conn()
            .execute(
                "INSERT INTO drafts (id, league_id, draft_order, total_rounds, status,
                                     current_round, current_pick, start_time, next_pick_time,
                                     time_per_pick_secs)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(id) DO UPDATE SET
                     status = excluded.status,
                     current_round = excluded.current_round,
                     current_pick = excluded.current_pick,
                     start_time = excluded.start_time,
                     next_pick_time = excluded.next_pick_time",
                params![
                    draft.id,
                    draft.league_id,
                    order_json,
                    draft.total_rounds,
                    draft.status.as_str(),
                    draft.current_round,
                    draft.current_pick,
                    draft.start_time.map(|t| t.to_rfc3339()),
                    draft.next_pick_time.map(|t| t.to_rfc3339()),
                    draft.time_per_pick_secs,
                ],
            )
            .context("failed to upsert draft")?;
        Ok(())
    }

    /// Append one resolved pick to the log.
    pub fn record_pick(&self, draft_id: &str, record: &PickRecord) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO draft_picks (draft_id, overall, round, pick, team_id, player_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    draft_id,
                    record.overall,
                    record.round,
                    record.pick,
                    record.team_id,
                    record.player_id,
                ],
            )
            .context("failed to record pick")?;
        Ok(())
    }

    /// Load one draft with its full pick list, or `None` if unknown.
    pub fn load_draft(&self, draft_id: &str) -> Result<Option<Draft>> {
        let conn = self.conn();
        let draft = conn
            .query_row(
                "SELECT id, league_id, draft_order, total_rounds, status, current_round,
                        current_pick, start_time, next_pick_time, time_per_pick_secs
                 FROM drafts WHERE id = ?1",
                params![draft_id],
                draft_from_row,
            )
            .optional()
            .context("failed to load draft")?;

        let Some(mut draft) = draft.transpose()? else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT round, pick, overall, team_id, player_id
             FROM draft_picks WHERE draft_id = ?1 ORDER BY overall",
        )?;
        let picks = stmt
            .query_map(params![draft_id], |row| {
                Ok(PickRecord {
                    round: row.get(0)?,
                    pick: row.get(1)?,
                    overall: row.get(2)?,
                    team_id: row.get(3)?,
                    player_id: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to load pick list")?;

        draft.pick_list = picks;
        Ok(Some(draft))
    }

    /// Load every stored draft (startup restore path).
    pub fn load_all_drafts(&self) -> Result<Vec<Draft>> {
        let ids: Vec<String> = {
            let conn = self.conn();
            let mut stmt = conn.prepare("SELECT id FROM drafts ORDER BY id")?;
            let ids = stmt
                .query_map([], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .context("failed to list drafts")?;
            ids
        };

        let mut drafts = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(draft) = self.load_draft(&id)? {
                drafts.push(draft);
            }
        }
        Ok(drafts)
    }
}

/// Map a `drafts` row into a [`Draft`] (pick list filled in separately).
/// Returns a nested result so parse failures surface as anyhow errors
/// instead of panics inside the rusqlite row callback.
fn draft_from_row(row: &Row<'_>) -> rusqlite::Result<Result<Draft>> {
    let order_json: String = row.get(2)?;
    let status_str: String = row.get(4)?;
    let start_time: Option<String> = row.get(7)?;
    let next_pick_time: Option<String> = row.get(8)?;

    let id: String = row.get(0)?;
    let league_id: String = row.get(1)?;
    let total_rounds: u32 = row.get(3)?;
    let current_round: u32 = row.get(5)?;
    let current_pick: u32 = row.get(6)?;
    let time_per_pick_secs: u32 = row.get(9)?;

    Ok((|| {
        let draft_order: Vec<String> =
            serde_json::from_str(&order_json).context("corrupt draft_order column")?;
        let status = DraftStatus::from_str_status(&status_str)
            .ok_or_else(|| anyhow!("unknown draft status `{status_str}`"))?;
        Ok(Draft {
            id,
            league_id,
            draft_order,
            total_rounds,
            status,
            current_round,
            current_pick,
            pick_list: Vec::new(),
            start_time: parse_timestamp(start_time)?,
            next_pick_time: parse_timestamp(next_pick_time)?,
            time_per_pick_secs,
        })
    })())
}

fn parse_timestamp(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value
        .map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|t| t.with_timezone(&Utc))
                .with_context(|| format!("corrupt timestamp `{s}`"))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draft::TeamId;
    use chrono::TimeDelta;

    fn sample_draft() -> Draft {
        let order: Vec<TeamId> = vec!["T1".into(), "T2".into(), "T3".into()];
        Draft::new("d1", "l1", order, 2, 60).unwrap()
    }

    #[test]
    fn open_in_memory() {
        Database::open(":memory:").unwrap();
    }

    #[test]
    fn load_missing_draft_is_none() {
        let db = Database::open(":memory:").unwrap();
        assert!(db.load_draft("nope").unwrap().is_none());
    }

    #[test]
    fn draft_roundtrip() {
        let db = Database::open(":memory:").unwrap();
        let mut draft = sample_draft();
        let now = Utc::now();
        draft.begin_countdown(now + TimeDelta::minutes(5)).unwrap();
        db.upsert_draft(&draft).unwrap();

        let loaded = db.load_draft("d1").unwrap().unwrap();
        assert_eq!(loaded.status, DraftStatus::Waiting);
        assert_eq!(loaded.draft_order, draft.draft_order);
        assert_eq!(loaded.total_rounds, 2);
        assert_eq!(loaded.time_per_pick_secs, 60);
        // RFC 3339 round-trip preserves the instant.
        assert_eq!(loaded.start_time, draft.start_time);
    }

    #[test]
    fn pick_log_roundtrip_including_skips() {
        let db = Database::open(":memory:").unwrap();
        let mut draft = sample_draft();
        let now = Utc::now();
        draft.begin_countdown(now).unwrap();
        draft.begin(now + TimeDelta::seconds(62)).unwrap();
        db.upsert_draft(&draft).unwrap();

        let p1 = draft
            .commit_pick("T1".into(), "p1".into(), Some(now))
            .unwrap();
        db.record_pick("d1", &p1).unwrap();
        let skip = draft.commit_skip(Some(now)).unwrap();
        db.record_pick("d1", &skip).unwrap();
        db.upsert_draft(&draft).unwrap();

        let loaded = db.load_draft("d1").unwrap().unwrap();
        assert_eq!(loaded.pick_list.len(), 2);
        assert_eq!(loaded.pick_list[0].player_id, Some("p1".to_string()));
        assert!(loaded.pick_list[1].is_skip());
        assert_eq!(loaded.pick_list[1].team_id, "T2");
        assert_eq!(
            (loaded.current_round, loaded.current_pick),
            (draft.current_round, draft.current_pick)
        );
        assert!(loaded.pick_count_consistent());
    }

    #[test]
    fn upsert_updates_mutable_fields() {
        let db = Database::open(":memory:").unwrap();
        let mut draft = sample_draft();
        db.upsert_draft(&draft).unwrap();

        let now = Utc::now();
        draft.begin_countdown(now).unwrap();
        draft.begin(now + TimeDelta::seconds(62)).unwrap();
        db.upsert_draft(&draft).unwrap();

        let loaded = db.load_draft("d1").unwrap().unwrap();
        assert_eq!(loaded.status, DraftStatus::Started);
        assert_eq!(loaded.next_pick_time, draft.next_pick_time);
    }

    #[test]
    fn duplicate_overall_index_rejected() {
        // The pick log is append-only with (draft_id, overall) as the key;
        // writing the same turn twice is a hard error, not a silent update.
        let db = Database::open(":memory:").unwrap();
        let mut draft = sample_draft();
        let now = Utc::now();
        draft.begin_countdown(now).unwrap();
        draft.begin(now).unwrap();
        db.upsert_draft(&draft).unwrap();

        let record = draft
            .commit_pick("T1".into(), "p1".into(), Some(now))
            .unwrap();
        db.record_pick("d1", &record).unwrap();
        assert!(db.record_pick("d1", &record).is_err());
    }

    #[test]
    fn load_all_drafts_returns_each() {
        let db = Database::open(":memory:").unwrap();
        let draft_a = sample_draft();
        let mut draft_b = sample_draft();
        draft_b.id = "d2".into();
        db.upsert_draft(&draft_a).unwrap();
        db.upsert_draft(&draft_b).unwrap();

        let all = db.load_all_drafts().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, "d1");
        assert_eq!(all[1].id, "d2");
    }
}
