use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, types::Type, Connection, OptionalExtension, TransactionBehavior};
use std::sync::{Arc, Mutex, MutexGuard};

pub mod models;
use models::*;

use crate::engine::line_movement::{
    materially_differs, MonitorSettings, RepredictionDecision, RepredictionHistory,
};
use crate::engine::{ModelPrediction, RecalibrationParams};

/// Thread-safe SQLite connection pool (single connection with mutex)
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the SQLite database at the given path
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("database connection mutex poisoned"))
    }

    /// Run schema migrations (idempotent)
    fn run_migrations(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    // ── Recalibration ─────────────────────────────────────────────────────────

    /// Latest stored params, if any fit was ever adopted
    pub fn latest_recalibration(&self) -> Result<Option<RecalibrationParams>> {
        let conn = self.lock()?;
        let params = conn
            .query_row(
                "SELECT version, a, b, samples, fitted_at
                 FROM recalibration_params ORDER BY version DESC LIMIT 1",
                [],
                map_recalibration,
            )
            .optional()?;
        Ok(params)
    }

    /// Store a new version. Versions only ever go up; rows are never updated.
    pub fn insert_recalibration(&self, params: &RecalibrationParams) -> Result<()> {
        let conn = self.lock()?;
        let latest: i64 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM recalibration_params",
            [],
            |r| r.get(0),
        )?;
        if params.version <= latest {
            bail!(
                "recalibration version {} is not newer than stored version {}",
                params.version,
                latest
            );
        }
        conn.execute(
            "INSERT INTO recalibration_params (version, a, b, samples, fitted_at)
             VALUES (?1,?2,?3,?4,?5)",
            params![
                params.version,
                params.a,
                params.b,
                params.samples as i64,
                params.fitted_at.unwrap_or_else(Utc::now),
            ],
        )?;
        Ok(())
    }

    pub fn list_recalibrations(&self, limit: i64) -> Result<Vec<RecalibrationParams>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT version, a, b, samples, fitted_at
             FROM recalibration_params ORDER BY version DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit], map_recalibration)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ── Validated outcomes ────────────────────────────────────────────────────

    /// Record a finished event. Re-validating an event replaces its row.
    pub fn insert_outcome(&self, o: &ValidatedOutcome) -> Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO validated_outcomes (
                event_id, sport, predicted_home_win_prob, predicted_spread,
                predicted_total, home_score, away_score, market_spread,
                market_total, validated_at
             ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)
             ON CONFLICT(event_id) DO UPDATE SET
                sport=excluded.sport,
                predicted_home_win_prob=excluded.predicted_home_win_prob,
                predicted_spread=excluded.predicted_spread,
                predicted_total=excluded.predicted_total,
                home_score=excluded.home_score,
                away_score=excluded.away_score,
                market_spread=excluded.market_spread,
                market_total=excluded.market_total,
                validated_at=excluded.validated_at",
            params![
                o.event_id,
                o.sport,
                o.predicted_home_win_prob,
                o.predicted_spread,
                o.predicted_total,
                o.home_score,
                o.away_score,
                o.market_spread,
                o.market_total,
                o.validated_at,
            ],
        )?;
        let id = conn.query_row(
            "SELECT id FROM validated_outcomes WHERE event_id=?1",
            params![o.event_id],
            |r| r.get(0),
        )?;
        Ok(id)
    }

    /// Outcomes, optionally for one sport, oldest first
    pub fn list_outcomes(&self, sport: Option<&str>) -> Result<Vec<ValidatedOutcome>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, event_id, sport, predicted_home_win_prob, predicted_spread,
                    predicted_total, home_score, away_score, market_spread,
                    market_total, validated_at
             FROM validated_outcomes
             WHERE ?1 IS NULL OR sport = ?1
             ORDER BY validated_at ASC",
        )?;
        let rows = stmt
            .query_map(params![sport], map_outcome)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ── Odds snapshots ────────────────────────────────────────────────────────

    /// Store a snapshot, marking opening/closing in the same transaction.
    ///
    /// The first snapshot for an event is its opening line. A snapshot inside
    /// the closing window takes the closing mark unless a later one already
    /// holds it, so an event has at most one closing snapshot.
    pub fn record_snapshot(&self, snap: &OddsSnapshot, monitor: &MonitorSettings) -> Result<OddsSnapshot> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let existing: i64 = tx.query_row(
            "SELECT COUNT(*) FROM odds_snapshots WHERE event_id=?1",
            params![snap.event_id],
            |r| r.get(0),
        )?;
        let later_closing: i64 = tx.query_row(
            "SELECT COUNT(*) FROM odds_snapshots
             WHERE event_id=?1 AND is_closing=1 AND captured_at > ?2",
            params![snap.event_id, snap.captured_at],
            |r| r.get(0),
        )?;
        let is_opening = existing == 0;
        let is_closing =
            monitor.is_closing_capture(snap.captured_at, snap.commence_time) && later_closing == 0;
        if is_closing {
            tx.execute(
                "UPDATE odds_snapshots SET is_closing=0 WHERE event_id=?1",
                params![snap.event_id],
            )?;
        }

        tx.execute(
            "INSERT INTO odds_snapshots (
                event_id, sport, captured_at, commence_time, spread, total,
                home_implied_prob, is_opening, is_closing
             ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
            params![
                snap.event_id,
                snap.sport,
                snap.captured_at,
                snap.commence_time,
                snap.spread,
                snap.total,
                snap.home_implied_prob,
                is_opening,
                is_closing,
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(OddsSnapshot {
            id: Some(id),
            is_opening,
            is_closing,
            ..snap.clone()
        })
    }

    /// All snapshots for an event, in capture order
    pub fn list_snapshots(&self, event_id: &str) -> Result<Vec<OddsSnapshot>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, event_id, sport, captured_at, commence_time, spread, total,
                    home_implied_prob, is_opening, is_closing
             FROM odds_snapshots WHERE event_id=?1 ORDER BY captured_at ASC, id ASC",
        )?;
        let rows = stmt
            .query_map(params![event_id], map_snapshot)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ── Predictions ───────────────────────────────────────────────────────────

    pub fn get_prediction(&self, event_id: &str) -> Result<Option<StoredPrediction>> {
        let conn = self.lock()?;
        query_prediction(&conn, event_id)
    }

    /// Set the standing prediction, bumping its version
    pub fn upsert_prediction(&self, event_id: &str, prediction: &ModelPrediction) -> Result<StoredPrediction> {
        let conn = self.lock()?;
        write_prediction(&conn, event_id, prediction)
    }

    // ── Re-predictions ────────────────────────────────────────────────────────

    pub fn reprediction_history(&self, event_id: &str) -> Result<RepredictionHistory> {
        let conn = self.lock()?;
        query_history(&conn, event_id)
    }

    pub fn record_reprediction(&self, rec: &RepredictionRecord) -> Result<i64> {
        let conn = self.lock()?;
        insert_reprediction(&conn, rec)
    }

    /// Gate and record a re-prediction in one transaction.
    ///
    /// `decide` sees the history as it stands inside the transaction, so two
    /// concurrent attempts cannot both pass the limit or cooldown. On a
    /// trigger the attempt is recorded, and `prediction` replaces the standing
    /// one only when it differs materially.
    pub fn apply_reprediction<F>(
        &self,
        event_id: &str,
        prediction: &ModelPrediction,
        attempted_at: DateTime<Utc>,
        decide: F,
    ) -> Result<RepredictionAttempt>
    where
        F: FnOnce(&RepredictionHistory) -> RepredictionDecision,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let history = query_history(&tx, event_id)?;
        let decision = decide(&history);
        let current = query_prediction(&tx, event_id)?;
        if !decision.should_repredict() {
            return Ok(RepredictionAttempt {
                decision,
                superseded: false,
                standing: current,
            });
        }

        let superseded = current
            .as_ref()
            .map_or(true, |s| materially_differs(&s.prediction, prediction));
        insert_reprediction(
            &tx,
            &RepredictionRecord {
                id: None,
                event_id: event_id.to_string(),
                attempted_at,
                superseded,
            },
        )?;
        let standing = if superseded {
            Some(write_prediction(&tx, event_id, prediction)?)
        } else {
            current
        };
        tx.commit()?;

        Ok(RepredictionAttempt {
            decision,
            superseded,
            standing,
        })
    }

    pub fn list_repredictions(&self, event_id: &str) -> Result<Vec<RepredictionRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, event_id, attempted_at, superseded
             FROM repredictions WHERE event_id=?1 ORDER BY attempted_at ASC",
        )?;
        let rows = stmt
            .query_map(params![event_id], |row| {
                Ok(RepredictionRecord {
                    id: row.get(0)?,
                    event_id: row.get(1)?,
                    attempted_at: row.get(2)?,
                    superseded: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

// ── SQL helpers ────────────────────────────────────────────────────────────────

fn query_prediction(conn: &Connection, event_id: &str) -> Result<Option<StoredPrediction>> {
    let row = conn
        .query_row(
            "SELECT event_id, payload, version, updated_at FROM predictions WHERE event_id=?1",
            params![event_id],
            map_prediction,
        )
        .optional()?;
    Ok(row)
}

fn write_prediction(conn: &Connection, event_id: &str, prediction: &ModelPrediction) -> Result<StoredPrediction> {
    let payload = serde_json::to_string(prediction)?;
    conn.execute(
        "INSERT INTO predictions (event_id, payload, version, updated_at)
         VALUES (?1, ?2, 1, ?3)
         ON CONFLICT(event_id) DO UPDATE SET
            payload=excluded.payload,
            version=predictions.version + 1,
            updated_at=excluded.updated_at",
        params![event_id, payload, Utc::now()],
    )?;
    query_prediction(conn, event_id)?.ok_or_else(|| anyhow!("prediction for {} vanished after write", event_id))
}

fn query_history(conn: &Connection, event_id: &str) -> Result<RepredictionHistory> {
    let (count, last_at): (i64, Option<DateTime<Utc>>) = conn.query_row(
        "SELECT COUNT(*), MAX(attempted_at) FROM repredictions WHERE event_id=?1",
        params![event_id],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;
    Ok(RepredictionHistory {
        count: count as u32,
        last_at,
    })
}

fn insert_reprediction(conn: &Connection, rec: &RepredictionRecord) -> Result<i64> {
    conn.execute(
        "INSERT INTO repredictions (event_id, attempted_at, superseded) VALUES (?1,?2,?3)",
        params![rec.event_id, rec.attempted_at, rec.superseded],
    )?;
    Ok(conn.last_insert_rowid())
}

fn map_recalibration(row: &rusqlite::Row) -> rusqlite::Result<RecalibrationParams> {
    let samples: i64 = row.get(3)?;
    Ok(RecalibrationParams {
        version: row.get(0)?,
        a: row.get(1)?,
        b: row.get(2)?,
        samples: samples.max(0) as usize,
        fitted_at: row.get(4)?,
    })
}

fn map_outcome(row: &rusqlite::Row) -> rusqlite::Result<ValidatedOutcome> {
    Ok(ValidatedOutcome {
        id: row.get(0)?,
        event_id: row.get(1)?,
        sport: row.get(2)?,
        predicted_home_win_prob: row.get(3)?,
        predicted_spread: row.get(4)?,
        predicted_total: row.get(5)?,
        home_score: row.get(6)?,
        away_score: row.get(7)?,
        market_spread: row.get(8)?,
        market_total: row.get(9)?,
        validated_at: row.get(10)?,
    })
}

fn map_snapshot(row: &rusqlite::Row) -> rusqlite::Result<OddsSnapshot> {
    Ok(OddsSnapshot {
        id: row.get(0)?,
        event_id: row.get(1)?,
        sport: row.get(2)?,
        captured_at: row.get(3)?,
        commence_time: row.get(4)?,
        spread: row.get(5)?,
        total: row.get(6)?,
        home_implied_prob: row.get(7)?,
        is_opening: row.get(8)?,
        is_closing: row.get(9)?,
    })
}

fn map_prediction(row: &rusqlite::Row) -> rusqlite::Result<StoredPrediction> {
    let payload: String = row.get(1)?;
    let prediction = serde_json::from_str(&payload)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;
    Ok(StoredPrediction {
        event_id: row.get(0)?,
        prediction,
        version: row.get(2)?,
        updated_at: row.get(3)?,
    })
}

/// SQLite schema (idempotent CREATE IF NOT EXISTS)
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS recalibration_params (
    version     INTEGER PRIMARY KEY,
    a           REAL    NOT NULL,
    b           REAL    NOT NULL,
    samples     INTEGER NOT NULL,
    fitted_at   TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS validated_outcomes (
    id                      INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id                TEXT    NOT NULL UNIQUE,
    sport                   TEXT    NOT NULL,
    predicted_home_win_prob REAL    NOT NULL,
    predicted_spread        REAL    NOT NULL,
    predicted_total         REAL    NOT NULL,
    home_score              INTEGER NOT NULL,
    away_score              INTEGER NOT NULL,
    market_spread           REAL,
    market_total            REAL,
    validated_at            TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS odds_snapshots (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id          TEXT    NOT NULL,
    sport             TEXT    NOT NULL,
    captured_at       TEXT    NOT NULL,
    commence_time     TEXT    NOT NULL,
    spread            REAL,
    total             REAL,
    home_implied_prob REAL,
    is_opening        INTEGER NOT NULL DEFAULT 0,
    is_closing        INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS predictions (
    event_id    TEXT    PRIMARY KEY,
    payload     TEXT    NOT NULL,
    version     INTEGER NOT NULL,
    updated_at  TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS repredictions (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id     TEXT    NOT NULL,
    attempted_at TEXT    NOT NULL,
    superseded   INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_outcomes_sport ON validated_outcomes(sport);
CREATE INDEX IF NOT EXISTS idx_snapshots_event ON odds_snapshots(event_id, captured_at);
CREATE INDEX IF NOT EXISTS idx_repredictions_event ON repredictions(event_id);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn snapshot(event_id: &str, captured_at: DateTime<Utc>, commence: DateTime<Utc>, spread: f64) -> OddsSnapshot {
        OddsSnapshot {
            id: None,
            event_id: event_id.into(),
            sport: "basketball_nba".into(),
            captured_at,
            commence_time: commence,
            spread: Some(spread),
            total: Some(220.5),
            home_implied_prob: Some(0.6),
            is_opening: false,
            is_closing: false,
        }
    }

    #[test]
    fn recalibration_versions_only_increase() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.latest_recalibration().unwrap().is_none());

        let v1 = RecalibrationParams {
            a: 0.8,
            b: 0.1,
            version: 1,
            samples: 40,
            fitted_at: Some(Utc::now()),
        };
        db.insert_recalibration(&v1).unwrap();
        let latest = db.latest_recalibration().unwrap().unwrap();
        assert_eq!(latest.version, 1);
        assert_eq!(latest.samples, 40);
        assert!((latest.a - 0.8).abs() < 1e-12);

        assert!(db.insert_recalibration(&v1).is_err());
        db.insert_recalibration(&RecalibrationParams { version: 2, ..v1.clone() }).unwrap();
        assert_eq!(db.list_recalibrations(10).unwrap().len(), 2);
        assert_eq!(db.latest_recalibration().unwrap().unwrap().version, 2);
    }

    #[test]
    fn outcomes_round_trip_and_filter_by_sport() {
        let db = Database::open_in_memory().unwrap();
        let base = ValidatedOutcome {
            id: None,
            event_id: "ev1".into(),
            sport: "basketball_nba".into(),
            predicted_home_win_prob: 0.62,
            predicted_spread: 4.0,
            predicted_total: 221.0,
            home_score: 110,
            away_score: 104,
            market_spread: Some(-3.5),
            market_total: None,
            validated_at: Utc::now(),
        };
        let id = db.insert_outcome(&base).unwrap();
        db.insert_outcome(&ValidatedOutcome {
            event_id: "ev2".into(),
            sport: "icehockey_nhl".into(),
            ..base.clone()
        })
        .unwrap();
        // Re-validation replaces rather than duplicates.
        let again = db
            .insert_outcome(&ValidatedOutcome {
                home_score: 100,
                ..base.clone()
            })
            .unwrap();
        assert_eq!(id, again);

        assert_eq!(db.list_outcomes(None).unwrap().len(), 2);
        let nba = db.list_outcomes(Some("basketball_nba")).unwrap();
        assert_eq!(nba.len(), 1);
        assert_eq!(nba[0].home_score, 100);
        assert_eq!(nba[0].market_spread, Some(-3.5));
    }

    #[test]
    fn first_snapshot_is_opening_and_only_one_is_closing() {
        let db = Database::open_in_memory().unwrap();
        let monitor = MonitorSettings::default();
        let start = Utc::now() + Duration::hours(5);

        let open = db.record_snapshot(&snapshot("ev", start - Duration::hours(5), start, -3.0), &monitor).unwrap();
        assert!(open.is_opening);
        assert!(!open.is_closing);

        let mid = db.record_snapshot(&snapshot("ev", start - Duration::hours(2), start, -4.0), &monitor).unwrap();
        assert!(!mid.is_opening && !mid.is_closing);

        let close1 = db.record_snapshot(&snapshot("ev", start - Duration::minutes(25), start, -4.5), &monitor).unwrap();
        assert!(close1.is_closing);
        let close2 = db.record_snapshot(&snapshot("ev", start - Duration::minutes(5), start, -5.0), &monitor).unwrap();
        assert!(close2.is_closing);

        let all = db.list_snapshots("ev").unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all.iter().filter(|s| s.is_opening).count(), 1);
        let closing: Vec<_> = all.iter().filter(|s| s.is_closing).collect();
        assert_eq!(closing.len(), 1);
        assert_eq!(closing[0].spread, Some(-5.0));
        assert!(all[0].is_opening);
    }

    #[test]
    fn late_arriving_earlier_capture_does_not_steal_closing_mark() {
        let db = Database::open_in_memory().unwrap();
        let monitor = MonitorSettings::default();
        let start = Utc::now() + Duration::hours(1);
        db.record_snapshot(&snapshot("ev", start - Duration::minutes(5), start, -5.0), &monitor).unwrap();
        let stale = db.record_snapshot(&snapshot("ev", start - Duration::minutes(20), start, -4.0), &monitor).unwrap();
        assert!(!stale.is_closing);
        let closing: Vec<_> = db
            .list_snapshots("ev")
            .unwrap()
            .into_iter()
            .filter(|s| s.is_closing)
            .collect();
        assert_eq!(closing.len(), 1);
        assert_eq!(closing[0].spread, Some(-5.0));
    }

    #[test]
    fn in_play_capture_keeps_pre_start_closing_line() {
        let db = Database::open_in_memory().unwrap();
        let monitor = MonitorSettings::default();
        let start = Utc::now();
        db.record_snapshot(&snapshot("ev", start - Duration::hours(5), start, -3.0), &monitor).unwrap();
        let close = db.record_snapshot(&snapshot("ev", start - Duration::minutes(10), start, -4.0), &monitor).unwrap();
        assert!(close.is_closing);
        let live = db.record_snapshot(&snapshot("ev", start + Duration::hours(2), start, 12.5), &monitor).unwrap();
        assert!(!live.is_closing);

        let closing: Vec<_> = db
            .list_snapshots("ev")
            .unwrap()
            .into_iter()
            .filter(|s| s.is_closing)
            .collect();
        assert_eq!(closing.len(), 1);
        assert_eq!(closing[0].spread, Some(-4.0));
    }

    #[test]
    fn prediction_versions_bump_on_each_write() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_prediction("ev").unwrap().is_none());
        let p = ModelPrediction {
            predicted_spread: 3.0,
            predicted_total: 220.0,
            home_win_probability: 0.6,
            confidence: 65.0,
            uncertainty: Default::default(),
        };
        assert_eq!(db.upsert_prediction("ev", &p).unwrap().version, 1);
        let updated = ModelPrediction {
            predicted_spread: 5.0,
            ..p.clone()
        };
        let stored = db.upsert_prediction("ev", &updated).unwrap();
        assert_eq!(stored.version, 2);
        assert_eq!(db.get_prediction("ev").unwrap().unwrap().prediction, updated);
    }

    #[test]
    fn reprediction_history_counts_attempts() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.reprediction_history("ev").unwrap(), RepredictionHistory::default());
        let t0 = Utc::now() - Duration::hours(3);
        for (i, superseded) in [true, false].into_iter().enumerate() {
            db.record_reprediction(&RepredictionRecord {
                id: None,
                event_id: "ev".into(),
                attempted_at: t0 + Duration::hours(i as i64),
                superseded,
            })
            .unwrap();
        }
        let h = db.reprediction_history("ev").unwrap();
        assert_eq!(h.count, 2);
        assert_eq!(h.last_at.map(|t| t.timestamp()), Some((t0 + Duration::hours(1)).timestamp()));
        assert_eq!(db.list_repredictions("ev").unwrap().len(), 2);
    }

    fn prediction(spread: f64, confidence: f64) -> ModelPrediction {
        ModelPrediction {
            predicted_spread: spread,
            predicted_total: 220.0,
            home_win_probability: 0.6,
            confidence,
            uncertainty: Default::default(),
        }
    }

    fn up_to(max: u32) -> impl Fn(&RepredictionHistory) -> RepredictionDecision {
        move |h| {
            if h.count >= max {
                RepredictionDecision::LimitReached { count: h.count }
            } else {
                RepredictionDecision::Trigger
            }
        }
    }

    #[test]
    fn refused_reprediction_records_nothing() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_prediction("ev", &prediction(4.0, 60.0)).unwrap();
        let attempt = db
            .apply_reprediction("ev", &prediction(9.0, 60.0), Utc::now(), |_| {
                RepredictionDecision::NotSignificant
            })
            .unwrap();
        assert_eq!(attempt.decision, RepredictionDecision::NotSignificant);
        assert!(!attempt.superseded);
        assert_eq!(attempt.standing.unwrap().version, 1);
        assert_eq!(db.reprediction_history("ev").unwrap().count, 0);
    }

    #[test]
    fn triggered_reprediction_supersedes_only_on_material_change() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        db.upsert_prediction("ev", &prediction(4.0, 60.0)).unwrap();

        let kept = db.apply_reprediction("ev", &prediction(4.5, 62.0), now, up_to(3)).unwrap();
        assert!(!kept.superseded);
        assert_eq!(kept.standing.unwrap().version, 1);

        let replaced = db
            .apply_reprediction("ev", &prediction(6.0, 60.0), now + Duration::hours(2), up_to(3))
            .unwrap();
        assert!(replaced.superseded);
        assert_eq!(replaced.standing.unwrap().version, 2);

        let records = db.list_repredictions("ev").unwrap();
        assert_eq!(records.iter().map(|r| r.superseded).collect::<Vec<_>>(), vec![false, true]);
    }

    #[test]
    fn concurrent_repredictions_respect_the_limit() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        let triggered = std::sync::atomic::AtomicU32::new(0);
        std::thread::scope(|scope| {
            for i in 0..8 {
                let db = db.clone();
                let triggered = &triggered;
                scope.spawn(move || {
                    let attempt = db
                        .apply_reprediction("ev", &prediction(i as f64 * 2.0, 60.0), now, up_to(3))
                        .unwrap();
                    if attempt.decision.should_repredict() {
                        triggered.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    }
                });
            }
        });
        assert_eq!(triggered.into_inner(), 3);
        assert_eq!(db.reprediction_history("ev").unwrap().count, 3);
        assert_eq!(db.get_prediction("ev").unwrap().unwrap().version, 3);
    }
}
