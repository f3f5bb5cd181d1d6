use chrono::{DateTime, Local};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::app_dirs::AppDirs;
use crate::error::Result;
use crate::metrics;
use crate::session::{Mode, SessionResult};

/// Receives every finished session.
pub trait ResultSink {
    fn submit(&mut self, result: &SessionResult) -> Result<()>;
}

/// One stored session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryRecord {
    pub id: i64,
    pub wpm: f64,
    pub accuracy: f64,
    pub hits: usize,
    pub errors: usize,
    pub words: usize,
    pub duration: u32,
    pub mode: Mode,
    pub language: String,
    pub recorded_at: DateTime<Local>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PersonalBest {
    pub user_id: String,
    pub duration: u32,
    pub mode: Mode,
    pub best_wpm: f64,
    pub best_accuracy: f64,
    pub updated_at: DateTime<Local>,
}

/// Aggregates over a set of stored sessions.
#[derive(Debug, Clone, PartialEq)]
pub struct HistorySummary {
    pub best_wpm: f64,
    pub best_accuracy: f64,
    pub avg_wpm: f64,
    pub total_words: usize,
    pub total_tests: usize,
    pub wpm_std_dev: f64,
}

impl HistorySummary {
    /// `None` when there is nothing to summarise.
    pub fn from_records(records: &[HistoryRecord]) -> Option<Self> {
        let wpms: Vec<f64> = records.iter().map(|r| r.wpm).collect();
        let avg_wpm = metrics::mean(&wpms)?;

        Some(Self {
            best_wpm: wpms.iter().copied().fold(f64::MIN, f64::max),
            best_accuracy: records.iter().map(|r| r.accuracy).fold(f64::MIN, f64::max),
            avg_wpm,
            total_words: records.iter().map(|r| r.words).sum(),
            total_tests: records.len(),
            wpm_std_dev: metrics::std_dev(&wpms).unwrap_or(0.0),
        })
    }
}

/// SQLite store for session history and personal bests
#[derive(Debug)]
pub struct HistoryDb {
    conn: Connection,
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Local>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Local))
        .map_err(|_| rusqlite::Error::InvalidColumnType(idx, "recorded_at".to_string(), rusqlite::types::Type::Text))
}

fn parse_mode(raw: &str) -> Mode {
    Mode::from_name(raw).unwrap_or_default()
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<HistoryRecord> {
    let mode: String = row.get(7)?;
    let recorded_at: String = row.get(9)?;
    Ok(HistoryRecord {
        id: row.get(0)?,
        wpm: row.get(1)?,
        accuracy: row.get(2)?,
        hits: row.get::<_, i64>(3)? as usize,
        errors: row.get::<_, i64>(4)? as usize,
        words: row.get::<_, i64>(5)? as usize,
        duration: row.get(6)?,
        mode: parse_mode(&mode),
        language: row.get(8)?,
        recorded_at: parse_timestamp(9, &recorded_at)?,
    })
}

const SELECT_RECORDS: &str = "SELECT id, wpm, accuracy, hits, errors, words, duration, mode, language, recorded_at FROM results";

impl HistoryDb {
    /// Open the default database under the state directory.
    pub fn open() -> Result<Self> {
        let path = AppDirs::db_path().unwrap_or_else(|| PathBuf::from("tmt_history.db"));
        Self::open_at(path)
    }

    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        debug!(path = %path.display(), "opening history database");
        Self::init(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                wpm REAL NOT NULL,
                accuracy REAL NOT NULL,
                hits INTEGER NOT NULL,
                errors INTEGER NOT NULL,
                words INTEGER NOT NULL,
                duration INTEGER NOT NULL,
                mode TEXT NOT NULL,
                language TEXT NOT NULL,
                recorded_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_results_duration ON results(duration);

            CREATE TABLE IF NOT EXISTS personal_bests (
                user_id TEXT NOT NULL,
                duration INTEGER NOT NULL,
                mode TEXT NOT NULL,
                best_wpm REAL NOT NULL DEFAULT 0,
                best_accuracy REAL NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (user_id, duration, mode)
            );
            "#,
        )?;
        Ok(Self { conn })
    }

    /// Store a finished session and return its row id.
    pub fn record(&self, result: &SessionResult, language: &str) -> Result<i64> {
        self.conn.execute(
            r#"
            INSERT INTO results (wpm, accuracy, hits, errors, words, duration, mode, language, recorded_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                result.wpm,
                result.accuracy,
                result.hits as i64,
                result.errors as i64,
                result.words as i64,
                result.duration,
                result.mode.to_string(),
                language,
                result.recorded_at.to_rfc3339(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// All sessions, newest first, optionally restricted to one duration.
    pub fn records(&self, duration: Option<u32>) -> Result<Vec<HistoryRecord>> {
        let records = match duration {
            Some(d) => {
                let mut stmt = self
                    .conn
                    .prepare(&format!("{SELECT_RECORDS} WHERE duration = ?1 ORDER BY recorded_at DESC, id DESC"))?;
                let rows = stmt.query_map([d], record_from_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt = self
                    .conn
                    .prepare(&format!("{SELECT_RECORDS} ORDER BY recorded_at DESC, id DESC"))?;
                let rows = stmt.query_map([], record_from_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(records)
    }

    pub fn recent(&self, limit: usize) -> Result<Vec<HistoryRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SELECT_RECORDS} ORDER BY recorded_at DESC, id DESC LIMIT ?1"))?;
        let rows = stmt.query_map([limit as i64], record_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn summary(&self, duration: Option<u32>) -> Result<Option<HistorySummary>> {
        Ok(HistorySummary::from_records(&self.records(duration)?))
    }

    /// Raise the stored best for `(user_id, duration, mode)`. WPM and
    /// accuracy are maximised independently.
    pub fn upsert_personal_best(
        &self,
        user_id: &str,
        duration: u32,
        mode: Mode,
        wpm: f64,
        accuracy: f64,
    ) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO personal_bests (user_id, duration, mode, best_wpm, best_accuracy, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(user_id, duration, mode) DO UPDATE SET
                best_wpm = MAX(best_wpm, excluded.best_wpm),
                best_accuracy = MAX(best_accuracy, excluded.best_accuracy),
                updated_at = excluded.updated_at
            "#,
            params![user_id, duration, mode.to_string(), wpm, accuracy, Local::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn personal_best(&self, user_id: &str, duration: u32, mode: Mode) -> Result<Option<PersonalBest>> {
        let best = self
            .conn
            .query_row(
                r#"
                SELECT user_id, duration, mode, best_wpm, best_accuracy, updated_at
                FROM personal_bests
                WHERE user_id = ?1 AND duration = ?2 AND mode = ?3
                "#,
                params![user_id, duration, mode.to_string()],
                |row| {
                    let mode: String = row.get(2)?;
                    let updated_at: String = row.get(5)?;
                    Ok(PersonalBest {
                        user_id: row.get(0)?,
                        duration: row.get(1)?,
                        mode: parse_mode(&mode),
                        best_wpm: row.get(3)?,
                        best_accuracy: row.get(4)?,
                        updated_at: parse_timestamp(5, &updated_at)?,
                    })
                },
            )
            .optional()?;
        Ok(best)
    }

    /// Push the rounded best of local history, per duration and mode, into
    /// the personal bests for `user_id`. Returns how many keys were touched.
    pub fn sync_personal_bests(&self, user_id: &str) -> Result<usize> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT duration, mode, MAX(wpm), MAX(accuracy)
            FROM results
            GROUP BY duration, mode
            "#,
        )?;
        let groups = stmt
            .query_map([], |row| {
                let mode: String = row.get(1)?;
                Ok((row.get::<_, u32>(0)?, parse_mode(&mode), row.get::<_, f64>(2)?, row.get::<_, f64>(3)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        for (duration, mode, wpm, accuracy) in &groups {
            self.upsert_personal_best(user_id, *duration, *mode, wpm.round(), accuracy.round())?;
        }
        info!(user_id, keys = groups.len(), "personal bests synced");
        Ok(groups.len())
    }

    /// Delete all stored sessions. Personal bests are kept.
    pub fn clear(&self) -> Result<usize> {
        Ok(self.conn.execute("DELETE FROM results", [])?)
    }

    pub fn remove(&self, id: i64) -> Result<bool> {
        Ok(self.conn.execute("DELETE FROM results WHERE id = ?1", [id])? > 0)
    }
}

/// Write records as CSV with a header row.
pub fn export_csv<W: Write>(records: &[HistoryRecord], writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Records every session locally and keeps personal bests for the
/// configured user.
pub struct HistoryRecorder {
    db: HistoryDb,
    user_id: Option<String>,
    language: String,
}

impl HistoryRecorder {
    pub fn new(db: HistoryDb, user_id: Option<String>, language: impl Into<String>) -> Self {
        Self {
            db,
            user_id,
            language: language.into(),
        }
    }

    pub fn db(&self) -> &HistoryDb {
        &self.db
    }
}

impl ResultSink for HistoryRecorder {
    fn submit(&mut self, result: &SessionResult) -> Result<()> {
        let id = self.db.record(result, &self.language)?;
        info!(id, wpm = result.wpm, accuracy = result.accuracy, "session recorded");

        if let Some(user_id) = &self.user_id {
            self.db
                .upsert_personal_best(user_id, result.duration, result.mode, result.wpm, result.accuracy)?;
        }
        Ok(())
    }
}
