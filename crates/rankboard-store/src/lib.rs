use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;
use rankboard_config::{RankboardConfig, database_path};
use rankboard_core::{ChannelKind, EntityKey, HistoryEntry, Observation, QueryDescriptor, Rank};
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior, params};
use thiserror::Error;

const DATE_FORMAT: &str = "%Y-%m-%d";
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

const RANK_POSITION: &str = "position";
const RANK_OUT_OF_RANGE: &str = "out_of_range";
const RANK_UNRECOGNIZED: &str = "unrecognized";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Whole-collection persistence for rank history plus the small amount of
/// display state that outlives a session.
pub trait Store {
    fn load_history(&self) -> Result<Vec<HistoryEntry>, StoreError>;
    /// Replaces the stored collection with `entries`. Either every entry is
    /// written or nothing changes.
    fn save_history(&self, entries: &[HistoryEntry]) -> Result<(), StoreError>;

    fn load_group_order(&self, channel: ChannelKind) -> Result<Vec<String>, StoreError>;
    fn save_group_order(&self, channel: ChannelKind, group_keys: &[String])
    -> Result<(), StoreError>;

    fn load_preference(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn save_preference(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Runs `work` with every other writer of the same store shut out. Calls
    /// made through the store inside `work` commit together, and none of them
    /// commit when `work` fails.
    fn write_exclusive<T, E>(&self, work: impl FnOnce(&Self) -> Result<T, E>) -> Result<T, E>
    where
        Self: Sized,
        E: From<StoreError>,
    {
        work(self)
    }

    /// Runs `work` against one consistent view of the store.
    fn read_snapshot<T, E>(&self, work: impl FnOnce(&Self) -> Result<T, E>) -> Result<T, E>
    where
        Self: Sized,
        E: From<StoreError>,
    {
        work(self)
    }
}

pub struct SqliteStore {
    conn: Connection,
    path: PathBuf,
}

impl SqliteStore {
    pub fn open(
        workspace_root: impl AsRef<Path>,
        config: &RankboardConfig,
    ) -> Result<Self, StoreError> {
        Self::open_path(database_path(workspace_root, config))
    }

    pub fn open_path(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        run_migrations(&conn)?;

        Ok(Self { conn, path })
    }

    /// Drops one entity and its log. Maintenance only; the merge engine never
    /// deletes history.
    pub fn delete_entry(&self, entity_key: &EntityKey) -> Result<bool, StoreError> {
        self.atomic(|conn| {
            conn.execute(
                "DELETE FROM observations WHERE entity_key = ?1",
                params![entity_key.as_str()],
            )?;
            let removed = conn.execute(
                "DELETE FROM history_entries WHERE entity_key = ?1",
                params![entity_key.as_str()],
            )?;
            Ok(removed > 0)
        })
    }

    // Joins an enclosing transaction when there is one.
    fn atomic<T>(
        &self,
        work: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        if !self.conn.is_autocommit() {
            return work(&self.conn);
        }
        let tx = self.conn.unchecked_transaction()?;
        let value = work(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    fn within<T, E>(
        &self,
        behavior: TransactionBehavior,
        work: impl FnOnce(&Self) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        if !self.conn.is_autocommit() {
            return work(self);
        }
        let tx = Transaction::new_unchecked(&self.conn, behavior).map_err(StoreError::from)?;
        let value = work(self)?;
        tx.commit().map_err(StoreError::from)?;
        Ok(value)
    }
}

impl Store for SqliteStore {
    fn load_history(&self) -> Result<Vec<HistoryEntry>, StoreError> {
        self.atomic(read_history)
    }

    fn save_history(&self, entries: &[HistoryEntry]) -> Result<(), StoreError> {
        self.atomic(|conn| write_history(conn, entries))?;
        tracing::debug!(entries = entries.len(), path = %self.path.display(), "saved rank history");
        Ok(())
    }

    fn load_group_order(&self, channel: ChannelKind) -> Result<Vec<String>, StoreError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT group_key
            FROM group_order
            WHERE channel = ?1
            ORDER BY position
            "#,
        )?;
        let rows = stmt.query_map(params![channel.as_str()], |row| row.get::<_, String>(0))?;
        let keys = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }

    fn save_group_order(
        &self,
        channel: ChannelKind,
        group_keys: &[String],
    ) -> Result<(), StoreError> {
        self.atomic(|conn| {
            conn.execute(
                "DELETE FROM group_order WHERE channel = ?1",
                params![channel.as_str()],
            )?;
            let mut insert = conn.prepare(
                "INSERT INTO group_order (channel, position, group_key) VALUES (?1, ?2, ?3)",
            )?;
            for (position, group_key) in group_keys.iter().enumerate() {
                insert.execute(params![channel.as_str(), position as i64, group_key])?;
            }
            Ok(())
        })
    }

    fn load_preference(&self, key: &str) -> Result<Option<String>, StoreError> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM preferences WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn save_preference(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.conn.execute(
            r#"
            INSERT INTO preferences (key, value) VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
            params![key, value],
        )?;
        Ok(())
    }

    // IMMEDIATE takes the database write lock before the first read, so two
    // writers cannot both load the same state and save over each other.
    fn write_exclusive<T, E>(&self, work: impl FnOnce(&Self) -> Result<T, E>) -> Result<T, E>
    where
        Self: Sized,
        E: From<StoreError>,
    {
        self.within(TransactionBehavior::Immediate, work)
    }

    fn read_snapshot<T, E>(&self, work: impl FnOnce(&Self) -> Result<T, E>) -> Result<T, E>
    where
        Self: Sized,
        E: From<StoreError>,
    {
        self.within(TransactionBehavior::Deferred, work)
    }
}

fn read_history(conn: &Connection) -> Result<Vec<HistoryEntry>, StoreError> {
    let mut stmt = conn.prepare(
        r#"
        SELECT entity_key, descriptor_json, title_observed_on
        FROM history_entries
        ORDER BY entity_key
        "#,
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<String>>(2)?,
        ))
    })?;

    let mut entries = BTreeMap::new();
    for row in rows {
        let (raw_key, descriptor_json, title_observed_on) = row?;
        let entity_key = EntityKey::parse(&raw_key)
            .map_err(|err| StoreError::Corrupt(format!("history entry key: {err}")))?;
        let descriptor: QueryDescriptor = serde_json::from_str(&descriptor_json)?;
        let title_observed_on = title_observed_on
            .map(|raw| parse_date(&raw, &raw_key))
            .transpose()?;
        entries.insert(
            raw_key,
            HistoryEntry {
                entity_key,
                descriptor,
                log: Vec::new(),
                title_observed_on,
            },
        );
    }

    let mut stmt = conn.prepare(
        r#"
        SELECT entity_key, observed_on, rank_kind, rank_position, rank_marker, screenshot_ref
        FROM observations
        ORDER BY entity_key, observed_on
        "#,
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(ObservationRow {
            entity_key: row.get(0)?,
            observed_on: row.get(1)?,
            rank_kind: row.get(2)?,
            rank_position: row.get(3)?,
            rank_marker: row.get(4)?,
            screenshot_ref: row.get(5)?,
        })
    })?;

    for row in rows {
        let row = row?;
        let entry = entries.get_mut(&row.entity_key).ok_or_else(|| {
            StoreError::Corrupt(format!(
                "observation for unknown entity '{}'",
                row.entity_key
            ))
        })?;
        entry.log.push(row.into_observation()?);
    }

    Ok(entries.into_values().collect())
}

fn write_history(conn: &Connection, entries: &[HistoryEntry]) -> Result<(), StoreError> {
    conn.execute("DELETE FROM observations", [])?;
    conn.execute("DELETE FROM history_entries", [])?;

    let mut insert_entry = conn.prepare(
        r#"
        INSERT INTO history_entries (entity_key, channel, descriptor_json, title_observed_on)
        VALUES (?1, ?2, ?3, ?4)
        "#,
    )?;
    let mut insert_observation = conn.prepare(
        r#"
        INSERT INTO observations (
            entity_key, observed_on, rank_kind, rank_position, rank_marker, screenshot_ref
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )?;

    for entry in entries {
        insert_entry.execute(params![
            entry.entity_key.as_str(),
            entry.channel().as_str(),
            serde_json::to_string(&entry.descriptor)?,
            entry
                .title_observed_on
                .map(|date| date.format(DATE_FORMAT).to_string()),
        ])?;

        for observation in &entry.log {
            let (kind, position, marker) = rank_columns(&observation.rank);
            insert_observation.execute(params![
                entry.entity_key.as_str(),
                observation.date.format(DATE_FORMAT).to_string(),
                kind,
                position,
                marker,
                observation.screenshot_ref,
            ])?;
        }
    }
    Ok(())
}

fn parse_date(raw: &str, entity_key: &str) -> Result<NaiveDate, StoreError> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|err| {
        StoreError::Corrupt(format!("date '{raw}' for '{entity_key}': {err}"))
    })
}

struct ObservationRow {
    entity_key: String,
    observed_on: String,
    rank_kind: String,
    rank_position: Option<i64>,
    rank_marker: Option<String>,
    screenshot_ref: Option<String>,
}

impl ObservationRow {
    fn into_observation(self) -> Result<Observation, StoreError> {
        let date = parse_date(&self.observed_on, &self.entity_key)?;

        let rank = match self.rank_kind.as_str() {
            RANK_POSITION => self
                .rank_position
                .and_then(|value| u32::try_from(value).ok())
                .and_then(Rank::position)
                .ok_or_else(|| {
                    StoreError::Corrupt(format!(
                        "invalid rank position for '{}' on {}",
                        self.entity_key, self.observed_on
                    ))
                })?,
            RANK_OUT_OF_RANGE => Rank::OutOfRange,
            RANK_UNRECOGNIZED => Rank::Unrecognized(self.rank_marker.unwrap_or_default()),
            other => {
                return Err(StoreError::Corrupt(format!("unknown rank kind '{other}'")));
            }
        };

        Ok(Observation {
            date,
            rank,
            screenshot_ref: self.screenshot_ref,
        })
    }
}

fn rank_columns(rank: &Rank) -> (&'static str, Option<i64>, Option<&str>) {
    match rank {
        Rank::Position(value) => (RANK_POSITION, Some(i64::from(*value)), None),
        Rank::OutOfRange => (RANK_OUT_OF_RANGE, None, None),
        Rank::Unrecognized(marker) => (RANK_UNRECOGNIZED, None, Some(marker.as_str())),
    }
}

fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS history_entries (
            entity_key TEXT PRIMARY KEY,
            channel TEXT NOT NULL,
            descriptor_json TEXT NOT NULL,
            title_observed_on TEXT
        );

        CREATE TABLE IF NOT EXISTS observations (
            entity_key TEXT NOT NULL REFERENCES history_entries(entity_key),
            observed_on TEXT NOT NULL,
            rank_kind TEXT NOT NULL,
            rank_position INTEGER,
            rank_marker TEXT,
            screenshot_ref TEXT,
            PRIMARY KEY (entity_key, observed_on)
        );

        CREATE TABLE IF NOT EXISTS group_order (
            channel TEXT NOT NULL,
            position INTEGER NOT NULL,
            group_key TEXT NOT NULL,
            PRIMARY KEY (channel, position)
        );

        CREATE TABLE IF NOT EXISTS preferences (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        "#,
    )?;

    if !column_exists(conn, "history_entries", "title_observed_on")? {
        conn.execute(
            "ALTER TABLE history_entries ADD COLUMN title_observed_on TEXT",
            [],
        )?;
    }

    Ok(())
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, StoreError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
