//! SQLite-backed local cache.
//!
//! Stores ranked list rows and detail records. Every committed write bumps a
//! [`StoreVersion`] published on a `watch` channel, which the observers in
//! [`super::observe`] use to re-query.

use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use tokio::sync::{watch, Mutex};
use tracing::debug;

use super::entities::{DetailRecord, ListItem};
use super::now_millis;
use crate::error::StoreError;

pub type StoreResult<T> = Result<T, StoreError>;

/// Write counters, bumped after each committed write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreVersion {
    pub list: u64,
    pub detail: u64,
    /// Unix millis of the most recent write of either kind
    pub last_write_at: Option<i64>,
}

#[derive(Debug, Clone, Copy)]
enum Table {
    List,
    Detail,
}

const LIST_COLUMNS: &str = "mal_id, title, synopsis, episodes, score, poster_url, last_updated";
const DETAIL_COLUMNS: &str =
    "mal_id, title, synopsis, genres, cast_names, episodes, score, poster_url, youtube_id, last_updated";

pub struct LocalStore {
    conn: Mutex<Connection>,
    changes: watch::Sender<StoreVersion>,
}

impl LocalStore {
    /// Open or create a store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        Self::init_schema(&conn)?;
        let (changes, _) = watch::channel(StoreVersion::default());
        Ok(Self {
            conn: Mutex::new(conn),
            changes,
        })
    }

    fn init_schema(conn: &Connection) -> StoreResult<()> {
        // Ranked list; `id` preserves insertion order for equal scores
        conn.execute(
            "CREATE TABLE IF NOT EXISTS anime (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                mal_id INTEGER NOT NULL UNIQUE,
                title TEXT NOT NULL,
                synopsis TEXT,
                episodes INTEGER,
                score REAL,
                poster_url TEXT,
                last_updated INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS anime_details (
                mal_id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                synopsis TEXT,
                genres TEXT,
                cast_names TEXT,
                episodes INTEGER,
                score REAL,
                poster_url TEXT,
                youtube_id TEXT,
                last_updated INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_anime_score ON anime(score DESC)",
            [],
        )?;

        Ok(())
    }

    fn notify(&self, table: Table) {
        let now = now_millis();
        self.changes.send_modify(|version| {
            match table {
                Table::List => version.list += 1,
                Table::Detail => version.detail += 1,
            }
            version.last_write_at = Some(now);
        });
    }

    /// Current write counters
    pub fn version(&self) -> StoreVersion {
        *self.changes.borrow()
    }

    /// Receiver that fires after every committed write
    pub fn subscribe(&self) -> watch::Receiver<StoreVersion> {
        self.changes.subscribe()
    }

    // === List Operations ===

    fn list_item_from_row(row: &Row<'_>) -> rusqlite::Result<ListItem> {
        Ok(ListItem {
            id: row.get(0)?,
            title: row.get(1)?,
            synopsis: row.get(2)?,
            episodes: row.get(3)?,
            score: row.get(4)?,
            poster_url: row.get(5)?,
            last_updated: row.get(6)?,
        })
    }

    fn insert_list_rows(conn: &Connection, items: &[ListItem]) -> rusqlite::Result<()> {
        let mut stmt = conn.prepare(&format!(
            "INSERT INTO anime ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(mal_id) DO UPDATE SET
             title = excluded.title,
             synopsis = excluded.synopsis,
             episodes = excluded.episodes,
             score = excluded.score,
             poster_url = excluded.poster_url,
             last_updated = excluded.last_updated",
            LIST_COLUMNS
        ))?;

        for item in items {
            stmt.execute(params![
                item.id,
                item.title,
                item.synopsis,
                item.episodes,
                item.score,
                item.poster_url,
                item.last_updated
            ])?;
        }
        Ok(())
    }

    /// All list rows, highest score first; unscored rows last
    pub async fn list_items(&self) -> StoreResult<Vec<ListItem>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM anime ORDER BY score IS NULL, score DESC, id ASC",
            LIST_COLUMNS
        ))?;

        let rows = stmt.query_map([], Self::list_item_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Upsert rows, replacing on id conflict
    pub async fn insert_list_items(&self, items: &[ListItem]) -> StoreResult<()> {
        {
            let mut conn = self.conn.lock().await;
            let tx = conn.transaction()?;
            Self::insert_list_rows(&tx, items)?;
            tx.commit()?;
        }
        self.notify(Table::List);
        Ok(())
    }

    /// Clear the list and insert `items` in one transaction
    pub async fn replace_list(&self, items: &[ListItem]) -> StoreResult<()> {
        {
            let mut conn = self.conn.lock().await;
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM anime", [])?;
            Self::insert_list_rows(&tx, items)?;
            tx.commit()?;
        }
        debug!("Replaced cached list with {} items", items.len());
        self.notify(Table::List);
        Ok(())
    }

    pub async fn clear_list(&self) -> StoreResult<()> {
        {
            let conn = self.conn.lock().await;
            conn.execute("DELETE FROM anime", [])?;
        }
        self.notify(Table::List);
        Ok(())
    }

    // === Detail Operations ===

    fn detail_from_row(row: &Row<'_>) -> rusqlite::Result<DetailRecord> {
        Ok(DetailRecord {
            id: row.get(0)?,
            title: row.get(1)?,
            synopsis: row.get(2)?,
            genres: row.get(3)?,
            cast: row.get(4)?,
            episodes: row.get(5)?,
            score: row.get(6)?,
            poster_url: row.get(7)?,
            video_id: row.get(8)?,
            last_updated: row.get(9)?,
        })
    }

    pub async fn detail(&self, id: i64) -> StoreResult<Option<DetailRecord>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM anime_details WHERE mal_id = ?1 LIMIT 1",
            DETAIL_COLUMNS
        ))?;

        Ok(stmt.query_row(params![id], Self::detail_from_row).optional()?)
    }

    /// Insert or overwrite the record with the same id
    pub async fn upsert_detail(&self, record: &DetailRecord) -> StoreResult<()> {
        {
            let conn = self.conn.lock().await;
            conn.execute(
                &format!(
                    "INSERT INTO anime_details ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                     ON CONFLICT(mal_id) DO UPDATE SET
                     title = excluded.title,
                     synopsis = excluded.synopsis,
                     genres = excluded.genres,
                     cast_names = excluded.cast_names,
                     episodes = excluded.episodes,
                     score = excluded.score,
                     poster_url = excluded.poster_url,
                     youtube_id = excluded.youtube_id,
                     last_updated = excluded.last_updated",
                    DETAIL_COLUMNS
                ),
                params![
                    record.id,
                    record.title,
                    record.synopsis,
                    record.genres,
                    record.cast,
                    record.episodes,
                    record.score,
                    record.poster_url,
                    record.video_id,
                    record.last_updated
                ],
            )?;
        }
        self.notify(Table::Detail);
        Ok(())
    }

    pub async fn delete_detail(&self, id: i64) -> StoreResult<()> {
        {
            let conn = self.conn.lock().await;
            conn.execute("DELETE FROM anime_details WHERE mal_id = ?1", params![id])?;
        }
        self.notify(Table::Detail);
        Ok(())
    }

    pub async fn clear_details(&self) -> StoreResult<()> {
        {
            let conn = self.conn.lock().await;
            conn.execute("DELETE FROM anime_details", [])?;
        }
        self.notify(Table::Detail);
        Ok(())
    }

    /// Run raw SQL against the connection (test fault injection)
    #[cfg(test)]
    pub(crate) async fn execute_raw(&self, sql: &str) -> StoreResult<()> {
        let conn = self.conn.lock().await;
        conn.execute_batch(sql)?;
        Ok(())
    }
}
