//! SQLite-backed dataset for `cache` mode.
//!
//! The JSONL files of a prepared dataset are imported once; afterwards
//! lookups hit SQLite on demand instead of holding the whole dataset in
//! memory. Users and items are kept in small LRU caches since every task
//! asks for exactly one of each and neighbouring tasks often repeat them.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Mutex;

use lru::LruCache;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use wss_core::{InteractionTool, Item, Review, User, WssError, WssResult};

use crate::schema::init_dataset_db;

const CACHE_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub users: usize,
    pub items: usize,
    pub reviews: usize,
    /// Lines that failed to parse and were skipped.
    pub skipped: usize,
}

pub struct DatasetStore {
    conn: Mutex<Connection>,
    users: Mutex<LruCache<String, Option<User>>>,
    items: Mutex<LruCache<String, Option<Item>>>,
}

fn lock_err<T>(_: T) -> WssError {
    WssError::Database("dataset store lock poisoned".into())
}

impl DatasetStore {
    pub fn open(path: &Path) -> WssResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| WssError::Database(format!("cannot create db directory: {e}")))?;
        }
        let conn = Connection::open(path)
            .map_err(|e| WssError::Database(format!("cannot open database: {e}")))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(|e| WssError::Database(e.to_string()))?;
        init_dataset_db(&conn)?;
        Ok(Self::from_conn(conn))
    }

    pub fn in_memory() -> WssResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| WssError::Database(format!("cannot open in-memory db: {e}")))?;
        init_dataset_db(&conn)?;
        Ok(Self::from_conn(conn))
    }

    fn from_conn(conn: Connection) -> Self {
        let cap = NonZeroUsize::new(CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self {
            conn: Mutex::new(conn),
            users: Mutex::new(LruCache::new(cap)),
            items: Mutex::new(LruCache::new(cap)),
        }
    }

    /// Source directory of the last completed import, if any.
    pub fn imported_from(&self) -> WssResult<Option<String>> {
        let conn = self.conn.lock().map_err(lock_err)?;
        conn.query_row(
            "SELECT value FROM dataset_meta WHERE key = 'imported_from'",
            [],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| WssError::Database(e.to_string()))
    }

    /// Import `user.json`, `item.json` and `review.json` from `dir`.
    /// A directory that was already imported is skipped.
    pub fn import_dir(&self, dir: &Path) -> WssResult<ImportStats> {
        let source = dir.display().to_string();
        if self.imported_from()?.as_deref() == Some(source.as_str()) {
            debug!(%source, "dataset already imported");
            return Ok(ImportStats::default());
        }

        let mut stats = ImportStats::default();
        let mut conn = self.conn.lock().map_err(lock_err)?;
        let tx = conn
            .transaction()
            .map_err(|e| WssError::Database(e.to_string()))?;

        // A different source replaces whatever was imported before.
        tx.execute_batch("DELETE FROM users; DELETE FROM items; DELETE FROM reviews;")
            .map_err(|e| WssError::Database(e.to_string()))?;

        for_each_line(&dir.join("user.json"), &mut stats.skipped, |line| {
            let user: User = serde_json::from_str(line)?;
            tx.execute(
                "INSERT OR REPLACE INTO users (user_id, data) VALUES (?1, ?2)",
                params![user.user_id, line],
            )
            .map_err(|e| WssError::Database(e.to_string()))?;
            stats.users += 1;
            Ok(())
        })?;

        for_each_line(&dir.join("item.json"), &mut stats.skipped, |line| {
            let item: Item = serde_json::from_str(line)?;
            tx.execute(
                "INSERT OR REPLACE INTO items (item_id, data) VALUES (?1, ?2)",
                params![item.item_id, line],
            )
            .map_err(|e| WssError::Database(e.to_string()))?;
            stats.items += 1;
            Ok(())
        })?;

        for_each_line(&dir.join("review.json"), &mut stats.skipped, |line| {
            let mut review: Review = serde_json::from_str(line)?;
            review.ensure_id(stats.reviews);
            tx.execute(
                "INSERT OR REPLACE INTO reviews (review_id, user_id, item_id, data)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    review.review_id,
                    review.user_id,
                    review.item_id,
                    serde_json::to_string(&review)?
                ],
            )
            .map_err(|e| WssError::Database(e.to_string()))?;
            stats.reviews += 1;
            Ok(())
        })?;

        tx.execute(
            "INSERT OR REPLACE INTO dataset_meta (key, value) VALUES ('imported_from', ?1)",
            params![source],
        )
        .map_err(|e| WssError::Database(e.to_string()))?;
        tx.commit().map_err(|e| WssError::Database(e.to_string()))?;
        drop(conn);
        self.users.lock().map_err(lock_err)?.clear();
        self.items.lock().map_err(lock_err)?.clear();

        info!(
            users = stats.users,
            items = stats.items,
            reviews = stats.reviews,
            skipped = stats.skipped,
            "dataset imported"
        );
        Ok(stats)
    }

    fn query_reviews(&self, column: &str, id: &str) -> WssResult<Vec<Review>> {
        let conn = self.conn.lock().map_err(lock_err)?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT data FROM reviews WHERE {column} = ?1 ORDER BY rowid"
            ))
            .map_err(|e| WssError::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params![id], |row| row.get::<_, String>(0))
            .map_err(|e| WssError::Database(e.to_string()))?;

        let mut results = Vec::new();
        for row in rows {
            let data = row.map_err(|e| WssError::Database(e.to_string()))?;
            results.push(serde_json::from_str(&data)?);
        }
        Ok(results)
    }

    fn query_data(&self, sql: &str, id: &str) -> WssResult<Option<String>> {
        let conn = self.conn.lock().map_err(lock_err)?;
        conn.query_row(sql, params![id], |row| row.get(0))
            .optional()
            .map_err(|e| WssError::Database(e.to_string()))
    }
}

fn for_each_line<F>(path: &Path, skipped: &mut usize, mut f: F) -> WssResult<()>
where
    F: FnMut(&str) -> WssResult<()>,
{
    let file = File::open(path)
        .map_err(|e| WssError::Dataset(format!("cannot open {}: {e}", path.display())))?;
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match f(line) {
            Ok(()) => {}
            Err(WssError::Serialization(e)) => {
                warn!(file = %path.display(), line = n + 1, "skipping malformed record: {e}");
                *skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

impl InteractionTool for DatasetStore {
    fn get_user(&self, user_id: &str) -> WssResult<Option<User>> {
        if let Some(hit) = self.users.lock().map_err(lock_err)?.get(user_id) {
            return Ok(hit.clone());
        }
        let user = match self.query_data("SELECT data FROM users WHERE user_id = ?1", user_id)? {
            Some(data) => Some(serde_json::from_str(&data)?),
            None => None,
        };
        self.users
            .lock()
            .map_err(lock_err)?
            .put(user_id.to_string(), user.clone());
        Ok(user)
    }

    fn get_item(&self, item_id: &str) -> WssResult<Option<Item>> {
        if let Some(hit) = self.items.lock().map_err(lock_err)?.get(item_id) {
            return Ok(hit.clone());
        }
        let item = match self.query_data("SELECT data FROM items WHERE item_id = ?1", item_id)? {
            Some(data) => Some(serde_json::from_str(&data)?),
            None => None,
        };
        self.items
            .lock()
            .map_err(lock_err)?
            .put(item_id.to_string(), item.clone());
        Ok(item)
    }

    fn get_review(&self, review_id: &str) -> WssResult<Option<Review>> {
        match self.query_data("SELECT data FROM reviews WHERE review_id = ?1", review_id)? {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    fn reviews_for_item(&self, item_id: &str) -> WssResult<Vec<Review>> {
        self.query_reviews("item_id", item_id)
    }

    fn reviews_by_user(&self, user_id: &str) -> WssResult<Vec<Review>> {
        self.query_reviews("user_id", user_id)
    }
}
