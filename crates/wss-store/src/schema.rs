use std::sync::Once;

use rusqlite::ffi::sqlite3_auto_extension;
use rusqlite::{Connection, OptionalExtension};
use sqlite_vec::sqlite3_vec_init;

use wss_core::WssError;

static VEC_INIT: Once = Once::new();

/// Register sqlite-vec for every connection opened afterwards.
pub fn ensure_vec_init() {
    VEC_INIT.call_once(|| unsafe {
        sqlite3_auto_extension(Some(std::mem::transmute(sqlite3_vec_init as *const ())));
    });
}

fn table_exists(conn: &Connection, name: &str) -> Result<bool, WssError> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name=?1",
        [name],
        |row| row.get(0),
    )
    .map_err(|e| WssError::Database(e.to_string()))
}

/// Scenario memories plus their vector index.
pub fn init_scenario_db(conn: &Connection, dims: usize) -> Result<(), WssError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS scenarios (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            content TEXT NOT NULL,
            task_name TEXT,
            task_description TEXT,
            trajectory TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_scenarios_kind ON scenarios(kind);
        CREATE INDEX IF NOT EXISTS idx_scenarios_created ON scenarios(created_at);

        CREATE TABLE IF NOT EXISTS store_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        ",
    )
    .map_err(|e| WssError::Database(e.to_string()))?;

    // The vec0 dimension is fixed at creation; refuse to reopen with another.
    let stored_dims: Option<String> = conn
        .query_row(
            "SELECT value FROM store_meta WHERE key = 'dimensions'",
            [],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| WssError::Database(e.to_string()))?;
    match stored_dims {
        Some(d) if d != dims.to_string() => {
            return Err(WssError::Config(format!(
                "store was created with {d} dimensions, embedder has {dims}"
            )));
        }
        Some(_) => {}
        None => {
            conn.execute(
                "INSERT INTO store_meta (key, value) VALUES ('dimensions', ?1)",
                [dims.to_string()],
            )
            .map_err(|e| WssError::Database(e.to_string()))?;
        }
    }

    if !table_exists(conn, "vec_scenarios")? {
        conn.execute_batch(&format!(
            "CREATE VIRTUAL TABLE vec_scenarios USING vec0(
                scenario_id TEXT PRIMARY KEY,
                embedding float[{dims}] distance_metric=cosine
            )"
        ))
        .map_err(|e| WssError::Database(e.to_string()))?;
    }

    Ok(())
}

/// Users, items and reviews of a prepared dataset, stored as JSON blobs.
pub fn init_dataset_db(conn: &Connection) -> Result<(), WssError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            user_id TEXT PRIMARY KEY,
            data TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS items (
            item_id TEXT PRIMARY KEY,
            data TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS reviews (
            review_id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            item_id TEXT NOT NULL,
            data TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_reviews_user ON reviews(user_id);
        CREATE INDEX IF NOT EXISTS idx_reviews_item ON reviews(item_id);

        CREATE TABLE IF NOT EXISTS dataset_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        ",
    )
    .map_err(|e| WssError::Database(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_scenario_db() {
        ensure_vec_init();
        let conn = Connection::open_in_memory().unwrap();
        init_scenario_db(&conn, 8).unwrap();
        // Second call should be idempotent
        init_scenario_db(&conn, 8).unwrap();
        assert!(table_exists(&conn, "vec_scenarios").unwrap());
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        ensure_vec_init();
        let conn = Connection::open_in_memory().unwrap();
        init_scenario_db(&conn, 8).unwrap();
        let err = init_scenario_db(&conn, 16).unwrap_err();
        assert!(matches!(err, WssError::Config(_)));
    }

    #[test]
    fn test_dataset_tables_exist() {
        let conn = Connection::open_in_memory().unwrap();
        init_dataset_db(&conn).unwrap();
        init_dataset_db(&conn).unwrap();

        let tables: Vec<String> = {
            let mut stmt = conn
                .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
                .unwrap();
            stmt.query_map([], |row| row.get(0))
                .unwrap()
                .map(|r| r.unwrap())
                .collect()
        };

        for t in ["users", "items", "reviews", "dataset_meta"] {
            assert!(tables.contains(&t.to_string()), "missing {t}");
        }
    }
}
