use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;
use zerocopy::IntoBytes;

use wss_core::{MemoryKind, ScenarioMemory, ScenarioStore, WssError, WssResult};

use crate::schema::{ensure_vec_init, init_scenario_db};

/// Scenario memories in SQLite with a sqlite-vec cosine index.
pub struct SqliteStore {
    conn: Connection,
    dims: usize,
}

impl SqliteStore {
    pub fn new(path: &Path, dims: usize) -> WssResult<Self> {
        ensure_vec_init();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| WssError::Database(format!("cannot create db directory: {e}")))?;
        }
        let conn = Connection::open(path)
            .map_err(|e| WssError::Database(format!("cannot open database: {e}")))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(|e| WssError::Database(e.to_string()))?;
        init_scenario_db(&conn, dims)?;
        debug!(path = %path.display(), dims, "opened scenario store");
        Ok(Self { conn, dims })
    }

    pub fn in_memory(dims: usize) -> WssResult<Self> {
        ensure_vec_init();
        let conn = Connection::open_in_memory()
            .map_err(|e| WssError::Database(format!("cannot open in-memory db: {e}")))?;
        init_scenario_db(&conn, dims)?;
        Ok(Self { conn, dims })
    }

    pub fn dimensions(&self) -> usize {
        self.dims
    }

    fn check_dims(&self, embedding: &[f32]) -> WssResult<()> {
        if embedding.len() != self.dims {
            return Err(WssError::Embedding(format!(
                "expected {} dimensions, got {}",
                self.dims,
                embedding.len()
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Row helpers
// ---------------------------------------------------------------------------

fn parse_dt(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_scenario(row: &rusqlite::Row) -> rusqlite::Result<ScenarioMemory> {
    let kind_str: String = row.get(1)?;
    Ok(ScenarioMemory {
        id: row.get(0)?,
        kind: kind_str.parse().unwrap_or(MemoryKind::Dilu),
        content: row.get(2)?,
        task_name: row.get(3)?,
        task_description: row.get(4)?,
        trajectory: row.get(5)?,
        created_at: parse_dt(&row.get::<_, String>(6)?),
    })
}

const SCENARIO_COLS: &str =
    "id, kind, content, task_name, task_description, trajectory, created_at";

// ---------------------------------------------------------------------------
// ScenarioStore impl
// ---------------------------------------------------------------------------

impl ScenarioStore for SqliteStore {
    fn add(&self, memory: ScenarioMemory, embedding: &[f32]) -> WssResult<String> {
        self.check_dims(embedding)?;

        self.conn
            .execute(
                "INSERT INTO scenarios (id, kind, content, task_name, task_description,
                 trajectory, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    memory.id,
                    memory.kind.to_string(),
                    memory.content,
                    memory.task_name,
                    memory.task_description,
                    memory.trajectory,
                    memory.created_at.to_rfc3339(),
                ],
            )
            .map_err(|e| WssError::Database(e.to_string()))?;

        self.conn
            .execute(
                "INSERT INTO vec_scenarios (scenario_id, embedding) VALUES (?1, ?2)",
                params![memory.id, embedding.as_bytes()],
            )
            .map_err(|e| WssError::Database(e.to_string()))?;

        Ok(memory.id)
    }

    fn get(&self, id: &str) -> WssResult<Option<ScenarioMemory>> {
        self.conn
            .prepare(&format!("SELECT {SCENARIO_COLS} FROM scenarios WHERE id = ?1"))
            .map_err(|e| WssError::Database(e.to_string()))?
            .query_row(params![id], row_to_scenario)
            .optional()
            .map_err(|e| WssError::Database(e.to_string()))
    }

    fn search(&self, embedding: &[f32], k: usize) -> WssResult<Vec<(ScenarioMemory, f32)>> {
        self.check_dims(embedding)?;
        // Cosine distance to a zero vector is NULL in sqlite-vec.
        if k == 0 || embedding.iter().all(|x| *x == 0.0) {
            return Ok(Vec::new());
        }

        let mut stmt = self
            .conn
            .prepare(
                "SELECT scenario_id, distance FROM vec_scenarios
                 WHERE embedding MATCH ?1 AND k = ?2
                 ORDER BY distance",
            )
            .map_err(|e| WssError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(params![embedding.as_bytes(), k as i64], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Option<f64>>(1)?))
            })
            .map_err(|e| WssError::Database(e.to_string()))?;

        let mut hits = Vec::new();
        for row in rows {
            let (id, distance) = row.map_err(|e| WssError::Database(e.to_string()))?;
            if let Some(d) = distance {
                hits.push((id, d));
            }
        }

        let mut results = Vec::with_capacity(hits.len());
        for (id, distance) in hits {
            if let Some(memory) = self.get(&id)? {
                results.push((memory, distance as f32));
            }
        }
        Ok(results)
    }

    fn count(&self) -> WssResult<usize> {
        self.conn
            .query_row("SELECT COUNT(*) FROM scenarios", [], |row| {
                row.get::<_, usize>(0)
            })
            .map_err(|e| WssError::Database(e.to_string()))
    }

    fn clear(&self) -> WssResult<usize> {
        self.conn
            .execute("DELETE FROM vec_scenarios", [])
            .map_err(|e| WssError::Database(e.to_string()))?;
        self.conn
            .execute("DELETE FROM scenarios", [])
            .map_err(|e| WssError::Database(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
