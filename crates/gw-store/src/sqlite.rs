//! SQLite backend (feature `sqlite`).
//!
//! One `genworld.db` file in the configured directory, WAL journal, one
//! table per entity.  Entity bodies are stored as JSON text next to the
//! columns needed for lookups and ordering; timestamps used in ORDER BY /
//! WHERE clauses are duplicated as integer microseconds so comparisons never
//! depend on string formatting.
//!
//! The connection sits behind a `parking_lot::Mutex`; statements are cached.
//! Every critical section is short and await-free.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use gw_core::{
    Agent, AgentId, Event, Memory, MemoryId, Snapshot, SnapshotId, World, WorldId, WorldStatus,
};

use crate::store::{next_version, validate_memory, Store};
use crate::{StoreError, StoreResult};

/// SQLite-backed [`Store`].
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) `genworld.db` in `dir` and initialise the schema.
    pub fn open(dir: &Path) -> StoreResult<Self> {
        Self::from_conn(Connection::open(dir.join("genworld.db")).map_err(sql_err)?)
    }

    /// An in-memory database — used by tests.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_conn(Connection::open_in_memory().map_err(sql_err)?)
    }

    fn from_conn(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous  = NORMAL;
             CREATE TABLE IF NOT EXISTS worlds (
                 id      TEXT PRIMARY KEY,
                 status  TEXT    NOT NULL,
                 name    TEXT    NOT NULL,
                 version INTEGER NOT NULL,
                 body    TEXT    NOT NULL
             );
             CREATE TABLE IF NOT EXISTS agents (
                 id       TEXT PRIMARY KEY,
                 world_id TEXT    NOT NULL,
                 name     TEXT    NOT NULL,
                 version  INTEGER NOT NULL,
                 body     TEXT    NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_agents_world ON agents (world_id);
             CREATE TABLE IF NOT EXISTS memories (
                 id        TEXT PRIMARY KEY,
                 agent_id  TEXT    NOT NULL,
                 ts_micros INTEGER NOT NULL,
                 version   INTEGER NOT NULL,
                 body      TEXT    NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_memories_agent
                 ON memories (agent_id, ts_micros DESC);
             CREATE TABLE IF NOT EXISTS events (
                 id         TEXT PRIMARY KEY,
                 world_id   TEXT    NOT NULL,
                 sim_micros INTEGER NOT NULL,
                 seq        INTEGER NOT NULL,
                 body       TEXT    NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_events_world
                 ON events (world_id, sim_micros, seq);
             CREATE TABLE IF NOT EXISTS snapshots (
                 id           TEXT PRIMARY KEY,
                 world_id     TEXT    NOT NULL,
                 taken_micros INTEGER NOT NULL,
                 body         TEXT    NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_snapshots_world ON snapshots (world_id);
             CREATE TABLE IF NOT EXISTS blobs (
                 key   TEXT PRIMARY KEY,
                 bytes BLOB NOT NULL
             );",
        )
        .map_err(sql_err)?;
        Ok(Self { conn: Mutex::new(conn) })
    }
}

// ── Error and row mapping ────────────────────────────────────────────────────

/// Classify a rusqlite error: lock contention is transient, everything else
/// is treated as corruption.
fn sql_err(e: rusqlite::Error) -> StoreError {
    use rusqlite::ErrorCode;
    match &e {
        rusqlite::Error::SqliteFailure(f, _)
            if matches!(f.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
        {
            StoreError::Transient(e.to_string())
        }
        _ => StoreError::Fatal(e.to_string()),
    }
}

fn decode<T: serde::de::DeserializeOwned>(body: String) -> StoreResult<T> {
    serde_json::from_str(&body).map_err(|e| StoreError::Fatal(format!("corrupt row: {e}")))
}

fn encode<T: serde::Serialize>(value: &T) -> StoreResult<String> {
    serde_json::to_string(value).map_err(|e| StoreError::Fatal(format!("encode: {e}")))
}

fn status_str(status: WorldStatus) -> &'static str {
    match status {
        WorldStatus::Running => "running",
        WorldStatus::Paused => "paused",
        WorldStatus::Stopped => "stopped",
    }
}

// ── Store impl ───────────────────────────────────────────────────────────────

#[async_trait]
impl Store for SqliteStore {
    // ── Worlds ────────────────────────────────────────────────────────────

    async fn put_world(&self, world: &World) -> StoreResult<World> {
        let conn = self.conn.lock();
        let stored: Option<u64> = conn
            .prepare_cached("SELECT version FROM worlds WHERE id = ?1")
            .map_err(sql_err)?
            .query_row(params![world.id.to_string()], |r| r.get(0))
            .optional()
            .map_err(sql_err)?;
        let version = next_version("world", world.id.to_string(), stored, world.version)?;
        let mut copy = world.clone();
        copy.version = version;
        copy.updated_at = Utc::now();
        conn.prepare_cached(
            "INSERT OR REPLACE INTO worlds (id, status, name, version, body) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .map_err(sql_err)?
        .execute(params![
            copy.id.to_string(),
            status_str(copy.status),
            copy.name,
            copy.version,
            encode(&copy)?,
        ])
        .map_err(sql_err)?;
        Ok(copy)
    }

    async fn get_world(&self, id: WorldId) -> StoreResult<World> {
        let conn = self.conn.lock();
        let body: Option<String> = conn
            .prepare_cached("SELECT body FROM worlds WHERE id = ?1")
            .map_err(sql_err)?
            .query_row(params![id.to_string()], |r| r.get(0))
            .optional()
            .map_err(sql_err)?;
        body.map_or(Err(StoreError::WorldNotFound(id)), decode)
    }

    async fn list_worlds(&self, status: Option<WorldStatus>) -> StoreResult<Vec<World>> {
        let conn = self.conn.lock();
        let mut out = Vec::new();
        match status {
            None => {
                let mut stmt = conn
                    .prepare_cached("SELECT body FROM worlds ORDER BY name, id")
                    .map_err(sql_err)?;
                let rows = stmt.query_map([], |r| r.get::<_, String>(0)).map_err(sql_err)?;
                for body in rows {
                    out.push(decode(body.map_err(sql_err)?)?);
                }
            }
            Some(s) => {
                let mut stmt = conn
                    .prepare_cached("SELECT body FROM worlds WHERE status = ?1 ORDER BY name, id")
                    .map_err(sql_err)?;
                let rows = stmt
                    .query_map(params![status_str(s)], |r| r.get::<_, String>(0))
                    .map_err(sql_err)?;
                for body in rows {
                    out.push(decode(body.map_err(sql_err)?)?);
                }
            }
        }
        Ok(out)
    }

    async fn delete_world(&self, id: WorldId) -> StoreResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(sql_err)?;
        let removed = tx
            .execute("DELETE FROM worlds WHERE id = ?1", params![id.to_string()])
            .map_err(sql_err)?;
        if removed == 0 {
            return Err(StoreError::WorldNotFound(id));
        }
        tx.execute(
            "DELETE FROM memories WHERE agent_id IN \
             (SELECT id FROM agents WHERE world_id = ?1)",
            params![id.to_string()],
        )
        .map_err(sql_err)?;
        tx.execute("DELETE FROM agents WHERE world_id = ?1", params![id.to_string()])
            .map_err(sql_err)?;
        tx.execute("DELETE FROM events WHERE world_id = ?1", params![id.to_string()])
            .map_err(sql_err)?;
        // Snapshots survive the cascade: the final pre-delete snapshot is
        // the archival record of the world.
        tx.commit().map_err(sql_err)
    }

    // ── Agents ────────────────────────────────────────────────────────────

    async fn put_agent(&self, agent: &Agent) -> StoreResult<Agent> {
        let conn = self.conn.lock();
        let stored: Option<(u64, String)> = conn
            .prepare_cached("SELECT version, world_id FROM agents WHERE id = ?1")
            .map_err(sql_err)?
            .query_row(params![agent.id.to_string()], |r| Ok((r.get(0)?, r.get(1)?)))
            .optional()
            .map_err(sql_err)?;
        if let Some((_, ref world)) = stored {
            if *world != agent.world_id.to_string() {
                return Err(StoreError::Validation(format!(
                    "agent {} cannot move from world {} to {}",
                    agent.id, world, agent.world_id
                )));
            }
        }
        let version = next_version(
            "agent",
            agent.id.to_string(),
            stored.map(|(v, _)| v),
            agent.version,
        )?;
        let mut copy = agent.clone();
        copy.version = version;
        copy.updated_at = Utc::now();
        conn.prepare_cached(
            "INSERT OR REPLACE INTO agents (id, world_id, name, version, body) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .map_err(sql_err)?
        .execute(params![
            copy.id.to_string(),
            copy.world_id.to_string(),
            copy.name,
            copy.version,
            encode(&copy)?,
        ])
        .map_err(sql_err)?;
        Ok(copy)
    }

    async fn get_agent(&self, id: AgentId) -> StoreResult<Agent> {
        let conn = self.conn.lock();
        let body: Option<String> = conn
            .prepare_cached("SELECT body FROM agents WHERE id = ?1")
            .map_err(sql_err)?
            .query_row(params![id.to_string()], |r| r.get(0))
            .optional()
            .map_err(sql_err)?;
        body.map_or(Err(StoreError::AgentNotFound(id)), decode)
    }

    async fn list_agents_by_world(&self, world: WorldId) -> StoreResult<Vec<Agent>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("SELECT body FROM agents WHERE world_id = ?1 ORDER BY name, id")
            .map_err(sql_err)?;
        let rows = stmt
            .query_map(params![world.to_string()], |r| r.get::<_, String>(0))
            .map_err(sql_err)?;
        let mut out = Vec::new();
        for body in rows {
            out.push(decode(body.map_err(sql_err)?)?);
        }
        Ok(out)
    }

    async fn delete_agent(&self, id: AgentId) -> StoreResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(sql_err)?;
        let removed = tx
            .execute("DELETE FROM agents WHERE id = ?1", params![id.to_string()])
            .map_err(sql_err)?;
        if removed == 0 {
            return Err(StoreError::AgentNotFound(id));
        }
        tx.execute("DELETE FROM memories WHERE agent_id = ?1", params![id.to_string()])
            .map_err(sql_err)?;
        tx.commit().map_err(sql_err)
    }

    // ── Memories ──────────────────────────────────────────────────────────

    async fn put_memory(&self, memory: &Memory) -> StoreResult<Memory> {
        validate_memory(memory)?;
        let conn = self.conn.lock();
        let stored: Option<(u64, String)> = conn
            .prepare_cached("SELECT version, body FROM memories WHERE id = ?1")
            .map_err(sql_err)?
            .query_row(params![memory.id.to_string()], |r| Ok((r.get(0)?, r.get(1)?)))
            .optional()
            .map_err(sql_err)?;
        if let Some((_, ref body)) = stored {
            let prior: Memory = decode(body.clone())?;
            if prior.importance != memory.importance {
                return Err(StoreError::Validation(format!(
                    "memory {} importance is immutable ({} -> {})",
                    memory.id, prior.importance, memory.importance
                )));
            }
        }
        let version = next_version(
            "memory",
            memory.id.to_string(),
            stored.map(|(v, _)| v),
            memory.version,
        )?;
        let mut copy = memory.clone();
        copy.version = version;
        conn.prepare_cached(
            "INSERT OR REPLACE INTO memories (id, agent_id, ts_micros, version, body) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .map_err(sql_err)?
        .execute(params![
            copy.id.to_string(),
            copy.agent_id.to_string(),
            copy.timestamp.timestamp_micros(),
            copy.version,
            encode(&copy)?,
        ])
        .map_err(sql_err)?;
        Ok(copy)
    }

    async fn get_memory(&self, id: MemoryId) -> StoreResult<Memory> {
        let conn = self.conn.lock();
        let body: Option<String> = conn
            .prepare_cached("SELECT body FROM memories WHERE id = ?1")
            .map_err(sql_err)?
            .query_row(params![id.to_string()], |r| r.get(0))
            .optional()
            .map_err(sql_err)?;
        body.map_or(Err(StoreError::MemoryNotFound(id)), decode)
    }

    async fn list_memories_by_agent(
        &self,
        agent: AgentId,
        limit: Option<usize>,
    ) -> StoreResult<Vec<Memory>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT body FROM memories WHERE agent_id = ?1 \
                 ORDER BY ts_micros DESC, id LIMIT ?2",
            )
            .map_err(sql_err)?;
        let cap = limit.map_or(-1i64, |l| l as i64);
        let rows = stmt
            .query_map(params![agent.to_string(), cap], |r| r.get::<_, String>(0))
            .map_err(sql_err)?;
        let mut out = Vec::new();
        for body in rows {
            out.push(decode(body.map_err(sql_err)?)?);
        }
        Ok(out)
    }

    async fn touch_memory(&self, id: MemoryId, at: DateTime<Utc>) -> StoreResult<()> {
        let conn = self.conn.lock();
        let body: Option<String> = conn
            .prepare_cached("SELECT body FROM memories WHERE id = ?1")
            .map_err(sql_err)?
            .query_row(params![id.to_string()], |r| r.get(0))
            .optional()
            .map_err(sql_err)?;
        let mut memory: Memory = body.map_or(Err(StoreError::MemoryNotFound(id)), decode)?;
        if at < memory.timestamp {
            return Err(StoreError::Validation(
                "touch would move last_accessed before timestamp".into(),
            ));
        }
        memory.last_accessed = at;
        memory.version += 1;
        conn.prepare_cached("UPDATE memories SET version = ?2, body = ?3 WHERE id = ?1")
            .map_err(sql_err)?
            .execute(params![id.to_string(), memory.version, encode(&memory)?])
            .map_err(sql_err)?;
        Ok(())
    }

    // ── Events ────────────────────────────────────────────────────────────

    async fn put_event(&self, event: &Event) -> StoreResult<()> {
        let conn = self.conn.lock();
        let exists: Option<i64> = conn
            .prepare_cached("SELECT 1 FROM events WHERE id = ?1")
            .map_err(sql_err)?
            .query_row(params![event.id.to_string()], |r| r.get(0))
            .optional()
            .map_err(sql_err)?;
        if exists.is_some() {
            return Ok(());
        }
        // Sequence numbers strictly increase per world.  The simulated
        // timestamp is allowed to rewind (snapshot restore); within one run
        // the event processor keeps the (sim_time, seq) pair increasing.
        let last: Option<u64> = conn
            .prepare_cached("SELECT MAX(seq) FROM events WHERE world_id = ?1")
            .map_err(sql_err)?
            .query_row(params![event.world_id.to_string()], |r| r.get(0))
            .optional()
            .map_err(sql_err)?
            .flatten();
        if let Some(seq) = last {
            if event.seq <= seq {
                return Err(StoreError::Validation(format!(
                    "event seq {} not above {seq}",
                    event.seq
                )));
            }
        }
        conn.prepare_cached(
            "INSERT INTO events (id, world_id, sim_micros, seq, body) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .map_err(sql_err)?
        .execute(params![
            event.id.to_string(),
            event.world_id.to_string(),
            event.sim_time.timestamp_micros(),
            event.seq,
            encode(event)?,
        ])
        .map_err(sql_err)?;
        Ok(())
    }

    async fn list_events_by_world(
        &self,
        world: WorldId,
        since: Option<DateTime<Utc>>,
        limit: Option<usize>,
    ) -> StoreResult<Vec<Event>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT body FROM events WHERE world_id = ?1 AND sim_micros > ?2 \
                 ORDER BY sim_micros, seq LIMIT ?3",
            )
            .map_err(sql_err)?;
        let floor = since.map_or(i64::MIN, |s| s.timestamp_micros());
        let cap = limit.map_or(-1i64, |l| l as i64);
        let rows = stmt
            .query_map(params![world.to_string(), floor, cap], |r| r.get::<_, String>(0))
            .map_err(sql_err)?;
        let mut out = Vec::new();
        for body in rows {
            out.push(decode(body.map_err(sql_err)?)?);
        }
        Ok(out)
    }

    async fn max_event_seq(&self, world: WorldId) -> StoreResult<u64> {
        let conn = self.conn.lock();
        let max: Option<u64> = conn
            .prepare_cached("SELECT MAX(seq) FROM events WHERE world_id = ?1")
            .map_err(sql_err)?
            .query_row(params![world.to_string()], |r| r.get(0))
            .optional()
            .map_err(sql_err)?
            .flatten();
        Ok(max.unwrap_or(0))
    }

    // ── Snapshots ─────────────────────────────────────────────────────────

    async fn put_snapshot(&self, snapshot: &Snapshot) -> StoreResult<()> {
        let conn = self.conn.lock();
        // Immutable: INSERT OR IGNORE makes replays no-ops.
        conn.prepare_cached(
            "INSERT OR IGNORE INTO snapshots (id, world_id, taken_micros, body) \
             VALUES (?1, ?2, ?3, ?4)",
        )
        .map_err(sql_err)?
        .execute(params![
            snapshot.id.to_string(),
            snapshot.world_id.to_string(),
            snapshot.taken_at.timestamp_micros(),
            encode(snapshot)?,
        ])
        .map_err(sql_err)?;
        Ok(())
    }

    async fn get_snapshot(&self, id: SnapshotId) -> StoreResult<Snapshot> {
        let conn = self.conn.lock();
        let body: Option<String> = conn
            .prepare_cached("SELECT body FROM snapshots WHERE id = ?1")
            .map_err(sql_err)?
            .query_row(params![id.to_string()], |r| r.get(0))
            .optional()
            .map_err(sql_err)?;
        body.map_or(Err(StoreError::SnapshotNotFound(id)), decode)
    }

    async fn list_snapshots_by_world(&self, world: WorldId) -> StoreResult<Vec<Snapshot>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT body FROM snapshots WHERE world_id = ?1 \
                 ORDER BY taken_micros DESC, id",
            )
            .map_err(sql_err)?;
        let rows = stmt
            .query_map(params![world.to_string()], |r| r.get::<_, String>(0))
            .map_err(sql_err)?;
        let mut out = Vec::new();
        for body in rows {
            out.push(decode(body.map_err(sql_err)?)?);
        }
        Ok(out)
    }

    async fn delete_snapshot(&self, id: SnapshotId) -> StoreResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(sql_err)?;
        tx.execute(
            "DELETE FROM blobs WHERE key IN \
             (SELECT json_extract(body, '$.location') FROM snapshots WHERE id = ?1)",
            params![id.to_string()],
        )
        .map_err(sql_err)?;
        let removed = tx
            .execute("DELETE FROM snapshots WHERE id = ?1", params![id.to_string()])
            .map_err(sql_err)?;
        tx.commit().map_err(sql_err)?;
        if removed == 0 {
            return Err(StoreError::SnapshotNotFound(id));
        }
        Ok(())
    }

    // ── Blobs ─────────────────────────────────────────────────────────────

    async fn put_blob(&self, key: &str, bytes: Vec<u8>) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.prepare_cached("INSERT OR REPLACE INTO blobs (key, bytes) VALUES (?1, ?2)")
            .map_err(sql_err)?
            .execute(params![key, bytes])
            .map_err(sql_err)?;
        Ok(())
    }

    async fn get_blob(&self, key: &str) -> StoreResult<Vec<u8>> {
        let conn = self.conn.lock();
        let bytes: Option<Vec<u8>> = conn
            .prepare_cached("SELECT bytes FROM blobs WHERE key = ?1")
            .map_err(sql_err)?
            .query_row(params![key], |r| r.get(0))
            .optional()
            .map_err(sql_err)?;
        bytes.ok_or_else(|| StoreError::BlobNotFound(key.to_owned()))
    }
}
