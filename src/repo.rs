use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")]
    NotFound,
    /// No document matched both the id and the password. Unknown ids land
    /// here too so delete callers cannot probe for existence.
    #[error("incorrect password")]
    IncorrectPassword,
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("store error: {0}")]
    Store(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

#[async_trait]
pub trait ThreadRepo: Send + Sync {
    async fn create_thread(&self, new: NewThread) -> RepoResult<Thread>;
    /// Threads on `board`, most recently bumped first, at most `limit`.
    async fn list_threads(&self, board: &str, limit: usize) -> RepoResult<Vec<Thread>>;
    async fn get_thread(&self, id: Id) -> RepoResult<Thread>;
    async fn delete_thread(&self, id: Id, delete_password: &str) -> RepoResult<()>;
    async fn report_thread(&self, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait ReplyRepo: Send + Sync {
    /// Appends the reply and bumps the thread in one update. Returns the
    /// updated thread together with the stored reply.
    async fn create_reply(&self, new: NewReply) -> RepoResult<(Thread, Reply)>;
    /// Overwrites the reply text with [`DELETED_TEXT`] when the reply's own
    /// password matches. Deleting a reply twice fails like a wrong password.
    async fn delete_reply(&self, thread_id: Id, reply_id: Id, delete_password: &str) -> RepoResult<()>;
    async fn report_reply(&self, thread_id: Id, reply_id: Id) -> RepoResult<()>;
}

pub trait Repo: ThreadRepo + ReplyRepo {}

impl<T> Repo for T where T: ThreadRepo + ReplyRepo {}

fn require(field: &str, value: &str) -> RepoResult<()> {
    if value.is_empty() {
        return Err(RepoError::Validation(format!("{field} is required")));
    }
    Ok(())
}

/// Presence checks shared by both backends, run before anything is written.
pub fn validate_thread(new: &NewThread) -> RepoResult<()> {
    require("board", &new.board)?;
    require("text", &new.text)?;
    require("delete_password", &new.delete_password)
}

pub fn validate_reply(new: &NewReply) -> RepoResult<()> {
    require("text", &new.text)?;
    require("delete_password", &new.delete_password)
}

fn bump(previous: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    previous.max(now)
}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

    const SNAPSHOT_FILE: &str = "state.json";

    fn snapshot_failed(action: &str, path: &Path, e: impl std::fmt::Display) -> RepoError {
        log::error!("failed to {action} snapshot '{}': {e}", path.display());
        RepoError::Store(format!("snapshot {action} failed: {e}"))
    }

    #[derive(Default, Serialize, Deserialize)]
    struct State {
        threads: HashMap<Id, Thread>,
    }

    /// Thread documents behind one lock. Every operation holds the lock for
    /// its whole read-modify-write, which gives per-document atomicity.
    #[derive(Clone, Default)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot_path: Option<Arc<PathBuf>>,
    }

    impl InMemRepo {
        /// Volatile store, nothing touches disk.
        pub fn new() -> Self {
            Self::default()
        }

        /// Store that loads `<dir>/state.json` now and rewrites it after every mutation.
        pub fn with_data_dir(dir: impl AsRef<Path>) -> Self {
            let path = dir.as_ref().join(SNAPSHOT_FILE);
            let state = Self::load_state_from(&path);
            Self {
                state: Arc::new(RwLock::new(state)),
                snapshot_path: Some(Arc::new(path)),
            }
        }

        fn load_state_from(path: &Path) -> State {
            match std::fs::read(path) {
                Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                    Ok(s) => {
                        log::info!("loaded snapshot '{}' ({} threads)", path.display(), s.threads.len());
                        s
                    }
                    Err(e) => {
                        log::warn!("failed to parse snapshot '{}': {e}; starting empty", path.display());
                        State::default()
                    }
                },
                Err(e) => {
                    log::info!("no snapshot at '{}': {e}; starting empty", path.display());
                    State::default()
                }
            }
        }

        // Called with the write guard still held so snapshots land in mutation order.
        // A failed write leaves the change in memory; the next good snapshot carries it.
        fn persist(&self, state: &State) -> RepoResult<()> {
            let Some(path) = self.snapshot_path.as_deref() else { return Ok(()) };
            let bytes = serde_json::to_vec_pretty(state).map_err(|e| snapshot_failed("serialize", path, e))?;
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir).map_err(|e| snapshot_failed("create directory for", path, e))?;
            }
            std::fs::write(path, bytes).map_err(|e| snapshot_failed("write", path, e))
        }

        fn read(&self) -> RepoResult<RwLockReadGuard<'_, State>> {
            self.state.read().map_err(|_| RepoError::Store("state lock poisoned".into()))
        }

        fn write(&self) -> RepoResult<RwLockWriteGuard<'_, State>> {
            self.state.write().map_err(|_| RepoError::Store("state lock poisoned".into()))
        }
    }

    #[async_trait]
    impl ThreadRepo for InMemRepo {
        async fn create_thread(&self, new: NewThread) -> RepoResult<Thread> {
            validate_thread(&new)?;
            let thread = Thread::new(new, Utc::now());
            let mut s = self.write()?;
            s.threads.insert(thread.id, thread.clone());
            self.persist(&s)?;
            Ok(thread)
        }

        async fn list_threads(&self, board: &str, limit: usize) -> RepoResult<Vec<Thread>> {
            let s = self.read()?;
            let mut v: Vec<&Thread> = s.threads.values().filter(|t| t.board == board).collect();
            v.sort_by(|a, b| b.bumped_on.cmp(&a.bumped_on));
            Ok(v.into_iter().take(limit).cloned().collect())
        }

        async fn get_thread(&self, id: Id) -> RepoResult<Thread> {
            let s = self.read()?;
            s.threads.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn delete_thread(&self, id: Id, delete_password: &str) -> RepoResult<()> {
            let mut s = self.write()?;
            match s.threads.get(&id) {
                Some(t) if t.delete_password == delete_password => {}
                _ => return Err(RepoError::IncorrectPassword),
            }
            s.threads.remove(&id);
            self.persist(&s)
        }

        async fn report_thread(&self, id: Id) -> RepoResult<()> {
            let mut s = self.write()?;
            let thread = s.threads.get_mut(&id).ok_or(RepoError::NotFound)?;
            thread.reported = true;
            self.persist(&s)
        }
    }

    #[async_trait]
    impl ReplyRepo for InMemRepo {
        async fn create_reply(&self, new: NewReply) -> RepoResult<(Thread, Reply)> {
            validate_reply(&new)?;
            let mut s = self.write()?;
            let thread = s.threads.get_mut(&new.thread_id).ok_or(RepoError::NotFound)?;
            let now = bump(thread.bumped_on, Utc::now());
            let reply = Reply::new(new.text, new.delete_password, now);
            thread.replies.push(reply.clone());
            thread.bumped_on = now;
            let updated = thread.clone();
            self.persist(&s)?;
            Ok((updated, reply))
        }

        async fn delete_reply(&self, thread_id: Id, reply_id: Id, delete_password: &str) -> RepoResult<()> {
            let mut s = self.write()?;
            let reply = s
                .threads
                .get_mut(&thread_id)
                .and_then(|t| t.replies.iter_mut().find(|r| r.id == reply_id))
                .filter(|r| r.delete_password == delete_password && r.text != DELETED_TEXT)
                .ok_or(RepoError::IncorrectPassword)?;
            reply.text = DELETED_TEXT.to_string();
            self.persist(&s)
        }

        async fn report_reply(&self, thread_id: Id, reply_id: Id) -> RepoResult<()> {
            let mut s = self.write()?;
            let reply = s
                .threads
                .get_mut(&thread_id)
                .and_then(|t| t.replies.iter_mut().find(|r| r.id == reply_id))
                .ok_or(RepoError::NotFound)?;
            reply.reported = true;
            self.persist(&s)
        }
    }
}

// Postgres implementation (feature = "postgres-store")
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use chrono::SubsecRound;
    use sqlx::error::ErrorKind;
    use sqlx::types::Json;
    use sqlx::{Pool, Postgres};

    /// One row per thread; replies live in the `replies` JSONB array so every
    /// thread mutation below is a single-row statement.
    #[derive(Clone)]
    pub struct PgRepo {
        pool: Pool<Postgres>,
    }

    #[derive(sqlx::FromRow)]
    struct ThreadRow {
        id: Id,
        board: String,
        text: String,
        created_on: DateTime<Utc>,
        bumped_on: DateTime<Utc>,
        reported: bool,
        delete_password: String,
        replies: Json<Vec<Reply>>,
    }

    impl From<ThreadRow> for Thread {
        fn from(r: ThreadRow) -> Self {
            Thread {
                id: r.id,
                board: r.board,
                text: r.text,
                created_on: r.created_on,
                bumped_on: r.bumped_on,
                reported: r.reported,
                delete_password: r.delete_password,
                replies: r.replies.0,
            }
        }
    }

    const THREAD_COLUMNS: &str =
        "id, board, text, created_on, bumped_on, reported, delete_password, replies";

    fn store_err(e: sqlx::Error) -> RepoError {
        if let sqlx::Error::Database(db) = &e {
            if matches!(db.kind(), ErrorKind::CheckViolation | ErrorKind::NotNullViolation) {
                return RepoError::Validation(db.message().to_string());
            }
        }
        log::error!("postgres error: {e}");
        RepoError::Store(e.to_string())
    }

    // Postgres keeps microseconds; truncate up front so stored reply JSON and
    // the bumped_on column agree exactly.
    fn now() -> DateTime<Utc> {
        Utc::now().trunc_subsecs(6)
    }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self {
            Self { pool }
        }

        pub async fn migrate(&self) -> RepoResult<()> {
            sqlx::migrate!("./migrations")
                .run(&self.pool)
                .await
                .map_err(|e| RepoError::Store(e.to_string()))
        }
    }

    #[async_trait]
    impl ThreadRepo for PgRepo {
        async fn create_thread(&self, new: NewThread) -> RepoResult<Thread> {
            validate_thread(&new)?;
            let t = Thread::new(new, now());
            let row = sqlx::query_as::<_, ThreadRow>(&format!(
                "INSERT INTO threads ({THREAD_COLUMNS}) VALUES ($1,$2,$3,$4,$5,$6,$7,$8) RETURNING {THREAD_COLUMNS}"
            ))
            .bind(t.id)
            .bind(&t.board)
            .bind(&t.text)
            .bind(t.created_on)
            .bind(t.bumped_on)
            .bind(t.reported)
            .bind(&t.delete_password)
            .bind(Json(&t.replies))
            .fetch_one(&self.pool)
            .await
            .map_err(store_err)?;
            Ok(row.into())
        }

        async fn list_threads(&self, board: &str, limit: usize) -> RepoResult<Vec<Thread>> {
            let rows = sqlx::query_as::<_, ThreadRow>(&format!(
                "SELECT {THREAD_COLUMNS} FROM threads WHERE board = $1 ORDER BY bumped_on DESC LIMIT $2"
            ))
            .bind(board)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;
            Ok(rows.into_iter().map(Thread::from).collect())
        }

        async fn get_thread(&self, id: Id) -> RepoResult<Thread> {
            sqlx::query_as::<_, ThreadRow>(&format!("SELECT {THREAD_COLUMNS} FROM threads WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(store_err)?
                .map(Thread::from)
                .ok_or(RepoError::NotFound)
        }

        async fn delete_thread(&self, id: Id, delete_password: &str) -> RepoResult<()> {
            sqlx::query_scalar::<_, Id>("DELETE FROM threads WHERE id = $1 AND delete_password = $2 RETURNING id")
                .bind(id)
                .bind(delete_password)
                .fetch_optional(&self.pool)
                .await
                .map_err(store_err)?
                .map(|_| ())
                .ok_or(RepoError::IncorrectPassword)
        }

        async fn report_thread(&self, id: Id) -> RepoResult<()> {
            sqlx::query_scalar::<_, Id>("UPDATE threads SET reported = TRUE WHERE id = $1 RETURNING id")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(store_err)?
                .map(|_| ())
                .ok_or(RepoError::NotFound)
        }
    }

    #[async_trait]
    impl ReplyRepo for PgRepo {
        async fn create_reply(&self, new: NewReply) -> RepoResult<(Thread, Reply)> {
            validate_reply(&new)?;
            let reply = Reply::new(new.text, new.delete_password, now());
            let row = sqlx::query_as::<_, ThreadRow>(&format!(
                r#"UPDATE threads
                   SET replies = replies || jsonb_build_array($2::jsonb),
                       bumped_on = GREATEST(bumped_on, $3)
                   WHERE id = $1
                   RETURNING {THREAD_COLUMNS}"#
            ))
            .bind(new.thread_id)
            .bind(Json(&reply))
            .bind(reply.created_on)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?
            .ok_or(RepoError::NotFound)?;
            Ok((row.into(), reply))
        }

        async fn delete_reply(&self, thread_id: Id, reply_id: Id, delete_password: &str) -> RepoResult<()> {
            // The containment filter matches only when the reply with this id
            // also carries this password. An already deleted reply never matches.
            sqlx::query_scalar::<_, Id>(
                r#"UPDATE threads
                   SET replies = (
                       SELECT jsonb_agg(
                           CASE WHEN elem->>'_id' = $2 THEN jsonb_set(elem, '{text}', to_jsonb($4::text))
                                ELSE elem END
                           ORDER BY idx)
                       FROM jsonb_array_elements(replies) WITH ORDINALITY AS r(elem, idx))
                   WHERE id = $1
                     AND replies @> jsonb_build_array(jsonb_build_object('_id', $2::text, 'delete_password', $3::text))
                     AND NOT replies @> jsonb_build_array(jsonb_build_object('_id', $2::text, 'text', $4::text))
                   RETURNING id"#,
            )
            .bind(thread_id)
            .bind(reply_id.to_string())
            .bind(delete_password)
            .bind(DELETED_TEXT)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?
            .map(|_| ())
            .ok_or(RepoError::IncorrectPassword)
        }

        async fn report_reply(&self, thread_id: Id, reply_id: Id) -> RepoResult<()> {
            sqlx::query_scalar::<_, Id>(
                r#"UPDATE threads
                   SET replies = (
                       SELECT jsonb_agg(
                           CASE WHEN elem->>'_id' = $2 THEN jsonb_set(elem, '{reported}', 'true'::jsonb)
                                ELSE elem END
                           ORDER BY idx)
                       FROM jsonb_array_elements(replies) WITH ORDINALITY AS r(elem, idx))
                   WHERE id = $1
                     AND replies @> jsonb_build_array(jsonb_build_object('_id', $2::text))
                   RETURNING id"#,
            )
            .bind(thread_id)
            .bind(reply_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?
            .map(|_| ())
            .ok_or(RepoError::NotFound)
        }
    }
}
