//! SQLite-backed poll store.
//!
//! Layout: `polls`, `choices` (ordered by `ordinal`) and `votes`, with foreign
//! keys enforced. A vote references its choice through `(choice_id, poll_id)`,
//! so the database itself rejects a vote whose choice belongs to another poll.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quickpoll_protocol::PollId;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::Row;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace};

use super::PollStore;
use crate::clock::{Clock, SystemClock};
use crate::error::PollError;
use crate::model::{default_poll_lifetime, validate_new_poll, Choice, Poll, Vote};

/// How long a writer waits for another connection's write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

const SCHEMA: [&str; 4] = [
    r#"
    CREATE TABLE IF NOT EXISTS polls (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        question TEXT NOT NULL,
        created_at TEXT NOT NULL,
        expires_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS choices (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        poll_id INTEGER NOT NULL REFERENCES polls(id),
        label TEXT NOT NULL,
        ordinal INTEGER NOT NULL,
        UNIQUE (poll_id, ordinal),
        UNIQUE (id, poll_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS votes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        poll_id INTEGER NOT NULL REFERENCES polls(id),
        choice_id INTEGER NOT NULL,
        voter TEXT NOT NULL,
        created_at TEXT NOT NULL,
        FOREIGN KEY (choice_id, poll_id) REFERENCES choices(id, poll_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_votes_poll_id ON votes(poll_id)",
];

/// Table-backed [`PollStore`].
pub struct SqliteStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    lifetime: chrono::Duration,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `url` and apply the schema.
    ///
    /// Writers from different pool connections queue on SQLite's write lock
    /// for up to [`BUSY_TIMEOUT`].
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the URL is invalid or the database cannot be opened.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, PollError> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        info!(url = %url, "Connected to SQLite poll store");
        Self::from_pool(pool).await
    }

    /// Private in-memory database, mostly for tests.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the database cannot be created.
    pub async fn in_memory() -> Result<Self, PollError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        // Every connection to `:memory:` is a separate database, so keep
        // exactly one open for the lifetime of the pool.
        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    /// Wrap an existing pool and apply the schema.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the schema cannot be created.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, PollError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }

        Ok(Self {
            pool,
            clock: Arc::new(SystemClock),
            lifetime: default_poll_lifetime(),
        })
    }

    /// Read time from `clock` instead of the wall clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Override how long new polls accept votes.
    #[must_use]
    pub fn with_lifetime(mut self, lifetime: chrono::Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// Load polls matching `filter` (`None` for all) with their choices and
    /// votes, newest first.
    async fn load(&self, filter: Option<PollId>) -> Result<Vec<Poll>, PollError> {
        let id = filter.map(to_db_id);

        let poll_rows = sqlx::query(
            "SELECT id, question, created_at, expires_at FROM polls \
             WHERE (?1 IS NULL OR id = ?1) ORDER BY id DESC",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let choice_rows = sqlx::query(
            "SELECT id, poll_id, label FROM choices \
             WHERE (?1 IS NULL OR poll_id = ?1) ORDER BY poll_id, ordinal",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let vote_rows = sqlx::query(
            "SELECT id, poll_id, choice_id, voter, created_at FROM votes \
             WHERE (?1 IS NULL OR poll_id = ?1) ORDER BY id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        assemble(&poll_rows, &choice_rows, &vote_rows)
    }
}

#[async_trait]
impl PollStore for SqliteStore {
    async fn create_poll(
        &self,
        question: &str,
        choice_labels: &[String],
    ) -> Result<Poll, PollError> {
        validate_new_poll(choice_labels)?;

        let created_at = self.clock.now();
        let expires_at = created_at + self.lifetime;

        // The first statement writes, so the write lock is taken before any read.
        let mut tx = self.pool.begin().await?;

        let poll_id = sqlx::query(
            "INSERT INTO polls (question, created_at, expires_at) VALUES (?1, ?2, ?3)",
        )
        .bind(question)
        .bind(created_at)
        .bind(expires_at)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        let mut choices = Vec::with_capacity(choice_labels.len());
        for (ordinal, label) in choice_labels.iter().enumerate() {
            let choice_id = sqlx::query(
                "INSERT INTO choices (poll_id, label, ordinal) VALUES (?1, ?2, ?3)",
            )
            .bind(poll_id)
            .bind(label.as_str())
            .bind(ordinal as i64)
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();

            choices.push(Choice {
                id: from_db_id(choice_id),
                poll_id: from_db_id(poll_id),
                label: label.clone(),
                votes: Vec::new(),
            });
        }

        tx.commit().await?;
        debug!(poll = poll_id, choices = choices.len(), "Stored poll");

        Ok(Poll {
            id: from_db_id(poll_id),
            question: question.to_string(),
            created_at,
            expires_at,
            choices,
        })
    }

    async fn get_poll(&self, id: PollId) -> Result<Poll, PollError> {
        self.load(Some(id))
            .await?
            .pop()
            .ok_or(PollError::NotFound(id))
    }

    async fn list_polls(&self) -> Result<Vec<Poll>, PollError> {
        self.load(None).await
    }

    async fn append_vote(
        &self,
        poll_id: PollId,
        choice_index: usize,
        voter: &str,
    ) -> Result<Vote, PollError> {
        let index = i64::try_from(choice_index).unwrap_or(i64::MAX);
        let created_at = self.clock.now();

        // A single statement that writes first, so it takes the write lock
        // (and waits for it) up front instead of upgrading a read lock.
        let inserted = sqlx::query(
            "INSERT INTO votes (poll_id, choice_id, voter, created_at) \
             SELECT poll_id, id, ?3, ?4 FROM choices WHERE poll_id = ?1 AND ordinal = ?2 \
             RETURNING id, choice_id",
        )
        .bind(to_db_id(poll_id))
        .bind(index)
        .bind(voter)
        .bind(created_at)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = inserted else {
            let choices: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM choices WHERE poll_id = ?1")
                .bind(to_db_id(poll_id))
                .fetch_one(&self.pool)
                .await?;

            // Every poll has at least one choice.
            return Err(if choices == 0 {
                PollError::NotFound(poll_id)
            } else {
                PollError::InvalidChoice {
                    index,
                    choices: choices as usize,
                }
            });
        };

        let vote_id: i64 = row.try_get("id")?;
        let choice_id: i64 = row.try_get("choice_id")?;
        trace!(poll = poll_id, choice = choice_index, vote = vote_id, "Appended vote");

        Ok(Vote {
            id: from_db_id(vote_id),
            poll_id,
            choice_id: from_db_id(choice_id),
            voter: voter.to_string(),
            created_at,
        })
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}

fn to_db_id(id: u64) -> i64 {
    i64::try_from(id).unwrap_or(i64::MAX)
}

fn from_db_id(id: i64) -> u64 {
    u64::try_from(id).unwrap_or_default()
}

/// Stitch flat rows back into polls. Rows must be ordered: polls by id
/// descending, choices by ordinal, votes by id.
fn assemble(
    poll_rows: &[SqliteRow],
    choice_rows: &[SqliteRow],
    vote_rows: &[SqliteRow],
) -> Result<Vec<Poll>, PollError> {
    let mut polls = Vec::with_capacity(poll_rows.len());
    let mut poll_index: HashMap<i64, usize> = HashMap::with_capacity(poll_rows.len());

    for row in poll_rows {
        let id: i64 = row.try_get("id")?;
        let created_at: DateTime<Utc> = row.try_get("created_at")?;
        let expires_at: DateTime<Utc> = row.try_get("expires_at")?;

        poll_index.insert(id, polls.len());
        polls.push(Poll {
            id: from_db_id(id),
            question: row.try_get("question")?,
            created_at,
            expires_at,
            choices: Vec::new(),
        });
    }

    let mut choice_index: HashMap<i64, (usize, usize)> = HashMap::new();
    for row in choice_rows {
        let id: i64 = row.try_get("id")?;
        let poll_id: i64 = row.try_get("poll_id")?;
        let Some(&p) = poll_index.get(&poll_id) else {
            continue;
        };

        let choices = &mut polls[p].choices;
        choice_index.insert(id, (p, choices.len()));
        choices.push(Choice {
            id: from_db_id(id),
            poll_id: from_db_id(poll_id),
            label: row.try_get("label")?,
            votes: Vec::new(),
        });
    }

    for row in vote_rows {
        let choice_id: i64 = row.try_get("choice_id")?;
        let Some(&(p, c)) = choice_index.get(&choice_id) else {
            continue;
        };

        let poll_id: i64 = row.try_get("poll_id")?;
        let vote_id: i64 = row.try_get("id")?;
        polls[p].choices[c].votes.push(Vote {
            id: from_db_id(vote_id),
            poll_id: from_db_id(poll_id),
            choice_id: from_db_id(choice_id),
            voter: row.try_get("voter")?,
            created_at: row.try_get("created_at")?,
        });
    }

    Ok(polls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn labels(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_roundtrip_poll_and_votes() {
        let store = SqliteStore::in_memory().await.unwrap();
        let poll = store
            .create_poll("Color?", &labels(&["Red", "Blue", "Green"]))
            .await
            .unwrap();
        assert_eq!(poll.id, 1);

        store.append_vote(poll.id, 2, "alice").await.unwrap();
        store.append_vote(poll.id, 0, "bob").await.unwrap();
        store.append_vote(poll.id, 2, "alice").await.unwrap();

        let stored = store.get_poll(poll.id).await.unwrap();
        let order: Vec<_> = stored.choices.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(order, vec!["Red", "Blue", "Green"]);

        let green: Vec<_> = stored.choices[2].votes.iter().map(|v| v.voter.as_str()).collect();
        assert_eq!(green, vec!["alice", "alice"]);
        assert_eq!(stored.choices[0].votes.len(), 1);
        assert!(stored.choices[1].votes.is_empty());
        assert_eq!(stored.total_votes(), 3);
    }

    #[tokio::test]
    async fn test_timestamps_survive_storage() {
        let clock = Arc::new(ManualClock::starting_now());
        let store = SqliteStore::in_memory()
            .await
            .unwrap()
            .with_clock(clock.clone());

        let created = store.create_poll("Q", &labels(&["x"])).await.unwrap();
        let stored = store.get_poll(created.id).await.unwrap();

        assert_eq!(stored.created_at, clock.now());
        assert_eq!(stored.expires_at, clock.now() + chrono::Duration::days(1));
        assert_eq!(stored, created);
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let store = SqliteStore::in_memory().await.unwrap();
        for question in ["one", "two", "three"] {
            store.create_poll(question, &labels(&["x"])).await.unwrap();
        }

        let questions: Vec<_> = store
            .list_polls()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.question)
            .collect();
        assert_eq!(questions, vec!["three", "two", "one"]);
    }

    #[tokio::test]
    async fn test_errors_leave_tables_unchanged() {
        let store = SqliteStore::in_memory().await.unwrap();
        assert!(matches!(
            store.create_poll("Q", &[]).await,
            Err(PollError::Validation(_))
        ));
        assert!(store.list_polls().await.unwrap().is_empty());

        let poll = store.create_poll("Q", &labels(&["a", "b"])).await.unwrap();
        assert!(matches!(
            store.append_vote(poll.id, 5, "x").await,
            Err(PollError::InvalidChoice { index: 5, choices: 2 })
        ));
        assert!(matches!(
            store.append_vote(77, 0, "x").await,
            Err(PollError::NotFound(77))
        ));
        assert!(matches!(
            store.get_poll(77).await,
            Err(PollError::NotFound(77))
        ));
        assert_eq!(store.get_poll(poll.id).await.unwrap().total_votes(), 0);
    }

    /// Fresh database file under the temp dir, removed on drop.
    struct TempDb(std::path::PathBuf);

    impl TempDb {
        fn new(name: &str) -> Self {
            let nanos = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos();
            let file = format!("quickpoll-{}-{}-{}.db", name, std::process::id(), nanos);
            Self(std::env::temp_dir().join(file))
        }

        fn url(&self) -> String {
            format!("sqlite://{}", self.0.display())
        }
    }

    impl Drop for TempDb {
        fn drop(&mut self) {
            for suffix in ["", "-wal", "-shm"] {
                let mut path = self.0.clone().into_os_string();
                path.push(suffix);
                let _ = std::fs::remove_file(path);
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_votes_on_file_database() {
        let db = TempDb::new("votes");
        let store = Arc::new(SqliteStore::connect(&db.url(), 5).await.unwrap());
        let poll = store
            .create_poll("Q", &labels(&["a", "b", "c", "d"]))
            .await
            .unwrap();

        let poll_id = poll.id;
        let mut handles = Vec::new();
        for i in 0..200usize {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.append_vote(poll_id, i % 4, "v").await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let stored = store.get_poll(poll.id).await.unwrap();
        assert_eq!(stored.total_votes(), 200);
        for choice in &stored.choices {
            assert_eq!(choice.votes.len(), 50);
        }

        assert!(matches!(
            store.append_vote(poll.id, 4, "v").await,
            Err(PollError::InvalidChoice { index: 4, choices: 4 })
        ));
        assert!(matches!(
            store.append_vote(poll.id + 1, 0, "v").await,
            Err(PollError::NotFound(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_polls_on_file_database() {
        let db = TempDb::new("polls");
        let store = Arc::new(SqliteStore::connect(&db.url(), 5).await.unwrap());

        let mut handles = Vec::new();
        for i in 0..50 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .create_poll(&format!("Q{}", i), &labels(&["x", "y"]))
                    .await
            }));
        }
        for handle in handles {
            let poll = handle.await.unwrap().unwrap();
            store.append_vote(poll.id, 1, "v").await.unwrap();
        }

        let polls = store.list_polls().await.unwrap();
        assert_eq!(polls.len(), 50);
        assert!(polls.iter().all(|p| p.choices[1].votes.len() == 1));
    }

    #[tokio::test]
    async fn test_votes_cannot_cross_polls() {
        let store = SqliteStore::in_memory().await.unwrap();
        let first = store.create_poll("A", &labels(&["a"])).await.unwrap();
        let second = store.create_poll("B", &labels(&["b"])).await.unwrap();

        let result = sqlx::query(
            "INSERT INTO votes (poll_id, choice_id, voter, created_at) VALUES (?1, ?2, 'x', ?3)",
        )
        .bind(first.id as i64)
        .bind(second.choices[0].id as i64)
        .bind(Utc::now())
        .execute(&store.pool)
        .await;

        assert!(result.is_err());
    }
}
