//! # SQLite store
//!
//! Maps the relational schema onto the `domains` models. Ids are stored as
//! 16-byte BLOBs, timestamps as RFC 3339 TEXT, roles as their canonical
//! uppercase name and vote values as INTEGER.
//!
//! Foreign keys are enabled on every connection so deleting a debate cascades
//! through stances, participants, justifications, comments and votes.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domains::{
    resolve_vote, Comment, Debate, DebateFilter, DebateRepo, DiscussionRepo, Justification, NewUser,
    Participant, ParticipantFilter, Role, Stance, StorageError, StorageResult, Topic, User, UserRepo,
    Vote, VoteAction, VoteOutcome, VoteValue,
};
use sqlx::query::Query;
use sqlx::sqlite::{
    Sqlite, SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::Row;
use tracing::{debug, info, instrument};
use uuid::Uuid;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id BLOB PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        profile_picture TEXT,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS topics (
        id BLOB PRIMARY KEY,
        title TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS debates (
        id BLOB PRIMARY KEY,
        topic_id BLOB NOT NULL REFERENCES topics(id),
        creator_id BLOB NOT NULL,
        is_private INTEGER NOT NULL DEFAULT 0,
        is_closed INTEGER NOT NULL DEFAULT 0,
        started_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS stances (
        id BLOB PRIMARY KEY,
        debate_id BLOB NOT NULL REFERENCES debates(id) ON DELETE CASCADE,
        label TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS participants (
        id BLOB PRIMARY KEY,
        user_id BLOB NOT NULL,
        debate_id BLOB NOT NULL REFERENCES debates(id) ON DELETE CASCADE,
        role TEXT NOT NULL,
        stance_id BLOB REFERENCES stances(id) ON DELETE SET NULL,
        joined_at TEXT NOT NULL,
        UNIQUE (user_id, debate_id)
    )",
    "CREATE TABLE IF NOT EXISTS justifications (
        id BLOB PRIMARY KEY,
        content TEXT NOT NULL,
        author_id BLOB NOT NULL,
        stance_id BLOB NOT NULL REFERENCES stances(id) ON DELETE CASCADE,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS comments (
        id BLOB PRIMARY KEY,
        content TEXT NOT NULL,
        author_id BLOB NOT NULL,
        justification_id BLOB NOT NULL REFERENCES justifications(id) ON DELETE CASCADE,
        parent_id BLOB REFERENCES comments(id) ON DELETE CASCADE,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS votes (
        id BLOB PRIMARY KEY,
        user_id BLOB NOT NULL,
        justification_id BLOB NOT NULL REFERENCES justifications(id) ON DELETE CASCADE,
        value INTEGER NOT NULL CHECK (value IN (-1, 1)),
        created_at TEXT NOT NULL,
        UNIQUE (user_id, justification_id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_debates_topic ON debates(topic_id)",
    "CREATE INDEX IF NOT EXISTS idx_stances_debate ON stances(debate_id)",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_stances_label ON stances(debate_id, label COLLATE NOCASE)",
    "CREATE INDEX IF NOT EXISTS idx_participants_debate ON participants(debate_id)",
    "CREATE INDEX IF NOT EXISTS idx_justifications_stance ON justifications(stance_id)",
    "CREATE INDEX IF NOT EXISTS idx_justifications_author ON justifications(author_id)",
    "CREATE INDEX IF NOT EXISTS idx_comments_justification ON comments(justification_id)",
    "CREATE INDEX IF NOT EXISTS idx_comments_author ON comments(author_id)",
    "CREATE INDEX IF NOT EXISTS idx_votes_user ON votes(user_id)",
];

const PARTICIPANT_COLUMNS: &str = "id, user_id, debate_id, role, stance_id, joined_at";
const VOTE_COLUMNS: &str = "id, user_id, justification_id, value, created_at";

/// Participants joined to their debate, narrowed by a `ParticipantFilter`
/// bound positionally through `bind_participant_filter`.
const PARTICIPATION_JOIN: &str = "FROM participants p JOIN debates d ON d.id = p.debate_id
    WHERE (?1 IS NULL OR p.user_id = ?1)
      AND (?2 IS NULL OR p.debate_id = ?2)
      AND (?3 IS NULL OR d.is_closed = ?3)
      AND (?4 IS NULL OR d.is_private = ?4)";

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (or creates) the database at `url` and applies the schema.
    ///
    /// In-memory URLs should use `max_connections = 1` so every query sees
    /// the same database.
    pub async fn connect(url: &str, max_connections: u32) -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(db_err)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(db_err)?;

        let store = Self { pool };
        store.init_schema().await?;
        info!(max_connections, "sqlite store ready");
        Ok(store)
    }

    /// Idempotent; every statement is `IF NOT EXISTS`.
    async fn init_schema(&self) -> StorageResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await.map_err(db_err)?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn db_err(err: sqlx::Error) -> StorageError {
    if let Some(db) = err.as_database_error() {
        if db.is_unique_violation() {
            return StorageError::Conflict(db.message().to_owned());
        }
    }
    StorageError::Backend(err.into())
}

fn bind_participant_filter<'q>(query: SqliteQuery<'q>, filter: &ParticipantFilter) -> SqliteQuery<'q> {
    query
        .bind(filter.user_id)
        .bind(filter.debate_id)
        .bind(filter.debate_closed)
        .bind(filter.debate_private)
}

fn map_rows<T>(rows: &[SqliteRow], map: fn(&SqliteRow) -> anyhow::Result<T>) -> StorageResult<Vec<T>> {
    Ok(rows.iter().map(map).collect::<anyhow::Result<Vec<_>>>()?)
}

fn map_row<T>(row: Option<SqliteRow>, map: fn(&SqliteRow) -> anyhow::Result<T>) -> StorageResult<Option<T>> {
    Ok(row.as_ref().map(map).transpose()?)
}

// Row mappers

fn user_row(row: &SqliteRow) -> anyhow::Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        profile_picture: row.try_get("profile_picture")?,
        created_at: row.try_get("created_at")?,
    })
}

fn topic_row(row: &SqliteRow) -> anyhow::Result<Topic> {
    Ok(Topic { id: row.try_get("id")?, title: row.try_get("title")?, created_at: row.try_get("created_at")? })
}

fn debate_row(row: &SqliteRow) -> anyhow::Result<Debate> {
    Ok(Debate {
        id: row.try_get("id")?,
        topic_id: row.try_get("topic_id")?,
        creator_id: row.try_get("creator_id")?,
        is_private: row.try_get("is_private")?,
        is_closed: row.try_get("is_closed")?,
        started_at: row.try_get("started_at")?,
    })
}

fn stance_row(row: &SqliteRow) -> anyhow::Result<Stance> {
    Ok(Stance { id: row.try_get("id")?, debate_id: row.try_get("debate_id")?, label: row.try_get("label")? })
}

fn participant_row(row: &SqliteRow) -> anyhow::Result<Participant> {
    Ok(Participant {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        debate_id: row.try_get("debate_id")?,
        role: Role::from_str(row.try_get("role")?)?,
        stance_id: row.try_get("stance_id")?,
        joined_at: row.try_get("joined_at")?,
    })
}

/// A participant row that also carries its debate's columns.
fn participation_row(row: &SqliteRow) -> anyhow::Result<(Participant, Debate)> {
    let participant = participant_row(row)?;
    let debate = Debate {
        id: participant.debate_id,
        topic_id: row.try_get("topic_id")?,
        creator_id: row.try_get("creator_id")?,
        is_private: row.try_get("is_private")?,
        is_closed: row.try_get("is_closed")?,
        started_at: row.try_get("started_at")?,
    };
    Ok((participant, debate))
}

fn justification_row(row: &SqliteRow) -> anyhow::Result<Justification> {
    Ok(Justification {
        id: row.try_get("id")?,
        content: row.try_get("content")?,
        author_id: row.try_get("author_id")?,
        stance_id: row.try_get("stance_id")?,
        created_at: row.try_get("created_at")?,
    })
}

fn comment_row(row: &SqliteRow) -> anyhow::Result<Comment> {
    Ok(Comment {
        id: row.try_get("id")?,
        content: row.try_get("content")?,
        author_id: row.try_get("author_id")?,
        justification_id: row.try_get("justification_id")?,
        parent_id: row.try_get("parent_id")?,
        created_at: row.try_get("created_at")?,
    })
}

fn vote_row(row: &SqliteRow) -> anyhow::Result<Vote> {
    let raw: i64 = row.try_get("value")?;
    Ok(Vote {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        justification_id: row.try_get("justification_id")?,
        value: VoteValue::try_from(i8::try_from(raw)?)?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl UserRepo for SqliteStore {
    async fn find_by_id(&self, id: Uuid) -> StorageResult<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        map_row(row, user_row)
    }

    async fn find_by_email(&self, email: &str) -> StorageResult<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        map_row(row, user_row)
    }

    async fn find_by_username(&self, username: &str) -> StorageResult<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        map_row(row, user_row)
    }

    async fn create_user(&self, user: NewUser) -> StorageResult<User> {
        let user = User {
            id: Uuid::now_v7(),
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            profile_picture: None,
            created_at: Utc::now(),
        };
        sqlx::query(
            "INSERT INTO users (id, username, email, password_hash, profile_picture, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.profile_picture)
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(user)
    }

    async fn update_user(&self, user: User) -> StorageResult<User> {
        let row = sqlx::query(
            "UPDATE users SET username = ?, email = ?, password_hash = ?, profile_picture = ? WHERE id = ? RETURNING *",
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.profile_picture)
        .bind(user.id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        map_row(row, user_row)?.ok_or(StorageError::NotFound { entity: "User", id: user.id })
    }
}

#[async_trait]
impl DebateRepo for SqliteStore {
    async fn create_topic(&self, topic: Topic) -> StorageResult<()> {
        sqlx::query("INSERT INTO topics (id, title, created_at) VALUES (?, ?, ?)")
            .bind(topic.id)
            .bind(topic.title)
            .bind(topic.created_at)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn get_topic(&self, id: Uuid) -> StorageResult<Option<Topic>> {
        let row = sqlx::query("SELECT * FROM topics WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        map_row(row, topic_row)
    }

    async fn list_topics(&self) -> StorageResult<Vec<Topic>> {
        let rows = sqlx::query("SELECT * FROM topics").fetch_all(&self.pool).await.map_err(db_err)?;
        let mut topics = map_rows(&rows, topic_row)?;
        topics.sort_by_key(|t| t.title.to_lowercase());
        Ok(topics)
    }

    /// Debate, initial stances and the creator row share one transaction.
    #[instrument(skip_all, fields(debate_id = %debate.id))]
    async fn create_debate(&self, debate: Debate, stances: Vec<Stance>, creator: Participant) -> StorageResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let topic = sqlx::query("SELECT 1 FROM topics WHERE id = ?")
            .bind(debate.topic_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?;
        if topic.is_none() {
            return Err(StorageError::NotFound { entity: "Topic", id: debate.topic_id });
        }

        sqlx::query(
            "INSERT INTO debates (id, topic_id, creator_id, is_private, is_closed, started_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(debate.id)
        .bind(debate.topic_id)
        .bind(debate.creator_id)
        .bind(debate.is_private)
        .bind(debate.is_closed)
        .bind(debate.started_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        for stance in &stances {
            sqlx::query("INSERT INTO stances (id, debate_id, label) VALUES (?, ?, ?)")
                .bind(stance.id)
                .bind(stance.debate_id)
                .bind(&stance.label)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        }

        sqlx::query(
            "INSERT INTO participants (id, user_id, debate_id, role, stance_id, joined_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(creator.id)
        .bind(creator.user_id)
        .bind(creator.debate_id)
        .bind(creator.role.as_str())
        .bind(creator.stance_id)
        .bind(creator.joined_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        debug!(stances = stances.len(), "debate persisted");
        Ok(())
    }

    async fn get_debate(&self, id: Uuid) -> StorageResult<Option<Debate>> {
        let row = sqlx::query("SELECT * FROM debates WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        map_row(row, debate_row)
    }

    async fn list_debates(&self, filter: &DebateFilter) -> StorageResult<Vec<Debate>> {
        let rows = sqlx::query(
            "SELECT * FROM debates
             WHERE (?1 IS NULL OR topic_id = ?1)
               AND (?2 IS NULL OR is_private = ?2)
               AND (?3 IS NULL OR is_closed = ?3)",
        )
        .bind(filter.topic_id)
        .bind(filter.private)
        .bind(filter.closed)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut debates = map_rows(&rows, debate_row)?;
        debates.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));
        if let Some(limit) = filter.limit {
            debates.truncate(limit);
        }
        Ok(debates)
    }

    async fn close_debate(&self, id: Uuid) -> StorageResult<()> {
        let done = sqlx::query("UPDATE debates SET is_closed = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if done.rows_affected() == 0 {
            return Err(StorageError::NotFound { entity: "Debate", id });
        }
        Ok(())
    }

    async fn delete_debate(&self, id: Uuid) -> StorageResult<()> {
        let done = sqlx::query("DELETE FROM debates WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if done.rows_affected() == 0 {
            return Err(StorageError::NotFound { entity: "Debate", id });
        }
        Ok(())
    }

    async fn create_stance(&self, stance: Stance) -> StorageResult<()> {
        sqlx::query("INSERT INTO stances (id, debate_id, label) VALUES (?, ?, ?)")
            .bind(stance.id)
            .bind(stance.debate_id)
            .bind(stance.label)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn get_stance(&self, id: Uuid) -> StorageResult<Option<Stance>> {
        let row = sqlx::query("SELECT * FROM stances WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        map_row(row, stance_row)
    }

    async fn list_stances(&self, debate_id: Uuid) -> StorageResult<Vec<Stance>> {
        let rows = sqlx::query("SELECT * FROM stances WHERE debate_id = ? ORDER BY id")
            .bind(debate_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        map_rows(&rows, stance_row)
    }

    async fn rename_stance(&self, id: Uuid, label: String) -> StorageResult<()> {
        let done = sqlx::query("UPDATE stances SET label = ? WHERE id = ?")
            .bind(label)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if done.rows_affected() == 0 {
            return Err(StorageError::NotFound { entity: "Stance", id });
        }
        Ok(())
    }

    async fn delete_stance(&self, id: Uuid) -> StorageResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let in_use = sqlx::query("SELECT 1 FROM justifications WHERE stance_id = ? LIMIT 1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?;
        if in_use.is_some() {
            return Err(StorageError::Conflict("justifications.stance_id".into()));
        }

        // participants.stance_id is cleared by ON DELETE SET NULL
        let done = sqlx::query("DELETE FROM stances WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        if done.rows_affected() == 0 {
            return Err(StorageError::NotFound { entity: "Stance", id });
        }
        tx.commit().await.map_err(db_err)
    }

    async fn insert_participant(&self, participant: Participant) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO participants (id, user_id, debate_id, role, stance_id, joined_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(participant.id)
        .bind(participant.user_id)
        .bind(participant.debate_id)
        .bind(participant.role.as_str())
        .bind(participant.stance_id)
        .bind(participant.joined_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_participant(&self, id: Uuid) -> StorageResult<Option<Participant>> {
        let row = sqlx::query("SELECT * FROM participants WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        map_row(row, participant_row)
    }

    async fn find_participant(&self, user_id: Uuid, debate_id: Uuid) -> StorageResult<Option<Participant>> {
        let row = sqlx::query("SELECT * FROM participants WHERE user_id = ? AND debate_id = ?")
            .bind(user_id)
            .bind(debate_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        map_row(row, participant_row)
    }

    async fn list_participants(&self, debate_id: Uuid) -> StorageResult<Vec<Participant>> {
        let rows = sqlx::query("SELECT * FROM participants WHERE debate_id = ?")
            .bind(debate_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        let mut participants = map_rows(&rows, participant_row)?;
        participants.sort_by_key(|p| (p.joined_at, p.id));
        Ok(participants)
    }

    async fn update_participant_role(&self, id: Uuid, role: Role) -> StorageResult<Participant> {
        let sql = format!("UPDATE participants SET role = ? WHERE id = ? RETURNING {PARTICIPANT_COLUMNS}");
        let row = sqlx::query(&sql)
            .bind(role.as_str())
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        map_row(row, participant_row)?.ok_or(StorageError::NotFound { entity: "Participant", id })
    }

    async fn update_participant_stance(&self, id: Uuid, stance_id: Option<Uuid>) -> StorageResult<Participant> {
        let sql = format!("UPDATE participants SET stance_id = ? WHERE id = ? RETURNING {PARTICIPANT_COLUMNS}");
        let row = sqlx::query(&sql)
            .bind(stance_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        map_row(row, participant_row)?.ok_or(StorageError::NotFound { entity: "Participant", id })
    }

    async fn delete_participant(&self, id: Uuid) -> StorageResult<()> {
        let done = sqlx::query("DELETE FROM participants WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if done.rows_affected() == 0 {
            return Err(StorageError::NotFound { entity: "Participant", id });
        }
        Ok(())
    }

    async fn count_participants(&self, filter: &ParticipantFilter) -> StorageResult<u64> {
        let sql = format!("SELECT COUNT(*) AS n {PARTICIPATION_JOIN}");
        let row = bind_participant_filter(sqlx::query(&sql), filter)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        let n: i64 = row.try_get("n").map_err(db_err)?;
        Ok(n.max(0) as u64)
    }

    async fn count_participants_by_role(&self, filter: &ParticipantFilter) -> StorageResult<Vec<(Role, u64)>> {
        let sql = format!("SELECT p.role AS role, COUNT(*) AS n {PARTICIPATION_JOIN} GROUP BY p.role");
        let rows = bind_participant_filter(sqlx::query(&sql), filter)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        let mut counts = map_rows(&rows, |row| {
            let n: i64 = row.try_get("n")?;
            Ok((Role::from_str(row.try_get("role")?)?, n.max(0) as u64))
        })?;
        counts.sort();
        Ok(counts)
    }

    async fn list_participations(&self, user_id: Uuid) -> StorageResult<Vec<(Participant, Debate)>> {
        let sql = format!(
            "SELECT p.id AS id, p.user_id AS user_id, p.debate_id AS debate_id, p.role AS role,
                    p.stance_id AS stance_id, p.joined_at AS joined_at,
                    d.topic_id AS topic_id, d.creator_id AS creator_id, d.is_private AS is_private,
                    d.is_closed AS is_closed, d.started_at AS started_at
             {PARTICIPATION_JOIN}"
        );
        let rows = bind_participant_filter(sqlx::query(&sql), &ParticipantFilter::for_user(user_id))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        let mut participations = map_rows(&rows, participation_row)?;
        participations.sort_by_key(|(p, _)| (p.joined_at, p.id));
        Ok(participations)
    }
}

#[async_trait]
impl DiscussionRepo for SqliteStore {
    async fn create_justification(&self, justification: Justification) -> StorageResult<()> {
        sqlx::query("INSERT INTO justifications (id, content, author_id, stance_id, created_at) VALUES (?, ?, ?, ?, ?)")
            .bind(justification.id)
            .bind(justification.content)
            .bind(justification.author_id)
            .bind(justification.stance_id)
            .bind(justification.created_at)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn get_justification(&self, id: Uuid) -> StorageResult<Option<Justification>> {
        let row = sqlx::query("SELECT * FROM justifications WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        map_row(row, justification_row)
    }

    async fn list_justifications_for_stance(&self, stance_id: Uuid) -> StorageResult<Vec<Justification>> {
        let rows = sqlx::query("SELECT * FROM justifications WHERE stance_id = ?")
            .bind(stance_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        map_rows(&rows, justification_row)
    }

    async fn list_justifications_by_author(&self, author_id: Uuid) -> StorageResult<Vec<Justification>> {
        let rows = sqlx::query("SELECT * FROM justifications WHERE author_id = ?")
            .bind(author_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        map_rows(&rows, justification_row)
    }

    async fn create_comment(&self, comment: Comment) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO comments (id, content, author_id, justification_id, parent_id, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(comment.id)
        .bind(comment.content)
        .bind(comment.author_id)
        .bind(comment.justification_id)
        .bind(comment.parent_id)
        .bind(comment.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_comment(&self, id: Uuid) -> StorageResult<Option<Comment>> {
        let row = sqlx::query("SELECT * FROM comments WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        map_row(row, comment_row)
    }

    async fn list_comments(&self, justification_id: Uuid) -> StorageResult<Vec<Comment>> {
        let rows = sqlx::query("SELECT * FROM comments WHERE justification_id = ?")
            .bind(justification_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        let mut comments = map_rows(&rows, comment_row)?;
        comments.sort_by_key(|c| (c.created_at, c.id));
        Ok(comments)
    }

    async fn list_comments_by_author(&self, author_id: Uuid) -> StorageResult<Vec<Comment>> {
        let rows = sqlx::query("SELECT * FROM comments WHERE author_id = ?")
            .bind(author_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        map_rows(&rows, comment_row)
    }

    #[instrument(skip(self, at))]
    async fn apply_vote(
        &self,
        vote_id: Uuid,
        user_id: Uuid,
        justification_id: Uuid,
        value: VoteValue,
        at: DateTime<Utc>,
    ) -> StorageResult<VoteOutcome> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // A no-op UPDATE takes the write lock before the existing vote is read,
        // so concurrent casts for the same pair serialize here.
        let sql = format!(
            "UPDATE votes SET value = value WHERE user_id = ? AND justification_id = ? RETURNING {VOTE_COLUMNS}"
        );
        let existing = sqlx::query(&sql)
            .bind(user_id)
            .bind(justification_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?;
        let existing = map_row(existing, vote_row)?;

        let justification = sqlx::query("SELECT 1 FROM justifications WHERE id = ?")
            .bind(justification_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?;
        if justification.is_none() {
            return Err(StorageError::NotFound { entity: "Justification", id: justification_id });
        }

        let outcome = match (resolve_vote(existing.as_ref().map(|v| v.value), value), existing) {
            (VoteAction::Create, _) => {
                let vote = Vote { id: vote_id, user_id, justification_id, value, created_at: at };
                sqlx::query(
                    "INSERT INTO votes (id, user_id, justification_id, value, created_at) VALUES (?, ?, ?, ?, ?)",
                )
                .bind(vote.id)
                .bind(vote.user_id)
                .bind(vote.justification_id)
                .bind(i64::from(vote.value.as_i8()))
                .bind(vote.created_at)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
                VoteOutcome::Created(vote)
            }
            (VoteAction::Delete, Some(vote)) => {
                sqlx::query("DELETE FROM votes WHERE id = ?")
                    .bind(vote.id)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_err)?;
                VoteOutcome::Removed
            }
            (VoteAction::Switch, Some(mut vote)) => {
                sqlx::query("UPDATE votes SET value = ? WHERE id = ?")
                    .bind(i64::from(value.as_i8()))
                    .bind(vote.id)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_err)?;
                vote.value = value;
                VoteOutcome::Switched(vote)
            }
            (action, None) => {
                return Err(StorageError::Backend(anyhow::anyhow!("{action:?} without an existing vote")));
            }
        };

        tx.commit().await.map_err(db_err)?;
        Ok(outcome)
    }

    async fn list_votes(&self, justification_id: Uuid) -> StorageResult<Vec<Vote>> {
        let rows = sqlx::query("SELECT * FROM votes WHERE justification_id = ?")
            .bind(justification_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        map_rows(&rows, vote_row)
    }

    async fn list_votes_by_user(&self, user_id: Uuid) -> StorageResult<Vec<Vote>> {
        let rows = sqlx::query("SELECT * FROM votes WHERE user_id = ?")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        map_rows(&rows, vote_row)
    }
}
