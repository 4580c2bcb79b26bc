//! services/journal/src/adapters/remote.rs
//!
//! This module contains the remote store adapter, the concrete implementation of
//! the `RemoteStore` port backed by PostgreSQL through `sqlx`. It owns the
//! snake_case relational mapping of the journal entities.

use std::sync::Arc;

use async_trait::async_trait;
use booktalk_core::domain::{
    Book, Message, MessagePatch, MessageType, Profile, ReadingStatus, Sender, UserIdentity,
    MAX_RATING,
};
use booktalk_core::ports::{PortError, PortResult, RemoteStore, SessionProvider};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// Tables the journal expects to exist remotely.
pub const REMOTE_TABLES: [&str; 3] = ["profiles", "books", "messages"];

const UNDEFINED_TABLE: &str = "42P01";
const UNIQUE_VIOLATION: &str = "23505";

//=========================================================================================
// Session Provider
//=========================================================================================

/// A session whose identity is fixed at startup and can only be cleared.
#[derive(Debug, Default)]
pub struct StaticSession {
    user: RwLock<Option<UserIdentity>>,
}

impl StaticSession {
    pub fn new(user: Option<UserIdentity>) -> Self {
        Self {
            user: RwLock::new(user),
        }
    }

    pub fn signed_in(user_id: Uuid, email: Option<String>) -> Self {
        Self::new(Some(UserIdentity { user_id, email }))
    }
}

#[async_trait]
impl SessionProvider for StaticSession {
    async fn current_user(&self) -> Option<UserIdentity> {
        self.user.read().await.clone()
    }

    async fn sign_out(&self) {
        self.user.write().await.take();
    }
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A remote adapter that implements the `RemoteStore` port.
#[derive(Clone)]
pub struct PgRemoteStore {
    pool: PgPool,
    session: Arc<dyn SessionProvider>,
}

impl PgRemoteStore {
    /// Creates a new `PgRemoteStore`.
    pub fn new(pool: PgPool, session: Arc<dyn SessionProvider>) -> Self {
        Self { pool, session }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn require_user(&self) -> PortResult<UserIdentity> {
        self.session
            .current_user()
            .await
            .ok_or(PortError::NotAuthenticated)
    }
}

/// Translates a `sqlx` failure into the port's error vocabulary.
fn map_sqlx_error(err: sqlx::Error, table: &str, key: &str) -> PortError {
    match &err {
        sqlx::Error::RowNotFound => PortError::NotFound(format!("{} {}", table, key)),
        sqlx::Error::Database(db) => match db.code().as_deref() {
            Some(UNDEFINED_TABLE) => PortError::SchemaMissing(table.to_string()),
            Some(UNIQUE_VIOLATION) => PortError::Conflict(format!("{} {}", table, key)),
            _ => PortError::RemoteUnavailable(err.to_string()),
        },
        _ => PortError::RemoteUnavailable(err.to_string()),
    }
}

/// Inserts or updates a book. The update branch only fires for the owner's row,
/// so a foreign row with the same id is left untouched and nothing is written.
const UPSERT_BOOK_SQL: &str = "INSERT INTO books (id, user_id, title, author, cover_url, status, \
     rating, added_at, last_message, last_message_time, summary) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
     ON CONFLICT (id) DO UPDATE SET title = EXCLUDED.title, author = EXCLUDED.author, \
     cover_url = EXCLUDED.cover_url, status = EXCLUDED.status, rating = EXCLUDED.rating, \
     added_at = EXCLUDED.added_at, last_message = EXCLUDED.last_message, \
     last_message_time = EXCLUDED.last_message_time, summary = EXCLUDED.summary \
     WHERE books.user_id = EXCLUDED.user_id";

/// An upsert that touched no row hit an id owned by someone else.
fn require_written(rows_affected: u64, table: &str, key: &str) -> PortResult<()> {
    if rows_affected == 0 {
        return Err(PortError::Conflict(format!("{} {}", table, key)));
    }
    Ok(())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct ProfileRecord {
    name: String,
    joined_at: DateTime<Utc>,
    avatar_url: Option<String>,
}
impl ProfileRecord {
    fn to_domain(self) -> Profile {
        Profile {
            name: self.name,
            joined_at: self.joined_at,
            avatar_url: self.avatar_url,
        }
    }
}

#[derive(FromRow)]
struct BookRecord {
    id: String,
    title: String,
    author: String,
    cover_url: String,
    status: String,
    rating: i16,
    added_at: DateTime<Utc>,
    last_message: Option<String>,
    last_message_time: Option<DateTime<Utc>>,
    summary: Option<String>,
}
impl BookRecord {
    fn to_domain(self) -> PortResult<Book> {
        let status = self
            .status
            .parse::<ReadingStatus>()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(Book {
            id: self.id,
            title: self.title,
            author: self.author,
            cover_url: self.cover_url,
            status,
            rating: self.rating.clamp(0, MAX_RATING as i16) as u8,
            last_message: self.last_message,
            last_message_time: self.last_message_time,
            added_at: self.added_at,
            summary: self.summary,
        })
    }
}

#[derive(FromRow)]
struct MessageRecord {
    id: String,
    book_id: String,
    text: String,
    kind: String,
    sender: String,
    timestamp: DateTime<Utc>,
    page: Option<String>,
    thought: Option<String>,
    keywords: Option<Vec<String>>,
}
impl MessageRecord {
    fn to_domain(self) -> PortResult<Message> {
        let kind = self
            .kind
            .parse::<MessageType>()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        let sender = self
            .sender
            .parse::<Sender>()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(Message {
            id: self.id,
            book_id: self.book_id,
            text: self.text,
            kind,
            timestamp: self.timestamp,
            sender,
            page: self.page,
            thought: self.thought,
            keywords: self.keywords,
        })
    }
}

//=========================================================================================
// `RemoteStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl RemoteStore for PgRemoteStore {
    async fn get_current_user(&self) -> PortResult<Option<UserIdentity>> {
        Ok(self.session.current_user().await)
    }

    async fn get_profile(&self) -> PortResult<Option<Profile>> {
        let user = self.require_user().await?;
        let record = sqlx::query_as::<_, ProfileRecord>(
            "SELECT name, joined_at, avatar_url FROM profiles WHERE id = $1",
        )
        .bind(user.user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, "profiles", &user.user_id.to_string()))?;
        Ok(record.map(ProfileRecord::to_domain))
    }

    async fn save_profile(&self, profile: &Profile) -> PortResult<()> {
        let user = self.require_user().await?;
        sqlx::query(
            "INSERT INTO profiles (id, name, joined_at, avatar_url) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, joined_at = EXCLUDED.joined_at, \
             avatar_url = EXCLUDED.avatar_url",
        )
        .bind(user.user_id)
        .bind(&profile.name)
        .bind(profile.joined_at)
        .bind(&profile.avatar_url)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, "profiles", &user.user_id.to_string()))?;
        Ok(())
    }

    async fn get_books(&self) -> PortResult<Vec<Book>> {
        let user = self.require_user().await?;
        let records = sqlx::query_as::<_, BookRecord>(
            "SELECT id, title, author, cover_url, status, rating, added_at, last_message, \
             last_message_time, summary FROM books WHERE user_id = $1 \
             ORDER BY last_message_time DESC NULLS LAST",
        )
        .bind(user.user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, "books", "list"))?;

        records.into_iter().map(BookRecord::to_domain).collect()
    }

    async fn save_book(&self, book: &Book) -> PortResult<()> {
        let user = self.require_user().await?;
        let result = sqlx::query(UPSERT_BOOK_SQL)
            .bind(&book.id)
            .bind(user.user_id)
            .bind(&book.title)
            .bind(&book.author)
            .bind(&book.cover_url)
            .bind(book.status.as_str())
            .bind(i16::from(book.rating))
            .bind(book.added_at)
            .bind(&book.last_message)
            .bind(book.last_message_time)
            .bind(&book.summary)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, "books", &book.id))?;
        require_written(result.rows_affected(), "books", &book.id)?;
        debug!(book_id = %book.id, "Upserted remote book");
        Ok(())
    }

    async fn delete_book(&self, book_id: &str) -> PortResult<()> {
        let user = self.require_user().await?;
        sqlx::query("DELETE FROM messages WHERE book_id = $1 AND user_id = $2")
            .bind(book_id)
            .bind(user.user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, "messages", book_id))?;
        sqlx::query("DELETE FROM books WHERE id = $1 AND user_id = $2")
            .bind(book_id)
            .bind(user.user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, "books", book_id))?;
        Ok(())
    }

    async fn get_messages(&self, book_id: &str) -> PortResult<Vec<Message>> {
        let user = self.require_user().await?;
        let records = sqlx::query_as::<_, MessageRecord>(
            "SELECT id, book_id, text, \"type\" AS kind, sender, \"timestamp\", page, thought, \
             keywords FROM messages WHERE book_id = $1 AND user_id = $2 ORDER BY \"timestamp\" ASC",
        )
        .bind(book_id)
        .bind(user.user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, "messages", book_id))?;

        records.into_iter().map(MessageRecord::to_domain).collect()
    }

    async fn add_message(&self, message: &Message) -> PortResult<()> {
        let user = self.require_user().await?;
        sqlx::query(
            "INSERT INTO messages (id, book_id, user_id, text, \"type\", sender, \"timestamp\", \
             page, thought, keywords) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(&message.id)
        .bind(&message.book_id)
        .bind(user.user_id)
        .bind(&message.text)
        .bind(message.kind.as_str())
        .bind(message.sender.as_str())
        .bind(message.timestamp)
        .bind(&message.page)
        .bind(&message.thought)
        .bind(&message.keywords)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, "messages", &message.id))?;
        Ok(())
    }

    async fn update_message(&self, message_id: &str, patch: &MessagePatch) -> PortResult<()> {
        if patch.is_empty() {
            return Ok(());
        }
        let user = self.require_user().await?;
        sqlx::query(
            "UPDATE messages SET text = COALESCE($1, text), keywords = COALESCE($2, keywords) \
             WHERE id = $3 AND user_id = $4",
        )
        .bind(&patch.text)
        .bind(&patch.keywords)
        .bind(message_id)
        .bind(user.user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(e, "messages", message_id))?;
        Ok(())
    }

    async fn delete_message(&self, message_id: &str) -> PortResult<()> {
        let user = self.require_user().await?;
        sqlx::query("DELETE FROM messages WHERE id = $1 AND user_id = $2")
            .bind(message_id)
            .bind(user.user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, "messages", message_id))?;
        Ok(())
    }

    async fn probe_table(&self, table: &str) -> PortResult<()> {
        if !REMOTE_TABLES.contains(&table) {
            return Err(PortError::Unexpected(format!("'{}' is not a journal table", table)));
        }
        // The name comes from the fixed list above, so interpolating it is safe.
        sqlx::query(&format!("SELECT 1 FROM {} LIMIT 1", table))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, table, "probe"))?;
        Ok(())
    }

    async fn sign_out(&self) -> PortResult<()> {
        self.session.sign_out().await;
        info!("Signed out of remote session");
        Ok(())
    }
}
