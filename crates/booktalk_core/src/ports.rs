//! crates/booktalk_core/src/ports.rs
//!
//! Defines the service contracts (traits) of the journal.
//! These traits form the boundary of the hexagonal architecture: the sync logic
//! talks to storage and to the AI companion only through them, so the on-device
//! store, the relational backend and any test double are interchangeable.

use async_trait::async_trait;

use crate::domain::{Book, Message, MessagePatch, Profile, UserIdentity};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    /// A remote operation was attempted without an authenticated session.
    #[error("Not authenticated")]
    NotAuthenticated,
    /// The remote store could not be reached or the query failed.
    #[error("Remote store unavailable: {0}")]
    RemoteUnavailable(String),
    /// The remote store is reachable but an expected table does not exist.
    #[error("Remote schema missing: table '{0}' does not exist")]
    SchemaMissing(String),
    #[error("Invalid backup format: {0}")]
    InvalidBackupFormat(String),
    /// An insert collided with an existing id.
    #[error("Conflict: {0} already exists")]
    Conflict(String),
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

impl PortError {
    /// Whether retrying the same call could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, PortError::RemoteUnavailable(_))
    }
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Storage Ports
//=========================================================================================

/// Durable on-device key-value persistence.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> PortResult<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> PortResult<()>;
    /// Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> PortResult<()>;
}

/// Supplies the identity that scopes every remote operation.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn current_user(&self) -> Option<UserIdentity>;
    async fn sign_out(&self);
}

/// Entity CRUD against the remote relational backend.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn get_current_user(&self) -> PortResult<Option<UserIdentity>>;

    // --- Profile ---
    /// Returns `None` when the user has no profile row yet.
    async fn get_profile(&self) -> PortResult<Option<Profile>>;
    /// Insert-or-update keyed by the session's user id.
    async fn save_profile(&self, profile: &Profile) -> PortResult<()>;

    // --- Books ---
    /// Books ordered by `last_message_time`, newest first.
    async fn get_books(&self) -> PortResult<Vec<Book>>;
    /// Insert-or-update keyed by `book.id`, always stamped with the session user.
    async fn save_book(&self, book: &Book) -> PortResult<()>;
    async fn delete_book(&self, book_id: &str) -> PortResult<()>;

    // --- Messages ---
    /// Messages ordered by `timestamp`, oldest first.
    async fn get_messages(&self, book_id: &str) -> PortResult<Vec<Message>>;
    /// Insert-only: an existing id fails with `PortError::Conflict`.
    async fn add_message(&self, message: &Message) -> PortResult<()>;
    /// Applies only the `text` and `keywords` of the patch.
    async fn update_message(&self, message_id: &str, patch: &MessagePatch) -> PortResult<()>;
    /// Removes one message. An unknown id is not an error.
    async fn delete_message(&self, message_id: &str) -> PortResult<()>;

    // --- Diagnostics & session ---
    /// A lightweight existence probe that needs no session.
    async fn probe_table(&self, table: &str) -> PortResult<()>;
    async fn sign_out(&self) -> PortResult<()>;
}

/// The single persistence interface the sync façade writes through.
///
/// The local variant persists whole collections while the remote variant writes
/// one row at a time, so every write receives both the changed entity and the
/// full in-memory collection it belongs to.
#[async_trait]
pub trait JournalStore: Send + Sync {
    async fn load_profile(&self) -> PortResult<Option<Profile>>;
    async fn save_profile(&self, profile: &Profile) -> PortResult<()>;
    async fn load_books(&self) -> PortResult<Vec<Book>>;
    async fn load_messages(&self, book_id: &str) -> PortResult<Vec<Message>>;

    /// Persists `book`; `books` is the complete book list after the change.
    async fn write_book(&self, book: &Book, books: &[Book]) -> PortResult<()>;
    /// Persists a new `message`; `thread` is its book's complete message list.
    async fn write_message(&self, message: &Message, thread: &[Message]) -> PortResult<()>;
    async fn patch_message(
        &self,
        message_id: &str,
        patch: &MessagePatch,
        thread: &[Message],
    ) -> PortResult<()>;
    /// Takes back a message written by `write_message`; `remaining` is the
    /// thread without it.
    async fn remove_message(&self, message: &Message, remaining: &[Message]) -> PortResult<()>;
    /// Removes a book together with its messages.
    async fn remove_book(&self, book_id: &str) -> PortResult<()>;

    /// Ends the current session (remote sign-out or local session reset).
    async fn end_session(&self) -> PortResult<()>;
}

//=========================================================================================
// AI Companion Port
//=========================================================================================

/// How many previous messages are handed to the companion as chat context.
pub const CHAT_HISTORY_LIMIT: usize = 10;

/// How many keywords a quote can carry.
pub const MAX_KEYWORDS: usize = 3;

/// Returned to the reader when the companion could not produce a chat reply.
pub const FALLBACK_CHAT_REPLY: &str =
    "Sorry, I'm having trouble reading the pages right now. Try again later.";

/// The deterministic welcome used whenever the companion is unavailable.
pub fn fallback_welcome(title: &str) -> String {
    format!("Welcome to your reading log for {}.", title)
}

/// Optional natural-language content. Callers must never depend on it.
#[async_trait]
pub trait BookCompanionService: Send + Sync {
    /// A one-sentence welcome, as if written by the book.
    async fn generate_welcome(&self, title: &str, author: &str) -> PortResult<String>;
    /// Replies in the book's voice. `history` holds at most `CHAT_HISTORY_LIMIT` messages.
    async fn chat(&self, book: &Book, history: &[Message], user_text: &str) -> PortResult<String>;
    /// Short themes for a quote, at most `MAX_KEYWORDS`.
    async fn extract_keywords(&self, text: &str) -> PortResult<Vec<String>>;
}
