//! services/journal/src/adapters/local.rs
//!
//! The on-device store: profile, book index and one message list per book kept
//! as JSON documents in a `KeyValueStore`, plus the backup snapshot format.

use std::collections::BTreeMap;
use std::sync::Arc;

use booktalk_core::domain::{
    new_id, timestamp_now, Backup, Book, Message, MessageType, Profile, ReadingStatus, Sender,
    BACKUP_VERSION,
};
use booktalk_core::ports::{KeyValueStore, PortError, PortResult};
use futures::future::try_join_all;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, info};

const PROFILE_KEY: &str = "booktalk_profile";
const BOOKS_KEY: &str = "booktalk_books";
const MESSAGES_KEY: &str = "booktalk_messages";
const SESSION_KEY: &str = "booktalk_user_session";

fn messages_key(book_id: &str) -> String {
    format!("{}_{}", MESSAGES_KEY, book_id)
}

/// Durable key-value persistence of the whole journal.
#[derive(Clone)]
pub struct LocalStore {
    kv: Arc<dyn KeyValueStore>,
}

impl LocalStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Reads a JSON document. Corrupt content is logged and treated as absent.
    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> PortResult<Option<T>> {
        let Some(raw) = self.kv.get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                error!(key, error = %e, "Failed to parse locally stored data; ignoring it");
                Ok(None)
            }
        }
    }

    async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> PortResult<()> {
        let raw = serde_json::to_string(value).map_err(|e| PortError::Unexpected(e.to_string()))?;
        self.kv.set(key, &raw).await
    }

    // --- Profile ---

    pub async fn get_profile(&self) -> PortResult<Option<Profile>> {
        self.read_json(PROFILE_KEY).await
    }

    pub async fn save_profile(&self, profile: &Profile) -> PortResult<()> {
        self.write_json(PROFILE_KEY, profile).await
    }

    /// The generated id standing in for a user while offline.
    pub async fn session_id(&self) -> PortResult<String> {
        if let Some(id) = self.kv.get(SESSION_KEY).await? {
            return Ok(id);
        }
        let id = new_id();
        self.kv.set(SESSION_KEY, &id).await?;
        debug!(session_id = %id, "Created local session");
        Ok(id)
    }

    pub async fn clear_session(&self) -> PortResult<()> {
        self.kv.remove(SESSION_KEY).await
    }

    // --- Books ---

    /// Books in storage order.
    pub async fn get_books(&self) -> PortResult<Vec<Book>> {
        Ok(self.read_json(BOOKS_KEY).await?.unwrap_or_default())
    }

    /// Overwrites the whole book index.
    pub async fn save_books(&self, books: &[Book]) -> PortResult<()> {
        self.write_json(BOOKS_KEY, books).await
    }

    pub async fn delete_book_data(&self, book_id: &str) -> PortResult<()> {
        let books: Vec<Book> = self
            .get_books()
            .await?
            .into_iter()
            .filter(|b| b.id != book_id)
            .collect();
        self.save_books(&books).await?;
        self.kv.remove(&messages_key(book_id)).await
    }

    // --- Messages ---

    pub async fn get_messages(&self, book_id: &str) -> PortResult<Vec<Message>> {
        Ok(self
            .read_json(&messages_key(book_id))
            .await?
            .unwrap_or_default())
    }

    /// Overwrites the message list of one book.
    pub async fn save_messages(&self, book_id: &str, messages: &[Message]) -> PortResult<()> {
        self.write_json(&messages_key(book_id), messages).await
    }

    // --- Backup ---

    pub async fn create_backup(&self) -> PortResult<Backup> {
        let profile = self.get_profile().await?;
        let books = self.get_books().await?;
        let threads = try_join_all(books.iter().map(|book| self.get_messages(&book.id))).await?;
        let messages: BTreeMap<String, Vec<Message>> = books
            .iter()
            .map(|book| book.id.clone())
            .zip(threads)
            .collect();
        let backup = Backup {
            version: BACKUP_VERSION,
            timestamp: timestamp_now(),
            profile,
            books,
            messages,
        };
        info!(
            books = backup.books.len(),
            messages = backup.message_count(),
            "Created local backup"
        );
        Ok(backup)
    }

    /// Overwrites the profile (when the backup has one), the whole book index and
    /// the message list of every book in the backup. Message lists of books that
    /// are not in the backup are left in place, though those books leave the index.
    pub async fn restore_backup(&self, backup: &Backup) -> PortResult<()> {
        if let Some(profile) = &backup.profile {
            self.save_profile(profile).await?;
        }
        self.save_books(&backup.books).await?;
        for (book_id, messages) in &backup.messages {
            self.save_messages(book_id, messages).await?;
        }
        info!(
            version = backup.version,
            books = backup.books.len(),
            messages = backup.message_count(),
            "Restored local backup"
        );
        Ok(())
    }

    pub async fn restore_backup_json(&self, json: &str) -> PortResult<Backup> {
        let backup =
            Backup::from_json(json).map_err(|e| PortError::InvalidBackupFormat(e.to_string()))?;
        self.restore_backup(&backup).await?;
        Ok(backup)
    }

    /// Seeds a demo book on first launch. Returns whether anything was written.
    pub async fn seed_initial_data(&self) -> PortResult<bool> {
        if !self.get_books().await?.is_empty() {
            return Ok(false);
        }
        let now = timestamp_now();
        let demo_id = "demo-1";
        let welcome = Message {
            id: "msg-1".to_string(),
            book_id: demo_id.to_string(),
            text: "Welcome to your reading log for The Great Gatsby. \
                   You can chat with me about the plot!"
                .to_string(),
            kind: MessageType::System,
            timestamp: now,
            sender: Sender::Book,
            page: None,
            thought: None,
            keywords: None,
        };
        let book = Book {
            id: demo_id.to_string(),
            title: "The Great Gatsby".to_string(),
            author: "F. Scott Fitzgerald".to_string(),
            cover_url: "https://picsum.photos/id/24/200/300".to_string(),
            status: ReadingStatus::Reading,
            rating: 0,
            last_message: Some(welcome.preview_text()),
            last_message_time: Some(now),
            added_at: now,
            summary: Some("A story of decadence and excess.".to_string()),
        };
        self.save_books(std::slice::from_ref(&book)).await?;
        self.save_messages(demo_id, &[welcome]).await?;
        info!("Seeded demo book");
        Ok(true)
    }
}
