//! services/journal/src/sync/facade.rs
//!
//! The single API surface the UI talks to.
//!
//! Every mutation is applied to the in-memory view first, so the reader sees it
//! immediately, and is then persisted through whichever store the mode selector
//! designates. A failed write restores the view as it was before the call. The
//! view lock is never held across a store call.

use std::sync::Arc;
use std::time::{Duration, Instant};

use booktalk_core::domain::{
    Backup, Book, BookPatch, Message, MessageExtras, MessagePatch, MessageType, Profile,
    ProfileStats, ReadingStatus, Sender, MAX_RATING,
};
use booktalk_core::ports::{
    fallback_welcome, BookCompanionService, PortError, PortResult, CHAT_HISTORY_LIMIT,
    FALLBACK_CHAT_REPLY, MAX_KEYWORDS,
};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::mode::StorageMode;
use super::retry::RetryPolicy;
use super::store::StoreSelector;
use super::transaction::OptimisticUpdate;
use super::view::JournalView;

/// Table probed by the connection self-check.
const PROBE_TABLE: &str = "books";

const DEFAULT_READER_NAME: &str = "Demo User";

/// Logs a failed attempt to take back the first half of a two-step write.
fn report_undo(operation: &'static str, undo: PortResult<()>) {
    if let Err(e) = undo {
        error!(
            operation,
            error = %e,
            "Could not undo a partial write; stored data may be incomplete"
        );
    }
}

/// Outcome of the remote connectivity self-check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionReport {
    pub success: bool,
    pub message: String,
    pub latency: Option<Duration>,
}

pub struct JournalFacade {
    stores: StoreSelector,
    companion: Arc<dyn BookCompanionService>,
    retry: RetryPolicy,
    view: Mutex<JournalView>,
}

impl JournalFacade {
    pub fn new(
        stores: StoreSelector,
        companion: Arc<dyn BookCompanionService>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            stores,
            companion,
            retry,
            view: Mutex::new(JournalView::default()),
        }
    }

    //=====================================================================================
    // Mode & Reads
    //=====================================================================================

    pub fn mode(&self) -> StorageMode {
        self.stores.mode()
    }

    /// The reader chose to work offline. Returns whether the mode changed.
    pub fn continue_offline(&self) -> bool {
        self.stores
            .mode_selector()
            .downgrade("reader chose to continue offline")
    }

    /// A copy of the whole in-memory view.
    pub async fn snapshot(&self) -> JournalView {
        self.view.lock().await.clone()
    }

    pub async fn profile(&self) -> Option<Profile> {
        self.view.lock().await.profile.clone()
    }

    pub async fn books(&self) -> Vec<Book> {
        self.view.lock().await.books.clone()
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.view.lock().await.messages.clone()
    }

    pub async fn active_book(&self) -> Option<Book> {
        self.view.lock().await.active_book().cloned()
    }

    pub async fn profile_stats(&self) -> ProfileStats {
        ProfileStats::from_books(&self.view.lock().await.books)
    }

    //=====================================================================================
    // Session
    //=====================================================================================

    /// Establishes the session profile, creating one on first use.
    ///
    /// In Cloud mode any failure to fetch or create the remote profile moves the
    /// session to Local instead of surfacing an error, so the reader always gets in.
    pub async fn onboard(&self, name: &str) -> PortResult<Profile> {
        let name = if name.trim().is_empty() {
            DEFAULT_READER_NAME
        } else {
            name.trim()
        };

        if self.stores.mode_selector().is_cloud() {
            match self.cloud_profile(name).await {
                Ok(profile) => {
                    self.view.lock().await.profile = Some(profile.clone());
                    info!(mode = %self.mode(), "Reader signed in");
                    return Ok(profile);
                }
                Err(e) => {
                    warn!(error = %e, "Remote profile unavailable after sign-in");
                    self.stores
                        .mode_selector()
                        .downgrade("remote profile unavailable after sign-in");
                }
            }
        }

        let store = self.stores.active();
        let profile = match store.load_profile().await? {
            Some(profile) => profile,
            None => {
                let profile = Profile::new(name);
                store.save_profile(&profile).await?;
                profile
            }
        };
        self.view.lock().await.profile = Some(profile.clone());
        info!(mode = %self.mode(), "Reader signed in");
        Ok(profile)
    }

    async fn cloud_profile(&self, name: &str) -> PortResult<Profile> {
        let store = self.stores.active();
        if let Some(profile) = store.load_profile().await? {
            return Ok(profile);
        }
        let profile = Profile::new(name);
        store.save_profile(&profile).await?;
        Ok(profile)
    }

    /// Ends the session in the active store and forgets the in-memory view.
    pub async fn sign_out(&self) -> PortResult<()> {
        let result = self.stores.active().end_session().await;
        self.view.lock().await.clear();
        result
    }

    /// Seeds the demo book when running offline with an empty journal.
    pub async fn seed_if_empty(&self) -> PortResult<bool> {
        if self.mode() != StorageMode::Local {
            return Ok(false);
        }
        self.stores.local().seed_initial_data().await
    }

    //=====================================================================================
    // Loading
    //=====================================================================================

    pub async fn load_profile(&self) -> PortResult<Option<Profile>> {
        let profile = self.stores.active().load_profile().await?;
        self.view.lock().await.profile = profile.clone();
        Ok(profile)
    }

    /// Loads the book list, newest activity first.
    pub async fn load_books(&self) -> PortResult<Vec<Book>> {
        let books = self.stores.active().load_books().await?;
        let mut view = self.view.lock().await;
        view.set_books(books);
        debug!(count = view.books.len(), "Loaded books");
        Ok(view.books.clone())
    }

    /// Opens a book's thread, making it the active book.
    pub async fn load_messages(&self, book_id: &str) -> PortResult<Vec<Message>> {
        if self.view.lock().await.book(book_id).is_none() {
            return Err(PortError::NotFound(format!("book {}", book_id)));
        }
        let messages = self.stores.active().load_messages(book_id).await?;
        let mut view = self.view.lock().await;
        view.open_thread(book_id, messages);
        Ok(view.messages.clone())
    }

    //=====================================================================================
    // Mutations
    //=====================================================================================

    /// Keeps or undoes an optimistic change depending on the persistence result.
    async fn finish(&self, tx: OptimisticUpdate, result: PortResult<()>) -> PortResult<()> {
        match result {
            Ok(()) => {
                tx.commit();
                Ok(())
            }
            Err(e) => {
                error!(operation = tx.operation(), error = %e, "Persistence failed; rolling back");
                let mut view = self.view.lock().await;
                tx.rollback(&mut view);
                Err(e)
            }
        }
    }

    /// Adds a book together with its welcome message from the companion.
    pub async fn add_book(&self, title: &str, author: &str, cover_url: &str) -> PortResult<Book> {
        let welcome_text = match self.companion.generate_welcome(title, author).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Companion welcome unavailable; using default");
                fallback_welcome(title)
            }
        };
        let book = Book::new(title, author, cover_url);
        let welcome = Message::new(
            &book.id,
            welcome_text,
            MessageType::System,
            Sender::Book,
            MessageExtras::default(),
        );

        let (tx, book, books) = {
            let mut view = self.view.lock().await;
            let tx = OptimisticUpdate::begin("add_book", &view);
            view.insert_book(book);
            match view.append_message(welcome.clone()) {
                Some(book) => (tx, book, view.books.clone()),
                None => {
                    tx.rollback(&mut view);
                    return Err(PortError::Unexpected(
                        "new book vanished from the view".to_string(),
                    ));
                }
            }
        };

        let store = self.stores.active();
        let thread = vec![welcome.clone()];
        let result = async {
            self.retry
                .run("save_book", || store.write_book(&book, &books))
                .await?;
            let written = self
                .retry
                .run("add_message", || store.write_message(&welcome, &thread))
                .await;
            if written.is_err() {
                let undo = self
                    .retry
                    .run("delete_book", || store.remove_book(&book.id))
                    .await;
                report_undo("add_book", undo);
            }
            written
        }
        .await;
        self.finish(tx, result).await?;

        info!(book_id = %book.id, title = %book.title, "Added book");
        Ok(book)
    }

    /// Appends a message to the open book and refreshes the book's preview.
    pub async fn send_message(
        &self,
        text: &str,
        kind: MessageType,
        sender: Sender,
        extras: MessageExtras,
    ) -> PortResult<Message> {
        self.send_in_thread(None, text, kind, sender, extras).await
    }

    /// Sends into the open thread. With `expected_book`, fails if another book
    /// has been opened in the meantime.
    async fn send_in_thread(
        &self,
        expected_book: Option<&str>,
        text: &str,
        kind: MessageType,
        sender: Sender,
        extras: MessageExtras,
    ) -> PortResult<Message> {
        let (tx, message, book, books, thread, remaining) = {
            let mut view = self.view.lock().await;
            let book_id = view
                .active_book_id
                .clone()
                .ok_or_else(|| PortError::NotFound("no book is open".to_string()))?;
            if let Some(expected) = expected_book {
                if expected != book_id {
                    return Err(PortError::NotFound(format!("book {} is no longer open", expected)));
                }
            }

            let message = Message::new(book_id, text, kind, sender, extras);
            let tx = OptimisticUpdate::begin("send_message", &view);
            let book = match view.append_message(message.clone()) {
                Some(book) => book,
                None => {
                    tx.rollback(&mut view);
                    return Err(PortError::NotFound(format!("book {}", message.book_id)));
                }
            };
            let thread = view.messages.clone();
            let remaining: Vec<Message> =
                thread.iter().filter(|m| m.id != message.id).cloned().collect();
            (tx, message, book, view.books.clone(), thread, remaining)
        };

        let store = self.stores.active();
        let result = async {
            self.retry
                .run("add_message", || store.write_message(&message, &thread))
                .await?;
            let written = self
                .retry
                .run("save_book", || store.write_book(&book, &books))
                .await;
            if written.is_err() {
                let undo = self
                    .retry
                    .run("delete_message", || store.remove_message(&message, &remaining))
                    .await;
                report_undo("send_message", undo);
            }
            written
        }
        .await;
        self.finish(tx, result).await?;

        debug!(
            book_id = %message.book_id,
            message_id = %message.id,
            kind = message.kind.as_str(),
            "Sent message"
        );
        Ok(message)
    }

    /// Patches a message's text or keywords.
    ///
    /// Best effort: a persistence failure is logged and the in-memory change is
    /// kept. Returns `None` when the message is not in the open thread.
    pub async fn update_message(&self, message_id: &str, patch: MessagePatch) -> Option<Message> {
        let (updated, thread) = {
            let mut view = self.view.lock().await;
            let updated = view.patch_message(message_id, &patch)?;
            (updated, view.messages.clone())
        };

        let store = self.stores.active();
        if let Err(e) = self
            .retry
            .run("update_message", || store.patch_message(message_id, &patch, &thread))
            .await
        {
            warn!(message_id, error = %e, "Failed to persist message update; keeping it in memory");
        }
        Some(updated)
    }

    /// Applies a patch to the open book.
    pub async fn update_book(&self, patch: BookPatch) -> PortResult<Book> {
        let (tx, book, books) = {
            let mut view = self.view.lock().await;
            let book_id = view
                .active_book_id
                .clone()
                .ok_or_else(|| PortError::NotFound("no book is open".to_string()))?;
            let tx = OptimisticUpdate::begin("update_book", &view);
            let book = match view.patch_book(&book_id, &patch) {
                Some(book) => book,
                None => {
                    tx.rollback(&mut view);
                    return Err(PortError::NotFound(format!("book {}", book_id)));
                }
            };
            (tx, book, view.books.clone())
        };

        let store = self.stores.active();
        let result = self
            .retry
            .run("save_book", || store.write_book(&book, &books))
            .await;
        self.finish(tx, result).await?;
        Ok(book)
    }

    pub async fn delete_book(&self, book_id: &str) -> PortResult<()> {
        let tx = {
            let mut view = self.view.lock().await;
            let tx = OptimisticUpdate::begin("delete_book", &view);
            if !view.remove_book(book_id) {
                tx.commit();
                return Err(PortError::NotFound(format!("book {}", book_id)));
            }
            tx
        };

        let store = self.stores.active();
        let result = self
            .retry
            .run("delete_book", || store.remove_book(book_id))
            .await;
        self.finish(tx, result).await?;
        info!(book_id, "Deleted book");
        Ok(())
    }

    //=====================================================================================
    // Reader Flows
    //=====================================================================================

    /// Sends the reader's text and the companion's reply in the book's voice.
    pub async fn chat_with_book(&self, text: &str) -> PortResult<(Message, Message)> {
        let (book, history) = {
            let view = self.view.lock().await;
            let book = view
                .active_book()
                .cloned()
                .ok_or_else(|| PortError::NotFound("no book is open".to_string()))?;
            let start = view.messages.len().saturating_sub(CHAT_HISTORY_LIMIT);
            (book, view.messages[start..].to_vec())
        };

        let sent = self
            .send_in_thread(
                Some(book.id.as_str()),
                text,
                MessageType::Text,
                Sender::User,
                MessageExtras::default(),
            )
            .await?;

        let reply_text = match self.companion.chat(&book, &history, text).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(
                    book_id = %book.id,
                    error = %e,
                    "Companion chat unavailable; using default reply"
                );
                FALLBACK_CHAT_REPLY.to_string()
            }
        };
        let reply = self
            .send_in_thread(
                Some(book.id.as_str()),
                &reply_text,
                MessageType::AiResponse,
                Sender::Book,
                MessageExtras::default(),
            )
            .await?;
        Ok((sent, reply))
    }

    /// Sends a quote and then tries to tag it with keywords.
    pub async fn send_quote(
        &self,
        text: &str,
        page: Option<String>,
        thought: Option<String>,
    ) -> PortResult<Message> {
        let extras = MessageExtras {
            page,
            thought,
            keywords: None,
        };
        let quote = self.send_message(text, MessageType::Quote, Sender::User, extras).await?;
        Ok(self.enrich_keywords(&quote).await.unwrap_or(quote))
    }

    /// Asks the companion for keywords and stores them on the message.
    ///
    /// Messages that already have keywords are left alone. Returns the updated
    /// message when keywords were added.
    pub async fn enrich_keywords(&self, message: &Message) -> Option<Message> {
        if message.keywords.is_some() {
            return None;
        }
        match self.companion.extract_keywords(&message.text).await {
            Ok(keywords) if !keywords.is_empty() => {
                let keywords = keywords.into_iter().take(MAX_KEYWORDS).collect();
                self.update_message(&message.id, MessagePatch::keywords(keywords))
                    .await
            }
            Ok(_) => None,
            Err(e) => {
                warn!(message_id = %message.id, error = %e, "Keyword extraction failed");
                None
            }
        }
    }

    /// Flips the open book between READING and COMPLETED and notes it in the thread.
    pub async fn toggle_status(&self) -> PortResult<Book> {
        let current = self
            .active_book()
            .await
            .ok_or_else(|| PortError::NotFound("no book is open".to_string()))?;
        let next = if current.status == ReadingStatus::Reading {
            ReadingStatus::Completed
        } else {
            ReadingStatus::Reading
        };
        self.update_book(BookPatch::status(next)).await?;

        let note = if next == ReadingStatus::Completed {
            "🎉 Finished reading this book!"
        } else {
            "📖 Started reading again."
        };
        self.send_in_thread(
            Some(current.id.as_str()),
            note,
            MessageType::System,
            Sender::User,
            MessageExtras::default(),
        )
            .await?;
        self.current_book(&current.id).await
    }

    /// Rates the open book (clamped to 0..=5) and notes it in the thread.
    pub async fn rate_book(&self, rating: u8) -> PortResult<Book> {
        let rating = rating.min(MAX_RATING);
        let book = self.update_book(BookPatch::rating(rating)).await?;
        self.send_in_thread(
            Some(book.id.as_str()),
            &format!("Rated this book {} stars! ⭐", rating),
            MessageType::System,
            Sender::User,
            MessageExtras::default(),
        )
        .await?;
        self.current_book(&book.id).await
    }

    async fn current_book(&self, book_id: &str) -> PortResult<Book> {
        self.view
            .lock()
            .await
            .book(book_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("book {}", book_id)))
    }

    //=====================================================================================
    // Backup & Diagnostics
    //=====================================================================================

    /// Snapshots the on-device journal.
    pub async fn create_backup(&self) -> PortResult<Backup> {
        self.stores.local().create_backup().await
    }

    /// Restores a backup file into the on-device journal and, when offline,
    /// reloads the view from it.
    pub async fn restore_backup_json(&self, json: &str) -> PortResult<Backup> {
        let backup = self.stores.local().restore_backup_json(json).await?;
        if self.mode() == StorageMode::Local {
            self.reload_view().await?;
        }
        Ok(backup)
    }

    async fn reload_view(&self) -> PortResult<()> {
        let local = self.stores.local();
        let profile = local.get_profile().await?;
        let books = local.get_books().await?;
        let active = self.view.lock().await.active_book_id.clone();
        let thread = match active.as_deref() {
            Some(id) if books.iter().any(|b| b.id == id) => Some(local.get_messages(id).await?),
            _ => None,
        };

        let mut view = self.view.lock().await;
        if profile.is_some() {
            view.profile = profile;
        }
        view.set_books(books);
        match (active, thread) {
            (Some(id), Some(messages)) => view.open_thread(&id, messages),
            _ => {
                view.active_book_id = None;
                view.messages.clear();
            }
        }
        Ok(())
    }

    /// Probes the remote store and classifies the result.
    pub async fn test_connection(&self) -> ConnectionReport {
        let Some(remote) = self.stores.remote() else {
            return ConnectionReport {
                success: false,
                message: "Remote store is not configured.".to_string(),
                latency: None,
            };
        };

        let started = Instant::now();
        let outcome = remote.probe_table(PROBE_TABLE).await;
        let latency = started.elapsed();

        let report = match outcome {
            Ok(()) => ConnectionReport {
                success: true,
                message: format!("Connected to the remote store in {} ms.", latency.as_millis()),
                latency: Some(latency),
            },
            Err(PortError::SchemaMissing(table)) => ConnectionReport {
                success: true,
                message: format!(
                    "Warning: the remote store is reachable but the '{}' table is missing. \
                     Run the migrations.",
                    table
                ),
                latency: Some(latency),
            },
            Err(e) => ConnectionReport {
                success: false,
                message: format!("Connection failed: {}", e),
                latency: None,
            },
        };
        info!(success = report.success, message = %report.message, "Remote connection check");
        report
    }
}
