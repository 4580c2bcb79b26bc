//! Test doubles shared by the journal integration tests.
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use booktalk_core::domain::{Book, Message, MessagePatch, Profile, UserIdentity};
use booktalk_core::ports::{
    BookCompanionService, KeyValueStore, PortError, PortResult, RemoteStore,
};
use journal_lib::adapters::{LocalStore, MemoryKeyValueStore};
use journal_lib::sync::{JournalFacade, ModeSelector, RetryPolicy, StoreSelector};
use uuid::Uuid;

//=========================================================================================
// Remote Store
//=========================================================================================

#[derive(Default)]
struct RemoteRows {
    profile: Option<Profile>,
    books: Vec<Book>,
    messages: Vec<Message>,
}

/// A remote store kept in memory with switches for the failure modes the
/// façade has to cope with.
pub struct MemoryRemoteStore {
    user: Mutex<Option<UserIdentity>>,
    rows: Mutex<RemoteRows>,
    missing_tables: Mutex<HashSet<String>>,
    unreachable: AtomicBool,
    fail_profile: AtomicBool,
    fail_book_writes: AtomicBool,
    fail_message_writes: AtomicBool,
    fail_message_updates: AtomicBool,
    transient_book_failures: AtomicUsize,
    book_writes: AtomicUsize,
}

impl MemoryRemoteStore {
    pub fn signed_in() -> Arc<Self> {
        Arc::new(Self {
            user: Mutex::new(Some(UserIdentity {
                user_id: Uuid::new_v4(),
                email: Some("reader@example.com".to_string()),
            })),
            rows: Mutex::new(RemoteRows::default()),
            missing_tables: Mutex::new(HashSet::new()),
            unreachable: AtomicBool::new(false),
            fail_profile: AtomicBool::new(false),
            fail_book_writes: AtomicBool::new(false),
            fail_message_writes: AtomicBool::new(false),
            fail_message_updates: AtomicBool::new(false),
            transient_book_failures: AtomicUsize::new(0),
            book_writes: AtomicUsize::new(0),
        })
    }

    pub fn set_unreachable(&self, value: bool) {
        self.unreachable.store(value, Ordering::SeqCst);
    }

    pub fn fail_profile(&self, value: bool) {
        self.fail_profile.store(value, Ordering::SeqCst);
    }

    pub fn fail_book_writes(&self, value: bool) {
        self.fail_book_writes.store(value, Ordering::SeqCst);
    }

    pub fn fail_message_writes(&self, value: bool) {
        self.fail_message_writes.store(value, Ordering::SeqCst);
    }

    pub fn fail_message_updates(&self, value: bool) {
        self.fail_message_updates.store(value, Ordering::SeqCst);
    }

    /// The next `count` book writes fail with a transient error.
    pub fn fail_next_book_writes(&self, count: usize) {
        self.transient_book_failures.store(count, Ordering::SeqCst);
    }

    pub fn drop_table(&self, table: &str) {
        self.missing_tables.lock().unwrap().insert(table.to_string());
    }

    pub fn book_writes(&self) -> usize {
        self.book_writes.load(Ordering::SeqCst)
    }

    pub fn stored_profile(&self) -> Option<Profile> {
        self.rows.lock().unwrap().profile.clone()
    }

    pub fn stored_books(&self) -> Vec<Book> {
        self.rows.lock().unwrap().books.clone()
    }

    pub fn stored_messages(&self, book_id: &str) -> Vec<Message> {
        self.rows
            .lock()
            .unwrap()
            .messages
            .iter()
            .filter(|m| m.book_id == book_id)
            .cloned()
            .collect()
    }

    pub fn is_signed_in(&self) -> bool {
        self.user.lock().unwrap().is_some()
    }

    fn check(&self, table: &str) -> PortResult<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(PortError::RemoteUnavailable("connection refused".to_string()));
        }
        if self.missing_tables.lock().unwrap().contains(table) {
            return Err(PortError::SchemaMissing(table.to_string()));
        }
        if self.user.lock().unwrap().is_none() {
            return Err(PortError::NotAuthenticated);
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn get_current_user(&self) -> PortResult<Option<UserIdentity>> {
        Ok(self.user.lock().unwrap().clone())
    }

    async fn get_profile(&self) -> PortResult<Option<Profile>> {
        self.check("profiles")?;
        if self.fail_profile.load(Ordering::SeqCst) {
            return Err(PortError::SchemaMissing("profiles".to_string()));
        }
        Ok(self.rows.lock().unwrap().profile.clone())
    }

    async fn save_profile(&self, profile: &Profile) -> PortResult<()> {
        self.check("profiles")?;
        self.rows.lock().unwrap().profile = Some(profile.clone());
        Ok(())
    }

    async fn get_books(&self) -> PortResult<Vec<Book>> {
        self.check("books")?;
        Ok(self.rows.lock().unwrap().books.clone())
    }

    async fn save_book(&self, book: &Book) -> PortResult<()> {
        self.check("books")?;
        self.book_writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_book_writes.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("row rejected".to_string()));
        }
        let pending = self.transient_book_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.transient_book_failures.store(pending - 1, Ordering::SeqCst);
            return Err(PortError::RemoteUnavailable("timeout".to_string()));
        }
        let mut rows = self.rows.lock().unwrap();
        match rows.books.iter_mut().find(|b| b.id == book.id) {
            Some(existing) => *existing = book.clone(),
            None => rows.books.push(book.clone()),
        }
        Ok(())
    }

    async fn delete_book(&self, book_id: &str) -> PortResult<()> {
        self.check("books")?;
        let mut rows = self.rows.lock().unwrap();
        rows.books.retain(|b| b.id != book_id);
        rows.messages.retain(|m| m.book_id != book_id);
        Ok(())
    }

    async fn get_messages(&self, book_id: &str) -> PortResult<Vec<Message>> {
        self.check("messages")?;
        Ok(self.stored_messages(book_id))
    }

    async fn add_message(&self, message: &Message) -> PortResult<()> {
        self.check("messages")?;
        if self.fail_message_writes.load(Ordering::SeqCst) {
            return Err(PortError::RemoteUnavailable("connection reset".to_string()));
        }
        let mut rows = self.rows.lock().unwrap();
        if rows.messages.iter().any(|m| m.id == message.id) {
            return Err(PortError::Conflict(format!("message {}", message.id)));
        }
        rows.messages.push(message.clone());
        Ok(())
    }

    async fn update_message(&self, message_id: &str, patch: &MessagePatch) -> PortResult<()> {
        self.check("messages")?;
        if self.fail_message_updates.load(Ordering::SeqCst) {
            return Err(PortError::RemoteUnavailable("connection reset".to_string()));
        }
        let mut rows = self.rows.lock().unwrap();
        if let Some(message) = rows.messages.iter_mut().find(|m| m.id == message_id) {
            patch.apply(message);
        }
        Ok(())
    }

    async fn delete_message(&self, message_id: &str) -> PortResult<()> {
        self.check("messages")?;
        self.rows.lock().unwrap().messages.retain(|m| m.id != message_id);
        Ok(())
    }

    async fn probe_table(&self, table: &str) -> PortResult<()> {
        self.check(table)
    }

    async fn sign_out(&self) -> PortResult<()> {
        *self.user.lock().unwrap() = None;
        Ok(())
    }
}

//=========================================================================================
// Key-value Store
//=========================================================================================

/// An in-memory key-value store whose writes can be switched off.
#[derive(Default)]
pub struct FlakyKeyValueStore {
    inner: MemoryKeyValueStore,
    fail_writes: AtomicBool,
    failing_prefix: Mutex<Option<String>>,
}

impl FlakyKeyValueStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_writes(&self, value: bool) {
        self.fail_writes.store(value, Ordering::SeqCst);
    }

    /// Makes `set` fail for keys starting with `prefix`; removals still work.
    pub fn fail_sets_for(&self, prefix: &str) {
        *self.failing_prefix.lock().unwrap() = Some(prefix.to_string());
    }

    fn set_fails(&self, key: &str) -> bool {
        self.fail_writes.load(Ordering::SeqCst)
            || self
                .failing_prefix
                .lock()
                .unwrap()
                .as_deref()
                .is_some_and(|prefix| key.starts_with(prefix))
    }
}

#[async_trait]
impl KeyValueStore for FlakyKeyValueStore {
    async fn get(&self, key: &str) -> PortResult<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> PortResult<()> {
        if self.set_fails(key) {
            return Err(PortError::Unexpected("quota exceeded".to_string()));
        }
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> PortResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("quota exceeded".to_string()));
        }
        self.inner.remove(key).await
    }
}

//=========================================================================================
// Companion
//=========================================================================================

/// A companion with canned answers. `None` makes the call fail.
#[derive(Default)]
pub struct ScriptedCompanion {
    pub welcome: Option<String>,
    pub reply: Option<String>,
    pub keywords: Option<Vec<String>>,
    history_sizes: Mutex<Vec<usize>>,
}

impl ScriptedCompanion {
    pub fn offline() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn answering(welcome: &str, reply: &str, keywords: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            welcome: Some(welcome.to_string()),
            reply: Some(reply.to_string()),
            keywords: Some(keywords.iter().map(|k| k.to_string()).collect()),
            history_sizes: Mutex::new(Vec::new()),
        })
    }

    /// How many history messages each `chat` call received.
    pub fn history_sizes(&self) -> Vec<usize> {
        self.history_sizes.lock().unwrap().clone()
    }
}

fn unavailable() -> PortError {
    PortError::RemoteUnavailable("companion offline".to_string())
}

#[async_trait]
impl BookCompanionService for ScriptedCompanion {
    async fn generate_welcome(&self, _title: &str, _author: &str) -> PortResult<String> {
        self.welcome.clone().ok_or_else(unavailable)
    }

    async fn chat(
        &self,
        _book: &Book,
        history: &[Message],
        _user_text: &str,
    ) -> PortResult<String> {
        self.history_sizes.lock().unwrap().push(history.len());
        self.reply.clone().ok_or_else(unavailable)
    }

    async fn extract_keywords(&self, _text: &str) -> PortResult<Vec<String>> {
        self.keywords.clone().ok_or_else(unavailable)
    }
}

//=========================================================================================
// Assembly
//=========================================================================================

pub fn local_journal(
    kv: Arc<dyn KeyValueStore>,
    companion: Arc<dyn BookCompanionService>,
) -> JournalFacade {
    let stores = StoreSelector::new(Arc::new(ModeSelector::new(false)), LocalStore::new(kv), None);
    JournalFacade::new(stores, companion, RetryPolicy::no_retry())
}

pub fn cloud_journal(
    remote: Arc<MemoryRemoteStore>,
    companion: Arc<dyn BookCompanionService>,
    retry: RetryPolicy,
) -> (JournalFacade, Arc<MemoryKeyValueStore>) {
    let kv = Arc::new(MemoryKeyValueStore::new());
    let stores = StoreSelector::new(
        Arc::new(ModeSelector::new(true)),
        LocalStore::new(kv.clone()),
        Some(remote as Arc<dyn RemoteStore>),
    );
    (JournalFacade::new(stores, companion, retry), kv)
}

pub fn fast_retry(attempts: u32) -> RetryPolicy {
    RetryPolicy::new(attempts, Duration::from_millis(1))
}
