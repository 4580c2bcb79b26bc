//! services/journal/src/sync/store.rs
//!
//! The two variants of the `JournalStore` port and the selector that picks one
//! according to the session's storage mode.

use std::sync::Arc;

use async_trait::async_trait;
use booktalk_core::domain::{Book, Message, MessagePatch, Profile};
use booktalk_core::ports::{JournalStore, PortResult, RemoteStore};

use super::mode::{ModeSelector, StorageMode};
use crate::adapters::local::LocalStore;

//=========================================================================================
// Local Variant
//=========================================================================================

/// Persists whole collections into the on-device store.
pub struct LocalJournal {
    store: LocalStore,
}

impl LocalJournal {
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }
}

#[async_trait]
impl JournalStore for LocalJournal {
    async fn load_profile(&self) -> PortResult<Option<Profile>> {
        self.store.get_profile().await
    }

    async fn save_profile(&self, profile: &Profile) -> PortResult<()> {
        self.store.session_id().await?;
        self.store.save_profile(profile).await
    }

    async fn load_books(&self) -> PortResult<Vec<Book>> {
        self.store.get_books().await
    }

    async fn load_messages(&self, book_id: &str) -> PortResult<Vec<Message>> {
        self.store.get_messages(book_id).await
    }

    async fn write_book(&self, _book: &Book, books: &[Book]) -> PortResult<()> {
        self.store.save_books(books).await
    }

    async fn write_message(&self, message: &Message, thread: &[Message]) -> PortResult<()> {
        self.store.save_messages(&message.book_id, thread).await
    }

    async fn patch_message(
        &self,
        _message_id: &str,
        _patch: &MessagePatch,
        thread: &[Message],
    ) -> PortResult<()> {
        // The thread already carries the patched message.
        match thread.first() {
            Some(first) => self.store.save_messages(&first.book_id, thread).await,
            None => Ok(()),
        }
    }

    async fn remove_message(&self, message: &Message, remaining: &[Message]) -> PortResult<()> {
        self.store.save_messages(&message.book_id, remaining).await
    }

    async fn remove_book(&self, book_id: &str) -> PortResult<()> {
        self.store.delete_book_data(book_id).await
    }

    async fn end_session(&self) -> PortResult<()> {
        self.store.clear_session().await
    }
}

//=========================================================================================
// Remote Variant
//=========================================================================================

/// Writes individual rows through the remote adapter.
pub struct RemoteJournal {
    remote: Arc<dyn RemoteStore>,
}

impl RemoteJournal {
    pub fn new(remote: Arc<dyn RemoteStore>) -> Self {
        Self { remote }
    }
}

#[async_trait]
impl JournalStore for RemoteJournal {
    async fn load_profile(&self) -> PortResult<Option<Profile>> {
        self.remote.get_profile().await
    }

    async fn save_profile(&self, profile: &Profile) -> PortResult<()> {
        self.remote.save_profile(profile).await
    }

    async fn load_books(&self) -> PortResult<Vec<Book>> {
        self.remote.get_books().await
    }

    async fn load_messages(&self, book_id: &str) -> PortResult<Vec<Message>> {
        self.remote.get_messages(book_id).await
    }

    async fn write_book(&self, book: &Book, _books: &[Book]) -> PortResult<()> {
        self.remote.save_book(book).await
    }

    async fn write_message(&self, message: &Message, _thread: &[Message]) -> PortResult<()> {
        self.remote.add_message(message).await
    }

    async fn patch_message(
        &self,
        message_id: &str,
        patch: &MessagePatch,
        _thread: &[Message],
    ) -> PortResult<()> {
        self.remote.update_message(message_id, patch).await
    }

    async fn remove_message(&self, message: &Message, _remaining: &[Message]) -> PortResult<()> {
        self.remote.delete_message(&message.id).await
    }

    async fn remove_book(&self, book_id: &str) -> PortResult<()> {
        self.remote.delete_book(book_id).await
    }

    async fn end_session(&self) -> PortResult<()> {
        self.remote.sign_out().await
    }
}

//=========================================================================================
// Selector
//=========================================================================================

/// Hands out the store that is authoritative under the current mode.
pub struct StoreSelector {
    mode: Arc<ModeSelector>,
    local: Arc<LocalJournal>,
    remote: Option<Arc<dyn RemoteStore>>,
    remote_journal: Option<Arc<RemoteJournal>>,
}

impl StoreSelector {
    /// A selector without a remote store is forced into `Local`.
    pub fn new(
        mode: Arc<ModeSelector>,
        local: LocalStore,
        remote: Option<Arc<dyn RemoteStore>>,
    ) -> Self {
        if remote.is_none() {
            mode.downgrade("no remote store configured");
        }
        let remote_journal = remote
            .as_ref()
            .map(|r| Arc::new(RemoteJournal::new(Arc::clone(r))));
        Self {
            mode,
            local: Arc::new(LocalJournal::new(local)),
            remote,
            remote_journal,
        }
    }

    pub fn mode(&self) -> StorageMode {
        self.mode.mode()
    }

    pub fn mode_selector(&self) -> &ModeSelector {
        &self.mode
    }

    pub fn active(&self) -> Arc<dyn JournalStore> {
        match (&self.remote_journal, self.mode.is_cloud()) {
            (Some(remote), true) => remote.clone() as Arc<dyn JournalStore>,
            _ => self.local.clone() as Arc<dyn JournalStore>,
        }
    }

    /// The on-device store, regardless of mode.
    pub fn local(&self) -> &LocalStore {
        self.local.store()
    }

    /// The remote adapter, regardless of mode.
    pub fn remote(&self) -> Option<&Arc<dyn RemoteStore>> {
        self.remote.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::kv::MemoryKeyValueStore;
    use booktalk_core::domain::{MessageExtras, MessageType, Sender};

    fn local() -> LocalStore {
        LocalStore::new(Arc::new(MemoryKeyValueStore::new()))
    }

    #[test]
    fn missing_remote_forces_local_mode() {
        let mode = Arc::new(ModeSelector::new(true));
        let selector = StoreSelector::new(mode, local(), None);
        assert_eq!(selector.mode(), StorageMode::Local);
        assert!(selector.remote().is_none());
    }

    #[tokio::test]
    async fn local_message_removal_keeps_the_rest_of_the_thread() {
        let journal = LocalJournal::new(local());
        let book = Book::new("Dune", "Frank Herbert", "");
        let kept = Message::new(
            &book.id,
            "one",
            MessageType::Text,
            Sender::User,
            MessageExtras::default(),
        );
        let taken = Message::new(
            &book.id,
            "two",
            MessageType::Text,
            Sender::User,
            MessageExtras::default(),
        );
        journal
            .write_message(&taken, &[kept.clone(), taken.clone()])
            .await
            .unwrap();

        journal.remove_message(&taken, std::slice::from_ref(&kept)).await.unwrap();

        assert_eq!(journal.load_messages(&book.id).await.unwrap(), vec![kept]);
    }

    #[tokio::test]
    async fn local_variant_writes_whole_collections() {
        let journal = LocalJournal::new(local());
        let book = Book::new("Dune", "Frank Herbert", "");
        let first = Message::new(
            &book.id,
            "one",
            MessageType::Text,
            Sender::User,
            MessageExtras::default(),
        );
        let second = Message::new(
            &book.id,
            "two",
            MessageType::Text,
            Sender::User,
            MessageExtras::default(),
        );

        journal.write_book(&book, std::slice::from_ref(&book)).await.unwrap();
        journal
            .write_message(&second, &[first.clone(), second.clone()])
            .await
            .unwrap();

        assert_eq!(journal.load_books().await.unwrap(), vec![book.clone()]);
        assert_eq!(journal.load_messages(&book.id).await.unwrap(), vec![first, second]);
    }

    #[tokio::test]
    async fn local_profile_save_creates_a_session_id() {
        let journal = LocalJournal::new(local());
        journal.save_profile(&Profile::new("Ada")).await.unwrap();
        let id = journal.store().session_id().await.unwrap();
        assert_eq!(journal.store().session_id().await.unwrap(), id);
    }
}
