//! services/journal/src/sync/view.rs
//!
//! The in-memory state the UI renders. Only the sync façade mutates it.

use booktalk_core::domain::{sort_by_recency, Book, BookPatch, Message, MessagePatch, Profile};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JournalView {
    pub profile: Option<Profile>,
    /// Ordered by recency, newest first.
    pub books: Vec<Book>,
    /// The book whose thread is loaded into `messages`.
    pub active_book_id: Option<String>,
    /// The active book's messages, oldest first.
    pub messages: Vec<Message>,
}

impl JournalView {
    pub fn book(&self, book_id: &str) -> Option<&Book> {
        self.books.iter().find(|b| b.id == book_id)
    }

    pub fn active_book(&self) -> Option<&Book> {
        self.active_book_id.as_deref().and_then(|id| self.book(id))
    }

    pub fn set_books(&mut self, mut books: Vec<Book>) {
        sort_by_recency(&mut books);
        self.books = books;
    }

    /// Makes `book_id` the active book and loads its thread.
    pub fn open_thread(&mut self, book_id: &str, mut messages: Vec<Message>) {
        messages.sort_by_key(|m| m.timestamp);
        self.active_book_id = Some(book_id.to_string());
        self.messages = messages;
    }

    /// New books go to the top of the list.
    pub fn insert_book(&mut self, book: Book) {
        self.books.insert(0, book);
    }

    /// Records a new message: appends it to the open thread when it belongs to
    /// the active book and refreshes its book's preview fields.
    ///
    /// Returns the updated book, or `None` when the book is unknown.
    pub fn append_message(&mut self, message: Message) -> Option<Book> {
        let book = self.books.iter_mut().find(|b| b.id == message.book_id)?;
        book.apply_preview(&message);
        let book = book.clone();
        if self.active_book_id.as_deref() == Some(message.book_id.as_str()) {
            self.messages.push(message);
        }
        Some(book)
    }

    /// Returns the patched message, or `None` when the id is not in the open thread.
    pub fn patch_message(&mut self, message_id: &str, patch: &MessagePatch) -> Option<Message> {
        let message = self.messages.iter_mut().find(|m| m.id == message_id)?;
        patch.apply(message);
        Some(message.clone())
    }

    pub fn patch_book(&mut self, book_id: &str, patch: &BookPatch) -> Option<Book> {
        let book = self.books.iter_mut().find(|b| b.id == book_id)?;
        patch.apply(book);
        Some(book.clone())
    }

    /// Removes a book and, if it was open, closes its thread.
    pub fn remove_book(&mut self, book_id: &str) -> bool {
        let before = self.books.len();
        self.books.retain(|b| b.id != book_id);
        if self.active_book_id.as_deref() == Some(book_id) {
            self.active_book_id = None;
            self.messages.clear();
        }
        self.books.len() != before
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
