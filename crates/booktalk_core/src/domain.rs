//! crates/booktalk_core/src/domain.rs
//!
//! Defines the pure, core data structures of the reading journal.
//!
//! The `serde` attributes on these structs are the local (on-device) mapping:
//! field names are kept as camelCase and timestamps are epoch milliseconds, which
//! is also the layout of the backup file. The relational mapping lives next to
//! the remote adapter, so a new field has to be added in both places.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current version written into every backup.
pub const BACKUP_VERSION: u32 = 1;

/// Highest rating a book can carry.
pub const MAX_RATING: u8 = 5;

/// Returns the current time truncated to millisecond precision.
///
/// Every persisted timestamp goes through epoch milliseconds, so values created in
/// memory are truncated up front to survive a storage round-trip unchanged.
pub fn timestamp_now() -> DateTime<Utc> {
    let now = Utc::now();
    now.duration_trunc(Duration::milliseconds(1)).unwrap_or(now)
}

/// Generates a fresh entity id.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

//=========================================================================================
// Enumerations
//=========================================================================================

/// Raised when a stored enum column holds a value this build does not know.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown {kind} value: '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReadingStatus {
    ToRead,
    Reading,
    Completed,
}

impl ReadingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingStatus::ToRead => "TO_READ",
            ReadingStatus::Reading => "READING",
            ReadingStatus::Completed => "COMPLETED",
        }
    }
}

impl FromStr for ReadingStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TO_READ" => Ok(ReadingStatus::ToRead),
            "READING" => Ok(ReadingStatus::Reading),
            "COMPLETED" => Ok(ReadingStatus::Completed),
            other => Err(UnknownVariant {
                kind: "reading status",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Text,
    Quote,
    Image,
    System,
    /// A reply written by the AI companion on behalf of the book.
    AiResponse,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "TEXT",
            MessageType::Quote => "QUOTE",
            MessageType::Image => "IMAGE",
            MessageType::System => "SYSTEM",
            MessageType::AiResponse => "AI_RESPONSE",
        }
    }
}

impl FromStr for MessageType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TEXT" => Ok(MessageType::Text),
            "QUOTE" => Ok(MessageType::Quote),
            "IMAGE" => Ok(MessageType::Image),
            "SYSTEM" => Ok(MessageType::System),
            "AI_RESPONSE" => Ok(MessageType::AiResponse),
            other => Err(UnknownVariant {
                kind: "message type",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Book,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Book => "book",
        }
    }
}

impl FromStr for Sender {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Sender::User),
            "book" => Ok(Sender::Book),
            other => Err(UnknownVariant {
                kind: "sender",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//=========================================================================================
// Entities
//=========================================================================================

/// The identity of an authenticated remote user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub user_id: Uuid,
    pub email: Option<String>,
}

/// The reader's profile. One per session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub name: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub joined_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl Profile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            joined_at: timestamp_now(),
            avatar_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: String,
    pub title: String,
    pub author: String,
    /// An image URL or an embedded data URI.
    pub cover_url: String,
    pub status: ReadingStatus,
    pub rating: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub last_message_time: Option<DateTime<Utc>>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub added_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl Book {
    /// Creates a book that has not been started yet.
    pub fn new(
        title: impl Into<String>,
        author: impl Into<String>,
        cover_url: impl Into<String>,
    ) -> Self {
        let now = timestamp_now();
        Self {
            id: new_id(),
            title: title.into(),
            author: author.into(),
            cover_url: cover_url.into(),
            status: ReadingStatus::ToRead,
            rating: 0,
            last_message: None,
            last_message_time: Some(now),
            added_at: now,
            summary: None,
        }
    }

    /// Refreshes the denormalized preview fields from the newest message.
    pub fn apply_preview(&mut self, message: &Message) {
        self.last_message = Some(message.preview_text());
        self.last_message_time = Some(message.timestamp);
    }

    /// The time used to order the book list, newest activity first.
    pub fn recency(&self) -> DateTime<Utc> {
        self.last_message_time.unwrap_or(self.added_at)
    }
}

/// Sorts books by most recent activity, newest first.
pub fn sort_by_recency(books: &mut [Book]) {
    books.sort_by(|a, b| b.recency().cmp(&a.recency()));
}

/// A partial update of a book's user-editable fields.
///
/// The id and the preview fields are deliberately absent: the former is the
/// identity and the latter are only ever derived from messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookPatch {
    pub title: Option<String>,
    pub author: Option<String>,
    pub cover_url: Option<String>,
    pub status: Option<ReadingStatus>,
    pub rating: Option<u8>,
    pub summary: Option<String>,
}

impl BookPatch {
    pub fn status(status: ReadingStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn rating(rating: u8) -> Self {
        Self {
            rating: Some(rating),
            ..Self::default()
        }
    }

    pub fn apply(&self, book: &mut Book) {
        if let Some(title) = &self.title {
            book.title = title.clone();
        }
        if let Some(author) = &self.author {
            book.author = author.clone();
        }
        if let Some(cover_url) = &self.cover_url {
            book.cover_url = cover_url.clone();
        }
        if let Some(status) = self.status {
            book.status = status;
        }
        if let Some(rating) = self.rating {
            book.rating = rating.min(MAX_RATING);
        }
        if let Some(summary) = &self.summary {
            book.summary = Some(summary.clone());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub book_id: String,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub sender: Sender,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
}

/// Optional fields attached to a message when it is sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageExtras {
    pub page: Option<String>,
    pub thought: Option<String>,
    pub keywords: Option<Vec<String>>,
}

impl Message {
    pub fn new(
        book_id: impl Into<String>,
        text: impl Into<String>,
        kind: MessageType,
        sender: Sender,
        extras: MessageExtras,
    ) -> Self {
        Self {
            id: new_id(),
            book_id: book_id.into(),
            text: text.into(),
            kind,
            timestamp: timestamp_now(),
            sender,
            page: extras.page,
            thought: extras.thought,
            keywords: extras.keywords,
        }
    }

    /// The text shown in the book list for this message.
    pub fn preview_text(&self) -> String {
        preview_text(self.kind, &self.text)
    }
}

pub fn preview_text(kind: MessageType, text: &str) -> String {
    match kind {
        MessageType::Image => "Sent an image".to_string(),
        MessageType::Quote => format!("Quote: {}", text),
        _ => text.to_string(),
    }
}

/// The only fields of a message that may change after it was written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePatch {
    pub text: Option<String>,
    pub keywords: Option<Vec<String>>,
}

impl MessagePatch {
    pub fn keywords(keywords: Vec<String>) -> Self {
        Self {
            text: None,
            keywords: Some(keywords),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.keywords.is_none()
    }

    pub fn apply(&self, message: &mut Message) {
        if let Some(text) = &self.text {
            message.text = text.clone();
        }
        if let Some(keywords) = &self.keywords {
            message.keywords = Some(keywords.clone());
        }
    }
}

//=========================================================================================
// Derived views and snapshots
//=========================================================================================

/// Reading statistics shown on the profile page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProfileStats {
    pub reading: usize,
    pub completed: usize,
    /// Books that carry a rating.
    pub reviewed: usize,
}

impl ProfileStats {
    pub fn from_books(books: &[Book]) -> Self {
        books.iter().fold(Self::default(), |mut stats, book| {
            match book.status {
                ReadingStatus::Reading => stats.reading += 1,
                ReadingStatus::Completed => stats.completed += 1,
                ReadingStatus::ToRead => {}
            }
            if book.rating > 0 {
                stats.reviewed += 1;
            }
            stats
        })
    }
}

/// A whole-dataset snapshot, serialized as the backup file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backup {
    #[serde(default = "default_backup_version")]
    pub version: u32,
    #[serde(default, with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub profile: Option<Profile>,
    pub books: Vec<Book>,
    pub messages: BTreeMap<String, Vec<Message>>,
}

fn default_backup_version() -> u32 {
    BACKUP_VERSION
}

impl Backup {
    /// Parses a backup file. `books` and `messages` are required.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn message_count(&self) -> usize {
        self.messages.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(kind: MessageType, text: &str) -> Message {
        Message::new("book-1", text, kind, Sender::User, MessageExtras::default())
    }

    #[test]
    fn preview_text_formats_images_and_quotes() {
        assert_eq!(message(MessageType::Image, "data:...").preview_text(), "Sent an image");
        assert_eq!(message(MessageType::Quote, "So it goes.").preview_text(), "Quote: So it goes.");
        assert_eq!(message(MessageType::Text, "Chapter 3 done").preview_text(), "Chapter 3 done");
        assert_eq!(message(MessageType::AiResponse, "Indeed").preview_text(), "Indeed");
    }

    #[test]
    fn new_book_starts_unread_and_unrated() {
        let book = Book::new("Dune", "Frank Herbert", "");
        assert_eq!(book.status, ReadingStatus::ToRead);
        assert_eq!(book.rating, 0);
        assert_eq!(book.last_message, None);
        assert_eq!(book.last_message_time, Some(book.added_at));
    }

    #[test]
    fn book_patch_clamps_rating() {
        let mut book = Book::new("Dune", "Frank Herbert", "");
        BookPatch::rating(9).apply(&mut book);
        assert_eq!(book.rating, MAX_RATING);
    }

    #[test]
    fn keyword_patch_leaves_other_fields_alone() {
        let mut quote = Message::new(
            "book-1",
            "Fear is the mind-killer.",
            MessageType::Quote,
            Sender::User,
            MessageExtras {
                page: Some("42".into()),
                thought: Some("chills".into()),
                keywords: None,
            },
        );
        let before = quote.clone();

        MessagePatch::keywords(vec!["Fear".into()]).apply(&mut quote);

        assert_eq!(quote.keywords, Some(vec!["Fear".to_string()]));
        assert_eq!(quote.text, before.text);
        assert_eq!(quote.page, before.page);
        assert_eq!(quote.thought, before.thought);
        assert_eq!(quote.timestamp, before.timestamp);
    }

    #[test]
    fn local_mapping_uses_camel_case_and_millis() {
        let book = Book::new("Dune", "Frank Herbert", "cover.png");
        let value = serde_json::to_value(&book).unwrap();

        assert_eq!(value["coverUrl"], "cover.png");
        assert_eq!(value["status"], "TO_READ");
        assert_eq!(value["addedAt"], book.added_at.timestamp_millis());
        assert!(value.get("summary").is_none());

        let msg = message(MessageType::AiResponse, "hi");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "AI_RESPONSE");
        assert_eq!(value["bookId"], "book-1");
        assert_eq!(value["sender"], "user");
    }

    #[test]
    fn enum_columns_parse_back() {
        for status in [ReadingStatus::ToRead, ReadingStatus::Reading, ReadingStatus::Completed] {
            assert_eq!(status.as_str().parse::<ReadingStatus>(), Ok(status));
        }
        assert_eq!("AI_RESPONSE".parse::<MessageType>(), Ok(MessageType::AiResponse));
        assert!("shouting".parse::<Sender>().is_err());
    }

    #[test]
    fn backup_requires_books_and_messages() {
        assert!(Backup::from_json(r#"{"version":1,"messages":{}}"#).is_err());
        assert!(Backup::from_json(r#"{"version":1,"books":[]}"#).is_err());

        let backup = Backup::from_json(r#"{"books":[],"messages":{}}"#).unwrap();
        assert_eq!(backup.version, BACKUP_VERSION);
        assert!(backup.profile.is_none());
    }

    #[test]
    fn stats_count_reading_completed_and_rated_books() {
        let mut reading = Book::new("A", "a", "");
        reading.status = ReadingStatus::Reading;
        let mut done = Book::new("B", "b", "");
        done.status = ReadingStatus::Completed;
        done.rating = 4;
        let unread = Book::new("C", "c", "");

        let stats = ProfileStats::from_books(&[reading, done, unread]);
        assert_eq!(
            stats,
            ProfileStats {
                reading: 1,
                completed: 1,
                reviewed: 1
            }
        );
    }
}
