pub mod domain;
pub mod ports;

pub use domain::{
    Backup, Book, BookPatch, Message, MessageExtras, MessagePatch, MessageType, Profile,
    ProfileStats, ReadingStatus, Sender, UserIdentity,
};
pub use ports::{
    BookCompanionService, JournalStore, KeyValueStore, PortError, PortResult, RemoteStore,
    SessionProvider,
};
