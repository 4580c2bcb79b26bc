pub mod facade;
pub mod mode;
pub mod retry;
pub mod store;
pub mod transaction;
pub mod view;

// Re-export the façade and its collaborators so the binary and the tests can
// assemble a journal without reaching into submodules.
pub use facade::{ConnectionReport, JournalFacade};
pub use mode::{ModeSelector, StorageMode};
pub use retry::RetryPolicy;
pub use store::{LocalJournal, RemoteJournal, StoreSelector};
pub use view::JournalView;
