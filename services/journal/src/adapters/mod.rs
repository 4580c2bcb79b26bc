pub mod companion_llm;
pub mod kv;
pub mod local;
pub mod remote;

pub use companion_llm::{OfflineCompanion, OpenAiCompanionAdapter};
pub use kv::{FileKeyValueStore, MemoryKeyValueStore};
pub use local::LocalStore;
pub use remote::{PgRemoteStore, StaticSession};
