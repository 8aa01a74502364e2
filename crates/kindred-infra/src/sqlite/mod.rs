//! SQLite persistence layer.

pub mod conversation;
pub mod pool;
pub mod session;
pub mod user;

pub use conversation::SqliteConversationRepository;
pub use pool::DatabasePool;
pub use session::SqliteSessionRepository;
pub use user::SqliteUserRepository;
