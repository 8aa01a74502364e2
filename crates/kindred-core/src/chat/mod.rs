//! Chat services: session resolution, conversation log, turn coordination.

pub mod coordinator;
pub mod session;

pub use coordinator::{ChatCoordinator, TurnConfig, TurnEvent, TurnReply, TurnRequest};
pub use session::{ConversationLog, SessionStore};
