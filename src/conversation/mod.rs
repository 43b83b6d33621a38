

pub mod checkpoint;
pub mod models;
pub mod rewriter;
pub mod store;

pub use checkpoint::{CheckpointError, ConversationCheckpointer, JsonlCheckpointer};
pub use models::{ConversationThread, ConversationTurn, TurnRecord, TurnStatus};
pub use rewriter::{QueryRewriter, Resolution, RewriteAmbiguous, RewriteOutcome};
pub use store::{ConversationStore, TurnGuard};
