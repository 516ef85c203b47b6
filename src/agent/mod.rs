pub mod identity;
pub mod intent;
pub mod turn;

pub use intent::IntentDetector;
pub use turn::{ChatMessage, ConversationTurn, TurnOutcome};
