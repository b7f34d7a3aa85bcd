// Re-export needed modules for testing
pub mod messaging; // Conversation directory, thread loader, message dispatcher
pub mod models;

// Re-export main types for convenience
pub use messaging::{ChatSession, MessagingError};
pub use models::*;
