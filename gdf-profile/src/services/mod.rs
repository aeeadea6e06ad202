//! External collaborators: account store and Generation Service

pub mod account_store;
pub mod generation;

pub use account_store::{AccountStore, SupabaseAccountStore};
pub use generation::{GeminiClient, GenerationOutput, GenerationService, ModelConfig};
