pub mod purchase;

pub use purchase::{render, IntentError, PresentationAdapter, UserIntent, UserMessage};
