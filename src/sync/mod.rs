pub mod debounce;
pub mod engine;
pub mod state;

pub use debounce::Debouncer;
pub use engine::ChatsEngine;
pub use state::{ChatsAction, ChatsState};
