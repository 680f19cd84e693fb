pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::ReveilleConfig;
pub use error::{ReveilleError, Result};
pub use events::AlarmEvent;
pub use types::*;
