pub mod audit;
pub mod backend;
pub mod config;
pub mod errors;
pub mod logging;
pub mod notes;
pub mod notifications;
pub mod poller;
pub mod store;

pub use config::Config;
pub use errors::{Error, Result};
pub use store::NotesStore;
