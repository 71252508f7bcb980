//! Application configuration
//!
//! The whole configuration is one serde document stored in SQLite and
//! loaded once at startup. Command line flags override it in memory.

mod schema;
mod store;

pub use schema::{
    AppConfig, ButtonConfig, ConsoleConfig, DisplayBackend, DisplayConfig, GadgetConfig,
    HelperBackend, StorageConfig, WebConfig,
};
pub use store::ConfigStore;
