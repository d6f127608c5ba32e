pub mod loader;
pub mod schema;

pub use loader::{identity_at, load_config, load_config_from_str};
pub use schema::{RetryConfig, SourceConfig, SyncConfig};
