pub mod artifacts;
pub mod connection;
pub mod json_store;

pub use artifacts::FsArtifactStore;
pub use connection::{open, open_with_settings, StoreSettings};
pub use json_store::JsonFileStore;
