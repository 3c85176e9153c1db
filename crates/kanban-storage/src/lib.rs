//! Storage backends for the board: the local key-value file, the blocking
//! API client, and the SQLite store the hub serves from.

pub mod config;
pub mod db;
pub mod local;
pub mod remote;

pub use config::{ClientConfig, StorageMode};
pub use db::{BoardDb, DbError, User, BOARD_SCHEMA_VERSION};
pub use local::LocalStore;
pub use remote::{RemoteStorage, RemoteUser, DEFAULT_API_URL};
