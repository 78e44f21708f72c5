//! pathmap core library.
//!
//! Translates between URL traversal path segments and database object
//! identifiers: the [`Mapper`] family, the UUID slug codec, the traversal
//! fall-through boundary, configuration, and a SQLite object store for users
//! and groups.

pub mod config;
pub mod db;
pub mod errors;
pub mod mapper;
pub mod models;
pub mod slug;
pub mod traversal;

// Re-exports for convenience.
pub use config::AppConfig;
pub use db::Database;
pub use mapper::{Base64UuidMapper, IdMapper, Mapped, Mapper, MapperOverrides, ObjectId};
pub use traversal::{resolve_segment, MapperRegistry, ObjectLookup, Resolved};
