//! Client-resident entity cache for data-driven UIs.
//!
//! Holds typed business entities fetched from a server, serves them to UI
//! components without further round-trips, persists them across sessions and
//! resolves relationship paths between cached entity sets.
//!
//! Three pieces cooperate:
//! - [`PathResolver`] walks dotted relationship paths (`SupplierID`,
//!   `OrderEntities.Total`) across any [`TypeCache`] and memoizes display
//!   values.
//! - [`Snapshot`] wraps a point-in-time entity batch with sorted,
//!   binary-searchable id lookup.
//! - [`LocalStore`] is the durable session cache: entity CRUD, query-result
//!   caching and merging, and version-invalidated persistence against a
//!   [`KvStorage`] namespace.
//!
//! UI generation, command wiring and the network/sync layer that decides
//! when to fetch live outside this crate; they plug in through the
//! collaborator traits in [`traits`].

pub mod cache;
pub mod entity;
pub mod error;
pub mod path;
pub mod query;
pub mod storage;
pub mod traits;

pub use cache::{LocalStore, Snapshot, TypeCache, DEFAULT_PREFIX};
pub use entity::Entity;
pub use error::{CacheError, Result};
pub use path::{PathResolver, PropertyKind, Resolved};
pub use query::Query;
pub use storage::{KvStorage, MemoryStorage, SqliteStorage};
