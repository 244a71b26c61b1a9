//! Type-indexed entity caches.
//!
//! Two cache shapes share one read contract:
//! - [`Snapshot`]: an immutable, id-sorted view over a point-in-time entity
//!   batch, as produced by a server response.
//! - [`LocalStore`]: the durable, mutable session cache with query-result
//!   caching and synchronous persistence.

mod local;
mod snapshot;

pub use local::{LocalStore, DEFAULT_PREFIX};
pub use snapshot::Snapshot;

use serde_json::Value;

use crate::entity::Entity;
use crate::error::Result;

/// Read access to a type-indexed entity cache.
///
/// An absent type is an error, never an empty sequence: callers that get an
/// empty slice back know the type was primed but currently has no rows.
pub trait TypeCache {
  /// The entity sequence cached under `entity_type`.
  fn sequence(&self, entity_type: &str) -> Result<&[Entity]>;

  /// The first entity of `entity_type` whose `field` equals `value`.
  ///
  /// The literal `ID` field compares against the entity id.
  fn find_by_field(
    &self,
    entity_type: &str,
    field: &str,
    value: &Value,
  ) -> Result<Option<&Entity>> {
    let entities = self.sequence(entity_type)?;
    if field == "ID" {
      let id = value.as_i64();
      return Ok(entities.iter().find(|e| Some(e.id) == id));
    }
    Ok(entities.iter().find(|e| e.field(field) == Some(value)))
  }
}
