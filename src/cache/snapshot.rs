//! Read-only, id-sorted snapshot of an entity batch.

use std::collections::HashMap;

use super::TypeCache;
use crate::entity::Entity;
use crate::error::{CacheError, Result};

/// An immutable-per-instance, type-indexed, id-sorted view over a batch of
/// entities.
///
/// Constructed once from a raw per-type batch and never mutated afterwards,
/// except by [`extend`](Snapshot::extend), which replaces whole per-type
/// sequences. May be freely shared for read-only concurrent use.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
  cache: HashMap<String, Vec<Entity>>,
}

impl Snapshot {
  /// Build a snapshot from a raw cache-key to entity-list mapping.
  ///
  /// Cache keys may carry a `Type:filter` suffix as produced by query
  /// results; only the portion before the colon is the type name, and the
  /// same type supplied twice is an invariant violation. Each sequence is
  /// sorted ascending by id at construction.
  pub fn new(raw: HashMap<String, Vec<Entity>>) -> Result<Self> {
    let mut cache = HashMap::with_capacity(raw.len());
    for (key, mut entities) in raw {
      let entity_type = key.split_once(':').map(|(t, _)| t).unwrap_or(&key);
      entities.sort_by_key(|e| e.id);
      debug_assert!(
        entities.windows(2).all(|w| w[0].id < w[1].id),
        "duplicate ids for type {entity_type}"
      );
      if cache.insert(entity_type.to_string(), entities).is_some() {
        return Err(CacheError::InvariantViolation(format!(
          "type {entity_type:?} supplied twice in snapshot input"
        )));
      }
    }
    Ok(Self { cache })
  }

  /// A defensive copy of the sequence for `entity_type`.
  pub fn get(&self, entity_type: &str) -> Result<Vec<Entity>> {
    Ok(self.sequence(entity_type)?.to_vec())
  }

  /// Binary-search the sorted sequence for `entity_type` by id.
  ///
  /// This path is called at high frequency; validation beyond the two
  /// lookups is debug-only.
  pub fn get_entity(&self, entity_type: &str, id: i64) -> Result<&Entity> {
    debug_assert!(id != 0, "entity id must be non-zero");
    let entities = self.sequence(entity_type)?;
    let idx = entities
      .binary_search_by_key(&id, |e| e.id)
      .map_err(|_| CacheError::NotFound(format!("entity {entity_type}.{id} not in cache")))?;
    Ok(&entities[idx])
  }

  /// Replace this snapshot's sequences with `other`'s, type by type.
  ///
  /// Types absent from `other` are left untouched; types present in `other`
  /// are replaced wholesale, not merged element-wise.
  pub fn extend(&mut self, other: Snapshot) {
    for (entity_type, entities) in other.cache {
      self.cache.insert(entity_type, entities);
    }
  }

  /// The type names present in this snapshot.
  pub fn types(&self) -> impl Iterator<Item = &str> {
    self.cache.keys().map(String::as_str)
  }
}

impl TypeCache for Snapshot {
  fn sequence(&self, entity_type: &str) -> Result<&[Entity]> {
    self
      .cache
      .get(entity_type)
      .map(Vec::as_slice)
      .ok_or_else(|| CacheError::NotFound(format!("type {entity_type:?} not in cache")))
  }
}
