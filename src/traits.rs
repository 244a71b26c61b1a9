//! External collaborator traits.
//!
//! The resolver and the local store own no schema knowledge, typed entity
//! construction or filter-expression evaluation; those concerns are injected
//! through the traits below rather than reached through process-wide state.

use serde_json::Value;

use crate::entity::Entity;
use crate::error::Result;

/// Maps relationship field names to their target entity type.
///
/// Used exclusively by the path resolver to turn `XID` / `XEntities` field
/// names into cache type names (e.g. `SupplierID` on `Product` resolves to
/// `Supplier`).
pub trait SchemaProvider: Send + Sync {
  /// The related entity type for `field` on `entity_type`, or `None` when
  /// the schema has no such mapping.
  fn related_type(&self, entity_type: &str, field: &str) -> Option<String>;
}

/// Builds typed entities from raw deserialized records.
///
/// Invoked once per type during store hydration.
pub trait EntityParser: Send + Sync {
  /// Parse a raw record array into entities of `entity_type`.
  fn parse_entities(&self, entity_type: &str, raw: Vec<Value>) -> Result<Vec<Entity>>;
}

/// Compiles a textual filter expression into a predicate over entities.
///
/// Invoked by [`LocalStore::query`](crate::LocalStore::query) when a query
/// carries a filter.
pub trait FilterEvaluator: Send + Sync {
  /// Compile `expression` into a predicate.
  fn compile(&self, expression: &str) -> Result<Box<dyn Fn(&Entity) -> bool>>;
}

/// [`EntityParser`] that deserializes records straight through serde.
///
/// Records use the flat entity wire shape; the entity type is stamped on when
/// a record omits its `type` tag.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEntityParser;

impl EntityParser for JsonEntityParser {
  fn parse_entities(&self, entity_type: &str, raw: Vec<Value>) -> Result<Vec<Entity>> {
    raw
      .into_iter()
      .map(|record| {
        let mut entity: Entity = serde_json::from_value(record)?;
        if entity.entity_type.is_empty() {
          entity.entity_type = entity_type.to_string();
        }
        Ok(entity)
      })
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn json_parser_round_trips_wire_shape() {
    let parser = JsonEntityParser;
    let raw = vec![
      json!({"type": "User", "id": 1, "FirstName": "A"}),
      json!({"id": 2, "FirstName": "B"}),
    ];

    let entities = parser.parse_entities("User", raw).unwrap();
    assert_eq!(entities.len(), 2);
    assert_eq!(entities[0].entity_type, "User");
    assert_eq!(entities[1].entity_type, "User");
    assert_eq!(entities[1].field("FirstName"), Some(&json!("B")));
  }

  #[test]
  fn json_parser_rejects_records_without_id() {
    let parser = JsonEntityParser;
    let raw = vec![json!({"type": "User", "FirstName": "A"})];
    assert!(parser.parse_entities("User", raw).is_err());
  }
}
