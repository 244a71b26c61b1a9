//! The entity record type cached by this crate.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A typed, identified record.
///
/// `id <= 0` marks an unsaved entity: negative ids are locally-assigned
/// temporary ids pending server confirmation, positive ids are
/// server-confirmed. All other fields are carried as raw JSON values, so the
/// wire shape is `{"type": ..., "id": ..., <fields>...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
  /// Entity type tag, used as the cache key.
  #[serde(rename = "type", default)]
  pub entity_type: String,
  /// Entity identifier.
  pub id: i64,
  /// Arbitrary named fields.
  #[serde(flatten)]
  pub fields: Map<String, Value>,
}

impl Entity {
  /// Create an entity with no fields.
  pub fn new(entity_type: impl Into<String>, id: i64) -> Self {
    Self {
      entity_type: entity_type.into(),
      id,
      fields: Map::new(),
    }
  }

  /// Builder-style field assignment.
  pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
    self.fields.insert(name.into(), value.into());
    self
  }

  /// The value of `name`, if the field is present.
  pub fn field(&self, name: &str) -> Option<&Value> {
    self.fields.get(name)
  }

  /// Set or replace a field.
  pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<Value>) {
    self.fields.insert(name.into(), value.into());
  }

  /// Integer view of a field, for `*ID` parent references.
  pub fn field_id(&self, name: &str) -> Option<i64> {
    self.fields.get(name).and_then(Value::as_i64)
  }

  /// Whether this entity has not been saved to the server.
  pub fn is_new(&self) -> bool {
    self.id <= 0
  }

  /// Whether this entity carries a locally-assigned temporary id.
  pub fn has_temp_id(&self) -> bool {
    self.id < 0
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn serde_wire_shape_is_flat() {
    let entity = Entity::new("User", 4)
      .with_field("FirstName", "A")
      .with_field("SupplierID", 7);

    let value = serde_json::to_value(&entity).unwrap();
    assert_eq!(
      value,
      json!({"type": "User", "id": 4, "FirstName": "A", "SupplierID": 7})
    );

    let back: Entity = serde_json::from_value(value).unwrap();
    assert_eq!(back, entity);
  }

  #[test]
  fn newness_follows_id_sign() {
    assert!(Entity::new("User", 0).is_new());
    assert!(Entity::new("User", -3).is_new());
    assert!(Entity::new("User", -3).has_temp_id());
    assert!(!Entity::new("User", 1).is_new());
    assert!(!Entity::new("User", 1).has_temp_id());
  }

  #[test]
  fn field_id_reads_integers_only() {
    let entity = Entity::new("Child", 10)
      .with_field("ParentID", 1)
      .with_field("Name", "x");
    assert_eq!(entity.field_id("ParentID"), Some(1));
    assert_eq!(entity.field_id("Name"), None);
    assert_eq!(entity.field_id("Missing"), None);
  }
}
