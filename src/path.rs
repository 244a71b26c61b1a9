//! Relationship-path resolution across cached entity sets.
//!
//! Paths are dotted field names following the entity naming conventions:
//! `SupplierID` walks to the parent `Supplier` row, `OrderEntities` to the
//! child `Order` collection, and anything else projects a plain field value.
//! A path is compiled once against the schema into typed steps, then executed
//! against a [`TypeCache`], so the convention sniffing happens per call, not
//! per traversal step.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::cache::TypeCache;
use crate::entity::Entity;
use crate::error::{CacheError, Result};
use crate::traits::SchemaProvider;

/// Classification of an entity field name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
  /// A plain data field, including the literal `ID`.
  Scalar,
  /// A `*ID` parent reference.
  ParentRef,
  /// An `*Entities` child collection.
  ChildCollection,
}

/// Classify `property` by the entity field naming conventions.
pub fn property_kind(property: &str) -> PropertyKind {
  if property != "ID" && property.ends_with("ID") {
    PropertyKind::ParentRef
  } else if property.ends_with("Entities") {
    PropertyKind::ChildCollection
  } else {
    PropertyKind::Scalar
  }
}

/// Whether `property` names a parent or child relationship.
pub fn is_relationship_property(property: &str) -> bool {
  property_kind(property) != PropertyKind::Scalar
}

/// Whether `property` names a parent relationship.
pub fn is_parent_property(property: &str) -> bool {
  property_kind(property) == PropertyKind::ParentRef
}

/// Whether `property` names a child-collection relationship.
pub fn is_children_property(property: &str) -> bool {
  property.ends_with("Entities")
}

/// Outcome of resolving a path: entities for relationship steps, raw values
/// for a final scalar projection.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
  /// Entities reached through relationship segments.
  Entities(Vec<Entity>),
  /// Field values projected by a final scalar segment.
  Values(Vec<Value>),
}

impl Resolved {
  /// Number of resolved entities or values.
  pub fn len(&self) -> usize {
    match self {
      Resolved::Entities(entities) => entities.len(),
      Resolved::Values(values) => values.len(),
    }
  }

  /// Whether nothing was resolved.
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Render to a single display value: the sole result as-is, multiple
  /// results joined with `", "`, nothing as null.
  fn into_display_value(self) -> Value {
    match self {
      Resolved::Values(mut values) => match values.len() {
        0 => Value::Null,
        1 => values.remove(0),
        _ => Value::String(
          values
            .iter()
            .map(display_text)
            .collect::<Vec<_>>()
            .join(", "),
        ),
      },
      Resolved::Entities(mut entities) => match entities.len() {
        0 => Value::Null,
        1 => entity_value(entities.remove(0)),
        _ => Value::String(
          entities
            .into_iter()
            .map(|e| display_text(&entity_value(e)))
            .collect::<Vec<_>>()
            .join(", "),
        ),
      },
    }
  }
}

fn entity_value(entity: Entity) -> Value {
  serde_json::to_value(entity).unwrap_or(Value::Null)
}

fn display_text(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    Value::Null => String::new(),
    other => other.to_string(),
  }
}

/// One compiled path segment with its schema lookup already resolved.
#[derive(Debug, Clone)]
enum Step {
  Scalar(String),
  ParentRef { field: String, target_type: String },
  ChildCollection { target_type: String },
}

/// Resolves dotted relationship paths and memoizes display values.
///
/// Schema knowledge is injected rather than reached through ambient state,
/// and the display-value memo table lives here rather than on the entities,
/// keyed by (entity type, id, path). A memoized value is invalidated only by
/// dropping the resolver.
pub struct PathResolver {
  schema: Arc<dyn SchemaProvider>,
  display_cache: HashMap<(String, i64, String), Value>,
}

impl PathResolver {
  /// Create a resolver over `schema`.
  pub fn new(schema: Arc<dyn SchemaProvider>) -> Self {
    Self {
      schema,
      display_cache: HashMap::new(),
    }
  }

  fn related(&self, entity_type: &str, field: &str) -> Result<String> {
    self.schema.related_type(entity_type, field).ok_or_else(|| {
      CacheError::NotFound(format!("no schema mapping for {entity_type}.{field}"))
    })
  }

  /// Compile `path` against the schema, resolving each relationship
  /// segment's target type once.
  fn compile(&self, path: &str, start_type: &str) -> Result<Vec<Step>> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut steps = Vec::with_capacity(segments.len());
    let mut current_type = start_type.to_string();
    for (i, segment) in segments.iter().enumerate() {
      match property_kind(segment) {
        PropertyKind::Scalar => {
          if i + 1 < segments.len() {
            return Err(CacheError::NotFound(format!(
              "path {path:?} continues past scalar field {segment:?}"
            )));
          }
          steps.push(Step::Scalar(segment.to_string()));
        }
        PropertyKind::ParentRef => {
          let target_type = self.related(&current_type, segment)?;
          current_type = target_type.clone();
          steps.push(Step::ParentRef {
            field: segment.to_string(),
            target_type,
          });
        }
        PropertyKind::ChildCollection => {
          let target_type = self.related(&current_type, segment)?;
          current_type = target_type.clone();
          steps.push(Step::ChildCollection { target_type });
        }
      }
    }
    Ok(steps)
  }

  /// Walk `path` from `targets` (entities of `start_type`) through `cache`.
  ///
  /// `parent_field` names the back-reference field used to filter the first
  /// child-collection segment encountered; it is consumed there and never
  /// reapplied to later `*Entities` segments of the same call.
  pub fn resolve(
    &self,
    cache: &dyn TypeCache,
    path: &str,
    start_type: &str,
    targets: &[Entity],
    parent_field: Option<&str>,
  ) -> Result<Resolved> {
    let steps = self.compile(path, start_type)?;
    let mut parent_field = parent_field;
    let mut current: Vec<Entity> = targets.to_vec();

    for step in steps {
      match step {
        Step::Scalar(field) => {
          let values = current
            .iter()
            .map(|e| e.field(&field).cloned().unwrap_or(Value::Null))
            .collect();
          return Ok(Resolved::Values(values));
        }
        Step::ParentRef { field, target_type } => {
          let ids: Vec<i64> = current.iter().filter_map(|e| e.field_id(&field)).collect();
          let related = cache.sequence(&target_type)?;
          current = related
            .iter()
            .filter(|e| ids.contains(&e.id))
            .cloned()
            .collect();
        }
        Step::ChildCollection { target_type } => {
          let mut next: Vec<Entity> = cache.sequence(&target_type)?.to_vec();
          if let Some(back_ref) = parent_field.take() {
            let ids: Vec<i64> = current.iter().map(|e| e.id).collect();
            next.retain(|e| e.field_id(back_ref).is_some_and(|id| ids.contains(&id)));
          }
          current = next;
        }
      }
    }
    Ok(Resolved::Entities(current))
  }

  /// A single display value for `path` on `entity`, memoized per
  /// (type, id, path).
  ///
  /// Multiple resolved values are joined with `", "`; a sole result is
  /// returned as-is. A memo hit performs no resolution work.
  pub fn display_value(
    &mut self,
    cache: &dyn TypeCache,
    path: &str,
    entity: &Entity,
    parent_field: Option<&str>,
  ) -> Result<Value> {
    let key = (entity.entity_type.clone(), entity.id, path.to_string());
    if let Some(cached) = self.display_cache.get(&key) {
      return Ok(cached.clone());
    }

    let resolved = self.resolve(
      cache,
      path,
      &entity.entity_type,
      std::slice::from_ref(entity),
      parent_field,
    )?;
    let value = resolved.into_display_value();
    self.display_cache.insert(key, value.clone());
    Ok(value)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::Snapshot;
  use serde_json::json;
  use std::sync::atomic::{AtomicUsize, Ordering};

  /// Map-backed schema that counts lookups, so tests can observe memo hits.
  struct TestSchema {
    relations: HashMap<(String, String), String>,
    lookups: AtomicUsize,
  }

  impl TestSchema {
    fn new(entries: &[(&str, &str, &str)]) -> Self {
      Self {
        relations: entries
          .iter()
          .map(|(t, f, target)| ((t.to_string(), f.to_string()), target.to_string()))
          .collect(),
        lookups: AtomicUsize::new(0),
      }
    }

    fn lookups(&self) -> usize {
      self.lookups.load(Ordering::SeqCst)
    }
  }

  impl SchemaProvider for TestSchema {
    fn related_type(&self, entity_type: &str, field: &str) -> Option<String> {
      self.lookups.fetch_add(1, Ordering::SeqCst);
      self
        .relations
        .get(&(entity_type.to_string(), field.to_string()))
        .cloned()
    }
  }

  fn parent_child_cache() -> Snapshot {
    Snapshot::new(
      [
        (
          "Parent".to_string(),
          vec![Entity::new("Parent", 1).with_field("Name", "p1")],
        ),
        (
          "Child".to_string(),
          vec![
            Entity::new("Child", 10)
              .with_field("ParentID", 1)
              .with_field("Name", "c10"),
            Entity::new("Child", 11)
              .with_field("ParentID", 2)
              .with_field("Name", "c11"),
          ],
        ),
      ]
      .into_iter()
      .collect(),
    )
    .unwrap()
  }

  fn parent_child_schema() -> Arc<TestSchema> {
    Arc::new(TestSchema::new(&[
      ("Parent", "ChildEntities", "Child"),
      ("Child", "ParentID", "Parent"),
    ]))
  }

  #[test]
  fn classification_follows_naming_conventions() {
    assert_eq!(property_kind("SupplierID"), PropertyKind::ParentRef);
    assert_eq!(property_kind("OrderEntities"), PropertyKind::ChildCollection);
    assert_eq!(property_kind("ID"), PropertyKind::Scalar);
    assert_eq!(property_kind("FirstName"), PropertyKind::Scalar);

    assert!(is_relationship_property("SupplierID"));
    assert!(is_relationship_property("OrderEntities"));
    assert!(!is_relationship_property("ID"));
    assert!(!is_relationship_property("Name"));

    assert!(is_parent_property("SupplierID"));
    assert!(!is_parent_property("ID"));
    assert!(!is_parent_property("OrderEntities"));

    assert!(is_children_property("OrderEntities"));
    assert!(!is_children_property("SupplierID"));
  }

  #[test]
  fn child_collection_filters_by_parent_back_reference() {
    let cache = parent_child_cache();
    let resolver = PathResolver::new(parent_child_schema());
    let parent = Entity::new("Parent", 1).with_field("Name", "p1");

    let resolved = resolver
      .resolve(
        &cache,
        "ChildEntities",
        "Parent",
        std::slice::from_ref(&parent),
        Some("ParentID"),
      )
      .unwrap();

    let Resolved::Entities(entities) = resolved else {
      panic!("expected entities");
    };
    assert_eq!(entities.len(), 1);
    assert_eq!(entities[0].id, 10);
  }

  #[test]
  fn child_collection_without_parent_field_returns_all() {
    let cache = parent_child_cache();
    let resolver = PathResolver::new(parent_child_schema());
    let parent = Entity::new("Parent", 1);

    let resolved = resolver
      .resolve(&cache, "ChildEntities", "Parent", std::slice::from_ref(&parent), None)
      .unwrap();
    assert_eq!(resolved.len(), 2);
  }

  #[test]
  fn parent_ref_walks_to_the_referenced_entity() {
    let cache = parent_child_cache();
    let resolver = PathResolver::new(parent_child_schema());
    let child = Entity::new("Child", 10).with_field("ParentID", 1);

    let resolved = resolver
      .resolve(&cache, "ParentID", "Child", std::slice::from_ref(&child), None)
      .unwrap();
    let Resolved::Entities(entities) = resolved else {
      panic!("expected entities");
    };
    assert_eq!(entities.len(), 1);
    assert_eq!(entities[0].id, 1);
  }

  #[test]
  fn scalar_segment_projects_field_values() {
    let cache = parent_child_cache();
    let resolver = PathResolver::new(parent_child_schema());
    let child = Entity::new("Child", 10).with_field("ParentID", 1);

    let resolved = resolver
      .resolve(&cache, "ParentID.Name", "Child", std::slice::from_ref(&child), None)
      .unwrap();
    assert_eq!(resolved, Resolved::Values(vec![json!("p1")]));
  }

  #[test]
  fn parent_back_reference_applies_only_once() {
    // Grandparent -> Parent -> Child; the back-reference names the
    // Grandparent link and must not be reapplied at the second
    // `*Entities` segment.
    let cache = Snapshot::new(
      [
        ("Grandparent".to_string(), vec![Entity::new("Grandparent", 1)]),
        (
          "Parent".to_string(),
          vec![
            Entity::new("Parent", 10).with_field("GrandparentID", 1),
            Entity::new("Parent", 11).with_field("GrandparentID", 2),
          ],
        ),
        (
          "Child".to_string(),
          vec![
            Entity::new("Child", 100).with_field("ParentID", 10),
            Entity::new("Child", 101).with_field("GrandparentID", 999),
          ],
        ),
      ]
      .into_iter()
      .collect(),
    )
    .unwrap();
    let schema = Arc::new(TestSchema::new(&[
      ("Grandparent", "ParentEntities", "Parent"),
      ("Parent", "ChildEntities", "Child"),
    ]));
    let resolver = PathResolver::new(schema);
    let grandparent = Entity::new("Grandparent", 1);

    let resolved = resolver
      .resolve(
        &cache,
        "ParentEntities.ChildEntities",
        "Grandparent",
        std::slice::from_ref(&grandparent),
        Some("GrandparentID"),
      )
      .unwrap();

    // The first segment narrows to parent 10; the second returns the full
    // child list because the back-reference was consumed.
    assert_eq!(resolved.len(), 2);
  }

  #[test]
  fn unknown_schema_mapping_or_type_is_not_found() {
    let cache = parent_child_cache();
    let resolver = PathResolver::new(parent_child_schema());
    let parent = Entity::new("Parent", 1);

    assert!(matches!(
      resolver.resolve(&cache, "WidgetEntities", "Parent", std::slice::from_ref(&parent), None),
      Err(CacheError::NotFound(_))
    ));

    let schema = Arc::new(TestSchema::new(&[("Parent", "ChildEntities", "Missing")]));
    let resolver = PathResolver::new(schema);
    assert!(matches!(
      resolver.resolve(&cache, "ChildEntities", "Parent", std::slice::from_ref(&parent), None),
      Err(CacheError::NotFound(_))
    ));
  }

  #[test]
  fn path_may_not_continue_past_a_scalar_field() {
    let cache = parent_child_cache();
    let resolver = PathResolver::new(parent_child_schema());
    let child = Entity::new("Child", 10);

    assert!(matches!(
      resolver.resolve(&cache, "Name.ParentID", "Child", std::slice::from_ref(&child), None),
      Err(CacheError::NotFound(_))
    ));
  }

  #[test]
  fn display_value_joins_multiple_results() {
    let cache = parent_child_cache();
    let mut resolver = PathResolver::new(parent_child_schema());
    let parent = Entity::new("Parent", 1);

    let value = resolver
      .display_value(&cache, "ChildEntities.Name", &parent, None)
      .unwrap();
    assert_eq!(value, json!("c10, c11"));
  }

  #[test]
  fn display_value_returns_sole_result_as_is() {
    let cache = parent_child_cache();
    let mut resolver = PathResolver::new(parent_child_schema());
    let child = Entity::new("Child", 10).with_field("ParentID", 1);

    let value = resolver
      .display_value(&cache, "ParentID.Name", &child, None)
      .unwrap();
    assert_eq!(value, json!("p1"));
  }

  #[test]
  fn display_value_is_memoized_per_entity_and_path() {
    let cache = parent_child_cache();
    let schema = parent_child_schema();
    let mut resolver = PathResolver::new(Arc::clone(&schema) as Arc<dyn SchemaProvider>);
    let child = Entity::new("Child", 10).with_field("ParentID", 1);

    let first = resolver
      .display_value(&cache, "ParentID.Name", &child, None)
      .unwrap();
    let lookups_after_first = schema.lookups();

    let second = resolver
      .display_value(&cache, "ParentID.Name", &child, None)
      .unwrap();
    assert_eq!(first, second);
    assert_eq!(schema.lookups(), lookups_after_first);

    // A different entity of the same type resolves afresh.
    let sibling = Entity::new("Child", 11).with_field("ParentID", 2);
    resolver
      .display_value(&cache, "ParentID.Name", &sibling, None)
      .unwrap();
    assert!(schema.lookups() > lookups_after_first);
  }
}
