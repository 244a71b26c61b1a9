//! The durable, mutable session cache.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use super::TypeCache;
use crate::entity::Entity;
use crate::error::{CacheError, Result};
use crate::query::Query;
use crate::storage::KvStorage;
use crate::traits::{EntityParser, FilterEvaluator};

/// Default namespace prefix for durable keys.
pub const DEFAULT_PREFIX: &str = "LOCAL_DATA_CACHE:";

/// Storage key suffixes under the store's prefix.
const KEY_DB_VERSION: &str = "dbver";
const KEY_LAST_UPDATE: &str = "last";
const KEY_QUERIES: &str = "queries";

/// The long-lived session cache of entities and cached query results.
///
/// One store owns one namespace prefix in durable storage; two instances
/// sharing a prefix would race on flush and lose updates. Every mutation
/// synchronously rewrites the affected aggregate (the type's entity list, or
/// the query-key set) before returning, trading write amplification for
/// crash-consistency simplicity.
pub struct LocalStore {
  prefix: String,
  last_update: i64,
  cache: HashMap<String, Vec<Entity>>,
  cached_queries: BTreeMap<String, Query>,
  storage: Arc<dyn KvStorage>,
  parser: Arc<dyn EntityParser>,
  evaluator: Arc<dyn FilterEvaluator>,
}

fn not_in_cache(entity_type: &str) -> CacheError {
  CacheError::NotFound(format!("type {entity_type:?} not in cache"))
}

impl LocalStore {
  /// Construct a store over `storage`, hydrating any state persisted under
  /// `prefix` (default [`DEFAULT_PREFIX`]).
  ///
  /// A persisted schema version differing from `db_version` wipes the whole
  /// namespace before hydration; nothing survives the wipe, including the
  /// version tag itself.
  pub fn new(
    db_version: &str,
    prefix: Option<&str>,
    storage: Arc<dyn KvStorage>,
    parser: Arc<dyn EntityParser>,
    evaluator: Arc<dyn FilterEvaluator>,
  ) -> Result<Self> {
    let mut store = Self {
      prefix: prefix.unwrap_or(DEFAULT_PREFIX).to_string(),
      last_update: 0,
      cache: HashMap::new(),
      cached_queries: BTreeMap::new(),
      storage,
      parser,
      evaluator,
    };
    store.check_db_version(db_version)?;
    store.hydrate()?;
    Ok(store)
  }

  fn key(&self, suffix: &str) -> String {
    format!("{}{}", self.prefix, suffix)
  }

  fn check_db_version(&mut self, db_version: &str) -> Result<()> {
    match self.storage.get(&self.key(KEY_DB_VERSION))? {
      Some(existing) if existing != db_version => {
        info!(
          existing = %existing,
          current = %db_version,
          "schema version mismatch, clearing local cache"
        );
        self.clear()
      }
      _ => self.storage.set(&self.key(KEY_DB_VERSION), db_version),
    }
  }

  fn hydrate(&mut self) -> Result<()> {
    self.last_update = match self.storage.get(&self.key(KEY_LAST_UPDATE))? {
      Some(raw) => raw.parse().map_err(|_| {
        CacheError::InvariantViolation(format!("bad last-update value {raw:?}"))
      })?,
      None => 0,
    };

    let Some(queries_json) = self.storage.get(&self.key(KEY_QUERIES))? else {
      if self.last_update > 0 {
        return Err(CacheError::InvariantViolation(format!(
          "last update is set ({}) but the cache is empty",
          self.last_update
        )));
      }
      return Ok(());
    };

    let keys: Vec<String> = serde_json::from_str(&queries_json)?;
    for key in keys {
      let query: Query = key.parse()?;
      self.cached_queries.insert(key, query);
    }

    // A missing per-type list drops its query keys instead of failing the
    // whole load; the next write rewrites a consistent set.
    let mut hydrated: HashMap<String, Vec<Entity>> = HashMap::new();
    let mut missing: Vec<String> = Vec::new();
    for (key, query) in &self.cached_queries {
      if hydrated.contains_key(&query.entity_type) {
        continue;
      }
      match self.storage.get(&self.key(&query.entity_type))? {
        Some(raw) => {
          let records: Vec<Value> = serde_json::from_str(&raw)?;
          let entities = self.parser.parse_entities(&query.entity_type, records)?;
          debug!(
            entity_type = %query.entity_type,
            count = entities.len(),
            "hydrated type from storage"
          );
          hydrated.insert(query.entity_type.clone(), entities);
        }
        None => missing.push(key.clone()),
      }
    }
    self.cached_queries.retain(|key, _| !missing.contains(key));
    self.cache = hydrated;
    Ok(())
  }

  /// The entity of `entity_type` with `id`.
  pub fn get_entity(&self, entity_type: &str, id: i64) -> Result<&Entity> {
    let list = self.sequence(entity_type)?;
    list
      .iter()
      .find(|e| e.id == id)
      .ok_or_else(|| CacheError::NotFound(format!("entity {entity_type}.{id} not in cache")))
  }

  /// Add a locally-created entity to its type's list.
  ///
  /// The caller has already assigned a negative temporary id; the entity is
  /// appended and the type's list is flushed.
  pub fn create_entity(&mut self, entity: Entity) -> Result<()> {
    if entity.id >= 0 {
      return Err(CacheError::InvariantViolation(format!(
        "created entity must carry a temporary id, got {}",
        entity.id
      )));
    }
    let entity_type = entity.entity_type.clone();
    let list = self
      .cache
      .get_mut(&entity_type)
      .ok_or_else(|| not_in_cache(&entity_type))?;
    list.push(entity);
    self.flush(&entity_type)
  }

  /// Replace an entity in place.
  ///
  /// `temp_id` (negative) locates an entity that has not hit the server yet
  /// and is being replaced by its server-confirmed version.
  pub fn update_entity(&mut self, entity: Entity, temp_id: Option<i64>) -> Result<()> {
    if let Some(tmp) = temp_id {
      if tmp >= 0 {
        return Err(CacheError::InvariantViolation(format!(
          "temporary id must be negative, got {tmp}"
        )));
      }
    }
    let id = temp_id.unwrap_or(entity.id);
    let entity_type = entity.entity_type.clone();
    let list = self
      .cache
      .get_mut(&entity_type)
      .ok_or_else(|| not_in_cache(&entity_type))?;
    let slot = list
      .iter_mut()
      .find(|e| e.id == id)
      .ok_or_else(|| CacheError::NotFound(format!("entity {entity_type}.{id} not in cache")))?;
    *slot = entity;
    self.flush(&entity_type)
  }

  /// Remove an entity from its type's list; a missing id is treated as
  /// already absent.
  pub fn delete_entity(&mut self, entity_type: &str, id: i64) -> Result<()> {
    let list = self
      .cache
      .get_mut(entity_type)
      .ok_or_else(|| not_in_cache(entity_type))?;
    list.retain(|e| e.id != id);
    self.flush(entity_type)
  }

  /// Recreate a server-confirmed entity whose delete failed to commit
  /// server-side.
  ///
  /// The type key is created if it does not exist yet; an entity with the
  /// same id is overwritten in place, otherwise the entity is appended.
  pub fn undelete_entity(&mut self, entity: Entity) -> Result<()> {
    if entity.id <= 0 {
      return Err(CacheError::InvariantViolation(format!(
        "undelete requires a server-confirmed id, got {}",
        entity.id
      )));
    }
    let entity_type = entity.entity_type.clone();
    let list = self.cache.entry(entity_type.clone()).or_default();
    match list.iter_mut().find(|e| e.id == entity.id) {
      Some(slot) => *slot = entity,
      None => list.push(entity),
    }
    self.flush(&entity_type)
  }

  /// Whether this query's type has been primed, irrespective of whether the
  /// specific filter has been run.
  pub fn contains(&self, query: &Query) -> bool {
    self.cache.contains_key(&query.entity_type)
  }

  /// Run `queries` against memory, keyed by canonical query string.
  ///
  /// Filter expressions are compiled through the injected evaluator; a query
  /// whose type is not primed fails the whole call.
  pub fn query(&self, queries: &[Query]) -> Result<HashMap<String, Vec<Entity>>> {
    let mut results = HashMap::with_capacity(queries.len());
    for query in queries {
      let list = self
        .cache
        .get(&query.entity_type)
        .ok_or_else(|| not_in_cache(&query.entity_type))?;
      let list = if query.has_filter() {
        let predicate = self.evaluator.compile(&query.filter)?;
        let mut filtered = Vec::new();
        for entity in list {
          if predicate(entity) {
            filtered.push(entity.clone());
          }
        }
        filtered
      } else {
        list.clone()
      };
      results.insert(query.to_string(), list);
    }
    Ok(results)
  }

  /// Merge a fresh server result for `query` into the cache.
  ///
  /// Right-biased union on id: the incoming list wins any id collision, and
  /// existing entities it does not mention are appended after it. Both the
  /// type's list and the query-key set are flushed.
  pub fn save_query(&mut self, query: &Query, mut list: Vec<Entity>) -> Result<()> {
    let entity_type = query.entity_type.clone();
    if let Some(current) = self.cache.get(&entity_type) {
      let surviving: Vec<Entity> = current
        .iter()
        .filter(|e| !list.iter().any(|new| new.id == e.id))
        .cloned()
        .collect();
      list.extend(surviving);
    }
    self.cache.insert(entity_type.clone(), list);
    self.cached_queries.insert(query.to_string(), query.clone());
    self.flush(&entity_type)?;
    self.flush_cached_queries()
  }

  /// The queries whose results are cached.
  pub fn get_cached_queries(&self) -> Vec<Query> {
    self.cached_queries.values().cloned().collect()
  }

  /// The last-update timestamp in millis (0 when never set).
  pub fn get_last_update(&self) -> i64 {
    self.last_update
  }

  /// Set and immediately persist the last-update timestamp (millis).
  pub fn set_last_update(&mut self, last_update: i64) -> Result<()> {
    self.last_update = last_update;
    self
      .storage
      .set(&self.key(KEY_LAST_UPDATE), &last_update.to_string())
  }

  /// Reset last-update and delete every durable key under the prefix.
  ///
  /// In-memory maps are left alone; callers are expected to discard the
  /// store afterwards.
  pub fn clear(&mut self) -> Result<()> {
    info!(prefix = %self.prefix, "clearing durable cache namespace");
    self.last_update = 0;
    for key in self.storage.keys_with_prefix(&self.prefix)? {
      self.storage.remove(&key)?;
    }
    Ok(())
  }

  fn flush(&self, entity_type: &str) -> Result<()> {
    let list = self
      .cache
      .get(entity_type)
      .ok_or_else(|| not_in_cache(entity_type))?;
    debug!(entity_type = %entity_type, count = list.len(), "flushing type to storage");
    let json = serde_json::to_string(list)?;
    self.storage.set(&self.key(entity_type), &json)
  }

  fn flush_cached_queries(&self) -> Result<()> {
    let keys: Vec<&String> = self.cached_queries.keys().collect();
    let json = serde_json::to_string(&keys)?;
    self.storage.set(&self.key(KEY_QUERIES), &json)
  }
}

impl TypeCache for LocalStore {
  fn sequence(&self, entity_type: &str) -> Result<&[Entity]> {
    self
      .cache
      .get(entity_type)
      .map(Vec::as_slice)
      .ok_or_else(|| not_in_cache(entity_type))
  }
}
