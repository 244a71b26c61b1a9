//! Query cache keys.

use std::fmt;
use std::str::FromStr;

use crate::error::CacheError;

/// Identifies a requested entity type plus an optional textual filter
/// expression.
///
/// A query serializes to a canonical `"{type}:{filter}"` string which is its
/// cache key; `Query::from_str` round-trips that form. Filter expressions are
/// opaque to this crate and handed to the injected
/// [`FilterEvaluator`](crate::traits::FilterEvaluator) when run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Query {
  /// The requested entity type.
  pub entity_type: String,
  /// Textual filter expression; empty means unfiltered.
  pub filter: String,
}

impl Query {
  /// An unfiltered query for `entity_type`.
  pub fn new(entity_type: impl Into<String>) -> Self {
    Self {
      entity_type: entity_type.into(),
      filter: String::new(),
    }
  }

  /// A filtered query.
  pub fn with_filter(entity_type: impl Into<String>, filter: impl Into<String>) -> Self {
    Self {
      entity_type: entity_type.into(),
      filter: filter.into(),
    }
  }

  /// Whether this query carries a filter expression.
  pub fn has_filter(&self) -> bool {
    !self.filter.is_empty()
  }

  /// The canonical cache-key form.
  pub fn cache_key(&self) -> String {
    self.to_string()
  }
}

impl fmt::Display for Query {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.entity_type, self.filter)
  }
}

impl FromStr for Query {
  type Err = CacheError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    // The type name cannot contain ':'; the filter may.
    let (entity_type, filter) = s.split_once(':').unwrap_or((s, ""));
    if entity_type.is_empty() {
      return Err(CacheError::InvariantViolation(format!(
        "query string {s:?} has no entity type"
      )));
    }
    Ok(Self {
      entity_type: entity_type.to_string(),
      filter: filter.to_string(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn canonical_string_round_trips() {
    let unfiltered = Query::new("User");
    assert_eq!(unfiltered.to_string(), "User:");
    assert_eq!(unfiltered.to_string().parse::<Query>().unwrap(), unfiltered);

    let filtered = Query::with_filter("Order", "Total > 10");
    assert_eq!(filtered.to_string(), "Order:Total > 10");
    assert_eq!(filtered.to_string().parse::<Query>().unwrap(), filtered);
  }

  #[test]
  fn filter_may_contain_colons() {
    let query = Query::with_filter("User", "Name = \"a:b\"");
    assert_eq!(query.to_string().parse::<Query>().unwrap(), query);
  }

  #[test]
  fn bare_type_parses_as_unfiltered() {
    let query: Query = "User".parse().unwrap();
    assert_eq!(query, Query::new("User"));
  }

  #[test]
  fn empty_type_is_rejected() {
    assert!(":filter".parse::<Query>().is_err());
    assert!("".parse::<Query>().is_err());
  }
}
