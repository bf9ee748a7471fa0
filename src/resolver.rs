//! Cache-key resolution strategy.
//!
//! The resolver decides which identity key a record normalizes under. It is
//! injected into the normalizer and consulted once per object node, so a
//! custom implementation can change how entities are shared across queries
//! without touching the normalization walk itself.

use crate::types::{CacheError, CacheKey, Field, ID_FIELD, TYPENAME_FIELD};
use serde_json::{Map, Value};

/// Derives a stable identity key for a field/record pair.
///
/// Implementations must be stateless and pure: the same inputs always produce
/// the same key.
pub trait KeyResolver: Send + Sync {
    /// Resolve a key from a field's arguments, before any response exists.
    ///
    /// Used for fields that take arguments (e.g. `task(id: $id)`) so a query
    /// can be served from cache even if it has never executed. The default
    /// implementation returns `NoKey`, which disables argument-based lookup;
    /// override it to derive keys from argument values.
    fn from_field_arguments(&self, _field: &Field, _variables: &Map<String, Value>) -> CacheKey {
        CacheKey::NoKey
    }

    /// Resolve a key from a decoded object's own fields.
    fn from_record_set(&self, field: &Field, record_set: &Map<String, Value>) -> CacheKey;
}

/// Default resolver: `"{__typename}.{id}"` when the object carries an `id`.
///
/// Objects without an `id` resolve to `NoKey` and are stored inline. An `id`
/// without a `__typename` also resolves to `NoKey`, but is logged as a
/// warning since it silently disables sharing for that entity; queries must
/// request both fields for entities that need stable identity.
pub struct TypenameIdResolver;

impl KeyResolver for TypenameIdResolver {
    fn from_record_set(&self, field: &Field, record_set: &Map<String, Value>) -> CacheKey {
        let Some(id) = scalar_text(record_set.get(ID_FIELD)) else {
            return CacheKey::NoKey;
        };

        match scalar_text(record_set.get(TYPENAME_FIELD)) {
            Some(typename) => CacheKey::from_parts(&typename, &id),
            None => {
                // Non-fatal, but sharing is silently disabled for this entity
                log::warn!(
                    "{}",
                    CacheError::AmbiguousIdentity(format!(
                        "field '{}' has id '{}' but no {}; storing inline",
                        field.name, id, TYPENAME_FIELD
                    ))
                );
                CacheKey::NoKey
            }
        }
    }
}

/// Render a scalar identity component as text.
/// Numeric ids are common enough that they are accepted alongside strings.
fn scalar_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
