//! The `Record` trait: what the generic repository needs to know about an
//! entity in order to store it, index it, and keep its integrity rules.
//!
//! One implementation per entity replaces the per-model accessor boilerplate
//! an ORM would generate; the repository in [`super::repository`] is written
//! once against this trait.

use serde::{de::DeserializeOwned, Serialize};

use crate::error::{FormStoreError, FormStoreResult};

/// A unique constraint entry: which index tree it lives in and the key the
/// record occupies there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueKey {
    pub index: &'static str,
    pub key: String,
}

impl UniqueKey {
    pub fn new(index: &'static str, key: impl Into<String>) -> Self {
        Self {
            index,
            key: key.into(),
        }
    }
}

/// A foreign-key edge from a record to its parent row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub parent_tree: &'static str,
    pub parent_entity: &'static str,
    pub id: String,
}

impl ForeignKey {
    pub fn new(parent_tree: &'static str, parent_entity: &'static str, id: impl Into<String>) -> Self {
        Self {
            parent_tree,
            parent_entity,
            id: id.into(),
        }
    }
}

/// Storable entity record.
pub trait Record: Serialize + DeserializeOwned + Clone {
    /// Tree the records of this entity live in.
    const TREE: &'static str;
    /// Human-readable entity name used in errors ("User", "Form", ...).
    const ENTITY: &'static str;

    /// Primary key of this record.
    fn id(&self) -> &str;

    /// Unique constraint entries this record occupies. Empty for entities
    /// without unique columns beyond the primary key.
    fn unique_keys(&self) -> Vec<UniqueKey> {
        Vec::new()
    }

    /// Foreign-key edges this record carries.
    fn foreign_keys(&self) -> Vec<ForeignKey> {
        Vec::new()
    }

    /// Rejects records whose required scalars are missing before they reach
    /// the engine.
    fn validate(&self) -> FormStoreResult<()>;
}

/// Fails with a [`FormStoreError::Validation`] when a required string field
/// is empty.
pub fn require_non_empty(
    entity: &'static str,
    field: &'static str,
    value: &str,
) -> FormStoreResult<()> {
    if value.trim().is_empty() {
        return Err(FormStoreError::Validation {
            entity,
            message: format!("required field '{}' is empty", field),
        });
    }
    Ok(())
}
