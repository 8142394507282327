//! Submission entities: one `Response` per form submission, holding one
//! `FieldValue` per answered field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{
    compound_key, FIELDS_TREE, FIELD_VALUES_TREE, FIELD_VALUE_IDX, FORMS_TREE, RESPONSES_TREE,
};
use crate::error::FormStoreResult;
use crate::store::record::{require_non_empty, ForeignKey, Record, UniqueKey};

/// A single submission of a form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    pub id: String,
    pub submitted_at: DateTime<Utc>,
    pub form_id: String,
}

impl Response {
    pub fn new(form_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            submitted_at: Utc::now(),
            form_id: form_id.into(),
        }
    }
}

impl Record for Response {
    const TREE: &'static str = RESPONSES_TREE;
    const ENTITY: &'static str = "Response";

    fn id(&self) -> &str {
        &self.id
    }

    fn foreign_keys(&self) -> Vec<ForeignKey> {
        vec![ForeignKey::new(FORMS_TREE, "Form", &self.form_id)]
    }

    fn validate(&self) -> FormStoreResult<()> {
        require_non_empty(Self::ENTITY, "form_id", &self.form_id)
    }
}

/// The value a response holds for one field. A response carries at most one
/// value per field, enforced by a compound unique index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldValue {
    pub id: String,
    pub value: String,
    pub response_id: String,
    pub field_id: String,
}

impl FieldValue {
    pub fn new(
        response_id: impl Into<String>,
        field_id: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            value: value.into(),
            response_id: response_id.into(),
            field_id: field_id.into(),
        }
    }
}

impl Record for FieldValue {
    const TREE: &'static str = FIELD_VALUES_TREE;
    const ENTITY: &'static str = "FieldValue";

    fn id(&self) -> &str {
        &self.id
    }

    fn unique_keys(&self) -> Vec<UniqueKey> {
        vec![UniqueKey::new(
            FIELD_VALUE_IDX,
            compound_key(&self.response_id, &self.field_id),
        )]
    }

    fn foreign_keys(&self) -> Vec<ForeignKey> {
        vec![
            ForeignKey::new(RESPONSES_TREE, "Response", &self.response_id),
            ForeignKey::new(FIELDS_TREE, "Field", &self.field_id),
        ]
    }

    fn validate(&self) -> FormStoreResult<()> {
        require_non_empty(Self::ENTITY, "value", &self.value)
    }
}
