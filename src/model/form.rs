//! Form entities: the form itself, the fields it collects, and its optional
//! per-form settings row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::constants::{
    FIELDS_TREE, FORMS_TREE, FORM_SETTINGS_FORM_IDX, FORM_SETTINGS_TREE, FORM_SLUG_IDX,
    USERS_TREE,
};
use crate::error::{FormStoreError, FormStoreResult};
use crate::store::record::{require_non_empty, ForeignKey, Record, UniqueKey};

/// A form owned by a user, addressed publicly by its slug.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Form {
    pub id: String,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub user_id: String,
}

impl Form {
    pub fn new(
        user_id: impl Into<String>,
        slug: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            slug: slug.into(),
            name: name.into(),
            description: None,
            published: false,
            created_at: now,
            updated_at: now,
            user_id: user_id.into(),
        }
    }

    /// Bump `updated_at`; called by every mutating accessor.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl Record for Form {
    const TREE: &'static str = FORMS_TREE;
    const ENTITY: &'static str = "Form";

    fn id(&self) -> &str {
        &self.id
    }

    fn unique_keys(&self) -> Vec<UniqueKey> {
        vec![UniqueKey::new(FORM_SLUG_IDX, &self.slug)]
    }

    fn foreign_keys(&self) -> Vec<ForeignKey> {
        vec![ForeignKey::new(USERS_TREE, "User", &self.user_id)]
    }

    fn validate(&self) -> FormStoreResult<()> {
        require_non_empty(Self::ENTITY, "slug", &self.slug)?;
        require_non_empty(Self::ENTITY, "name", &self.name)
    }
}

/// One input field of a form. `order` drives the display sequence within
/// the form; `options` carries an arbitrary JSON payload (e.g. choices for
/// a select field) whose shape this layer does not interpret.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Field {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub label: String,
    pub placeholder: Option<String>,
    pub required: bool,
    pub order: i64,
    pub options: Option<Value>,
    pub form_id: String,
}

impl Field {
    pub fn new(
        form_id: impl Into<String>,
        kind: impl Into<String>,
        label: impl Into<String>,
        order: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind: kind.into(),
            label: label.into(),
            placeholder: None,
            required: false,
            order,
            options: None,
            form_id: form_id.into(),
        }
    }
}

impl Record for Field {
    const TREE: &'static str = FIELDS_TREE;
    const ENTITY: &'static str = "Field";

    fn id(&self) -> &str {
        &self.id
    }

    fn foreign_keys(&self) -> Vec<ForeignKey> {
        vec![ForeignKey::new(FORMS_TREE, "Form", &self.form_id)]
    }

    fn validate(&self) -> FormStoreResult<()> {
        require_non_empty(Self::ENTITY, "type", &self.kind)?;
        require_non_empty(Self::ENTITY, "label", &self.label)?;
        if self.order < 0 {
            return Err(FormStoreError::Validation {
                entity: Self::ENTITY,
                message: format!("order must be non-negative, got {}", self.order),
            });
        }
        Ok(())
    }
}

/// Optional per-form settings. At most one row per form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FormSettings {
    pub id: String,
    pub notify_email: Option<String>,
    pub webhook_url: Option<String>,
    pub form_id: String,
}

impl FormSettings {
    pub fn new(form_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            notify_email: None,
            webhook_url: None,
            form_id: form_id.into(),
        }
    }
}

impl Record for FormSettings {
    const TREE: &'static str = FORM_SETTINGS_TREE;
    const ENTITY: &'static str = "FormSettings";

    fn id(&self) -> &str {
        &self.id
    }

    fn unique_keys(&self) -> Vec<UniqueKey> {
        vec![UniqueKey::new(FORM_SETTINGS_FORM_IDX, &self.form_id)]
    }

    fn foreign_keys(&self) -> Vec<ForeignKey> {
        vec![ForeignKey::new(FORMS_TREE, "Form", &self.form_id)]
    }

    fn validate(&self) -> FormStoreResult<()> {
        require_non_empty(Self::ENTITY, "form_id", &self.form_id)
    }
}
