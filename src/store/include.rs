//! Relation hydration: fetching a parent together with selected child sets.
//!
//! Dynamic `select`/`include` projection objects are reframed as typed
//! field-sets; each flag pulls one child relation with a follow-up query
//! against the child tree, sorted by the child's natural order.

use serde::Serialize;

use crate::constants::FORM_SLUG_IDX;
use crate::error::FormStoreResult;
use crate::model::{Account, Field, FieldValue, Form, FormSettings, Response, Session, User};
use crate::store::core::FormStore;

/// Which relations to hydrate alongside a [`Form`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FormInclude {
    pub fields: bool,
    pub responses: bool,
    pub settings: bool,
}

impl FormInclude {
    pub fn all() -> Self {
        Self {
            fields: true,
            responses: true,
            settings: true,
        }
    }
}

/// A form with its hydrated relations. Unrequested relations are empty.
#[derive(Debug, Clone, Serialize)]
pub struct FormWithRelations {
    pub form: Form,
    pub fields: Vec<Field>,
    pub responses: Vec<ResponseWithValues>,
    pub settings: Option<FormSettings>,
}

/// A response with its field values.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseWithValues {
    pub response: Response,
    pub values: Vec<FieldValue>,
}

/// Which relations to hydrate alongside a [`User`].
#[derive(Debug, Clone, Copy, Default)]
pub struct UserInclude {
    pub accounts: bool,
    pub sessions: bool,
    pub forms: bool,
}

impl UserInclude {
    pub fn all() -> Self {
        Self {
            accounts: true,
            sessions: true,
            forms: true,
        }
    }
}

/// A user with their hydrated relations.
#[derive(Debug, Clone, Serialize)]
pub struct UserWithRelations {
    pub user: User,
    pub accounts: Vec<Account>,
    pub sessions: Vec<Session>,
    pub forms: Vec<Form>,
}

impl FormStore {
    /// Loads a form by id with the requested relations hydrated.
    pub fn form_with_relations(
        &self,
        form_id: &str,
        include: FormInclude,
    ) -> FormStoreResult<FormWithRelations> {
        let form: Form = self.require(form_id)?;
        self.hydrate_form(form, include)
    }

    /// Loads a form by slug with the requested relations hydrated.
    pub fn form_by_slug_with_relations(
        &self,
        slug: &str,
        include: FormInclude,
    ) -> FormStoreResult<FormWithRelations> {
        let form: Form = self.require_by_unique(FORM_SLUG_IDX, slug)?;
        self.hydrate_form(form, include)
    }

    fn hydrate_form(&self, form: Form, include: FormInclude) -> FormStoreResult<FormWithRelations> {
        let fields = if include.fields {
            self.list_form_fields(&form.id)?
        } else {
            Vec::new()
        };
        let responses = if include.responses {
            let mut hydrated = Vec::new();
            for response in self.list_form_responses(&form.id)? {
                hydrated.push(self.response_with_values(&response.id)?);
            }
            hydrated
        } else {
            Vec::new()
        };
        let settings = if include.settings {
            self.settings_for_form(&form.id)?
        } else {
            None
        };
        Ok(FormWithRelations {
            form,
            fields,
            responses,
            settings,
        })
    }

    /// Loads a response together with its values, sorted by field id for a
    /// stable shape.
    pub fn response_with_values(&self, response_id: &str) -> FormStoreResult<ResponseWithValues> {
        let response: Response = self.require(response_id)?;
        let values = self.list_response_values(&response.id)?;
        Ok(ResponseWithValues { response, values })
    }

    /// Loads a user with the requested relations hydrated.
    pub fn user_with_relations(
        &self,
        user_id: &str,
        include: UserInclude,
    ) -> FormStoreResult<UserWithRelations> {
        let user: User = self.require(user_id)?;
        let accounts = if include.accounts {
            self.accounts_for_user(&user.id)?
        } else {
            Vec::new()
        };
        let sessions = if include.sessions {
            self.sessions_for_user(&user.id)?
        } else {
            Vec::new()
        };
        let forms = if include.forms {
            self.forms_for_user(&user.id)?
        } else {
            Vec::new()
        };
        Ok(UserWithRelations {
            user,
            accounts,
            sessions,
            forms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldValue, Response};
    use crate::testing_utils::TestStoreFactory;

    #[test]
    fn test_unrequested_relations_stay_empty() {
        let (store, _user, form) = TestStoreFactory::create_store_with_form();
        store
            .insert(&crate::model::Field::new(&form.id, "text", "Name", 0))
            .unwrap();

        let hydrated = store
            .form_with_relations(&form.id, FormInclude::default())
            .unwrap();
        assert!(hydrated.fields.is_empty());
        assert!(hydrated.responses.is_empty());
        assert!(hydrated.settings.is_none());
    }

    #[test]
    fn test_responses_include_their_values() {
        let (store, _user, form) = TestStoreFactory::create_store_with_form();
        let field = crate::model::Field::new(&form.id, "text", "Name", 0);
        store.insert(&field).unwrap();
        let response = Response::new(&form.id);
        store.insert(&response).unwrap();
        store
            .insert(&FieldValue::new(&response.id, &field.id, "Alice"))
            .unwrap();

        let hydrated = store
            .form_with_relations(&form.id, FormInclude::all())
            .unwrap();
        assert_eq!(hydrated.responses.len(), 1);
        assert_eq!(hydrated.responses[0].values.len(), 1);
        assert_eq!(hydrated.responses[0].values[0].value, "Alice");
    }
}
