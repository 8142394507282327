//! Accessors for forms: slug lookups, listings, publication state, and the
//! cascade that removes a form together with everything it owns.

use crate::constants::FORM_SLUG_IDX;
use crate::error::{FormStoreError, FormStoreResult};
use crate::model::{Field, FieldValue, Form, FormSettings, Response};
use crate::store::core::FormStore;
use crate::store::query::FindOptions;
use crate::store::record::Record;
use crate::store::transaction::Transaction;

impl FormStore {
    pub fn find_form_by_slug(&self, slug: &str) -> FormStoreResult<Option<Form>> {
        self.find_by_unique(FORM_SLUG_IDX, slug)
    }

    pub fn require_form_by_slug(&self, slug: &str) -> FormStoreResult<Form> {
        self.require_by_unique(FORM_SLUG_IDX, slug)
    }

    /// Forms owned by a user, newest first.
    pub fn forms_for_user(&self, user_id: &str) -> FormStoreResult<Vec<Form>> {
        let mut forms: Vec<Form> =
            self.find_many(|f: &Form| f.user_id == user_id, &FindOptions::default())?;
        forms.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(forms)
    }

    pub fn list_published_forms(&self) -> FormStoreResult<Vec<Form>> {
        self.find_many(|f: &Form| f.published, &FindOptions::default())
    }

    /// Flips a form to published and bumps its `updated_at`.
    pub fn publish_form(&self, form_id: &str) -> FormStoreResult<Form> {
        let mut form: Form = self.require(form_id)?;
        form.published = true;
        form.touch();
        self.update(&form)?;
        Ok(form)
    }

    /// Deletes a form only when it has no fields, responses, or settings;
    /// otherwise fails with `ForeignKeyViolation`. Use
    /// [`FormStore::delete_form_cascading`] to remove the form with its
    /// children.
    pub fn delete_form(&self, form_id: &str) -> FormStoreResult<Form> {
        let has_children = self.count(|f: &Field| f.form_id == form_id)? > 0
            || self.count(|r: &Response| r.form_id == form_id)? > 0
            || self.settings_for_form(form_id)?.is_some();
        if has_children {
            return Err(FormStoreError::ForeignKeyViolation {
                entity: Form::ENTITY,
                parent: Form::ENTITY,
                key: form_id.to_string(),
            });
        }
        self.delete(form_id)
    }

    /// Deletes a form and everything it owns: field values, responses,
    /// fields, and settings, in dependency order. Runs as one transaction
    /// so a failure removes nothing.
    pub fn delete_form_cascading(&self, form_id: &str) -> FormStoreResult<Form> {
        let removed = self.transaction(|tx| {
            let form: Form = tx.require(form_id)?;
            self.stage_form_cascade(tx, form_id)?;
            Ok(form)
        })?;
        log::info!("cascade-deleted form {} ({})", removed.slug, form_id);
        Ok(removed)
    }

    /// Stages the removal of a form and its children on an open transaction.
    /// Shared between the form cascade and the user cascade.
    pub(crate) fn stage_form_cascade(
        &self,
        tx: &mut Transaction<'_>,
        form_id: &str,
    ) -> FormStoreResult<()> {
        for response in self.find_many(|r: &Response| r.form_id == form_id, &FindOptions::default())? {
            for value in
                self.find_many(|v: &FieldValue| v.response_id == response.id, &FindOptions::default())?
            {
                tx.delete::<FieldValue>(&value.id)?;
            }
            tx.delete::<Response>(&response.id)?;
        }
        for field in self.find_many(|f: &Field| f.form_id == form_id, &FindOptions::default())? {
            tx.delete::<Field>(&field.id)?;
        }
        if let Some(settings) = self.settings_for_form(form_id)? {
            tx.delete::<FormSettings>(&settings.id)?;
        }
        tx.delete::<Form>(form_id)?;
        Ok(())
    }
}
