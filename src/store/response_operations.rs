//! Accessors for responses and the field values they carry.

use std::collections::HashMap;

use crate::constants::{compound_key, FIELD_VALUE_IDX};
use crate::error::FormStoreResult;
use crate::model::{FieldValue, Response};
use crate::store::core::FormStore;
use crate::store::query::FindOptions;

impl FormStore {
    /// Responses to a form, oldest first.
    pub fn list_form_responses(&self, form_id: &str) -> FormStoreResult<Vec<Response>> {
        let mut responses: Vec<Response> =
            self.find_many(|r: &Response| r.form_id == form_id, &FindOptions::default())?;
        responses.sort_by(|a, b| {
            a.submitted_at
                .cmp(&b.submitted_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(responses)
    }

    /// Values of one response, sorted by field id for a stable shape.
    pub fn list_response_values(&self, response_id: &str) -> FormStoreResult<Vec<FieldValue>> {
        let mut values: Vec<FieldValue> = self.find_many(
            |v: &FieldValue| v.response_id == response_id,
            &FindOptions::default(),
        )?;
        values.sort_by(|a, b| a.field_id.cmp(&b.field_id));
        Ok(values)
    }

    /// The single value a response holds for a field, if answered.
    pub fn value_for(
        &self,
        response_id: &str,
        field_id: &str,
    ) -> FormStoreResult<Option<FieldValue>> {
        self.find_by_unique(FIELD_VALUE_IDX, &compound_key(response_id, field_id))
    }

    pub fn count_form_responses(&self, form_id: &str) -> FormStoreResult<usize> {
        self.count(|r: &Response| r.form_id == form_id)
    }

    /// Submission counts grouped by form id.
    pub fn response_counts_by_form(&self) -> FormStoreResult<HashMap<String, u64>> {
        self.group_count::<Response, _, _>(|r| r.form_id.clone())
    }

    /// Deletes a response together with its values, as one transaction.
    pub fn delete_response_cascading(&self, response_id: &str) -> FormStoreResult<Response> {
        self.transaction(|tx| {
            let response: Response = tx.require(response_id)?;
            for value in self.list_response_values(response_id)? {
                tx.delete::<FieldValue>(&value.id)?;
            }
            tx.delete::<Response>(response_id)?;
            Ok(response)
        })
    }
}
