//! Accessors for form fields. `order` drives display sequence, so listings
//! sort by it rather than by primary key.

use crate::error::FormStoreResult;
use crate::model::{Field, FieldValue};
use crate::store::core::FormStore;
use crate::store::query::FindOptions;

impl FormStore {
    /// Fields of a form in display order (ties broken by id for stability).
    pub fn list_form_fields(&self, form_id: &str) -> FormStoreResult<Vec<Field>> {
        let mut fields: Vec<Field> =
            self.find_many(|f: &Field| f.form_id == form_id, &FindOptions::default())?;
        fields.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
        Ok(fields)
    }

    /// The next free `order` slot at the end of a form.
    pub fn next_field_order(&self, form_id: &str) -> FormStoreResult<i64> {
        let agg = self.aggregate_i64::<Field, _, _>(|f| f.form_id == form_id, |f| Some(f.order))?;
        Ok(agg.max.map_or(0, |max| max + 1))
    }

    /// Moves a field to a new display position.
    pub fn reorder_field(&self, field_id: &str, order: i64) -> FormStoreResult<Field> {
        let mut field: Field = self.require(field_id)?;
        field.order = order;
        self.update(&field)?;
        Ok(field)
    }

    /// Values submitted for one field across all responses.
    pub fn values_for_field(&self, field_id: &str) -> FormStoreResult<Vec<FieldValue>> {
        self.find_many(|v: &FieldValue| v.field_id == field_id, &FindOptions::default())
    }

    /// Deletes a field together with the values referencing it, as one
    /// transaction.
    pub fn delete_field_cascading(&self, field_id: &str) -> FormStoreResult<Field> {
        self.transaction(|tx| {
            let field: Field = tx.require(field_id)?;
            for value in self.values_for_field(field_id)? {
                tx.delete::<FieldValue>(&value.id)?;
            }
            tx.delete::<Field>(field_id)?;
            Ok(field)
        })
    }
}
