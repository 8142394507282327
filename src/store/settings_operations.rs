//! Accessors for the optional per-form settings row.

use crate::constants::FORM_SETTINGS_FORM_IDX;
use crate::error::FormStoreResult;
use crate::model::FormSettings;
use crate::store::core::FormStore;

impl FormStore {
    /// The settings row of a form, if one exists.
    pub fn settings_for_form(&self, form_id: &str) -> FormStoreResult<Option<FormSettings>> {
        self.find_by_unique(FORM_SETTINGS_FORM_IDX, form_id)
    }

    /// Creates or updates the single settings row of a form.
    pub fn upsert_form_settings(
        &self,
        form_id: &str,
        notify_email: Option<String>,
        webhook_url: Option<String>,
    ) -> FormStoreResult<FormSettings> {
        let form_id_owned = form_id.to_string();
        let create_email = notify_email.clone();
        let create_url = webhook_url.clone();
        self.upsert(
            FORM_SETTINGS_FORM_IDX,
            form_id,
            move || {
                let mut settings = FormSettings::new(form_id_owned);
                settings.notify_email = create_email;
                settings.webhook_url = create_url;
                settings
            },
            move |settings| {
                settings.notify_email = notify_email;
                settings.webhook_url = webhook_url;
            },
        )
    }

    /// Removes a form's settings row; `None` when there was none.
    pub fn remove_form_settings(&self, form_id: &str) -> FormStoreResult<Option<FormSettings>> {
        match self.settings_for_form(form_id)? {
            Some(settings) => Ok(Some(self.delete(&settings.id)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FormStoreError;
    use crate::testing_utils::TestStoreFactory;

    #[test]
    fn test_at_most_one_settings_row_per_form() {
        let (store, _user, form) = TestStoreFactory::create_store_with_form();
        store.insert(&FormSettings::new(&form.id)).unwrap();

        let err = store.insert(&FormSettings::new(&form.id)).unwrap_err();
        assert!(matches!(err, FormStoreError::UniqueViolation { .. }));
    }

    #[test]
    fn test_upsert_settings_creates_then_updates() {
        let (store, _user, form) = TestStoreFactory::create_store_with_form();

        let created = store
            .upsert_form_settings(&form.id, Some("ops@x.com".to_string()), None)
            .unwrap();
        assert_eq!(created.notify_email.as_deref(), Some("ops@x.com"));

        let updated = store
            .upsert_form_settings(
                &form.id,
                Some("alerts@x.com".to_string()),
                Some("https://hooks.x.com/1".to_string()),
            )
            .unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.notify_email.as_deref(), Some("alerts@x.com"));
        assert_eq!(store.count::<FormSettings, _>(|_| true).unwrap(), 1);
    }

    #[test]
    fn test_remove_settings() {
        let (store, _user, form) = TestStoreFactory::create_store_with_form();
        assert!(store.remove_form_settings(&form.id).unwrap().is_none());

        store.insert(&FormSettings::new(&form.id)).unwrap();
        assert!(store.remove_form_settings(&form.id).unwrap().is_some());
        assert!(store.settings_for_form(&form.id).unwrap().is_none());
    }
}
