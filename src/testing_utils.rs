//! Consolidated testing utilities for store setup and common fixtures.

use crate::config::StoreConfig;
use crate::model::{Form, User};
use crate::store::FormStore;

/// Factory for throwaway stores and seeded records used across unit and
/// integration tests.
pub struct TestStoreFactory;

impl TestStoreFactory {
    /// Create a temporary store backed by a throwaway sled database.
    pub fn create_temp_store() -> FormStore {
        let config = StoreConfig::temporary().with_flush_on_write(false);
        FormStore::open(&config).expect("Failed to open temporary store")
    }

    /// Insert and return a user with the given email.
    pub fn seed_user(store: &FormStore, email: &str) -> User {
        let user = User::new(email);
        store.insert(&user).expect("Failed to seed user");
        user
    }

    /// Insert and return a form owned by `user` with the given slug.
    pub fn seed_form(store: &FormStore, user: &User, slug: &str) -> Form {
        let form = Form::new(&user.id, slug, format!("Form {}", slug));
        store.insert(&form).expect("Failed to seed form");
        form
    }

    /// Temporary store pre-seeded with one user and one form.
    pub fn create_store_with_form() -> (FormStore, User, Form) {
        let store = Self::create_temp_store();
        let user = Self::seed_user(&store, "owner@example.com");
        let form = Self::seed_form(&store, &user, "seeded-form");
        (store, user, form)
    }
}
