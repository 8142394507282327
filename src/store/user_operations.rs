//! Accessors for users and the authentication records hanging off them.

use chrono::{DateTime, Utc};

use crate::constants::{
    compound_key, ACCOUNT_PROVIDER_IDX, SESSION_TOKEN_IDX, USER_EMAIL_IDX,
    VERIFICATION_IDENTIFIER_IDX,
};
use crate::error::{FormStoreError, FormStoreResult};
use crate::model::{Account, Form, Session, User, VerificationToken};
use crate::store::core::FormStore;
use crate::store::record::Record;

impl FormStore {
    pub fn find_user_by_email(&self, email: &str) -> FormStoreResult<Option<User>> {
        self.find_by_unique(USER_EMAIL_IDX, email)
    }

    pub fn require_user_by_email(&self, email: &str) -> FormStoreResult<User> {
        self.require_by_unique(USER_EMAIL_IDX, email)
    }

    pub fn accounts_for_user(&self, user_id: &str) -> FormStoreResult<Vec<Account>> {
        let mut accounts: Vec<Account> =
            self.find_many(|a: &Account| a.user_id == user_id, &Default::default())?;
        accounts.sort_by(|a, b| (&a.provider, &a.provider_account_id).cmp(&(&b.provider, &b.provider_account_id)));
        Ok(accounts)
    }

    pub fn sessions_for_user(&self, user_id: &str) -> FormStoreResult<Vec<Session>> {
        self.find_many(|s: &Session| s.user_id == user_id, &Default::default())
    }

    /// Looks up an OAuth account by its compound (provider, provider account
    /// id) key.
    pub fn find_account_by_provider(
        &self,
        provider: &str,
        provider_account_id: &str,
    ) -> FormStoreResult<Option<Account>> {
        self.find_by_unique(
            ACCOUNT_PROVIDER_IDX,
            &compound_key(provider, provider_account_id),
        )
    }

    pub fn find_session_by_token(&self, session_token: &str) -> FormStoreResult<Option<Session>> {
        self.find_by_unique(SESSION_TOKEN_IDX, session_token)
    }

    /// Drops every session that expired at or before `now`; returns the
    /// removed count.
    pub fn delete_expired_sessions(&self, now: DateTime<Utc>) -> FormStoreResult<usize> {
        let removed = self.delete_many(|s: &Session| s.is_expired(now))?;
        if removed > 0 {
            log::info!("dropped {} expired sessions", removed);
        }
        Ok(removed)
    }

    /// Single-use verification: looks a token up by (identifier, token),
    /// deletes it, and hands it back. `None` when no such token exists;
    /// expiry is the caller's check since an expired token must still be
    /// consumed. Lookup and delete happen under one write-lock acquisition,
    /// so concurrent consumers see exactly one `Some`.
    pub fn consume_verification_token(
        &self,
        identifier: &str,
        token: &str,
    ) -> FormStoreResult<Option<VerificationToken>> {
        let _guard = self.lock_writes();
        let found: Option<VerificationToken> = self.find_by_unique(
            VERIFICATION_IDENTIFIER_IDX,
            &compound_key(identifier, token),
        )?;
        match found {
            Some(record) => {
                self.delete_locked::<VerificationToken>(&record.id)?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Deletes a user only when nothing references them; otherwise fails
    /// with `ForeignKeyViolation`. Use [`FormStore::delete_user_cascading`]
    /// to remove the user together with everything they own.
    pub fn delete_user(&self, user_id: &str) -> FormStoreResult<User> {
        let has_children = self.count(|a: &Account| a.user_id == user_id)? > 0
            || self.count(|s: &Session| s.user_id == user_id)? > 0
            || self.count(|f: &Form| f.user_id == user_id)? > 0;
        if has_children {
            return Err(FormStoreError::ForeignKeyViolation {
                entity: User::ENTITY,
                parent: User::ENTITY,
                key: user_id.to_string(),
            });
        }
        self.delete(user_id)
    }

    /// Deletes a user and everything they own: accounts, sessions, and each
    /// form with its fields, responses, values and settings. Runs as one
    /// transaction so a failure removes nothing.
    pub fn delete_user_cascading(&self, user_id: &str) -> FormStoreResult<User> {
        let removed = self.transaction(|tx| {
            let user: User = tx.require(user_id)?;
            for account in self.accounts_for_user(user_id)? {
                tx.delete::<Account>(&account.id)?;
            }
            for session in self.sessions_for_user(user_id)? {
                tx.delete::<Session>(&session.id)?;
            }
            for form in self.forms_for_user(user_id)? {
                self.stage_form_cascade(tx, &form.id)?;
            }
            tx.delete::<User>(user_id)?;
            Ok(user)
        })?;
        log::info!("cascade-deleted user {}", user_id);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing_utils::TestStoreFactory;
    use chrono::Duration;

    #[test]
    fn test_account_provider_pair_is_unique() {
        let store = TestStoreFactory::create_temp_store();
        let alice = TestStoreFactory::seed_user(&store, "alice@x.com");
        let bob = TestStoreFactory::seed_user(&store, "bob@x.com");

        store
            .insert(&Account::new(&alice.id, "oauth", "github", "gh-1"))
            .unwrap();
        // Same provider pair under a different user must be rejected.
        let err = store
            .insert(&Account::new(&bob.id, "oauth", "github", "gh-1"))
            .unwrap_err();
        assert!(matches!(err, FormStoreError::UniqueViolation { .. }));
        // A different account id under the same provider is fine.
        store
            .insert(&Account::new(&bob.id, "oauth", "github", "gh-2"))
            .unwrap();

        let found = store.find_account_by_provider("github", "gh-1").unwrap();
        assert_eq!(found.unwrap().user_id, alice.id);
    }

    #[test]
    fn test_session_token_lookup_and_expiry_sweep() {
        let store = TestStoreFactory::create_temp_store();
        let user = TestStoreFactory::seed_user(&store, "a@x.com");
        let now = Utc::now();

        let live = Session::new(&user.id, "tok-live", now + Duration::hours(1));
        let stale = Session::new(&user.id, "tok-stale", now - Duration::hours(1));
        store.insert(&live).unwrap();
        store.insert(&stale).unwrap();

        assert_eq!(store.delete_expired_sessions(now).unwrap(), 1);
        assert!(store.find_session_by_token("tok-stale").unwrap().is_none());
        assert!(store.find_session_by_token("tok-live").unwrap().is_some());
    }

    #[test]
    fn test_verification_token_is_single_use() {
        let store = TestStoreFactory::create_temp_store();
        let expires = Utc::now() + Duration::minutes(15);
        store
            .insert(&VerificationToken::new("a@x.com", "tok-1", expires))
            .unwrap();

        let first = store.consume_verification_token("a@x.com", "tok-1").unwrap();
        assert!(first.is_some());
        let second = store.consume_verification_token("a@x.com", "tok-1").unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn test_concurrent_consumers_get_token_once() {
        let store = TestStoreFactory::create_temp_store();
        let expires = Utc::now() + Duration::minutes(15);
        store
            .insert(&VerificationToken::new("a@x.com", "tok-1", expires))
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let store = store.clone();
            handles.push(std::thread::spawn(move || {
                store.consume_verification_token("a@x.com", "tok-1")
            }));
        }
        // Exactly one consumer wins; the losers see Ok(None), never an error.
        let mut consumed = 0;
        for handle in handles {
            if handle.join().unwrap().unwrap().is_some() {
                consumed += 1;
            }
        }
        assert_eq!(consumed, 1);
    }

    #[test]
    fn test_delete_user_with_children_is_rejected() {
        let store = TestStoreFactory::create_temp_store();
        let (user, _form) = {
            let user = TestStoreFactory::seed_user(&store, "a@x.com");
            let form = TestStoreFactory::seed_form(&store, &user, "survey-1");
            (user, form)
        };
        let err = store.delete_user(&user.id).unwrap_err();
        assert!(matches!(err, FormStoreError::ForeignKeyViolation { .. }));
        assert!(store.get::<User>(&user.id).unwrap().is_some());
    }

    #[test]
    fn test_delete_user_cascading_takes_owned_records() {
        let store = TestStoreFactory::create_temp_store();
        let user = TestStoreFactory::seed_user(&store, "a@x.com");
        let form = TestStoreFactory::seed_form(&store, &user, "survey-1");
        store
            .insert(&Account::new(&user.id, "oauth", "github", "gh-1"))
            .unwrap();
        store
            .insert(&Session::new(&user.id, "tok", Utc::now() + Duration::hours(1)))
            .unwrap();

        store.delete_user_cascading(&user.id).unwrap();

        assert!(store.get::<User>(&user.id).unwrap().is_none());
        assert!(store.get::<Form>(&form.id).unwrap().is_none());
        assert_eq!(store.count::<Account, _>(|_| true).unwrap(), 0);
        assert_eq!(store.count::<Session, _>(|_| true).unwrap(), 0);
    }
}
