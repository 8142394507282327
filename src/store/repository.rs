//! Generic repository accessors, written once against [`Record`].
//!
//! Every entity gets the same surface: insert, bulk insert, unique lookups
//! with or-not-found variants, filtered listing with pagination, update,
//! upsert, delete, and counting. Integrity rules (unique indexes, foreign
//! keys, required-field validation) are checked here before anything touches
//! the engine; all mutating paths hold the store write lock so those checks
//! stay race-free.

use crate::constants::{
    ACCOUNTS_TREE, FIELDS_TREE, FIELD_VALUES_TREE, FORMS_TREE, FORM_SETTINGS_TREE,
    RESPONSES_TREE, SESSIONS_TREE, USERS_TREE,
};
use crate::error::{FormStoreError, FormStoreResult};
use crate::model::{Account, Field, FieldValue, Form, FormSettings, Response, Session};
use crate::store::core::FormStore;
use crate::store::query::{self, FindOptions};
use crate::store::record::Record;

impl FormStore {
    // ========== CREATE ==========

    /// Inserts one record. Fails with `UniqueViolation`,
    /// `ForeignKeyViolation` or `Validation` without writing anything.
    pub fn insert<R: Record>(&self, record: &R) -> FormStoreResult<()> {
        record.validate()?;
        let _guard = self.lock_writes();
        self.insert_locked(record)
    }

    /// Bulk insert. The whole batch is checked before anything is written:
    /// a conflicting record either fails the batch as a unit or, with
    /// `skip_duplicates`, is silently dropped. Returns the number of records
    /// written.
    pub fn insert_many<R: Record>(
        &self,
        records: &[R],
        skip_duplicates: bool,
    ) -> FormStoreResult<usize> {
        for record in records {
            record.validate()?;
        }
        let _guard = self.lock_writes();

        // Phase 1: decide which records are insertable, accounting for
        // conflicts within the batch itself.
        let mut claimed_ids: Vec<String> = Vec::new();
        let mut claimed_keys: Vec<(&'static str, String)> = Vec::new();
        let mut accepted: Vec<&R> = Vec::new();
        for record in records {
            let conflict = self.insert_conflict(record, &claimed_ids, &claimed_keys)?;
            match conflict {
                Some(err) if skip_duplicates && err.is_constraint_violation() => {
                    log::debug!("insert_many skipping duplicate {}: {}", R::ENTITY, err);
                    continue;
                }
                Some(err) => return Err(err),
                None => {}
            }
            claimed_ids.push(record.id().to_string());
            for unique in record.unique_keys() {
                claimed_keys.push((unique.index, unique.key));
            }
            accepted.push(record);
        }

        // Phase 2: apply.
        for record in &accepted {
            self.write_record_and_indexes(*record)?;
        }
        Ok(accepted.len())
    }

    /// Finds the constraint a would-be insert violates, if any.
    fn insert_conflict<R: Record>(
        &self,
        record: &R,
        claimed_ids: &[String],
        claimed_keys: &[(&'static str, String)],
    ) -> FormStoreResult<Option<FormStoreError>> {
        if claimed_ids.iter().any(|id| id == record.id())
            || self.row_exists(R::TREE, record.id())?
        {
            return Ok(Some(FormStoreError::UniqueViolation {
                entity: R::ENTITY,
                index: "id",
                key: record.id().to_string(),
            }));
        }
        for unique in record.unique_keys() {
            let taken = claimed_keys
                .iter()
                .any(|(index, key)| *index == unique.index && *key == unique.key)
                || self.index_get(unique.index, &unique.key)?.is_some();
            if taken {
                return Ok(Some(FormStoreError::UniqueViolation {
                    entity: R::ENTITY,
                    index: unique.index,
                    key: unique.key,
                }));
            }
        }
        if let Err(err) = self.check_foreign_keys(record) {
            return Ok(Some(err));
        }
        Ok(None)
    }

    /// Insert with the write lock already held.
    pub(crate) fn insert_locked<R: Record>(&self, record: &R) -> FormStoreResult<()> {
        if self.row_exists(R::TREE, record.id())? {
            return Err(FormStoreError::UniqueViolation {
                entity: R::ENTITY,
                index: "id",
                key: record.id().to_string(),
            });
        }
        self.check_foreign_keys(record)?;
        self.check_unique_keys(record, false)?;
        self.write_record_and_indexes(record)
    }

    fn write_record_and_indexes<R: Record>(&self, record: &R) -> FormStoreResult<()> {
        self.put_record(record)?;
        for unique in record.unique_keys() {
            self.index_put(unique.index, &unique.key, record.id())?;
        }
        Ok(())
    }

    // ========== READ ==========

    /// Primary-key lookup; `None` when absent.
    pub fn get<R: Record>(&self, id: &str) -> FormStoreResult<Option<R>> {
        self.read_record(id)
    }

    /// Primary-key lookup that fails with `NotFound` when absent.
    pub fn require<R: Record>(&self, id: &str) -> FormStoreResult<R> {
        self.get(id)?.ok_or_else(|| FormStoreError::NotFound {
            entity: R::ENTITY,
            key: id.to_string(),
        })
    }

    /// Unique-index lookup; `None` when the key is unclaimed.
    pub fn find_by_unique<R: Record>(
        &self,
        index: &'static str,
        key: &str,
    ) -> FormStoreResult<Option<R>> {
        match self.index_get(index, key)? {
            Some(id) => match self.read_record(&id)? {
                Some(record) => Ok(Some(record)),
                None => Err(FormStoreError::Database(format!(
                    "index {} points at missing {} row '{}'",
                    index,
                    R::ENTITY,
                    id
                ))),
            },
            None => Ok(None),
        }
    }

    /// Unique-index lookup that fails with `NotFound`.
    pub fn require_by_unique<R: Record>(
        &self,
        index: &'static str,
        key: &str,
    ) -> FormStoreResult<R> {
        self.find_by_unique(index, key)?
            .ok_or_else(|| FormStoreError::NotFound {
                entity: R::ENTITY,
                key: key.to_string(),
            })
    }

    /// Lists records matching `filter`, ordered by primary key and paged
    /// per `options`.
    pub fn find_many<R, F>(&self, filter: F, options: &FindOptions) -> FormStoreResult<Vec<R>>
    where
        R: Record,
        F: Fn(&R) -> bool,
    {
        let rows: Vec<R> = self.scan_records()?;
        let matching: Vec<R> = rows.into_iter().filter(|r| filter(r)).collect();
        Ok(query::page(matching, options))
    }

    /// First record matching `filter` under the given ordering, if any.
    pub fn find_first<R, F>(&self, filter: F, options: &FindOptions) -> FormStoreResult<Option<R>>
    where
        R: Record,
        F: Fn(&R) -> bool,
    {
        let mut options = options.clone();
        options.take = Some(1);
        Ok(self.find_many(filter, &options)?.into_iter().next())
    }

    /// Counts records matching `filter`.
    pub fn count<R, F>(&self, filter: F) -> FormStoreResult<usize>
    where
        R: Record,
        F: Fn(&R) -> bool,
    {
        let rows: Vec<R> = self.scan_records()?;
        Ok(rows.iter().filter(|r| filter(r)).count())
    }

    // ========== UPDATE ==========

    /// Replaces the record with the same id. `NotFound` when the id does
    /// not exist; unique indexes are kept in sync with changed columns.
    pub fn update<R: Record>(&self, record: &R) -> FormStoreResult<()> {
        record.validate()?;
        let _guard = self.lock_writes();
        self.update_locked(record)
    }

    /// Update with the write lock already held.
    pub(crate) fn update_locked<R: Record>(&self, record: &R) -> FormStoreResult<()> {
        let old: R = self
            .read_record(record.id())?
            .ok_or_else(|| FormStoreError::NotFound {
                entity: R::ENTITY,
                key: record.id().to_string(),
            })?;
        self.check_foreign_keys(record)?;
        self.check_unique_keys(record, true)?;

        let new_keys = record.unique_keys();
        for unique in old.unique_keys() {
            if !new_keys.contains(&unique) {
                self.index_remove(unique.index, &unique.key)?;
            }
        }
        self.write_record_and_indexes(record)
    }

    /// Applies `mutate` to every record matching `filter`; returns the
    /// affected count. The whole batch is validated before any row is
    /// written.
    pub fn update_many<R, F, M>(&self, filter: F, mutate: M) -> FormStoreResult<usize>
    where
        R: Record,
        F: Fn(&R) -> bool,
        M: Fn(&mut R),
    {
        let _guard = self.lock_writes();
        let rows: Vec<R> = self.scan_records()?;
        let mut updated: Vec<R> = Vec::new();
        for row in rows.into_iter().filter(|r| filter(r)) {
            let mut next = row.clone();
            mutate(&mut next);
            if next.id() != row.id() {
                return Err(FormStoreError::Validation {
                    entity: R::ENTITY,
                    message: "update_many must not change record ids".to_string(),
                });
            }
            next.validate()?;
            updated.push(next);
        }
        // Unique keys are checked against the index and against the rest of
        // the batch, so a conflict fails the call before any row is written.
        let mut claimed_keys: Vec<(&'static str, String)> = Vec::new();
        for next in &updated {
            self.check_foreign_keys(next)?;
            self.check_unique_keys(next, true)?;
            for unique in next.unique_keys() {
                if claimed_keys
                    .iter()
                    .any(|(index, key)| *index == unique.index && *key == unique.key)
                {
                    return Err(FormStoreError::UniqueViolation {
                        entity: R::ENTITY,
                        index: unique.index,
                        key: unique.key,
                    });
                }
                claimed_keys.push((unique.index, unique.key));
            }
        }
        let count = updated.len();
        for next in updated {
            self.update_locked(&next)?;
        }
        Ok(count)
    }

    /// Update-if-exists-else-insert on a unique index, atomic with respect
    /// to other writers. Calling twice with the same payloads updates the
    /// existing row rather than inserting a duplicate.
    pub fn upsert<R, C, U>(
        &self,
        index: &'static str,
        key: &str,
        create: C,
        update: U,
    ) -> FormStoreResult<R>
    where
        R: Record,
        C: FnOnce() -> R,
        U: FnOnce(&mut R),
    {
        let _guard = self.lock_writes();
        match self.find_by_unique::<R>(index, key)? {
            Some(mut existing) => {
                update(&mut existing);
                existing.validate()?;
                self.update_locked(&existing)?;
                Ok(existing)
            }
            None => {
                let record = create();
                record.validate()?;
                self.insert_locked(&record)?;
                Ok(record)
            }
        }
    }

    // ========== DELETE ==========

    /// Removes one row and its index entries, returning the deleted record.
    /// Fails with `ForeignKeyViolation` while child rows still reference it;
    /// the entity accessors provide explicit cascading variants.
    pub fn delete<R: Record>(&self, id: &str) -> FormStoreResult<R> {
        let _guard = self.lock_writes();
        self.delete_locked(id)
    }

    /// Delete with the write lock already held.
    pub(crate) fn delete_locked<R: Record>(&self, id: &str) -> FormStoreResult<R> {
        let old: R = self
            .read_record(id)?
            .ok_or_else(|| FormStoreError::NotFound {
                entity: R::ENTITY,
                key: id.to_string(),
            })?;
        self.check_not_referenced(R::TREE, R::ENTITY, id)?;
        for unique in old.unique_keys() {
            self.index_remove(unique.index, &unique.key)?;
        }
        self.remove_record::<R>(id)?;
        Ok(old)
    }

    /// Removes every row matching `filter`; returns the removed count. The
    /// whole batch is checked for child references before any row is
    /// removed, so a referenced parent fails the call with nothing deleted.
    pub fn delete_many<R, F>(&self, filter: F) -> FormStoreResult<usize>
    where
        R: Record,
        F: Fn(&R) -> bool,
    {
        let _guard = self.lock_writes();
        let rows: Vec<R> = self.scan_records()?;
        let matching: Vec<R> = rows.into_iter().filter(|r| filter(r)).collect();
        for row in &matching {
            self.check_not_referenced(R::TREE, R::ENTITY, row.id())?;
        }
        for row in &matching {
            self.delete_locked::<R>(row.id())?;
        }
        Ok(matching.len())
    }

    // ========== CONSTRAINT CHECKS ==========

    pub(crate) fn check_unique_keys<R: Record>(
        &self,
        record: &R,
        allow_self: bool,
    ) -> FormStoreResult<()> {
        for unique in record.unique_keys() {
            if let Some(existing) = self.index_get(unique.index, &unique.key)? {
                if !(allow_self && existing == record.id()) {
                    return Err(FormStoreError::UniqueViolation {
                        entity: R::ENTITY,
                        index: unique.index,
                        key: unique.key,
                    });
                }
            }
        }
        Ok(())
    }

    pub(crate) fn check_foreign_keys<R: Record>(&self, record: &R) -> FormStoreResult<()> {
        for fk in record.foreign_keys() {
            if !self.row_exists(fk.parent_tree, &fk.id)? {
                return Err(FormStoreError::ForeignKeyViolation {
                    entity: R::ENTITY,
                    parent: fk.parent_entity,
                    key: fk.id,
                });
            }
        }
        Ok(())
    }

    /// Child rows that still reference the row `(tree, id)`, as
    /// `(child_tree, child_id)` pairs. This is the reverse of the
    /// [`Record::foreign_keys`] edges.
    pub(crate) fn child_rows_referencing(
        &self,
        tree: &'static str,
        id: &str,
    ) -> FormStoreResult<Vec<(&'static str, String)>> {
        let mut children = Vec::new();
        match tree {
            USERS_TREE => {
                for account in self.scan_records::<Account>()? {
                    if account.user_id == id {
                        children.push((ACCOUNTS_TREE, account.id));
                    }
                }
                for session in self.scan_records::<Session>()? {
                    if session.user_id == id {
                        children.push((SESSIONS_TREE, session.id));
                    }
                }
                for form in self.scan_records::<Form>()? {
                    if form.user_id == id {
                        children.push((FORMS_TREE, form.id));
                    }
                }
            }
            FORMS_TREE => {
                for field in self.scan_records::<Field>()? {
                    if field.form_id == id {
                        children.push((FIELDS_TREE, field.id));
                    }
                }
                for response in self.scan_records::<Response>()? {
                    if response.form_id == id {
                        children.push((RESPONSES_TREE, response.id));
                    }
                }
                for settings in self.scan_records::<FormSettings>()? {
                    if settings.form_id == id {
                        children.push((FORM_SETTINGS_TREE, settings.id));
                    }
                }
            }
            RESPONSES_TREE => {
                for value in self.scan_records::<FieldValue>()? {
                    if value.response_id == id {
                        children.push((FIELD_VALUES_TREE, value.id));
                    }
                }
            }
            FIELDS_TREE => {
                for value in self.scan_records::<FieldValue>()? {
                    if value.field_id == id {
                        children.push((FIELD_VALUES_TREE, value.id));
                    }
                }
            }
            _ => {}
        }
        Ok(children)
    }

    /// Rejects the removal of a row that child rows still reference.
    pub(crate) fn check_not_referenced(
        &self,
        tree: &'static str,
        entity: &'static str,
        id: &str,
    ) -> FormStoreResult<()> {
        if !self.child_rows_referencing(tree, id)?.is_empty() {
            return Err(FormStoreError::ForeignKeyViolation {
                entity,
                parent: entity,
                key: id.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::constants::USER_EMAIL_IDX;
    use crate::error::FormStoreError;
    use crate::model::{Field, Form, User};
    use crate::store::query::FindOptions;
    use crate::testing_utils::TestStoreFactory;

    #[test]
    fn test_insert_and_get_roundtrip() {
        let store = TestStoreFactory::create_temp_store();
        let user = User::new("a@x.com");
        store.insert(&user).unwrap();

        let loaded: User = store.require(&user.id).unwrap();
        assert_eq!(loaded, user);
    }

    #[test]
    fn test_duplicate_email_rejected() {
        let store = TestStoreFactory::create_temp_store();
        store.insert(&User::new("a@x.com")).unwrap();
        let err = store.insert(&User::new("a@x.com")).unwrap_err();
        assert!(matches!(err, FormStoreError::UniqueViolation { .. }));
        assert_eq!(store.count::<User, _>(|_| true).unwrap(), 1);
    }

    #[test]
    fn test_update_to_taken_email_rejected() {
        let store = TestStoreFactory::create_temp_store();
        store.insert(&User::new("a@x.com")).unwrap();
        let mut second = User::new("b@x.com");
        store.insert(&second).unwrap();

        second.email = "a@x.com".to_string();
        let err = store.update(&second).unwrap_err();
        assert!(matches!(err, FormStoreError::UniqueViolation { .. }));
    }

    #[test]
    fn test_email_change_moves_index_entry() {
        let store = TestStoreFactory::create_temp_store();
        let mut user = User::new("old@x.com");
        store.insert(&user).unwrap();

        user.email = "new@x.com".to_string();
        user.touch();
        store.update(&user).unwrap();

        let by_new: Option<User> = store.find_by_unique(USER_EMAIL_IDX, "new@x.com").unwrap();
        assert!(by_new.is_some());
        let by_old: Option<User> = store.find_by_unique(USER_EMAIL_IDX, "old@x.com").unwrap();
        assert!(by_old.is_none());
    }

    #[test]
    fn test_insert_with_missing_parent_rejected() {
        let store = TestStoreFactory::create_temp_store();
        let form = Form::new("no-such-user", "survey", "Survey");
        let err = store.insert(&form).unwrap_err();
        match err {
            FormStoreError::ForeignKeyViolation { parent, .. } => assert_eq!(parent, "User"),
            other => panic!("expected foreign key violation, got {}", other),
        }
    }

    #[test]
    fn test_require_missing_is_not_found() {
        let store = TestStoreFactory::create_temp_store();
        let missing: Option<User> = store.get("nope").unwrap();
        assert!(missing.is_none());
        let err = store.require::<User>("nope").unwrap_err();
        assert!(matches!(err, FormStoreError::NotFound { .. }));
    }

    #[test]
    fn test_update_missing_is_not_found() {
        let store = TestStoreFactory::create_temp_store();
        let err = store.update(&User::new("ghost@x.com")).unwrap_err();
        assert!(matches!(err, FormStoreError::NotFound { .. }));
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let store = TestStoreFactory::create_temp_store();
        for _ in 0..2 {
            store
                .upsert::<User, _, _>(
                    USER_EMAIL_IDX,
                    "a@x.com",
                    || {
                        let mut user = User::new("a@x.com");
                        user.name = Some("Alice".to_string());
                        user
                    },
                    |user| {
                        user.name = Some("Alice".to_string());
                        user.touch();
                    },
                )
                .unwrap();
        }
        assert_eq!(store.count::<User, _>(|_| true).unwrap(), 1);
        let user: User = store.require_by_unique(USER_EMAIL_IDX, "a@x.com").unwrap();
        assert_eq!(user.name.as_deref(), Some("Alice"));
    }

    #[test]
    fn test_insert_many_skip_duplicates() {
        let store = TestStoreFactory::create_temp_store();
        let users = vec![
            User::new("a@x.com"),
            User::new("b@x.com"),
            User::new("a@x.com"),
        ];
        let inserted = store.insert_many(&users, true).unwrap();
        assert_eq!(inserted, 2);
    }

    #[test]
    fn test_insert_many_without_skip_is_all_or_nothing() {
        let store = TestStoreFactory::create_temp_store();
        let users = vec![
            User::new("a@x.com"),
            User::new("b@x.com"),
            User::new("a@x.com"),
        ];
        let err = store.insert_many(&users, false).unwrap_err();
        assert!(matches!(err, FormStoreError::UniqueViolation { .. }));
        assert_eq!(store.count::<User, _>(|_| true).unwrap(), 0);
    }

    #[test]
    fn test_delete_returns_record_and_frees_unique_key() {
        let store = TestStoreFactory::create_temp_store();
        let user = User::new("a@x.com");
        store.insert(&user).unwrap();

        let removed: User = store.delete(&user.id).unwrap();
        assert_eq!(removed.email, "a@x.com");

        // The email can be claimed again.
        store.insert(&User::new("a@x.com")).unwrap();
    }

    #[test]
    fn test_find_many_pagination() {
        let store = TestStoreFactory::create_temp_store();
        for i in 0..5 {
            store.insert(&User::new(format!("u{}@x.com", i))).unwrap();
        }
        let first_page: Vec<User> = store
            .find_many(|_| true, &FindOptions::new().take(2))
            .unwrap();
        assert_eq!(first_page.len(), 2);

        let second_page: Vec<User> = store
            .find_many(|_| true, &FindOptions::new().after(first_page[1].id.as_str()).take(2))
            .unwrap();
        assert_eq!(second_page.len(), 2);
        assert!(first_page[1].id < second_page[0].id);
    }

    #[test]
    fn test_delete_of_referenced_parent_rejected() {
        let store = TestStoreFactory::create_temp_store();
        let user = TestStoreFactory::seed_user(&store, "a@x.com");
        let form = TestStoreFactory::seed_form(&store, &user, "survey");
        let field = Field::new(&form.id, "text", "Name", 0);
        store.insert(&field).unwrap();

        let err = store.delete::<Form>(&form.id).unwrap_err();
        assert!(matches!(err, FormStoreError::ForeignKeyViolation { .. }));
        assert!(store.get::<Form>(&form.id).unwrap().is_some());
        assert!(store.get::<Field>(&field.id).unwrap().is_some());

        let err = store.delete::<User>(&user.id).unwrap_err();
        assert!(matches!(err, FormStoreError::ForeignKeyViolation { .. }));
    }

    #[test]
    fn test_delete_many_of_referenced_parents_removes_nothing() {
        let store = TestStoreFactory::create_temp_store();
        let user = TestStoreFactory::seed_user(&store, "a@x.com");
        TestStoreFactory::seed_form(&store, &user, "leaf");
        let parent = TestStoreFactory::seed_form(&store, &user, "parent");
        store
            .insert(&Field::new(&parent.id, "text", "Name", 0))
            .unwrap();

        let err = store.delete_many::<Form, _>(|_| true).unwrap_err();
        assert!(matches!(err, FormStoreError::ForeignKeyViolation { .. }));
        // The unreferenced form survives too; the batch applied nothing.
        assert_eq!(store.count::<Form, _>(|_| true).unwrap(), 2);
    }

    #[test]
    fn test_update_many_conflicting_mutation_writes_nothing() {
        let store = TestStoreFactory::create_temp_store();
        store.insert(&User::new("a@x.com")).unwrap();
        store.insert(&User::new("b@x.com")).unwrap();

        // Both rows mutate onto the same unique key; the batch must fail
        // before either row is written.
        let err = store
            .update_many::<User, _, _>(|_| true, |u| u.email = "same@x.com".to_string())
            .unwrap_err();
        assert!(matches!(err, FormStoreError::UniqueViolation { .. }));
        assert!(store.find_user_by_email("same@x.com").unwrap().is_none());
        assert!(store.find_user_by_email("a@x.com").unwrap().is_some());
        assert!(store.find_user_by_email("b@x.com").unwrap().is_some());
    }

    #[test]
    fn test_update_many_counts_matches() {
        let store = TestStoreFactory::create_temp_store();
        store.insert(&User::new("a@x.com")).unwrap();
        store.insert(&User::new("b@x.com")).unwrap();

        let affected = store
            .update_many::<User, _, _>(
                |u| u.email.starts_with('a'),
                |u| {
                    u.name = Some("Renamed".to_string());
                    u.touch();
                },
            )
            .unwrap();
        assert_eq!(affected, 1);
    }
}
