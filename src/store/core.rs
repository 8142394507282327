use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::time::{Duration, Instant};

use crate::config::{StoreConfig, TransactionDefaults};
use crate::constants::*;
use crate::error::{FormStoreError, FormStoreResult};
use crate::store::record::Record;

/// Handle to the form store: the sled database plus one cached tree per
/// entity and per unique index.
///
/// Explicitly constructed via [`FormStore::open`] and dependency-injected
/// into callers; there is no ambient global instance. Cloning is cheap and
/// clones share the same underlying database and write lock.
#[derive(Clone)]
pub struct FormStore {
    /// The underlying sled database instance
    db: sled::Db,
    flush_on_write: bool,
    tx_defaults: TransactionDefaults,
    /// Serializes all mutating paths so unique/foreign-key checks stay
    /// race-free. Reads never take it.
    write_lock: Arc<Mutex<()>>,

    // Cached entity trees
    pub(crate) users_tree: sled::Tree,
    pub(crate) accounts_tree: sled::Tree,
    pub(crate) sessions_tree: sled::Tree,
    pub(crate) verification_tokens_tree: sled::Tree,
    pub(crate) forms_tree: sled::Tree,
    pub(crate) fields_tree: sled::Tree,
    pub(crate) responses_tree: sled::Tree,
    pub(crate) field_values_tree: sled::Tree,
    pub(crate) form_settings_tree: sled::Tree,

    // Cached unique-index trees
    pub(crate) user_email_idx: sled::Tree,
    pub(crate) account_provider_idx: sled::Tree,
    pub(crate) session_token_idx: sled::Tree,
    pub(crate) verification_token_idx: sled::Tree,
    pub(crate) verification_identifier_idx: sled::Tree,
    pub(crate) form_slug_idx: sled::Tree,
    pub(crate) field_value_idx: sled::Tree,
    pub(crate) form_settings_form_idx: sled::Tree,
}

impl FormStore {
    /// Opens the store described by `config`, creating all trees.
    pub fn open(config: &StoreConfig) -> FormStoreResult<Self> {
        config.validate()?;

        let mut builder = sled::Config::new();
        if config.temporary {
            builder = builder.temporary(true);
        } else {
            builder = builder.path(&config.storage_path);
        }
        let db = builder.open()?;

        let store = Self {
            users_tree: db.open_tree(USERS_TREE)?,
            accounts_tree: db.open_tree(ACCOUNTS_TREE)?,
            sessions_tree: db.open_tree(SESSIONS_TREE)?,
            verification_tokens_tree: db.open_tree(VERIFICATION_TOKENS_TREE)?,
            forms_tree: db.open_tree(FORMS_TREE)?,
            fields_tree: db.open_tree(FIELDS_TREE)?,
            responses_tree: db.open_tree(RESPONSES_TREE)?,
            field_values_tree: db.open_tree(FIELD_VALUES_TREE)?,
            form_settings_tree: db.open_tree(FORM_SETTINGS_TREE)?,
            user_email_idx: db.open_tree(USER_EMAIL_IDX)?,
            account_provider_idx: db.open_tree(ACCOUNT_PROVIDER_IDX)?,
            session_token_idx: db.open_tree(SESSION_TOKEN_IDX)?,
            verification_token_idx: db.open_tree(VERIFICATION_TOKEN_IDX)?,
            verification_identifier_idx: db.open_tree(VERIFICATION_IDENTIFIER_IDX)?,
            form_slug_idx: db.open_tree(FORM_SLUG_IDX)?,
            field_value_idx: db.open_tree(FIELD_VALUE_IDX)?,
            form_settings_form_idx: db.open_tree(FORM_SETTINGS_FORM_IDX)?,
            flush_on_write: config.flush_on_write,
            tx_defaults: config.transaction.clone(),
            write_lock: Arc::new(Mutex::new(())),
            db,
        };

        log::info!(
            "formstore opened ({})",
            if config.temporary {
                "temporary".to_string()
            } else {
                config.storage_path.display().to_string()
            }
        );
        Ok(store)
    }

    /// Gets a reference to the underlying database
    pub fn db(&self) -> &sled::Db {
        &self.db
    }

    /// Transaction bounds configured for this store.
    pub fn transaction_defaults(&self) -> &TransactionDefaults {
        &self.tx_defaults
    }

    /// Flushes everything to disk. Called on shutdown; safe to skip since
    /// sled also flushes on drop.
    pub fn close(&self) {
        if let Err(e) = self.db.flush() {
            log::error!("Failed to flush database: {}", e);
        }
    }

    /// Resolves an entity tree by name.
    pub(crate) fn entity_tree(&self, name: &str) -> FormStoreResult<&sled::Tree> {
        match name {
            USERS_TREE => Ok(&self.users_tree),
            ACCOUNTS_TREE => Ok(&self.accounts_tree),
            SESSIONS_TREE => Ok(&self.sessions_tree),
            VERIFICATION_TOKENS_TREE => Ok(&self.verification_tokens_tree),
            FORMS_TREE => Ok(&self.forms_tree),
            FIELDS_TREE => Ok(&self.fields_tree),
            RESPONSES_TREE => Ok(&self.responses_tree),
            FIELD_VALUES_TREE => Ok(&self.field_values_tree),
            FORM_SETTINGS_TREE => Ok(&self.form_settings_tree),
            other => Err(FormStoreError::Database(format!(
                "unknown entity tree '{}'",
                other
            ))),
        }
    }

    /// Resolves a unique-index tree by name.
    pub(crate) fn index_tree(&self, name: &str) -> FormStoreResult<&sled::Tree> {
        match name {
            USER_EMAIL_IDX => Ok(&self.user_email_idx),
            ACCOUNT_PROVIDER_IDX => Ok(&self.account_provider_idx),
            SESSION_TOKEN_IDX => Ok(&self.session_token_idx),
            VERIFICATION_TOKEN_IDX => Ok(&self.verification_token_idx),
            VERIFICATION_IDENTIFIER_IDX => Ok(&self.verification_identifier_idx),
            FORM_SLUG_IDX => Ok(&self.form_slug_idx),
            FIELD_VALUE_IDX => Ok(&self.field_value_idx),
            FORM_SETTINGS_FORM_IDX => Ok(&self.form_settings_form_idx),
            other => Err(FormStoreError::Database(format!(
                "unknown index tree '{}'",
                other
            ))),
        }
    }

    // ========== GENERIC TREE OPERATIONS ==========

    /// Serializes and writes a record into its entity tree.
    pub(crate) fn put_record<R: Record>(&self, record: &R) -> FormStoreResult<()> {
        let tree = self.entity_tree(R::TREE)?;
        let bytes = serde_json::to_vec(record)?;
        tree.insert(record.id().as_bytes(), bytes)?;
        self.maybe_flush(tree)?;
        Ok(())
    }

    /// Reads and deserializes a record from its entity tree.
    pub(crate) fn read_record<R: Record>(&self, id: &str) -> FormStoreResult<Option<R>> {
        let tree = self.entity_tree(R::TREE)?;
        match tree.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Removes a record row; true when it existed.
    pub(crate) fn remove_record<R: Record>(&self, id: &str) -> FormStoreResult<bool> {
        let tree = self.entity_tree(R::TREE)?;
        let existed = tree.remove(id.as_bytes())?.is_some();
        self.maybe_flush(tree)?;
        Ok(existed)
    }

    /// Whether a row exists in the named entity tree.
    pub(crate) fn row_exists(&self, tree_name: &str, id: &str) -> FormStoreResult<bool> {
        Ok(self.entity_tree(tree_name)?.contains_key(id.as_bytes())?)
    }

    /// Loads every record of an entity. Filtering and ordering happen in
    /// memory on top of this.
    pub(crate) fn scan_records<R: Record>(&self) -> FormStoreResult<Vec<R>> {
        let tree = self.entity_tree(R::TREE)?;
        let mut records = Vec::new();
        for entry in tree.iter() {
            let (key, bytes) = entry?;
            let record: R = serde_json::from_slice(&bytes).map_err(|e| {
                FormStoreError::Serialization(format!(
                    "failed to decode {} '{}': {}",
                    R::ENTITY,
                    String::from_utf8_lossy(&key),
                    e
                ))
            })?;
            records.push(record);
        }
        Ok(records)
    }

    /// Looks up the record id occupying a unique-index key, if any.
    pub(crate) fn index_get(&self, index: &str, key: &str) -> FormStoreResult<Option<String>> {
        let tree = self.index_tree(index)?;
        match tree.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).to_string())),
            None => Ok(None),
        }
    }

    /// Claims a unique-index key for a record id.
    pub(crate) fn index_put(&self, index: &str, key: &str, id: &str) -> FormStoreResult<()> {
        let tree = self.index_tree(index)?;
        tree.insert(key.as_bytes(), id.as_bytes())?;
        self.maybe_flush(tree)?;
        Ok(())
    }

    /// Releases a unique-index key.
    pub(crate) fn index_remove(&self, index: &str, key: &str) -> FormStoreResult<()> {
        let tree = self.index_tree(index)?;
        tree.remove(key.as_bytes())?;
        self.maybe_flush(tree)?;
        Ok(())
    }

    pub(crate) fn maybe_flush(&self, tree: &sled::Tree) -> FormStoreResult<()> {
        if self.flush_on_write {
            tree.flush()?;
        }
        Ok(())
    }

    // ========== WRITE SERIALIZATION ==========

    /// Takes the store write lock, recovering from poisoning (a panicked
    /// writer leaves the trees themselves consistent enough to continue).
    pub(crate) fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Takes the write lock, giving up after `max_wait`.
    pub(crate) fn lock_writes_bounded(
        &self,
        max_wait: Duration,
    ) -> FormStoreResult<MutexGuard<'_, ()>> {
        let start = Instant::now();
        loop {
            match self.write_lock.try_lock() {
                Ok(guard) => return Ok(guard),
                Err(TryLockError::Poisoned(poisoned)) => return Ok(poisoned.into_inner()),
                Err(TryLockError::WouldBlock) => {
                    if start.elapsed() >= max_wait {
                        return Err(FormStoreError::TransactionAborted(format!(
                            "could not acquire write lock within {:?}",
                            max_wait
                        )));
                    }
                    std::thread::sleep(Duration::from_millis(1));
                }
            }
        }
    }

    /// Row counts per entity tree.
    pub fn stats(&self) -> HashMap<String, u64> {
        let mut stats = HashMap::new();
        stats.insert("users".to_string(), self.users_tree.len() as u64);
        stats.insert("accounts".to_string(), self.accounts_tree.len() as u64);
        stats.insert("sessions".to_string(), self.sessions_tree.len() as u64);
        stats.insert(
            "verification_tokens".to_string(),
            self.verification_tokens_tree.len() as u64,
        );
        stats.insert("forms".to_string(), self.forms_tree.len() as u64);
        stats.insert("fields".to_string(), self.fields_tree.len() as u64);
        stats.insert("responses".to_string(), self.responses_tree.len() as u64);
        stats.insert(
            "field_values".to_string(),
            self.field_values_tree.len() as u64,
        );
        stats.insert(
            "form_settings".to_string(),
            self.form_settings_tree.len() as u64,
        );
        stats
    }
}
