//! Interactive multi-operation transactions.
//!
//! A transaction stages its writes in an overlay; reads inside the
//! transaction see staged state over the base trees. Nothing touches the
//! engine until commit, which re-validates every staged operation in order
//! and then applies them all, so a failing operation leaves no partial
//! writes. All commits serialize on the store write lock; `Serializable`
//! additionally holds the lock across the interactive closure.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::config::TransactionDefaults;
use crate::error::{FormStoreError, FormStoreResult};
use crate::store::core::FormStore;
use crate::store::record::{ForeignKey, Record, UniqueKey};

/// Isolation requested for a transaction. Commits always serialize on the
/// store write lock, so nothing weaker than `ReadCommitted` is ever
/// observable; `Serializable` holds the lock for the whole interactive
/// closure instead of just the commit step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    #[default]
    Serializable,
}

/// Bounds and isolation for one transaction.
#[derive(Debug, Clone)]
pub struct TransactionOptions {
    /// Maximum time to wait for the store write lock.
    pub max_wait: Duration,
    /// Maximum lifetime of the transaction; exceeding it aborts instead of
    /// hanging.
    pub timeout: Duration,
    pub isolation: IsolationLevel,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self::from(&TransactionDefaults::default())
    }
}

impl From<&TransactionDefaults> for TransactionOptions {
    fn from(defaults: &TransactionDefaults) -> Self {
        Self {
            max_wait: Duration::from_millis(defaults.max_wait_ms),
            timeout: Duration::from_millis(defaults.timeout_ms),
            isolation: defaults.isolation,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum WriteKind {
    Insert,
    Update,
}

#[derive(Debug, Clone)]
enum StagedOp {
    Put {
        tree: &'static str,
        entity: &'static str,
        id: String,
        bytes: Vec<u8>,
        unique: Vec<UniqueKey>,
        /// Unique keys the row held before this write (empty for inserts).
        old_unique: Vec<UniqueKey>,
        foreign: Vec<ForeignKey>,
        kind: WriteKind,
    },
    Delete {
        tree: &'static str,
        entity: &'static str,
        id: String,
        old_unique: Vec<UniqueKey>,
    },
}

/// Handle the transaction closure operates on.
pub struct Transaction<'a> {
    store: &'a FormStore,
    ops: Vec<StagedOp>,
    /// (tree, id) -> staged row bytes, or None for a staged delete.
    overlay: HashMap<(&'static str, String), Option<Vec<u8>>>,
    started: Instant,
    timeout: Duration,
}

impl<'a> Transaction<'a> {
    fn new(store: &'a FormStore, timeout: Duration) -> Self {
        Self {
            store,
            ops: Vec::new(),
            overlay: HashMap::new(),
            started: Instant::now(),
            timeout,
        }
    }

    fn check_time(&self) -> FormStoreResult<()> {
        if self.started.elapsed() > self.timeout {
            return Err(FormStoreError::TransactionAborted(format!(
                "transaction exceeded its {:?} timeout",
                self.timeout
            )));
        }
        Ok(())
    }

    fn exists(&self, tree: &'static str, id: &str) -> FormStoreResult<bool> {
        match self.overlay.get(&(tree, id.to_string())) {
            Some(Some(_)) => Ok(true),
            Some(None) => Ok(false),
            None => self.store.row_exists(tree, id),
        }
    }

    /// Reads a record as the transaction sees it: staged state first, then
    /// the base tree.
    pub fn get<R: Record>(&self, id: &str) -> FormStoreResult<Option<R>> {
        match self.overlay.get(&(R::TREE, id.to_string())) {
            Some(Some(bytes)) => Ok(Some(serde_json::from_slice(bytes)?)),
            Some(None) => Ok(None),
            None => self.store.read_record(id),
        }
    }

    /// Read that fails with `NotFound`.
    pub fn require<R: Record>(&self, id: &str) -> FormStoreResult<R> {
        self.get(id)?.ok_or_else(|| FormStoreError::NotFound {
            entity: R::ENTITY,
            key: id.to_string(),
        })
    }

    /// Stages an insert. Constraints are fully re-checked at commit; the
    /// id-existence check here catches the obvious mistake early.
    pub fn insert<R: Record>(&mut self, record: &R) -> FormStoreResult<()> {
        self.check_time()?;
        record.validate()?;
        if self.exists(R::TREE, record.id())? {
            return Err(FormStoreError::UniqueViolation {
                entity: R::ENTITY,
                index: "id",
                key: record.id().to_string(),
            });
        }
        let bytes = serde_json::to_vec(record)?;
        self.overlay
            .insert((R::TREE, record.id().to_string()), Some(bytes.clone()));
        self.ops.push(StagedOp::Put {
            tree: R::TREE,
            entity: R::ENTITY,
            id: record.id().to_string(),
            bytes,
            unique: record.unique_keys(),
            old_unique: Vec::new(),
            foreign: record.foreign_keys(),
            kind: WriteKind::Insert,
        });
        Ok(())
    }

    /// Stages an update of an existing row.
    pub fn update<R: Record>(&mut self, record: &R) -> FormStoreResult<()> {
        self.check_time()?;
        record.validate()?;
        let old: R = self.require(record.id())?;
        let bytes = serde_json::to_vec(record)?;
        self.overlay
            .insert((R::TREE, record.id().to_string()), Some(bytes.clone()));
        self.ops.push(StagedOp::Put {
            tree: R::TREE,
            entity: R::ENTITY,
            id: record.id().to_string(),
            bytes,
            unique: record.unique_keys(),
            old_unique: old.unique_keys(),
            foreign: record.foreign_keys(),
            kind: WriteKind::Update,
        });
        Ok(())
    }

    /// Stages a delete, returning the record as the transaction saw it.
    pub fn delete<R: Record>(&mut self, id: &str) -> FormStoreResult<R> {
        self.check_time()?;
        let old: R = self.require(id)?;
        self.overlay.insert((R::TREE, id.to_string()), None);
        self.ops.push(StagedOp::Delete {
            tree: R::TREE,
            entity: R::ENTITY,
            id: id.to_string(),
            old_unique: old.unique_keys(),
        });
        Ok(old)
    }

    /// Number of staged operations.
    pub fn staged_ops(&self) -> usize {
        self.ops.len()
    }
}

impl FormStore {
    /// Runs `f` inside a transaction with the store's configured defaults.
    pub fn transaction<T, F>(&self, f: F) -> FormStoreResult<T>
    where
        F: FnOnce(&mut Transaction<'_>) -> FormStoreResult<T>,
    {
        self.transaction_with_options(&TransactionOptions::from(self.transaction_defaults()), f)
    }

    /// Runs `f` inside a transaction with explicit bounds. All staged
    /// operations commit together or not at all.
    pub fn transaction_with_options<T, F>(
        &self,
        options: &TransactionOptions,
        f: F,
    ) -> FormStoreResult<T>
    where
        F: FnOnce(&mut Transaction<'_>) -> FormStoreResult<T>,
    {
        let early_guard = if options.isolation == IsolationLevel::Serializable {
            Some(self.lock_writes_bounded(options.max_wait)?)
        } else {
            None
        };

        let mut tx = Transaction::new(self, options.timeout);
        let out = match f(&mut tx) {
            Ok(value) => value,
            Err(err) => {
                log::debug!("transaction rolled back after {} staged ops: {}", tx.ops.len(), err);
                return Err(err);
            }
        };
        tx.check_time()?;
        let ops = tx.ops;

        let _guard = match early_guard {
            Some(guard) => guard,
            None => self.lock_writes_bounded(options.max_wait)?,
        };
        self.validate_staged(&ops)?;
        self.apply_staged(&ops)?;
        Ok(out)
    }

    /// Replays the staged operations against a simulated view of the store
    /// to confirm every constraint still holds at commit time.
    fn validate_staged(&self, ops: &[StagedOp]) -> FormStoreResult<()> {
        // Existence and index occupancy overrides accumulated while walking
        // the ops in order.
        let mut sim_rows: HashMap<(&'static str, String), bool> = HashMap::new();
        let mut sim_idx: HashMap<(&'static str, String), Option<String>> = HashMap::new();
        // Current foreign keys of staged rows, for the reverse check on
        // staged deletes.
        let mut sim_refs: HashMap<(&'static str, String), Vec<ForeignKey>> = HashMap::new();

        let row_exists = |sim: &HashMap<(&'static str, String), bool>,
                          store: &Self,
                          tree: &'static str,
                          id: &str|
         -> FormStoreResult<bool> {
            match sim.get(&(tree, id.to_string())) {
                Some(exists) => Ok(*exists),
                None => store.row_exists(tree, id),
            }
        };
        let index_occupant = |sim: &HashMap<(&'static str, String), Option<String>>,
                              store: &Self,
                              index: &'static str,
                              key: &str|
         -> FormStoreResult<Option<String>> {
            match sim.get(&(index, key.to_string())) {
                Some(occupant) => Ok(occupant.clone()),
                None => store.index_get(index, key),
            }
        };

        for op in ops {
            match op {
                StagedOp::Put {
                    tree,
                    entity,
                    id,
                    unique,
                    old_unique,
                    foreign,
                    kind,
                    ..
                } => {
                    let exists = row_exists(&sim_rows, self, *tree, id)?;
                    match kind {
                        WriteKind::Insert if exists => {
                            return Err(FormStoreError::UniqueViolation {
                                entity: *entity,
                                index: "id",
                                key: id.clone(),
                            });
                        }
                        WriteKind::Update if !exists => {
                            return Err(FormStoreError::NotFound {
                                entity: *entity,
                                key: id.clone(),
                            });
                        }
                        _ => {}
                    }
                    for fk in foreign {
                        if !row_exists(&sim_rows, self, fk.parent_tree, &fk.id)? {
                            return Err(FormStoreError::ForeignKeyViolation {
                                entity: *entity,
                                parent: fk.parent_entity,
                                key: fk.id.clone(),
                            });
                        }
                    }
                    for key in unique {
                        if let Some(occupant) =
                            index_occupant(&sim_idx, self, key.index, &key.key)?
                        {
                            if occupant != *id {
                                return Err(FormStoreError::UniqueViolation {
                                    entity: *entity,
                                    index: key.index,
                                    key: key.key.clone(),
                                });
                            }
                        }
                    }
                    sim_rows.insert((*tree, id.clone()), true);
                    sim_refs.insert((*tree, id.clone()), foreign.clone());
                    for key in old_unique {
                        if !unique.contains(key) {
                            sim_idx.insert((key.index, key.key.clone()), None);
                        }
                    }
                    for key in unique {
                        sim_idx.insert((key.index, key.key.clone()), Some(id.clone()));
                    }
                }
                StagedOp::Delete {
                    tree,
                    entity,
                    id,
                    old_unique,
                } => {
                    if !row_exists(&sim_rows, self, *tree, id)? {
                        return Err(FormStoreError::NotFound {
                            entity: *entity,
                            key: id.clone(),
                        });
                    }
                    // Reverse check: base children must be staged for
                    // deletion too (staged rows carry their current foreign
                    // keys in sim_refs and are checked below).
                    for child in self.child_rows_referencing(*tree, id)? {
                        if sim_refs.contains_key(&child) || sim_rows.get(&child) == Some(&false)
                        {
                            continue;
                        }
                        return Err(FormStoreError::ForeignKeyViolation {
                            entity: *entity,
                            parent: *entity,
                            key: id.clone(),
                        });
                    }
                    if sim_refs
                        .values()
                        .flatten()
                        .any(|fk| fk.parent_tree == *tree && fk.id == *id)
                    {
                        return Err(FormStoreError::ForeignKeyViolation {
                            entity: *entity,
                            parent: *entity,
                            key: id.clone(),
                        });
                    }
                    sim_rows.insert((*tree, id.clone()), false);
                    sim_refs.remove(&(*tree, id.clone()));
                    for key in old_unique {
                        sim_idx.insert((key.index, key.key.clone()), None);
                    }
                }
            }
        }
        Ok(())
    }

    /// Applies validated staged operations to the trees.
    fn apply_staged(&self, ops: &[StagedOp]) -> FormStoreResult<()> {
        for op in ops {
            match op {
                StagedOp::Put {
                    tree,
                    id,
                    bytes,
                    unique,
                    old_unique,
                    ..
                } => {
                    let entity_tree = self.entity_tree(tree)?;
                    entity_tree.insert(id.as_bytes(), bytes.clone())?;
                    self.maybe_flush(entity_tree)?;
                    for key in old_unique {
                        if !unique.contains(key) {
                            self.index_remove(key.index, &key.key)?;
                        }
                    }
                    for key in unique {
                        self.index_put(key.index, &key.key, id)?;
                    }
                }
                StagedOp::Delete {
                    tree,
                    id,
                    old_unique,
                    ..
                } => {
                    for key in old_unique {
                        self.index_remove(key.index, &key.key)?;
                    }
                    let entity_tree = self.entity_tree(tree)?;
                    entity_tree.remove(id.as_bytes())?;
                    self.maybe_flush(entity_tree)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Field, Form, User};
    use crate::testing_utils::TestStoreFactory;

    #[test]
    fn test_commit_applies_all_ops() {
        let store = TestStoreFactory::create_temp_store();
        let user = User::new("a@x.com");
        let form = Form::new(&user.id, "survey-1", "Survey");
        store
            .transaction(|tx| {
                tx.insert(&user)?;
                tx.insert(&form)?;
                Ok(())
            })
            .unwrap();

        assert!(store.get::<User>(&user.id).unwrap().is_some());
        assert!(store.get::<Form>(&form.id).unwrap().is_some());
    }

    #[test]
    fn test_closure_error_rolls_everything_back() {
        let store = TestStoreFactory::create_temp_store();
        let user = User::new("a@x.com");
        let result: FormStoreResult<()> = store.transaction(|tx| {
            tx.insert(&user)?;
            Err(FormStoreError::TransactionAborted("caller bailed".to_string()))
        });
        assert!(result.is_err());
        assert!(store.get::<User>(&user.id).unwrap().is_none());
    }

    #[test]
    fn test_staged_reads_see_overlay() {
        let store = TestStoreFactory::create_temp_store();
        let user = User::new("a@x.com");
        store
            .transaction(|tx| {
                tx.insert(&user)?;
                let seen: Option<User> = tx.get(&user.id)?;
                assert!(seen.is_some());
                tx.delete::<User>(&user.id)?;
                let gone: Option<User> = tx.get(&user.id)?;
                assert!(gone.is_none());
                Ok(())
            })
            .unwrap();
        assert!(store.get::<User>(&user.id).unwrap().is_none());
    }

    #[test]
    fn test_conflicting_op_aborts_whole_batch() {
        let store = TestStoreFactory::create_temp_store();
        store.insert(&User::new("taken@x.com")).unwrap();

        let fresh = User::new("fresh@x.com");
        let duplicate = User::new("taken@x.com");
        let result = store.transaction(|tx| {
            tx.insert(&fresh)?;
            tx.insert(&duplicate)?;
            Ok(())
        });
        assert!(matches!(
            result,
            Err(FormStoreError::UniqueViolation { .. })
        ));
        // The first op must not have leaked.
        assert!(store.get::<User>(&fresh.id).unwrap().is_none());
    }

    #[test]
    fn test_timeout_surfaces_as_abort() {
        let store = TestStoreFactory::create_temp_store();
        let options = TransactionOptions {
            timeout: Duration::from_millis(10),
            ..Default::default()
        };
        let result: FormStoreResult<()> = store.transaction_with_options(&options, |tx| {
            std::thread::sleep(Duration::from_millis(40));
            tx.insert(&User::new("late@x.com"))
        });
        assert!(matches!(
            result,
            Err(FormStoreError::TransactionAborted(_))
        ));
        assert_eq!(store.count::<User, _>(|_| true).unwrap(), 0);
    }

    #[test]
    fn test_max_wait_bounds_lock_acquisition() {
        let store = TestStoreFactory::create_temp_store();
        let contended = store.clone();
        let handle = std::thread::spawn(move || {
            contended
                .transaction(|_tx| {
                    // Serializable holds the write lock for the whole closure.
                    std::thread::sleep(Duration::from_millis(150));
                    Ok(())
                })
                .unwrap();
        });

        // Give the background transaction time to take the lock.
        std::thread::sleep(Duration::from_millis(30));
        let options = TransactionOptions {
            max_wait: Duration::from_millis(20),
            ..Default::default()
        };
        let result: FormStoreResult<()> =
            store.transaction_with_options(&options, |tx| tx.insert(&User::new("b@x.com")));
        assert!(matches!(
            result,
            Err(FormStoreError::TransactionAborted(_))
        ));
        handle.join().unwrap();
    }

    #[test]
    fn test_staged_delete_of_referenced_row_rejected() {
        let store = TestStoreFactory::create_temp_store();
        let user = TestStoreFactory::seed_user(&store, "a@x.com");
        let form = TestStoreFactory::seed_form(&store, &user, "survey");
        let field = Field::new(&form.id, "text", "Name", 0);
        store.insert(&field).unwrap();

        // Deleting the form without its field must fail at commit.
        let result: FormStoreResult<()> = store.transaction(|tx| {
            tx.delete::<Form>(&form.id)?;
            Ok(())
        });
        assert!(matches!(
            result,
            Err(FormStoreError::ForeignKeyViolation { .. })
        ));
        assert!(store.get::<Form>(&form.id).unwrap().is_some());
        assert!(store.get::<Field>(&field.id).unwrap().is_some());

        // Staging the child's removal first makes the same delete valid.
        store
            .transaction(|tx| {
                tx.delete::<Field>(&field.id)?;
                tx.delete::<Form>(&form.id)?;
                Ok(())
            })
            .unwrap();
        assert!(store.get::<Form>(&form.id).unwrap().is_none());
    }

    #[test]
    fn test_child_staged_in_same_transaction_blocks_parent_delete() {
        let store = TestStoreFactory::create_temp_store();
        let user = TestStoreFactory::seed_user(&store, "a@x.com");
        let form = TestStoreFactory::seed_form(&store, &user, "survey");

        let field = Field::new(&form.id, "text", "Name", 0);
        let result: FormStoreResult<()> = store.transaction(|tx| {
            tx.insert(&field)?;
            tx.delete::<Form>(&form.id)?;
            Ok(())
        });
        assert!(matches!(
            result,
            Err(FormStoreError::ForeignKeyViolation { .. })
        ));
        assert!(store.get::<Form>(&form.id).unwrap().is_some());
        assert!(store.get::<Field>(&field.id).unwrap().is_none());
    }

    #[test]
    fn test_parent_inserted_in_same_transaction_satisfies_fk() {
        let store = TestStoreFactory::create_temp_store();
        let user = User::new("a@x.com");
        let form = Form::new(&user.id, "s", "S");
        store
            .transaction(|tx| {
                tx.insert(&user)?;
                tx.insert(&form)?;
                Ok(())
            })
            .unwrap();
        assert!(store.get::<Form>(&form.id).unwrap().is_some());
    }
}
