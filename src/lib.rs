//! # formstore
//!
//! Typed persistence layer for a web form-builder: users create forms,
//! forms carry ordered fields, visitors submit responses whose field values
//! are stored one per field, and a form can have a single settings row.
//!
//! ## Core Components
//!
//! * `model` - Entity records (User, Account, Session, VerificationToken,
//!   Form, Field, Response, FieldValue, FormSettings)
//! * `store` - The store handle, generic repository accessors, relation
//!   hydration, aggregates, and transactions
//! * `config` - Store configuration and TOML loading
//! * `error` - Error types and handling
//!
//! ## Architecture
//!
//! Storage is delegated to sled: one tree per entity keyed by record id,
//! plus one tree per unique constraint mapping the constrained value to the
//! owning id. The repository layer is written once against the `Record`
//! trait and enforces validation, unique keys and foreign keys before
//! anything reaches the engine; every failure surfaces as a classifiable
//! [`FormStoreError`]. Interactive transactions stage their writes and
//! commit all-or-nothing under the store write lock.

pub mod config;
pub mod constants;
pub mod error;
pub mod model;
pub mod store;
pub mod testing_utils;

// Re-export main types for convenience
pub use config::{load_store_config, ConfigError, StoreConfig, TransactionDefaults};
pub use error::{FormStoreError, FormStoreResult};
pub use model::{
    Account, Field, FieldValue, Form, FormSettings, Response, Session, User, VerificationToken,
};
pub use store::{
    FindOptions, FormInclude, FormStore, FormWithRelations, I64Aggregate, IsolationLevel, Record,
    ResponseWithValues, SortOrder, Transaction, TransactionOptions, UserInclude,
    UserWithRelations,
};
