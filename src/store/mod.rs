// Core store plumbing
pub mod core;
pub mod record;

// Generic accessors
mod aggregate;
mod query;
mod repository;

// Projection and transactions
mod include;
pub mod transaction;

// Per-entity accessors
mod field_operations;
mod form_operations;
mod response_operations;
mod settings_operations;
mod user_operations;

// Re-export the main store handle and the caller-facing option types
pub use aggregate::I64Aggregate;
pub use core::FormStore;
pub use include::{
    FormInclude, FormWithRelations, ResponseWithValues, UserInclude, UserWithRelations,
};
pub use query::{FindOptions, SortOrder};
pub use record::{ForeignKey, Record, UniqueKey};
pub use transaction::{IsolationLevel, Transaction, TransactionOptions};
