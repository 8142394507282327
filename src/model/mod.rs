//! Entity records for the form-builder data model.

mod form;
mod response;
mod user;

pub use form::{Field, Form, FormSettings};
pub use response::{FieldValue, Response};
pub use user::{Account, Session, User, VerificationToken};
