//! Names of the sled trees the store opens at startup.
//!
//! Every entity gets its own tree keyed by record id. Unique constraints are
//! backed by separate index trees mapping the constrained value to the owning
//! record id.

/// Entity trees, keyed by record id.
pub const USERS_TREE: &str = "users";
pub const ACCOUNTS_TREE: &str = "accounts";
pub const SESSIONS_TREE: &str = "sessions";
pub const VERIFICATION_TOKENS_TREE: &str = "verification_tokens";
pub const FORMS_TREE: &str = "forms";
pub const FIELDS_TREE: &str = "fields";
pub const RESPONSES_TREE: &str = "responses";
pub const FIELD_VALUES_TREE: &str = "field_values";
pub const FORM_SETTINGS_TREE: &str = "form_settings";

/// Unique-index trees, keyed by the constrained value, holding the record id.
pub const USER_EMAIL_IDX: &str = "idx_user_email";
pub const ACCOUNT_PROVIDER_IDX: &str = "idx_account_provider";
pub const SESSION_TOKEN_IDX: &str = "idx_session_token";
pub const VERIFICATION_TOKEN_IDX: &str = "idx_verification_token";
pub const VERIFICATION_IDENTIFIER_IDX: &str = "idx_verification_identifier_token";
pub const FORM_SLUG_IDX: &str = "idx_form_slug";
pub const FIELD_VALUE_IDX: &str = "idx_field_value_response_field";
pub const FORM_SETTINGS_FORM_IDX: &str = "idx_form_settings_form";

/// Separator used when joining the parts of a compound unique key.
/// ASCII unit separator, so printable user-supplied values cannot collide
/// with a joined key.
pub const COMPOUND_KEY_SEPARATOR: char = '\u{1f}';

/// Joins two columns into a single compound index key.
pub fn compound_key(left: &str, right: &str) -> String {
    format!("{}{}{}", left, COMPOUND_KEY_SEPARATOR, right)
}
