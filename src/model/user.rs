//! Identity entities: users plus the authentication records attached to them
//! (OAuth accounts, login sessions, email verification tokens).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{
    compound_key, ACCOUNTS_TREE, ACCOUNT_PROVIDER_IDX, SESSIONS_TREE, SESSION_TOKEN_IDX,
    USERS_TREE, USER_EMAIL_IDX, VERIFICATION_IDENTIFIER_IDX, VERIFICATION_TOKENS_TREE,
    VERIFICATION_TOKEN_IDX,
};
use crate::error::FormStoreResult;
use crate::store::record::{require_non_empty, ForeignKey, Record, UniqueKey};

/// A registered user. Owns forms and authentication records.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: String,
    pub email: String,
    pub email_verified: Option<DateTime<Utc>>,
    pub name: Option<String>,
    pub image: Option<String>,
    pub password: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(email: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.into(),
            email_verified: None,
            name: None,
            image: None,
            password: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Bump `updated_at`; called by every mutating accessor.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl Record for User {
    const TREE: &'static str = USERS_TREE;
    const ENTITY: &'static str = "User";

    fn id(&self) -> &str {
        &self.id
    }

    fn unique_keys(&self) -> Vec<UniqueKey> {
        vec![UniqueKey::new(USER_EMAIL_IDX, &self.email)]
    }

    fn validate(&self) -> FormStoreResult<()> {
        require_non_empty(Self::ENTITY, "email", &self.email)
    }
}

/// An external OAuth account linked to a user. One user can link several
/// providers; a given provider account can only be linked once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub provider: String,
    pub provider_account_id: String,
    pub refresh_token: Option<String>,
    pub access_token: Option<String>,
    pub expires_at: Option<i64>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
    pub id_token: Option<String>,
    pub session_state: Option<String>,
}

impl Account {
    pub fn new(
        user_id: impl Into<String>,
        kind: impl Into<String>,
        provider: impl Into<String>,
        provider_account_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            kind: kind.into(),
            provider: provider.into(),
            provider_account_id: provider_account_id.into(),
            refresh_token: None,
            access_token: None,
            expires_at: None,
            token_type: None,
            scope: None,
            id_token: None,
            session_state: None,
        }
    }
}

impl Record for Account {
    const TREE: &'static str = ACCOUNTS_TREE;
    const ENTITY: &'static str = "Account";

    fn id(&self) -> &str {
        &self.id
    }

    fn unique_keys(&self) -> Vec<UniqueKey> {
        vec![UniqueKey::new(
            ACCOUNT_PROVIDER_IDX,
            compound_key(&self.provider, &self.provider_account_id),
        )]
    }

    fn foreign_keys(&self) -> Vec<ForeignKey> {
        vec![ForeignKey::new(USERS_TREE, "User", &self.user_id)]
    }

    fn validate(&self) -> FormStoreResult<()> {
        require_non_empty(Self::ENTITY, "type", &self.kind)?;
        require_non_empty(Self::ENTITY, "provider", &self.provider)?;
        require_non_empty(Self::ENTITY, "provider_account_id", &self.provider_account_id)
    }
}

/// A login session identified by its opaque token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub id: String,
    pub session_token: String,
    pub user_id: String,
    pub expires: DateTime<Utc>,
}

impl Session {
    pub fn new(
        user_id: impl Into<String>,
        session_token: impl Into<String>,
        expires: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_token: session_token.into(),
            user_id: user_id.into(),
            expires,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires <= now
    }
}

impl Record for Session {
    const TREE: &'static str = SESSIONS_TREE;
    const ENTITY: &'static str = "Session";

    fn id(&self) -> &str {
        &self.id
    }

    fn unique_keys(&self) -> Vec<UniqueKey> {
        vec![UniqueKey::new(SESSION_TOKEN_IDX, &self.session_token)]
    }

    fn foreign_keys(&self) -> Vec<ForeignKey> {
        vec![ForeignKey::new(USERS_TREE, "User", &self.user_id)]
    }

    fn validate(&self) -> FormStoreResult<()> {
        require_non_empty(Self::ENTITY, "session_token", &self.session_token)
    }
}

/// A single-use token for verifying an email address. Unique both on the
/// token itself and on the (identifier, token) pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VerificationToken {
    pub id: String,
    pub identifier: String,
    pub token: String,
    pub expires: DateTime<Utc>,
}

impl VerificationToken {
    pub fn new(
        identifier: impl Into<String>,
        token: impl Into<String>,
        expires: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            identifier: identifier.into(),
            token: token.into(),
            expires,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires <= now
    }
}

impl Record for VerificationToken {
    const TREE: &'static str = VERIFICATION_TOKENS_TREE;
    const ENTITY: &'static str = "VerificationToken";

    fn id(&self) -> &str {
        &self.id
    }

    fn unique_keys(&self) -> Vec<UniqueKey> {
        vec![
            UniqueKey::new(VERIFICATION_TOKEN_IDX, &self.token),
            UniqueKey::new(
                VERIFICATION_IDENTIFIER_IDX,
                compound_key(&self.identifier, &self.token),
            ),
        ]
    }

    fn validate(&self) -> FormStoreResult<()> {
        require_non_empty(Self::ENTITY, "identifier", &self.identifier)?;
        require_non_empty(Self::ENTITY, "token", &self.token)
    }
}
