//! Accounts, password checks and login sessions.

use std::sync::Arc;
use std::time::Duration;

use argon2::{
    Argon2,
    password_hash::{
        PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng,
    },
};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{error, info};
use uuid::Uuid;

use crate::application::repos::{
    CreateSessionParams, CreateUserParams, RepoError, SessionsRepo, UsersRepo,
};
use crate::domain::entities::UserRecord;
use crate::domain::error::DomainError;
use crate::domain::users::validate_username;

const TOKEN_SEPARATOR: char = '.';
const PREFIX_LEN: usize = 12;
const MIN_SECRET_LEN: usize = 32;
const MIN_PASSWORD_LEN: usize = 8;

/// Who is making the current request.
#[derive(Debug, Clone, Default)]
pub enum Viewer {
    #[default]
    Anonymous,
    User(UserRecord),
}

impl Viewer {
    pub fn user(&self) -> Option<&UserRecord> {
        match self {
            Viewer::Anonymous => None,
            Viewer::User(user) => Some(user),
        }
    }

    pub fn user_id(&self) -> Option<i64> {
        self.user().map(|user| user.id)
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Viewer::User(_))
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Validation(#[from] DomainError),
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("username `{0}` is already taken")]
    UsernameTaken(String),
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error("session lifetime of {0:?} runs past the supported date range")]
    SessionLifetime(Duration),
}

#[derive(Debug, Clone)]
pub struct CreateUserCommand {
    pub username: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

/// A freshly issued login session. `token` is only ever shown once.
#[derive(Debug, Clone)]
pub struct SessionIssued {
    pub user: UserRecord,
    pub token: String,
    pub expires_at: OffsetDateTime,
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UsersRepo>,
    sessions: Arc<dyn SessionsRepo>,
    session_ttl: Duration,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UsersRepo>,
        sessions: Arc<dyn SessionsRepo>,
        session_ttl: Duration,
    ) -> Self {
        Self {
            users,
            sessions,
            session_ttl,
        }
    }

    pub async fn create_user(&self, cmd: CreateUserCommand) -> Result<UserRecord, AuthError> {
        validate_username(&cmd.username)?;
        if cmd.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(DomainError::validation(
                "password",
                format!("must be at least {MIN_PASSWORD_LEN} characters"),
            )
            .into());
        }

        let password_hash = hash_password(&cmd.password)?;
        let user = self
            .users
            .create_user(CreateUserParams {
                username: cmd.username.clone(),
                first_name: cmd.first_name.trim().to_string(),
                last_name: cmd.last_name.trim().to_string(),
                email: cmd.email.trim().to_string(),
                password_hash,
            })
            .await
            .map_err(|err| match err {
                RepoError::Duplicate { .. } => AuthError::UsernameTaken(cmd.username.clone()),
                other => AuthError::Repo(other),
            })?;

        info!(user_id = user.id, username = %user.username, "Created user");
        Ok(user)
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<SessionIssued, AuthError> {
        let user = self
            .users
            .find_by_username(username.trim())
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_password(password, &user.password_hash)? {
            return Err(AuthError::InvalidCredentials);
        }

        let now = OffsetDateTime::now_utc();
        let expires_at = time::Duration::try_from(self.session_ttl)
            .ok()
            .and_then(|ttl| now.checked_add(ttl))
            .ok_or(AuthError::SessionLifetime(self.session_ttl))?;

        let purged = self.sessions.purge_expired(now).await?;
        if purged > 0 {
            info!(purged, "Purged expired sessions");
        }

        let prefix = generate_prefix();
        let secret = generate_secret();
        self.sessions
            .create_session(CreateSessionParams {
                prefix: prefix.clone(),
                hashed_secret: hash_secret(&secret),
                user_id: user.id,
                expires_at,
            })
            .await?;

        info!(user_id = user.id, session = %prefix, "Opened session");
        Ok(SessionIssued {
            user,
            token: format!("{prefix}{TOKEN_SEPARATOR}{secret}"),
            expires_at,
        })
    }

    /// Look up the user behind a session token. Malformed, unknown, expired
    /// or mismatched tokens all resolve to `None`.
    pub async fn resolve(&self, token: &str) -> Result<Option<UserRecord>, AuthError> {
        let Some((prefix, secret)) = parse_token(token) else {
            return Ok(None);
        };
        let Some(session) = self.sessions.find_by_prefix(prefix).await? else {
            return Ok(None);
        };

        if session.expires_at <= OffsetDateTime::now_utc() {
            return Ok(None);
        }

        let hashed_input = hash_secret(secret);
        if session.hashed_secret.ct_eq(&hashed_input).unwrap_u8() == 0 {
            return Ok(None);
        }

        Ok(self.users.find_by_id(session.user_id).await?)
    }

    pub async fn logout(&self, token: &str) -> Result<(), AuthError> {
        if let Some((prefix, _)) = parse_token(token)
            && self.sessions.delete_session(prefix).await?
        {
            info!(session = %prefix, "Closed session");
        }
        Ok(())
    }
}

pub fn hash_password(plain: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| {
            error!(error = %err, "argon2 hash_password error");
            AuthError::Hash(err.to_string())
        })
}

pub fn verify_password(plain: &str, hash: &str) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(hash).map_err(|err| {
        error!(error = %err, "argon2 parse hash error");
        AuthError::Hash(err.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

fn hash_secret(secret: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.finalize().to_vec()
}

fn generate_prefix() -> String {
    Uuid::new_v4().simple().to_string()[..PREFIX_LEN].to_string()
}

fn generate_secret() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

fn parse_token(token: &str) -> Option<(&str, &str)> {
    let (prefix, secret) = token.split_once(TOKEN_SEPARATOR)?;
    if prefix.len() != PREFIX_LEN || secret.len() < MIN_SECRET_LEN {
        return None;
    }
    Some((prefix, secret))
}
