use lazy_static::lazy_static;
use rand::{distributions::Alphanumeric, Rng};
use regex::Regex;
use thiserror::Error;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::auth::dto::{
    ConfirmRequest, ForgotPasswordRequest, LoginRequest, RegisterRequest, ResetPasswordRequest,
};
use crate::auth::jwt::JwtKeys;
use crate::auth::password::{acceptable_length, hash_password, verify_password};
use crate::auth::repo_types::{NewUser, User};
use crate::notify::CodePurpose;
use crate::state::AppState;
use crate::store::{StoreError, UserId};

const ONE_TIME_CODE_LEN: usize = 8;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    Invalid(String),

    #[error("registration is not open for this email domain")]
    DomainNotAllowed,

    #[error("username already taken")]
    UsernameTaken,

    #[error("email already registered")]
    EmailTaken,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("invalid or expired code")]
    InvalidCode,

    #[error("account not confirmed")]
    NotConfirmed,

    #[error(transparent)]
    Storage(#[from] StoreError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn is_valid_username(username: &str) -> bool {
    lazy_static! {
        static ref USERNAME_RE: Regex = Regex::new(r"^[\p{L}\p{N}_.\-]{2,32}$").unwrap();
    }
    USERNAME_RE.is_match(username)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn email_in_domain(email: &str, domain: &str) -> bool {
    email
        .rsplit_once('@')
        .map_or(false, |(_, d)| d.eq_ignore_ascii_case(domain))
}

pub fn generate_one_time_code() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ONE_TIME_CODE_LEN)
        .map(char::from)
        .collect()
}

#[instrument(skip(state, req), fields(username = %req.username))]
pub async fn register(state: &AppState, req: RegisterRequest) -> Result<User, AuthError> {
    let username = req.username.trim().to_string();
    let email = normalize_email(&req.email);

    if !is_valid_username(&username) {
        return Err(AuthError::Invalid("Invalid username".into()));
    }
    if !is_valid_email(&email) {
        warn!(%email, "invalid email");
        return Err(AuthError::Invalid("Invalid email".into()));
    }
    if let Some(domain) = &state.config.allowed_email_domain {
        if !email_in_domain(&email, domain) {
            warn!(%email, "email domain not allowed");
            return Err(AuthError::DomainNotAllowed);
        }
    }
    if !acceptable_length(&req.password) {
        return Err(AuthError::Invalid("Password must be 8 to 128 characters".into()));
    }

    if state.users.username_exists(&username).await? {
        return Err(AuthError::UsernameTaken);
    }
    if state.users.find_by_email(&email).await?.is_some() {
        return Err(AuthError::EmailTaken);
    }

    let password_hash = hash_password(&req.password)?;
    let code = generate_one_time_code();
    let user = state
        .users
        .create_user(NewUser {
            username,
            email,
            password_hash,
            one_time_code: code.clone(),
        })
        .await
        .map_err(|e| match e {
            StoreError::Duplicate("username") => AuthError::UsernameTaken,
            StoreError::Duplicate(_) => AuthError::EmailTaken,
            other => other.into(),
        })?;

    info!(user_id = user.id, "user registered");
    if let Err(e) = state
        .notifier
        .send_code(&user.email, &user.username, &code, CodePurpose::Registration)
        .await
    {
        // account exists; the user can ask for a new code
        error!(error = %e, user_id = user.id, "sending registration code failed");
    }
    Ok(user)
}

#[instrument(skip(state, req))]
pub async fn confirm(state: &AppState, req: ConfirmRequest) -> Result<User, AuthError> {
    let email = normalize_email(&req.email);
    let code = req.code.trim();
    if code.is_empty() {
        return Err(AuthError::InvalidCode);
    }
    let user = state
        .users
        .confirm_one_time_code(&email, code)
        .await?
        .ok_or(AuthError::InvalidCode)?;
    info!(user_id = user.id, "user confirmed");
    Ok(user)
}

/// Verifies credentials, rotates the user's auth token and returns a signed
/// access token bound to it.
#[instrument(skip(state, req))]
pub async fn login(state: &AppState, req: LoginRequest) -> Result<(String, User), AuthError> {
    let email = normalize_email(&req.email);
    if !is_valid_email(&email) {
        return Err(AuthError::Invalid("Invalid email".into()));
    }

    let Some(user) = state.users.find_by_email(&email).await? else {
        warn!(%email, "login unknown email");
        return Err(AuthError::InvalidCredentials);
    };
    if !verify_password(&req.password, &user.password_hash)? {
        warn!(user_id = user.id, "login invalid password");
        return Err(AuthError::InvalidCredentials);
    }
    if !user.confirmed {
        return Err(AuthError::NotConfirmed);
    }

    let sid = Uuid::new_v4().to_string();
    state.users.set_auth_token(user.id, Some(&sid)).await?;
    let token = JwtKeys::from_config(&state.config.jwt).sign(user.id, &sid)?;

    info!(user_id = user.id, "user logged in");
    Ok((token, user))
}

pub async fn logout(state: &AppState, user_id: UserId) -> Result<(), AuthError> {
    state.users.set_auth_token(user_id, None).await?;
    info!(user_id, "user logged out");
    Ok(())
}

/// Issues a fresh one-time code. Unknown users are not reported.
#[instrument(skip(state, req))]
pub async fn forgot_password(
    state: &AppState,
    req: ForgotPasswordRequest,
) -> Result<(), AuthError> {
    let username = req.username.trim();
    let email = normalize_email(&req.email);
    if username.is_empty() || email.is_empty() {
        return Ok(());
    }

    let code = generate_one_time_code();
    if !state.users.issue_one_time_code(username, &email, &code).await? {
        warn!(%email, "password reset for unknown user");
        return Ok(());
    }
    if let Err(e) = state
        .notifier
        .send_code(&email, username, &code, CodePurpose::PasswordReset)
        .await
    {
        error!(error = %e, %email, "sending reset code failed");
    }
    Ok(())
}

#[instrument(skip(state, req))]
pub async fn reset_password(
    state: &AppState,
    req: ResetPasswordRequest,
) -> Result<User, AuthError> {
    let email = normalize_email(&req.email);
    let code = req.code.trim();
    if code.is_empty() {
        return Err(AuthError::InvalidCode);
    }
    if !acceptable_length(&req.new_password) {
        return Err(AuthError::Invalid("Password must be 8 to 128 characters".into()));
    }
    let hash = hash_password(&req.new_password)?;
    let user = state
        .users
        .reset_password(&email, code, &hash)
        .await?
        .ok_or(AuthError::InvalidCode)?;
    info!(user_id = user.id, "password reset");
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation() {
        assert!(is_valid_email("ola@example.com"));
        assert!(!is_valid_email("ola@example"));
        assert!(!is_valid_email("ola example.com"));
    }

    #[test]
    fn username_validation() {
        assert!(is_valid_username("kari_n"));
        assert!(is_valid_username("Bjørn.Ås"));
        assert!(!is_valid_username("x"));
        assert!(!is_valid_username("has space"));
    }

    #[test]
    fn domain_match_is_exact() {
        assert!(email_in_domain("a@corp.example", "corp.example"));
        assert!(!email_in_domain("a@evilcorp.example", "corp.example"));
        assert!(!email_in_domain("a@corp.example.org", "corp.example"));
    }

    #[test]
    fn one_time_codes_are_alphanumeric_and_vary() {
        let a = generate_one_time_code();
        let b = generate_one_time_code();
        assert_eq!(a.len(), ONE_TIME_CODE_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }
}
