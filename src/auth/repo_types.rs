use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,        // Argon2 hash, not exposed in JSON
    pub confirmed: bool,
    #[serde(skip_serializing)]
    pub one_time_code: Option<String>,
    #[serde(skip_serializing)]
    pub auth_token: Option<String>,
    pub created_at: OffsetDateTime,
}

/// Fields needed to register a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub one_time_code: String,
}
