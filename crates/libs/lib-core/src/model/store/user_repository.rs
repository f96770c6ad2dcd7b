//! # User Repository
//!
//! Database access layer for user accounts. Only what the auth handlers
//! need: creation and lookups by the three identifying columns.

use super::models::{User, UserForCreate};
use super::DbPool;
use crate::error::Result;
use sqlx::query_as;

/// User repository for database operations.
pub struct UserRepository;

impl UserRepository {
    /// Find a user by their email address.
    pub async fn find_by_email(pool: &DbPool, email: &str) -> Result<Option<User>> {
        let user = query_as::<_, User>("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(pool)
            .await?;

        Ok(user)
    }

    /// Find a user by their username.
    pub async fn find_by_username(pool: &DbPool, username: &str) -> Result<Option<User>> {
        let user = query_as::<_, User>("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(pool)
            .await?;

        Ok(user)
    }

    /// Find a user by id.
    pub async fn find_by_id(pool: &DbPool, user_id: i64) -> Result<Option<User>> {
        let user = query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(pool)
            .await?;

        Ok(user)
    }

    /// Create a new user. The password hash must already be computed.
    pub async fn create(pool: &DbPool, user: UserForCreate) -> Result<User> {
        let created = query_as::<_, User>(
            "INSERT INTO users (username, email, password_hash) VALUES (?, ?, ?) RETURNING *",
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .fetch_one(pool)
        .await?;

        Ok(created)
    }
}
