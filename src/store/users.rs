//! User records.

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use tracing::info;

use super::Store;
use crate::error::{is_unique_violation, Result, TripError};
use crate::model::{User, UserId};

const MIN_NAME_CHARS: usize = 3;

pub(crate) fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get("id")?,
        name: row.get("name")?,
        email: row.get("email")?,
        created_at: row.get("created_at")?,
    })
}

impl Store {
    /// Insert a user; a duplicate email is a conflict.
    pub fn create_user(&self, name: &str, email: &str) -> Result<User> {
        let name = name.trim();
        let email = email.trim().to_lowercase();
        if name.is_empty() || email.is_empty() {
            return Err(TripError::validation("name and email are required"));
        }

        let created_at = Utc::now();
        let id = self.write(|uow| {
            uow.conn()
                .execute(
                    "INSERT INTO users (name, email, created_at) VALUES (?1, ?2, ?3)",
                    params![name, email, created_at],
                )
                .map_err(|e| {
                    if is_unique_violation(&e) {
                        TripError::conflict("email already in use")
                    } else {
                        e.into()
                    }
                })?;
            Ok(uow.last_insert_id())
        })?;

        let user = User {
            id,
            name: name.to_string(),
            email,
            created_at,
        };
        info!(user_id = user.id, "User created");
        Ok(user)
    }

    /// Rename a user. Names are trimmed and need at least three characters.
    pub fn update_user_name(&self, user_id: UserId, name: &str) -> Result<User> {
        let name = name.trim();
        if name.chars().count() < MIN_NAME_CHARS {
            return Err(TripError::validation(format!(
                "name must be at least {} characters",
                MIN_NAME_CHARS
            )));
        }

        let user = self.write(|uow| {
            let changed = uow.conn().execute(
                "UPDATE users SET name = ?1 WHERE id = ?2",
                params![name, user_id],
            )?;
            if changed == 0 {
                return Err(TripError::NotFound);
            }
            let user = uow.conn().query_row(
                "SELECT id, name, email, created_at FROM users WHERE id = ?1",
                params![user_id],
                user_from_row,
            )?;
            Ok(user)
        })?;

        info!(user_id, "Profile updated");
        Ok(user)
    }

    /// Profile of the authenticated user.
    pub fn get_profile(&self, user_id: UserId) -> Result<User> {
        let conn = self.connect()?;
        conn.query_row(
            "SELECT id, name, email, created_at FROM users WHERE id = ?1",
            params![user_id],
            user_from_row,
        )
        .optional()?
        .ok_or(TripError::NotFound)
    }
}
