//! Upsert-by-email user directory.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};

use super::store::BoardStorage;
use super::{BoardError, User};

/// Result of [`UserDirectory::upsert`].
#[derive(Debug, Clone, PartialEq)]
pub struct UserUpsert {
    pub user: User,
    /// False when the email was already known and the stored user is returned.
    pub created: bool,
}

#[derive(Clone)]
pub struct UserDirectory {
    storage: Arc<dyn BoardStorage>,
}

impl UserDirectory {
    pub fn new(storage: Arc<dyn BoardStorage>) -> Self {
        Self { storage }
    }

    /// Return the user with `email`, inserting `profile` on first sight.
    ///
    /// Existing users are never modified; the timestamp is set once.
    pub async fn upsert(
        &self,
        email: &str,
        mut profile: Map<String, Value>,
    ) -> Result<UserUpsert, BoardError> {
        if email.trim().is_empty() {
            return Err(BoardError::Validation("email is required".to_string()));
        }
        if let Some(user) = self.storage.find_user(email).await? {
            return Ok(UserUpsert {
                user,
                created: false,
            });
        }

        profile.remove("email");
        profile.remove("timestamp");
        let user = User {
            email: email.to_string(),
            profile,
            timestamp: Utc::now(),
        };

        if self.storage.insert_user(user.clone()).await? {
            tracing::info!("Registered user {}", email);
            return Ok(UserUpsert {
                user,
                created: true,
            });
        }

        // Lost a race with a concurrent insert for the same email.
        let user = self
            .storage
            .find_user(email)
            .await?
            .ok_or_else(|| BoardError::NotFound(format!("User {} not found", email)))?;
        Ok(UserUpsert {
            user,
            created: false,
        })
    }
}
