use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, FromRow, Row};

use super::text_column;
use crate::types::UserStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub full_name: String,
    pub status: UserStatus,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for User {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            full_name: row.try_get("full_name")?,
            status: text_column(row, "status")?,
            last_login_at: row.try_get("last_login_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserWithRoles {
    #[serde(flatten)]
    pub user: User,
    pub roles: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub status: UserStatus,
    /// Assigned in the same transaction as the insert
    pub role_ids: Vec<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub status: Option<UserStatus>,
    pub limit: i64,
    pub offset: i64,
}

/// Partial update; `None` leaves the column untouched
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub status: Option<UserStatus>,
}

impl UserChanges {
    /// Names of the fields this update sets, as reported in the audit trail
    pub fn touched(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.full_name.is_some() {
            fields.push("full_name");
        }
        if self.email.is_some() {
            fields.push("email");
        }
        if self.password_hash.is_some() {
            fields.push("password");
        }
        if self.status.is_some() {
            fields.push("status");
        }
        fields
    }

    pub fn is_empty(&self) -> bool {
        self.touched().is_empty()
    }
}
