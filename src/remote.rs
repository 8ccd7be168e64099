//! The hosted household backend, seen as an opaque store of single-shot
//! insert/update calls. Nothing here retries; failures carry a message meant
//! to be shown to the user as-is.

use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use ts_rs::TS;
use uuid::Uuid;

use crate::{AppError, AppResult};

pub const REMOTE_NOT_FOUND: &str = "REMOTE/NOT_FOUND";

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn new_uuid_v7() -> String {
    Uuid::now_v7().to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    Admin,
    Member,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Member => "member",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMembership {
    pub household_id: String,
    pub user_id: String,
    pub role: Role,
}

pub trait HouseholdRemote: Send + Sync {
    /// Creates a household and returns its id.
    fn insert_household<'a>(&'a self, name: &'a str) -> BoxFuture<'a, AppResult<String>>;

    fn update_household_name<'a>(
        &'a self,
        household_id: &'a str,
        name: &'a str,
    ) -> BoxFuture<'a, AppResult<()>>;

    fn insert_membership<'a>(&'a self, membership: &'a NewMembership)
        -> BoxFuture<'a, AppResult<()>>;
}

fn remote_error(operation: &'static str, err: sqlx::Error) -> AppError {
    AppError::from(err).with_context("operation", operation)
}

#[derive(Clone)]
pub struct SqliteRemote {
    pool: SqlitePool,
}

impl SqliteRemote {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl HouseholdRemote for SqliteRemote {
    fn insert_household<'a>(&'a self, name: &'a str) -> BoxFuture<'a, AppResult<String>> {
        async move {
            let id = new_uuid_v7();
            let now = now_ms();
            sqlx::query(
                "INSERT INTO households (id, name, created_at, updated_at) VALUES (?, ?, ?, ?)",
            )
            .bind(&id)
            .bind(name)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|err| remote_error("insert_household", err))?;
            Ok(id)
        }
        .boxed()
    }

    fn update_household_name<'a>(
        &'a self,
        household_id: &'a str,
        name: &'a str,
    ) -> BoxFuture<'a, AppResult<()>> {
        async move {
            let result = sqlx::query("UPDATE households SET name = ?, updated_at = ? WHERE id = ?")
                .bind(name)
                .bind(now_ms())
                .bind(household_id)
                .execute(&self.pool)
                .await
                .map_err(|err| remote_error("update_household_name", err))?;
            if result.rows_affected() == 0 {
                return Err(AppError::new(REMOTE_NOT_FOUND, "Household not found.")
                    .with_context("household_id", household_id));
            }
            Ok(())
        }
        .boxed()
    }

    fn insert_membership<'a>(
        &'a self,
        membership: &'a NewMembership,
    ) -> BoxFuture<'a, AppResult<()>> {
        async move {
            sqlx::query(
                "INSERT INTO household_members (household_id, user_id, role, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(&membership.household_id)
            .bind(&membership.user_id)
            .bind(membership.role.as_str())
            .bind(now_ms())
            .execute(&self.pool)
            .await
            .map_err(|err| remote_error("insert_membership", err))?;
            Ok(())
        }
        .boxed()
    }
}
