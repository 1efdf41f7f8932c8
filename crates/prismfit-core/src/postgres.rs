//! PostgreSQL storage backend
//!
//! Implements both [`UserDirectory`] and [`RefreshTokenStore`] on one pool.
//! Email uniqueness is a unique index; refresh-token consumption is a single
//! `DELETE` whose affected-row count decides which caller won.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use uuid::Uuid;

use crate::{RefreshToken, RefreshTokenStore, Result, StoreError, User, UserDirectory};

/// Schema applied by [`PgStore::migrate`]
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id              UUID PRIMARY KEY,
    email           TEXT NOT NULL,
    hashed_password TEXT NOT NULL,
    nickname        TEXT NOT NULL,
    date_of_birth   BIGINT NOT NULL,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE UNIQUE INDEX IF NOT EXISTS users_email_key ON users (email);

CREATE TABLE IF NOT EXISTS refresh_tokens (
    user_id      UUID NOT NULL REFERENCES users (id) ON DELETE CASCADE,
    hashed_token TEXT NOT NULL,
    expires_at   TIMESTAMPTZ NOT NULL,
    created_at   TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (user_id, hashed_token)
);

CREATE INDEX IF NOT EXISTS refresh_tokens_expires_at_idx ON refresh_tokens (expires_at);
"#;

/// PostgreSQL-backed user directory and refresh-token store
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect a new pool
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::DatabaseError(format!("PostgreSQL connection failed: {e}")))?;

        Ok(Self { pool })
    }

    /// Create tables and indexes if they do not exist
    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::DatabaseError(format!("Failed to apply schema: {e}")))?;

        tracing::info!("PostgreSQL auth schema is up to date");
        Ok(())
    }
}

/// User row from database
#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    hashed_password: String,
    nickname: String,
    date_of_birth: i64,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            email: row.email,
            hashed_password: row.hashed_password,
            nickname: row.nickname,
            date_of_birth: row.date_of_birth,
            created_at: row.created_at,
        }
    }
}

/// Refresh token row from database
#[derive(Debug, FromRow)]
struct RefreshTokenRow {
    user_id: Uuid,
    hashed_token: String,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl From<RefreshTokenRow> for RefreshToken {
    fn from(row: RefreshTokenRow) -> Self {
        RefreshToken {
            user_id: row.user_id,
            hashed_token: row.hashed_token,
            expires_at: row.expires_at,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl UserDirectory for PgStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, email, hashed_password, nickname, date_of_birth, created_at FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(User::from))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, email, hashed_password, nickname, date_of_birth, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(User::from))
    }

    async fn save(&self, user: User) -> Result<User> {
        let row: UserRow = sqlx::query_as(
            r#"
            INSERT INTO users (id, email, hashed_password, nickname, date_of_birth, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, email, hashed_password, nickname, date_of_birth, created_at
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.hashed_password)
        .bind(&user.nickname)
        .bind(user.date_of_birth)
        .bind(user.created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn remove(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    fn name(&self) -> &str {
        "postgres"
    }
}

#[async_trait]
impl RefreshTokenStore for PgStore {
    async fn save(&self, record: RefreshToken) -> Result<()> {
        sqlx::query(
            "INSERT INTO refresh_tokens (user_id, hashed_token, expires_at, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(record.user_id)
        .bind(&record.hashed_token)
        .bind(record.expires_at)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_user_id_and_hash(
        &self,
        user_id: Uuid,
        hashed_token: &str,
    ) -> Result<Option<RefreshToken>> {
        let row: Option<RefreshTokenRow> = sqlx::query_as(
            r#"
            SELECT user_id, hashed_token, expires_at, created_at
            FROM refresh_tokens
            WHERE user_id = $1 AND hashed_token = $2 AND expires_at > NOW()
            "#,
        )
        .bind(user_id)
        .bind(hashed_token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(RefreshToken::from))
    }

    async fn delete_by_user_id_and_hash(&self, user_id: Uuid, hashed_token: &str) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1 AND hashed_token = $2")
                .bind(user_id)
                .bind(hashed_token)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_all_for_user(&self, user_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    fn name(&self) -> &str {
        "postgres"
    }
}
