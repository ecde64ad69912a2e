use chrono::{NaiveDateTime, Utc};
use sqlx::SqlitePool;

use crate::db::models::*;
use crate::error::{AppError, AppResult};

const USER_COLUMNS: &str = r#"
    id, email, full_name, first_name, last_name, job_title, company,
    phone, bio, profile_image, hashed_password, is_active,
    reset_otp, otp_expires_at, created_at, updated_at
"#;

// ============================================================================
// User Repository
// ============================================================================

pub struct UserRepository;

impl UserRepository {
    pub async fn find_by_id(pool: &SqlitePool, id: i64) -> AppResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(AppError::Database)
    }

    pub async fn find_by_email(pool: &SqlitePool, email: &str) -> AppResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS);
        sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(pool)
            .await
            .map_err(AppError::Database)
    }

    /// Insert a new active user. A duplicate email maps to `Conflict`.
    pub async fn create(pool: &SqlitePool, user: CreateUser) -> AppResult<User> {
        let now = Utc::now().naive_utc();
        let sql = format!(
            r#"
            INSERT INTO users (email, full_name, hashed_password, is_active, created_at, updated_at)
            VALUES (?, ?, ?, 1, ?, ?)
            RETURNING {}
            "#,
            USER_COLUMNS
        );

        sqlx::query_as::<_, User>(&sql)
            .bind(&user.email)
            .bind(&user.full_name)
            .bind(&user.hashed_password)
            .bind(now)
            .bind(now)
            .fetch_one(pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                    AppError::Conflict("Email already registered".to_string())
                }
                other => AppError::Database(other),
            })
    }

    /// Store a password-reset code and its expiry, replacing any previous one.
    pub async fn set_reset_code(
        pool: &SqlitePool,
        id: i64,
        otp: &str,
        expires_at: NaiveDateTime,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE users SET reset_otp = ?, otp_expires_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(otp)
        .bind(expires_at)
        .bind(Utc::now().naive_utc())
        .bind(id)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }

    /// Replace the password hash if `otp` matches and has not expired at
    /// `now`, clearing the code in the same statement. Returns whether a row
    /// was updated.
    pub async fn consume_reset_code(
        pool: &SqlitePool,
        id: i64,
        otp: &str,
        new_hash: &str,
        now: NaiveDateTime,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET hashed_password = ?, reset_otp = NULL, otp_expires_at = NULL, updated_at = ?
            WHERE id = ?
              AND reset_otp = ?
              AND otp_expires_at IS NOT NULL
              AND otp_expires_at >= ?
            "#,
        )
        .bind(new_hash)
        .bind(now)
        .bind(id)
        .bind(otp)
        .bind(now)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() == 1)
    }

    /// Update profile fields present in `update`. When either name part
    /// changes, `full_name` is recomputed from the resulting parts.
    pub async fn update_profile(
        pool: &SqlitePool,
        id: i64,
        update: &ProfileUpdate,
    ) -> AppResult<User> {
        let current = Self::find_by_id(pool, id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        let first_name = update.first_name.clone().or(current.first_name.clone());
        let last_name = update.last_name.clone().or(current.last_name.clone());
        let full_name = if update.first_name.is_some() || update.last_name.is_some() {
            Some(
                format!(
                    "{} {}",
                    first_name.as_deref().unwrap_or(""),
                    last_name.as_deref().unwrap_or("")
                )
                .trim()
                .to_string(),
            )
        } else {
            current.full_name.clone()
        };

        let sql = format!(
            r#"
            UPDATE users
            SET first_name = ?, last_name = ?, full_name = ?, job_title = ?,
                company = ?, phone = ?, bio = ?, profile_image = ?, updated_at = ?
            WHERE id = ?
            RETURNING {}
            "#,
            USER_COLUMNS
        );

        sqlx::query_as::<_, User>(&sql)
            .bind(first_name)
            .bind(last_name)
            .bind(full_name)
            .bind(update.job_title.clone().or(current.job_title))
            .bind(update.company.clone().or(current.company))
            .bind(update.phone.clone().or(current.phone))
            .bind(update.bio.clone().or(current.bio))
            .bind(update.profile_image.clone().or(current.profile_image))
            .bind(Utc::now().naive_utc())
            .bind(id)
            .fetch_one(pool)
            .await
            .map_err(AppError::Database)
    }

    #[cfg(test)]
    pub async fn count_by_email(pool: &SqlitePool, email: &str) -> AppResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE email = ?")
            .bind(email)
            .fetch_one(pool)
            .await
            .map_err(AppError::Database)
    }
}
