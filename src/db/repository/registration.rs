use chrono::Utc;
use sqlx::SqlitePool;

use crate::db::models::{CreateRegistration, Registration};
use crate::error::{AppError, AppResult};

pub struct RegistrationRepository;

impl RegistrationRepository {
    /// Store a registration; `registered_at` is always assigned here.
    pub async fn create(
        pool: &SqlitePool,
        registration: CreateRegistration,
    ) -> AppResult<Registration> {
        let now = Utc::now().naive_utc();

        sqlx::query_as::<_, Registration>(
            r#"
            INSERT INTO user_registrations (
                event_id, user_email, registered_at, confirmation_id, status
            )
            VALUES (?, ?, ?, ?, ?)
            RETURNING id, event_id, user_email, registered_at, confirmation_id, status
            "#,
        )
        .bind(registration.event_id)
        .bind(registration.user_email)
        .bind(now)
        .bind(registration.confirmation_id)
        .bind(registration.status)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn find_by_event_and_email(
        pool: &SqlitePool,
        event_id: i64,
        user_email: &str,
    ) -> AppResult<Option<Registration>> {
        sqlx::query_as::<_, Registration>(
            r#"
            SELECT id, event_id, user_email, registered_at, confirmation_id, status
            FROM user_registrations
            WHERE event_id = ? AND user_email = ?
            ORDER BY id ASC
            LIMIT 1
            "#,
        )
        .bind(event_id)
        .bind(user_email)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn count_for_event(pool: &SqlitePool, event_id: i64) -> AppResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM user_registrations WHERE event_id = ?")
            .bind(event_id)
            .fetch_one(pool)
            .await
            .map_err(AppError::Database)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{NewEvent, RegistrationStatus};
    use crate::db::testing::memory_pool;
    use crate::db::EventRepository;

    #[tokio::test]
    async fn create_and_lookup_registration() {
        let pool = memory_pool().await;
        let start = chrono::NaiveDate::from_ymd_opt(2025, 5, 1)
            .and_then(|d| d.and_hms_opt(10, 0, 0))
            .unwrap();
        let event_id = EventRepository::insert(
            &pool,
            &NewEvent::new("R1", "Workshop", start, "https://example.com/r1"),
        )
        .await
        .unwrap();

        let created = RegistrationRepository::create(
            &pool,
            CreateRegistration {
                event_id,
                user_email: "bo@example.com".into(),
                confirmation_id: None,
                status: RegistrationStatus::Pending,
            },
        )
        .await
        .unwrap();
        assert_eq!(created.status, RegistrationStatus::Pending);

        let found = RegistrationRepository::find_by_event_and_email(&pool, event_id, "bo@example.com")
            .await
            .unwrap();
        assert_eq!(found.map(|r| r.id), Some(created.id));

        let missing =
            RegistrationRepository::find_by_event_and_email(&pool, event_id, "cy@example.com")
                .await
                .unwrap();
        assert!(missing.is_none());
        assert_eq!(
            RegistrationRepository::count_for_event(&pool, event_id)
                .await
                .unwrap(),
            1
        );
    }
}
