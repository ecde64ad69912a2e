use chrono::Utc;
use sqlx::types::Json;
use sqlx::{Executor, QueryBuilder, Sqlite, SqlitePool};

use crate::db::models::{Event, EventPatch, NewEvent};
use crate::error::{AppError, AppResult};

pub(crate) const EVENT_COLUMNS: &str = r#"
    id, external_id, title, description, start_time, end_time,
    url, image_url, venue_name, venue_address, organizer_name,
    is_free, online_event, category, capacity, registration_deadline,
    meeting_link, meeting_link_private, timezone, raw_data,
    created_at, updated_at
"#;

// ============================================================================
// Event Repository
// ============================================================================

pub struct EventRepository;

impl EventRepository {
    pub async fn find_by_id(pool: &SqlitePool, id: i64) -> AppResult<Option<Event>> {
        let sql = format!("SELECT {} FROM events WHERE id = ?", EVENT_COLUMNS);
        sqlx::query_as::<_, Event>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(AppError::Database)
    }

    #[cfg(test)]
    pub async fn find_by_external_id(
        pool: &SqlitePool,
        external_id: &str,
    ) -> AppResult<Option<Event>> {
        let sql = format!("SELECT {} FROM events WHERE external_id = ?", EVENT_COLUMNS);
        sqlx::query_as::<_, Event>(&sql)
            .bind(external_id)
            .fetch_optional(pool)
            .await
            .map_err(AppError::Database)
    }

    /// Primary key of the row carrying `external_id`, if any.
    pub async fn find_id_by_external_id<'e, E>(
        executor: E,
        external_id: &str,
    ) -> AppResult<Option<i64>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_scalar::<_, i64>("SELECT id FROM events WHERE external_id = ?")
            .bind(external_id)
            .fetch_optional(executor)
            .await
            .map_err(AppError::Database)
    }

    /// Insert a new event and return its id.
    pub async fn insert<'e, E>(executor: E, event: &NewEvent) -> AppResult<i64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let now = Utc::now().naive_utc();

        sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO events (
                external_id, title, description, start_time, end_time,
                url, image_url, venue_name, venue_address, organizer_name,
                is_free, online_event, category, capacity, registration_deadline,
                meeting_link, meeting_link_private, timezone, raw_data,
                created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&event.external_id)
        .bind(&event.title)
        .bind(&event.description)
        .bind(event.start_time)
        .bind(event.end_time)
        .bind(&event.url)
        .bind(&event.image_url)
        .bind(&event.venue_name)
        .bind(&event.venue_address)
        .bind(&event.organizer_name)
        .bind(event.is_free)
        .bind(event.online_event)
        .bind(&event.category)
        .bind(event.capacity)
        .bind(event.registration_deadline)
        .bind(&event.meeting_link)
        .bind(event.meeting_link_private)
        .bind(&event.timezone)
        .bind(Json(&event.raw_data))
        .bind(now)
        .bind(now)
        .fetch_one(executor)
        .await
        .map_err(AppError::Database)
    }

    /// Apply the fields present in `patch` to row `id`. Returns the number of
    /// rows touched (0 when the row does not exist or the patch is empty).
    pub async fn apply_patch<'e, E>(executor: E, id: i64, patch: &EventPatch) -> AppResult<u64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        if patch.is_empty() {
            return Ok(0);
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE events SET ");
        let mut set = qb.separated(", ");

        if let Some(title) = &patch.title {
            set.push("title = ").push_bind_unseparated(title.clone());
        }
        if let Some(description) = &patch.description {
            set.push("description = ")
                .push_bind_unseparated(description.clone());
        }
        if let Some(start_time) = patch.start_time {
            set.push("start_time = ").push_bind_unseparated(start_time);
        }
        if let Some(end_time) = patch.end_time {
            set.push("end_time = ").push_bind_unseparated(end_time);
        }
        if let Some(is_free) = patch.is_free {
            set.push("is_free = ").push_bind_unseparated(is_free);
        }
        if let Some(venue_name) = &patch.venue_name {
            set.push("venue_name = ")
                .push_bind_unseparated(venue_name.clone());
        }
        if let Some(url) = &patch.url {
            set.push("url = ").push_bind_unseparated(url.clone());
        }
        if let Some(image_url) = &patch.image_url {
            set.push("image_url = ")
                .push_bind_unseparated(image_url.clone());
        }
        set.push("updated_at = ")
            .push_bind_unseparated(Utc::now().naive_utc());

        qb.push(" WHERE id = ").push_bind(id);

        let result = qb
            .build()
            .execute(executor)
            .await
            .map_err(AppError::Database)?;

        Ok(result.rows_affected())
    }

    /// Events whose extension bag names `email` as creator.
    pub async fn find_created_by(pool: &SqlitePool, email: &str) -> AppResult<Vec<Event>> {
        let sql = format!(
            "SELECT {} FROM events WHERE json_extract(raw_data, '$.created_by') = ? ORDER BY start_time ASC, id ASC",
            EVENT_COLUMNS
        );
        sqlx::query_as::<_, Event>(&sql)
            .bind(email)
            .fetch_all(pool)
            .await
            .map_err(AppError::Database)
    }

    pub async fn count_all(pool: &SqlitePool) -> AppResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM events")
            .fetch_one(pool)
            .await
            .map_err(AppError::Database)
    }
}
