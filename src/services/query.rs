//! Filtered, paginated listing over the event store.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::db::models::Event;
use crate::db::repository::event::EVENT_COLUMNS;
use crate::error::{AppError, AppResult};
use crate::services::categories::CategoryKeywords;

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Raw query-string parameters of `GET /events`. Everything is a string so
/// malformed values can be ignored instead of rejected.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventListQuery {
    pub city: Option<String>,
    pub category: Option<String>,
    pub search: Option<String>,
    pub source: Option<String>,
    pub is_free: Option<String>,
    pub mode: Option<String>,
    pub date: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

/// Resolved filter: every field is either absent or a valid predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct EventFilter {
    pub search: Option<String>,
    pub city: Option<String>,
    pub keywords: Option<Vec<String>>,
    pub source: Option<String>,
    pub is_free: Option<bool>,
    pub online: Option<bool>,
    pub date: Option<NaiveDate>,
    pub page: i64,
    pub limit: i64,
}

#[derive(Debug, Serialize)]
pub struct EventPage {
    pub data: Vec<Event>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Like `non_blank`, but "all" also means "no filter".
fn non_blank_or_all(value: &Option<String>) -> Option<String> {
    non_blank(value).filter(|v| !v.eq_ignore_ascii_case("all"))
}

impl EventFilter {
    pub fn from_query(query: &EventListQuery, categories: &CategoryKeywords) -> Self {
        let is_free = non_blank(&query.is_free).and_then(|v| match v.to_lowercase().as_str() {
            "free" | "true" => Some(true),
            "paid" | "false" => Some(false),
            _ => None,
        });
        let online = non_blank(&query.mode).and_then(|v| match v.to_lowercase().as_str() {
            "online" => Some(true),
            "offline" => Some(false),
            _ => None,
        });
        let date = non_blank(&query.date)
            .and_then(|v| NaiveDate::parse_from_str(&v, "%Y-%m-%d").ok());

        let page = non_blank(&query.page)
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(1)
            .max(1);
        let limit = non_blank(&query.limit)
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);

        EventFilter {
            search: non_blank(&query.search),
            city: non_blank_or_all(&query.city),
            keywords: query
                .category
                .as_deref()
                .and_then(|c| categories.expand(c)),
            source: non_blank_or_all(&query.source),
            is_free,
            online,
            date,
            page,
            limit,
        }
    }

    /// Rows to skip before this page; saturates instead of overflowing on
    /// absurd page numbers.
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    /// Whether `event` satisfies the text predicates. Matching is a
    /// case-insensitive substring test with Unicode case folding, which
    /// SQLite's ASCII-only `LOWER()` cannot provide.
    fn matches_text(&self, event: &Event) -> bool {
        let title = fold(Some(&event.title));
        let description = fold(event.description.as_deref());

        if let Some(keywords) = &self.keywords {
            let hit = keywords.iter().map(|k| k.to_lowercase()).any(|k| {
                title.contains(&k) || description.contains(&k)
            });
            if !hit {
                return false;
            }
        }
        if let Some(city) = &self.city {
            if !fold(event.venue_address.as_deref()).contains(&city.to_lowercase()) {
                return false;
            }
        }
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            let hit = title.contains(&needle)
                || description.contains(&needle)
                || fold(event.venue_name.as_deref()).contains(&needle)
                || fold(event.venue_address.as_deref()).contains(&needle)
                || fold(event.organizer_name.as_deref()).contains(&needle);
            if !hit {
                return false;
            }
        }
        if let Some(source) = &self.source {
            if !fold(Some(&event.url)).contains(&source.to_lowercase()) {
                return false;
            }
        }
        true
    }
}

fn fold(value: Option<&str>) -> String {
    value.map(str::to_lowercase).unwrap_or_default()
}

/// Typed predicates go to SQL; text predicates are applied afterwards.
fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &EventFilter) {
    qb.push(" WHERE 1 = 1");

    if let Some(is_free) = filter.is_free {
        qb.push(" AND is_free = ").push_bind(is_free);
    }
    if let Some(online) = filter.online {
        qb.push(" AND online_event = ").push_bind(online);
    }
    if let Some(date) = filter.date {
        qb.push(" AND date(start_time) = ")
            .push_bind(date.format("%Y-%m-%d").to_string());
    }
}

/// Count and fetch one page of events matching `filter`.
pub async fn search(pool: &SqlitePool, filter: &EventFilter) -> AppResult<EventPage> {
    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new(format!("SELECT {} FROM events", EVENT_COLUMNS));
    push_filters(&mut qb, filter);
    qb.push(" ORDER BY start_time ASC, id ASC");

    let candidates = qb
        .build_query_as::<Event>()
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;
    let scanned = candidates.len();

    let matching: Vec<Event> = candidates
        .into_iter()
        .filter(|e| filter.matches_text(e))
        .collect();
    let total = i64::try_from(matching.len()).unwrap_or(i64::MAX);

    let skip = usize::try_from(filter.offset()).unwrap_or(usize::MAX);
    let take = usize::try_from(filter.limit).unwrap_or(0);
    let data: Vec<Event> = matching.into_iter().skip(skip).take(take).collect();

    tracing::debug!(
        scanned,
        total,
        returned = data.len(),
        page = filter.page,
        limit = filter.limit,
        "Event listing query"
    );

    Ok(EventPage {
        data,
        total,
        page: filter.page,
        limit: filter.limit,
    })
}
