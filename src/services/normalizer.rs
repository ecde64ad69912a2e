//! Maps source records and user submissions into the canonical `NewEvent`.

use chrono::{DateTime, NaiveDateTime};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::db::models::{ExtensionBag, NewEvent, User, DEFAULT_CATEGORY, DEFAULT_TIMEZONE};

/// Source name recorded on events submitted through the API.
pub const LOCAL_SOURCE: &str = "eventhub";

// ============================================================================
// Source record shape (listing API)
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TextField {
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DateField {
    pub utc: Option<String>,
    pub local: Option<String>,
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Logo {
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Address {
    pub city: Option<String>,
    pub localized_address_display: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Venue {
    pub name: Option<String>,
    pub address: Option<Address>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Named {
    pub name: Option<String>,
}

/// One listing as returned by the source. Every field is optional; the
/// normalizer decides what is mandatory.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawEvent {
    pub id: Option<String>,
    pub name: Option<TextField>,
    pub summary: Option<String>,
    pub description: Option<TextField>,
    pub start: Option<DateField>,
    pub end: Option<DateField>,
    pub url: Option<String>,
    pub logo: Option<Logo>,
    pub venue: Option<Venue>,
    pub organizer: Option<Named>,
    pub category: Option<Named>,
    pub is_free: Option<bool>,
    pub online_event: Option<bool>,
    pub capacity: Option<i64>,
}

fn clean(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Parse an RFC 3339 timestamp into naive UTC, falling back to a bare
/// `YYYY-MM-DDTHH:MM:SS` (assumed UTC).
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.naive_utc())
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S").ok())
        .or_else(|| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").ok())
}

fn parse_date_field(field: Option<&DateField>) -> Option<NaiveDateTime> {
    let field = field?;
    field
        .utc
        .as_deref()
        .and_then(parse_timestamp)
        .or_else(|| field.local.as_deref().and_then(parse_timestamp))
}

/// Normalize one source record. Returns `None` (and logs) when a mandatory
/// field is missing.
pub fn normalize(raw: &RawEvent, source: &str) -> Option<NewEvent> {
    let Some(external_id) = clean(raw.id.as_deref()) else {
        tracing::warn!(source, "Dropping source record without an external id");
        return None;
    };
    let Some(title) = clean(raw.name.as_ref().and_then(|n| n.text.as_deref())) else {
        tracing::warn!(source, external_id = %external_id, "Dropping source record without a title");
        return None;
    };
    let Some(start_time) = parse_date_field(raw.start.as_ref()) else {
        tracing::warn!(source, external_id = %external_id, "Dropping source record without a valid start time");
        return None;
    };

    let url = clean(raw.url.as_deref())
        .unwrap_or_else(|| format!("https://www.{}.com/e/{}", source, external_id));

    let venue = raw.venue.as_ref();
    let address = venue.and_then(|v| v.address.as_ref());
    let source_category = clean(raw.category.as_ref().and_then(|c| c.name.as_deref()));

    let mut raw_data = ExtensionBag::new();
    raw_data.insert("source".to_string(), json!(source));
    if let Some(summary) = clean(raw.summary.as_deref()) {
        raw_data.insert("summary".to_string(), json!(summary));
    }
    if let Some(city) = clean(address.and_then(|a| a.city.as_deref())) {
        raw_data.insert("venue_city".to_string(), json!(city));
    }
    if let Some(category) = &source_category {
        raw_data.insert("source_category".to_string(), json!(category));
    }

    Some(NewEvent {
        external_id,
        title,
        description: clean(raw.description.as_ref().and_then(|d| d.text.as_deref()))
            .or_else(|| clean(raw.summary.as_deref())),
        start_time,
        end_time: parse_date_field(raw.end.as_ref()),
        url,
        image_url: clean(raw.logo.as_ref().and_then(|l| l.url.as_deref())),
        venue_name: clean(venue.and_then(|v| v.name.as_deref())),
        venue_address: clean(address.and_then(|a| a.localized_address_display.as_deref())),
        organizer_name: clean(raw.organizer.as_ref().and_then(|o| o.name.as_deref())),
        is_free: raw.is_free.unwrap_or(true),
        online_event: raw.online_event.unwrap_or(false),
        category: Some(source_category.unwrap_or_else(|| DEFAULT_CATEGORY.to_string())),
        capacity: raw.capacity,
        registration_deadline: None,
        meeting_link: None,
        meeting_link_private: true,
        timezone: Some(
            clean(raw.start.as_ref().and_then(|s| s.timezone.as_deref()))
                .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string()),
        ),
        raw_data,
    })
}

/// Decode one fetched record. Off-shape records are logged and skipped.
fn decode(value: &Value, source: &str) -> Option<RawEvent> {
    match RawEvent::deserialize(value) {
        Ok(raw) => Some(raw),
        Err(e) => {
            let external_id = value.get("id").map(Value::to_string).unwrap_or_default();
            tracing::warn!(source, external_id = %external_id, "Dropping malformed source record: {}", e);
            None
        }
    }
}

/// Normalize a batch of fetched records, returning the kept events and the
/// number dropped.
pub fn normalize_all(records: &[Value], source: &str) -> (Vec<NewEvent>, usize) {
    let events: Vec<NewEvent> = records
        .iter()
        .filter_map(|value| decode(value, source))
        .filter_map(|raw| normalize(&raw, source))
        .collect();
    let dropped = records.len() - events.len();
    if dropped > 0 {
        tracing::info!(source, dropped, kept = events.len(), "Dropped invalid source records");
    }
    (events, dropped)
}

// ============================================================================
// User submissions
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CreateEventRequest {
    pub title: String,
    pub description: Option<String>,
    pub start_time: NaiveDateTime,
    pub end_time: Option<NaiveDateTime>,
    pub venue_name: Option<String>,
    pub venue_address: Option<String>,
    pub image_url: Option<String>,
    pub category: Option<String>,
    #[serde(default = "default_true")]
    pub is_free: bool,
    #[serde(default)]
    pub online_event: bool,
    pub capacity: Option<i64>,
    pub registration_deadline: Option<NaiveDateTime>,
    pub meeting_link: Option<String>,
    #[serde(default = "default_true")]
    pub meeting_link_private: bool,
    pub timezone: Option<String>,

    // Organizer details and extras; everything but the name lands in the extension bag
    pub organizer_name: Option<String>,
    pub organizer_email: Option<String>,
    pub price: Option<String>,
    pub agenda: Option<Value>,
    pub speakers: Option<Value>,
}

fn default_true() -> bool {
    true
}

/// Build a user-submitted event. The external id is generated here and the
/// creator is recorded as provenance in the extension bag.
pub fn from_submission(input: CreateEventRequest, creator: &User, public_url: &str) -> NewEvent {
    let external_id = format!("usr-{}", Uuid::new_v4());
    let url = format!("{}/events/{}", public_url.trim_end_matches('/'), external_id);

    let organizer_name = clean(input.organizer_name.as_deref())
        .or_else(|| clean(creator.full_name.as_deref()))
        .unwrap_or_else(|| "Community Member".to_string());

    let mut raw_data = ExtensionBag::new();
    raw_data.insert("source".to_string(), json!(LOCAL_SOURCE));
    raw_data.insert("created_by".to_string(), json!(creator.email));
    raw_data.insert("organizer_email".to_string(), json!(input.organizer_email));
    raw_data.insert("price".to_string(), json!(input.price));
    raw_data.insert("capacity".to_string(), json!(input.capacity));
    raw_data.insert("agenda".to_string(), input.agenda.unwrap_or(Value::Null));
    raw_data.insert("speakers".to_string(), input.speakers.unwrap_or(Value::Null));

    NewEvent {
        external_id,
        title: input.title.trim().to_string(),
        description: input.description,
        start_time: input.start_time,
        end_time: input.end_time,
        url,
        image_url: clean(input.image_url.as_deref()),
        venue_name: clean(input.venue_name.as_deref()),
        venue_address: clean(input.venue_address.as_deref()),
        organizer_name: Some(organizer_name),
        is_free: input.is_free,
        online_event: input.online_event,
        category: Some(
            clean(input.category.as_deref()).unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
        ),
        capacity: input.capacity,
        registration_deadline: input.registration_deadline,
        meeting_link: clean(input.meeting_link.as_deref()),
        meeting_link_private: input.meeting_link_private,
        timezone: Some(
            clean(input.timezone.as_deref()).unwrap_or_else(|| DEFAULT_TIMEZONE.to_string()),
        ),
        raw_data,
    }
}
