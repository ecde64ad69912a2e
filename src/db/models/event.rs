use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

/// Open-ended, source-specific metadata stored next to the typed columns.
pub type ExtensionBag = serde_json::Map<String, serde_json::Value>;

pub const DEFAULT_CATEGORY: &str = "Business";
pub const DEFAULT_TIMEZONE: &str = "UTC";

// ============================================================================
// Event (normalized listing, keyed by external_id)
// ============================================================================

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub external_id: String,
    pub title: String,
    pub description: Option<String>,
    pub start_time: NaiveDateTime,
    pub end_time: Option<NaiveDateTime>,
    pub url: String,
    pub image_url: Option<String>,
    pub venue_name: Option<String>,
    pub venue_address: Option<String>,
    pub organizer_name: Option<String>,
    pub is_free: bool,
    pub online_event: bool,
    pub category: Option<String>,
    pub capacity: Option<i64>,
    pub registration_deadline: Option<NaiveDateTime>,
    pub meeting_link: Option<String>,
    pub meeting_link_private: bool,
    pub timezone: Option<String>,
    pub raw_data: Json<ExtensionBag>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// A canonical event ready to be stored. Produced by the normalizer for both
/// fetched listings and user submissions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    pub external_id: String,
    pub title: String,
    pub description: Option<String>,
    pub start_time: NaiveDateTime,
    pub end_time: Option<NaiveDateTime>,
    pub url: String,
    pub image_url: Option<String>,
    pub venue_name: Option<String>,
    pub venue_address: Option<String>,
    pub organizer_name: Option<String>,
    pub is_free: bool,
    pub online_event: bool,
    pub category: Option<String>,
    pub capacity: Option<i64>,
    pub registration_deadline: Option<NaiveDateTime>,
    pub meeting_link: Option<String>,
    pub meeting_link_private: bool,
    pub timezone: Option<String>,
    pub raw_data: ExtensionBag,
}

impl NewEvent {
    /// Minimal record with every optional column at its default.
    pub fn new(
        external_id: impl Into<String>,
        title: impl Into<String>,
        start_time: NaiveDateTime,
        url: impl Into<String>,
    ) -> Self {
        Self {
            external_id: external_id.into(),
            title: title.into(),
            description: None,
            start_time,
            end_time: None,
            url: url.into(),
            image_url: None,
            venue_name: None,
            venue_address: None,
            organizer_name: None,
            is_free: true,
            online_event: false,
            category: Some(DEFAULT_CATEGORY.to_string()),
            capacity: None,
            registration_deadline: None,
            meeting_link: None,
            meeting_link_private: true,
            timezone: Some(DEFAULT_TIMEZONE.to_string()),
            raw_data: ExtensionBag::new(),
        }
    }
}

/// Fields a re-fetch is allowed to overwrite on an existing row.
///
/// `None` leaves the column untouched. For nullable columns the inner option
/// is the new value, so `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub start_time: Option<NaiveDateTime>,
    pub end_time: Option<Option<NaiveDateTime>>,
    pub is_free: Option<bool>,
    pub venue_name: Option<Option<String>>,
    pub url: Option<String>,
    pub image_url: Option<Option<String>>,
}

impl EventPatch {
    pub fn is_empty(&self) -> bool {
        *self == EventPatch::default()
    }
}

impl From<&NewEvent> for EventPatch {
    /// Fresh data wins for every volatile field.
    fn from(event: &NewEvent) -> Self {
        EventPatch {
            title: Some(event.title.clone()),
            description: Some(event.description.clone()),
            start_time: Some(event.start_time),
            end_time: Some(event.end_time),
            is_free: Some(event.is_free),
            venue_name: Some(event.venue_name.clone()),
            url: Some(event.url.clone()),
            image_url: Some(event.image_url.clone()),
        }
    }
}

/// Event with its registration count, as listed on the creator dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct EventWithStats {
    #[serde(flatten)]
    pub event: Event,
    pub registration_count: i64,
    pub status: String,
}
