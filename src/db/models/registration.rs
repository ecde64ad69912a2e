use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum RegistrationStatus {
    Pending,
    Success,
    Failed,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Registration {
    pub id: i64,
    pub event_id: i64,
    pub user_email: String,
    pub registered_at: NaiveDateTime,
    pub confirmation_id: Option<String>,
    pub status: RegistrationStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRegistration {
    pub event_id: i64,
    pub user_email: String,
    pub confirmation_id: Option<String>,
    pub status: RegistrationStatus,
}
