use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub full_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub job_title: Option<String>,
    pub company: Option<String>,
    pub phone: Option<String>,
    pub bio: Option<String>,
    pub profile_image: Option<String>,
    #[serde(skip_serializing)]
    pub hashed_password: String,
    pub is_active: bool,

    // Password reset state, set by forgot-password and cleared on reset
    #[serde(skip_serializing)]
    pub reset_otp: Option<String>,
    #[serde(skip_serializing)]
    pub otp_expires_at: Option<NaiveDateTime>,

    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct CreateUser {
    pub email: String,
    pub full_name: Option<String>,
    pub hashed_password: String,
}

/// Editable profile fields. `None` keeps the stored value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub job_title: Option<String>,
    pub company: Option<String>,
    pub phone: Option<String>,
    pub bio: Option<String>,
    pub profile_image: Option<String>,
}
