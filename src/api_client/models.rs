// Wire shapes of the Savoa REST API. Everything is lenient: ids may arrive as
// numbers, optional fields may be null or missing, unknown fields are kept.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::de;

/// `GET /progress`
#[derive(Debug, Deserialize, PartialEq, Default)]
pub struct ProgressEnvelope {
    #[serde(default, deserialize_with = "de::vec_or_null")]
    pub progress: Vec<crate::progress::BackendLessonProgress>,
}

/// Body of `POST /lessons/{id}/progress`. `completed` is sent as `null` for heartbeats.
#[derive(Debug, Serialize, PartialEq)]
pub struct PushProgressBody {
    pub seconds_watched: u64,
    pub completed: Option<bool>,
}

/// `GET /lessons/{id}`
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct LessonMeta {
    #[serde(deserialize_with = "de::id_from_str_or_num")]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Seconds
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default, deserialize_with = "de::bool_or_null")]
    pub completed: bool,
    #[serde(default, deserialize_with = "de::bool_or_null")]
    pub is_locked: bool,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// One entry of `GET /course/weeks`
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct WeekResponse {
    #[serde(deserialize_with = "de::id_from_str_or_num")]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_id: Option<String>,
    #[serde(default)]
    pub order_index: Option<i64>,
    #[serde(default, deserialize_with = "de::vec_or_null")]
    pub lessons: Vec<WeekLesson>,
}

#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct WeekLesson {
    #[serde(deserialize_with = "de::id_from_str_or_num")]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub day_order: Option<i64>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default, deserialize_with = "de::bool_or_null")]
    pub is_locked: bool,
    #[serde(default)]
    pub unlock_date: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// One entry of `GET /theory-lessons`
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct TheoryLesson {
    #[serde(deserialize_with = "de::id_from_str_or_num")]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub order_index: Option<i64>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct LoginBody<'a> {
    pub login: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Deserialize, PartialEq)]
pub struct LoginResponse {
    #[serde(alias = "access_token")]
    pub token: String,
}

/// `GET /me`
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct User {
    #[serde(deserialize_with = "de::id_from_str_or_num")]
    pub id: String,
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ForgotPasswordBody<'a> {
    pub email: &'a str,
}

#[derive(Debug, Serialize)]
pub struct ResetPasswordBody<'a> {
    pub token: &'a str,
    pub new_password: &'a str,
}
