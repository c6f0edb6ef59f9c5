use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod payment;
pub mod question;
pub mod session;
pub mod user;

/// Per-user performance document stored in "user_performance", keyed by the
/// user id string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPerformance {
    #[serde(rename = "_id")]
    pub user_id: String,
    pub total_quizzes: u32,
    pub average_score: u32,
    pub best_score: u32,
    #[serde(default)]
    pub weak_categories: Vec<String>,
    #[serde(default)]
    pub strong_categories: Vec<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "user::bson_datetime_as_chrono_option"
    )]
    pub last_quiz_date: Option<DateTime<Utc>>,
}
