use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// User model stored in MongoDB "users" collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub email: String,
    pub password_hash: String,
    pub display_name: String,
    pub role: UserRole,
    /// Paid-activation gate: quizzes are locked until this flips true.
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub payment_status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paystack_reference: Option<String>,
    #[serde(default)]
    pub login_count: u32,
    #[serde(rename = "createdAt", with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
    #[serde(
        rename = "lastLoginAt",
        default,
        skip_serializing_if = "Option::is_none",
        with = "bson_datetime_as_chrono_option"
    )]
    pub last_login_at: Option<DateTime<Utc>>,

    // Study statistics shown on the dashboard
    #[serde(default)]
    pub tests_taken: u32,
    #[serde(default)]
    pub total_study_time_minutes: u32,
    #[serde(default)]
    pub average_score: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_score: Option<u32>,
    #[serde(default)]
    pub test_scores: Vec<TestScore>,
    #[serde(default)]
    pub weak_areas: Vec<String>,
    #[serde(default)]
    pub strong_areas: Vec<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "bson_datetime_as_chrono_option"
    )]
    pub last_test_date: Option<DateTime<Utc>>,
}

/// One completed practice test, embedded in the user document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestScore {
    #[serde(with = "bson_datetime_as_chrono")]
    pub date: DateTime<Utc>,
    pub score: u32,
    pub test_id: String,
    pub test_name: String,
    pub total_questions: u32,
    pub correct_answers: u32,
    pub duration_minutes: u32,
}

// Serde converters for chrono::DateTime <-> mongodb::bson::DateTime
pub mod bson_datetime_as_chrono {
    use chrono::{DateTime, Utc};
    use mongodb::bson;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let bson_dt = bson::DateTime::from_millis(date.timestamp_millis());
        bson_dt.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bson_dt = bson::DateTime::deserialize(deserializer)?;
        DateTime::from_timestamp_millis(bson_dt.timestamp_millis())
            .ok_or_else(|| serde::de::Error::custom("timestamp out of range"))
    }
}

pub mod bson_datetime_as_chrono_option {
    use chrono::{DateTime, Utc};
    use mongodb::bson;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(date: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(d) => {
                let bson_dt = bson::DateTime::from_millis(d.timestamp_millis());
                serializer.serialize_some(&bson_dt)
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt_bson_dt: Option<bson::DateTime> = Option::deserialize(deserializer)?;
        match opt_bson_dt {
            Some(bson_dt) => DateTime::from_timestamp_millis(bson_dt.timestamp_millis())
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom("timestamp out of range")),
            None => Ok(None),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    Student,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &str {
        match self {
            UserRole::Student => "student",
            UserRole::Admin => "admin",
        }
    }
}

/// Activation payment state mirrored onto the user document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
}

/// User profile returned to client (without sensitive data)
#[derive(Debug, Serialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub role: UserRole,
    pub is_active: bool,
    pub payment_status: PaymentStatus,
    pub tests_taken: u32,
    pub total_study_time_minutes: u32,
    pub average_score: u32,
    pub best_score: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        UserProfile {
            id: user.id.map(|id| id.to_hex()).unwrap_or_default(),
            email: user.email,
            display_name: user.display_name,
            role: user.role,
            is_active: user.is_active,
            payment_status: user.payment_status,
            tests_taken: user.tests_taken,
            total_study_time_minutes: user.total_study_time_minutes,
            average_score: user.average_score,
            best_score: user.best_score,
            created_at: user.created_at,
            last_login_at: user.last_login_at,
        }
    }
}

/// Request to register a new user
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,

    #[validate(length(
        min = 1,
        max = 100,
        message = "Display name must be between 1 and 100 characters"
    ))]
    pub display_name: String,
}

/// Request to login
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    pub password: String,
}

/// Response after successful login or registration
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub user: UserProfile,
}

/// Request to change password
#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    pub old_password: String,

    #[validate(length(min = 8, message = "New password must be at least 8 characters"))]
    pub new_password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_hides_password_hash() {
        let now = Utc::now();
        let user = User {
            id: Some(ObjectId::new()),
            email: "nurse@example.com".to_string(),
            password_hash: "bcrypt-hash".to_string(),
            display_name: "Nurse Joy".to_string(),
            role: UserRole::Student,
            is_active: false,
            payment_status: PaymentStatus::Pending,
            paystack_reference: None,
            login_count: 1,
            created_at: now,
            last_login_at: None,
            tests_taken: 0,
            total_study_time_minutes: 0,
            average_score: 0,
            best_score: None,
            test_scores: vec![],
            weak_areas: vec![],
            strong_areas: vec![],
            last_test_date: None,
        };

        let profile = UserProfile::from(user);
        let json = serde_json::to_string(&profile).unwrap();
        assert!(!json.contains("bcrypt-hash"));
        assert!(json.contains("nurse@example.com"));
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&UserRole::Admin).unwrap(), "\"admin\"");
        assert_eq!(
            serde_json::to_string(&PaymentStatus::Paid).unwrap(),
            "\"paid\""
        );
    }
}
