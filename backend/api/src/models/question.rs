use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

use super::user::{bson_datetime_as_chrono, bson_datetime_as_chrono_option};

pub const MIN_OPTIONS: usize = 2;
pub const MAX_OPTIONS: usize = 6;

/// Question document stored in the "quiz_questions" collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizQuestion {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: String,
    pub category: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(rename = "createdAt", with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    /// Soft delete flag; deleted questions never enter a quiz pool.
    #[serde(default)]
    pub deleted: bool,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "bson_datetime_as_chrono_option"
    )]
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

/// Schema violations rejected at the store boundary
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuestionValidationError {
    #[error("question text must not be empty")]
    EmptyQuestion,
    #[error("question must have between {MIN_OPTIONS} and {MAX_OPTIONS} options, got {0}")]
    BadOptionCount(usize),
    #[error("option text must not be empty")]
    EmptyOption,
    #[error("correct answer must not be empty")]
    EmptyCorrectAnswer,
    #[error("correct answer is not among the options")]
    CorrectAnswerNotInOptions,
}

impl QuizQuestion {
    /// Enforces the record invariant: 2..=6 non-empty options and a correct
    /// answer that is one of them. Called on every insert/update and when
    /// decoding sampled pools.
    pub fn validate(&self) -> Result<(), QuestionValidationError> {
        if self.question.trim().is_empty() {
            return Err(QuestionValidationError::EmptyQuestion);
        }
        if self.options.len() < MIN_OPTIONS || self.options.len() > MAX_OPTIONS {
            return Err(QuestionValidationError::BadOptionCount(self.options.len()));
        }
        if self.options.iter().any(|o| o.trim().is_empty()) {
            return Err(QuestionValidationError::EmptyOption);
        }
        if self.correct_answer.trim().is_empty() {
            return Err(QuestionValidationError::EmptyCorrectAnswer);
        }
        if !self.options.contains(&self.correct_answer) {
            return Err(QuestionValidationError::CorrectAnswerNotInOptions);
        }
        Ok(())
    }
}

/// Question as served to a quiz taker: no answer, no explanation.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionView {
    pub id: String,
    pub question: String,
    pub options: Vec<String>,
    pub category: String,
    pub difficulty: Difficulty,
}

impl From<&QuizQuestion> for QuestionView {
    fn from(q: &QuizQuestion) -> Self {
        QuestionView {
            id: q.id.map(|id| id.to_hex()).unwrap_or_default(),
            question: q.question.clone(),
            options: q.options.clone(),
            category: q.category.clone(),
            difficulty: q.difficulty,
        }
    }
}

/// Request to create a single question (admin)
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuestionRequest {
    #[validate(length(min = 1, message = "Question text must not be empty"))]
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: String,
    pub category: Option<String>,
    pub difficulty: Option<Difficulty>,
    pub explanation: Option<String>,
}

/// Request to update a question (admin); absent fields are left unchanged
#[derive(Debug, Deserialize)]
pub struct UpdateQuestionRequest {
    pub question: Option<String>,
    pub options: Option<Vec<String>>,
    pub correct_answer: Option<String>,
    pub category: Option<String>,
    pub difficulty: Option<Difficulty>,
    pub explanation: Option<String>,
}

/// Raw pasted exam text for bulk upload (admin)
#[derive(Debug, Deserialize, Validate)]
pub struct BulkUploadRequest {
    #[validate(length(min = 1, message = "Upload text must not be empty"))]
    pub text: String,
}

/// Outcome of a bulk upload: how many parsed blocks survived the filter and
/// how many of those made it into the store.
#[derive(Debug, Serialize)]
pub struct BulkUploadResponse {
    pub parsed: usize,
    pub dropped: usize,
    pub uploaded: usize,
    pub failed: usize,
    pub question_ids: Vec<String>,
}

/// Query params for listing/searching questions
#[derive(Debug, Deserialize)]
pub struct ListQuestionsQuery {
    pub category: Option<String>,
    pub difficulty: Option<Difficulty>,
    pub search: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(options: &[&str], correct: &str) -> QuizQuestion {
        QuizQuestion {
            id: Some(ObjectId::new()),
            question: "What is a priority intervention for pulmonary embolism?".to_string(),
            options: options.iter().map(|s| s.to_string()).collect(),
            correct_answer: correct.to_string(),
            category: "General Nursing".to_string(),
            difficulty: Difficulty::Medium,
            explanation: None,
            created_at: Utc::now(),
            created_by: "admin".to_string(),
            deleted: false,
            deleted_at: None,
        }
    }

    #[test]
    fn valid_question_passes() {
        let q = question(&["Oxygen", "Ambulation"], "Oxygen");
        assert!(q.validate().is_ok());
    }

    #[test]
    fn single_option_rejected() {
        let q = question(&["Oxygen"], "Oxygen");
        assert_eq!(
            q.validate(),
            Err(QuestionValidationError::BadOptionCount(1))
        );
    }

    #[test]
    fn correct_answer_must_match_an_option() {
        // Marker applied but option text edited afterwards
        let q = question(&["Oxygen", "Ambulation"], "Oxygen therapy");
        assert_eq!(
            q.validate(),
            Err(QuestionValidationError::CorrectAnswerNotInOptions)
        );
    }

    #[test]
    fn empty_question_rejected() {
        let mut q = question(&["A", "B"], "A");
        q.question = "   ".to_string();
        assert_eq!(q.validate(), Err(QuestionValidationError::EmptyQuestion));
    }

    #[test]
    fn view_never_leaks_the_answer() {
        let q = question(&["Oxygen", "Ambulation"], "Oxygen");
        let view = QuestionView::from(&q);
        let json = serde_json::to_string(&view).unwrap();
        assert!(!json.contains("correct_answer"));
    }
}
