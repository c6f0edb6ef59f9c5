use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::question::QuestionView;

/// Quiz session document stored in the "quiz_sessions" collection and cached
/// in Redis while active. Created on quiz start, mutated exactly once on
/// submit, immutable afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizSession {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    /// Question ids in the order they were served.
    pub question_ids: Vec<String>,
    /// question id -> selected option text
    #[serde(default)]
    pub answers: HashMap<String, String>,
    pub score: u32,
    pub total_questions: u32,
    pub completed: bool,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: u32,
}

/// Request to start a quiz. The seen-question ledger is an explicit value the
/// client carries (browser local storage); it comes in here and goes back out
/// updated in the response.
#[derive(Debug, Deserialize)]
pub struct StartQuizRequest {
    pub count: Option<usize>,
    #[serde(default)]
    pub seen_question_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct StartQuizResponse {
    pub session_id: String,
    pub questions: Vec<QuestionView>,
    /// Updated ledger for the client to persist (capped and trimmed).
    pub seen_question_ids: Vec<String>,
    pub time_limit_seconds: i64,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitQuizRequest {
    /// question id -> selected option text; unanswered questions absent
    #[serde(default)]
    pub answers: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitQuizResponse {
    pub session_id: String,
    pub score: u32,
    pub correct_answers: u32,
    pub total_questions: u32,
    pub duration_seconds: u32,
    pub results: Vec<QuestionResult>,
    pub suggestions: Vec<String>,
}

/// Per-question review entry, only revealed after submission
#[derive(Debug, Serialize)]
pub struct QuestionResult {
    pub question_id: String,
    pub question: String,
    pub selected: Option<String>,
    pub correct_answer: String,
    pub correct: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// Query params for the quiz history endpoint
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<u32>,
}

/// Session summary for history listings (answers omitted)
#[derive(Debug, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub score: u32,
    pub total_questions: u32,
    pub completed: bool,
    pub started_at: DateTime<Utc>,
    pub duration_seconds: u32,
}

impl From<&QuizSession> for SessionSummary {
    fn from(s: &QuizSession) -> Self {
        SessionSummary {
            session_id: s.id.clone(),
            score: s.score,
            total_questions: s.total_questions,
            completed: s.completed,
            started_at: s.started_at,
            duration_seconds: s.duration_seconds,
        }
    }
}

/// Aggregated quiz statistics for the dashboard
#[derive(Debug, Serialize)]
pub struct QuizStats {
    pub total_quizzes: u32,
    pub average_score: u32,
    pub best_score: u32,
    pub total_questions_answered: u32,
    pub correct_answers: u32,
    pub accuracy: u32,
    pub weak_categories: Vec<String>,
    pub strong_categories: Vec<String>,
    pub recent_sessions: Vec<SessionSummary>,
}
