use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId};
use mongodb::Database;
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use uuid::Uuid;

use crate::config::QuizConfig;
use crate::metrics::{
    record_cache_hit, record_cache_miss, track_cache_operation, QUESTIONS_SAMPLED_TOTAL,
    QUIZZES_COMPLETED_TOTAL, QUIZZES_STARTED_TOTAL,
};
use crate::models::question::{QuestionView, QuizQuestion};
use crate::models::session::{
    HistoryQuery, QuestionResult, QuizSession, QuizStats, SessionSummary, StartQuizRequest,
    StartQuizResponse, SubmitQuizRequest, SubmitQuizResponse,
};
use crate::models::user::{TestScore, User};
use crate::models::UserPerformance;
use crate::services::question_service::QuestionService;
use crate::services::sampler::{sample, SeenSet};
use crate::utils::retry::{retry_async_with_config, RetryConfig};

const SESSIONS_COLLECTION: &str = "quiz_sessions";
const WEAK_SCORE_THRESHOLD: u32 = 60;
const STRONG_SCORE_THRESHOLD: u32 = 80;

// Pool fetched from the store before the reuse-avoiding pass runs over it.
const POOL_MIN: u64 = 100;
const POOL_MAX: u64 = 200;

pub struct QuizService {
    mongo: Database,
    redis: ConnectionManager,
    quiz_config: QuizConfig,
}

impl QuizService {
    pub fn new(mongo: Database, redis: ConnectionManager, quiz_config: QuizConfig) -> Self {
        Self {
            mongo,
            redis,
            quiz_config,
        }
    }

    fn sessions(&self) -> mongodb::Collection<QuizSession> {
        self.mongo.collection::<QuizSession>(SESSIONS_COLLECTION)
    }

    pub async fn start_quiz(&self, user_id: &str, req: StartQuizRequest) -> Result<StartQuizResponse> {
        let user = self.find_user(user_id).await?;
        if !user.is_active {
            QUIZZES_STARTED_TOTAL.with_label_values(&["locked"]).inc();
            return Err(anyhow!("Account activation required"));
        }

        let count = req
            .count
            .filter(|c| *c > 0)
            .unwrap_or(self.quiz_config.default_question_count);

        let question_service = QuestionService::new(self.mongo.clone());
        let total = question_service.count().await?;
        if total == 0 {
            return Err(anyhow!("No questions available"));
        }

        // Oversized fetch so the reuse pass has fresh material to pick from.
        let pool_size = total.clamp(POOL_MIN, POOL_MAX).min(total);
        let pool = question_service.random_pool(pool_size as usize).await?;

        let mut seen = SeenSet::from_ids(req.seen_question_ids);
        let outcome = sample(pool, &mut seen, count);

        if outcome.questions.is_empty() {
            return Err(anyhow!("No questions available"));
        }

        QUESTIONS_SAMPLED_TOTAL
            .with_label_values(&["fresh"])
            .inc_by(outcome.fresh_count as u64);
        QUESTIONS_SAMPLED_TOTAL
            .with_label_values(&["repeat"])
            .inc_by(outcome.repeat_count as u64);

        let session_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let time_limit = self.quiz_config.time_limit_seconds;
        let expires_at = now + chrono::Duration::seconds(time_limit);

        let question_ids: Vec<String> = outcome
            .questions
            .iter()
            .filter_map(|q| q.id.map(|id| id.to_hex()))
            .collect();

        let session = QuizSession {
            id: session_id.clone(),
            user_id: user_id.to_string(),
            question_ids,
            answers: HashMap::new(),
            score: 0,
            total_questions: outcome.questions.len() as u32,
            completed: false,
            started_at: now,
            expires_at,
            completed_at: None,
            duration_seconds: 0,
        };

        self.sessions()
            .insert_one(&session)
            .await
            .context("Failed to insert quiz session")?;

        // Cache the active session in Redis with a TTL matching the limit.
        let mut conn = self.redis.clone();
        let session_key = format!("quiz_session:{}", session_id);
        let session_json = serde_json::to_string(&session)?;
        track_cache_operation("setex", async {
            redis::cmd("SETEX")
                .arg(&session_key)
                .arg(time_limit)
                .arg(session_json)
                .query_async::<()>(&mut conn)
                .await
                .context("Failed to cache quiz session")
        })
        .await?;

        QUIZZES_STARTED_TOTAL.with_label_values(&["started"]).inc();
        tracing::info!(
            "Quiz started: {} for user: {} ({} questions, {} fresh / {} repeat)",
            session_id,
            user_id,
            outcome.questions.len(),
            outcome.fresh_count,
            outcome.repeat_count
        );

        let questions = outcome.questions.iter().map(QuestionView::from).collect();

        Ok(StartQuizResponse {
            session_id,
            questions,
            seen_question_ids: seen.into_ids(),
            time_limit_seconds: time_limit,
            expires_at,
        })
    }

    pub async fn get_session(&self, session_id: &str) -> Result<QuizSession> {
        // Active sessions live in Redis; completed or expired ones in Mongo.
        let mut conn = self.redis.clone();
        let session_key = format!("quiz_session:{}", session_id);
        let cached: Option<String> = redis::cmd("GET")
            .arg(&session_key)
            .query_async(&mut conn)
            .await
            .context("Failed to read session cache")?;

        if let Some(json) = cached {
            record_cache_hit();
            let session: QuizSession = serde_json::from_str(&json)?;
            return Ok(session);
        }
        record_cache_miss();

        self.sessions()
            .find_one(doc! { "_id": session_id })
            .await
            .context("Failed to query quiz session")?
            .ok_or_else(|| anyhow!("Session not found"))
    }

    pub async fn submit_quiz(
        &self,
        user_id: &str,
        session_id: &str,
        req: SubmitQuizRequest,
    ) -> Result<SubmitQuizResponse> {
        let session = self.get_session(session_id).await?;

        if session.user_id != user_id {
            return Err(anyhow!("Session not found"));
        }
        if session.completed {
            return Err(anyhow!("Session already completed"));
        }

        let questions = self.fetch_session_questions(&session.question_ids).await?;
        if questions.is_empty() {
            return Err(anyhow!("Session questions no longer available"));
        }

        let total = session.question_ids.len() as u32;
        let mut correct: u32 = 0;
        let mut category_scores: HashMap<String, (u32, u32)> = HashMap::new();
        let mut results = Vec::with_capacity(questions.len());

        for question in &questions {
            let Some(qid) = question.id.map(|id| id.to_hex()) else {
                continue;
            };
            let selected = req.answers.get(&qid).cloned();
            let is_correct = selected.as_deref() == Some(question.correct_answer.as_str());
            if is_correct {
                correct += 1;
            }

            let entry = category_scores
                .entry(question.category.clone())
                .or_insert((0, 0));
            entry.1 += 1;
            if is_correct {
                entry.0 += 1;
            }

            results.push(QuestionResult {
                question_id: qid,
                question: question.question.clone(),
                selected,
                correct_answer: question.correct_answer.clone(),
                correct: is_correct,
                explanation: question.explanation.clone(),
            });
        }

        let score = if total == 0 {
            0
        } else {
            ((correct as f64 / total as f64) * 100.0).round() as u32
        };

        let now = Utc::now();
        // Wall-clock duration, clamped to the allowed window.
        let elapsed = (now - session.started_at).num_seconds();
        let duration_seconds =
            elapsed.clamp(0, self.quiz_config.time_limit_seconds) as u32;

        let update = doc! {
            "$set": {
                "answers": mongodb::bson::to_bson(&req.answers)?,
                "score": score,
                "completed": true,
                "completed_at": mongodb::bson::to_bson(&now)?,
                "duration_seconds": duration_seconds,
            }
        };
        let sessions = self.sessions();
        retry_async_with_config(RetryConfig::aggressive(), || {
            let update = update.clone();
            let sessions = sessions.clone();
            async move {
                sessions
                    .update_one(doc! { "_id": session_id }, update)
                    .await
                    .context("Failed to persist quiz submission")
            }
        })
        .await?;

        // Evict the active-session cache entry.
        let mut conn = self.redis.clone();
        let session_key = format!("quiz_session:{}", session_id);
        track_cache_operation("del", async {
            redis::cmd("DEL")
                .arg(&session_key)
                .query_async::<()>(&mut conn)
                .await
                .context("Failed to evict session cache")
        })
        .await?;

        let (weak, strong) = partition_categories(&category_scores);

        self.update_user_stats(user_id, session_id, score, correct, total, duration_seconds)
            .await?;
        self.update_performance(user_id, score, &weak, &strong, now)
            .await?;

        QUIZZES_COMPLETED_TOTAL
            .with_label_values(&["completed"])
            .inc();
        tracing::info!(
            "Quiz submitted: {} by user: {} (score: {}%)",
            session_id,
            user_id,
            score
        );

        Ok(SubmitQuizResponse {
            session_id: session_id.to_string(),
            score,
            correct_answers: correct,
            total_questions: total,
            duration_seconds,
            results,
            suggestions: suggestions(score, correct, total, duration_seconds),
        })
    }

    pub async fn history(&self, user_id: &str, query: HistoryQuery) -> Result<Vec<SessionSummary>> {
        let limit = query.limit.unwrap_or(20).min(100) as i64;

        let mut cursor = self
            .sessions()
            .find(doc! { "user_id": user_id, "completed": true })
            .sort(doc! { "started_at": -1 })
            .limit(limit)
            .await
            .context("Failed to query quiz history")?;

        let mut summaries = Vec::new();
        while let Some(session) = cursor
            .try_next()
            .await
            .context("Failed to read history cursor")?
        {
            summaries.push(SessionSummary::from(&session));
        }
        Ok(summaries)
    }

    pub async fn stats(&self, user_id: &str) -> Result<QuizStats> {
        let user = self.find_user(user_id).await?;

        let mut cursor = self
            .sessions()
            .find(doc! { "user_id": user_id, "completed": true })
            .sort(doc! { "started_at": -1 })
            .await
            .context("Failed to query quiz sessions")?;

        let mut total_questions_answered: u32 = 0;
        let mut correct_answers: u32 = 0;
        let mut recent_sessions = Vec::new();
        while let Some(session) = cursor
            .try_next()
            .await
            .context("Failed to read sessions cursor")?
        {
            total_questions_answered += session.total_questions;
            correct_answers +=
                ((session.score as f64 / 100.0) * session.total_questions as f64).round() as u32;
            if recent_sessions.len() < 10 {
                recent_sessions.push(SessionSummary::from(&session));
            }
        }

        let accuracy = if total_questions_answered == 0 {
            0
        } else {
            ((correct_answers as f64 / total_questions_answered as f64) * 100.0).round() as u32
        };

        let performance = self
            .mongo
            .collection::<UserPerformance>("user_performance")
            .find_one(doc! { "_id": user_id })
            .await
            .context("Failed to query user performance")?;

        let (weak_categories, strong_categories) = performance
            .map(|p| (p.weak_categories, p.strong_categories))
            .unwrap_or_default();

        Ok(QuizStats {
            total_quizzes: user.tests_taken,
            average_score: user.average_score,
            best_score: user.best_score.unwrap_or(0),
            total_questions_answered,
            correct_answers,
            accuracy,
            weak_categories,
            strong_categories,
            recent_sessions,
        })
    }

    async fn fetch_session_questions(&self, question_ids: &[String]) -> Result<Vec<QuizQuestion>> {
        let object_ids: Vec<ObjectId> = question_ids
            .iter()
            .filter_map(|id| ObjectId::parse_str(id).ok())
            .collect();

        let mut cursor = self
            .mongo
            .collection::<QuizQuestion>("quiz_questions")
            .find(doc! { "_id": { "$in": object_ids } })
            .await
            .context("Failed to fetch session questions")?;

        let mut by_id: HashMap<String, QuizQuestion> = HashMap::new();
        while let Some(question) = cursor
            .try_next()
            .await
            .context("Failed to read questions cursor")?
        {
            if let Some(id) = question.id.map(|id| id.to_hex()) {
                by_id.insert(id, question);
            }
        }

        // Preserve the served order.
        Ok(question_ids
            .iter()
            .filter_map(|id| by_id.remove(id))
            .collect())
    }

    async fn update_user_stats(
        &self,
        user_id: &str,
        session_id: &str,
        score: u32,
        correct: u32,
        total: u32,
        duration_seconds: u32,
    ) -> Result<()> {
        let user = self.find_user(user_id).await?;
        let object_id = user
            .id
            .ok_or_else(|| anyhow!("User document missing _id"))?;

        let tests_taken = user.tests_taken + 1;
        let average_score = (((user.average_score as f64 * user.tests_taken as f64) + score as f64)
            / tests_taken as f64)
            .round() as u32;
        let best_score = user.best_score.map_or(score, |b| b.max(score));
        let duration_minutes = duration_seconds.div_ceil(60);

        let now = Utc::now();
        let now_bson = mongodb::bson::DateTime::from_millis(now.timestamp_millis());
        let test_score = TestScore {
            date: now,
            score,
            test_id: session_id.to_string(),
            test_name: format!("Practice Test {}", tests_taken),
            total_questions: total,
            correct_answers: correct,
            duration_minutes,
        };

        self.mongo
            .collection::<User>("users")
            .update_one(
                doc! { "_id": object_id },
                doc! {
                    "$set": {
                        "tests_taken": tests_taken,
                        "average_score": average_score,
                        "best_score": best_score,
                        "last_test_date": now_bson,
                    },
                    "$inc": { "total_study_time_minutes": duration_minutes },
                    "$push": { "test_scores": mongodb::bson::to_bson(&test_score)? },
                },
            )
            .await
            .context("Failed to update user stats")?;
        Ok(())
    }

    async fn update_performance(
        &self,
        user_id: &str,
        score: u32,
        weak: &[String],
        strong: &[String],
        now: chrono::DateTime<Utc>,
    ) -> Result<()> {
        let performances = self
            .mongo
            .collection::<UserPerformance>("user_performance");

        let existing = performances
            .find_one(doc! { "_id": user_id })
            .await
            .context("Failed to query user performance")?;

        let updated = match existing {
            Some(p) => {
                let total = p.total_quizzes + 1;
                let average = (((p.average_score as f64 * p.total_quizzes as f64) + score as f64)
                    / total as f64)
                    .round() as u32;
                UserPerformance {
                    user_id: user_id.to_string(),
                    total_quizzes: total,
                    average_score: average,
                    best_score: p.best_score.max(score),
                    weak_categories: merge_categories(p.weak_categories, weak),
                    strong_categories: merge_categories(p.strong_categories, strong),
                    last_quiz_date: Some(now),
                }
            }
            None => UserPerformance {
                user_id: user_id.to_string(),
                total_quizzes: 1,
                average_score: score,
                best_score: score,
                weak_categories: weak.to_vec(),
                strong_categories: strong.to_vec(),
                last_quiz_date: Some(now),
            },
        };

        performances
            .replace_one(doc! { "_id": user_id }, &updated)
            .upsert(true)
            .await
            .context("Failed to upsert user performance")?;
        Ok(())
    }

    async fn find_user(&self, user_id: &str) -> Result<User> {
        let object_id = ObjectId::parse_str(user_id).context("Invalid user id")?;
        self.mongo
            .collection::<User>("users")
            .find_one(doc! { "_id": object_id })
            .await
            .context("Failed to query user")?
            .ok_or_else(|| anyhow!("User not found"))
    }
}

/// Splits category scores into weak (<60%) and strong (>=80%) buckets.
fn partition_categories(scores: &HashMap<String, (u32, u32)>) -> (Vec<String>, Vec<String>) {
    let mut weak = Vec::new();
    let mut strong = Vec::new();
    for (category, (correct, total)) in scores {
        if *total == 0 {
            continue;
        }
        let pct = ((*correct as f64 / *total as f64) * 100.0).round() as u32;
        if pct < WEAK_SCORE_THRESHOLD {
            weak.push(category.clone());
        } else if pct >= STRONG_SCORE_THRESHOLD {
            strong.push(category.clone());
        }
    }
    weak.sort();
    strong.sort();
    (weak, strong)
}

fn merge_categories(mut existing: Vec<String>, latest: &[String]) -> Vec<String> {
    for category in latest {
        if !existing.contains(category) {
            existing.push(category.clone());
        }
    }
    existing
}

/// Study suggestions shown with the result, tiered by score.
fn suggestions(score: u32, correct: u32, total: u32, duration_seconds: u32) -> Vec<String> {
    let mut out = Vec::new();

    if score >= 80 {
        out.push("Excellent work. Keep practicing to maintain your performance.".to_string());
    } else if score >= 60 {
        out.push(
            "Good effort. Review the questions you missed and retake a practice test.".to_string(),
        );
    } else {
        out.push(
            "Focus on fundamentals. Review each missed question and its explanation before your next attempt."
                .to_string(),
        );
    }

    let missed = total.saturating_sub(correct);
    if missed > 0 {
        out.push(format!(
            "You missed {} question{}. Work through the review list below.",
            missed,
            if missed == 1 { "" } else { "s" }
        ));
    }

    // Very fast finishes usually mean rushed reading.
    if total > 0 && duration_seconds < total * 15 && score < 80 {
        out.push("You finished quickly. Slow down and read each question carefully.".to_string());
    }

    out
}
