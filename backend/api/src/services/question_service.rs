use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, Document};
use mongodb::Database;

use crate::models::question::{
    BulkUploadResponse, CreateQuestionRequest, ListQuestionsQuery, QuizQuestion,
    UpdateQuestionRequest,
};
use crate::services::question_parser::{parse_questions, ParsedQuestion, DEFAULT_CATEGORY};

const QUESTIONS_COLLECTION: &str = "quiz_questions";
const DEFAULT_LIST_LIMIT: u32 = 50;
const MAX_LIST_LIMIT: u32 = 200;

pub struct QuestionService {
    mongo: Database,
}

impl QuestionService {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    fn collection(&self) -> mongodb::Collection<QuizQuestion> {
        self.mongo.collection::<QuizQuestion>(QUESTIONS_COLLECTION)
    }

    pub async fn create(&self, req: CreateQuestionRequest, created_by: &str) -> Result<QuizQuestion> {
        let question = QuizQuestion {
            id: None,
            question: req.question.trim().to_string(),
            options: req.options.iter().map(|o| o.trim().to_string()).collect(),
            correct_answer: req.correct_answer.trim().to_string(),
            category: req
                .category
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            difficulty: req.difficulty.unwrap_or_default(),
            explanation: req.explanation,
            created_at: Utc::now(),
            created_by: created_by.to_string(),
            deleted: false,
            deleted_at: None,
        };

        question
            .validate()
            .map_err(|e| anyhow!("Invalid question: {}", e))?;

        let insert_result = self
            .collection()
            .insert_one(&question)
            .await
            .context("Failed to insert question")?;

        let id = insert_result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| anyhow!("Failed to get inserted question ID"))?;

        let mut created = question;
        created.id = Some(id);

        tracing::info!("Question created: {} by {}", id.to_hex(), created_by);
        Ok(created)
    }

    /// Parses pasted exam text and stores every surviving record. Individual
    /// insert failures are counted, not fatal.
    pub async fn bulk_upload(&self, text: &str, created_by: &str) -> Result<BulkUploadResponse> {
        let report = parse_questions(text);
        let parsed = report.questions.len();
        let dropped = report.dropped;

        let mut question_ids = Vec::new();
        let mut failed = 0usize;

        for parsed_question in report.questions {
            match self.insert_parsed(parsed_question, created_by).await {
                Ok(id) => question_ids.push(id),
                Err(e) => {
                    tracing::warn!("Bulk upload insert failed: {}", e);
                    failed += 1;
                }
            }
        }

        let uploaded = question_ids.len();
        tracing::info!(
            parsed,
            dropped,
            uploaded,
            failed,
            "bulk question upload by {}",
            created_by
        );

        Ok(BulkUploadResponse {
            parsed,
            dropped,
            uploaded,
            failed,
            question_ids,
        })
    }

    async fn insert_parsed(&self, parsed: ParsedQuestion, created_by: &str) -> Result<String> {
        let question = QuizQuestion {
            id: None,
            question: parsed.question,
            options: parsed.options,
            correct_answer: parsed.correct_answer,
            category: parsed.category,
            difficulty: parsed.difficulty,
            explanation: None,
            created_at: Utc::now(),
            created_by: created_by.to_string(),
            deleted: false,
            deleted_at: None,
        };

        question
            .validate()
            .map_err(|e| anyhow!("Invalid question: {}", e))?;

        let insert_result = self
            .collection()
            .insert_one(&question)
            .await
            .context("Failed to insert question")?;

        insert_result
            .inserted_id
            .as_object_id()
            .map(|id| id.to_hex())
            .ok_or_else(|| anyhow!("Failed to get inserted question ID"))
    }

    /// Live (non-deleted) question count.
    pub async fn count(&self) -> Result<u64> {
        self.collection()
            .count_documents(doc! { "deleted": { "$ne": true } })
            .await
            .context("Failed to count questions")
    }

    /// Pulls a uniform random pool of live questions via `$sample`.
    /// Documents that fail to decode or break the record invariant are
    /// skipped; a cursor failure aborts the whole fetch.
    pub async fn random_pool(&self, size: usize) -> Result<Vec<QuizQuestion>> {
        let pipeline = vec![
            doc! { "$match": { "deleted": { "$ne": true } } },
            doc! { "$sample": { "size": size as i64 } },
        ];

        let mut cursor = self
            .collection()
            .aggregate(pipeline)
            .await
            .context("Failed to sample question pool")?;

        let mut pool = Vec::new();
        while let Some(document) = cursor
            .try_next()
            .await
            .context("Failed to read question pool cursor")?
        {
            if let Some(question) = decode_pool_document(document) {
                pool.push(question);
            }
        }

        Ok(pool)
    }

    pub async fn get(&self, question_id: &str) -> Result<QuizQuestion> {
        let object_id = ObjectId::parse_str(question_id).context("Invalid question id")?;
        self.collection()
            .find_one(doc! { "_id": object_id, "deleted": { "$ne": true } })
            .await
            .context("Failed to query question")?
            .ok_or_else(|| anyhow!("Question not found"))
    }

    pub async fn list(&self, query: ListQuestionsQuery) -> Result<Vec<QuizQuestion>> {
        let mut filter = doc! { "deleted": { "$ne": true } };

        if let Some(category) = query.category.filter(|c| !c.trim().is_empty()) {
            filter.insert("category", category);
        }
        if let Some(difficulty) = query.difficulty {
            filter.insert("difficulty", difficulty.as_str());
        }
        if let Some(search) = query.search.filter(|s| !s.trim().is_empty()) {
            let pattern = regex::escape(search.trim());
            filter.insert(
                "$or",
                vec![
                    doc! { "question": { "$regex": &pattern, "$options": "i" } },
                    doc! { "category": { "$regex": &pattern, "$options": "i" } },
                    doc! { "options": { "$regex": &pattern, "$options": "i" } },
                ],
            );
        }

        let limit = query
            .limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .min(MAX_LIST_LIMIT) as i64;
        let offset = query.offset.unwrap_or(0) as u64;

        let mut cursor = self
            .collection()
            .find(filter)
            .sort(doc! { "createdAt": -1 })
            .skip(offset)
            .limit(limit)
            .await
            .context("Failed to list questions")?;

        let mut questions = Vec::new();
        while let Some(question) = cursor
            .try_next()
            .await
            .context("Failed to read question cursor")?
        {
            questions.push(question);
        }
        Ok(questions)
    }

    pub async fn categories(&self) -> Result<Vec<String>> {
        let values = self
            .collection()
            .distinct("category", doc! { "deleted": { "$ne": true } })
            .await
            .context("Failed to list categories")?;

        let mut categories: Vec<String> = values
            .into_iter()
            .filter_map(|v| v.as_str().map(|s| s.to_string()))
            .collect();
        categories.sort();
        Ok(categories)
    }

    /// Count of live questions per difficulty bucket.
    pub async fn difficulty_distribution(&self) -> Result<Vec<(String, u64)>> {
        let pipeline = vec![
            doc! { "$match": { "deleted": { "$ne": true } } },
            doc! { "$group": { "_id": "$difficulty", "count": { "$sum": 1 } } },
            doc! { "$sort": { "_id": 1 } },
        ];

        let mut cursor = self
            .collection()
            .aggregate(pipeline)
            .with_type::<Document>()
            .await
            .context("Failed to aggregate difficulty distribution")?;

        let mut distribution = Vec::new();
        while let Some(group) = cursor
            .try_next()
            .await
            .context("Failed to read aggregation cursor")?
        {
            let difficulty = group.get_str("_id").unwrap_or("medium").to_string();
            let count = group
                .get_i32("count")
                .map(|v| v as u64)
                .or_else(|_| group.get_i64("count").map(|v| v as u64))
                .unwrap_or(0);
            distribution.push((difficulty, count));
        }
        Ok(distribution)
    }

    pub async fn update(&self, question_id: &str, req: UpdateQuestionRequest) -> Result<QuizQuestion> {
        let mut question = self.get(question_id).await?;

        if let Some(text) = req.question {
            question.question = text.trim().to_string();
        }
        if let Some(options) = req.options {
            question.options = options.iter().map(|o| o.trim().to_string()).collect();
        }
        if let Some(correct) = req.correct_answer {
            question.correct_answer = correct.trim().to_string();
        }
        if let Some(category) = req.category {
            question.category = category;
        }
        if let Some(difficulty) = req.difficulty {
            question.difficulty = difficulty;
        }
        if let Some(explanation) = req.explanation {
            question.explanation = Some(explanation);
        }

        question
            .validate()
            .map_err(|e| anyhow!("Invalid question: {}", e))?;

        let object_id = ObjectId::parse_str(question_id).context("Invalid question id")?;
        self.collection()
            .replace_one(doc! { "_id": object_id }, &question)
            .await
            .context("Failed to update question")?;

        tracing::info!("Question updated: {}", question_id);
        Ok(question)
    }

    /// Soft delete; the document stays for completed-session review.
    pub async fn delete(&self, question_id: &str) -> Result<()> {
        let object_id = ObjectId::parse_str(question_id).context("Invalid question id")?;
        let now_bson = mongodb::bson::DateTime::from_millis(Utc::now().timestamp_millis());

        let result = self
            .collection()
            .update_one(
                doc! { "_id": object_id, "deleted": { "$ne": true } },
                doc! { "$set": { "deleted": true, "deleted_at": now_bson } },
            )
            .await
            .context("Failed to delete question")?;

        if result.matched_count == 0 {
            return Err(anyhow!("Question not found"));
        }

        tracing::info!("Question soft-deleted: {}", question_id);
        Ok(())
    }
}

/// Decodes one sampled document, dropping it when the shape or the record
/// invariant is broken. A single bad document must not sink the quiz.
fn decode_pool_document(document: Document) -> Option<QuizQuestion> {
    let question: QuizQuestion = match mongodb::bson::from_document(document) {
        Ok(question) => question,
        Err(e) => {
            tracing::warn!("Skipping undecodable question document: {}", e);
            return None;
        }
    };

    if let Err(e) = question.validate() {
        tracing::warn!(
            "Skipping malformed question {}: {}",
            question.id.map(|id| id.to_hex()).unwrap_or_default(),
            e
        );
        return None;
    }

    Some(question)
}
