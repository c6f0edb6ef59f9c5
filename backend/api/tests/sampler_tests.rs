use chrono::Utc;
use mongodb::bson::oid::ObjectId;
use std::collections::HashSet;

use nurseprep_api::models::question::{Difficulty, QuizQuestion};
use nurseprep_api::services::sampler::{sample, SeenSet, SEEN_CAP, SEEN_KEEP};

fn make_question(n: usize) -> QuizQuestion {
    QuizQuestion {
        id: Some(ObjectId::new()),
        question: format!("Which intervention applies in scenario {}?", n),
        options: vec![
            "Administer oxygen".to_string(),
            "Encourage ambulation".to_string(),
            "Restrict fluids".to_string(),
            "Monitor vitals hourly".to_string(),
        ],
        correct_answer: "Administer oxygen".to_string(),
        category: "General Nursing".to_string(),
        difficulty: Difficulty::Medium,
        explanation: None,
        created_at: Utc::now(),
        created_by: "admin".to_string(),
        deleted: false,
        deleted_at: None,
    }
}

fn make_pool(n: usize) -> Vec<QuizQuestion> {
    (0..n).map(make_question).collect()
}

fn ids_of(questions: &[QuizQuestion]) -> Vec<String> {
    questions.iter().map(|q| q.id.unwrap().to_hex()).collect()
}

#[test]
fn repeated_quizzes_exhaust_the_pool_before_repeating() {
    // A 30-question pool served in batches of 10: three quizzes cover the
    // whole pool before any repeat appears.
    let pool = make_pool(30);
    let mut seen = SeenSet::new();
    let mut served: HashSet<String> = HashSet::new();

    for _ in 0..3 {
        let outcome = sample(pool.clone(), &mut seen, 10);
        assert_eq!(outcome.questions.len(), 10);
        assert_eq!(outcome.repeat_count, 0);
        for id in ids_of(&outcome.questions) {
            assert!(served.insert(id), "question repeated too early");
        }
    }
    assert_eq!(served.len(), 30);

    // Fourth quiz must reuse; the pool has nothing fresh left.
    let outcome = sample(pool, &mut seen, 10);
    assert_eq!(outcome.fresh_count, 0);
    assert_eq!(outcome.repeat_count, 10);
}

#[test]
fn shortfall_blends_fresh_and_repeats_without_duplicates() {
    let pool = make_pool(14);
    let mut seen = SeenSet::from_ids(ids_of(&pool[..8]));

    let outcome = sample(pool, &mut seen, 10);
    assert_eq!(outcome.questions.len(), 10);
    assert_eq!(outcome.fresh_count, 6);
    assert_eq!(outcome.repeat_count, 4);

    let unique: HashSet<String> = ids_of(&outcome.questions).into_iter().collect();
    assert_eq!(unique.len(), 10);
}

#[test]
fn client_ledger_round_trips_through_requests() {
    // Start-quiz request carries the ledger in, and the updated version goes
    // back out; replaying it must keep the reuse guarantee.
    let pool = make_pool(25);
    let mut seen = SeenSet::new();

    let first = sample(pool.clone(), &mut seen, 10);
    let returned_ids = seen.into_ids();
    assert_eq!(returned_ids.len(), 10);

    let mut seen_again = SeenSet::from_ids(returned_ids);
    let second = sample(pool, &mut seen_again, 10);
    assert_eq!(second.repeat_count, 0);

    let first_ids: HashSet<String> = ids_of(&first.questions).into_iter().collect();
    for id in ids_of(&second.questions) {
        assert!(!first_ids.contains(&id));
    }
}

#[test]
fn ledger_trims_but_sampling_still_works() {
    let mut seen = SeenSet::new();
    for i in 0..SEEN_CAP + 50 {
        seen.record(&format!("stale-{}", i));
    }
    assert!(seen.len() <= SEEN_KEEP + 50);

    let pool = make_pool(20);
    let outcome = sample(pool, &mut seen, 10);
    assert_eq!(outcome.questions.len(), 10);
    assert_eq!(outcome.fresh_count, 10);
}

#[test]
fn asking_for_more_than_the_pool_returns_everything_once() {
    let pool = make_pool(7);
    let pool_ids: HashSet<String> = ids_of(&pool).into_iter().collect();
    let mut seen = SeenSet::new();

    let outcome = sample(pool, &mut seen, 50);
    assert_eq!(outcome.questions.len(), 7);

    let result_ids: HashSet<String> = ids_of(&outcome.questions).into_iter().collect();
    assert_eq!(result_ids, pool_ids);
}
