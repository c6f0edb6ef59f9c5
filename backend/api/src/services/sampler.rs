use rand::seq::SliceRandom;
use std::collections::HashSet;

use crate::models::question::QuizQuestion;

/// Ledger size at which trimming kicks in.
pub const SEEN_CAP: usize = 600;
/// Entries kept (most recently added) after a trim.
pub const SEEN_KEEP: usize = 500;

/// Insertion-ordered set of question ids a client has already been served.
/// The client persists it between quizzes; the server treats it as an
/// explicit value that comes in with a start-quiz request and goes back out
/// updated in the response.
#[derive(Debug, Clone, Default)]
pub struct SeenSet {
    order: Vec<String>,
    members: HashSet<String>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a ledger from client-supplied ids, deduplicating while
    /// preserving first-seen order.
    pub fn from_ids<I>(ids: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut set = Self::new();
        for id in ids {
            if set.members.insert(id.clone()) {
                set.order.push(id);
            }
        }
        set.trim();
        set
    }

    pub fn contains(&self, id: &str) -> bool {
        self.members.contains(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Appends an id if it is not already present, trimming to the most
    /// recent [`SEEN_KEEP`] entries once the ledger exceeds [`SEEN_CAP`].
    pub fn record(&mut self, id: &str) {
        if self.members.insert(id.to_string()) {
            self.order.push(id.to_string());
            self.trim();
        }
    }

    fn trim(&mut self) {
        if self.order.len() > SEEN_CAP {
            let cut = self.order.len() - SEEN_KEEP;
            let kept = self.order.split_off(cut);
            self.order = kept;
            self.members = self.order.iter().cloned().collect();
        }
    }

    pub fn ids(&self) -> &[String] {
        &self.order
    }

    pub fn into_ids(self) -> Vec<String> {
        self.order
    }
}

/// Result of one sampling pass over a question pool.
#[derive(Debug)]
pub struct SampleOutcome {
    pub questions: Vec<QuizQuestion>,
    pub fresh_count: usize,
    pub repeat_count: usize,
}

/// Assembles a quiz from `pool`, preferring questions the client has not
/// seen. Fresh questions are shuffled and taken first; any shortfall is
/// padded from shuffled repeats, and the blend is shuffled again so repeats
/// do not cluster at the end. Every served id is recorded into `seen`.
///
/// Pools smaller than `count` yield fewer questions; that is a valid
/// outcome, not an error. Shuffles are uniform and unseeded.
pub fn sample(pool: Vec<QuizQuestion>, seen: &mut SeenSet, count: usize) -> SampleOutcome {
    let mut rng = rand::rng();

    // Drop id-less documents and duplicates before partitioning.
    let mut pool_ids = HashSet::new();
    let mut fresh = Vec::new();
    let mut repeat = Vec::new();
    for q in pool {
        let Some(id) = q.id.map(|oid| oid.to_hex()) else {
            continue;
        };
        if !pool_ids.insert(id.clone()) {
            continue;
        }
        if seen.contains(&id) {
            repeat.push(q);
        } else {
            fresh.push(q);
        }
    }

    if count > 0 {
        let fresh_ratio = fresh.len() as f64 / count as f64;
        tracing::debug!(
            fresh = fresh.len(),
            repeats = repeat.len(),
            count,
            fresh_ratio,
            "sampling quiz questions"
        );
    }

    fresh.shuffle(&mut rng);
    let mut selected: Vec<QuizQuestion> = fresh.into_iter().take(count).collect();
    let fresh_count = selected.len();

    if selected.len() < count {
        repeat.shuffle(&mut rng);
        let shortfall = count - selected.len();
        selected.extend(repeat.into_iter().take(shortfall));
    }
    let repeat_count = selected.len() - fresh_count;

    selected.shuffle(&mut rng);

    for q in &selected {
        if let Some(id) = q.id.map(|oid| oid.to_hex()) {
            seen.record(&id);
        }
    }

    SampleOutcome {
        questions: selected,
        fresh_count,
        repeat_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::Difficulty;
    use chrono::Utc;
    use mongodb::bson::oid::ObjectId;

    fn make_question(n: usize) -> QuizQuestion {
        QuizQuestion {
            id: Some(ObjectId::new()),
            question: format!("Question number {}?", n),
            options: vec!["Yes".to_string(), "No".to_string()],
            correct_answer: "Yes".to_string(),
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
    fn returns_at_most_count_unique_items_from_pool() {
        let pool = make_pool(30);
        let pool_ids: HashSet<String> = ids_of(&pool).into_iter().collect();
        let mut seen = SeenSet::new();

        let outcome = sample(pool, &mut seen, 10);
        assert_eq!(outcome.questions.len(), 10);

        let result_ids = ids_of(&outcome.questions);
        let unique: HashSet<&String> = result_ids.iter().collect();
        assert_eq!(unique.len(), result_ids.len(), "no duplicate ids");
        assert!(result_ids.iter().all(|id| pool_ids.contains(id)));
    }

    #[test]
    fn empty_seen_yields_all_fresh() {
        let pool = make_pool(20);
        let mut seen = SeenSet::new();

        let outcome = sample(pool, &mut seen, 10);
        assert_eq!(outcome.fresh_count, 10);
        assert_eq!(outcome.repeat_count, 0);
    }

    #[test]
    fn served_ids_are_recorded_into_seen() {
        let pool = make_pool(15);
        let mut seen = SeenSet::new();

        let outcome = sample(pool, &mut seen, 10);
        for id in ids_of(&outcome.questions) {
            assert!(seen.contains(&id));
        }
        assert_eq!(seen.len(), 10);
    }

    #[test]
    fn short_pool_returns_fewer_without_error() {
        let pool = make_pool(4);
        let mut seen = SeenSet::new();

        let outcome = sample(pool, &mut seen, 10);
        assert_eq!(outcome.questions.len(), 4);
    }

    #[test]
    fn empty_pool_returns_empty() {
        let mut seen = SeenSet::new();
        let outcome = sample(Vec::new(), &mut seen, 10);
        assert!(outcome.questions.is_empty());
        assert!(seen.is_empty());
    }

    #[test]
    fn prefers_fresh_when_enough_available() {
        // 10 fresh + 5 already seen, asking for 10: all results fresh.
        let fresh_pool = make_pool(10);
        let seen_pool = make_pool(5);
        let seen_ids = ids_of(&seen_pool);

        let mut seen = SeenSet::from_ids(seen_ids.clone());
        let mut pool = fresh_pool.clone();
        pool.extend(seen_pool);

        let outcome = sample(pool, &mut seen, 10);
        assert_eq!(outcome.questions.len(), 10);
        assert_eq!(outcome.fresh_count, 10);
        assert_eq!(outcome.repeat_count, 0);

        let fresh_ids: HashSet<String> = ids_of(&fresh_pool).into_iter().collect();
        for id in ids_of(&outcome.questions) {
            assert!(fresh_ids.contains(&id));
        }
        // 5 previously seen + 10 freshly served
        assert_eq!(seen.len(), 15);
    }

    #[test]
    fn pads_with_repeats_when_fresh_runs_short() {
        let pool = make_pool(12);
        let first_eight = ids_of(&pool[..8]);

        let mut seen = SeenSet::from_ids(first_eight);
        let outcome = sample(pool, &mut seen, 10);

        assert_eq!(outcome.questions.len(), 10);
        assert_eq!(outcome.fresh_count, 4);
        assert_eq!(outcome.repeat_count, 6);
    }

    #[test]
    fn duplicate_pool_entries_are_collapsed() {
        let mut pool = make_pool(5);
        let dupes = pool.clone();
        pool.extend(dupes);

        let mut seen = SeenSet::new();
        let outcome = sample(pool, &mut seen, 10);
        assert_eq!(outcome.questions.len(), 5);
    }

    #[test]
    fn seen_set_trims_to_most_recent() {
        let mut seen = SeenSet::new();
        for i in 0..SEEN_CAP + 1 {
            seen.record(&format!("q{}", i));
        }

        assert_eq!(seen.len(), SEEN_KEEP);
        // Oldest entries are gone, the newest survive in insertion order.
        assert!(!seen.contains("q0"));
        assert!(seen.contains(&format!("q{}", SEEN_CAP)));
        let expected_first = format!("q{}", SEEN_CAP + 1 - SEEN_KEEP);
        assert_eq!(seen.ids().first(), Some(&expected_first));
    }

    #[test]
    fn from_ids_dedupes_preserving_order() {
        let seen = SeenSet::from_ids(vec![
            "a".to_string(),
            "b".to_string(),
            "a".to_string(),
            "c".to_string(),
        ]);
        assert_eq!(seen.ids(), &["a", "b", "c"]);
    }
}
