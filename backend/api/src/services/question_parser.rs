use lazy_static::lazy_static;
use regex::Regex;

use crate::models::question::Difficulty;

/// Category assigned to uploaded questions when the text carries none.
pub const DEFAULT_CATEGORY: &str = "General Nursing";

lazy_static! {
    static ref NUMBERED_START: Regex = Regex::new(r"^\d+\.\s*").unwrap();
    static ref OPTION_LINE: Regex = Regex::new(r"^[A-D]\.\s*").unwrap();
    /// Inline markers designating the correct option; stripped from the
    /// stored text.
    static ref CORRECT_MARKERS: Vec<Regex> = vec![
        Regex::new(r"(?i)\(correct answer\)").unwrap(),
        Regex::new(r"(?i)\(correct\)").unwrap(),
        Regex::new(r"(?i)\[correct\]").unwrap(),
        Regex::new(r"(?i)\*correct\*").unwrap(),
    ];
}

/// A question lifted out of pasted exam text. Id and timestamps are assigned
/// at insert time; category/difficulty are defaulted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedQuestion {
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: String,
    pub category: String,
    pub difficulty: Difficulty,
}

/// Parser output. `dropped` is the only diagnostic for malformed blocks;
/// this is a best-effort scanner, not a grammar.
#[derive(Debug, Default)]
pub struct ParseReport {
    pub questions: Vec<ParsedQuestion>,
    pub dropped: usize,
}

#[derive(Default)]
struct Draft {
    options: Vec<String>,
    correct_answer: String,
}

/// Scans pasted exam text into question records.
///
/// A line matching `^\d+\.` opens a new record, as does a free-standing
/// question line (>10 chars, starts with a letter, not an option) while no
/// record is open. `^[A-D]\.` lines are options; one of the inline correct
/// markers picks the correct answer. A blank line closes the record once a
/// body has accumulated; other lines extend the question body. Records
/// missing text, two options, or a matching correct answer are silently
/// dropped and only counted.
pub fn parse_questions(text: &str) -> ParseReport {
    let mut candidates: Vec<(String, Draft)> = Vec::new();
    let mut current: Option<Draft> = None;
    let mut body = String::new();

    for line in text.lines() {
        let trimmed = line.trim();
        let is_option = OPTION_LINE.is_match(trimmed);

        let starts_numbered = NUMBERED_START.is_match(trimmed);
        let starts_unnumbered = current.is_none()
            && trimmed.len() > 10
            && trimmed
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic())
            && !is_option;

        if starts_numbered || starts_unnumbered {
            if let Some(draft) = current.take() {
                candidates.push((std::mem::take(&mut body), draft));
            }
            body = NUMBERED_START.replace(trimmed, "").trim().to_string();
            current = Some(Draft::default());
        } else if is_option {
            if let Some(draft) = &mut current {
                let option_text = OPTION_LINE.replace(trimmed, "").to_string();
                let (clean, is_correct) = strip_correct_marker(&option_text);
                draft.options.push(clean.clone());
                if is_correct {
                    draft.correct_answer = clean;
                }
            }
        } else if trimmed.is_empty() {
            if !body.is_empty() {
                if let Some(draft) = current.take() {
                    candidates.push((std::mem::take(&mut body), draft));
                }
            }
        } else if current.is_some() {
            // Continuation of the question body.
            if !body.is_empty() {
                body.push(' ');
            }
            body.push_str(trimmed);
        }
    }

    if let Some(draft) = current.take() {
        if !body.is_empty() {
            candidates.push((body, draft));
        }
    }

    let total = candidates.len();
    let questions: Vec<ParsedQuestion> = candidates
        .into_iter()
        .filter_map(|(question, draft)| {
            let valid = !question.is_empty()
                && draft.options.len() >= 2
                && !draft.correct_answer.is_empty()
                && draft.options.contains(&draft.correct_answer);
            valid.then(|| ParsedQuestion {
                question,
                options: draft.options,
                correct_answer: draft.correct_answer,
                category: DEFAULT_CATEGORY.to_string(),
                difficulty: Difficulty::default(),
            })
        })
        .collect();

    let dropped = total - questions.len();
    tracing::debug!(parsed = questions.len(), dropped, "parsed question upload");

    ParseReport { questions, dropped }
}

fn strip_correct_marker(option_text: &str) -> (String, bool) {
    for marker in CORRECT_MARKERS.iter() {
        if marker.is_match(option_text) {
            let clean = marker.replace(option_text, "").trim().to_string();
            return (clean, true);
        }
    }
    (option_text.trim().to_string(), false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_two_numbered_questions() {
        let text = "1. Q1 text here?\nA. X\nB. Y (correct answer)\n\n2. Q2 text here?\nA. M\nB. N (correct)\n";
        let report = parse_questions(text);

        assert_eq!(report.questions.len(), 2);
        assert_eq!(report.dropped, 0);

        let q1 = &report.questions[0];
        assert_eq!(q1.question, "Q1 text here?");
        assert_eq!(q1.options, vec!["X", "Y"]);
        assert_eq!(q1.correct_answer, "Y");

        let q2 = &report.questions[1];
        assert_eq!(q2.question, "Q2 text here?");
        assert_eq!(q2.options, vec!["M", "N"]);
        assert_eq!(q2.correct_answer, "N");
    }

    #[test]
    fn parses_unnumbered_question_start() {
        let text = "What is a priority nursing intervention for clients with pulmonary embolism?\nA. Encourage ambulation\nB. Administer oxygen and anticoagulants as prescribed (correct answer)\nC. Promote fluid overload\nD. Ignore respiratory status\n";
        let report = parse_questions(text);

        assert_eq!(report.questions.len(), 1);
        let q = &report.questions[0];
        assert_eq!(q.options.len(), 4);
        assert_eq!(
            q.correct_answer,
            "Administer oxygen and anticoagulants as prescribed"
        );
        assert_eq!(q.category, DEFAULT_CATEGORY);
        assert_eq!(q.difficulty, Difficulty::Medium);
    }

    #[test]
    fn all_marker_forms_are_recognized_and_stripped() {
        for marker in ["(correct answer)", "(Correct)", "[CORRECT]", "*correct*"] {
            let text = format!("1. Some question text?\nA. First\nB. Second {}\n", marker);
            let report = parse_questions(&text);
            assert_eq!(report.questions.len(), 1, "marker {marker}");
            let q = &report.questions[0];
            assert_eq!(q.correct_answer, "Second", "marker {marker}");
            assert_eq!(q.options[1], "Second", "marker {marker}");
        }
    }

    #[test]
    fn multiline_body_is_joined_with_spaces() {
        let text = "1. A patient presents with fever\nand neck stiffness. Likely diagnosis?\nA. Malaria\nB. Meningitis (correct answer)\n";
        let report = parse_questions(text);

        assert_eq!(report.questions.len(), 1);
        assert_eq!(
            report.questions[0].question,
            "A patient presents with fever and neck stiffness. Likely diagnosis?"
        );
    }

    #[test]
    fn single_option_record_is_dropped() {
        let text = "1. Only one option here?\nA. Lonely (correct answer)\n";
        let report = parse_questions(text);
        assert!(report.questions.is_empty());
        assert_eq!(report.dropped, 1);
    }

    #[test]
    fn missing_marker_drops_the_record() {
        let text = "1. No marker anywhere?\nA. One\nB. Two\n";
        let report = parse_questions(text);
        assert!(report.questions.is_empty());
        assert_eq!(report.dropped, 1);
    }

    #[test]
    fn blank_line_closes_a_record() {
        let text = "1. First question body?\nA. X (correct)\nB. Y\n\nSecond question without number?\nA. P (correct)\nB. Q\n";
        let report = parse_questions(text);
        assert_eq!(report.questions.len(), 2);
        assert_eq!(report.questions[1].question, "Second question without number?");
    }

    #[test]
    fn garbage_input_yields_no_records() {
        let report = parse_questions("A. stray option\nB. another\n\n\n");
        assert!(report.questions.is_empty());
        assert_eq!(report.dropped, 0);
    }

    #[test]
    fn reparsing_reconstructed_text_is_stable() {
        let text = "1. Q1 text here?\nA. X\nB. Y (correct answer)\n\n2. Q2 text here?\nA. M\nB. N (correct)\n";
        let first = parse_questions(text);

        // Rebuild the canonical text form and parse again.
        let mut rebuilt = String::new();
        for (i, q) in first.questions.iter().enumerate() {
            rebuilt.push_str(&format!("{}. {}\n", i + 1, q.question));
            for (j, opt) in q.options.iter().enumerate() {
                let letter = (b'A' + j as u8) as char;
                if *opt == q.correct_answer {
                    rebuilt.push_str(&format!("{}. {} (correct answer)\n", letter, opt));
                } else {
                    rebuilt.push_str(&format!("{}. {}\n", letter, opt));
                }
            }
            rebuilt.push('\n');
        }

        let second = parse_questions(&rebuilt);
        assert_eq!(first.questions, second.questions);
    }
}
