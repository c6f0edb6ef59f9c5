use nurseprep_api::services::question_parser::{parse_questions, DEFAULT_CATEGORY};

#[test]
fn parses_a_realistic_exam_paste() {
    let text = "\
1. A client with heart failure is prescribed furosemide. Which electrolyte should the nurse monitor most closely?
A. Sodium
B. Potassium (correct answer)
C. Calcium
D. Magnesium

2. Which position is most appropriate for a client experiencing dyspnea?
A. Supine
B. Trendelenburg
C. High Fowler's (correct)
D. Prone

3. The nurse is caring for a postpartum client. Lochia rubra is expected for how long after delivery?
A. 1-3 days [correct]
B. 4-10 days
C. 2-6 weeks
D. Only during the first 24 hours
";

    let report = parse_questions(text);
    assert_eq!(report.questions.len(), 3);
    assert_eq!(report.dropped, 0);

    assert_eq!(report.questions[0].correct_answer, "Potassium");
    assert_eq!(report.questions[1].correct_answer, "High Fowler's");
    assert_eq!(report.questions[2].correct_answer, "1-3 days");

    for q in &report.questions {
        assert_eq!(q.options.len(), 4);
        assert_eq!(q.category, DEFAULT_CATEGORY);
        assert!(q.options.contains(&q.correct_answer));
        assert!(!q.question.contains("correct"));
    }
}

#[test]
fn mixed_good_and_bad_blocks_only_keep_the_good() {
    let text = "\
1. Valid question with a marked answer?
A. First option
B. Second option (correct answer)

2. Missing its correct marker?
A. One
B. Two

3. Another valid question here?
A. Alpha *correct*
B. Beta
";

    let report = parse_questions(text);
    assert_eq!(report.questions.len(), 2);
    assert_eq!(report.dropped, 1);
    assert_eq!(report.questions[0].correct_answer, "Second option");
    assert_eq!(report.questions[1].correct_answer, "Alpha");
}

#[test]
fn question_bodies_spanning_lines_are_joined() {
    let text = "\
1. A 68-year-old client presents to the emergency department with
crushing substernal chest pain radiating to the left arm.
Which action should the nurse take first?
A. Obtain a 12-lead ECG (correct answer)
B. Administer morphine
C. Draw cardiac enzymes
D. Start an IV line
";

    let report = parse_questions(text);
    assert_eq!(report.questions.len(), 1);
    let q = &report.questions[0];
    assert!(q.question.starts_with("A 68-year-old client"));
    assert!(q.question.ends_with("take first?"));
    assert!(!q.question.contains('\n'));
}

#[test]
fn unnumbered_paste_still_parses() {
    let text = "\
Which vitamin deficiency causes scurvy in malnourished clients?
A. Vitamin A
B. Vitamin C (correct answer)
C. Vitamin D
D. Vitamin K
";

    let report = parse_questions(text);
    assert_eq!(report.questions.len(), 1);
    assert_eq!(report.questions[0].correct_answer, "Vitamin C");
}

#[test]
fn empty_and_noise_input_yields_nothing() {
    assert!(parse_questions("").questions.is_empty());
    assert!(parse_questions("\n\n\n").questions.is_empty());

    // Stray options with no question line are ignored entirely.
    let report = parse_questions("A. Orphan option\nB. Another (correct)\n");
    assert!(report.questions.is_empty());
    assert_eq!(report.dropped, 0);
}
