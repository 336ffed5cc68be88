// tests/lesson_schema.rs
// Strict schema enforcement on the generator's output. A violation is
// indistinguishable from a provider failure to the caller.

use finlit_news_engine::lesson::{
    canned_lesson, parse_and_validate, LessonContent, MAX_SECTORS, QUIZ_QUESTIONS,
};

fn as_json(lesson: &LessonContent) -> String {
    serde_json::to_string(lesson).unwrap()
}

#[test]
fn a_valid_lesson_parses() {
    let lesson = parse_and_validate(&as_json(&canned_lesson("Summary.", &["stocks"]))).unwrap();
    assert_eq!(lesson.quiz.len(), QUIZ_QUESTIONS);
    assert_eq!(lesson.sectors, vec!["stocks".to_string()]);
}

#[test]
fn reasoning_and_fences_around_the_json_are_tolerated() {
    let json = as_json(&canned_lesson("Summary.", &["stocks"]));
    let wrapped = format!("<think>chain of thought here</think>\n```json\n{json}\n```");
    assert!(parse_and_validate(&wrapped).is_ok());
}

#[test]
fn five_questions_are_rejected() {
    let mut lesson = canned_lesson("Summary.", &["stocks"]);
    lesson.quiz.pop();
    assert!(parse_and_validate(&as_json(&lesson)).is_err());
}

#[test]
fn seven_questions_are_rejected() {
    let mut lesson = canned_lesson("Summary.", &["stocks"]);
    let extra = lesson.quiz[0].clone();
    lesson.quiz.push(extra);
    assert!(parse_and_validate(&as_json(&lesson)).is_err());
}

#[test]
fn wrong_option_count_is_rejected() {
    let mut lesson = canned_lesson("Summary.", &["stocks"]);
    lesson.quiz[2].options.pop();
    assert!(parse_and_validate(&as_json(&lesson)).is_err());

    let mut lesson = canned_lesson("Summary.", &["stocks"]);
    lesson.quiz[2].options.push("E".into());
    assert!(parse_and_validate(&as_json(&lesson)).is_err());
}

#[test]
fn out_of_range_correct_index_is_rejected() {
    let mut lesson = canned_lesson("Summary.", &["stocks"]);
    lesson.quiz[0].correct_index = 4;
    assert!(parse_and_validate(&as_json(&lesson)).is_err());
}

#[test]
fn unknown_sector_slug_is_rejected() {
    let lesson = canned_lesson("Summary.", &["stonks"]);
    assert!(parse_and_validate(&as_json(&lesson)).is_err());
}

#[test]
fn too_many_sectors_are_rejected() {
    let lesson = canned_lesson(
        "Summary.",
        &["asia", "europe", "india", "china", "japan", "war"],
    );
    assert!(lesson.sectors.len() > MAX_SECTORS);
    assert!(parse_and_validate(&as_json(&lesson)).is_err());
}

#[test]
fn missing_required_field_is_rejected() {
    let json = as_json(&canned_lesson("Summary.", &["stocks"]));
    let mut value: serde_json::Value = serde_json::from_str(&json).unwrap();
    value.as_object_mut().unwrap().remove("summary");
    assert!(parse_and_validate(&value.to_string()).is_err());
}

#[test]
fn empty_summary_is_rejected() {
    let lesson = canned_lesson("   ", &["stocks"]);
    assert!(parse_and_validate(&as_json(&lesson)).is_err());
}

#[test]
fn non_json_output_is_rejected() {
    assert!(parse_and_validate("Sorry, I cannot help with that.").is_err());
}
