//! Lesson generation: LLM provider abstraction + strict output schema.
//! The generator is the slow, unreliable link of the pipeline, so its
//! contract is `Option` — a `None` marks the article failed and the next
//! pending sweep is the retry.

use std::sync::Mutex;
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use async_trait::async_trait;
use metrics::counter;
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};

// ------------------------------------------------------------
// Schema constants
// ------------------------------------------------------------

/// Closed sector taxonomy the generator may tag articles with.
pub const SECTOR_SLUGS: [&str; 15] = [
    "asia", "americas", "europe", "india", "china", "japan", "war", "crypto", "stocks", "options",
    "bonds", "currency", "etfs", "indices", "sector",
];

pub const QUIZ_QUESTIONS: usize = 6;
pub const QUIZ_OPTIONS: usize = 4;
pub const MAX_SECTORS: usize = 5;

/// Hard cap on the article body sent to the model (context-limit guard).
pub const LLM_BODY_MAX_CHARS: usize = 8_000;

// ------------------------------------------------------------
// Lesson payload (FLS v1)
// ------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LessonHeader {
    pub lesson_title: String,
    pub difficulty: String,
    pub read_time_core_min: u32,
    pub read_time_deep_min: u32,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub learning_outcomes: Vec<String>,
    #[serde(default)]
    pub disclaimer: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WhatHappened {
    #[serde(default)]
    pub event_bullets: Vec<String>,
    #[serde(default)]
    pub market_question: String,
    #[serde(default)]
    pub timing_note: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConceptCard {
    pub concept: String,
    #[serde(default)]
    pub plain_meaning: String,
    #[serde(default)]
    pub why_it_moves_prices: String,
    #[serde(default)]
    pub in_this_article: String,
    #[serde(default)]
    pub common_confusion: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransmissionRow {
    #[serde(default)]
    pub shock: String,
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub market_variable: String,
    #[serde(default)]
    pub asset_impact: String,
    #[serde(default)]
    pub confidence: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MechanismEdge {
    pub from_node: String,
    pub to_node: String,
    #[serde(default)]
    pub relationship: String,
    #[serde(default)]
    pub evidence: String,
    #[serde(default)]
    pub strength: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MechanismMap {
    #[serde(default)]
    pub transmission_table: Vec<TransmissionRow>,
    #[serde(default)]
    pub edge_list: Vec<MechanismEdge>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetImpact {
    pub asset: String,
    #[serde(default)]
    pub typical_reaction: String,
    #[serde(default)]
    pub direction: String,
    #[serde(default)]
    pub mechanism_driver: String,
    #[serde(default)]
    pub confidence: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PracticeSkill {
    #[serde(default)]
    pub skill_target: String,
    #[serde(default)]
    pub inputs: String,
    #[serde(default)]
    pub level_zone: String,
    #[serde(default)]
    pub scenario_a: String,
    #[serde(default)]
    pub scenario_b: String,
    #[serde(default)]
    pub what_to_watch: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LessonQuizQuestion {
    #[serde(rename = "type", default)]
    pub qtype: String,
    pub prompt: String,
    pub options: Vec<String>,
    pub correct_index: u32,
    #[serde(default)]
    pub explanation: String,
}

/// The full structured lesson attached to a processed article and persisted
/// as one JSON blob.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LessonContent {
    pub header: LessonHeader,
    pub what_happened: WhatHappened,
    #[serde(default)]
    pub concept_cards: Vec<ConceptCard>,
    #[serde(default)]
    pub mechanism_map: MechanismMap,
    #[serde(default)]
    pub asset_impact_matrix: Vec<AssetImpact>,
    #[serde(default)]
    pub practice_skill: PracticeSkill,
    pub quiz: Vec<LessonQuizQuestion>,
    pub sectors: Vec<String>,
    pub summary: String,
}

// ------------------------------------------------------------
// Parsing + validation
// ------------------------------------------------------------

/// Drop reasoning blocks and code fences some models wrap around the JSON.
fn strip_reasoning(raw: &str) -> String {
    static RE_THINK: OnceCell<Regex> = OnceCell::new();
    let re = RE_THINK.get_or_init(|| Regex::new(r"(?is)<think>.*?</think>").unwrap());
    let stripped = re.replace_all(raw, "");
    let mut s = stripped.trim();
    if let Some(rest) = s.strip_prefix("```json") {
        s = rest;
    } else if let Some(rest) = s.strip_prefix("```") {
        s = rest;
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest;
    }
    s.trim().to_string()
}

/// Parse a raw model response and enforce the lesson schema. Any violation
/// is an error; the caller treats it exactly like a network failure.
pub fn parse_and_validate(raw: &str) -> Result<LessonContent> {
    let cleaned = strip_reasoning(raw);
    let mut lesson: LessonContent =
        serde_json::from_str(&cleaned).context("lesson response is not valid json")?;
    validate(&mut lesson)?;
    Ok(lesson)
}

/// Schema checks; also normalizes sector slugs to lowercase and drops
/// duplicates while preserving order.
pub fn validate(lesson: &mut LessonContent) -> Result<()> {
    ensure!(!lesson.summary.trim().is_empty(), "empty summary");
    ensure!(
        lesson.quiz.len() == QUIZ_QUESTIONS,
        "expected {QUIZ_QUESTIONS} quiz questions, got {}",
        lesson.quiz.len()
    );
    for (i, q) in lesson.quiz.iter().enumerate() {
        ensure!(!q.prompt.trim().is_empty(), "question {i} has empty prompt");
        ensure!(
            q.options.len() == QUIZ_OPTIONS,
            "question {i} has {} options, expected {QUIZ_OPTIONS}",
            q.options.len()
        );
        ensure!(
            (q.correct_index as usize) < QUIZ_OPTIONS,
            "question {i} correct_index {} out of range",
            q.correct_index
        );
    }

    let mut sectors: Vec<String> = Vec::with_capacity(lesson.sectors.len());
    for slug in &lesson.sectors {
        let slug = slug.trim().to_ascii_lowercase();
        ensure!(
            SECTOR_SLUGS.contains(&slug.as_str()),
            "unknown sector slug {slug}"
        );
        if !sectors.contains(&slug) {
            sectors.push(slug);
        }
    }
    ensure!(
        sectors.len() <= MAX_SECTORS,
        "{} sectors exceeds the cap of {MAX_SECTORS}",
        sectors.len()
    );
    lesson.sectors = sectors;
    Ok(())
}

// ------------------------------------------------------------
// Generator abstraction + providers
// ------------------------------------------------------------

#[async_trait]
pub trait LessonGenerator: Send + Sync {
    /// Turn a headline + body into a validated lesson, or `None` on any
    /// provider/parse/schema failure. No internal retry.
    async fn generate(&self, headline: &str, body: &str) -> Option<LessonContent>;
    fn provider_name(&self) -> &'static str;
}

const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

const SYSTEM_PROMPT: &str = r#"You are a financial news analyst and educator. Given a news article, produce a financial-literacy lesson as a single JSON object with exactly these keys:

- "summary": a concise 3-4 paragraph summary of the article's key points.
- "header": {"lesson_title", "difficulty" (one of "beginner", "intermediate", "advanced"), "read_time_core_min", "read_time_deep_min", "tags" (list of short strings), "learning_outcomes" (list of strings), "disclaimer"}.
- "what_happened": {"event_bullets" (3-5 strings), "market_question", "timing_note"}.
- "concept_cards": 2-4 objects {"concept", "plain_meaning", "why_it_moves_prices", "in_this_article", "common_confusion"}.
- "mechanism_map": {"transmission_table": list of {"shock", "channel", "market_variable", "asset_impact", "confidence"}, "edge_list": list of {"from_node", "to_node", "relationship", "evidence", "strength" (0.0-1.0)}}.
- "asset_impact_matrix": list of {"asset", "typical_reaction", "direction", "mechanism_driver", "confidence"}.
- "practice_skill": {"skill_target", "inputs", "level_zone", "scenario_a", "scenario_b", "what_to_watch"}.
- "quiz": exactly 6 questions {"type" (e.g. "recall" or "application"), "prompt", "options" (exactly 4 strings), "correct_index" (0-3), "explanation"}.
- "sectors": up to 5 slugs from: asia, americas, europe, india, china, japan, war, crypto, stocks, options, bonds, currency, etfs, indices, sector.

Write for a curious beginner. Explain jargon. Never give investment advice. Respond ONLY with the JSON object, no prose around it."#;

/// OpenRouter chat-completions provider.
pub struct OpenRouterGenerator {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenRouterGenerator {
    pub fn new(api_key: String, model: String) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .build()
            .expect("reqwest client");
        Self {
            http,
            api_key,
            model,
        }
    }
}

#[async_trait]
impl LessonGenerator for OpenRouterGenerator {
    async fn generate(&self, headline: &str, body: &str) -> Option<LessonContent> {
        if self.api_key.is_empty() {
            return None;
        }

        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct ResponseFormat<'a> {
            #[serde(rename = "type")]
            kind: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            response_format: ResponseFormat<'a>,
            temperature: f32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: String,
        }

        let truncated: String = body.chars().take(LLM_BODY_MAX_CHARS).collect();
        let user_prompt = format!("Article headline: {headline}\n\nArticle body:\n{truncated}");
        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                Msg {
                    role: "user",
                    content: &user_prompt,
                },
            ],
            response_format: ResponseFormat { kind: "json_object" },
            temperature: 0.3,
        };

        counter!("lesson_requests_total").increment(1);
        let resp = match self
            .http
            .post(OPENROUTER_URL)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = ?e, "lesson generation request failed");
                counter!("lesson_failures_total").increment(1);
                return None;
            }
        };
        if !resp.status().is_success() {
            tracing::warn!(status = %resp.status(), "lesson generation http error");
            counter!("lesson_failures_total").increment(1);
            return None;
        }
        let body: Resp = match resp.json().await {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(error = ?e, "lesson generation body unreadable");
                counter!("lesson_failures_total").increment(1);
                return None;
            }
        };
        let content = body.choices.first().map(|c| c.message.content.as_str())?;

        match parse_and_validate(content) {
            Ok(lesson) => Some(lesson),
            Err(e) => {
                tracing::warn!(error = ?e, "lesson response rejected");
                counter!("lesson_rejected_total").increment(1);
                None
            }
        }
    }

    fn provider_name(&self) -> &'static str {
        "openrouter"
    }
}

// ------------------------------------------------------------
// Test helpers (compiled into the lib so integration tests can use them)
// ------------------------------------------------------------

/// A minimal lesson that passes `validate`.
pub fn canned_lesson(summary: &str, sectors: &[&str]) -> LessonContent {
    LessonContent {
        header: LessonHeader {
            lesson_title: "What moved the market".into(),
            difficulty: "beginner".into(),
            read_time_core_min: 3,
            read_time_deep_min: 8,
            ..Default::default()
        },
        quiz: canned_quiz(),
        sectors: sectors.iter().map(|s| s.to_string()).collect(),
        summary: summary.to_string(),
        ..Default::default()
    }
}

pub fn canned_quiz() -> Vec<LessonQuizQuestion> {
    (0..QUIZ_QUESTIONS)
        .map(|i| LessonQuizQuestion {
            qtype: "recall".into(),
            prompt: format!("Question {}", i + 1),
            options: vec!["A".into(), "B".into(), "C".into(), "D".into()],
            correct_index: 0,
            explanation: "A is what the article states.".into(),
        })
        .collect()
}

/// Deterministic generator for tests: a fixed lesson, with optional
/// per-headline rejections.
pub struct MockGenerator {
    fixed: Option<LessonContent>,
    reject: Vec<String>,
    calls: Mutex<Vec<(String, String)>>,
}

impl MockGenerator {
    pub fn always(lesson: LessonContent) -> Self {
        Self {
            fixed: Some(lesson),
            reject: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Generator that fails every call.
    pub fn failing() -> Self {
        Self {
            fixed: None,
            reject: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Fail only for the given headline.
    pub fn rejecting(mut self, headline: &str) -> Self {
        self.reject.push(headline.to_string());
        self
    }

    /// (headline, body) pairs seen so far.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().expect("poisoned calls").clone()
    }
}

#[async_trait]
impl LessonGenerator for MockGenerator {
    async fn generate(&self, headline: &str, body: &str) -> Option<LessonContent> {
        self.calls
            .lock()
            .expect("poisoned calls")
            .push((headline.to_string(), body.to_string()));
        if self.reject.iter().any(|h| h == headline) {
            return None;
        }
        self.fixed.clone()
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}
