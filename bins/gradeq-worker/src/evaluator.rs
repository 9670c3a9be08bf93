/// Keyword Evaluator - Reference Grader for the Worker
///
/// **Scoring Tiers:**
/// 1. Normalized exact match → correct, confidence 100
/// 2. Keyword overlap ≥ 70% → correct, confidence = overlap
/// 3. Keyword overlap < 30% → incorrect, confidence = 1 - overlap
/// 4. Anything in between → manual review
///
/// **Normalization Rules:**
/// - Lowercase
/// - Punctuation removed
/// - Runs of whitespace collapsed, ends trimmed
/// - Accents preserved
///
/// Keywords are the distinct normalized words longer than two characters
/// that are not Spanish stopwords. Overlap is the share of expected keywords
/// found in the student answer.
use anyhow::Result;
use async_trait::async_trait;
use gradeq_common::types::{GradingJob, GradingMethod, GradingOutcome, GradingStatus};
use gradeq_dispatcher::Grader;
use std::collections::HashSet;

const CORRECT_THRESHOLD: f64 = 0.7;
const INCORRECT_THRESHOLD: f64 = 0.3;

const STOPWORDS: &[&str] = &[
    "el", "la", "de", "que", "y", "a", "en", "un", "ser", "se", "no", "haber", "por", "con",
    "su", "para", "como", "estar", "tener", "le", "lo", "todo", "pero", "mas", "más", "hacer",
    "o", "poder", "decir", "este", "ir", "otro", "ese", "si", "me", "ya", "ver", "porque",
    "dar", "cuando", "muy", "sin", "vez", "mucho", "saber", "sobre", "tambien", "también",
    "hasta", "hay", "donde", "quien", "desde", "nos", "durante", "todos", "uno", "les", "ni",
    "contra", "otros", "fueron", "eso", "había", "sido", "cual", "son", "sus", "esta",
    "estas", "estos", "esas", "esos", "del", "al", "una", "unos", "unas", "los", "las",
];

fn normalize(text: &str) -> String {
    let stripped: String = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn keywords(text: &str) -> HashSet<String> {
    normalize(text)
        .split(' ')
        .filter(|word| word.chars().count() > 2 && !STOPWORDS.contains(word))
        .map(str::to_string)
        .collect()
}

/// Share of expected keywords present in the student answer, 0.0..=1.0.
pub fn keyword_match(expected: &str, student: &str) -> f64 {
    let expected = keywords(expected);
    if expected.is_empty() {
        return 0.0;
    }
    let student = keywords(student);
    let matched = expected.iter().filter(|k| student.contains(*k)).count();
    matched as f64 / expected.len() as f64
}

fn percent(ratio: f64) -> u8 {
    (ratio * 100.0).round().clamp(0.0, 100.0) as u8
}

pub fn grade_answer(expected: &str, student: &str) -> GradingOutcome {
    if normalize(expected) == normalize(student) {
        return GradingOutcome {
            correct: true,
            confidence: 100,
            method: GradingMethod::Exact,
            status: GradingStatus::Graded,
        };
    }

    let overlap = keyword_match(expected, student);
    if overlap >= CORRECT_THRESHOLD {
        GradingOutcome {
            correct: true,
            confidence: percent(overlap),
            method: GradingMethod::Keywords,
            status: GradingStatus::Graded,
        }
    } else if overlap < INCORRECT_THRESHOLD {
        GradingOutcome {
            correct: false,
            confidence: percent(1.0 - overlap),
            method: GradingMethod::Keywords,
            status: GradingStatus::Graded,
        }
    } else {
        GradingOutcome {
            correct: false,
            confidence: 50,
            method: GradingMethod::Keywords,
            status: GradingStatus::ManualReview,
        }
    }
}

/// Grader backed by [`grade_answer`]; never fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordGrader;

#[async_trait]
impl Grader for KeywordGrader {
    async fn evaluate(&self, job: &GradingJob) -> Result<GradingOutcome> {
        Ok(grade_answer(
            &job.request.expected_answer,
            &job.request.student_answer,
        ))
    }
}
