use super::completion::{ChatMessage, CompletionClient};
use crate::errors::ChatError;
use crate::models::{Question, QuestionKind, Test};
use serde::Serialize;
use std::collections::BTreeMap;

pub const CORRECT: &str = "Correct";
pub const INCORRECT: &str = "Incorrect";
pub const UNANSWERED: &str = "Unanswered";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradeReport {
    pub test_id: i32,
    pub score: usize,
    pub total: usize,
    /// Keyed by question index.
    pub feedback: BTreeMap<usize, String>,
    pub passed: bool,
}

/// At least 75% correct, and at least one question.
pub fn is_passing(score: usize, total: usize) -> bool {
    total > 0 && score * 4 >= total * 3
}

/// Grades `answers` (question index to answer text) against the test.
/// Short answers are judged by the completion client; every other kind is
/// compared exactly.
pub async fn grade(
    test: &Test,
    answers: &BTreeMap<usize, String>,
    completion: &dyn CompletionClient,
) -> Result<GradeReport, ChatError> {
    let questions = &test.questions.0;
    let mut feedback = BTreeMap::new();
    let mut score = 0;

    for (index, question) in questions.iter().enumerate() {
        let verdict = match answers.get(&index).filter(|answer| !answer.trim().is_empty()) {
            None => UNANSWERED,
            Some(answer) => {
                if is_correct(question, answer, completion).await? {
                    score += 1;
                    CORRECT
                } else {
                    INCORRECT
                }
            }
        };
        feedback.insert(index, verdict.to_string());
    }

    let total = questions.len();
    Ok(GradeReport {
        test_id: test.id,
        score,
        total,
        feedback,
        passed: is_passing(score, total),
    })
}

async fn is_correct(
    question: &Question,
    answer: &str,
    completion: &dyn CompletionClient,
) -> Result<bool, ChatError> {
    let correct = match &question.kind {
        QuestionKind::MultipleChoice {
            options,
            answer_index,
        } => {
            options.get(*answer_index).map(String::as_str) == Some(answer)
                || answer == answer_index.to_string()
        }
        QuestionKind::FillInTheBlank { answer: expected } => answer == expected.as_str(),
        QuestionKind::MatchOptions { matches } => answer == flatten_matches(matches),
        QuestionKind::ShortAnswer { answer: expected } => {
            judge_short_answer(&question.question_text, expected, answer, completion).await?
        }
    };
    Ok(correct)
}

/// `[("a","b"),("c","d")]` becomes `"a-b,c-d"`.
pub fn flatten_matches(matches: &[(String, String)]) -> String {
    matches
        .iter()
        .map(|(left, right)| format!("{}-{}", left, right))
        .collect::<Vec<_>>()
        .join(",")
}

async fn judge_short_answer(
    question: &str,
    expected: &str,
    answer: &str,
    completion: &dyn CompletionClient,
) -> Result<bool, ChatError> {
    let prompt = format!(
        "Question: {}\nReference answer: {}\nStudent answer: {}\n\
         Is the student's answer correct? Reply with only yes or no.",
        question, expected, answer
    );
    let verdict = completion
        .complete_chat(&[
            ChatMessage::system("You grade short answers on a Bible study test."),
            ChatMessage::user(prompt),
        ])
        .await?;

    Ok(verdict.trim().to_lowercase().starts_with("yes"))
}
