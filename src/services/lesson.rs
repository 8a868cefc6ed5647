use super::completion::{CompletionClient, FunctionSpec};
use super::grading::{self, GradeReport};
use crate::db;
use crate::db::topic_plan::LessonOutline;
use crate::errors::ChatError;
use crate::models::{Lesson, Question, QuestionKind, Test, TopicPlan, TopicPlanDetail};
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::PgPool;
use std::collections::BTreeMap;
use std::sync::Arc;

pub const MAX_LESSONS: u32 = 20;
pub const MAX_QUESTIONS_PER_KIND: u32 = 20;

/// Number of questions of each kind for a generated test.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct TestMix {
    #[serde(default)]
    pub multiple_choice: u32,
    #[serde(default)]
    pub fill_in_the_blank: u32,
    #[serde(default)]
    pub short_answer: u32,
    #[serde(default)]
    pub match_options: u32,
}

impl TestMix {
    pub fn total(&self) -> u32 {
        self.multiple_choice
            .saturating_add(self.fill_in_the_blank)
            .saturating_add(self.short_answer)
            .saturating_add(self.match_options)
    }
}

#[derive(Debug, Deserialize)]
struct PlanDraft {
    title: String,
    objective: String,
    #[serde(default)]
    lessons: Vec<LessonDraft>,
}

#[derive(Debug, Deserialize)]
struct LessonDraft {
    title: String,
    objective: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct TestDraft {
    title: String,
    #[serde(default)]
    questions: Vec<QuestionDraft>,
}

/// Loose shape of a generated question; fields depend on `type`.
#[derive(Debug, Deserialize)]
struct QuestionDraft {
    question_text: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    options: Vec<String>,
    #[serde(default)]
    answer: String,
    answer_index: Option<usize>,
    #[serde(default)]
    matches: Vec<Vec<String>>,
}

impl QuestionDraft {
    fn into_question(self) -> Option<Question> {
        let kind = match self.kind.as_str() {
            "multiple_choice" => {
                let answer_index = self
                    .answer_index
                    .or_else(|| self.options.iter().position(|o| *o == self.answer))?;
                if answer_index >= self.options.len() {
                    return None;
                }
                QuestionKind::MultipleChoice {
                    options: self.options,
                    answer_index,
                }
            }
            "fill_in_the_blank" => QuestionKind::FillInTheBlank {
                answer: self.answer,
            },
            "short_answer" => QuestionKind::ShortAnswer {
                answer: self.answer,
            },
            "match_options" => QuestionKind::MatchOptions {
                matches: self
                    .matches
                    .into_iter()
                    .filter_map(|pair| match pair.as_slice() {
                        [left, right] => Some((left.clone(), right.clone())),
                        _ => None,
                    })
                    .collect(),
            },
            _ => return None,
        };

        Some(Question {
            question_text: self.question_text,
            kind,
        })
    }
}

fn parse_draft<T: serde::de::DeserializeOwned>(value: Value, what: &str) -> Result<T, ChatError> {
    serde_json::from_value(value)
        .map_err(|e| ChatError::Upstream(format!("Unexpected {} shape: {}", what, e)))
}

fn topic_plan_function() -> FunctionSpec {
    FunctionSpec {
        name: "generate_topic_plan".to_string(),
        description: "Create a topic plan made of lessons".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "title": {"type": "string"},
                "objective": {"type": "string"},
                "lessons": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "title": {"type": "string"},
                            "objective": {"type": "string"}
                        },
                        "required": ["title", "objective"]
                    }
                }
            },
            "required": ["title", "objective", "lessons"]
        }),
    }
}

fn detailed_lesson_function() -> FunctionSpec {
    FunctionSpec {
        name: "generate_detailed_lesson".to_string(),
        description: "Write the full content of a lesson".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "title": {"type": "string"},
                "objective": {"type": "string"},
                "content": {"type": "string"}
            },
            "required": ["title", "objective", "content"]
        }),
    }
}

fn test_function() -> FunctionSpec {
    FunctionSpec {
        name: "generate_test".to_string(),
        description: "Create a test over the lesson content".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "title": {"type": "string"},
                "questions": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "question_text": {"type": "string"},
                            "type": {
                                "type": "string",
                                "enum": ["multiple_choice", "fill_in_the_blank", "short_answer", "match_options"]
                            },
                            "options": {"type": "array", "items": {"type": "string"}},
                            "answer": {"type": "string"},
                            "answer_index": {"type": "integer"},
                            "matches": {
                                "type": "array",
                                "items": {"type": "array", "items": {"type": "string"}}
                            }
                        },
                        "required": ["question_text", "type"]
                    }
                }
            },
            "required": ["title", "questions"]
        }),
    }
}

/// Topic plans, lessons and tests of a user, generated by the completion
/// client and stored in Postgres.
#[derive(Clone)]
pub struct LessonService {
    pool: PgPool,
    completion: Arc<dyn CompletionClient>,
}

impl LessonService {
    pub fn new(pool: PgPool, completion: Arc<dyn CompletionClient>) -> Self {
        Self { pool, completion }
    }

    pub async fn quick_response(&self, prompt: &str) -> Result<String, ChatError> {
        if prompt.trim().is_empty() {
            return Err(ChatError::Validation("Prompt must not be empty".to_string()));
        }
        self.completion.quick_response(prompt).await
    }

    #[tracing::instrument(name = "Generate topic plan.", skip(self, prompt))]
    pub async fn generate_topic_plan(
        &self,
        user_id: i32,
        prompt: &str,
        lessons: u32,
    ) -> Result<TopicPlanDetail, ChatError> {
        if prompt.trim().is_empty() {
            return Err(ChatError::Validation("Prompt must not be empty".to_string()));
        }
        if lessons == 0 || lessons > MAX_LESSONS {
            return Err(ChatError::Validation(format!(
                "Number of lessons must be between 1 and {}",
                MAX_LESSONS
            )));
        }

        let prompt = format!(
            "Create a topic plan for the following subject with {} lessons: {}",
            lessons, prompt
        );
        let draft: PlanDraft = parse_draft(
            self.completion
                .complete_structured(&prompt, &topic_plan_function())
                .await?,
            "topic plan",
        )?;

        let outlines: Vec<LessonOutline> = draft
            .lessons
            .into_iter()
            .map(|lesson| LessonOutline {
                title: lesson.title,
                objective: lesson.objective,
            })
            .collect();

        let plan = db::topic_plan::insert_with_lessons(
            &self.pool,
            user_id,
            &draft.title,
            &draft.objective,
            "Standard based on prompt",
            &outlines,
        )
        .await?;
        tracing::info!(topic_plan_id = plan.plan.id, lessons = plan.lessons.len(), "topic plan saved");

        Ok(plan)
    }

    async fn owned_plan(&self, user_id: i32, topic_plan_id: i32) -> Result<TopicPlan, ChatError> {
        let plan = db::topic_plan::fetch(&self.pool, topic_plan_id)
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("Topic plan {} not found", topic_plan_id)))?;
        if plan.user_id != user_id {
            return Err(ChatError::Authorization(format!(
                "Topic plan {} does not belong to the user",
                topic_plan_id
            )));
        }
        Ok(plan)
    }

    async fn owned_lesson(&self, user_id: i32, lesson_id: i32) -> Result<Lesson, ChatError> {
        let lesson = db::lesson::fetch(&self.pool, lesson_id)
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("Lesson {} not found", lesson_id)))?;
        self.owned_plan(user_id, lesson.topic_plan_id).await?;
        Ok(lesson)
    }

    /// Fills in the content of an outlined lesson.
    #[tracing::instrument(name = "Generate lesson.", skip(self))]
    pub async fn generate_lesson(&self, user_id: i32, lesson_id: i32) -> Result<Lesson, ChatError> {
        let lesson = self.owned_lesson(user_id, lesson_id).await?;

        let prompt = format!(
            "Create a detailed lesson plan for this lesson: '{}' and this objective: {}",
            lesson.title, lesson.objective
        );
        let draft: LessonDraft = parse_draft(
            self.completion
                .complete_structured(&prompt, &detailed_lesson_function())
                .await?,
            "lesson",
        )?;

        db::lesson::update_content(
            &self.pool,
            lesson.id,
            &draft.title,
            &draft.objective,
            &draft.content,
        )
        .await?
        .ok_or_else(|| ChatError::NotFound(format!("Lesson {} not found", lesson_id)))
    }

    #[tracing::instrument(name = "Generate test.", skip(self))]
    pub async fn generate_test(
        &self,
        user_id: i32,
        lesson_id: i32,
        mix: TestMix,
    ) -> Result<Test, ChatError> {
        let total = mix.total();
        if total == 0 || total > MAX_QUESTIONS_PER_KIND * 4 {
            return Err(ChatError::Validation(format!(
                "A test needs between 1 and {} questions",
                MAX_QUESTIONS_PER_KIND * 4
            )));
        }
        let lesson = self.owned_lesson(user_id, lesson_id).await?;
        if lesson.information.is_empty() {
            return Err(ChatError::Validation(
                "Generate the lesson content before its test".to_string(),
            ));
        }

        let prompt = format!(
            "Create a test with the following number of questions based on the lesson content: \
             {} multiple-choice, {} fill-in-the-blank, {} short answer, and {} match options. \
             Here is the lesson content: {}",
            mix.multiple_choice,
            mix.fill_in_the_blank,
            mix.short_answer,
            mix.match_options,
            lesson.information
        );
        let draft: TestDraft = parse_draft(
            self.completion
                .complete_structured(&prompt, &test_function())
                .await?,
            "test",
        )?;

        let generated = draft.questions.len();
        let questions: Vec<Question> = draft
            .questions
            .into_iter()
            .filter_map(QuestionDraft::into_question)
            .collect();
        if questions.len() < generated {
            tracing::warn!(
                generated,
                kept = questions.len(),
                "dropped malformed generated questions"
            );
        }
        if questions.is_empty() {
            return Err(ChatError::Upstream(
                "Generated test has no usable questions".to_string(),
            ));
        }

        Ok(db::test::insert(&self.pool, lesson.id, &draft.title, &questions).await?)
    }

    /// Grades the answers. A passed test completes its lesson, and the topic
    /// plan once all of its lessons are completed.
    #[tracing::instrument(name = "Grade test.", skip(self, answers))]
    pub async fn grade_test(
        &self,
        user_id: i32,
        test_id: i32,
        answers: &BTreeMap<usize, String>,
    ) -> Result<GradeReport, ChatError> {
        let test = db::test::fetch(&self.pool, test_id)
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("Test {} not found", test_id)))?;
        let lesson = self.owned_lesson(user_id, test.lesson_id).await?;

        let report = grading::grade(&test, answers, self.completion.as_ref()).await?;
        tracing::info!(score = report.score, total = report.total, passed = report.passed, "test graded");

        if report.passed {
            db::test::set_passed(&self.pool, test.id, true).await?;
            db::lesson::set_completed(&self.pool, lesson.id, true).await?;
            if db::lesson::all_completed(&self.pool, lesson.topic_plan_id).await? {
                db::topic_plan::set_completed(&self.pool, lesson.topic_plan_id, true).await?;
                tracing::info!(topic_plan_id = lesson.topic_plan_id, "topic plan completed");
            }
        }

        Ok(report)
    }

    pub async fn topic_plans(&self, user_id: i32) -> Result<Vec<TopicPlan>, ChatError> {
        Ok(db::topic_plan::fetch_by_user(&self.pool, user_id).await?)
    }

    pub async fn topic_plan(
        &self,
        user_id: i32,
        topic_plan_id: i32,
    ) -> Result<TopicPlanDetail, ChatError> {
        let plan = self.owned_plan(user_id, topic_plan_id).await?;
        let lessons = db::lesson::fetch_by_topic_plan(&self.pool, plan.id).await?;
        Ok(TopicPlanDetail { plan, lessons })
    }

    pub async fn lessons(&self, user_id: i32, topic_plan_id: i32) -> Result<Vec<Lesson>, ChatError> {
        self.topic_plan(user_id, topic_plan_id)
            .await
            .map(|detail| detail.lessons)
    }

    pub async fn tests(&self, user_id: i32, lesson_id: i32) -> Result<Vec<Test>, ChatError> {
        let lesson = self.owned_lesson(user_id, lesson_id).await?;
        Ok(db::test::fetch_by_lesson(&self.pool, lesson.id).await?)
    }
}
