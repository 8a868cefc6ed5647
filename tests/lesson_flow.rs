mod common;

use bibledive::errors::ChatError;
use bibledive::services::{ChatMessage, CompletionClient, FragmentStream, FunctionSpec};
use common::{next_event, send_action};
use serde_json::{json, Value};
use std::sync::Arc;

/// Answers every structured call by function name.
struct StudyGuide;

#[async_trait::async_trait]
impl CompletionClient for StudyGuide {
    fn name(&self) -> &str {
        "study-guide"
    }

    async fn quick_response(&self, prompt: &str) -> Result<String, ChatError> {
        Ok(format!("Overview: {}", prompt))
    }

    async fn complete_chat(&self, _messages: &[ChatMessage]) -> Result<String, ChatError> {
        Ok("yes".to_string())
    }

    async fn stream_chat(&self, _messages: Vec<ChatMessage>) -> Result<FragmentStream, ChatError> {
        Err(ChatError::Upstream("not used".to_string()))
    }

    async fn complete_structured(
        &self,
        _prompt: &str,
        function: &FunctionSpec,
    ) -> Result<Value, ChatError> {
        let value = match function.name.as_str() {
            "generate_topic_plan" => json!({
                "title": "Creation",
                "objective": "Understand Genesis 1",
                "lessons": [
                    {"title": "The first day", "objective": "Light and darkness"}
                ]
            }),
            "generate_detailed_lesson" => json!({
                "title": "The first day",
                "objective": "Light and darkness",
                "content": "God said, Let there be light."
            }),
            "generate_test" => json!({
                "title": "Day one quiz",
                "questions": [
                    {
                        "question_text": "What was created first?",
                        "type": "multiple_choice",
                        "options": ["Water", "Light", "Land"],
                        "answer_index": 1
                    }
                ]
            }),
            other => return Err(ChatError::Upstream(format!("unknown function {}", other))),
        };
        Ok(value)
    }
}

#[tokio::test]
async fn plan_lesson_test_and_grade() {
    let app = match common::spawn_app_with_completion(Arc::new(StudyGuide)).await {
        Some(app) => app,
        None => return,
    };
    let jwt = app.token(3);
    let mut socket = app.connect(3).await;

    send_action(&mut socket, &jwt, "generate_quick_response", json!({"prompt": "Genesis"})).await;
    let event = next_event(&mut socket).await;
    assert_eq!(event["data"]["response"], "Overview: Genesis");

    send_action(
        &mut socket,
        &jwt,
        "generate_topic_plan",
        json!({"prompt": "Creation", "lessons": 1}),
    )
    .await;
    let plan = next_event(&mut socket).await;
    assert_eq!(plan["action"], "topic_plan");
    assert_eq!(plan["data"]["standard"], "Standard based on prompt");
    let plan_id = plan["data"]["id"].clone();
    let lesson_id = plan["data"]["lessons"][0]["id"].clone();

    send_action(&mut socket, &jwt, "generate_test", json!({"lesson_id": lesson_id, "multiple_choice": 1})).await;
    let event = next_event(&mut socket).await;
    assert_eq!(event["data"]["kind"], "validation");

    send_action(&mut socket, &jwt, "generate_lesson", json!({"lesson_id": lesson_id})).await;
    let lesson = next_event(&mut socket).await;
    assert_eq!(lesson["data"]["information"], "God said, Let there be light.");

    send_action(&mut socket, &jwt, "generate_test", json!({"lesson_id": lesson_id, "multiple_choice": 1})).await;
    let test = next_event(&mut socket).await;
    assert_eq!(test["action"], "test");
    let test_id = test["data"]["id"].clone();

    let intruder = app.token(4);
    let mut other = app.connect(4).await;
    send_action(&mut other, &intruder, "grade_test", json!({"test_id": test_id, "answers": {"0": "Light"}})).await;
    assert_eq!(next_event(&mut other).await["data"]["kind"], "authorization");

    send_action(&mut socket, &jwt, "grade_test", json!({"test_id": test_id, "answers": {"0": "Light"}})).await;
    let report = next_event(&mut socket).await;
    assert_eq!(report["action"], "test_graded");
    assert_eq!(report["data"]["score"], 1);
    assert_eq!(report["data"]["feedback"]["0"], "Correct");
    assert_eq!(report["data"]["passed"], true);

    send_action(&mut socket, &jwt, "get_topic_plans", json!({})).await;
    let plans = next_event(&mut socket).await;
    assert_eq!(plans["data"]["topic_plans"][0]["id"], plan_id);
    assert_eq!(plans["data"]["topic_plans"][0]["completed"], true);

    send_action(&mut socket, &jwt, "get_tests", json!({"lesson_id": lesson_id})).await;
    let tests = next_event(&mut socket).await;
    assert_eq!(tests["data"]["tests"][0]["passed"], true);
}
