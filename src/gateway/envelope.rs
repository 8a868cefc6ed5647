use crate::errors::ChatError;
use crate::forms::{UpdatePassword, UpdateUserInfo};
use crate::models::{
    ConversationSummary, Lesson, Test, TopicPlan, TopicPlanDetail, Turn, UserProfile,
    MODEL_SENDER,
};
use crate::services::{Fragment, GradeReport, TestMix};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use serde_valid::Validate;
use std::collections::BTreeMap;

/// Inbound frame as it arrives on the socket.
#[derive(Debug, Deserialize)]
pub struct RawEnvelope {
    pub action: String,
    #[serde(default)]
    pub jwt: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
pub struct StartMessageStream {
    #[serde(default)]
    pub conversation_id: i32,
    #[validate(min_length = 1)]
    #[validate(max_length = 100)]
    pub sender: String,
    #[validate(min_length = 1)]
    #[validate(max_length = 20000)]
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
pub struct GetRecentMessages {
    pub conversation_id: i32,
    /// 0 starts at the newest turn.
    #[serde(default)]
    pub last_message_id: i32,
    #[serde(default)]
    #[validate(minimum = 0)]
    #[validate(maximum = 100)]
    pub limit: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConversationRef {
    pub conversation_id: i32,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
pub struct RenameChat {
    pub conversation_id: i32,
    #[validate(min_length = 1)]
    #[validate(max_length = 200)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
pub struct Prompt {
    #[validate(min_length = 1)]
    #[validate(max_length = 4000)]
    pub prompt: String,
}

fn default_lessons() -> u32 {
    5
}

#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
pub struct GenerateTopicPlan {
    #[validate(min_length = 1)]
    #[validate(max_length = 4000)]
    pub prompt: String,
    #[serde(default = "default_lessons")]
    pub lessons: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LessonRef {
    pub lesson_id: i32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TopicPlanRef {
    pub topic_plan_id: i32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GenerateTest {
    pub lesson_id: i32,
    #[serde(flatten)]
    pub mix: TestMix,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GradeTest {
    pub test_id: i32,
    /// Question index to answer text.
    #[serde(default)]
    pub answers: BTreeMap<usize, String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Password {
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Username {
    pub username: String,
}

/// Every action a client may send, with its payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", content = "data", rename_all = "snake_case")]
pub enum ClientAction {
    StartMessageStream(StartMessageStream),
    GetRecentMessages(GetRecentMessages),
    GetChatSummaries {},
    DeleteChat(ConversationRef),
    RenameChat(RenameChat),

    GenerateQuickResponse(Prompt),
    GenerateTopicPlan(GenerateTopicPlan),
    GenerateLesson(LessonRef),
    GenerateTest(GenerateTest),
    GradeTest(GradeTest),
    GetTopicPlans {},
    GetTopicPlan(TopicPlanRef),
    GetLessons(TopicPlanRef),
    GetTests(LessonRef),

    GetUserInfo {},
    UpdateUserInfo(UpdateUserInfo),
    VerifyUserPass(Password),
    UpdateUserPass(UpdatePassword),
    DeleteUser(Password),
    SearchUser(Username),
}

fn check<T: Validate>(payload: &T) -> Result<(), ChatError> {
    payload
        .validate()
        .map_err(|errors| ChatError::Validation(errors.to_string()))
}

impl ClientAction {
    /// Parses a text frame into its token and action. A missing or null
    /// `data` is read as an empty object.
    pub fn parse(text: &str) -> Result<(String, ClientAction), ChatError> {
        let raw: RawEnvelope = serde_json::from_str(text)
            .map_err(|e| ChatError::Validation(format!("Malformed envelope: {}", e)))?;

        let data = match raw.data {
            Value::Null => json!({}),
            data => data,
        };
        let action: ClientAction =
            serde_json::from_value(json!({"action": raw.action, "data": data})).map_err(|e| {
                ChatError::Validation(format!("Invalid '{}' request: {}", raw.action, e))
            })?;
        action.validate()?;

        Ok((raw.jwt, action))
    }

    fn validate(&self) -> Result<(), ChatError> {
        match self {
            Self::StartMessageStream(payload) => {
                check(payload)?;
                if payload.sender == MODEL_SENDER {
                    return Err(ChatError::Validation(format!(
                        "Sender '{}' is reserved for model answers",
                        MODEL_SENDER
                    )));
                }
                Ok(())
            }
            Self::GetRecentMessages(payload) => check(payload),
            Self::RenameChat(payload) => check(payload),
            Self::GenerateQuickResponse(payload) => check(payload),
            Self::GenerateTopicPlan(payload) => check(payload),
            Self::UpdateUserInfo(payload) => check(payload),
            Self::UpdateUserPass(payload) => check(payload),
            _ => Ok(()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::StartMessageStream(_) => "start_message_stream",
            Self::GetRecentMessages(_) => "get_recent_messages",
            Self::GetChatSummaries {} => "get_chat_summaries",
            Self::DeleteChat(_) => "delete_chat",
            Self::RenameChat(_) => "rename_chat",
            Self::GenerateQuickResponse(_) => "generate_quick_response",
            Self::GenerateTopicPlan(_) => "generate_topic_plan",
            Self::GenerateLesson(_) => "generate_lesson",
            Self::GenerateTest(_) => "generate_test",
            Self::GradeTest(_) => "grade_test",
            Self::GetTopicPlans {} => "get_topic_plans",
            Self::GetTopicPlan(_) => "get_topic_plan",
            Self::GetLessons(_) => "get_lessons",
            Self::GetTests(_) => "get_tests",
            Self::GetUserInfo {} => "get_user_info",
            Self::UpdateUserInfo(_) => "update_user_info",
            Self::VerifyUserPass(_) => "verify_user_pass",
            Self::UpdateUserPass(_) => "update_user_pass",
            Self::DeleteUser(_) => "delete_user",
            Self::SearchUser(_) => "search_user",
        }
    }
}

/// Every frame the server sends, serialized as `{action, data}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    MessageFragment(Fragment),
    /// Terminal frame of a successful stream.
    MessageComplete {
        conversation_id: i32,
        turn_id: i32,
    },
    RecentMessages {
        conversation_id: i32,
        messages: Vec<Turn>,
    },
    ChatSummaries {
        summaries: Vec<ConversationSummary>,
    },
    ChatDeleted {
        conversation_id: i32,
    },
    ChatRenamed(ConversationSummary),

    QuickResponse {
        response: String,
    },
    TopicPlan(TopicPlanDetail),
    Lesson(Lesson),
    Test(Test),
    TestGraded(GradeReport),
    TopicPlans {
        topic_plans: Vec<TopicPlan>,
    },
    Lessons {
        topic_plan_id: i32,
        lessons: Vec<Lesson>,
    },
    Tests {
        lesson_id: i32,
        tests: Vec<Test>,
    },

    UserInfo(UserProfile),
    UserPassVerified {
        valid: bool,
    },
    UserPassUpdated {},
    UserDeleted {},

    /// Sent whenever a request fails; the connection stays open.
    Error {
        kind: String,
        message: String,
    },
}

impl From<&ChatError> for ServerEvent {
    fn from(err: &ChatError) -> Self {
        ServerEvent::Error {
            kind: err.kind().to_string(),
            message: err.public_message(),
        }
    }
}
