use super::envelope::{ClientAction, ServerEvent, StartMessageStream};
use crate::errors::ChatError;
use crate::middleware::JwtVerifier;
use crate::services::{ChatService, LessonService, RelayEvent, RelayRequest, UserService};
use futures::StreamExt;

/// Where the dispatcher writes outbound frames.
pub trait EventSink: Send + Sync {
    fn send(&self, event: ServerEvent);
}

/// Routes parsed envelopes to the chat, lesson and user services.
pub struct Dispatcher {
    chat: ChatService,
    lessons: LessonService,
    users: UserService,
    verifier: JwtVerifier,
}

impl Dispatcher {
    pub fn new(
        chat: ChatService,
        lessons: LessonService,
        users: UserService,
        verifier: JwtVerifier,
    ) -> Self {
        Self {
            chat,
            lessons,
            users,
            verifier,
        }
    }

    pub fn verifier(&self) -> &JwtVerifier {
        &self.verifier
    }

    /// Handles one text frame from the connection of `user_id`. Every
    /// failure is reported to the sink as an `error` event.
    #[tracing::instrument(name = "Dispatch envelope.", skip(self, text, sink))]
    pub async fn dispatch(&self, user_id: i32, text: &str, sink: &dyn EventSink) {
        if let Err(err) = self.try_dispatch(user_id, text, sink).await {
            match &err {
                ChatError::Persistence(db) => tracing::error!("request failed: {:?}", db),
                other => tracing::warn!(kind = other.kind(), "request failed: {}", other),
            }
            sink.send(ServerEvent::from(&err));
        }
    }

    async fn try_dispatch(
        &self,
        user_id: i32,
        text: &str,
        sink: &dyn EventSink,
    ) -> Result<(), ChatError> {
        let (jwt, action) = ClientAction::parse(text)?;
        self.authenticate(user_id, &jwt)?;
        tracing::info!(action = action.name(), "dispatching");

        let event = match action {
            ClientAction::StartMessageStream(request) => {
                return self.stream(user_id, request, sink).await;
            }
            ClientAction::GetRecentMessages(page) => {
                self.chat.ensure_owner(page.conversation_id, user_id).await?;
                let messages = self
                    .chat
                    .get_recent_messages(page.conversation_id, page.last_message_id, page.limit)
                    .await?;
                ServerEvent::RecentMessages {
                    conversation_id: page.conversation_id,
                    messages,
                }
            }
            ClientAction::GetChatSummaries {} => ServerEvent::ChatSummaries {
                summaries: self.chat.get_conversation_summaries(user_id).await?,
            },
            ClientAction::DeleteChat(chat) => {
                self.chat
                    .delete_conversation(chat.conversation_id, user_id)
                    .await?;
                ServerEvent::ChatDeleted {
                    conversation_id: chat.conversation_id,
                }
            }
            ClientAction::RenameChat(rename) => ServerEvent::ChatRenamed(
                self.chat
                    .rename_conversation(rename.conversation_id, user_id, &rename.name)
                    .await?,
            ),

            ClientAction::GenerateQuickResponse(prompt) => ServerEvent::QuickResponse {
                response: self.lessons.quick_response(&prompt.prompt).await?,
            },
            ClientAction::GenerateTopicPlan(plan) => ServerEvent::TopicPlan(
                self.lessons
                    .generate_topic_plan(user_id, &plan.prompt, plan.lessons)
                    .await?,
            ),
            ClientAction::GenerateLesson(lesson) => ServerEvent::Lesson(
                self.lessons
                    .generate_lesson(user_id, lesson.lesson_id)
                    .await?,
            ),
            ClientAction::GenerateTest(test) => ServerEvent::Test(
                self.lessons
                    .generate_test(user_id, test.lesson_id, test.mix)
                    .await?,
            ),
            ClientAction::GradeTest(grade) => ServerEvent::TestGraded(
                self.lessons
                    .grade_test(user_id, grade.test_id, &grade.answers)
                    .await?,
            ),
            ClientAction::GetTopicPlans {} => ServerEvent::TopicPlans {
                topic_plans: self.lessons.topic_plans(user_id).await?,
            },
            ClientAction::GetTopicPlan(plan) => ServerEvent::TopicPlan(
                self.lessons.topic_plan(user_id, plan.topic_plan_id).await?,
            ),
            ClientAction::GetLessons(plan) => ServerEvent::Lessons {
                topic_plan_id: plan.topic_plan_id,
                lessons: self.lessons.lessons(user_id, plan.topic_plan_id).await?,
            },
            ClientAction::GetTests(lesson) => ServerEvent::Tests {
                lesson_id: lesson.lesson_id,
                tests: self.lessons.tests(user_id, lesson.lesson_id).await?,
            },

            ClientAction::GetUserInfo {} => ServerEvent::UserInfo(self.users.get(user_id).await?),
            ClientAction::UpdateUserInfo(form) => {
                ServerEvent::UserInfo(self.users.update_info(user_id, &form).await?)
            }
            ClientAction::VerifyUserPass(check) => {
                let valid = match self.users.verify_password(user_id, &check.password).await {
                    Ok(()) => true,
                    Err(ChatError::Unauthenticated(_)) => false,
                    Err(err) => return Err(err),
                };
                ServerEvent::UserPassVerified { valid }
            }
            ClientAction::UpdateUserPass(form) => {
                self.users.update_password(user_id, &form).await?;
                ServerEvent::UserPassUpdated {}
            }
            ClientAction::DeleteUser(check) => {
                self.users.delete(user_id, &check.password).await?;
                ServerEvent::UserDeleted {}
            }
            ClientAction::SearchUser(search) => {
                ServerEvent::UserInfo(self.users.find_by_username(&search.username).await?)
            }
        };

        sink.send(event);
        Ok(())
    }

    /// The envelope token must be valid and name the connection's user.
    fn authenticate(&self, user_id: i32, jwt: &str) -> Result<(), ChatError> {
        let claims = self.verifier.verify(jwt)?;
        if claims.user_id != user_id {
            return Err(ChatError::Authorization(
                "Token does not match the connection user".to_string(),
            ));
        }
        Ok(())
    }

    async fn stream(
        &self,
        user_id: i32,
        request: StartMessageStream,
        sink: &dyn EventSink,
    ) -> Result<(), ChatError> {
        if request.conversation_id != 0 {
            self.chat
                .ensure_owner(request.conversation_id, user_id)
                .await?;
        }

        let mut events = self.chat.stream_messages(RelayRequest {
            conversation_id: request.conversation_id,
            sender: request.sender,
            body: request.body,
            user_id,
        });

        while let Some(event) = events.next().await {
            match event? {
                RelayEvent::Fragment(fragment) => sink.send(ServerEvent::MessageFragment(fragment)),
                RelayEvent::Complete(outcome) => sink.send(ServerEvent::MessageComplete {
                    conversation_id: outcome.conversation_id,
                    turn_id: outcome.turn_id,
                }),
            }
        }
        Ok(())
    }
}
