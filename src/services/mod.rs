pub mod chat;
pub mod completion;
pub mod conversation;
pub mod grading;
pub mod lesson;
#[cfg(test)]
pub mod mock;
pub mod password;
pub mod relay;
pub mod store;
pub mod turn;
pub mod turn_writer;
pub mod user;

pub use chat::{ChatService, RelayEvent, RelayStream};
pub use completion::{ChatMessage, CompletionClient, FragmentStream, FunctionSpec, OpenAiClient};
pub use conversation::ConversationService;
pub use grading::GradeReport;
pub use lesson::{LessonService, TestMix};
pub use relay::{Fragment, FragmentSink, Relay, RelayOutcome, RelayRequest};
pub use store::{ChatStore, PgChatStore};
pub use turn::TurnService;
pub use user::UserService;
