mod conversation;
mod lesson;
mod turn;
mod user;

pub use conversation::*;
pub use lesson::*;
pub use test::{Question, QuestionKind, Test};
pub use turn::*;
pub use user::*;
