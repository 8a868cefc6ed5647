//! WebSocket transport: envelope parsing, per-action dispatch and the
//! connection actor.
pub mod dispatch;
pub mod envelope;
pub mod websocket;

pub use dispatch::{Dispatcher, EventSink};
pub use envelope::{ClientAction, ServerEvent};
pub use websocket::chat_websocket;
