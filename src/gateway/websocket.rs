use super::dispatch::{Dispatcher, EventSink};
use super::envelope::ServerEvent;
use crate::errors::ChatError;
use actix::{Actor, ActorContext, Addr, AsyncContext, StreamHandler};
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// WebSocket heartbeat interval
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
/// Client timeout - close connection if no heartbeat received
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

/// One client connection. Each text frame is dispatched on its own task so
/// a long relay never blocks the socket.
pub struct ChatSocket {
    user_id: i32,
    dispatcher: Arc<Dispatcher>,
    hb: Instant,
}

impl ChatSocket {
    pub fn new(user_id: i32, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            user_id,
            dispatcher,
            hb: Instant::now(),
        }
    }

    fn hb(&self, ctx: &mut <Self as Actor>::Context) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                tracing::warn!(user_id = act.user_id, "client heartbeat failed, disconnecting");
                ctx.stop();
                return;
            }

            ctx.ping(b"");
        });
    }
}

impl Actor for ChatSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(user_id = self.user_id, "WebSocket connection started");
        self.hb(ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        tracing::info!(user_id = self.user_id, "WebSocket connection closed");
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for ChatSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                tracing::debug!(len = text.len(), "received frame");

                let user_id = self.user_id;
                let dispatcher = self.dispatcher.clone();
                let addr = ctx.address();
                actix::spawn(async move {
                    dispatcher.dispatch(user_id, &text, &addr).await;
                });
            }
            Ok(ws::Message::Binary(_)) => {
                tracing::warn!("Binary frames are not supported");
                let err = ChatError::Validation("Binary frames are not supported".to_string());
                EventSink::send(&ctx.address(), ServerEvent::from(&err));
            }
            Ok(ws::Message::Close(reason)) => {
                tracing::info!("WebSocket close received: {:?}", reason);
                ctx.close(reason);
                ctx.stop();
            }
            Err(err) => {
                tracing::warn!("WebSocket protocol error: {}", err);
                ctx.stop();
            }
            _ => {}
        }
    }
}

/// Message to write an outbound event to the client
#[derive(actix::Message)]
#[rtype(result = "()")]
struct SendEvent(ServerEvent);

impl actix::Handler<SendEvent> for ChatSocket {
    type Result = ();

    fn handle(&mut self, msg: SendEvent, ctx: &mut Self::Context) {
        match serde_json::to_string(&msg.0) {
            Ok(text) => ctx.text(text),
            Err(err) => tracing::error!("Failed to serialize outbound event: {}", err),
        }
    }
}

impl EventSink for Addr<ChatSocket> {
    fn send(&self, event: ServerEvent) {
        self.do_send(SendEvent(event));
    }
}

#[derive(Debug, Deserialize)]
pub struct SocketQuery {
    pub token: Option<String>,
}

/// Upgrades the request once its `token` query parameter verifies.
#[tracing::instrument(name = "Chat WebSocket connection", skip(req, stream, query, dispatcher))]
pub async fn chat_websocket(
    req: HttpRequest,
    stream: web::Payload,
    query: web::Query<SocketQuery>,
    dispatcher: web::Data<Dispatcher>,
) -> Result<HttpResponse, Error> {
    let token = query
        .token
        .as_deref()
        .ok_or_else(|| ChatError::Unauthenticated("Missing token".to_string()))?;
    let claims = dispatcher.verifier().verify(token)?;
    tracing::info!(user_id = claims.user_id, "new WebSocket connection");

    ws::start(
        ChatSocket::new(claims.user_id, dispatcher.into_inner()),
        &req,
        stream,
    )
}
