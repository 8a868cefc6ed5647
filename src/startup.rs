use crate::configuration::Settings;
use crate::gateway::{self, Dispatcher};
use crate::middleware::JwtVerifier;
use crate::routes;
use crate::services::{
    ChatService, CompletionClient, LessonService, OpenAiClient, PgChatStore, UserService,
};
use actix_cors::Cors;
use actix_web::{dev::Server, error, http, web, App, HttpServer};
use sqlx::{Pool, Postgres};
use std::net::TcpListener;
use std::sync::Arc;
use tracing_actix_web::TracingLogger;

pub async fn run(
    listener: TcpListener,
    pg_pool: Pool<Postgres>,
    settings: Settings,
) -> Result<Server, std::io::Error> {
    let completion = OpenAiClient::from_settings(&settings.openai)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err.to_string()))?;
    let completion: Arc<dyn CompletionClient> = Arc::new(completion);
    tracing::info!(provider = completion.name(), "completion client ready");

    run_with_completion(listener, pg_pool, settings, completion)
}

/// Same as [`run`] with the completion client supplied by the caller.
pub fn run_with_completion(
    listener: TcpListener,
    pg_pool: Pool<Postgres>,
    settings: Settings,
    completion: Arc<dyn CompletionClient>,
) -> Result<Server, std::io::Error> {
    let store = Arc::new(PgChatStore::new(pg_pool.clone()));
    let chat = ChatService::new(store, completion.clone(), &settings.relay);
    let lessons = LessonService::new(pg_pool.clone(), completion);
    let users = UserService::new(pg_pool, chat.clone());

    let dispatcher = web::Data::new(Dispatcher::new(
        chat,
        lessons,
        users.clone(),
        JwtVerifier::new(&settings.auth.access_secret),
    ));
    let users = web::Data::new(users);

    let json_config = web::JsonConfig::default().error_handler(|err, _req| {
        let msg: String = match err {
            error::JsonPayloadError::Deserialize(err) => format!(
                "{{\"kind\":\"deserialize\",\"line\":{}, \"column\":{}, \"msg\":\"{}\"}}",
                err.line(),
                err.column(),
                err
            ),
            _ => format!("{{\"kind\":\"other\",\"msg\":\"{}\"}}", err),
        };
        error::InternalError::new(msg, http::StatusCode::BAD_REQUEST).into()
    });

    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .wrap(Cors::permissive())
            .service(web::scope("/health_check").service(routes::health_check))
            .service(web::scope("/user").service(routes::user::register_handler))
            .service(web::resource("/ws").route(web::get().to(gateway::chat_websocket)))
            .app_data(json_config.clone())
            .app_data(dispatcher.clone())
            .app_data(users.clone())
    })
    .listen(listener)?
    .run();

    Ok(server)
}
