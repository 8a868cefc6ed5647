use crate::forms::RegisterUser;
use crate::services::UserService;
use actix_web::{post, web, HttpResponse, Result};
use serde_json::json;

/// Creates an account. Token issuance happens elsewhere.
#[tracing::instrument(name = "Register user route.", skip(form, users), fields(username = %form.username))]
#[post("")]
pub async fn register_handler(
    form: web::Json<RegisterUser>,
    users: web::Data<UserService>,
) -> Result<HttpResponse> {
    let profile = users.register(&form).await?;

    Ok(HttpResponse::Created().json(json!({
        "status": "OK",
        "code": 201,
        "item": profile,
    })))
}
