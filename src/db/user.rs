use crate::models::User;
use sqlx::PgPool;
use tracing::Instrument;

pub async fn fetch(pool: &PgPool, id: i32) -> Result<Option<User>, sqlx::Error> {
    let query_span = tracing::info_span!("Fetch user by id.", user_id = id);
    sqlx::query_as::<_, User>(
        r#"SELECT id, username, email, password_hash, created_at FROM users WHERE id = $1"#,
    )
    .bind(id)
    .fetch_optional(pool)
    .instrument(query_span)
    .await
}

pub async fn fetch_by_username(pool: &PgPool, username: &str) -> Result<Option<User>, sqlx::Error> {
    let query_span = tracing::info_span!("Fetch user by username.");
    sqlx::query_as::<_, User>(
        r#"SELECT id, username, email, password_hash, created_at FROM users WHERE username = $1"#,
    )
    .bind(username)
    .fetch_optional(pool)
    .instrument(query_span)
    .await
}

/// Whether another user already holds `username` or `email`.
/// `except_id` excludes the user being updated.
pub async fn identity_taken(
    pool: &PgPool,
    username: &str,
    email: &str,
    except_id: i32,
) -> Result<bool, sqlx::Error> {
    let query_span = tracing::info_span!("Check username/email uniqueness.");
    let row: (bool,) = sqlx::query_as(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM users
            WHERE (username = $1 OR email = $2) AND id <> $3
        )
        "#,
    )
    .bind(username)
    .bind(email)
    .bind(except_id)
    .fetch_one(pool)
    .instrument(query_span)
    .await?;

    Ok(row.0)
}

pub async fn insert(
    pool: &PgPool,
    username: &str,
    email: &str,
    password_hash: &str,
) -> Result<User, sqlx::Error> {
    let query_span = tracing::info_span!("Saving new user into the database");
    sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (username, email, password_hash, created_at)
        VALUES ($1, $2, $3, NOW() at time zone 'utc')
        RETURNING id, username, email, password_hash, created_at
        "#,
    )
    .bind(username)
    .bind(email)
    .bind(password_hash)
    .fetch_one(pool)
    .instrument(query_span)
    .await
}

pub async fn update_profile(
    pool: &PgPool,
    id: i32,
    username: &str,
    email: &str,
) -> Result<Option<User>, sqlx::Error> {
    let query_span = tracing::info_span!("Updating user profile", user_id = id);
    sqlx::query_as::<_, User>(
        r#"
        UPDATE users SET username = $2, email = $3
        WHERE id = $1
        RETURNING id, username, email, password_hash, created_at
        "#,
    )
    .bind(id)
    .bind(username)
    .bind(email)
    .fetch_optional(pool)
    .instrument(query_span)
    .await
}

pub async fn update_password_hash(
    pool: &PgPool,
    id: i32,
    password_hash: &str,
) -> Result<u64, sqlx::Error> {
    let query_span = tracing::info_span!("Updating user password", user_id = id);
    sqlx::query::<sqlx::Postgres>("UPDATE users SET password_hash = $2 WHERE id = $1")
        .bind(id)
        .bind(password_hash)
        .execute(pool)
        .instrument(query_span)
        .await
        .map(|result| result.rows_affected())
}

#[tracing::instrument(name = "Delete user.", skip(pool))]
pub async fn delete(pool: &PgPool, id: i32) -> Result<u64, sqlx::Error> {
    sqlx::query::<sqlx::Postgres>("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .map(|result| result.rows_affected())
}
