use crate::models::{Conversation, ConversationSummary};
use sqlx::PgPool;
use tracing::Instrument;

pub async fn fetch(pool: &PgPool, id: i32) -> Result<Option<Conversation>, sqlx::Error> {
    let query_span = tracing::info_span!("Fetch conversation by id.", conversation_id = id);
    sqlx::query_as::<_, Conversation>(
        r#"SELECT id, user_id, name, created_at FROM conversations WHERE id = $1"#,
    )
    .bind(id)
    .fetch_optional(pool)
    .instrument(query_span)
    .await
}

pub async fn insert(pool: &PgPool, user_id: i32, name: &str) -> Result<Conversation, sqlx::Error> {
    let query_span = tracing::info_span!("Saving new conversation into the database");
    sqlx::query_as::<_, Conversation>(
        r#"
        INSERT INTO conversations (user_id, name, created_at)
        VALUES ($1, $2, NOW() at time zone 'utc')
        RETURNING id, user_id, name, created_at
        "#,
    )
    .bind(user_id)
    .bind(name)
    .fetch_one(pool)
    .instrument(query_span)
    .await
}

pub async fn rename(pool: &PgPool, id: i32, name: &str) -> Result<Option<Conversation>, sqlx::Error> {
    let query_span = tracing::info_span!("Renaming conversation", conversation_id = id);
    sqlx::query_as::<_, Conversation>(
        r#"
        UPDATE conversations SET name = $2
        WHERE id = $1
        RETURNING id, user_id, name, created_at
        "#,
    )
    .bind(id)
    .bind(name)
    .fetch_optional(pool)
    .instrument(query_span)
    .await
}

/// Summaries of every conversation of a user, newest first.
pub async fn summaries_by_user(
    pool: &PgPool,
    user_id: i32,
) -> Result<Vec<ConversationSummary>, sqlx::Error> {
    let query_span = tracing::info_span!("Fetch conversation summaries by user id.");
    sqlx::query_as::<_, ConversationSummary>(
        r#"SELECT id, name FROM conversations WHERE user_id = $1 ORDER BY id DESC"#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .instrument(query_span)
    .await
}

/// Turns go with the conversation (`ON DELETE CASCADE`).
#[tracing::instrument(name = "Delete conversation of a user.", skip(pool))]
pub async fn delete(pool: &PgPool, id: i32, user_id: i32) -> Result<u64, sqlx::Error> {
    sqlx::query::<sqlx::Postgres>("DELETE FROM conversations WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await
        .map(|result| result.rows_affected())
}

#[tracing::instrument(name = "Delete all conversations of a user.", skip(pool))]
pub async fn delete_by_user(pool: &PgPool, user_id: i32) -> Result<u64, sqlx::Error> {
    sqlx::query::<sqlx::Postgres>("DELETE FROM conversations WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await
        .map(|result| result.rows_affected())
}
