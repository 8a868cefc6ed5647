use crate::models::{NewTurn, Turn};
use sqlx::PgPool;
use tracing::Instrument;

pub async fn fetch(pool: &PgPool, id: i32) -> Result<Option<Turn>, sqlx::Error> {
    sqlx::query_as::<_, Turn>(
        r#"
        SELECT id, conversation_id, user_id, sender, body, created_at
        FROM turns WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .instrument(tracing::info_span!("Fetch turn by id.", turn_id = id))
    .await
}

pub async fn insert(pool: &PgPool, turn: &NewTurn) -> Result<Turn, sqlx::Error> {
    let query_span = tracing::info_span!(
        "Saving turn into the database",
        conversation_id = turn.conversation_id,
        sender = %turn.sender,
        body_len = turn.body.len()
    );
    sqlx::query_as::<_, Turn>(
        r#"
        INSERT INTO turns (conversation_id, user_id, sender, body, created_at)
        VALUES ($1, $2, $3, $4, NOW() at time zone 'utc')
        RETURNING id, conversation_id, user_id, sender, body, created_at
        "#,
    )
    .bind(turn.conversation_id)
    .bind(turn.user_id)
    .bind(&turn.sender)
    .bind(&turn.body)
    .fetch_one(pool)
    .instrument(query_span)
    .await
}

/// Replaces the whole body; streamed answers are rewritten on every fragment.
pub async fn update_body(pool: &PgPool, id: i32, body: &str) -> Result<u64, sqlx::Error> {
    let query_span = tracing::info_span!("Updating turn body", turn_id = id, body_len = body.len());
    sqlx::query::<sqlx::Postgres>("UPDATE turns SET body = $2 WHERE id = $1")
        .bind(id)
        .bind(body)
        .execute(pool)
        .instrument(query_span)
        .await
        .map(|result| result.rows_affected())
}

/// A page of turns, newest first. `before_id == 0` means "from the newest";
/// otherwise only turns with a strictly lower id are returned.
pub async fn fetch_page(
    pool: &PgPool,
    conversation_id: i32,
    before_id: i32,
    limit: i64,
) -> Result<Vec<Turn>, sqlx::Error> {
    let query_span = tracing::info_span!(
        "Fetch turns by conversation id.",
        conversation_id,
        before_id,
        limit
    );
    let query = if before_id == 0 {
        sqlx::query_as::<_, Turn>(
            r#"
            SELECT id, conversation_id, user_id, sender, body, created_at
            FROM turns
            WHERE conversation_id = $1
            ORDER BY id DESC
            LIMIT $2
            "#,
        )
        .bind(conversation_id)
        .bind(limit)
    } else {
        sqlx::query_as::<_, Turn>(
            r#"
            SELECT id, conversation_id, user_id, sender, body, created_at
            FROM turns
            WHERE conversation_id = $1 AND id < $3
            ORDER BY id DESC
            LIMIT $2
            "#,
        )
        .bind(conversation_id)
        .bind(limit)
        .bind(before_id)
    };

    query.fetch_all(pool).instrument(query_span).await
}
