use crate::models::Lesson;
use sqlx::PgPool;
use tracing::Instrument;

pub async fn fetch(pool: &PgPool, id: i32) -> Result<Option<Lesson>, sqlx::Error> {
    let query_span = tracing::info_span!("Fetch lesson by id.", lesson_id = id);
    sqlx::query_as::<_, Lesson>(
        r#"
        SELECT id, topic_plan_id, title, objective, information, completed, created_at
        FROM lessons WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .instrument(query_span)
    .await
}

/// Lessons of a plan in creation order.
pub async fn fetch_by_topic_plan(
    pool: &PgPool,
    topic_plan_id: i32,
) -> Result<Vec<Lesson>, sqlx::Error> {
    let query_span = tracing::info_span!("Fetch lessons by topic plan id.", topic_plan_id);
    sqlx::query_as::<_, Lesson>(
        r#"
        SELECT id, topic_plan_id, title, objective, information, completed, created_at
        FROM lessons WHERE topic_plan_id = $1
        ORDER BY id ASC
        "#,
    )
    .bind(topic_plan_id)
    .fetch_all(pool)
    .instrument(query_span)
    .await
}

pub async fn update_content(
    pool: &PgPool,
    id: i32,
    title: &str,
    objective: &str,
    information: &str,
) -> Result<Option<Lesson>, sqlx::Error> {
    let query_span = tracing::info_span!("Updating lesson content", lesson_id = id);
    sqlx::query_as::<_, Lesson>(
        r#"
        UPDATE lessons SET title = $2, objective = $3, information = $4
        WHERE id = $1
        RETURNING id, topic_plan_id, title, objective, information, completed, created_at
        "#,
    )
    .bind(id)
    .bind(title)
    .bind(objective)
    .bind(information)
    .fetch_optional(pool)
    .instrument(query_span)
    .await
}

pub async fn set_completed(pool: &PgPool, id: i32, completed: bool) -> Result<u64, sqlx::Error> {
    let query_span = tracing::info_span!("Updating lesson completion", lesson_id = id);
    sqlx::query::<sqlx::Postgres>("UPDATE lessons SET completed = $2 WHERE id = $1")
        .bind(id)
        .bind(completed)
        .execute(pool)
        .instrument(query_span)
        .await
        .map(|result| result.rows_affected())
}

/// True when the plan has lessons and every one of them is completed.
pub async fn all_completed(pool: &PgPool, topic_plan_id: i32) -> Result<bool, sqlx::Error> {
    let query_span = tracing::info_span!("Check lessons completion", topic_plan_id);
    let row: (i64, i64) = sqlx::query_as(
        r#"
        SELECT COUNT(*), COUNT(*) FILTER (WHERE completed)
        FROM lessons WHERE topic_plan_id = $1
        "#,
    )
    .bind(topic_plan_id)
    .fetch_one(pool)
    .instrument(query_span)
    .await?;

    Ok(row.0 > 0 && row.0 == row.1)
}
