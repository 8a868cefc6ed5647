use crate::models::{Lesson, TopicPlan, TopicPlanDetail};
use sqlx::PgPool;
use tracing::Instrument;

/// Lesson outline as produced by plan generation; content is filled in later.
#[derive(Debug, Clone)]
pub struct LessonOutline {
    pub title: String,
    pub objective: String,
}

/// Plan and its lessons are written in one transaction.
pub async fn insert_with_lessons(
    pool: &PgPool,
    user_id: i32,
    title: &str,
    objective: &str,
    standard: &str,
    lessons: &[LessonOutline],
) -> Result<TopicPlanDetail, sqlx::Error> {
    let query_span = tracing::info_span!(
        "Saving topic plan with lessons",
        user_id,
        lessons = lessons.len()
    );

    async move {
        let mut tx = pool.begin().await?;

        let plan = sqlx::query_as::<_, TopicPlan>(
            r#"
            INSERT INTO topic_plans (user_id, title, objective, standard, completed, created_at)
            VALUES ($1, $2, $3, $4, FALSE, NOW() at time zone 'utc')
            RETURNING id, user_id, title, objective, standard, completed, created_at
            "#,
        )
        .bind(user_id)
        .bind(title)
        .bind(objective)
        .bind(standard)
        .fetch_one(&mut *tx)
        .await?;

        let mut saved = Vec::with_capacity(lessons.len());
        for outline in lessons {
            let lesson = sqlx::query_as::<_, Lesson>(
                r#"
                INSERT INTO lessons (topic_plan_id, title, objective, information, completed, created_at)
                VALUES ($1, $2, $3, '', FALSE, NOW() at time zone 'utc')
                RETURNING id, topic_plan_id, title, objective, information, completed, created_at
                "#,
            )
            .bind(plan.id)
            .bind(&outline.title)
            .bind(&outline.objective)
            .fetch_one(&mut *tx)
            .await?;
            saved.push(lesson);
        }

        tx.commit().await?;

        Ok(TopicPlanDetail {
            plan,
            lessons: saved,
        })
    }
    .instrument(query_span)
    .await
}

pub async fn fetch(pool: &PgPool, id: i32) -> Result<Option<TopicPlan>, sqlx::Error> {
    let query_span = tracing::info_span!("Fetch topic plan by id.", topic_plan_id = id);
    sqlx::query_as::<_, TopicPlan>(
        r#"
        SELECT id, user_id, title, objective, standard, completed, created_at
        FROM topic_plans WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .instrument(query_span)
    .await
}

pub async fn fetch_by_user(pool: &PgPool, user_id: i32) -> Result<Vec<TopicPlan>, sqlx::Error> {
    let query_span = tracing::info_span!("Fetch topic plans by user id.", user_id);
    sqlx::query_as::<_, TopicPlan>(
        r#"
        SELECT id, user_id, title, objective, standard, completed, created_at
        FROM topic_plans WHERE user_id = $1
        ORDER BY id DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .instrument(query_span)
    .await
}

pub async fn set_completed(pool: &PgPool, id: i32, completed: bool) -> Result<u64, sqlx::Error> {
    let query_span = tracing::info_span!("Updating topic plan completion", topic_plan_id = id);
    sqlx::query::<sqlx::Postgres>("UPDATE topic_plans SET completed = $2 WHERE id = $1")
        .bind(id)
        .bind(completed)
        .execute(pool)
        .instrument(query_span)
        .await
        .map(|result| result.rows_affected())
}
