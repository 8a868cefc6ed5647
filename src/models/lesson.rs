use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TopicPlan {
    pub id: i32,
    pub user_id: i32,
    pub title: String,
    pub objective: String,
    pub standard: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Lesson {
    pub id: i32,
    pub topic_plan_id: i32,
    pub title: String,
    pub objective: String,
    pub information: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

/// A topic plan together with its lessons, in creation order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicPlanDetail {
    #[serde(flatten)]
    pub plan: TopicPlan,
    pub lessons: Vec<Lesson>,
}
