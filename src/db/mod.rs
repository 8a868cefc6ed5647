//! Postgres adapters. Every function takes the pool explicitly and returns
//! the raw `sqlx::Error`; translation happens in `services`.

pub mod conversation;
pub mod lesson;
pub mod topic_plan;
pub mod turn;
pub mod user;
