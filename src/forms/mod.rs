pub mod user;

pub use user::{RegisterUser, UpdatePassword, UpdateUserInfo};
