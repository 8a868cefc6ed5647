use serde::{Deserialize, Serialize};
use serde_valid::Validate;

#[derive(Serialize, Deserialize, Debug, Clone, Validate)]
pub struct RegisterUser {
    #[validate(min_length = 3)]
    #[validate(max_length = 50)]
    pub username: String,
    #[validate(pattern = r"^[^@\s]+@[^@\s]+\.[^@\s]+$")]
    #[validate(max_length = 255)]
    pub email: String,
    #[validate(min_length = 8)]
    #[validate(max_length = 128)]
    pub password: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Validate)]
pub struct UpdateUserInfo {
    #[validate(min_length = 3)]
    #[validate(max_length = 50)]
    pub username: String,
    #[validate(pattern = r"^[^@\s]+@[^@\s]+\.[^@\s]+$")]
    #[validate(max_length = 255)]
    pub email: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Validate)]
pub struct UpdatePassword {
    pub old_password: String,
    #[validate(min_length = 8)]
    #[validate(max_length = 128)]
    pub password: String,
}
