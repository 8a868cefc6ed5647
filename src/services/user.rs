use super::chat::ChatService;
use super::password::{hash_password, verify_password};
use crate::db;
use crate::errors::ChatError;
use crate::forms::{RegisterUser, UpdatePassword, UpdateUserInfo};
use crate::models::{User, UserProfile};
use serde_valid::Validate;
use sqlx::PgPool;

#[derive(Clone)]
pub struct UserService {
    pool: PgPool,
    chat: ChatService,
}

fn validate<T: Validate>(form: &T) -> Result<(), ChatError> {
    form.validate()
        .map_err(|errors| ChatError::Validation(errors.to_string()))
}

impl UserService {
    pub fn new(pool: PgPool, chat: ChatService) -> Self {
        Self { pool, chat }
    }

    async fn fetch(&self, user_id: i32) -> Result<User, ChatError> {
        db::user::fetch(&self.pool, user_id)
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("User {} not found", user_id)))
    }

    async fn ensure_available(
        &self,
        username: &str,
        email: &str,
        except_id: i32,
    ) -> Result<(), ChatError> {
        if db::user::identity_taken(&self.pool, username, email, except_id).await? {
            return Err(ChatError::Validation(
                "Username or email already in use".to_string(),
            ));
        }
        Ok(())
    }

    fn check_password(&self, user: &User, password: &str) -> Result<(), ChatError> {
        if !verify_password(password, &user.password_hash) {
            tracing::warn!(user_id = user.id, "password mismatch");
            return Err(ChatError::Unauthenticated("Invalid password".to_string()));
        }
        Ok(())
    }

    #[tracing::instrument(name = "Register user.", skip(self, form), fields(username = %form.username))]
    pub async fn register(&self, form: &RegisterUser) -> Result<UserProfile, ChatError> {
        validate(form)?;
        self.ensure_available(&form.username, &form.email, 0).await?;

        let password_hash = hash_password(&form.password)?;
        let user = db::user::insert(&self.pool, &form.username, &form.email, &password_hash).await?;
        tracing::info!(user_id = user.id, "user registered");

        Ok(user.into())
    }

    pub async fn get(&self, user_id: i32) -> Result<UserProfile, ChatError> {
        self.fetch(user_id).await.map(UserProfile::from)
    }

    pub async fn find_by_username(&self, username: &str) -> Result<UserProfile, ChatError> {
        db::user::fetch_by_username(&self.pool, username)
            .await?
            .map(UserProfile::from)
            .ok_or_else(|| ChatError::NotFound(format!("User {} not found", username)))
    }

    #[tracing::instrument(name = "Update user info.", skip(self, form))]
    pub async fn update_info(
        &self,
        user_id: i32,
        form: &UpdateUserInfo,
    ) -> Result<UserProfile, ChatError> {
        validate(form)?;
        self.ensure_available(&form.username, &form.email, user_id)
            .await?;

        db::user::update_profile(&self.pool, user_id, &form.username, &form.email)
            .await?
            .map(UserProfile::from)
            .ok_or_else(|| ChatError::NotFound(format!("User {} not found", user_id)))
    }

    pub async fn verify_password(&self, user_id: i32, password: &str) -> Result<(), ChatError> {
        let user = self.fetch(user_id).await?;
        self.check_password(&user, password)
    }

    /// The old password must match before the new hash is stored.
    #[tracing::instrument(name = "Update user password.", skip(self, form))]
    pub async fn update_password(
        &self,
        user_id: i32,
        form: &UpdatePassword,
    ) -> Result<(), ChatError> {
        validate(form)?;
        let user = self.fetch(user_id).await?;
        self.check_password(&user, &form.old_password)?;

        let password_hash = hash_password(&form.password)?;
        db::user::update_password_hash(&self.pool, user_id, &password_hash).await?;
        Ok(())
    }

    /// Removes the user and every conversation they own.
    #[tracing::instrument(name = "Delete user.", skip(self, password))]
    pub async fn delete(&self, user_id: i32, password: &str) -> Result<(), ChatError> {
        let user = self.fetch(user_id).await?;
        self.check_password(&user, password)?;

        let removed = self.chat.delete_all_conversations(user_id).await?;
        db::user::delete(&self.pool, user_id).await?;
        tracing::info!(user_id, conversations = removed, "user deleted");
        Ok(())
    }
}
