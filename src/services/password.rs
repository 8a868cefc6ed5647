use crate::errors::ChatError;

/// bcrypt hash at the library's default cost.
pub fn hash_password(password: &str) -> Result<String, ChatError> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST).map_err(|err| {
        tracing::error!("error hashing password {err:?}");
        ChatError::Validation("Password could not be hashed".to_string())
    })
}

/// Malformed hashes never verify.
pub fn verify_password(password: &str, stored: &str) -> bool {
    match bcrypt::verify(password, stored) {
        Ok(valid) => valid,
        Err(err) => {
            tracing::warn!("stored password hash rejected: {}", err);
            false
        }
    }
}
