use crate::errors::ChatError;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Claims {
    pub user_id: i32,
    pub exp: i64,
}

/// HS256 access token verification with a shared secret.
#[derive(Clone)]
pub struct JwtVerifier {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtVerifier").finish_non_exhaustive()
    }
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Checks signature and expiration, returning the claims.
    /// A leading `Bearer ` is tolerated.
    pub fn verify(&self, token: &str) -> Result<Claims, ChatError> {
        let token = extract_bearer_token(token);

        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => {
                    ChatError::Unauthenticated("JWT token expired".to_string())
                }
                ErrorKind::InvalidSignature => {
                    ChatError::Unauthenticated("Invalid JWT signature".to_string())
                }
                ErrorKind::InvalidAlgorithm => {
                    ChatError::Unauthenticated("Unexpected signing method".to_string())
                }
                _ => ChatError::Unauthenticated(format!("Invalid JWT: {}", err)),
            })
    }

    /// Issues a token for `user_id` valid for `ttl_secs`. Token issuance is
    /// owned by the user service; this is used by tooling and tests.
    pub fn sign(&self, user_id: i32, ttl_secs: i64) -> Result<String, ChatError> {
        let claims = Claims {
            user_id,
            exp: chrono::Utc::now().timestamp() + ttl_secs,
        };
        self.sign_claims(&claims)
    }

    pub fn sign_claims(&self, claims: &Claims) -> Result<String, ChatError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding).map_err(|err| {
            tracing::error!("error signing token {err:?}");
            ChatError::Validation(format!("Failed to sign claims: {}", err))
        })
    }
}

pub fn extract_bearer_token(value: &str) -> &str {
    let value = value.trim();
    value.strip_prefix("Bearer ").unwrap_or(value).trim()
}
