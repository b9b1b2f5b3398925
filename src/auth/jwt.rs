use async_trait::async_trait;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};

use crate::config::JwtConfig;
use crate::error::AppError;

use super::Claims;

/// Resolves a bearer token to the user id it was issued for.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify_token(&self, token: &str) -> Result<String, AppError>;
}

pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: Option<String>,
    audience: Option<String>,
    lifetime: chrono::Duration,
}

impl TokenService {
    pub fn new(config: &JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        let mut validation = Validation::default();
        let mut required = vec!["exp", "sub"];

        if let Some(ref issuer) = config.issuer {
            validation.set_issuer(&[issuer]);
            required.push("iss");
        }

        if let Some(ref audience) = config.audience {
            validation.set_audience(&[audience]);
            required.push("aud");
        }

        validation.set_required_spec_claims(&required);

        Self {
            encoding_key,
            decoding_key,
            validation,
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            lifetime: chrono::Duration::days(config.expiration_days),
        }
    }

    /// Sign a token for the given user
    pub fn issue_token(&self, user_id: &str) -> Result<String, AppError> {
        let mut claims = Claims::new(user_id, self.lifetime);
        claims.iss = self.issuer.clone();
        claims.aud = self.audience.clone();

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Failed to sign token: {}", e)))
    }

    pub fn validate(&self, token: &str) -> Result<Claims, AppError> {
        let token_data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| AppError::Auth(format!("Invalid token: {}", e)))?;

        if token_data.claims.sub.is_empty() {
            return Err(AppError::Auth("Invalid token: missing subject".to_string()));
        }

        Ok(token_data.claims)
    }
}

#[async_trait]
impl TokenVerifier for TokenService {
    async fn verify_token(&self, token: &str) -> Result<String, AppError> {
        self.validate(token).map(|claims| claims.sub)
    }
}
