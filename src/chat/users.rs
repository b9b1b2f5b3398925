use std::sync::Arc;

use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{hash_password, verify_password, TokenService};
use crate::error::{AppError, Result};

use super::models::{NewUser, User};
use super::store::ChatStore;

const INVALID_CREDENTIALS: &str = "Invalid email or password";

/// Registration input after presence checks
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub first_name: String,
    pub last_name: String,
    #[validate(email(message = "user/email-invalid"))]
    pub email: String,
    #[validate(length(min = 4, message = "user/password-invalid"))]
    pub password: String,
}

impl Registration {
    fn normalize(mut self) -> Self {
        self.first_name = self.first_name.trim().to_string();
        self.last_name = self.last_name.trim().to_string();
        self.email = self.email.trim().to_lowercase();
        self
    }
}

/// Fields are reported in this order when several fail
const VALIDATED_FIELDS: [&str; 2] = ["email", "password"];

/// First failing rule as a client-facing error code
fn validation_message(errors: &validator::ValidationErrors) -> String {
    let field_errors = errors.field_errors();
    VALIDATED_FIELDS
        .iter()
        .filter_map(|field| field_errors.get(*field))
        .flat_map(|errs| errs.iter())
        .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
        .unwrap_or_else(|| "Validation failed".to_string())
}

/// Account registration, sign-in, and lookup
pub struct UserService {
    store: Arc<dyn ChatStore>,
    tokens: Arc<TokenService>,
}

impl UserService {
    pub fn new(store: Arc<dyn ChatStore>, tokens: Arc<TokenService>) -> Self {
        Self { store, tokens }
    }

    pub async fn register(&self, registration: Registration) -> Result<User> {
        let registration = registration.normalize();
        registration
            .validate()
            .map_err(|e| AppError::Validation(validation_message(&e)))?;

        let password_hash = hash_password(&registration.password).await?;

        let user = self
            .store
            .create_user(NewUser {
                first_name: registration.first_name,
                last_name: registration.last_name,
                email: registration.email,
                password_hash,
            })
            .await?;

        tracing::info!(user_id = %user.id, "User registered");

        Ok(user)
    }

    /// Returns a signed access token
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<String> {
        let email = email.trim().to_lowercase();

        let Some(user) = self.store.find_user_by_email(&email).await? else {
            return Err(AppError::Validation(INVALID_CREDENTIALS.to_string()));
        };

        if !verify_password(password, &user.password_hash).await? {
            tracing::debug!(user_id = %user.id, "Password mismatch");
            return Err(AppError::Validation(INVALID_CREDENTIALS.to_string()));
        }

        self.tokens.issue_token(&user.id.to_string())
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.store.find_user(id).await?)
    }
}
