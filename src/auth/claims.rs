use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
}

impl Claims {
    pub fn new(user_id: impl Into<String>, lifetime: chrono::Duration) -> Self {
        let now = chrono::Utc::now();
        Self {
            sub: user_id.into(),
            exp: (now + lifetime).timestamp(),
            iat: now.timestamp(),
            iss: None,
            aud: None,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.sub
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_claims_expire_in_future() {
        let claims = Claims::new("user-1", chrono::Duration::days(30));
        assert_eq!(claims.user_id(), "user-1");
        assert!(claims.exp > chrono::Utc::now().timestamp());
        assert!(claims.exp - claims.iat >= 30 * 24 * 3600 - 1);
    }
}
