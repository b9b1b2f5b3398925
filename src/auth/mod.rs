mod claims;
mod jwt;
mod password;

pub use claims::Claims;
pub use jwt::{TokenService, TokenVerifier};
pub use password::{hash_password, verify_password};
