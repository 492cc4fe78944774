use serde::{Deserialize, Serialize};

/// Claims carried by the session token
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    /// Subject (user ID)
    pub sub: String,

    /// User email
    pub email: String,

    /// `user` or `admin` at the time the session was issued
    pub role: String,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration (Unix timestamp)
    pub exp: i64,
}
