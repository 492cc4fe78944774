use super::SessionClaims;
use crate::domain::users::Role;
use uuid::Uuid;

/// Authenticated user context extracted from the session token
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// User ID (from the `sub` claim)
    pub user_id: Uuid,

    pub email: String,

    /// Role recorded in the token. Admin access is re-checked against the database.
    pub role: Role,
}

impl AuthContext {
    pub fn from_claims(claims: &SessionClaims) -> Result<Self, &'static str> {
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| "Invalid user ID in token")?;

        Ok(Self {
            user_id,
            email: claims.email.clone(),
            role: Role::parse(&claims.role),
        })
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(sub: &str, role: &str) -> SessionClaims {
        SessionClaims {
            sub: sub.to_string(),
            email: "ada@example.com".to_string(),
            role: role.to_string(),
            iat: 0,
            exp: 0,
        }
    }

    #[test]
    fn builds_from_claims() {
        let id = Uuid::new_v4();
        let ctx = AuthContext::from_claims(&claims(&id.to_string(), "admin")).unwrap();
        assert_eq!(ctx.user_id, id);
        assert!(ctx.is_admin());

        let ctx = AuthContext::from_claims(&claims(&id.to_string(), "user")).unwrap();
        assert!(!ctx.is_admin());
    }

    #[test]
    fn rejects_malformed_subjects() {
        assert!(AuthContext::from_claims(&claims("not-a-uuid", "user")).is_err());
    }
}
