pub mod claims;
pub mod context;
pub mod middleware;
pub mod password;
pub mod session;

pub use claims::SessionClaims;
pub use context::AuthContext;
pub use middleware::{RequireAdmin, RequireAuth};
pub use session::SessionKeys;
