// Middleware for authentication, CORS, rate limiting

pub mod auth;
pub mod cors;
pub mod rate_limiter;

pub use auth::*;
pub use cors::*;
pub use rate_limiter::*;
