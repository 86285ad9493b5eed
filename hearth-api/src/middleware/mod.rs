pub mod auth;

pub use auth::{admin_auth_middleware, customer_auth_middleware, issue_token, Claims, ROLE_ADMIN, ROLE_CUSTOMER};
