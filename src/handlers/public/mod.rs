// handlers/public/mod.rs - endpoints that do not require a token
//
// Route prefix: /auth. These are the only routes reachable without a bearer JWT.
pub mod auth;
