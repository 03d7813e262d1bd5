// handlers/protected/mod.rs - handlers behind jwt_auth_middleware + validate_user_middleware
//
// Every handler here receives the request's `Principal` through an extension and
// passes it explicitly to the service layer.
pub mod audit;
pub mod auth;
pub mod dashboards;
pub mod data_models;
pub mod roles;
pub mod uploads;
pub mod users;
