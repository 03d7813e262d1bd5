// handlers/mod.rs - two security tiers
//
// Public (no auth, /auth/*) → Protected (JWT + active user, /api/*).
// Admin-only operations live in the protected tier and are gated by the services.
pub mod protected;
pub mod public;
