//! HTTP API handlers for gdf-profile
//!
//! Authenticated routes take `Authorization: Bearer <access token>`; guest
//! routes identify the browser with `X-Device-Id`.

pub mod admin;
pub mod ai;
pub mod auth;
pub mod guest;
pub mod health;
pub mod profile;
pub mod session;
pub mod sse;

pub use admin::admin_routes;
pub use ai::ai_routes;
pub use guest::guest_routes;
pub use health::health_routes;
pub use profile::profile_routes;
pub use session::session_routes;
pub use sse::event_routes;
