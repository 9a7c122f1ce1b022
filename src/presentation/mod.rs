// Presentation layer - HTTP surface of the dashboard role
pub mod app_state;
pub mod frames;
pub mod handlers;
pub mod router;
