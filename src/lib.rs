pub mod api;
pub mod audit_log;
pub mod clock;
pub mod config;
pub mod registry;
pub mod server;
pub mod shortcode;
pub mod url_service;
