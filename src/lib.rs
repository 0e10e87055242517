pub mod config;
pub mod handlers;
pub mod models;
pub mod services;
pub mod terminal; // CLI display sink

#[cfg(feature = "web-server")]
pub mod web; // Browser upload surface
